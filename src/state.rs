//! State management module - typed property state shared between producers and consumers
//!
//! This module provides the property metadata derived from a state type and the
//! curator that owns the state instance. It implements change detection and
//! echo suppression so control surfaces and observers stay in sync without
//! feedback loops.

mod curator;
mod metadata;
mod types;

pub use curator::{StateConsumer, StateCurator, StateProducer, StateSink};
pub use metadata::{Accessor, PropertyDecl, PropertyRegistry, StateMetadata, StateType};
pub use types::{PropertyDescriptor, PropertyKind, PropertyValue, ValueRange};
