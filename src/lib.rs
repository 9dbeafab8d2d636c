//! statesync-midi - live state synchronization for interactive applications
//!
//! Exposes a set of named, typed, range-bounded parameters that MIDI control
//! surfaces can manipulate while every other observer of the state stays
//! informed, without feedback loops or redundant notifications.

pub mod binding;
pub mod cli;
pub mod config;
pub mod control_mapping;
pub mod device;
pub mod error;
pub mod midi;
pub mod state;

pub use binding::{DeviceState, MidiStateBinding};
pub use control_mapping::{ControlMapping, MappingEntry};
pub use device::{ControlEvent, ControlSurface, LoopbackSurface, MidiDevice, MidiSurface};
pub use error::{StateError, StateResult};
pub use state::{
    PropertyDescriptor, PropertyKind, PropertyRegistry, PropertyValue, StateConsumer,
    StateCurator, StateMetadata, StateProducer, StateSink, StateType, ValueRange,
};
