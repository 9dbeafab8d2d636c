//! MIDI state binding - a control surface acting as producer and consumer
//!
//! Translates 7-bit control changes into typed property values and back.
//! Double properties use an affine remap over their declared range, Boolean
//! properties use the full-scale threshold (127 = on). String properties have
//! no MIDI representation and are rejected when binding.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info_span, trace, warn, Span};

use crate::control_mapping::ControlMapping;
use crate::device::{ControlEvent, ControlSurface};
use crate::error::{StateError, StateResult};
use crate::midi::convert;
use crate::state::{
    PropertyKind, PropertyValue, StateConsumer, StateMetadata, StateProducer, StateSink,
    StateType, ValueRange,
};

/// How a mapped property is carried over a 7-bit control
#[derive(Debug, Clone, Copy, PartialEq)]
enum ControlKind {
    Range(ValueRange),
    Switch,
}

impl ControlKind {
    fn decode(&self, raw: u8) -> PropertyValue {
        match self {
            ControlKind::Range(range) => {
                PropertyValue::Double(convert::from_7bit_range(raw, range.min, range.max))
            }
            ControlKind::Switch => PropertyValue::Boolean(convert::to_bool(raw)),
        }
    }

    /// `None` when the value kind does not match the control
    fn encode(&self, value: &PropertyValue) -> Option<u8> {
        match (self, value) {
            (ControlKind::Range(range), PropertyValue::Double(v)) => {
                Some(convert::to_7bit_range(*v, range.min, range.max))
            }
            (ControlKind::Switch, PropertyValue::Boolean(v)) => Some(convert::from_bool(*v)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct MappedControl {
    control: u8,
    property: String,
    kind: ControlKind,
}

/// Mapping resolved against the state metadata, shared with the listener
#[derive(Debug, Default)]
struct ControlTable {
    by_control: HashMap<u8, MappedControl>,
    by_property: HashMap<String, u8>,
}

impl ControlTable {
    fn resolve<T>(metadata: &StateMetadata<T>, mapping: &ControlMapping) -> StateResult<Self> {
        let mut table = Self::default();
        for (control, property) in mapping.entries() {
            let descriptor = metadata
                .descriptor(property)
                .ok_or_else(|| StateError::UnknownMappedProperty(property.to_string()))?;
            let kind = match (descriptor.kind(), descriptor.range()) {
                (PropertyKind::Double, Some(range)) => ControlKind::Range(range),
                (PropertyKind::Boolean, _) => ControlKind::Switch,
                (kind, _) => {
                    return Err(StateError::UnsupportedMapping {
                        name: property.to_string(),
                        kind,
                    })
                }
            };
            table.by_property.insert(property.to_string(), control);
            table.by_control.insert(
                control,
                MappedControl {
                    control,
                    property: property.to_string(),
                    kind,
                },
            );
        }
        Ok(table)
    }

    fn by_property(&self, property: &str) -> Option<&MappedControl> {
        self.by_property
            .get(property)
            .and_then(|control| self.by_control.get(control))
    }
}

/// Device handle state
pub enum DeviceState {
    /// Expected device was not found; events and writes are ignored
    Unbound,
    /// Operating state
    Bound(Arc<dyn ControlSurface>),
}

/// Control surface bound to a state type through a [`ControlMapping`]
pub struct MidiStateBinding<T> {
    name: String,
    device: DeviceState,
    metadata: Arc<StateMetadata<T>>,
    table: Arc<ControlTable>,
    /// Outgoing MIDI channel (0-15)
    channel: u8,
    span: Span,
}

impl<T: StateType> MidiStateBinding<T> {
    /// Bind a surface; fails before any device I/O on an invalid mapping
    pub fn bind(
        surface: Arc<dyn ControlSurface>,
        metadata: Arc<StateMetadata<T>>,
        mapping: &ControlMapping,
    ) -> StateResult<Self> {
        let name = surface.name().to_string();
        Self::build(name, DeviceState::Bound(surface), metadata, mapping)
    }

    /// Binding for a device that was not found: validated, but inert
    pub fn unbound(
        name: &str,
        metadata: Arc<StateMetadata<T>>,
        mapping: &ControlMapping,
    ) -> StateResult<Self> {
        Self::build(name.to_string(), DeviceState::Unbound, metadata, mapping)
    }

    fn build(
        name: String,
        device: DeviceState,
        metadata: Arc<StateMetadata<T>>,
        mapping: &ControlMapping,
    ) -> StateResult<Self> {
        let table = ControlTable::resolve(&metadata, mapping)?;
        let span = info_span!("midi_binding", device = %name);
        Ok(Self {
            name,
            device,
            metadata,
            table: Arc::new(table),
            channel: 0,
            span,
        })
    }

    /// Set the outgoing MIDI channel (0-15)
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel & 0x0F;
        self
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.device, DeviceState::Bound(_))
    }

    fn send(&self, surface: &dyn ControlSurface, control: u8, raw: u8) -> Result<()> {
        trace!("Sending control {} = {}", control, raw);
        surface.send_control_change(self.channel, control, raw)
    }
}

/// Translate one incoming device event and forward it to the curator
fn on_control_event<T>(table: &ControlTable, sink: &StateSink<T>, event: ControlEvent) {
    let Some(mapped) = table.by_control.get(&event.control) else {
        debug!(
            "Unmapped control event - channel: {}, control: {}, value: {}",
            event.channel + 1,
            event.control,
            event.value
        );
        return;
    };

    let value = mapped.kind.decode(event.value);
    if let Err(e) = sink.update_state(&mapped.property, value) {
        warn!(
            "Failed to apply control {} to '{}': {}",
            mapped.control, mapped.property, e
        );
    }
}

impl<T: StateType> StateProducer<T> for MidiStateBinding<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, sink: StateSink<T>) -> Result<()> {
        let surface = match &self.device {
            DeviceState::Bound(surface) => surface,
            DeviceState::Unbound => {
                warn!(parent: &self.span, "Device not bound, no control events will be received");
                return Ok(());
            }
        };

        let table = self.table.clone();
        let span = self.span.clone();
        surface.listen(Box::new(move |event| {
            let _enter = span.enter();
            on_control_event(&table, &sink, event);
        }))
    }

    fn update_state(&self, state: &T) -> Result<()> {
        let _enter = self.span.enter();
        let surface = match &self.device {
            DeviceState::Bound(surface) => surface,
            DeviceState::Unbound => return Ok(()),
        };

        debug!("Updating MIDI state");
        let mut controls: Vec<&MappedControl> = self.table.by_control.values().collect();
        controls.sort_by_key(|mapped| mapped.control);
        for mapped in controls {
            let value = self.metadata.get(state, &mapped.property)?;
            if let Some(raw) = mapped.kind.encode(&value) {
                self.send(surface.as_ref(), mapped.control, raw)?;
            }
        }
        Ok(())
    }
}

impl<T: StateType> StateConsumer for MidiStateBinding<T> {
    fn update_state(&self, property: &str, value: &PropertyValue) {
        let _enter = self.span.enter();
        let DeviceState::Bound(surface) = &self.device else {
            return;
        };
        let Some(mapped) = self.table.by_property(property) else {
            return;
        };
        let Some(raw) = mapped.kind.encode(value) else {
            warn!("Value {} does not fit control {}", value, mapped.control);
            return;
        };
        if let Err(e) = self.send(surface.as_ref(), mapped.control, raw) {
            warn!("Failed to push '{}' to device: {:#}", property, e);
        }
    }
}
