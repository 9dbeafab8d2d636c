//! Control surface transport
//!
//! The binding talks to hardware through the [`ControlSurface`] trait. This
//! module provides the midir-backed implementation with port discovery and an
//! in-memory loopback surface for virtual setups and tests.

use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::midi::{format_hex, MidiMessage};

/// Control change received from a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlEvent {
    /// MIDI channel (0-15)
    pub channel: u8,
    /// Control number (0-127)
    pub control: u8,
    /// Raw 7-bit value (0-127)
    pub value: u8,
}

/// Callback invoked on the surface's I/O thread for every control change
pub type ControlHandler = Box<dyn Fn(ControlEvent) + Send + 'static>;

/// Already-bound control surface handle
pub trait ControlSurface: Send + Sync {
    fn name(&self) -> &str;

    /// Register the event source; events are delivered asynchronously
    fn listen(&self, handler: ControlHandler) -> Result<()>;

    /// Transmit a control change (channel 0-15)
    fn send_control_change(&self, channel: u8, control: u8, value: u8) -> Result<()>;
}

/// Input/output port pair selected for a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiDevice {
    pub input_port: String,
    pub output_port: String,
}

impl MidiDevice {
    /// Match a device by case-insensitive port name substring
    ///
    /// Returns `Ok(None)` and logs the available ports when either side is
    /// missing.
    pub fn match_name(input_pattern: &str, output_pattern: &str) -> Result<Option<Self>> {
        let (inputs, outputs) = list_ports()?;
        let input = find_port(&inputs, input_pattern);
        let output = find_port(&outputs, output_pattern);

        match (input, output) {
            (Some(input_port), Some(output_port)) => {
                debug!(
                    "Matched MIDI device - input: '{}', output: '{}'",
                    input_port, output_port
                );
                Ok(Some(Self {
                    input_port: input_port.to_string(),
                    output_port: output_port.to_string(),
                }))
            }
            _ => {
                warn!(
                    "MIDI device not matched - input: '{}', output: '{}'",
                    input_pattern, output_pattern
                );
                info!("Listing available MIDI ports:");
                for name in &inputs {
                    info!(" |-input: '{}'", name);
                }
                for name in &outputs {
                    info!(" |-output: '{}'", name);
                }
                Ok(None)
            }
        }
    }
}

/// Find a port by substring match (Windows-friendly)
fn find_port<'a>(ports: &'a [String], pattern: &str) -> Option<&'a str> {
    let pattern = pattern.to_lowercase();
    ports
        .iter()
        .find(|name| name.to_lowercase().contains(&pattern))
        .map(|name| name.as_str())
}

/// Names of the available MIDI input and output ports
pub fn list_ports() -> Result<(Vec<String>, Vec<String>)> {
    let midi_in = MidiInput::new("statesync-discovery").context("Failed to create MIDI input")?;
    let inputs = midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect();

    let midi_out =
        MidiOutput::new("statesync-discovery").context("Failed to create MIDI output")?;
    let outputs = midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect();

    Ok((inputs, outputs))
}

/// Print discovered ports for the `--list-ports` command
pub fn print_ports() -> Result<()> {
    let (inputs, outputs) = list_ports()?;

    println!("\n{}", "=== MIDI Input Ports ===".bold().cyan());
    for (i, name) in inputs.iter().enumerate() {
        println!("  {}: {}", i, name.green());
    }

    println!("\n{}", "=== MIDI Output Ports ===".bold().cyan());
    for (i, name) in outputs.iter().enumerate() {
        println!("  {}: {}", i, name.green());
    }
    println!();
    Ok(())
}

/// Hardware control surface over midir
pub struct MidiSurface {
    name: String,
    device: MidiDevice,
    input_conn: Mutex<Option<MidiInputConnection<()>>>,
    output_conn: Mutex<MidiOutputConnection>,
}

impl MidiSurface {
    /// Open the output port of a matched device
    ///
    /// The input port is connected later, by [`ControlSurface::listen`].
    pub fn open(device: MidiDevice) -> Result<Self> {
        let midi_out = MidiOutput::new("statesync-output").context("Failed to create MIDI output")?;
        let out_port = midi_out
            .ports()
            .into_iter()
            .find(|port| midi_out.port_name(port).ok().as_deref() == Some(device.output_port.as_str()))
            .ok_or_else(|| anyhow!("Output port '{}' not found", device.output_port))?;

        info!("Connecting to output port: {}", device.output_port);
        let output_conn = midi_out
            .connect(&out_port, "statesync")
            .map_err(|e| anyhow!("Failed to connect to output port: {}", e))?;

        Ok(Self {
            name: device.input_port.clone(),
            device,
            input_conn: Mutex::new(None),
            output_conn: Mutex::new(output_conn),
        })
    }

    pub fn device(&self) -> &MidiDevice {
        &self.device
    }
}

impl ControlSurface for MidiSurface {
    fn name(&self) -> &str {
        &self.name
    }

    fn listen(&self, handler: ControlHandler) -> Result<()> {
        let mut input_conn = self.input_conn.lock();
        if input_conn.is_some() {
            bail!("Input port '{}' already has a listener", self.device.input_port);
        }

        let midi_in = MidiInput::new("statesync-input").context("Failed to create MIDI input")?;
        let in_port = midi_in
            .ports()
            .into_iter()
            .find(|port| midi_in.port_name(port).ok().as_deref() == Some(self.device.input_port.as_str()))
            .ok_or_else(|| anyhow!("Input port '{}' not found", self.device.input_port))?;

        info!("Connecting to input port: {}", self.device.input_port);
        let conn = midi_in
            .connect(
                &in_port,
                "statesync",
                move |_timestamp, data, _| match MidiMessage::parse(data) {
                    Some(MidiMessage::ControlChange { channel, cc, value }) => {
                        handler(ControlEvent {
                            channel,
                            control: cc,
                            value,
                        });
                    }
                    Some(message) => trace!("Ignoring MIDI message: {}", message),
                    None => trace!("Failed to parse MIDI: {}", format_hex(data)),
                },
                (),
            )
            .map_err(|e| anyhow!("Failed to connect to input port: {}", e))?;

        *input_conn = Some(conn);
        Ok(())
    }

    fn send_control_change(&self, channel: u8, control: u8, value: u8) -> Result<()> {
        let message = MidiMessage::ControlChange {
            channel,
            cc: control,
            value,
        };
        let data = message.encode();
        self.output_conn
            .lock()
            .send(&data)
            .context("Failed to send MIDI message")?;
        trace!("Sent: {} | {}", format_hex(&data), message);
        Ok(())
    }
}

/// In-memory surface: records outgoing messages, events are injected by hand
pub struct LoopbackSurface {
    name: String,
    handler: Mutex<Option<ControlHandler>>,
    sent: Mutex<Vec<MidiMessage>>,
}

impl LoopbackSurface {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            handler: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Deliver a control change as if it came from the device
    ///
    /// Returns `false` when no listener is registered.
    pub fn inject(&self, channel: u8, control: u8, value: u8) -> bool {
        let handler = self.handler.lock();
        match handler.as_ref() {
            Some(handler) => {
                handler(ControlEvent {
                    channel,
                    control,
                    value,
                });
                true
            }
            None => false,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.handler.lock().is_some()
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<MidiMessage> {
        self.sent.lock().clone()
    }

    /// Drain the sent messages
    pub fn take_sent(&self) -> Vec<MidiMessage> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl ControlSurface for LoopbackSurface {
    fn name(&self) -> &str {
        &self.name
    }

    fn listen(&self, handler: ControlHandler) -> Result<()> {
        let mut current = self.handler.lock();
        if current.is_some() {
            bail!("Surface '{}' already has a listener", self.name);
        }
        *current = Some(handler);
        Ok(())
    }

    fn send_control_change(&self, channel: u8, control: u8, value: u8) -> Result<()> {
        self.sent.lock().push(MidiMessage::ControlChange {
            channel,
            cc: control,
            value,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_find_port_is_case_insensitive() {
        let ports = vec!["nanoKONTROL2 MIDI 1".to_string(), "Midi Through".to_string()];
        assert_eq!(find_port(&ports, "nanokontrol"), Some("nanoKONTROL2 MIDI 1"));
        assert_eq!(find_port(&ports, "THROUGH"), Some("Midi Through"));
        assert_eq!(find_port(&ports, "x-touch"), None);
    }

    #[test]
    fn test_unknown_device_is_not_matched() {
        // enumeration itself may fail on machines without a MIDI backend
        if list_ports().is_ok() {
            let found = MidiDevice::match_name("no-such-device", "no-such-device").unwrap();
            assert!(found.is_none());
        }
    }

    #[test]
    fn test_surfaces_are_thread_safe() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MidiSurface>();
        assert_send_sync::<LoopbackSurface>();
    }

    #[test]
    fn test_loopback_inject_and_record() {
        let surface = LoopbackSurface::new("loop");
        assert!(!surface.inject(0, 7, 64));

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        surface
            .listen(Box::new(move |event| sink.lock().push(event)))
            .unwrap();
        assert!(surface.is_listening());
        assert!(surface.listen(Box::new(|_| {})).is_err());

        assert!(surface.inject(0, 7, 64));
        assert_eq!(
            received.lock().clone(),
            vec![ControlEvent {
                channel: 0,
                control: 7,
                value: 64
            }]
        );

        surface.send_control_change(0, 7, 127).unwrap();
        assert_eq!(
            surface.take_sent(),
            vec![MidiMessage::ControlChange {
                channel: 0,
                cc: 7,
                value: 127
            }]
        );
        assert!(surface.sent().is_empty());
    }
}
