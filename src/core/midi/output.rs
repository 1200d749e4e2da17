use midir::{MidiOutput, MidiOutputConnection};
use std::time::Instant;

use log::{info, warn};

const CLIENT_NAME: &str = "pitchmidi output";
pub const MIRROR_CHANNEL: u8 = 0;
pub const MIRROR_VELOCITY: u8 = 100;

/// Handles MIDI output to a connected port
pub struct MidiOutputHandler {
    connection: Option<MidiOutputConnection>,
}

impl MidiOutputHandler {
    pub fn new() -> Self {
        Self { connection: None }
    }

    /// List all available MIDI output ports
    pub fn list_ports() -> Vec<String> {
        match MidiOutput::new(CLIENT_NAME) {
            Ok(midi_out) => midi_out
                .ports()
                .iter()
                .filter_map(|port| midi_out.port_name(port).ok())
                .collect(),
            Err(err) => {
                warn!("Error initializing MIDI output: {}", err);
                Vec::new()
            },
        }
    }

    /// Connect to a specific MIDI output port by name
    pub fn connect_to_port(&mut self, port_name: &str) -> Result<(), String> {
        self.disconnect();

        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|err| format!("Failed to create MIDI output: {}", err))?;

        let port = midi_out
            .ports()
            .into_iter()
            .find(|port| midi_out.port_name(port).map(|name| name == port_name).unwrap_or(false))
            .ok_or_else(|| format!("MIDI port '{}' not found", port_name))?;

        let conn = midi_out
            .connect(&port, "pitchmidi-write-output")
            .map_err(|err| format!("Failed to connect to MIDI port: {}", err))?;
        self.connection = Some(conn);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn send(&mut self, message: &[u8]) -> Result<(), String> {
        if let Some(conn) = &mut self.connection {
            conn.send(message)
                .map_err(|err| format!("Failed to send MIDI message: {}", err))?;
        }
        Ok(())
    }

    pub fn send_note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<(), String> {
        self.send(&note_on(channel, note, velocity))
    }

    pub fn send_note_off(&mut self, channel: u8, note: u8, velocity: u8) -> Result<(), String> {
        self.send(&note_off(channel, note, velocity))
    }
}

pub fn note_on(channel: u8, note: u8, velocity: u8) -> [u8; 3] {
    [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
}

pub fn note_off(channel: u8, note: u8, velocity: u8) -> [u8; 3] {
    [0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
}

/// Mirrors the synth's attack/release stream onto a MIDI port, keeping
/// exactly one note held at a time.
pub struct MidiMirror {
    handler: MidiOutputHandler,
    held: Option<u8>,
}

impl MidiMirror {
    pub fn connect(port_name: &str) -> Result<Self, String> {
        let mut handler = MidiOutputHandler::new();
        handler.connect_to_port(port_name)?;
        info!("Mirroring notes to MIDI port '{}'", port_name);
        Ok(Self { handler, held: None })
    }

    pub fn attack(&mut self, midi_number: u8, _at: Instant) {
        if let Some(old) = self.held.take() {
            report(self.handler.send_note_off(MIRROR_CHANNEL, old, 0));
        }
        report(self.handler.send_note_on(MIRROR_CHANNEL, midi_number, MIRROR_VELOCITY));
        self.held = Some(midi_number);
    }

    pub fn release(&mut self, _at: Instant) {
        if let Some(old) = self.held.take() {
            report(self.handler.send_note_off(MIRROR_CHANNEL, old, 0));
        }
    }
}

fn report(result: Result<(), String>) {
    if let Err(err) = result {
        warn!("{}", err);
    }
}

impl Drop for MidiMirror {
    fn drop(&mut self) {
        if let Some(old) = self.held.take() {
            let _ = self.handler.send_note_off(MIRROR_CHANNEL, old, 0);
        }
    }
}
