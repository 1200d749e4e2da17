pub mod voice;

use std::sync::{Arc, RwLock};
use std::time::Instant;

use log::error;

use crate::core::midi::MidiMirror;
pub use voice::{MonoVoice, VoiceCommand};

/// What the synth is currently playing, from the commands it was given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SynthVoiceState {
    pub active: bool,
    pub current_midi_number: Option<u8>,
}

impl SynthVoiceState {
    fn attacked(midi_number: u8) -> Self {
        Self { active: true, current_midi_number: Some(midi_number) }
    }
}

/// A monophonic sound source driven by attack/release commands.
///
/// Implementations hold at most one voice: attacking while a note is active
/// retunes it. Note numbers are validated before they get here.
pub trait SynthOutput {
    fn attack(&mut self, midi_number: u8, at: Instant);
    fn release(&mut self, at: Instant);
    fn voice_state(&self) -> SynthVoiceState;
}

/// Synth that renders through the shared [`MonoVoice`] read by the output stream
pub struct ToneSynth {
    voice: Arc<RwLock<MonoVoice>>,
    state: SynthVoiceState,
    mirror: Option<MidiMirror>,
}

impl ToneSynth {
    pub fn new(voice: Arc<RwLock<MonoVoice>>) -> Self {
        Self {
            voice,
            state: SynthVoiceState::default(),
            mirror: None,
        }
    }

    /// Also send every command to an external MIDI port
    pub fn with_mirror(mut self, mirror: MidiMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    fn send(&self, command: VoiceCommand, at: Instant) {
        match self.voice.write() {
            Ok(mut voice) => {
                let delay = at.saturating_duration_since(Instant::now());
                let delay_samples = (delay.as_secs_f32() * voice.sample_rate) as u64;
                voice.schedule(command, delay_samples);
            },
            Err(_) => error!("synth voice lock poisoned, dropping {:?}", command),
        }
    }
}

impl SynthOutput for ToneSynth {
    fn attack(&mut self, midi_number: u8, at: Instant) {
        self.send(VoiceCommand::Attack(midi_number), at);
        if let Some(mirror) = self.mirror.as_mut() {
            mirror.attack(midi_number, at);
        }
        self.state = SynthVoiceState::attacked(midi_number);
    }

    fn release(&mut self, at: Instant) {
        if let Some(mirror) = self.mirror.as_mut() {
            mirror.release(at);
        }
        if !self.state.active {
            return;
        }
        self.send(VoiceCommand::Release, at);
        self.state = SynthVoiceState::default();
    }

    fn voice_state(&self) -> SynthVoiceState {
        self.state
    }
}
