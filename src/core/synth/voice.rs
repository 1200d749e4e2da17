use std::collections::VecDeque;

use crate::core::midi::midi_to_freq;
use crate::core::oscillator::{Envelope, EnvelopeState, Waveform};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceCommand {
    Attack(u8),
    Release,
}

/// The single voice rendered by the output stream
pub struct MonoVoice {
    pub sample_rate: f32,
    pub volume: f32,
    pub waveform: Waveform,
    pub envelope: Envelope,
    pub frequency: f32,
    phase: f32,
    env_state: EnvelopeState,
    // (samples left before applying, command)
    pending: VecDeque<(u64, VoiceCommand)>,
}

impl MonoVoice {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            volume: 0.5,
            waveform: Waveform::default(),
            envelope: Envelope::default(),
            frequency: 440.0,
            phase: 0.0,
            env_state: EnvelopeState::new(),
            pending: VecDeque::new(),
        }
    }

    /// Queue a command to take effect after `delay_samples` rendered samples.
    /// Commands stay in the order they were scheduled.
    pub fn schedule(&mut self, command: VoiceCommand, delay_samples: u64) {
        if delay_samples == 0 && self.pending.is_empty() {
            self.apply(command);
        } else {
            self.pending.push_back((delay_samples, command));
        }
    }

    fn apply(&mut self, command: VoiceCommand) {
        match command {
            VoiceCommand::Attack(midi_number) => {
                // a second attack retunes the same voice
                self.frequency = midi_to_freq(midi_number);
                self.env_state.trigger();
            },
            VoiceCommand::Release => self.env_state.release(),
        }
    }

    fn apply_due(&mut self) {
        while let Some((remaining, command)) = self.pending.front_mut() {
            if *remaining > 0 {
                *remaining -= 1;
                break;
            }
            let command = *command;
            self.pending.pop_front();
            self.apply(command);
        }
    }

    #[cfg(test)]
    pub fn is_sounding(&self) -> bool {
        !self.env_state.is_idle()
    }

    /// Generate one audio sample
    pub fn next_sample(&mut self) -> f32 {
        self.apply_due();
        if self.env_state.is_idle() {
            return 0.0;
        }

        let dt = 1.0 / self.sample_rate;
        let level = self.env_state.advance(&self.envelope, dt);
        let value = self.waveform.sample(self.phase);
        self.phase = (self.phase + self.frequency * dt) % 1.0;

        value * level * self.volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(voice: &mut MonoVoice, count: usize) -> Vec<f32> {
        (0..count).map(|_| voice.next_sample()).collect()
    }

    #[test]
    fn silent_until_attacked() {
        let mut voice = MonoVoice::new(48000.0);
        assert!(render(&mut voice, 256).iter().all(|s| *s == 0.0));
        voice.schedule(VoiceCommand::Attack(69), 0);
        assert!(render(&mut voice, 256).iter().any(|s| s.abs() > 0.0));
        assert!(voice.is_sounding());
    }

    #[test]
    fn second_attack_retunes_single_voice() {
        let mut voice = MonoVoice::new(48000.0);
        voice.schedule(VoiceCommand::Attack(69), 0);
        render(&mut voice, 100);
        voice.schedule(VoiceCommand::Attack(72), 0);
        assert!((voice.frequency - midi_to_freq(72)).abs() < 1e-3);
        // output never exceeds one voice's worth of gain
        assert!(render(&mut voice, 4800).iter().all(|s| s.abs() <= voice.volume + 1e-6));
    }

    #[test]
    fn release_fades_out() {
        let mut voice = MonoVoice::new(1000.0);
        voice.schedule(VoiceCommand::Attack(60), 0);
        render(&mut voice, 200);
        voice.schedule(VoiceCommand::Release, 0);
        render(&mut voice, 50);
        assert!(!voice.is_sounding());
        assert!(render(&mut voice, 10).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn delayed_command_waits_for_its_sample() {
        let mut voice = MonoVoice::new(1000.0);
        voice.schedule(VoiceCommand::Attack(60), 10);
        render(&mut voice, 5);
        assert!(!voice.is_sounding());
        render(&mut voice, 10);
        assert!(voice.is_sounding());
    }
}
