use std::time::Instant;

use log::debug;

use crate::core::analyzer::LoudnessReading;
use crate::core::midi::MusicalEvent;
use crate::core::pitch::FrequencyEstimate;
use crate::core::synth::SynthOutput;

/// Input level that must be exceeded (strictly) before a note sounds
pub const GATE_THRESHOLD: f32 = 0.08;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Attack(MusicalEvent),
    Release,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Silent,
    Sounding(u8),
}

/// Turns level + pitch into note on/off decisions. The only writer of
/// attack/release commands to the synth.
pub struct TriggerGate {
    threshold: f32,
    state: GateState,
}

impl TriggerGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold, state: GateState::Silent }
    }

    #[cfg(test)]
    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn decide(&mut self, reading: LoudnessReading, estimate: &FrequencyEstimate) -> GateDecision {
        let event = if reading.normalized_level > self.threshold && estimate.valid {
            match MusicalEvent::from_frequency(estimate.hertz) {
                Ok(event) => Some(event),
                Err(err) => {
                    debug!("unmappable estimate: {}", err);
                    None
                },
            }
        } else {
            None
        };

        match event {
            Some(event) => {
                if self.state == GateState::Sounding(event.midi_number) {
                    GateDecision::Hold
                } else {
                    self.state = GateState::Sounding(event.midi_number);
                    GateDecision::Attack(event)
                }
            },
            None => {
                self.state = GateState::Silent;
                GateDecision::Release
            },
        }
    }

    /// Carry out a decision on the synth
    pub fn apply<S: SynthOutput>(&self, decision: &GateDecision, synth: &mut S, at: Instant) {
        match decision {
            GateDecision::Attack(event) => synth.attack(event.midi_number, at),
            GateDecision::Release => synth.release(at),
            GateDecision::Hold => {},
        }
    }

    /// Silence the synth regardless of input, e.g. when muting
    pub fn force_release<S: SynthOutput>(&mut self, synth: &mut S, at: Instant) {
        self.state = GateState::Silent;
        synth.release(at);
    }
}

impl Default for TriggerGate {
    fn default() -> Self {
        Self::new(GATE_THRESHOLD)
    }
}
