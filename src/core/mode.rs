use std::fmt;
use std::time::Instant;

use log::{debug, info, warn};

use crate::core::analyzer::LevelMeter;
use crate::core::gate::{GateDecision, TriggerGate};
use crate::core::midi::{midi_to_note_name, to_midi, to_note_name};
use crate::core::pitch::{EstimateDriver, EstimateResult, FrequencyEstimate, Generation, PitchEstimator};
use crate::core::session::{AudioBackend, AudioSession, Route, SessionState};
use crate::core::synth::SynthOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Mono,
    Midi,
    Mute,
}

impl OperatingMode {
    /// Map a control-surface value: "audio", "midi", anything else mutes
    pub fn from_selection(value: &str) -> Self {
        match value.trim() {
            "audio" => OperatingMode::Mono,
            "midi" => OperatingMode::Midi,
            _ => OperatingMode::Mute,
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingMode::Mono => write!(f, "Mono"),
            OperatingMode::Midi => write!(f, "Midi"),
            OperatingMode::Mute => write!(f, "Mute"),
        }
    }
}

/// What is connected right now. Anything new is only wired from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wiring {
    Idle,
    Passthrough,
    PitchLoop(Generation),
}

/// Owns the session, the pitch loop, the gate and the synth, and switches
/// between operating modes.
pub struct ModeController<B: AudioBackend, D: EstimateDriver, S: SynthOutput> {
    mode: OperatingMode,
    wiring: Wiring,
    session: AudioSession<B>,
    meter: LevelMeter,
    estimator: PitchEstimator<D>,
    gate: TriggerGate,
    synth: S,
}

impl<B: AudioBackend, D: EstimateDriver, S: SynthOutput> ModeController<B, D, S> {
    pub fn new(
        session: AudioSession<B>,
        meter: LevelMeter,
        estimator: PitchEstimator<D>,
        gate: TriggerGate,
        synth: S,
    ) -> Self {
        Self {
            mode: OperatingMode::Mute,
            wiring: Wiring::Idle,
            session,
            meter,
            estimator,
            gate,
            synth,
        }
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn wiring(&self) -> Wiring {
        self.wiring
    }

    #[cfg(test)]
    pub fn session(&self) -> &AudioSession<B> {
        &self.session
    }

    #[cfg(test)]
    pub fn estimator(&self) -> &PitchEstimator<D> {
        &self.estimator
    }

    #[cfg(test)]
    pub fn synth(&self) -> &S {
        &self.synth
    }

    /// Switch to `mode`, tearing down the old wiring before building the new
    pub fn select_mode(&mut self, mode: OperatingMode) {
        info!("{}", mode);
        self.teardown();
        self.mode = mode;
        self.establish();
    }

    /// Reacquire the input on another device and rewire the current mode
    pub fn select_device(&mut self, device_id: &str) {
        self.teardown();
        if let Err(err) = self.session.acquire(Some(device_id)) {
            warn!("Error accessing audio device: {}", err);
            return;
        }
        self.establish();
    }

    fn teardown(&mut self) {
        match self.wiring {
            Wiring::Idle => {},
            Wiring::Passthrough => {
                self.session.set_route(Route::Silent);
            },
            Wiring::PitchLoop(generation) => {
                self.estimator.stop_loop();
                self.session.set_route(Route::Silent);
                self.gate.force_release(&mut self.synth, Instant::now());
                debug!("pitch loop {} torn down", generation);
            },
        }
        self.wiring = Wiring::Idle;
    }

    fn establish(&mut self) {
        if self.wiring != Wiring::Idle {
            warn!("refusing to wire {} over {:?}", self.mode, self.wiring);
            return;
        }

        match self.mode {
            OperatingMode::Mono => {
                if self.start_session() {
                    self.session.set_route(Route::Passthrough);
                    self.wiring = Wiring::Passthrough;
                }
            },
            OperatingMode::Midi => {
                if self.start_session() {
                    self.session.set_route(Route::Synth);
                    // the gate must not see the level from before this loop
                    self.meter.reset();
                    let generation = self.estimator.start_loop();
                    self.wiring = Wiring::PitchLoop(generation);
                }
            },
            OperatingMode::Mute => {
                self.session.suspend();
                self.gate.force_release(&mut self.synth, Instant::now());
            },
        }
    }

    fn start_session(&mut self) -> bool {
        match self.session.ensure_running() {
            Ok(()) => true,
            Err(err) => {
                warn!("Error accessing audio device: {}", err);
                false
            },
        }
    }

    /// Handle one estimate from the pitch loop and re-arm it.
    ///
    /// Returns `None`, with no side effects, when the estimate belongs to a
    /// loop that has since been stopped.
    pub fn on_estimate(&mut self, generation: Generation, result: &EstimateResult) -> Option<GateDecision> {
        if !self.estimator.accept(generation) || self.wiring != Wiring::PitchLoop(generation) {
            return None;
        }

        let estimate = FrequencyEstimate::from(result);
        match result {
            Ok(hz) if estimate.valid => {
                if let (Ok(note), Ok(midi)) = (to_note_name(*hz), to_midi(*hz)) {
                    debug!("The Freq is: {:.2} Hz Note: {} MIDI: {}", hz, note, midi);
                }
            },
            Ok(hz) => debug!("ignoring unusable frequency {}", hz),
            Err(err) => debug!("{}", err),
        }

        let reading = self.meter.sample();
        let decision = self.gate.decide(reading, &estimate);
        self.gate.apply(&decision, &mut self.synth, Instant::now());

        self.estimator.rearm(generation);
        Some(decision)
    }

    pub fn status(&self) -> String {
        let state = match self.session.state() {
            SessionState::Running => "running",
            SessionState::Suspended => "suspended",
        };
        let voice = self.synth.voice_state();
        format!(
            "mode {} | device '{}' {} | wiring {:?} | note {} | stale estimates dropped {}",
            self.mode,
            self.session.device_id(),
            state,
            self.wiring,
            voice
                .current_midi_number
                .map(|m| format!("{} ({})", midi_to_note_name(m), m))
                .unwrap_or_else(|| "-".to_string()),
            self.estimator.stale_dropped(),
        )
    }
}
