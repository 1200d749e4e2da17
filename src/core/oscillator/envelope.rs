use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Attack,
    Decay,
    Sustain,
    Release,
    Idle,
}

/// ADSR times in seconds, sustain as a level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.1,
            release: 0.01,
        }
    }
}

/// Running envelope generator. Stage changes start from the current level,
/// so a retrigger or an early release never jumps.
#[derive(Debug, Clone)]
pub struct EnvelopeState {
    pub stage: EnvelopeStage,
    pub level: f32,
    start_level: f32,
    time_in_stage: f32,
}

impl EnvelopeState {
    pub fn new() -> Self {
        Self {
            stage: EnvelopeStage::Idle,
            level: 0.0,
            start_level: 0.0,
            time_in_stage: 0.0,
        }
    }

    pub fn trigger(&mut self) {
        self.enter(EnvelopeStage::Attack);
    }

    pub fn release(&mut self) {
        if self.stage != EnvelopeStage::Idle {
            self.enter(EnvelopeStage::Release);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.stage == EnvelopeStage::Idle
    }

    fn enter(&mut self, stage: EnvelopeStage) {
        self.stage = stage;
        self.start_level = self.level;
        self.time_in_stage = 0.0;
    }

    /// Advance by `dt` seconds and return the new level
    pub fn advance(&mut self, env: &Envelope, dt: f32) -> f32 {
        self.time_in_stage += dt;
        match self.stage {
            EnvelopeStage::Attack => {
                let t = progress(self.time_in_stage, env.attack);
                self.level = self.start_level + (1.0 - self.start_level) * t;
                if t >= 1.0 {
                    self.enter(EnvelopeStage::Decay);
                }
            },
            EnvelopeStage::Decay => {
                let t = progress(self.time_in_stage, env.decay);
                self.level = 1.0 - (1.0 - env.sustain) * t;
                if t >= 1.0 {
                    self.enter(EnvelopeStage::Sustain);
                }
            },
            EnvelopeStage::Sustain => self.level = env.sustain,
            EnvelopeStage::Release => {
                let t = progress(self.time_in_stage, env.release);
                self.level = self.start_level * (1.0 - t);
                if t >= 1.0 {
                    self.level = 0.0;
                    self.enter(EnvelopeStage::Idle);
                }
            },
            EnvelopeStage::Idle => self.level = 0.0,
        }
        self.level
    }
}

fn progress(time: f32, length: f32) -> f32 {
    if length <= 0.0 {
        1.0
    } else {
        (time / length).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(state: &mut EnvelopeState, env: &Envelope, seconds: f32) {
        let dt = 1.0 / 1000.0;
        let steps = (seconds / dt).round() as usize;
        for _ in 0..steps {
            state.advance(env, dt);
        }
    }

    #[test]
    fn reaches_sustain_then_releases_to_idle() {
        let env = Envelope::default();
        let mut state = EnvelopeState::new();
        state.trigger();
        run(&mut state, &env, 0.5);
        assert_eq!(state.stage, EnvelopeStage::Sustain);
        assert!((state.level - env.sustain).abs() < 1e-6);

        state.release();
        run(&mut state, &env, 0.05);
        assert!(state.is_idle());
        assert_eq!(state.level, 0.0);
    }

    #[test]
    fn release_while_idle_stays_idle() {
        let mut state = EnvelopeState::new();
        state.release();
        assert!(state.is_idle());
    }
}
