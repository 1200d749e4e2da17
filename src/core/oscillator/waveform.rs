use serde::{Serialize, Deserialize};
use std::f32::consts::PI;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    Sine,
    Square,
    Saw,
    Triangle,
    /// Sum of the first N sine partials, partial k at amplitude 1/k
    Partials(u8),
}

impl Default for Waveform {
    fn default() -> Self {
        Waveform::Partials(2)
    }
}

impl Waveform {
    /// Sample the waveform at `phase` in [0, 1)
    pub fn sample(&self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (2.0 * PI * phase).sin(),
            Waveform::Square => if phase < 0.5 { 1.0 } else { -1.0 },
            Waveform::Saw => 2.0 * phase - 1.0,
            Waveform::Triangle => {
                if phase < 0.25 {
                    4.0 * phase
                } else if phase < 0.75 {
                    2.0 - 4.0 * phase
                } else {
                    -4.0 + 4.0 * phase
                }
            },
            Waveform::Partials(count) => {
                let count = (*count).max(1);
                let mut value = 0.0;
                let mut norm = 0.0;
                for k in 1..=count {
                    let amplitude = 1.0 / k as f32;
                    value += amplitude * (2.0 * PI * phase * k as f32).sin();
                    norm += amplitude;
                }
                value / norm
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partials_stay_in_range() {
        let wave = Waveform::Partials(2);
        for i in 0..1000 {
            let v = wave.sample(i as f32 / 1000.0);
            assert!(v.abs() <= 1.0);
        }
    }

    #[test]
    fn single_partial_is_a_sine() {
        let a = Waveform::Partials(1).sample(0.125);
        let b = Waveform::Sine.sample(0.125);
        assert!((a - b).abs() < 1e-6);
    }
}
