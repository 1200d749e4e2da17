//! Signal taps fed by the input stream: the smoothed level meter and the
//! sample ring the pitch estimator reads windows from.

mod ring;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub use ring::SampleRing;

/// Fraction of the previous level kept on each new block
pub const LEVEL_SMOOTHING: f32 = 0.9;

/// Smoothed input loudness in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct LoudnessReading {
    pub normalized_level: f32,
}

impl LoudnessReading {
    pub fn new(level: f32) -> Self {
        Self { normalized_level: level.clamp(0.0, 1.0) }
    }
}

/// One step of the single-pole smoother
pub fn smooth(previous: f32, block_level: f32, coefficient: f32) -> f32 {
    (coefficient * previous + (1.0 - coefficient) * block_level).clamp(0.0, 1.0)
}

pub fn rms(block: &[f32]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }
    let sum: f32 = block.iter().map(|s| s * s).sum();
    (sum / block.len() as f32).sqrt()
}

/// Reader half of the level meter
#[derive(Clone)]
pub struct LevelMeter {
    level: Arc<AtomicU32>,
}

impl LevelMeter {
    /// Create a connected meter and the tap that feeds it
    pub fn with_tap(coefficient: f32) -> (Self, LevelTap) {
        let level = Arc::new(AtomicU32::new(0.0f32.to_bits()));
        let tap = LevelTap {
            level: Arc::clone(&level),
            coefficient: coefficient.clamp(0.0, 1.0),
        };
        (Self { level }, tap)
    }

    pub fn sample(&self) -> LoudnessReading {
        LoudnessReading::new(f32::from_bits(self.level.load(Ordering::Relaxed)))
    }

    /// Forget the level measured so far; the tap ramps up again from silence
    pub fn reset(&self) {
        self.level.store(0.0f32.to_bits(), Ordering::Relaxed);
    }
}

/// Writer half of the level meter, called from the input callback
#[derive(Clone)]
pub struct LevelTap {
    level: Arc<AtomicU32>,
    coefficient: f32,
}

impl LevelTap {
    pub fn process(&self, block: &[f32]) {
        let previous = f32::from_bits(self.level.load(Ordering::Relaxed));
        let next = smooth(previous, rms(block), self.coefficient);
        self.level.store(next.to_bits(), Ordering::Relaxed);
    }

    /// Drop back to silence, used when the input stream goes away
    pub fn reset(&self) {
        self.level.store(0.0f32.to_bits(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_without_input_reads_zero() {
        let (meter, _tap) = LevelMeter::with_tap(LEVEL_SMOOTHING);
        assert_eq!(meter.sample().normalized_level, 0.0);
    }

    #[test]
    fn reset_meter_reads_silence_until_fed_again() {
        let (meter, tap) = LevelMeter::with_tap(LEVEL_SMOOTHING);
        for _ in 0..50 {
            tap.process(&[0.5; 64]);
        }
        meter.reset();
        assert_eq!(meter.sample().normalized_level, 0.0);
        tap.process(&[0.5; 64]);
        assert!((meter.sample().normalized_level - 0.05).abs() < 1e-6);
    }

    #[test]
    fn level_rises_gradually() {
        let (meter, tap) = LevelMeter::with_tap(LEVEL_SMOOTHING);
        let loud = vec![0.5f32; 256];

        tap.process(&loud);
        let first = meter.sample().normalized_level;
        assert!((first - 0.05).abs() < 1e-6);

        for _ in 0..100 {
            tap.process(&loud);
        }
        let settled = meter.sample().normalized_level;
        assert!(settled > first);
        assert!((settled - 0.5).abs() < 1e-3);
    }

    #[test]
    fn single_spike_does_not_cross_gate() {
        let (meter, tap) = LevelMeter::with_tap(LEVEL_SMOOTHING);
        tap.process(&[0.7; 64]);
        assert!(meter.sample().normalized_level <= 0.08);
    }

    #[test]
    fn reading_is_clamped() {
        let (meter, tap) = LevelMeter::with_tap(0.0);
        tap.process(&[4.0; 16]);
        assert_eq!(meter.sample().normalized_level, 1.0);
        tap.reset();
        assert_eq!(meter.sample().normalized_level, 0.0);
    }
}
