use pitch_detection::detector::mcleod::McLeodDetector;
use pitch_detection::detector::PitchDetector;

use super::{EstimateResult, PitchError, PitchModel};

/// McLeod pitch method via the `pitch-detection` crate
pub struct McLeodModel {
    detector: McLeodDetector<f32>,
    window_size: usize,
    power_threshold: f32,
    clarity_threshold: f32,
}

impl McLeodModel {
    pub fn new(window_size: usize, power_threshold: f32, clarity_threshold: f32) -> Self {
        Self {
            detector: McLeodDetector::new(window_size, window_size / 2),
            window_size,
            power_threshold,
            clarity_threshold,
        }
    }
}

impl PitchModel for McLeodModel {
    fn estimate(&mut self, window: &[f32], sample_rate: u32) -> EstimateResult {
        if window.len() != self.window_size {
            return Err(PitchError::NoPitch);
        }
        self.detector
            .get_pitch(window, sample_rate as usize, self.power_threshold, self.clarity_threshold)
            .map(|pitch| pitch.frequency)
            .ok_or(PitchError::NoPitch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44100;
    const SIZE: usize = 2048;

    fn sine(frequency: f32, amplitude: f32) -> Vec<f32> {
        (0..SIZE)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
            })
            .collect()
    }

    #[test]
    fn finds_concert_a() {
        let mut model = McLeodModel::new(SIZE, 0.1, 0.7);
        let hz = model.estimate(&sine(440.0, 0.5), SAMPLE_RATE).unwrap();
        assert!((hz - 440.0).abs() < 2.0, "detected {}", hz);
    }

    #[test]
    fn silence_has_no_pitch() {
        let mut model = McLeodModel::new(SIZE, 0.1, 0.7);
        assert_eq!(model.estimate(&vec![0.0; SIZE], SAMPLE_RATE), Err(PitchError::NoPitch));
    }

    #[test]
    fn wrong_window_length_has_no_pitch() {
        let mut model = McLeodModel::new(SIZE, 0.1, 0.7);
        assert_eq!(model.estimate(&sine(440.0, 0.5)[..100], SAMPLE_RATE), Err(PitchError::NoPitch));
    }

    #[test]
    fn runs_inside_the_threaded_loop() {
        use crate::core::analyzer::SampleRing;
        use crate::core::pitch::{EstimateDriver, Generation, ModelFactory, ThreadedDriver};
        use crate::messaging::ControlMessage;
        use std::sync::Arc;
        use std::time::Duration;

        let ring = SampleRing::new(SIZE);
        ring.set_sample_rate(SAMPLE_RATE);
        let (tx, rx) = crossbeam_channel::unbounded();
        let factory: ModelFactory = Arc::new(|| Box::new(McLeodModel::new(SIZE, 0.1, 0.7)) as Box<dyn PitchModel>);
        let mut driver = ThreadedDriver::new(ring.clone(), tx, factory, SIZE, SIZE / 2);

        driver.start(Generation(1));
        ring.push(&sine(440.0, 0.5));

        match rx.recv_timeout(Duration::from_secs(5)).expect("estimate") {
            ControlMessage::Estimate { generation, result } => {
                assert_eq!(generation, Generation(1));
                let hz = result.unwrap();
                assert!((hz - 440.0).abs() < 2.0, "detected {}", hz);
            },
            other => panic!("unexpected message {:?}", other),
        }
    }
}
