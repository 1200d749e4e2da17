//! Pitch estimation loop.
//!
//! The estimator runs one cycle at a time: the driver produces a single
//! estimate, hands it to the controller, and waits until the controller
//! re-arms it before starting the next. Every loop instance carries a
//! [`Generation`]; estimates from a generation that is no longer current are
//! dropped without side effects.

mod mcleod;
mod worker;

use std::fmt;

use log::debug;

pub use mcleod::McLeodModel;
pub use worker::{ModelFactory, ThreadedDriver};

/// Identifies one run of the pitch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PitchError {
    /// The model could not find a fundamental in the window
    NoPitch,
}

impl fmt::Display for PitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PitchError::NoPitch => write!(f, "no pitch detected"),
        }
    }
}

impl std::error::Error for PitchError {}

/// Output of one model invocation
pub type EstimateResult = Result<f32, PitchError>;

/// A frequency estimation model: one window in, one frequency out.
/// Models need not be `Send`; each loop builds its own on the worker thread.
pub trait PitchModel {
    fn estimate(&mut self, window: &[f32], sample_rate: u32) -> EstimateResult;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyEstimate {
    pub hertz: f32,
    pub valid: bool,
}

impl FrequencyEstimate {
    pub fn none() -> Self {
        Self { hertz: 0.0, valid: false }
    }

    pub fn detected(hertz: f32) -> Self {
        if hertz.is_finite() && hertz > 0.0 {
            Self { hertz, valid: true }
        } else {
            Self::none()
        }
    }
}

impl From<&EstimateResult> for FrequencyEstimate {
    fn from(result: &EstimateResult) -> Self {
        match result {
            Ok(hertz) => FrequencyEstimate::detected(*hertz),
            Err(_) => FrequencyEstimate::none(),
        }
    }
}

/// Runs estimation cycles on behalf of [`PitchEstimator`]
pub trait EstimateDriver {
    /// Begin a new loop; the first estimate is produced without waiting
    fn start(&mut self, generation: Generation);
    /// Allow the loop to produce its next estimate
    fn advance(&mut self, generation: Generation);
    /// End the loop; nothing it produces afterwards may be acted on
    fn stop(&mut self, generation: Generation);
}

pub struct PitchEstimator<D: EstimateDriver> {
    driver: D,
    next_generation: u64,
    current: Option<Generation>,
    stale_dropped: u64,
}

impl<D: EstimateDriver> PitchEstimator<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            next_generation: 1,
            current: None,
            stale_dropped: 0,
        }
    }

    /// Start a fresh loop, replacing any running one
    pub fn start_loop(&mut self) -> Generation {
        self.stop_loop();
        let generation = Generation(self.next_generation);
        self.next_generation += 1;
        self.current = Some(generation);
        self.driver.start(generation);
        generation
    }

    pub fn stop_loop(&mut self) {
        if let Some(generation) = self.current.take() {
            self.driver.stop(generation);
        }
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    /// Check an incoming estimate's generation. Stale ones are counted and rejected.
    pub fn accept(&mut self, generation: Generation) -> bool {
        if self.current == Some(generation) {
            true
        } else {
            self.stale_dropped += 1;
            debug!("dropping estimate from stale pitch loop {}", generation);
            false
        }
    }

    /// Request the next cycle once the current estimate has been handled
    pub fn rearm(&mut self, generation: Generation) {
        if self.current == Some(generation) {
            self.driver.advance(generation);
        }
    }

    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }

    #[cfg(test)]
    pub fn driver(&self) -> &D {
        &self.driver
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{DriverCall, ManualDriver};
    use super::*;

    #[test]
    fn generations_increase_and_old_ones_go_stale() {
        let mut estimator = PitchEstimator::new(ManualDriver::default());
        let first = estimator.start_loop();
        let second = estimator.start_loop();
        assert!(second > first);
        assert!(!estimator.accept(first));
        assert!(estimator.accept(second));
        assert_eq!(estimator.stale_dropped(), 1);
        assert_eq!(
            estimator.driver().calls,
            vec![DriverCall::Start(first), DriverCall::Stop(first), DriverCall::Start(second)]
        );
    }

    #[test]
    fn stopped_loop_is_never_rearmed() {
        let mut estimator = PitchEstimator::new(ManualDriver::default());
        let generation = estimator.start_loop();
        estimator.rearm(generation);
        estimator.stop_loop();
        estimator.rearm(generation);
        assert!(!estimator.accept(generation));
        assert!(!estimator.is_running());
        assert_eq!(
            estimator.driver().calls,
            vec![
                DriverCall::Start(generation),
                DriverCall::Advance(generation),
                DriverCall::Stop(generation),
            ]
        );
    }

    #[test]
    fn invalid_results_become_invalid_estimates() {
        let results: [EstimateResult; 3] = [Err(PitchError::NoPitch), Ok(f32::NAN), Ok(-1.0)];
        for result in &results {
            assert!(!FrequencyEstimate::from(result).valid);
        }
        let a4: EstimateResult = Ok(440.0);
        let ok = FrequencyEstimate::from(&a4);
        assert!(ok.valid);
        assert_eq!(ok.hertz, 440.0);
    }
}
