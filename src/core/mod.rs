pub mod analyzer;
pub mod gate;
pub mod midi;
pub mod mode;
pub mod oscillator;
pub mod pitch;
pub mod session;
pub mod synth;

pub use mode::{ModeController, OperatingMode};
