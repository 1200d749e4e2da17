mod envelope;
mod waveform;

pub use self::envelope::{Envelope, EnvelopeState};
pub use self::waveform::Waveform;
