use std::fmt;

/// Reference pitch for A4 (MIDI note 69)
pub const A4_FREQUENCY: f32 = 440.0;
pub const A4_MIDI: i32 = 69;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Raised when a frequency can't be turned into a note
#[derive(Debug, Clone, PartialEq)]
pub enum MappingError {
    NotFinite,
    NotPositive(f32),
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingError::NotFinite => write!(f, "frequency is not a finite number"),
            MappingError::NotPositive(hz) => write!(f, "frequency must be positive, got {} Hz", hz),
        }
    }
}

impl std::error::Error for MappingError {}

/// A note derived from a detected frequency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicalEvent {
    pub note_name: String,
    pub midi_number: u8,
}

impl MusicalEvent {
    pub fn from_frequency(hertz: f32) -> Result<Self, MappingError> {
        let midi_number = to_midi(hertz)?;
        Ok(Self {
            note_name: midi_to_note_name(midi_number),
            midi_number,
        })
    }
}

fn check_frequency(hertz: f32) -> Result<f32, MappingError> {
    if !hertz.is_finite() {
        return Err(MappingError::NotFinite);
    }
    if hertz <= 0.0 {
        return Err(MappingError::NotPositive(hertz));
    }
    Ok(hertz)
}

/// Convert a frequency in Hz to the nearest MIDI note number, clamped to 0..=127
pub fn to_midi(hertz: f32) -> Result<u8, MappingError> {
    let hertz = check_frequency(hertz)?;
    // f64 keeps exact semitone frequencies from rounding the wrong way
    let semitones = 12.0 * (hertz as f64 / A4_FREQUENCY as f64).log2();
    let note = (A4_MIDI as f64 + semitones).round();
    Ok(note.clamp(0.0, 127.0) as u8)
}

/// Convert a frequency in Hz to a note name in scientific pitch notation, e.g. "A4"
pub fn to_note_name(hertz: f32) -> Result<String, MappingError> {
    to_midi(hertz).map(midi_to_note_name)
}

/// Name of a MIDI note, C4 = 60
pub fn midi_to_note_name(midi_number: u8) -> String {
    let octave = (midi_number / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(midi_number % 12) as usize], octave)
}

/// Convert MIDI note number to frequency in Hz
pub fn midi_to_freq(midi_number: u8) -> f32 {
    A4_FREQUENCY * 2.0f32.powf((midi_number as f32 - A4_MIDI as f32) / 12.0)
}
