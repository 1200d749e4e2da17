mod mapping;
mod output;

pub use mapping::{midi_to_freq, midi_to_note_name, to_midi, to_note_name, MusicalEvent};
pub use output::{MidiMirror, MidiOutputHandler};
