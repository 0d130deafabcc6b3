//! Note-name shape checking and note→MIDI pitch conversion.
//!
//! A pattern token is a note if and only if it matches `[A-Ga-g][#b]?[0-8]`;
//! anything else lexed in token position is a named (percussion/instrument)
//! trigger. C4 is MIDI 60, matching standard tracker convention.

/// True if `text` has the shape of a note name (`C4`, `F#3`, `Bb2`, ...).
pub fn looks_like_note(text: &str) -> bool {
    note_to_midi(text).is_some()
}

/// Convert a note name to a MIDI pitch number, or `None` if `text` isn't
/// shaped like a note.
pub fn note_to_midi(text: &str) -> Option<i32> {
    let mut chars = text.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let semitone = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest: String = chars.collect();
    let mut rest = rest.as_str();
    let mut accidental = 0i32;
    if let Some(stripped) = rest.strip_prefix('#') {
        accidental = 1;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('b') {
        accidental = -1;
        rest = stripped;
    }

    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let octave: i32 = rest.parse().ok()?;
    if !(0..=8).contains(&octave) {
        return None;
    }

    Some((octave + 1) * 12 + semitone + accidental)
}

/// Transpose a MIDI pitch by `semitones`, clamping to the valid MIDI range.
pub fn transpose_midi(pitch: i32, semitones: i32) -> i32 {
    (pitch + semitones).clamp(0, 127)
}

const SHARP_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Render a MIDI pitch back to a note name, always spelled with sharps.
pub fn midi_to_note(pitch: i32) -> String {
    let pitch = pitch.clamp(0, 127);
    let octave = pitch / 12 - 1;
    let name = SHARP_NAMES[(pitch % 12) as usize];
    format!("{name}{octave}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_plain_notes() {
        assert!(looks_like_note("C4"));
        assert!(looks_like_note("g0"));
        assert!(looks_like_note("F#3"));
        assert!(looks_like_note("Bb2"));
    }

    #[test]
    fn rejects_named_triggers() {
        assert!(!looks_like_note("kick"));
        assert!(!looks_like_note("H"));
        assert!(!looks_like_note("C9"));
        assert!(!looks_like_note("C"));
    }

    #[test]
    fn c4_is_midi_60() {
        assert_eq!(note_to_midi("C4"), Some(60));
    }

    #[test]
    fn sharps_and_flats_are_enharmonic() {
        assert_eq!(note_to_midi("C#4"), Some(61));
        assert_eq!(note_to_midi("Db4"), Some(61));
    }

    #[test]
    fn round_trips_through_sharp_spelling() {
        assert_eq!(midi_to_note(60), "C4");
        assert_eq!(midi_to_note(61), "C#4");
        assert_eq!(midi_to_note(note_to_midi("Bb2").unwrap()), "A#2");
    }
}
