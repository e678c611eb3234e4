//! Note names to frequencies.

use crate::synth::transpose_freq;

/// Frequency of A0 in Hz.
const A0_HZ: f32 = 27.5;

/// Semitone offset of a note letter above A.
///
/// `H` is the German name for B. Unknown letters count as A.
pub fn semitones_above_a(letter: char) -> i32 {
    match letter {
        'B' | 'H' => 2,
        'C' => 3,
        'D' => 5,
        'E' => 7,
        'F' => 8,
        'G' => 10,
        _ => 0,
    }
}

/// Convert a note to Hz.
///
/// `accidental` is `'#'`, `'b'` or anything else for natural. Octaves start
/// at C, so letters above B belong to the octave below their A. A `'-'` note
/// is a rest and yields 0.
pub fn note_to_freq(letter: char, accidental: char, octave: i32) -> f32 {
    if letter == '-' {
        return 0.0;
    }
    let mut steps = semitones_above_a(letter);
    match accidental {
        'b' => steps -= 1,
        '#' => steps += 1,
        _ => {}
    }
    let octave = if steps > 2 { octave - 1 } else { octave };
    let base = A0_HZ * 2.0f32.powi(octave);
    transpose_freq(base, steps)
}
