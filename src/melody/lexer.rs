//! Tokenizer for the melody mini-language.
//!
//! ```text
//! {w:tri a:.025 d:.025 s:.25 r:.05 b:120} A3/12 C#4/12 E4/12 {s:.5 g:1.5} A4/4 -/8 E4*0.5
//! ```
//!
//! The lexer is a cursor over an immutable string. Every call to
//! [`Lexer::next_token`] yields one parameter block, note, rest or the end of
//! input; the caller stores [`Lexer::position`] to resume later. Tokenizing
//! never allocates.

use crate::synth::Waveform;

use super::note::note_to_freq;

/// How long a note lasts relative to the beat length (four beats).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteLength {
    /// `/n`: `beat_len / n`.
    Fraction(f32),
    /// `*n`: `beat_len * n`.
    Multiple(f32),
}

impl NoteLength {
    /// Duration in seconds for the given length of four beats.
    pub fn seconds(self, beat_len: f32) -> f32 {
        match self {
            NoteLength::Fraction(d) => beat_len / d,
            NoteLength::Multiple(m) => beat_len * m,
        }
    }
}

/// Instrument parameters set by one `{...}` block. Keys absent from the block stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParamSet {
    pub attack: Option<f32>,
    pub decay: Option<f32>,
    pub sustain: Option<f32>,
    pub release: Option<f32>,
    pub gain: Option<f32>,
    pub bpm: Option<f32>,
    pub waveform: Option<Waveform>,
}

/// One token of melody text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    Params(ParamSet),
    Note { freq: f32, length: NoteLength },
    Rest { length: NoteLength },
    End,
}

/// Unexpected input where a note, octave or duration operator was required.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    #[error("invalid note '{found}' at byte {pos}")]
    InvalidNote { found: char, pos: usize },
    #[error("invalid octave at byte {pos}")]
    InvalidOctave { pos: usize },
    #[error("missing duration operator at byte {pos}")]
    MissingDuration { pos: usize },
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::resume(source, 0)
    }

    /// Continue tokenizing `source` from byte offset `pos`.
    pub fn resume(source: &'a str, pos: usize) -> Self {
        Self {
            src: source.as_bytes(),
            pos: pos.min(source.len()),
        }
    }

    /// Byte offset of the next unread character.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether only separators remain.
    pub fn is_exhausted(&self) -> bool {
        self.src[self.pos..].iter().all(|&c| is_separator(c))
    }

    pub fn next_token(&mut self) -> Result<Token, SyntaxError> {
        loop {
            self.skip_separators();
            let Some(c) = self.peek() else {
                return Ok(Token::End);
            };

            if c == b'{' {
                self.pos += 1;
                return Ok(Token::Params(self.param_block()));
            }

            let start = self.pos;
            let letter = match c {
                b'-' => None,
                b'A'..=b'H' => Some(c as char),
                _ => {
                    return Err(SyntaxError::InvalidNote {
                        found: c as char,
                        pos: start,
                    })
                }
            };
            self.pos += 1;

            let mut accidental = ' ';
            let mut octave = 0;
            if letter.is_some() {
                if let Some(acc @ (b'#' | b'b')) = self.peek() {
                    accidental = acc as char;
                    self.pos += 1;
                }
                match self.peek() {
                    Some(d @ b'0'..=b'9') => {
                        octave = (d - b'0') as i32;
                        self.pos += 1;
                    }
                    _ => return Err(SyntaxError::InvalidOctave { pos: self.pos }),
                }
            }

            let fraction = match self.peek() {
                Some(b'/') => true,
                Some(b'*') => false,
                _ => return Err(SyntaxError::MissingDuration { pos: self.pos }),
            };
            self.pos += 1;

            let length = match self.scan_number() {
                Some(v) if v > 0.0 && fraction => NoteLength::Fraction(v),
                Some(v) if v > 0.0 => NoteLength::Multiple(v),
                _ => {
                    log::debug!("skipping zero-length note at byte {start}");
                    continue;
                }
            };

            return Ok(match letter {
                Some(l) => Token::Note {
                    freq: note_to_freq(l, accidental, octave),
                    length,
                },
                None => Token::Rest { length },
            });
        }
    }

    /// Read keys up to the closing brace (or end of input). Unknown characters are skipped.
    fn param_block(&mut self) -> ParamSet {
        let mut set = ParamSet::default();
        loop {
            self.skip_separators();
            let Some(c) = self.peek() else {
                break;
            };
            self.pos += 1;
            match c {
                b'}' => break,
                b'a' => set.attack = self.param_value().or(set.attack),
                b'b' => set.bpm = self.param_value().or(set.bpm),
                b'd' => set.decay = self.param_value().or(set.decay),
                b'g' => set.gain = self.param_value().or(set.gain),
                b'r' => set.release = self.param_value().or(set.release),
                b's' => set.sustain = self.param_value().or(set.sustain),
                b'w' => {
                    self.skip_colon();
                    set.waveform = self.waveform_name().or(set.waveform);
                }
                _ => {}
            }
        }
        set
    }

    fn param_value(&mut self) -> Option<f32> {
        self.skip_colon();
        self.scan_number()
    }

    /// Match a three-letter waveform prefix, then drop the rest of the word.
    fn waveform_name(&mut self) -> Option<Waveform> {
        let src = self.src;
        let rest = &src[self.pos..];
        let waveform = match rest.get(..3) {
            Some(b"sin") => Some(Waveform::Sine),
            Some(b"tri") => Some(Waveform::Triangle),
            Some(b"sqr") => Some(Waveform::Square),
            Some(b"saw") => Some(Waveform::Sawtooth),
            Some(b"noi") => Some(Waveform::Noise),
            _ => None,
        };
        self.pos += rest.len().min(3);
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        waveform
    }

    /// Parse a decimal float prefix (sign, digits, fraction, exponent), skipping
    /// blanks first. Leaves the cursor untouched when no digits are found.
    fn scan_number(&mut self) -> Option<f32> {
        let src = self.src;
        let rest = &src[self.pos..];
        let digit_at = |i: usize| rest.get(i).is_some_and(|c| c.is_ascii_digit());

        let mut i = 0;
        while matches!(rest.get(i), Some(b' ' | b'\t')) {
            i += 1;
        }
        let start = i;
        if matches!(rest.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let mut digits = 0;
        while digit_at(i) {
            i += 1;
            digits += 1;
        }
        if rest.get(i) == Some(&b'.') {
            i += 1;
            while digit_at(i) {
                i += 1;
                digits += 1;
            }
        }
        if digits == 0 {
            return None;
        }
        if matches!(rest.get(i), Some(b'e' | b'E')) {
            let mut j = i + 1;
            if matches!(rest.get(j), Some(b'+' | b'-')) {
                j += 1;
            }
            if digit_at(j) {
                while digit_at(j) {
                    j += 1;
                }
                i = j;
            }
        }

        let value = std::str::from_utf8(&rest[start..i]).ok()?.parse().ok()?;
        self.pos += i;
        Some(value)
    }

    fn skip_colon(&mut self) {
        if self.peek() == Some(b':') {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while self.peek().is_some_and(is_separator) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }
}

fn is_separator(c: u8) -> bool {
    matches!(c, b' ' | b',' | b'\n' | b'\r' | b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Result<Token, SyntaxError>> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token();
            let done = matches!(tok, Ok(Token::End) | Err(_));
            out.push(tok);
            if done {
                break;
            }
        }
        out
    }

    fn note_freq(tok: &Result<Token, SyntaxError>) -> f32 {
        match tok {
            Ok(Token::Note { freq, .. }) => *freq,
            other => panic!("expected note, got {other:?}"),
        }
    }

    #[test]
    fn empty_is_end() {
        assert_eq!(tokens(""), vec![Ok(Token::End)]);
        assert_eq!(tokens(" ,\n\t"), vec![Ok(Token::End)]);
    }

    #[test]
    fn single_note_fraction() {
        let toks = tokens("A4/4");
        assert_eq!(toks.len(), 2);
        match toks[0] {
            Ok(Token::Note { freq, length }) => {
                assert!((freq - 440.0).abs() < 1e-3);
                assert_eq!(length, NoteLength::Fraction(4.0));
            }
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn multiplier_and_accidentals() {
        let toks = tokens("C#4*1.5 Eb3/8");
        match toks[0] {
            Ok(Token::Note { length, .. }) => assert_eq!(length, NoteLength::Multiple(1.5)),
            ref other => panic!("unexpected {other:?}"),
        }
        assert!((note_freq(&toks[0]) - 277.18).abs() < 0.01);
        assert!((note_freq(&toks[1]) - 155.56).abs() < 0.01);
    }

    #[test]
    fn rest_token() {
        assert_eq!(
            tokens("-/8")[0],
            Ok(Token::Rest {
                length: NoteLength::Fraction(8.0)
            })
        );
    }

    #[test]
    fn parameter_block() {
        let toks = tokens("{w:tri a:.025 d:.025 s:.25 r:.05 g:1.5 b:120} A3/12");
        let Ok(Token::Params(set)) = toks[0] else {
            panic!("expected params, got {:?}", toks[0]);
        };
        assert_eq!(set.waveform, Some(Waveform::Triangle));
        assert_eq!(set.attack, Some(0.025));
        assert_eq!(set.decay, Some(0.025));
        assert_eq!(set.sustain, Some(0.25));
        assert_eq!(set.release, Some(0.05));
        assert_eq!(set.gain, Some(1.5));
        assert_eq!(set.bpm, Some(120.0));
        assert!((note_freq(&toks[1]) - 220.0).abs() < 1e-3);
    }

    #[test]
    fn parameter_block_skips_unknown_and_full_words() {
        let toks = tokens("{x:3 w:sine q} A4/4");
        let Ok(Token::Params(set)) = toks[0] else {
            panic!("expected params");
        };
        assert_eq!(set.waveform, Some(Waveform::Sine));
        assert_eq!(set.attack, None);
        assert!(matches!(toks[1], Ok(Token::Note { .. })));
    }

    #[test]
    fn unterminated_block_ends_at_input_end() {
        let toks = tokens("{b:90");
        assert_eq!(
            toks,
            vec![
                Ok(Token::Params(ParamSet {
                    bpm: Some(90.0),
                    ..ParamSet::default()
                })),
                Ok(Token::End)
            ]
        );
    }

    #[test]
    fn key_without_value_is_absent() {
        let toks = tokens("{a: s:0.5}");
        let Ok(Token::Params(set)) = toks[0] else {
            panic!("expected params");
        };
        assert_eq!(set.attack, None);
        assert_eq!(set.sustain, Some(0.5));
    }

    #[test]
    fn invalid_note_letter() {
        let toks = tokens("A4/4 X4/4");
        assert_eq!(
            toks[1],
            Err(SyntaxError::InvalidNote { found: 'X', pos: 5 })
        );
    }

    #[test]
    fn invalid_octave() {
        assert_eq!(tokens("A/4")[0], Err(SyntaxError::InvalidOctave { pos: 1 }));
    }

    #[test]
    fn missing_duration() {
        assert_eq!(
            tokens("A4 B4/4")[0],
            Err(SyntaxError::MissingDuration { pos: 2 })
        );
    }

    #[test]
    fn zero_length_notes_are_skipped() {
        let toks = tokens("A4/0 B4/4");
        assert!((note_freq(&toks[0]) - note_to_freq('B', ' ', 4)).abs() < 1e-3);
    }

    #[test]
    fn resume_from_position() {
        let src = "A4/4 B4/4";
        let mut lexer = Lexer::new(src);
        lexer.next_token().unwrap();
        let pos = lexer.position();
        assert!(!lexer.is_exhausted());

        let mut resumed = Lexer::resume(src, pos);
        assert!((note_freq(&resumed.next_token()) - note_to_freq('B', ' ', 4)).abs() < 1e-3);
        assert!(resumed.is_exhausted());
        assert_eq!(resumed.next_token(), Ok(Token::End));
    }

    #[test]
    fn note_length_seconds() {
        assert_eq!(NoteLength::Fraction(4.0).seconds(2.0), 0.5);
        assert_eq!(NoteLength::Multiple(1.5).seconds(2.0), 3.0);
    }
}
