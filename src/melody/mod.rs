//! Melody sequencer: walks melody text note by note and renders PCM chunks.

pub mod lexer;
pub mod note;

pub use lexer::{Lexer, NoteLength, ParamSet, SyntaxError, Token};
pub use note::note_to_freq;

use crate::synth::{Envelope, OscState, Waveform};

/// Default tempo in beats per minute.
const DEFAULT_BPM: f32 = 72.0;

/// Instrument parameters currently in effect for a melody.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instrument {
    pub waveform: Waveform,
    pub envelope: Envelope,
    pub gain: f32,
    /// Length of four beats in seconds.
    pub beat_len: f32,
}

impl Instrument {
    /// Overwrite every parameter present in `set`.
    pub fn apply(&mut self, set: &ParamSet) {
        if let Some(w) = set.waveform {
            self.waveform = w;
        }
        if let Some(a) = set.attack {
            self.envelope.attack = a;
        }
        if let Some(d) = set.decay {
            self.envelope.decay = d;
        }
        if let Some(s) = set.sustain {
            self.envelope.sustain = s;
        }
        if let Some(r) = set.release {
            self.envelope.release = r;
        }
        if let Some(g) = set.gain {
            self.gain = g;
        }
        match set.bpm {
            Some(bpm) if bpm > 0.0 => self.beat_len = beat_len(bpm),
            Some(bpm) => log::warn!("ignoring non-positive tempo {bpm}"),
            None => {}
        }
    }
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            waveform: Waveform::Square,
            envelope: Envelope::default(),
            gain: 1.0,
            beat_len: beat_len(DEFAULT_BPM),
        }
    }
}

/// Length of four beats in seconds at `bpm`.
pub fn beat_len(bpm: f32) -> f32 {
    4.0 * 60.0 / bpm
}

/// Sequencer state for one playing melody.
///
/// Owns its copy of the text; the cursor is a byte offset into it.
#[derive(Debug, Clone)]
pub struct Melody {
    text: String,
    cursor: usize,
    instrument: Instrument,
    note_freq: f32,
    note_len: f32,
    note_frames: u32,
    elapsed: u32,
    osc: OscState,
}

impl Melody {
    pub fn new(text: impl Into<String>, seed: u64) -> Self {
        Self {
            text: text.into(),
            cursor: 0,
            instrument: Instrument::default(),
            note_freq: 0.0,
            note_len: 0.0,
            note_frames: 0,
            elapsed: 0,
            osc: OscState::new(seed),
        }
    }

    /// The melody text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Instrument parameters in effect.
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Whether a note is still sounding or unread text remains.
    pub fn is_playing(&self) -> bool {
        self.elapsed < self.note_frames || !Lexer::resume(&self.text, self.cursor).is_exhausted()
    }

    /// Fill `out` with exactly `out.len()` mono samples, reading further notes
    /// as needed and padding with silence once the text runs out.
    pub fn render_chunk(&mut self, sample_rate: u32, out: &mut [f32]) {
        let sr = sample_rate as f32;
        let mut written = 0;

        while written < out.len() {
            if self.elapsed >= self.note_frames {
                if !self.advance(sample_rate) {
                    out[written..].fill(0.0);
                    return;
                }
                continue;
            }

            let n = ((self.note_frames - self.elapsed) as usize).min(out.len() - written);
            let inst = self.instrument;
            let sustain_len = inst.envelope.sustain_len(self.note_len);
            let phase_step = self.note_freq as f64 / sample_rate as f64;

            for (i, sample) in out[written..written + n].iter_mut().enumerate() {
                let frame = self.elapsed + i as u32;
                *sample = if self.note_freq == 0.0 {
                    0.0
                } else {
                    let t = frame as f32 / sr;
                    let wave = inst.waveform.sample(
                        phase_step * frame as f64,
                        inst.waveform.default_timbre(),
                        &mut self.osc,
                        sample_rate,
                    );
                    wave * inst.envelope.amplitude(sustain_len, t) * inst.gain
                };
            }

            self.elapsed += n as u32;
            written += n;
        }
    }

    /// Read tokens up to the next note or rest. Returns `false` once the melody is over.
    fn advance(&mut self, sample_rate: u32) -> bool {
        let mut lexer = Lexer::resume(&self.text, self.cursor);
        let token = loop {
            match lexer.next_token() {
                Ok(Token::Params(set)) => self.instrument.apply(&set),
                Ok(token) => break token,
                Err(e) => {
                    log::warn!("melody stopped: {e}");
                    break Token::End;
                }
            }
        };
        self.cursor = lexer.position();

        let (freq, length) = match token {
            Token::Note { freq, length } => (freq, length),
            Token::Rest { length } => (0.0, length),
            Token::Params(_) | Token::End => {
                self.cursor = self.text.len();
                return false;
            }
        };

        self.note_freq = freq;
        self.note_len = length.seconds(self.instrument.beat_len);
        self.note_frames = (self.note_len * sample_rate as f32).round() as u32;
        self.elapsed = 0;
        true
    }
}
