//! ADSR envelope generator.

/// Attack-Decay-Sustain-Release envelope.
///
/// Times are in seconds and relative to the end of the previous stage.
/// `sustain` is a level (0.0–1.0); the sustain stage length is supplied per
/// note because it depends on the note duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Envelope {
    /// Amplitude at time `t` for a note holding its sustain level for `sustain_len` seconds.
    #[inline]
    pub fn amplitude(&self, sustain_len: f32, t: f32) -> f32 {
        envelope(
            self.attack,
            self.decay,
            self.sustain,
            sustain_len,
            self.release,
            t,
        )
    }

    /// Sustain length that makes the whole envelope span `note_len` seconds.
    pub fn sustain_len(&self, note_len: f32) -> f32 {
        note_len - self.attack - self.decay - self.release
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            attack: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release: 0.0,
        }
    }
}

/// Piecewise-linear envelope.
///
/// - `t < 0`: 0.
/// - `[0, attack)`: ramp 0 → 1.
/// - next `decay` seconds: ramp 1 → `sustain_lvl`.
/// - next `sustain_len` seconds: `sustain_lvl`.
/// - next `release` seconds: ramp `sustain_lvl` → 0.
/// - afterwards: 0.
#[inline]
pub fn envelope(
    attack: f32,
    decay: f32,
    sustain_lvl: f32,
    sustain_len: f32,
    release: f32,
    t: f32,
) -> f32 {
    if t < 0.0 {
        return 0.0;
    }
    if t < attack {
        return t / attack;
    }
    let t = t - attack;
    if t < decay {
        return sustain_lvl + (1.0 - sustain_lvl) * (1.0 - t / decay);
    }
    let t = t - decay;
    if t < sustain_len {
        return sustain_lvl;
    }
    let t = t - sustain_len.max(0.0);
    if t < release {
        return sustain_lvl * (1.0 - t / release);
    }
    0.0
}
