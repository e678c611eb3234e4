//! Oscillator bank: waveform generation for procedural tones and melodies.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Reference rate the noise hold windows are expressed against.
const NOISE_REFERENCE_HZ: f32 = 20_000.0;

/// Smallest timbre accepted by the noise generators.
const MIN_NOISE_TIMBRE: f32 = 1.0e-3;

/// Available waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    /// Silence.
    #[default]
    None,
    Sine,
    Triangle,
    Square,
    Sawtooth,
    /// Sample-and-hold noise, interpolated across the hold window.
    Noise,
    /// Random-length runs of ±1.
    BinaryNoise,
}

/// Per-voice state, mutated only by the noise family.
#[derive(Debug, Clone)]
pub struct OscState {
    current: f32,
    previous: f32,
    hold_len: u32,
    hold_left: u32,
    rng: ChaCha8Rng,
}

impl OscState {
    pub fn new(seed: u64) -> Self {
        Self {
            current: 0.0,
            previous: 0.0,
            hold_len: 0,
            hold_left: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Reset the hold counters and reseed, keeping the allocation-free layout.
    pub fn reset(&mut self, seed: u64) {
        *self = Self::new(seed);
    }
}

impl Default for OscState {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Waveform {
    /// Timbre used when the caller does not pick one.
    pub fn default_timbre(self) -> f32 {
        match self {
            Waveform::Square | Waveform::Triangle => 0.5,
            _ => 1.0,
        }
    }

    /// Generate one sample in `[-1.0, 1.0]`.
    ///
    /// `phase` counts cycles (only its fractional part matters for periodic
    /// shapes). `timbre` is the duty cycle for square, the ramp symmetry for
    /// triangle/sawtooth, the power-curve exponent for sine and the hold rate
    /// for the noise family. `sample_rate` is only read by the noise family.
    pub fn sample(self, phase: f64, timbre: f32, state: &mut OscState, sample_rate: u32) -> f32 {
        match self {
            Waveform::None => 0.0,
            Waveform::Sine => {
                let s = (2.0 * PI * phase).sin() as f32;
                if timbre < 1.0 {
                    s.signum() * s.abs().powf(timbre)
                } else {
                    s
                }
            }
            Waveform::Square => {
                if fract(phase) < timbre as f64 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle | Waveform::Sawtooth => ramp(fract(phase), timbre as f64) as f32,
            Waveform::Noise => noise(state, timbre, sample_rate),
            Waveform::BinaryNoise => binary_noise(state, timbre, sample_rate),
        }
    }

    /// Whether the generator reads or writes [`OscState`].
    pub fn is_stateful(self) -> bool {
        matches!(self, Waveform::Noise | Waveform::BinaryNoise)
    }
}

fn fract(phase: f64) -> f64 {
    phase - phase.floor()
}

/// Piecewise-linear ramp: rises from -1 to 1 over `[0, peak)`, falls back over `[peak, 1)`.
fn ramp(x: f64, peak: f64) -> f64 {
    let peak = peak.clamp(0.0, 1.0);
    if x < peak {
        -1.0 + 2.0 * x / peak
    } else if peak >= 1.0 {
        1.0
    } else {
        1.0 - 2.0 * (x - peak) / (1.0 - peak)
    }
}

fn noise(state: &mut OscState, timbre: f32, sample_rate: u32) -> f32 {
    if state.hold_left == 0 {
        let timbre = timbre.max(MIN_NOISE_TIMBRE);
        state.hold_len = ((sample_rate as f32 / NOISE_REFERENCE_HZ / timbre).ceil() as u32).max(1);
        state.hold_left = state.hold_len;
        state.previous = state.current;
        state.current = state.rng.gen_range(-1.0..=1.0);
    }
    let progress = 1.0 - state.hold_left as f32 / state.hold_len as f32;
    state.hold_left -= 1;
    state.previous + (state.current - state.previous) * progress
}

fn binary_noise(state: &mut OscState, timbre: f32, sample_rate: u32) -> f32 {
    if state.hold_left == 0 {
        let timbre = timbre.max(MIN_NOISE_TIMBRE);
        let max_hold = sample_rate as f32 / (timbre * NOISE_REFERENCE_HZ);
        let hold: f32 = state.rng.gen_range(0.0..=max_hold);
        state.hold_len = (hold.ceil() as u32).max(1);
        state.hold_left = state.hold_len;
        state.current = if state.current > 0.0 { -1.0 } else { 1.0 };
    }
    state.hold_left -= 1;
    state.current
}

/// Error returned when a waveform name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown waveform: {0}")]
pub struct ParseWaveformError(String);

impl FromStr for Waveform {
    type Err = ParseWaveformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "silence" => Ok(Waveform::None),
            "sine" | "sin" => Ok(Waveform::Sine),
            "triangle" | "tri" => Ok(Waveform::Triangle),
            "square" | "sqr" => Ok(Waveform::Square),
            "sawtooth" | "saw" => Ok(Waveform::Sawtooth),
            "noise" | "noi" => Ok(Waveform::Noise),
            "binary-noise" | "bin" => Ok(Waveform::BinaryNoise),
            _ => Err(ParseWaveformError(s.to_string())),
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Waveform::None => "none",
            Waveform::Sine => "sine",
            Waveform::Triangle => "triangle",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Noise => "noise",
            Waveform::BinaryNoise => "binary-noise",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44100;

    fn at(wf: Waveform, phase: f64) -> f32 {
        wf.sample(phase, wf.default_timbre(), &mut OscState::default(), SR)
    }

    #[test]
    fn sine_at_zero() {
        assert!(at(Waveform::Sine, 0.0).abs() < 1e-6);
    }

    #[test]
    fn sine_at_quarter() {
        assert!((at(Waveform::Sine, 0.25) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sine_shaping_pushes_towards_square() {
        let mut state = OscState::default();
        let plain = Waveform::Sine.sample(0.05, 1.0, &mut state, SR);
        let shaped = Waveform::Sine.sample(0.05, 0.25, &mut state, SR);
        assert!(shaped > plain);
        assert!(shaped <= 1.0);
    }

    #[test]
    fn square_uses_duty_cycle() {
        let mut state = OscState::default();
        assert_eq!(Waveform::Square.sample(0.2, 0.25, &mut state, SR), 1.0);
        assert_eq!(Waveform::Square.sample(0.3, 0.25, &mut state, SR), -1.0);
        assert_eq!(Waveform::Square.sample(1.2, 0.25, &mut state, SR), 1.0);
    }

    #[test]
    fn square_halves() {
        assert_eq!(at(Waveform::Square, 0.25), 1.0);
        assert_eq!(at(Waveform::Square, 0.75), -1.0);
    }

    #[test]
    fn sawtooth_full_timbre_is_rising_ramp() {
        assert!((at(Waveform::Sawtooth, 0.0) + 1.0).abs() < 1e-6);
        assert!(at(Waveform::Sawtooth, 0.5).abs() < 1e-6);
        assert!((at(Waveform::Sawtooth, 0.999) - 1.0).abs() < 0.01);
    }

    #[test]
    fn triangle_peaks_mid_cycle() {
        assert!((at(Waveform::Triangle, 0.0) + 1.0).abs() < 1e-6);
        assert!(at(Waveform::Triangle, 0.25).abs() < 1e-6);
        assert!((at(Waveform::Triangle, 0.5) - 1.0).abs() < 1e-6);
        assert!(at(Waveform::Triangle, 0.75).abs() < 1e-6);
    }

    #[test]
    fn sawtooth_with_half_timbre_matches_triangle() {
        let mut state = OscState::default();
        for i in 0..100 {
            let phase = i as f64 / 100.0;
            let saw = Waveform::Sawtooth.sample(phase, 0.5, &mut state, SR);
            let tri = Waveform::Triangle.sample(phase, 0.5, &mut state, SR);
            assert_eq!(saw, tri);
        }
    }

    #[test]
    fn none_is_silent() {
        assert_eq!(at(Waveform::None, 0.3), 0.0);
    }

    #[test]
    fn periodic_waveforms_bounded() {
        for wf in [
            Waveform::Sine,
            Waveform::Triangle,
            Waveform::Square,
            Waveform::Sawtooth,
        ] {
            for i in 0..1000 {
                let phase = i as f64 / 250.0;
                let v = at(wf, phase);
                assert!(
                    (-1.0..=1.0).contains(&v),
                    "{wf:?} at phase {phase}: {v} out of bounds"
                );
            }
        }
    }

    #[test]
    fn noise_holds_and_interpolates() {
        // 44100 / 20000 / 0.1 -> hold window of 23 frames.
        let mut state = OscState::new(7);
        let values: Vec<f32> = (0..23)
            .map(|_| Waveform::Noise.sample(0.0, 0.1, &mut state, SR))
            .collect();
        assert_eq!(state.hold_len, 23);
        // First window ramps from 0 towards the first random target.
        assert_eq!(values[0], 0.0);
        let target = state.current;
        for pair in values.windows(2) {
            let step = pair[1] - pair[0];
            assert!((step - target / 23.0).abs() < 1e-5);
        }
    }

    #[test]
    fn noise_bounded_and_deterministic() {
        let mut a = OscState::new(42);
        let mut b = OscState::new(42);
        for _ in 0..5000 {
            let va = Waveform::Noise.sample(0.0, 1.0, &mut a, SR);
            let vb = Waveform::Noise.sample(0.0, 1.0, &mut b, SR);
            assert_eq!(va, vb);
            assert!((-1.0..=1.0).contains(&va));
        }
    }

    #[test]
    fn binary_noise_flips_between_extremes() {
        let mut state = OscState::new(3);
        let mut seen_pos = false;
        let mut seen_neg = false;
        for _ in 0..2000 {
            let v = Waveform::BinaryNoise.sample(0.0, 0.5, &mut state, SR);
            assert!(v == 1.0 || v == -1.0);
            seen_pos |= v > 0.0;
            seen_neg |= v < 0.0;
        }
        assert!(seen_pos && seen_neg);
    }

    #[test]
    fn binary_noise_hold_within_bound() {
        let mut state = OscState::new(11);
        // 44100 / (1.0 * 20000) -> at most 3 frames per run.
        let mut run = 0;
        let mut last = Waveform::BinaryNoise.sample(0.0, 1.0, &mut state, SR);
        for _ in 0..5000 {
            let v = Waveform::BinaryNoise.sample(0.0, 1.0, &mut state, SR);
            if v == last {
                run += 1;
            } else {
                assert!(run < 3, "run of {} frames", run + 1);
                run = 0;
            }
            last = v;
        }
    }

    #[test]
    fn default_timbres() {
        assert_eq!(Waveform::Square.default_timbre(), 0.5);
        assert_eq!(Waveform::Triangle.default_timbre(), 0.5);
        assert_eq!(Waveform::Sine.default_timbre(), 1.0);
        assert_eq!(Waveform::Noise.default_timbre(), 1.0);
    }

    #[test]
    fn parse_names() {
        assert_eq!("sin".parse::<Waveform>().unwrap(), Waveform::Sine);
        assert_eq!("Triangle".parse::<Waveform>().unwrap(), Waveform::Triangle);
        assert_eq!("bin".parse::<Waveform>().unwrap(), Waveform::BinaryNoise);
        assert!("organ".parse::<Waveform>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for wf in [
            Waveform::None,
            Waveform::Sine,
            Waveform::Triangle,
            Waveform::Square,
            Waveform::Sawtooth,
            Waveform::Noise,
            Waveform::BinaryNoise,
        ] {
            assert_eq!(wf.to_string().parse::<Waveform>().unwrap(), wf);
        }
    }
}
