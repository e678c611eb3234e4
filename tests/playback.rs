//! Integration tests for the control surface driving a headless engine.
//!
//! Every test renders through `Engine::render` exactly as the device
//! callback would. No audio hardware required.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use assert_approx_eq::assert_approx_eq;

use chiptrack::audio::mixer::clamp16;
use chiptrack::audio::{Engine, TrackId, CHANNELS};
use chiptrack::synth::Waveform;
use chiptrack::{EngineConfig, EngineError};

const SAMPLE_RATE: u32 = 44100;
const CHUNK: usize = 1024;

fn engine(tracks: usize) -> Engine {
    Engine::new(&EngineConfig {
        sample_rate: SAMPLE_RATE,
        tracks,
        chunk_size: CHUNK,
        seed: Some(42),
        ..EngineConfig::default()
    })
    .unwrap()
}

fn render_chunks(engine: &Engine, chunks: usize) -> Vec<i16> {
    let mut out = Vec::with_capacity(chunks * CHUNK * CHANNELS);
    let mut buf = vec![0i16; CHUNK * CHANNELS];
    for _ in 0..chunks {
        engine.render(&mut buf);
        out.extend_from_slice(&buf);
    }
    out
}

#[test]
fn melody_plays_half_a_second_at_120_bpm() {
    let e = engine(4);
    let track = e.melody("{b:120} A4/4", 1.0, 0.0).unwrap();

    // 22050 frames span parts of 22 chunks.
    let out = render_chunks(&e, 21);
    assert!(e.is_playing(track));
    assert!(out.iter().any(|&s| s != 0));

    // The chunk holding the last note frame frees the track.
    let tail = render_chunks(&e, 1);
    assert!(!e.is_playing(track));
    let note_end = (22050 - 21 * CHUNK) * CHANNELS;
    assert!(tail[note_end..].iter().all(|&s| s == 0));
}

#[test]
fn melody_track_is_reused_after_it_ends() {
    let e = engine(1);
    let first = e.melody("{b:240} C5/16", 0.5, 0.0).unwrap();
    assert_eq!(e.melody("A4/4", 0.5, 0.0), Err(EngineError::NoFreeTrack));
    render_chunks(&e, 4);
    assert!(!e.is_playing(first));
    assert_eq!(e.melody("A4/4", 0.5, 0.0).unwrap(), first);
}

#[test]
fn bad_melody_text_ends_early_without_error() {
    let e = engine(1);
    let track = e.melody("{b:120} A4/64 Q9", 1.0, 0.0).unwrap();
    render_chunks(&e, 3);
    assert!(!e.is_playing(track));
}

#[test]
fn upload_then_replay_round_trip() {
    let e = engine(2);
    for channels in [1usize, 2] {
        let frames = 300;
        let handle = e.upload(vec![0.1; frames * channels], channels, 0).unwrap();
        let track = e.replay(handle, 1.0, 0.0, 0.0).unwrap();
        let info = e.track_info(track).unwrap();
        assert_eq!(info.frame_count, frames);
        assert_eq!(info.channels, channels);
        e.stop(track).unwrap();
        e.release(handle).unwrap();
    }
}

#[test]
fn wav_upload_skips_leading_silence() {
    let mut buf = Cursor::new(Vec::new());
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::new(&mut buf, spec).unwrap();
    for s in [0i16, 0, 0, 0, 8192, 8192, 8192, 8192] {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
    buf.set_position(0);

    let e = engine(1);
    let handle = e.upload_wav(buf).unwrap();
    let track = e.replay(handle, 1.0, 0.0, 0.0).unwrap();
    let info = e.track_info(track).unwrap();
    assert_eq!(info.position, 4.0);
    assert_eq!(info.frame_count, 8);
}

#[test]
fn track_reuse_prefers_lowest_free_slot() {
    let e = engine(3);
    let a = e.sound(Waveform::Sine, 440.0, 1.0, 0.5, 0.0).unwrap();
    let b = e.sound(Waveform::Sine, 440.0, 1.0, 0.5, 0.0).unwrap();
    let c = e.sound(Waveform::Sine, 440.0, 1.0, 0.5, 0.0).unwrap();
    assert_eq!((a, b, c), (TrackId(0), TrackId(1), TrackId(2)));

    e.stop(b).unwrap();
    assert_eq!(e.sound(Waveform::Sine, 220.0, 1.0, 0.5, 0.0).unwrap(), b);
}

#[test]
fn mixing_two_buffers_is_linear() {
    let e = engine(2);
    let x = 0.2f32;
    let y = 0.3f32;
    // Balance 0 puts 0.6 of the volume on each side; compensate to reach unity.
    e.play(vec![x; 64], 1, 1.0 / 0.6, 0.0, 0.0).unwrap();
    e.play(vec![y; 64], 1, 1.0 / 0.6, 0.0, 0.0).unwrap();
    let out = render_chunks(&e, 1);
    let expected = clamp16(32767.0 * (x + y));
    assert!((out[0] as i32 - expected as i32).abs() <= 1);
    assert!((out[1] as i32 - expected as i32).abs() <= 1);
    assert_eq!(out[64 * CHANNELS], 0);
}

#[test]
fn fade_out_over_tenth_of_a_second() {
    let e = engine(1);
    let track = e.sound(Waveform::Square, 440.0, 1.0, 1.0, 0.0).unwrap();
    e.fade_out(track, 0.1).unwrap();
    let info = e.track_info(track).unwrap();
    assert_approx_eq!(info.volume_delta[0], -info.volume[0] / 4410.0);

    let mut buf = vec![0i16; 4410 * CHANNELS];
    e.render(&mut buf);
    let after = e.track_info(track).unwrap();
    assert!(after.volume[0].abs() < 1e-4);
    assert!(after.volume[1].abs() < 1e-4);
}

#[test]
fn streaming_drains_in_push_order() {
    let e = engine(1);
    let track = e.queue(1, 1.0 / 0.6, 0.0, 0.0).unwrap();
    assert_eq!(e.push(track, vec![0.25; 512]).unwrap(), 512);
    assert_eq!(e.push(track, vec![0.5; 512]).unwrap(), 1024);
    assert_eq!(e.push(track, vec![0.75; 512]).unwrap(), 1536);

    let out = render_chunks(&e, 1);
    let left = |frame: usize| out[frame * CHANNELS] as i32;
    assert!((left(0) - clamp16(0.25 * 32767.0) as i32).abs() <= 1);
    assert!((left(600) - clamp16(0.5 * 32767.0) as i32).abs() <= 1);
    assert_eq!(e.push(track, Vec::new()).unwrap(), 512);

    // Drains, then keeps the track bound and silent.
    let out = render_chunks(&e, 1);
    assert!(out[512 * CHANNELS..].iter().all(|&s| s == 0));
    assert!(e.is_playing(track));
    assert_eq!(e.push(track, vec![0.1; 16]).unwrap(), 16);

    e.stop(track).unwrap();
    assert!(!e.is_playing(track));
    assert_eq!(e.push(track, vec![0.1; 16]), Err(EngineError::NotStreaming(0)));
}

#[test]
fn release_silences_every_user_of_the_sample() {
    let e = engine(4);
    let handle = e.upload(vec![0.5; 44100], 1, 0).unwrap();
    let other = e.upload(vec![0.5; 44100], 1, 0).unwrap();
    let a = e.replay(handle, 1.0, 0.0, 0.0).unwrap();
    let b = e.loop_sample(handle, 1.0, -0.5, 2.0).unwrap();
    let c = e.replay(other, 1.0, 0.0, 0.0).unwrap();

    e.release(handle).unwrap();
    assert!(!e.is_playing(a));
    assert!(!e.is_playing(b));
    assert!(e.is_playing(c));
}

#[test]
fn pool_exhaustion_is_not_fatal() {
    let e = engine(2);
    e.sound(Waveform::Noise, 440.0, 1.0, 0.5, 0.0).unwrap();
    e.sound(Waveform::BinaryNoise, 440.0, 1.0, 0.5, 0.0).unwrap();
    assert_eq!(
        e.sound(Waveform::Sine, 440.0, 1.0, 0.5, 0.0),
        Err(EngineError::NoFreeTrack)
    );
    assert_eq!(e.queue(1, 1.0, 0.0, 0.0), Err(EngineError::NoFreeTrack));
    render_chunks(&e, 1);
}

#[test]
fn master_volume_scales_output() {
    let e = engine(1);
    e.set_master_volume(0.5);
    e.play(vec![1.0; 64], 1, 1.0 / 0.6, 0.0, 0.0).unwrap();
    let out = render_chunks(&e, 1);
    assert!((out[0] as i32 - 16383).abs() <= 1);
}

#[test]
fn control_calls_race_the_mixer_safely() {
    let e = engine(8);
    let stop = Arc::new(AtomicBool::new(false));

    let mixer = {
        let e = e.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut buf = vec![0i16; CHUNK * CHANNELS];
            let mut passes = 0usize;
            while !stop.load(Ordering::SeqCst) {
                e.render(&mut buf);
                passes += 1;
            }
            passes
        })
    };

    for i in 0..200 {
        match i % 4 {
            0 => {
                let _ = e.sound(Waveform::Square, 220.0, 0.01, 0.3, 0.0);
            }
            1 => {
                let _ = e.melody("{b:480} C5/32 E5/32", 0.3, 0.0);
            }
            2 => {
                if let Ok(t) = e.queue(1, 0.3, 0.0, 0.0) {
                    let _ = e.push(t, vec![0.1; 256]);
                    let _ = e.stop(t);
                }
            }
            _ => {
                let _ = e.fade_out(TrackId(i % 8), 0.005);
            }
        }
    }

    stop.store(true, Ordering::SeqCst);
    assert!(mixer.join().unwrap() > 0);
    e.reclaim();
}
