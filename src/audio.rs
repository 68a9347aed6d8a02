// Audio normalization pipeline: decode an uploaded clip to PCM, truncate to
// a maximum duration, apply a trailing fade-out when long enough, normalize
// the peak level, and re-encode as MP3.
//
// Decoding uses symphonia with format auto-detection. Encoding pipes raw PCM
// through an ffmpeg subprocess, so ffmpeg must be reachable (see
// `AppConfig::ffmpeg_program`).

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Cursor;
use std::path::Path;
use std::process::Stdio;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Clips longer than this are truncated.
pub const MAX_DURATION_MS: u64 = 60_000;
/// Clips longer than this (post-truncation) get a trailing fade-out.
pub const FADE_GATE_MS: u64 = 45_000;
/// Length of the trailing fade-out.
pub const FADE_DURATION_MS: u64 = 15_000;
/// Peak level is normalized to this many dB below full scale.
pub const HEADROOM_DB: f32 = 4.0;

const MP3_BITRATE: &str = "192k";

/// Audio pipeline errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("No audio track found in input")]
    NoAudioTrack,

    #[error("Failed to encode audio: {0}")]
    Encode(String),

    #[error("Audio task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A decoded clip: interleaved f32 samples plus stream parameters.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioClip {
    /// Decode an audio container to PCM, auto-detecting the format from the
    /// content.
    pub fn decode(bytes: Vec<u8>) -> Result<Self, AudioError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &Hint::new(),
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::Decode(format!("Failed to probe format: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(AudioError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| AudioError::Decode("Sample rate not found".to_string()))?;
        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| AudioError::Decode("Channel count not found".to_string()))?;

        debug!(
            "Audio format: sample_rate={}, channels={}",
            sample_rate, channels
        );

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut samples = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let buf = sample_buf
                        .get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
                Err(e) => {
                    warn!("Decode error: {}", e);
                    continue;
                }
            }
        }

        if samples.is_empty() {
            return Err(AudioError::Decode("No samples decoded".to_string()));
        }

        debug!(
            "Decoded {} samples ({} frames)",
            samples.len(),
            samples.len() / channels as usize
        );

        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    pub fn duration_ms(&self) -> u64 {
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }

    /// Drop everything past `max_ms`.
    pub fn truncate_to(&mut self, max_ms: u64) {
        let max_frames = (self.sample_rate as u64 * max_ms / 1000) as usize;
        let max_samples = max_frames * self.channels as usize;
        if self.samples.len() > max_samples {
            self.samples.truncate(max_samples);
        }
    }

    /// Apply a linear fade to silence over the final `fade_ms`.
    pub fn fade_out(&mut self, fade_ms: u64) {
        let channels = self.channels as usize;
        let total_frames = self.samples.len() / channels;
        let fade_frames = ((self.sample_rate as u64 * fade_ms / 1000) as usize).min(total_frames);
        if fade_frames == 0 {
            return;
        }

        let start_frame = total_frames - fade_frames;
        for i in 0..fade_frames {
            let gain = 1.0 - (i + 1) as f32 / fade_frames as f32;
            let offset = (start_frame + i) * channels;
            for sample in &mut self.samples[offset..offset + channels] {
                *sample *= gain;
            }
        }
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |p, s| p.max(s.abs()))
    }

    /// Scale the clip so its peak sits `headroom_db` below full scale.
    /// Silent clips are left untouched.
    pub fn normalize(&mut self, headroom_db: f32) {
        let peak = self.peak();
        if peak <= 0.0 {
            return;
        }
        let target = 10f32.powf(-headroom_db / 20.0);
        let gain = target / peak;
        for sample in &mut self.samples {
            *sample *= gain;
        }
    }

    /// Interleaved signed 16-bit little-endian PCM, as consumed by ffmpeg.
    fn to_pcm_s16le(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 2);
        for &sample in &self.samples {
            let clamped = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            // Writing to a Vec cannot fail.
            let _ = WriteBytesExt::write_i16::<LittleEndian>(&mut out, clamped);
        }
        out
    }
}

/// Truncate, fade, and normalize in place.
pub fn condition_clip(clip: &mut AudioClip) {
    clip.truncate_to(MAX_DURATION_MS);
    if clip.duration_ms() > FADE_GATE_MS {
        clip.fade_out(FADE_DURATION_MS);
    }
    clip.normalize(HEADROOM_DB);
}

/// Full pipeline: decode, condition, and re-encode as MP3.
///
/// Decoding and DSP run on the blocking pool; the encode is an async ffmpeg
/// subprocess. Neither stalls the request scheduler.
pub async fn normalize_audio(input: Vec<u8>, ffmpeg: &Path) -> Result<Vec<u8>, AudioError> {
    let clip = tokio::task::spawn_blocking(move || {
        let mut clip = AudioClip::decode(input)?;
        condition_clip(&mut clip);
        Ok::<_, AudioError>(clip)
    })
    .await
    .map_err(|e| AudioError::Task(e.to_string()))??;

    info!(
        "Conditioned clip: {} ms at {} Hz, {} channel(s)",
        clip.duration_ms(),
        clip.sample_rate,
        clip.channels
    );

    encode_mp3(&clip, ffmpeg).await
}

/// Encode the clip as MP3 by piping raw PCM through ffmpeg.
pub async fn encode_mp3(clip: &AudioClip, ffmpeg: &Path) -> Result<Vec<u8>, AudioError> {
    let pcm = clip.to_pcm_s16le();

    let mut child = Command::new(ffmpeg)
        .args(["-hide_banner", "-loglevel", "error", "-f", "s16le", "-ar"])
        .arg(clip.sample_rate.to_string())
        .arg("-ac")
        .arg(clip.channels.to_string())
        .args(["-i", "-", "-f", "mp3", "-b:a", MP3_BITRATE, "pipe:1"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AudioError::Encode(format!("failed to spawn ffmpeg: {}", e)))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| AudioError::Encode("ffmpeg stdin unavailable".to_string()))?;

    // Feed stdin from a separate task while draining stdout, to avoid a pipe
    // deadlock on large clips.
    let writer = tokio::spawn(async move {
        let result = stdin.write_all(&pcm).await;
        drop(stdin);
        result
    });

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| AudioError::Encode(format!("ffmpeg failed: {}", e)))?;

    // A write error here usually means ffmpeg exited early; its stderr is the
    // more useful diagnostic, so only log the broken pipe.
    if let Ok(Err(e)) = writer.await {
        warn!("Error writing PCM to ffmpeg: {}", e);
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AudioError::Encode(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(output.stdout)
}
