//! Duration and loudness extraction from local audio artifacts.
//!
//! The artifact is decoded in full with symphonia: total playback
//! duration comes from the decoded frame count and sample rate, and
//! loudness is the mean-square energy of all samples expressed in
//! dBFS. Silent or empty material yields negative infinity, never NaN.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, instrument};

/// Metrics computed from a fully decoded artifact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioMetrics {
    /// Total playback duration in milliseconds.
    pub duration_ms: u64,
    /// Mean-square energy in dBFS; negative infinity for silent input.
    pub loudness_db: f64,
}

/// Errors raised when an artifact cannot be decoded.
///
/// These are per-item failures: the orchestrator logs them, cleans up
/// the temporary file, and moves on to the next discovered resource.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The local artifact could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        /// The artifact path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The artifact is not a supported or parseable audio container.
    #[error("unsupported audio container {path}: {message}")]
    UnsupportedFormat {
        /// The artifact path.
        path: PathBuf,
        /// Probe failure detail.
        message: String,
    },

    /// The container holds no decodable audio track.
    #[error("no audio track found in {path}")]
    NoAudioTrack {
        /// The artifact path.
        path: PathBuf,
    },

    /// Decoding failed partway through the stream.
    #[error("decode failure in {path}: {message}")]
    Decode {
        /// The artifact path.
        path: PathBuf,
        /// Decoder failure detail.
        message: String,
    },
}

/// Decodes the artifact at `local_path` fully and returns its metrics.
///
/// Individual corrupt packets are skipped (symphonia treats those as
/// recoverable); anything that prevents the stream from being decoded
/// at all is a [`DecodeError`].
///
/// # Errors
///
/// Returns [`DecodeError`] if the file cannot be opened, probed as a
/// known container, or decoded.
#[instrument(fields(path = %local_path.display()))]
#[allow(clippy::cast_precision_loss)]
pub fn extract_metrics(local_path: &Path) -> Result<AudioMetrics, DecodeError> {
    let file = File::open(local_path).map_err(|source| DecodeError::Open {
        path: local_path.to_path_buf(),
        source,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Give the probe a format hint from the file extension.
    let mut hint = Hint::new();
    if let Some(extension) = local_path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::UnsupportedFormat {
            path: local_path.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| DecodeError::NoAudioTrack {
            path: local_path.to_path_buf(),
        })?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat {
            path: local_path.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut sample_rate = codec_params.sample_rate;
    let mut total_frames: u64 = 0;
    let mut sample_count: u64 = 0;
    let mut sum_squares: f64 = 0.0;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // End of stream.
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(DecodeError::Decode {
                    path: local_path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                total_frames += decoded.frames() as u64;

                let buf = sample_buf.get_or_insert_with(|| {
                    SampleBuffer::<f32>::new(decoded.capacity() as u64, spec)
                });
                buf.copy_interleaved_ref(decoded);
                for &sample in buf.samples() {
                    sum_squares += f64::from(sample) * f64::from(sample);
                    sample_count += 1;
                }
            }
            // Recoverable: skip the corrupt packet and keep decoding.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => {
                return Err(DecodeError::Decode {
                    path: local_path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        }
    }

    let Some(rate) = sample_rate.filter(|rate| *rate > 0) else {
        return Err(DecodeError::NoAudioTrack {
            path: local_path.to_path_buf(),
        });
    };

    let duration_ms = (total_frames * 1000 + u64::from(rate) / 2) / u64::from(rate);
    let loudness_db = mean_square_dbfs(sum_squares, sample_count);

    debug!(duration_ms, loudness_db, "metrics extracted");
    Ok(AudioMetrics {
        duration_ms,
        loudness_db,
    })
}

/// Mean-square energy in dBFS for normalized samples.
///
/// Zero samples or an all-zero signal map to negative infinity; the
/// result is never NaN.
#[allow(clippy::cast_precision_loss)]
fn mean_square_dbfs(sum_squares: f64, sample_count: u64) -> f64 {
    if sample_count == 0 || sum_squares <= 0.0 {
        return f64::NEG_INFINITY;
    }
    10.0 * (sum_squares / sample_count as f64).log10()
}
