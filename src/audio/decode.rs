// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{fs::File, path::Path};

use symphonia::core::audio::SampleBuffer as DecodedSamples;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

use super::SampleBuffer;

/// Errors raised while decoding a sample file.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Format {
        path: String,
        source: SymphoniaError,
    },

    #[error("{0}: no audio track found")]
    NoTrack(String),

    #[error("{0}: sample rate not specified")]
    NoSampleRate(String),

    #[error("{0}: file contains no audio")]
    Empty(String),
}

/// Decodes an entire audio file into memory. Supports WAV, FLAC, MP3, Ogg Vorbis and anything
/// else symphonia has a decoder for.
pub fn decode_file(path: &Path) -> Result<SampleBuffer, DecodeError> {
    let name = path.display().to_string();
    let file = File::open(path).map_err(|source| DecodeError::Io {
        path: name.clone(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|source| DecodeError::Format {
            path: name.clone(),
            source,
        })?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::NoTrack(name.clone()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::NoSampleRate(name.clone()))?;

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|source| DecodeError::Format {
            path: name.clone(),
            source,
        })?;

    let mut samples: Vec<f32> = Vec::new();
    let mut channels = 0;
    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(source) => {
                return Err(DecodeError::Format {
                    path: name,
                    source,
                })
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(path = %name, err = e, "Skipping undecodable packet");
                continue;
            }
            Err(source) => {
                return Err(DecodeError::Format {
                    path: name,
                    source,
                })
            }
        };

        let spec = *decoded.spec();
        channels = spec.channels.count();
        let mut buffer = DecodedSamples::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if channels == 0 || samples.is_empty() {
        return Err(DecodeError::Empty(name));
    }

    let buffer = SampleBuffer::from_interleaved(&samples, channels, sample_rate);
    debug!(
        path = %name,
        channels = buffer.channel_count(),
        frames = buffer.frames(),
        sample_rate,
        "Decoded sample"
    );
    Ok(buffer)
}
