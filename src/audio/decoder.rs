use std::io::Cursor;

use base64::Engine as _;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::types::{AudioData, EncodedAudio};
use crate::error::FormatError;

/// Decode a service audio payload into mono samples.
///
/// Raw payloads are little-endian signed 16-bit PCM at `sample_rate`, unless the
/// payload's MIME type declares its own rate. WAV containers are detected by
/// their header and decoded with symphonia.
pub fn decode_payload(payload: &EncodedAudio, sample_rate: u32) -> Result<AudioData, FormatError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.data.trim())
        .map_err(|e| FormatError::InvalidBase64(e.to_string()))?;

    if is_wav(&bytes) {
        return decode_wav(bytes);
    }

    let rate = payload.declared_sample_rate().unwrap_or(sample_rate);
    let data = AudioData::new(pcm16_to_f32(&bytes)?, rate);
    debug!(
        samples = data.num_frames(),
        sample_rate = rate,
        duration = data.duration,
        "decoded PCM payload"
    );
    Ok(data)
}

/// Convert little-endian i16 sample pairs to floats in [-1.0, 1.0).
pub fn pcm16_to_f32(bytes: &[u8]) -> Result<Vec<f32>, FormatError> {
    if bytes.is_empty() {
        return Err(FormatError::Empty);
    }
    if bytes.len() % 2 != 0 {
        return Err(FormatError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

fn decode_wav(bytes: Vec<u8>) -> Result<AudioData, FormatError> {
    let container = |msg: String| FormatError::Container(msg);

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    hint.with_extension("wav");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| container(format!("failed to probe format: {e}")))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| container("no default track found".to_string()))?
        .clone();

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| container("no sample rate in track".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| container(format!("failed to create decoder: {e}")))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(container(format!("error reading packet: {e}"))),
        };

        if packet.track_id() != track.id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                warn!("skipping undecodable packet: {e}");
                continue;
            }
            Err(e) => return Err(container(format!("decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend(
            sample_buf
                .samples()
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    if samples.is_empty() {
        return Err(container("container holds no audio frames".to_string()));
    }

    let data = AudioData::new(samples, sample_rate);
    debug!(
        samples = data.num_frames(),
        sample_rate,
        duration = data.duration,
        "decoded WAV payload"
    );
    Ok(data)
}
