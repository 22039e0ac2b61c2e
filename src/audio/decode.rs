//! Audio decoder using symphonia
//!
//! Decodes an entire source file into an [`AudioSource`] up front. The whole
//! track is held in RAM: bus mixing and sync adjustment are batch operations
//! that need the full PCM before streaming begins.
//!
//! # Supported Formats
//!
//! Per Cargo.toml symphonia features: MP3, FLAC, AAC, MP4/M4A, Vorbis, WAV.
//! WAV is included so stem files emitted by the separation command decode
//! through the same path as the source track.
//!
//! # Sample Format
//!
//! Output samples are f32 in [-1.0, 1.0], interleaved, at the file's native
//! sample rate and channel count. No downmixing: channel-split mode needs the
//! original channels intact.

use crate::audio::types::AudioSource;
use crate::error::{Error, Result};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

/// Decode a complete audio file into PCM.
///
/// # Errors
/// `Error::Decode` on missing file, unsupported container/codec, or a
/// corrupt packet mid-file.
pub fn decode(path: &Path) -> Result<AudioSource> {
    let file = File::open(path)
        .map_err(|e| Error::Decode(format!("cannot open {}: {}", path.display(), e)))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Decode(format!("unsupported format {}: {}", path.display(), e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| Error::Decode(format!("no audio track in {}", path.display())))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| Error::Decode(format!("unknown sample rate in {}", path.display())))?;
    let channels = codec_params
        .channels
        .map(|c| c.count() as u16)
        .ok_or_else(|| Error::Decode(format!("unknown channel layout in {}", path.display())))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("unsupported codec in {}: {}", path.display(), e)))?;

    debug!(
        "Decoding {}: {} Hz, {} channels",
        path.display(),
        sample_rate,
        channels
    );

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break; // EOF
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(Error::Decode(format!(
                    "read failure in {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Recoverable per symphonia docs: skip the bad packet
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => {
                return Err(Error::Decode(format!(
                    "decode failure in {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        // Lazily size the conversion buffer to the stream's spec, then copy
        // interleaved f32 regardless of the file's native sample format.
        let buf = sample_buf.get_or_insert_with(|| {
            SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec())
        });
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if samples.is_empty() {
        return Err(Error::Decode(format!(
            "no audio frames decoded from {}",
            path.display()
        )));
    }

    let source = AudioSource::new(samples, sample_rate, channels)?;
    info!(
        "Decoded {}: {} frames, {} Hz, {} channels ({:.2}s)",
        path.display(),
        source.frames(),
        source.sample_rate,
        source.channels,
        source.frames() as f64 / source.sample_rate as f64
    );
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_nonexistent_file() {
        let result = decode(Path::new("/nonexistent/file.mp3"));
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_wav_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..4410 {
            let s = ((i as f32 * 0.01).sin() * 16000.0) as i16;
            writer.write_sample(s).unwrap(); // left
            writer.write_sample(-s).unwrap(); // right
        }
        writer.finalize().unwrap();

        let source = decode(&path).unwrap();
        assert_eq!(source.sample_rate, 44100);
        assert_eq!(source.channels, 2);
        assert_eq!(source.frames(), 4410);
        // Left and right were written as mirrors of each other
        assert!((source.samples[2] + source.samples[3]).abs() < 1e-4);
    }
}
