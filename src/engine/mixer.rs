//! Bus mixer
//!
//! Produces exactly two mono buses from the decoded source: either a pure
//! channel partition of a stereo track, or per-bus weighted sums of selected
//! stems.
//!
//! # Summation policy
//!
//! Summing several full-amplitude stems can exceed the valid range, so each
//! stem-mode bus is peak-normalized: if the summed peak exceeds 1.0 the whole
//! bus is scaled by 1.0/peak. A clamp would distort the loud passages; the
//! scale keeps the waveform shape and only reduces level.

use crate::audio::types::{AudioSource, Bus, BusContent, BusLabel};
use crate::audio::StemSet;
use crate::engine::resolver::StemSelection;
use crate::error::{Error, Result};
use tracing::{debug, info};

/// Deinterleave a stereo source into left/right mono buses.
///
/// Bit-exact partition: bus A receives every left-channel sample unmodified,
/// bus B every right-channel sample.
///
/// # Errors
/// `Error::Mix` unless the source has exactly 2 channels.
pub fn split_channels(source: &AudioSource) -> Result<(Bus, Bus)> {
    if source.channels != 2 {
        return Err(Error::Mix(format!(
            "channel split requires a stereo source, got {} channel(s)",
            source.channels
        )));
    }

    let frames = source.frames();
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for pair in source.samples.chunks_exact(2) {
        left.push(pair[0]);
        right.push(pair[1]);
    }

    info!("Split stereo source into two {}-frame buses", frames);

    Ok((
        Bus {
            label: BusLabel::A,
            content: BusContent::Channel(BusLabel::A),
            samples: left,
            sample_rate: source.sample_rate,
        },
        Bus {
            label: BusLabel::B,
            content: BusContent::Channel(BusLabel::B),
            samples: right,
            sample_rate: source.sample_rate,
        },
    ))
}

/// Mix the two stem selections into left/right mono buses.
pub fn mix_stems(
    stems: &StemSet,
    left: &StemSelection,
    right: &StemSelection,
) -> Result<(Bus, Bus)> {
    let bus_a = mix_selection(stems, left, BusLabel::A)?;
    let bus_b = mix_selection(stems, right, BusLabel::B)?;
    Ok((bus_a, bus_b))
}

/// Sum one selection of stems sample-wise and peak-normalize the result.
fn mix_selection(stems: &StemSet, selection: &StemSelection, label: BusLabel) -> Result<Bus> {
    let frames = stems.frames();
    let mut mix = vec![0.0f32; frames];

    for &stem in selection.stems() {
        let buffer = stems.get(stem);
        // StemSet enforces equal lengths; defensive check only.
        if buffer.len() != frames {
            return Err(Error::Mix(format!(
                "stem {} has {} frames, expected {}",
                stem,
                buffer.len(),
                frames
            )));
        }
        for (out, &s) in mix.iter_mut().zip(buffer) {
            *out += s;
        }
    }

    let peak = mix.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak > 1.0 {
        let scale = 1.0 / peak;
        for s in &mut mix {
            *s *= scale;
        }
        debug!(
            "Bus {} ({}) peaked at {:.3}, normalized by {:.3}",
            label, selection, peak, scale
        );
    }

    info!("Mixed bus {} from stems {} ({} frames)", label, selection, frames);

    Ok(Bus {
        label,
        content: BusContent::Stems(selection.stems().to_vec()),
        samples: mix,
        sample_rate: stems.sample_rate(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Stem;
    use crate::engine::resolver;
    use std::collections::HashMap;

    fn stereo_source() -> AudioSource {
        // left = 0.1, 0.2, ...; right = -0.1, -0.2, ...
        let mut samples = Vec::new();
        for i in 1..=5 {
            samples.push(i as f32 * 0.1);
            samples.push(i as f32 * -0.1);
        }
        AudioSource::new(samples, 44100, 2).unwrap()
    }

    fn stem_set(frames: usize) -> StemSet {
        let mut buffers = HashMap::new();
        buffers.insert(Stem::Vocals, vec![0.4f32; frames]);
        buffers.insert(Stem::Drums, vec![0.5f32; frames]);
        buffers.insert(Stem::Bass, vec![-0.2f32; frames]);
        buffers.insert(Stem::Other, vec![0.1f32; frames]);
        StemSet::new(buffers, 44100).unwrap()
    }

    #[test]
    fn test_split_is_bit_exact_partition() {
        let source = stereo_source();
        let (a, b) = split_channels(&source).unwrap();

        assert_eq!(a.frames(), source.frames());
        assert_eq!(b.frames(), source.frames());
        for i in 0..source.frames() {
            assert_eq!(a.samples[i], source.samples[i * 2]);
            assert_eq!(b.samples[i], source.samples[i * 2 + 1]);
        }
    }

    #[test]
    fn test_split_rejects_mono() {
        let mono = AudioSource::new(vec![0.0; 100], 44100, 1).unwrap();
        assert!(matches!(split_channels(&mono), Err(Error::Mix(_))));
    }

    #[test]
    fn test_split_rejects_multichannel() {
        let five_one = AudioSource::new(vec![0.0; 600], 44100, 6).unwrap();
        assert!(matches!(split_channels(&five_one), Err(Error::Mix(_))));
    }

    #[test]
    fn test_mix_frame_count_invariant() {
        let stems = stem_set(1000);
        let (left, right) = resolver::resolve("vocals", "vocals,drums,bass,other").unwrap();
        let (a, b) = mix_stems(&stems, &left, &right).unwrap();
        assert_eq!(a.frames(), 1000);
        assert_eq!(b.frames(), 1000);
    }

    #[test]
    fn test_mix_sums_samples() {
        let stems = stem_set(10);
        let (left, right) = resolver::resolve("vocals,bass", "drums").unwrap();
        let (a, b) = mix_stems(&stems, &left, &right).unwrap();

        // 0.4 + (-0.2), peak 0.2 <= 1.0 so no scaling
        assert!((a.samples[0] - 0.2).abs() < 1e-6);
        assert!((b.samples[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_mix_peak_normalizes() {
        let mut buffers = HashMap::new();
        buffers.insert(Stem::Vocals, vec![0.9f32; 10]);
        buffers.insert(Stem::Drums, vec![0.9f32; 10]);
        buffers.insert(Stem::Bass, vec![0.0f32; 10]);
        buffers.insert(Stem::Other, vec![0.0f32; 10]);
        let stems = StemSet::new(buffers, 44100).unwrap();

        let (left, _) = resolver::resolve("vocals,drums", "bass").unwrap();
        let bus = mix_selection(&stems, &left, BusLabel::A).unwrap();

        // 1.8 peak scaled back to exactly 1.0
        for &s in &bus.samples {
            assert!((s - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mix_no_scaling_below_peak() {
        let stems = stem_set(10);
        let (left, _) = resolver::resolve("drums", "vocals").unwrap();
        let bus = mix_selection(&stems, &left, BusLabel::A).unwrap();
        assert!((bus.samples[5] - 0.5).abs() < 1e-6);
    }
}
