//! Sync scheduler
//!
//! Applies the configured millisecond offset between the two buses by
//! prepending silence to whichever bus must lag, then tail-pads so both
//! buses emit the same total frame count. Runs once, up front: track length
//! and offset are both known before streaming begins, so sync costs nothing
//! per frame.
//!
//! Positive offset delays bus A (left), negative delays bus B (right).
//! There is no ceiling on the magnitude: an offset longer than the track
//! simply produces that much leading silence.

use crate::audio::types::Bus;
use tracing::{debug, info};

/// Convert a millisecond offset into whole frames at the given rate.
pub fn offset_frames(offset_ms: i64, sample_rate: u32) -> usize {
    ((offset_ms.unsigned_abs() as u64 * sample_rate as u64) as f64 / 1000.0).round() as usize
}

/// Apply the offset to the bus pair, returning both with equal frame counts.
///
/// A zero offset with already-equal buses is a no-op: the sample buffers are
/// returned untouched.
pub fn apply(mut bus_a: Bus, mut bus_b: Bus, offset_ms: i64) -> (Bus, Bus) {
    let rate = bus_a.sample_rate;
    let lead = offset_frames(offset_ms, rate);

    if lead > 0 {
        let lagging = if offset_ms > 0 { &mut bus_a } else { &mut bus_b };
        prepend_silence(lagging, lead);
        debug!(
            "Delayed bus {} by {} frames ({} ms)",
            lagging.label,
            lead,
            offset_ms.abs()
        );
    }

    // Equalize post-offset lengths so both transports have data to consume
    // for the full session duration.
    let target = bus_a.frames().max(bus_b.frames());
    for bus in [&mut bus_a, &mut bus_b] {
        if bus.frames() < target {
            bus.samples.resize(target, 0.0);
        }
    }

    info!(
        "Sync applied: offset {} ms, both buses at {} frames",
        offset_ms, target
    );
    (bus_a, bus_b)
}

fn prepend_silence(bus: &mut Bus, frames: usize) {
    let mut samples = vec![0.0f32; frames + bus.samples.len()];
    samples[frames..].copy_from_slice(&bus.samples);
    bus.samples = samples;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::{BusContent, BusLabel};

    fn bus(label: BusLabel, samples: Vec<f32>) -> Bus {
        Bus {
            label,
            content: BusContent::Channel(label),
            samples,
            sample_rate: 44100,
        }
    }

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| (i + 1) as f32 * 0.001).collect()
    }

    #[test]
    fn test_offset_frame_conversion() {
        // round(150 * 44100 / 1000) = 6615
        assert_eq!(offset_frames(150, 44100), 6615);
        assert_eq!(offset_frames(-150, 44100), 6615);
        assert_eq!(offset_frames(0, 44100), 0);
        // rounding, not truncation: 1 ms @ 44100 = 44.1 -> 44
        assert_eq!(offset_frames(1, 44100), 44);
        assert_eq!(offset_frames(1, 48000), 48);
    }

    #[test]
    fn test_positive_offset_delays_bus_a() {
        let payload = ramp(1000);
        let (a, b) = apply(
            bus(BusLabel::A, payload.clone()),
            bus(BusLabel::B, payload.clone()),
            150,
        );

        assert_eq!(a.frames(), 6615 + 1000);
        assert_eq!(a.frames(), b.frames());

        // Prefix is silent, payload bit-identical after it
        assert!(a.samples[..6615].iter().all(|&s| s == 0.0));
        assert_eq!(&a.samples[6615..6615 + 1000], payload.as_slice());

        // Bus B payload untouched, tail-padded with silence
        assert_eq!(&b.samples[..1000], payload.as_slice());
        assert!(b.samples[1000..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_negative_offset_delays_bus_b() {
        let payload = ramp(500);
        let (a, b) = apply(
            bus(BusLabel::A, payload.clone()),
            bus(BusLabel::B, payload.clone()),
            -10,
        );

        let lead = offset_frames(10, 44100);
        assert!(b.samples[..lead].iter().all(|&s| s == 0.0));
        assert_eq!(&b.samples[lead..lead + 500], payload.as_slice());
        assert_eq!(a.frames(), b.frames());
    }

    #[test]
    fn test_zero_offset_is_noop() {
        let payload = ramp(300);
        let (a, b) = apply(
            bus(BusLabel::A, payload.clone()),
            bus(BusLabel::B, payload.clone()),
            0,
        );
        assert_eq!(a.samples, payload);
        assert_eq!(b.samples, payload);
    }

    #[test]
    fn test_offset_longer_than_track() {
        // 10 s offset on a ~23 ms track: permitted, long leading silence
        let (a, b) = apply(
            bus(BusLabel::A, ramp(1000)),
            bus(BusLabel::B, ramp(1000)),
            10_000,
        );
        assert_eq!(a.frames(), 441_000 + 1000);
        assert_eq!(b.frames(), a.frames());
    }

    #[test]
    fn test_unequal_buses_tail_padded() {
        let (a, b) = apply(bus(BusLabel::A, ramp(800)), bus(BusLabel::B, ramp(500)), 0);
        assert_eq!(a.frames(), 800);
        assert_eq!(b.frames(), 800);
        assert!(b.samples[500..].iter().all(|&s| s == 0.0));
    }
}
