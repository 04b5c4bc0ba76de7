// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Decimated samples to bus frames.
//!
//! Frame A carries channels 0-3 and frame B channels 4-7. Four 12-bit values are packed
//! little-endian into 48 bits across payload words 0-2 (frame words 3-5):
//!
//! ```text
//! bits  0..12  channel n
//! bits 12..24  channel n+1
//! bits 24..36  channel n+2
//! bits 36..48  channel n+3
//! ```
//!
//! Payload word 3 (frame word 6) is the sequence counter, shared by both frames of one cycle.

use crate::config::{ADC_FULL_SCALE, CHANNEL_COUNT};
use crate::protocol::frame::TxFrame;
use crate::storage::ConfigRecord;

/// Channels carried by one frame.
pub const CHANNELS_PER_FRAME: usize = 4;

/// Pack four 12-bit samples into three words. Values above 12 bits saturate.
pub fn pack12(values: &[u16; CHANNELS_PER_FRAME]) -> [u16; 3] {
    let mut bits: u64 = 0;
    for (i, &v) in values.iter().enumerate() {
        bits |= (v.min(ADC_FULL_SCALE) as u64) << (12 * i);
    }
    [bits as u16, (bits >> 16) as u16, (bits >> 32) as u16]
}

/// Inverse of [`pack12`].
pub fn unpack12(words: &[u16; 3]) -> [u16; CHANNELS_PER_FRAME] {
    let bits = words[0] as u64 | (words[1] as u64) << 16 | (words[2] as u64) << 32;
    let mut out = [0u16; CHANNELS_PER_FRAME];
    for (i, v) in out.iter_mut().enumerate() {
        *v = ((bits >> (12 * i)) as u16) & ADC_FULL_SCALE;
    }
    out
}

/// Samples carried by a sample frame, recovered from its payload.
pub fn decode_samples(frame: &TxFrame) -> [u16; CHANNELS_PER_FRAME] {
    let p = frame.payload_words();
    unpack12(&[p[0], p[1], p[2]])
}

pub struct FrameBuilder;

impl FrameBuilder {
    /// Build both sample frames for one cycle.
    pub fn build(
        samples: &[u16; CHANNEL_COUNT],
        config: &ConfigRecord,
        sequence: u16,
    ) -> (TxFrame, TxFrame) {
        let (low, high) = samples.split_at(CHANNELS_PER_FRAME);
        let a = Self::sample_frame(config.frame_a.id, low, sequence);
        let b = Self::sample_frame(config.frame_b.id, high, sequence);
        (a, b)
    }

    fn sample_frame(id: u16, channels: &[u16], sequence: u16) -> TxFrame {
        let mut values = [0u16; CHANNELS_PER_FRAME];
        values.copy_from_slice(&channels[..CHANNELS_PER_FRAME]);
        let [w0, w1, w2] = pack12(&values);
        TxFrame::new(id, [w0, w1, w2, sequence])
    }

    /// One-shot announcement sent after boot: boot count then serial number, both little-endian.
    pub fn startup(config: &ConfigRecord) -> TxFrame {
        let mut data = [0u8; 8];
        data[..4].copy_from_slice(&config.boot_count.to_le_bytes());
        data[4..].copy_from_slice(&config.serial_number.to_le_bytes());
        TxFrame::from_bytes(config.startup_id, data)
    }
}

/// Per-cycle frame sequence number.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequenceCounter(u16);

impl SequenceCounter {
    pub const fn new() -> Self {
        Self(0)
    }

    /// Start from an arbitrary value.
    pub const fn starting_at(value: u16) -> Self {
        Self(value)
    }

    /// Return the current value and advance, wrapping from `u16::MAX` to 0.
    pub fn next(&mut self) -> u16 {
        let v = self.0;
        self.0 = self.0.wrapping_add(1);
        v
    }

    pub fn peek(&self) -> u16 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack12_layout() {
        let words = pack12(&[0xABC, 0x123, 0x456, 0x789]);
        // 0x789_456_123_ABC
        assert_eq!(words, [0x3ABC, 0x5612, 0x7894]);
        assert_eq!(unpack12(&words), [0xABC, 0x123, 0x456, 0x789]);
    }

    #[test]
    fn pack12_saturates_wide_values() {
        let words = pack12(&[0xFFFF, 0, 0, 0]);
        assert_eq!(unpack12(&words), [0x0FFF, 0, 0, 0]);
    }

    #[test]
    fn build_splits_channels_between_frames() {
        let config = ConfigRecord::defaults();
        let samples = [1, 2, 3, 4, 4095, 0, 2048, 7];
        let (a, b) = FrameBuilder::build(&samples, &config, 41);

        assert_eq!(a.id(), 0x600);
        assert_eq!(b.id(), 0x602);
        assert_eq!(decode_samples(&a), [1, 2, 3, 4]);
        assert_eq!(decode_samples(&b), [4095, 0, 2048, 7]);
        assert_eq!(a.sequence(), 41);
        assert_eq!(b.sequence(), 41);
        assert_eq!(a.dlc(), 8);
        assert_eq!(a.words[1], 0);
        assert_eq!(a.words[7], 0);
    }

    #[test]
    fn build_is_deterministic() {
        let config = ConfigRecord::defaults();
        let samples = [100, 200, 300, 400, 500, 600, 700, 800];
        assert_eq!(
            FrameBuilder::build(&samples, &config, 9),
            FrameBuilder::build(&samples, &config, 9)
        );
    }

    #[test]
    fn sequence_increases_and_wraps() {
        let mut seq = SequenceCounter::starting_at(u16::MAX - 2);
        let values: [u16; 5] = core::array::from_fn(|_| seq.next());
        assert_eq!(values, [u16::MAX - 2, u16::MAX - 1, u16::MAX, 0, 1]);

        let mut seq = SequenceCounter::new();
        let mut last = seq.next();
        for _ in 0..1000 {
            let v = seq.next();
            assert_eq!(v, last + 1);
            last = v;
        }
    }

    #[test]
    fn startup_frame_carries_boot_count_and_serial() {
        let mut config = ConfigRecord::defaults();
        config.boot_count = 0x0102_0304;
        config.serial_number = 0xDEAD_BEEF;
        let f = FrameBuilder::startup(&config);
        assert_eq!(f.id(), config.startup_id);
        assert_eq!(f.data(), [0x04, 0x03, 0x02, 0x01, 0xEF, 0xBE, 0xAD, 0xDE]);
    }
}
