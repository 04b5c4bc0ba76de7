// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Fixed 8-word transmit frame.
//!
//! | Word | Contents |
//! |------|----------|
//! | 0 | 11-bit identifier shifted left by [`ID_SHIFT`] |
//! | 1 | extended identifier, always 0 |
//! | 2 | payload byte count, always 8 |
//! | 3..=6 | payload, little-endian on the wire |
//! | 7 | reserved, 0 |

use bxcan::{Data, Frame, StandardId};

/// Position of the identifier inside word 0.
pub const ID_SHIFT: u16 = 2;

/// Payload bytes carried by every frame.
pub const PAYLOAD_BYTES: u16 = 8;

const ID_MASK: u16 = 0x07FF;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxFrame {
    pub words: [u16; 8],
}

impl TxFrame {
    /// Frame on `id` with the given payload words. Identifiers wider than 11 bits are truncated.
    pub const fn new(id: u16, payload: [u16; 4]) -> Self {
        Self {
            words: [
                (id & ID_MASK) << ID_SHIFT,
                0,
                PAYLOAD_BYTES,
                payload[0],
                payload[1],
                payload[2],
                payload[3],
                0,
            ],
        }
    }

    /// Frame on `id` with an 8-byte payload.
    pub fn from_bytes(id: u16, data: [u8; 8]) -> Self {
        let mut payload = [0u16; 4];
        for (word, pair) in payload.iter_mut().zip(data.chunks_exact(2)) {
            *word = u16::from_le_bytes([pair[0], pair[1]]);
        }
        Self::new(id, payload)
    }

    pub fn id(&self) -> u16 {
        (self.words[0] >> ID_SHIFT) & ID_MASK
    }

    pub fn standard_id(&self) -> StandardId {
        StandardId::new(self.id()).unwrap_or(StandardId::ZERO)
    }

    pub fn dlc(&self) -> u16 {
        self.words[2]
    }

    pub fn payload_words(&self) -> [u16; 4] {
        [self.words[3], self.words[4], self.words[5], self.words[6]]
    }

    /// Payload as transmitted.
    pub fn data(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        for (pair, word) in out.chunks_exact_mut(2).zip(self.payload_words()) {
            pair.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Sequence word of a sample frame.
    pub fn sequence(&self) -> u16 {
        self.words[6]
    }
}

impl From<&TxFrame> for Frame {
    fn from(frame: &TxFrame) -> Self {
        let data = frame.data();
        let len = (frame.dlc() as usize).min(data.len());
        let data = Data::new(&data[..len]).unwrap_or_else(Data::empty);
        Frame::new_data(frame.standard_id(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_words_follow_layout() {
        let f = TxFrame::new(0x602, [1, 2, 3, 4]);
        assert_eq!(f.words, [0x602 << 2, 0, 8, 1, 2, 3, 4, 0]);
        assert_eq!(f.id(), 0x602);
        assert_eq!(f.standard_id().as_raw(), 0x602);
    }

    #[test]
    fn wide_identifier_is_truncated() {
        let f = TxFrame::new(0xFFFF, [0; 4]);
        assert_eq!(f.id(), 0x7FF);
    }

    #[test]
    fn payload_bytes_are_little_endian() {
        let f = TxFrame::new(0x600, [0x0201, 0x0403, 0x0605, 0x0807]);
        assert_eq!(f.data(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(TxFrame::from_bytes(0x600, f.data()), f);
    }

    #[test]
    fn converts_to_bxcan_frame() {
        let f = TxFrame::new(0x600, [0x0201, 0x0403, 0x0605, 0x0807]);
        let frame = Frame::from(&f);
        assert_eq!(frame.dlc(), 8);
        assert_eq!(frame.data().map(|d| d.as_ref()), Some(&[1u8, 2, 3, 4, 5, 6, 7, 8][..]));
    }
}
