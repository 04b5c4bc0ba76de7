// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Raw-count to voltage conversion for the console display.
//!
//! Calibration never feeds the bus frames; those always carry raw decimated counts.

use micromath::F32Ext;

use crate::config::CHANNEL_COUNT;

/// Reference voltage of the converter.
pub const VREF_VOLTS: f32 = 2.49;

/// Divider ratio on the 5 V reference input.
pub const REFERENCE_DIVIDER: f32 = 3.0;

/// Fixed bias added to every displayed channel voltage.
pub const DISPLAY_BIAS_VOLTS: f32 = 0.01;

/// Linear calibration of one channel: `volts = (raw - offset) / slope`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    /// Counts read with the input at 0 V.
    pub offset: f32,
    /// Counts per volt.
    pub slope: f32,
}

impl Calibration {
    pub const fn new(offset: f32, slope: f32) -> Self {
        Self { offset, slope }
    }

    /// Convert a raw reading. Readings at or below the offset clamp to 0 V before the bias.
    pub fn volts(&self, raw: u16) -> f32 {
        let raw = raw as f32;
        let counts = if raw <= self.offset { 0.0 } else { raw - self.offset };
        counts / self.slope + DISPLAY_BIAS_VOLTS
    }

    /// Same as [`volts`](Self::volts), rounded to whole millivolts.
    pub fn millivolts(&self, raw: u16) -> i32 {
        (self.volts(raw) * 1000.0).round() as i32
    }
}

/// Bench calibration of the production board.
pub const DEFAULT_CALIBRATION: [Calibration; CHANNEL_COUNT] = [
    Calibration::new(5.0, 819.83),
    Calibration::new(5.0, 820.47),
    Calibration::new(5.0, 819.19),
    Calibration::new(5.0, 819.40),
    Calibration::new(5.0, 818.34),
    Calibration::new(5.0, 819.18),
    Calibration::new(5.0, 818.76),
    Calibration::new(5.0, 820.04),
];

/// Supply voltage seen on the reference channel.
pub fn reference_volts(raw: u16) -> f32 {
    (raw as f32 * VREF_VOLTS / 4096.0) * REFERENCE_DIVIDER
}
