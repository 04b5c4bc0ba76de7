// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Compile-time configuration for the bridge.
//!
//! Runtime-tunable values (bus identifiers, boot count) live in the persisted
//! [`ConfigRecord`](crate::storage::ConfigRecord) instead.

/// Monitored analog channels carried on the bus.
pub const CHANNEL_COUNT: usize = 8;

/// Raw samples averaged into one decimated value.
pub const DECIMATION_FACTOR: usize = 10;

/// Ticks between frame transmissions.
pub const FRAME_DIVIDER: u8 = 10;

/// Periodic tick rate.
pub const TICK_HZ: u32 = 1_000;

/// Full-scale value of a 12-bit conversion.
pub const ADC_FULL_SCALE: u16 = 0x0FFF;

/// Highest ADC input the converter multiplexer accepts. Requests above this return 0.
pub const ADC_MAX_CHANNEL: u8 = 18;

/// Status polls before a conversion is declared lost.
pub const ADC_READY_SPIN_LIMIT: u32 = 2_000;

/// Interval between slot-busy polls while both transmit slots are occupied.
pub const SLOT_POLL_INTERVAL_US: u32 = 10;

/// Upper bound on waiting for a transmit slot. Two back-to-back timeouts still fit in one tick.
pub const SLOT_WAIT_BUDGET_US: u32 = 400;

/// Logical 16-bit words exposed by the emulated EEPROM.
pub const EEPROM_WORDS: u16 = 255;

/// CAN bit rate.
pub const CAN_BITRATE: u32 = 1_000_000;

/// Default identifier of the first sample frame (channels 0-3).
pub const DEFAULT_FRAME_A_ID: u16 = 0x600;

/// Default identifier of the second sample frame (channels 4-7).
pub const DEFAULT_FRAME_B_ID: u16 = 0x602;

/// Default identifier of the one-shot startup announcement.
pub const DEFAULT_STARTUP_ID: u16 = 0x7F0;

const _: () = assert!(2 * SLOT_WAIT_BUDGET_US < 1_000_000 / TICK_HZ);
