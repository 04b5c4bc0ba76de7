// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Persistent Storage
//!
//! ## Modules
//!
//! - [`emulated`] - 16-bit word EEPROM emulated on two flash pages.
//! - [`config_store`] - Signature/version/size validated configuration record.

pub mod config_store;
pub mod emulated;

pub use config_store::{ConfigRecord, ConfigStore, FrameDescriptor, LoadOutcome};
pub use emulated::{EmulatedEeprom, FlashError, FlashPages, Page};

/// Value read back from an address that was never written.
pub const ERASED_WORD: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage could not be initialized")]
    InitFailed,
    #[error("storage used before init")]
    NotInitialized,
    #[error("address {0} outside storage")]
    OutOfRange(u16),
    #[error("flash: {0}")]
    Flash(FlashError),
    #[error("record of {size} bytes does not fit {capacity} data words")]
    RecordTooLarge { size: usize, capacity: usize },
    #[error("persisted size {found} does not match record size {expected}")]
    SizeMismatch { found: u16, expected: u16 },
    #[error("word {value:#06x} at {addr} is not a byte")]
    NotByte { addr: u16, value: u16 },
}

impl From<FlashError> for StorageError {
    fn from(e: FlashError) -> Self {
        StorageError::Flash(e)
    }
}

/// Word-addressable non-volatile storage.
pub trait WordStorage {
    /// Prepare the medium, repairing any interrupted write.
    fn init(&mut self) -> Result<(), StorageError>;

    /// Latest value written at `addr`, or [`ERASED_WORD`] if none.
    fn read_word(&mut self, addr: u16) -> Result<u16, StorageError>;

    fn write_word(&mut self, addr: u16, value: u16) -> Result<(), StorageError>;

    /// Number of addressable words.
    fn capacity(&self) -> u16;
}
