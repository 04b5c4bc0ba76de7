// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Persisted configuration record.
//!
//! ## Storage layout (one byte per word)
//!
//! | Address | Field |
//! |---|---|
//! | 0 | schema version |
//! | 1 | payload size in bytes |
//! | 2 | signature `0xAA` |
//! | 3.. | payload, [`ConfigRecord::SIZE`] bytes |
//!
//! A save first clears the signature, then writes payload, version and size, and finally the
//! signature again, so an interrupted save is never mistaken for a valid record.

use log::{info, warn};

use super::{StorageError, WordStorage, ERASED_WORD};
use crate::config::{DEFAULT_FRAME_A_ID, DEFAULT_FRAME_B_ID, DEFAULT_STARTUP_ID};

pub const ADDR_VERSION: u16 = 0;
pub const ADDR_SIZE: u16 = 1;
pub const ADDR_SIGNATURE: u16 = 2;
pub const ADDR_DATA: u16 = 3;

pub const SCHEMA_VERSION: u8 = 0x01;
pub const SIGNATURE: u8 = 0xAA;

/// Identifier and payload-construction bytes of one sample frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub id: u16,
    pub payload_map: [u8; 7],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigRecord {
    pub schema_version: u8,
    pub frame_a: FrameDescriptor,
    pub frame_b: FrameDescriptor,
    pub boot_count: u32,
    pub startup_id: u16,
    pub serial_number: u32,
}

impl ConfigRecord {
    /// Serialized size in bytes.
    pub const SIZE: usize = 29;

    /// Compiled-in configuration.
    pub const fn defaults() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            frame_a: FrameDescriptor {
                id: DEFAULT_FRAME_A_ID,
                payload_map: [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07],
            },
            frame_b: FrameDescriptor {
                id: DEFAULT_FRAME_B_ID,
                payload_map: [0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E],
            },
            boot_count: 1,
            startup_id: DEFAULT_STARTUP_ID,
            serial_number: 0,
        }
    }

    /// Fixed little-endian image.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut b = [0u8; Self::SIZE];
        b[0] = self.schema_version;
        b[1..3].copy_from_slice(&self.frame_a.id.to_le_bytes());
        b[3..10].copy_from_slice(&self.frame_a.payload_map);
        b[10..12].copy_from_slice(&self.frame_b.id.to_le_bytes());
        b[12..19].copy_from_slice(&self.frame_b.payload_map);
        b[19..23].copy_from_slice(&self.boot_count.to_le_bytes());
        b[23..25].copy_from_slice(&self.startup_id.to_le_bytes());
        b[25..29].copy_from_slice(&self.serial_number.to_le_bytes());
        b
    }

    pub fn from_bytes(b: &[u8; Self::SIZE]) -> Self {
        let mut map_a = [0u8; 7];
        let mut map_b = [0u8; 7];
        map_a.copy_from_slice(&b[3..10]);
        map_b.copy_from_slice(&b[12..19]);
        Self {
            schema_version: b[0],
            frame_a: FrameDescriptor {
                id: u16::from_le_bytes([b[1], b[2]]),
                payload_map: map_a,
            },
            frame_b: FrameDescriptor {
                id: u16::from_le_bytes([b[10], b[11]]),
                payload_map: map_b,
            },
            boot_count: u32::from_le_bytes([b[19], b[20], b[21], b[22]]),
            startup_id: u16::from_le_bytes([b[23], b[24]]),
            serial_number: u32::from_le_bytes([b[25], b[26], b[27], b[28]]),
        }
    }
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Why [`ConfigStore::init`] returned what it did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Not yet initialized.
    Pending,
    /// Persisted record loaded and its boot count advanced.
    Loaded,
    /// Storage failed to initialize; defaults are in use and nothing was written.
    StorageUnavailable,
    NoSignature,
    BadSignature(u16),
    NoVersion,
    VersionMismatch(u16),
    ReadFailed(StorageError),
}

pub struct ConfigStore<S> {
    storage: S,
    outcome: LoadOutcome,
}

impl<S: WordStorage> ConfigStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            outcome: LoadOutcome::Pending,
        }
    }

    /// Load the persisted record or fall back to defaults. Never fails.
    ///
    /// On a successful load the boot count is incremented and written back. In every other case
    /// except unusable storage, the defaults are written so storage ends up self-consistent.
    pub fn init(&mut self) -> ConfigRecord {
        if let Err(e) = self.storage.init() {
            warn!("config: storage init failed ({}), using defaults", e);
            self.outcome = LoadOutcome::StorageUnavailable;
            return ConfigRecord::defaults();
        }

        let mut record = ConfigRecord::defaults();
        self.outcome = self.probe(&mut record);

        if self.outcome == LoadOutcome::Loaded {
            record.boot_count = record.boot_count.wrapping_add(1);
            info!("config: loaded, boot {}", record.boot_count);
        } else {
            warn!("config: {:?}, restoring defaults", self.outcome);
            record = ConfigRecord::defaults();
        }

        if let Err(e) = self.write(&record) {
            warn!("config: save failed ({})", e);
        }
        record
    }

    fn probe(&mut self, record: &mut ConfigRecord) -> LoadOutcome {
        let signature = match self.storage.read_word(ADDR_SIGNATURE) {
            Ok(w) => w,
            Err(e) => return LoadOutcome::ReadFailed(e),
        };
        if signature == ERASED_WORD {
            return LoadOutcome::NoSignature;
        }
        if signature != SIGNATURE as u16 {
            return LoadOutcome::BadSignature(signature);
        }

        let version = match self.storage.read_word(ADDR_VERSION) {
            Ok(w) => w,
            Err(e) => return LoadOutcome::ReadFailed(e),
        };
        if version == ERASED_WORD {
            return LoadOutcome::NoVersion;
        }
        if version != SCHEMA_VERSION as u16 {
            return LoadOutcome::VersionMismatch(version);
        }

        match self.read(record) {
            Ok(()) => LoadOutcome::Loaded,
            Err(e) => LoadOutcome::ReadFailed(e),
        }
    }

    pub fn outcome(&self) -> LoadOutcome {
        self.outcome
    }

    /// Persist the whole record and its header.
    pub fn write(&mut self, record: &ConfigRecord) -> Result<(), StorageError> {
        let capacity = self.storage.capacity().saturating_sub(ADDR_DATA) as usize;
        if ConfigRecord::SIZE > capacity {
            return Err(StorageError::RecordTooLarge {
                size: ConfigRecord::SIZE,
                capacity,
            });
        }

        self.storage.write_word(ADDR_SIGNATURE, 0x00)?;
        for (i, &byte) in record.to_bytes().iter().enumerate() {
            self.storage.write_word(ADDR_DATA + i as u16, byte as u16)?;
        }
        self.storage.write_word(ADDR_VERSION, SCHEMA_VERSION as u16)?;
        self.storage.write_word(ADDR_SIZE, ConfigRecord::SIZE as u16)?;
        self.storage.write_word(ADDR_SIGNATURE, SIGNATURE as u16)?;
        Ok(())
    }

    /// Copy the persisted payload into `record`. `record` is untouched on error.
    pub fn read(&mut self, record: &mut ConfigRecord) -> Result<(), StorageError> {
        let size = self.storage.read_word(ADDR_SIZE)?;
        if size != ConfigRecord::SIZE as u16 {
            return Err(StorageError::SizeMismatch {
                found: size,
                expected: ConfigRecord::SIZE as u16,
            });
        }

        let mut bytes = [0u8; ConfigRecord::SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            let addr = ADDR_DATA + i as u16;
            let value = self.storage.read_word(addr)?;
            if value > 0xFF {
                return Err(StorageError::NotByte { addr, value });
            }
            *b = value as u8;
        }

        *record = ConfigRecord::from_bytes(&bytes);
        Ok(())
    }

    /// Save on behalf of the console. Returns false if the record was not persisted.
    pub fn request_save(&mut self, record: &ConfigRecord) -> bool {
        match self.write(record) {
            Ok(()) => {
                info!("config: saved");
                true
            }
            Err(e) => {
                warn!("config: save failed ({})", e);
                false
            }
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn free(self) -> S {
        self.storage
    }
}
