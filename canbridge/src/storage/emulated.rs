// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! EEPROM emulation on two flash pages.
//!
//! Each page starts with a 32-bit status word, followed by 32-bit records `(addr << 16) | value`
//! appended in write order. Reads scan the active page backwards, so the newest record for an
//! address wins.
//!
//! | Status | Value | Meaning |
//! |---|---|---|
//! | `ERASED` | `0xFFFF_FFFF` | unused |
//! | `RECEIVING` | `0xEEEE_EEEE` | page transfer in progress into this page |
//! | `ACTIVE` | `0x0000_0000` | holds the current data |
//!
//! When the active page fills, the newest value of every address is copied into the other page,
//! the old page is erased, and the new page becomes active. Status transitions only clear bits.

use log::{info, warn};

use super::{StorageError, WordStorage, ERASED_WORD};

pub const STATUS_ERASED: u32 = 0xFFFF_FFFF;
pub const STATUS_RECEIVING: u32 = 0xEEEE_EEEE;
pub const STATUS_ACTIVE: u32 = 0x0000_0000;

const ERASED_RECORD: u32 = 0xFFFF_FFFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Page {
    P0,
    P1,
}

impl Page {
    pub fn other(self) -> Page {
        match self {
            Page::P0 => Page::P1,
            Page::P1 => Page::P0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FlashError {
    #[error("flash is write protected")]
    Locked,
    #[error("program operation failed")]
    ProgramFailed,
    #[error("erase operation failed")]
    EraseFailed,
    #[error("target word is not erased")]
    NotErased,
    #[error("word index {0} outside page")]
    OutOfBounds(usize),
}

/// Two erasable flash pages programmed one 32-bit word at a time.
pub trait FlashPages {
    /// 32-bit words per page.
    fn words_per_page(&self) -> usize;

    fn read(&self, page: Page, index: usize) -> u32;

    /// Program one word. Programming may only clear bits.
    fn program(&mut self, page: Page, index: usize, value: u32) -> Result<(), FlashError>;

    /// Erase a whole page to all ones.
    fn erase(&mut self, page: Page) -> Result<(), FlashError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PageStatus {
    Erased,
    Receiving,
    Active,
    Invalid,
}

impl From<u32> for PageStatus {
    fn from(word: u32) -> Self {
        match word {
            STATUS_ERASED => PageStatus::Erased,
            STATUS_RECEIVING => PageStatus::Receiving,
            STATUS_ACTIVE => PageStatus::Active,
            _ => PageStatus::Invalid,
        }
    }
}

#[inline]
fn record(addr: u16, value: u16) -> u32 {
    ((addr as u32) << 16) | value as u32
}

pub struct EmulatedEeprom<F> {
    flash: F,
    capacity: u16,
    active: Option<Page>,
    next_free: usize,
}

impl<F: FlashPages> EmulatedEeprom<F> {
    /// Expose `capacity` words over `flash`. Nothing is touched until [`WordStorage::init`].
    pub fn new(flash: F, capacity: u16) -> Self {
        Self {
            flash,
            capacity,
            active: None,
            next_free: 0,
        }
    }

    pub fn active_page(&self) -> Option<Page> {
        self.active
    }

    /// Records currently held in the active page.
    pub fn used_records(&self) -> usize {
        self.next_free.saturating_sub(1)
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn free(self) -> F {
        self.flash
    }

    fn status(&self, page: Page) -> PageStatus {
        PageStatus::from(self.flash.read(page, 0))
    }

    fn activate(&mut self, page: Page) {
        let words = self.flash.words_per_page();
        let mut next = 1;
        while next < words && self.flash.read(page, next) != ERASED_RECORD {
            next += 1;
        }
        self.active = Some(page);
        self.next_free = next;
    }

    fn format(&mut self) -> Result<(), StorageError> {
        self.flash.erase(Page::P0)?;
        self.flash.erase(Page::P1)?;
        self.flash.program(Page::P0, 0, STATUS_ACTIVE)?;
        self.active = Some(Page::P0);
        self.next_free = 1;
        Ok(())
    }

    /// Newest value of `addr` among the first `end` words of `page`.
    fn find(&self, page: Page, end: usize, addr: u16) -> Option<u16> {
        (1..end)
            .rev()
            .map(|i| self.flash.read(page, i))
            .find(|&rec| rec != ERASED_RECORD && (rec >> 16) as u16 == addr)
            .map(|rec| rec as u16)
    }

    /// Move the newest value of every address plus the pending write into the other page.
    fn transfer(&mut self, src: Page, addr: u16, value: u16) -> Result<(), StorageError> {
        let dst = src.other();
        self.flash.erase(dst)?;
        self.flash.program(dst, 0, STATUS_RECEIVING)?;

        let mut next = 1;
        self.flash.program(dst, next, record(addr, value))?;
        next += 1;

        for a in (0..self.capacity).filter(|&a| a != addr) {
            if let Some(v) = self.find(src, self.next_free, a) {
                self.flash.program(dst, next, record(a, v))?;
                next += 1;
            }
        }

        self.flash.erase(src)?;
        self.flash.program(dst, 0, STATUS_ACTIVE)?;
        self.active = Some(dst);
        self.next_free = next;
        info!("eeprom: page transfer to {:?}, {} records", dst, next - 1);
        Ok(())
    }
}

impl<F: FlashPages> WordStorage for EmulatedEeprom<F> {
    fn init(&mut self) -> Result<(), StorageError> {
        self.active = None;
        // Status word plus one record per address.
        if self.flash.words_per_page() < 1 + self.capacity as usize {
            return Err(StorageError::InitFailed);
        }

        use PageStatus::*;
        match (self.status(Page::P0), self.status(Page::P1)) {
            (Active, Erased) => self.activate(Page::P0),
            (Erased, Active) => self.activate(Page::P1),
            (Active, Receiving) | (Active, Invalid) => {
                warn!("eeprom: discarding incomplete page P1");
                self.flash.erase(Page::P1)?;
                self.activate(Page::P0);
            }
            (Receiving, Active) | (Invalid, Active) => {
                warn!("eeprom: discarding incomplete page P0");
                self.flash.erase(Page::P0)?;
                self.activate(Page::P1);
            }
            (Erased, Receiving) | (Invalid, Receiving) => {
                warn!("eeprom: completing transfer into P1");
                self.flash.erase(Page::P0)?;
                self.flash.program(Page::P1, 0, STATUS_ACTIVE)?;
                self.activate(Page::P1);
            }
            (Receiving, Erased) | (Receiving, Invalid) => {
                warn!("eeprom: completing transfer into P0");
                self.flash.erase(Page::P1)?;
                self.flash.program(Page::P0, 0, STATUS_ACTIVE)?;
                self.activate(Page::P0);
            }
            (s0, s1) => {
                warn!("eeprom: pages {:?}/{:?}, formatting", s0, s1);
                self.format()?;
            }
        }
        Ok(())
    }

    fn read_word(&mut self, addr: u16) -> Result<u16, StorageError> {
        if addr >= self.capacity {
            return Err(StorageError::OutOfRange(addr));
        }
        let page = self.active.ok_or(StorageError::NotInitialized)?;
        Ok(self.find(page, self.next_free, addr).unwrap_or(ERASED_WORD))
    }

    fn write_word(&mut self, addr: u16, value: u16) -> Result<(), StorageError> {
        if addr >= self.capacity {
            return Err(StorageError::OutOfRange(addr));
        }
        let page = self.active.ok_or(StorageError::NotInitialized)?;

        if self.find(page, self.next_free, addr) == Some(value) {
            return Ok(());
        }

        if self.next_free < self.flash.words_per_page() {
            self.flash.program(page, self.next_free, record(addr, value))?;
            self.next_free += 1;
            Ok(())
        } else {
            let result = self.transfer(page, addr, value);
            if result.is_err() {
                // Either page may now hold the only copy; init() decides which.
                self.active = None;
            }
            result
        }
    }

    fn capacity(&self) -> u16 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::RamFlash;

    type Flash = RamFlash<32>;

    fn eeprom(capacity: u16) -> EmulatedEeprom<Flash> {
        let mut e = EmulatedEeprom::new(Flash::new(), capacity);
        e.init().unwrap();
        e
    }

    #[test]
    fn blank_flash_is_formatted() {
        let e = eeprom(8);
        assert_eq!(e.active_page(), Some(Page::P0));
        assert_eq!(e.flash().word(Page::P0, 0), STATUS_ACTIVE);
        assert_eq!(e.used_records(), 0);
    }

    #[test]
    fn unwritten_reads_erased_and_last_write_wins() {
        let mut e = eeprom(8);
        assert_eq!(e.read_word(3).unwrap(), ERASED_WORD);
        e.write_word(3, 10).unwrap();
        e.write_word(3, 11).unwrap();
        e.write_word(4, 12).unwrap();
        assert_eq!(e.read_word(3).unwrap(), 11);
        assert_eq!(e.read_word(4).unwrap(), 12);
    }

    #[test]
    fn equal_write_is_skipped() {
        let mut e = eeprom(8);
        e.write_word(1, 5).unwrap();
        let programs = e.flash().programs();
        e.write_word(1, 5).unwrap();
        assert_eq!(e.flash().programs(), programs);
        assert_eq!(e.used_records(), 1);
    }

    #[test]
    fn out_of_range_and_uninitialized_are_errors() {
        let mut e = EmulatedEeprom::new(Flash::new(), 8);
        assert_eq!(e.read_word(0), Err(StorageError::NotInitialized));
        e.init().unwrap();
        assert_eq!(e.read_word(8), Err(StorageError::OutOfRange(8)));
        assert_eq!(e.write_word(9, 0), Err(StorageError::OutOfRange(9)));
    }

    #[test]
    fn capacity_larger_than_page_fails_init() {
        let mut e = EmulatedEeprom::new(Flash::new(), 40);
        assert_eq!(e.init(), Err(StorageError::InitFailed));
    }

    #[test]
    fn full_page_transfers_latest_values() {
        let mut e = eeprom(8);
        for i in 0..100u16 {
            e.write_word(i % 8, i).unwrap();
        }
        // Three transfers: P0 -> P1 -> P0 -> P1.
        assert_eq!(e.active_page(), Some(Page::P1));
        for a in 0..8u16 {
            assert_eq!(e.read_word(a).unwrap(), 92 + a);
        }
        assert!(e.flash().erases() >= 3);
        assert!(e.used_records() <= 31);
    }

    #[test]
    fn data_survives_reinit() {
        let mut e = eeprom(8);
        for i in 0..50u16 {
            e.write_word(i % 5, i).unwrap();
        }
        let mut e = EmulatedEeprom::new(e.free(), 8);
        e.init().unwrap();
        for a in 0..5u16 {
            assert_eq!(e.read_word(a).unwrap(), 45 + a);
        }
        assert_eq!(e.read_word(6).unwrap(), ERASED_WORD);
    }

    #[test]
    fn interrupted_copy_is_discarded() {
        let mut e = eeprom(8);
        for i in 0..31u16 {
            e.write_word(i % 4, i).unwrap();
        }
        assert_eq!(e.active_page(), Some(Page::P0));

        // Power lost after the status word and two records of the copy.
        let mut flash = e.free();
        flash.fail_after(3);
        let mut e = EmulatedEeprom::new(flash, 8);
        e.init().unwrap();
        assert!(e.write_word(7, 1).is_err());

        let mut flash = e.free();
        flash.fail_after(usize::MAX);
        assert_eq!(flash.word(Page::P1, 0), STATUS_RECEIVING);

        let mut e = EmulatedEeprom::new(flash, 8);
        e.init().unwrap();
        assert_eq!(e.active_page(), Some(Page::P0));
        assert_eq!(e.flash().word(Page::P1, 0), STATUS_ERASED);
        for (a, expected) in [28, 29, 30, 27].into_iter().enumerate() {
            assert_eq!(e.read_word(a as u16).unwrap(), expected);
        }
        assert_eq!(e.read_word(7).unwrap(), ERASED_WORD);
    }

    #[test]
    fn failed_transfer_requires_reinit_and_keeps_data() {
        let mut e = eeprom(8);
        for i in 0..31u16 {
            e.write_word(i % 4, i).unwrap();
        }
        assert_eq!(e.active_page(), Some(Page::P0));

        // RECEIVING, the pending record and four copies succeed; marking P1 ACTIVE fails after
        // P0 has already been erased.
        let mut flash = e.free();
        flash.fail_after(6);
        let mut e = EmulatedEeprom::new(flash, 8);
        e.init().unwrap();
        assert_eq!(
            e.write_word(7, 1),
            Err(StorageError::Flash(FlashError::ProgramFailed))
        );
        assert_eq!(e.flash().word(Page::P0, 0), STATUS_ERASED);
        assert_eq!(e.flash().word(Page::P1, 0), STATUS_RECEIVING);

        assert_eq!(e.active_page(), None);
        assert_eq!(e.read_word(1), Err(StorageError::NotInitialized));
        assert_eq!(e.write_word(1, 99), Err(StorageError::NotInitialized));

        let mut flash = e.free();
        flash.fail_after(usize::MAX);
        let mut e = EmulatedEeprom::new(flash, 8);
        e.init().unwrap();
        assert_eq!(e.active_page(), Some(Page::P1));
        for (a, expected) in [28, 29, 30, 27].into_iter().enumerate() {
            assert_eq!(e.read_word(a as u16).unwrap(), expected);
        }
        assert_eq!(e.read_word(7).unwrap(), 1);
    }

    #[test]
    fn completed_copy_is_promoted() {
        let mut flash = Flash::new();
        flash.program(Page::P1, 0, STATUS_RECEIVING).unwrap();
        flash.program(Page::P1, 1, record(2, 0x1234)).unwrap();
        flash.program(Page::P0, 0, 0x1234_5678).unwrap();

        let mut e = EmulatedEeprom::new(flash, 8);
        e.init().unwrap();
        assert_eq!(e.active_page(), Some(Page::P1));
        assert_eq!(e.flash().word(Page::P1, 0), STATUS_ACTIVE);
        assert_eq!(e.flash().word(Page::P0, 0), STATUS_ERASED);
        assert_eq!(e.read_word(2).unwrap(), 0x1234);
    }

    #[test]
    fn two_invalid_pages_are_formatted() {
        let mut flash = Flash::new();
        flash.program(Page::P0, 0, 0x0F0F_0F0F).unwrap();
        flash.program(Page::P1, 0, 0x0F0F_0F0F).unwrap();
        flash.program(Page::P0, 1, record(1, 7)).unwrap();

        let mut e = EmulatedEeprom::new(flash, 8);
        e.init().unwrap();
        assert_eq!(e.active_page(), Some(Page::P0));
        assert_eq!(e.read_word(1).unwrap(), ERASED_WORD);
    }
}
