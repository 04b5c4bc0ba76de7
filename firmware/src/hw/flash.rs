// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Two STM32F777 flash sectors backing the emulated EEPROM.
//!
//! Single-bank layout: sectors 10 and 11 are the last two 256 KiB sectors. Only the first
//! [`WINDOW_WORDS`] words of each sector are used, which keeps the backward record scan short; an
//! erase still clears the whole sector.

use canbridge::storage::{FlashError, FlashPages, Page};
use stm32f7xx_hal::pac;

const SECTOR_P0: u8 = 10;
const SECTOR_P1: u8 = 11;
const BASE_P0: u32 = 0x0818_0000;
const BASE_P1: u32 = 0x081C_0000;

/// 32-bit words of each sector the EEPROM uses.
pub const WINDOW_WORDS: usize = 1024;

const KEY1: u32 = 0x4567_0123;
const KEY2: u32 = 0xCDEF_89AB;

// CR
const CR_PG: u32 = 1 << 0;
const CR_SER: u32 = 1 << 1;
const CR_SNB_SHIFT: u32 = 3;
const CR_SNB_MASK: u32 = 0x1F << CR_SNB_SHIFT;
const CR_PSIZE_X32: u32 = 0b10 << 8;
const CR_PSIZE_MASK: u32 = 0b11 << 8;
const CR_STRT: u32 = 1 << 16;
const CR_LOCK: u32 = 1 << 31;

// SR
const SR_OPERR: u32 = 1 << 1;
const SR_WRPERR: u32 = 1 << 4;
const SR_PGAERR: u32 = 1 << 5;
const SR_PGPERR: u32 = 1 << 6;
const SR_ERSERR: u32 = 1 << 7;
const SR_BSY: u32 = 1 << 16;
const SR_ERRORS: u32 = SR_OPERR | SR_WRPERR | SR_PGAERR | SR_PGPERR | SR_ERSERR;

pub struct SectorFlash {
    flash: pac::FLASH,
}

impl SectorFlash {
    pub fn new(flash: pac::FLASH) -> Self {
        Self { flash }
    }

    fn base(page: Page) -> u32 {
        match page {
            Page::P0 => BASE_P0,
            Page::P1 => BASE_P1,
        }
    }

    fn sector(page: Page) -> u8 {
        match page {
            Page::P0 => SECTOR_P0,
            Page::P1 => SECTOR_P1,
        }
    }

    fn unlock(&mut self) -> Result<(), FlashError> {
        if self.flash.cr.read().bits() & CR_LOCK != 0 {
            self.flash.keyr.write(|w| unsafe { w.bits(KEY1) });
            self.flash.keyr.write(|w| unsafe { w.bits(KEY2) });
        }
        if self.flash.cr.read().bits() & CR_LOCK != 0 {
            return Err(FlashError::Locked);
        }
        Ok(())
    }

    fn lock(&mut self) {
        self.flash
            .cr
            .modify(|r, w| unsafe { w.bits(r.bits() | CR_LOCK) });
    }

    fn wait_idle(&self) {
        while self.flash.sr.read().bits() & SR_BSY != 0 {}
    }

    /// Read and clear the error flags of the last operation.
    fn take_errors(&mut self) -> u32 {
        let errors = self.flash.sr.read().bits() & SR_ERRORS;
        if errors != 0 {
            self.flash.sr.write(|w| unsafe { w.bits(errors) });
        }
        errors
    }
}

impl FlashPages for SectorFlash {
    fn words_per_page(&self) -> usize {
        WINDOW_WORDS
    }

    fn read(&self, page: Page, index: usize) -> u32 {
        if index >= WINDOW_WORDS {
            return 0xFFFF_FFFF;
        }
        let addr = Self::base(page) + 4 * index as u32;
        unsafe { core::ptr::read_volatile(addr as *const u32) }
    }

    fn program(&mut self, page: Page, index: usize, value: u32) -> Result<(), FlashError> {
        if index >= WINDOW_WORDS {
            return Err(FlashError::OutOfBounds(index));
        }
        if self.read(page, index) & value != value {
            return Err(FlashError::NotErased);
        }

        self.wait_idle();
        self.unlock()?;
        self.take_errors();

        self.flash.cr.modify(|r, w| unsafe {
            w.bits((r.bits() & !(CR_PSIZE_MASK | CR_SER)) | CR_PSIZE_X32 | CR_PG)
        });
        let addr = Self::base(page) + 4 * index as u32;
        unsafe { core::ptr::write_volatile(addr as *mut u32, value) };
        cortex_m::asm::dsb();
        self.wait_idle();

        self.flash
            .cr
            .modify(|r, w| unsafe { w.bits(r.bits() & !CR_PG) });
        let errors = self.take_errors();
        self.lock();

        if errors & SR_WRPERR != 0 {
            Err(FlashError::Locked)
        } else if errors != 0 || self.read(page, index) != value {
            Err(FlashError::ProgramFailed)
        } else {
            Ok(())
        }
    }

    fn erase(&mut self, page: Page) -> Result<(), FlashError> {
        self.wait_idle();
        self.unlock()?;
        self.take_errors();

        let snb = (Self::sector(page) as u32) << CR_SNB_SHIFT;
        let clear = CR_PSIZE_MASK | CR_SNB_MASK | CR_PG;
        self.flash
            .cr
            .modify(|r, w| unsafe { w.bits((r.bits() & !clear) | CR_PSIZE_X32 | CR_SER | snb) });
        self.flash
            .cr
            .modify(|r, w| unsafe { w.bits(r.bits() | CR_STRT) });
        self.wait_idle();

        self.flash
            .cr
            .modify(|r, w| unsafe { w.bits(r.bits() & !(CR_SER | CR_SNB_MASK)) });
        let errors = self.take_errors();
        self.lock();

        if errors & SR_WRPERR != 0 {
            Err(FlashError::Locked)
        } else if errors != 0 {
            Err(FlashError::EraseFailed)
        } else {
            Ok(())
        }
    }
}
