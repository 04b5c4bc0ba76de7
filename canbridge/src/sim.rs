// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Host-side stand-ins for the hardware primitives.
//!
//! Used by the unit tests, the integration tests and the `canbridge-sim` binary. Time is virtual:
//! [`SimDelay`] advances a shared [`SimClock`] instead of sleeping, so bounded waits resolve
//! deterministically.

use core::cell::Cell;

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::acquisition::AdcConverter;
use crate::config::ADC_MAX_CHANNEL;
use crate::protocol::TxFrame;
use crate::scheduler::TickTimer;
use crate::storage::{FlashError, FlashPages, Page, StorageError, WordStorage, ERASED_WORD};
use crate::transmit::{Slot, TxSlots};

/// Frames kept by [`SimSlots`] before further fires are dropped from the log.
pub const SENT_LOG_DEPTH: usize = 64;

/// Virtual time base in nanoseconds.
#[derive(Debug, Default)]
pub struct SimClock {
    now_ns: Cell<u64>,
}

impl SimClock {
    pub const fn new() -> Self {
        Self {
            now_ns: Cell::new(0),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.now_ns.get() / 1_000
    }

    pub fn advance_ns(&self, ns: u64) {
        self.now_ns.set(self.now_ns.get() + ns);
    }

    pub fn advance_us(&self, us: u64) {
        self.advance_ns(us * 1_000);
    }
}

/// Delay that moves a [`SimClock`] forward.
pub struct SimDelay<'a> {
    clock: &'a SimClock,
}

impl<'a> SimDelay<'a> {
    pub fn new(clock: &'a SimClock) -> Self {
        Self { clock }
    }
}

impl DelayNs for SimDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.advance_ns(ns as u64);
    }

    fn delay_us(&mut self, us: u32) {
        self.clock.advance_us(us as u64);
    }
}

const ADC_INPUTS: usize = ADC_MAX_CHANNEL as usize + 1;

/// Converter returning preset values per input.
///
/// Modelled on a single-shot converter with a data register and an end-of-conversion flag:
/// a started conversion completes on the first readiness poll, reading the data register clears
/// the flag, and starting a conversion does not.
#[derive(Debug)]
pub struct SimAdc {
    values: [u16; ADC_INPUTS],
    pending: Option<u8>,
    eoc: bool,
    data: u16,
    stuck: bool,
    conversions: u32,
}

impl SimAdc {
    pub const fn new() -> Self {
        Self {
            values: [0; ADC_INPUTS],
            pending: None,
            eoc: false,
            data: 0,
            stuck: false,
            conversions: 0,
        }
    }

    /// Value returned for `input`. Inputs the converter does not have are ignored.
    pub fn set(&mut self, input: u8, value: u16) {
        if let Some(v) = self.values.get_mut(input as usize) {
            *v = value;
        }
    }

    /// A stuck converter never reports completion.
    pub fn set_stuck(&mut self, stuck: bool) {
        self.stuck = stuck;
    }

    /// Complete the conversion in progress now, even if nobody is polling for it.
    pub fn finish_pending(&mut self) {
        if let Some(ch) = self.pending.take() {
            self.data = self.values.get(ch as usize).copied().unwrap_or(0);
            self.eoc = true;
        }
    }

    /// Conversions started so far.
    pub fn conversions(&self) -> u32 {
        self.conversions
    }
}

impl Default for SimAdc {
    fn default() -> Self {
        Self::new()
    }
}

impl AdcConverter for SimAdc {
    fn start(&mut self, channel: u8) {
        self.pending = Some(channel);
        self.conversions += 1;
    }

    fn is_ready(&mut self) -> bool {
        let ready = self.eoc;
        if !ready && !self.stuck {
            self.finish_pending();
        }
        ready
    }

    fn read(&mut self) -> u16 {
        self.eoc = false;
        self.data
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Free,
    /// Transmitting until the given time in microseconds.
    BusyUntil(u64),
    /// Never completes, e.g. no other node acknowledging.
    Stuck,
}

/// Two transmit slots that finish a frame after a fixed bus time.
pub struct SimSlots<'a> {
    clock: &'a SimClock,
    frame_time_us: u64,
    state: [SlotState; 2],
    loaded: [Option<TxFrame>; 2],
    sent: Vec<(Slot, TxFrame), SENT_LOG_DEPTH>,
    aborts: [u32; 2],
}

impl<'a> SimSlots<'a> {
    pub fn new(clock: &'a SimClock, frame_time_us: u64) -> Self {
        Self {
            clock,
            frame_time_us,
            state: [SlotState::Free; 2],
            loaded: [None; 2],
            sent: Vec::new(),
            aborts: [0; 2],
        }
    }

    pub fn set_state(&mut self, slot: Slot, state: SlotState) {
        self.state[slot.index()] = state;
    }

    pub fn state(&self, slot: Slot) -> SlotState {
        self.state[slot.index()]
    }

    /// Frames fired, in order.
    pub fn sent(&self) -> &[(Slot, TxFrame)] {
        &self.sent
    }

    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    pub fn aborts(&self, slot: Slot) -> u32 {
        self.aborts[slot.index()]
    }

    /// Report one slot whose frame has left the bus since the last call.
    pub fn take_completed(&mut self) -> Option<Slot> {
        let now = self.clock.now_us();
        for slot in Slot::ALL {
            if let SlotState::BusyUntil(t) = self.state[slot.index()] {
                if now >= t {
                    self.state[slot.index()] = SlotState::Free;
                    return Some(slot);
                }
            }
        }
        None
    }
}

impl TxSlots for SimSlots<'_> {
    fn is_busy(&mut self, slot: Slot) -> bool {
        match self.state[slot.index()] {
            SlotState::Free => false,
            SlotState::BusyUntil(t) => self.clock.now_us() < t,
            SlotState::Stuck => true,
        }
    }

    fn load(&mut self, slot: Slot, frame: &TxFrame) {
        self.loaded[slot.index()] = Some(*frame);
    }

    fn fire(&mut self, slot: Slot) {
        self.state[slot.index()] = SlotState::BusyUntil(self.clock.now_us() + self.frame_time_us);
        if let Some(frame) = self.loaded[slot.index()] {
            // Log saturates; the simulator drains it each cycle.
            let _ = self.sent.push((slot, frame));
        }
    }

    fn abort(&mut self, slot: Slot) {
        self.state[slot.index()] = SlotState::Free;
        self.loaded[slot.index()] = None;
        self.aborts[slot.index()] += 1;
    }
}

/// Tick timer with settable readings.
#[derive(Debug, Default)]
pub struct SimTimer {
    elapsed: Cell<u32>,
    pending: Cell<bool>,
}

impl SimTimer {
    pub const fn new() -> Self {
        Self {
            elapsed: Cell::new(0),
            pending: Cell::new(false),
        }
    }

    pub fn set_elapsed(&self, counts: u32) {
        self.elapsed.set(counts);
    }

    pub fn set_pending(&self, pending: bool) {
        self.pending.set(pending);
    }
}

impl TickTimer for SimTimer {
    fn elapsed(&self) -> u32 {
        self.elapsed.get()
    }

    fn overrun_pending(&self) -> bool {
        self.pending.get()
    }
}

/// Two NOR flash pages of `WORDS` 32-bit words each.
///
/// Programming can only clear bits. [`fail_after`](Self::fail_after) cuts power after a number
/// of further program operations.
#[derive(Clone, Debug)]
pub struct RamFlash<const WORDS: usize> {
    pages: [[u32; WORDS]; 2],
    programs: usize,
    erases: usize,
    budget: usize,
}

impl<const WORDS: usize> RamFlash<WORDS> {
    pub const fn new() -> Self {
        Self {
            pages: [[0xFFFF_FFFF; WORDS]; 2],
            programs: 0,
            erases: 0,
            budget: usize::MAX,
        }
    }

    pub fn word(&self, page: Page, index: usize) -> u32 {
        self.read(page, index)
    }

    pub fn programs(&self) -> usize {
        self.programs
    }

    pub fn erases(&self) -> usize {
        self.erases
    }

    /// Allow `n` more program operations, then fail every one after.
    pub fn fail_after(&mut self, n: usize) {
        self.budget = n;
    }

    fn page_index(page: Page) -> usize {
        match page {
            Page::P0 => 0,
            Page::P1 => 1,
        }
    }
}

impl<const WORDS: usize> Default for RamFlash<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> FlashPages for RamFlash<WORDS> {
    fn words_per_page(&self) -> usize {
        WORDS
    }

    fn read(&self, page: Page, index: usize) -> u32 {
        self.pages[Self::page_index(page)]
            .get(index)
            .copied()
            .unwrap_or(0xFFFF_FFFF)
    }

    fn program(&mut self, page: Page, index: usize, value: u32) -> Result<(), FlashError> {
        if index >= WORDS {
            return Err(FlashError::OutOfBounds(index));
        }
        if self.budget == 0 {
            return Err(FlashError::ProgramFailed);
        }
        self.budget -= 1;

        let cell = &mut self.pages[Self::page_index(page)][index];
        if *cell & value != value {
            return Err(FlashError::NotErased);
        }
        *cell = value;
        self.programs += 1;
        Ok(())
    }

    fn erase(&mut self, page: Page) -> Result<(), FlashError> {
        self.pages[Self::page_index(page)] = [0xFFFF_FFFF; WORDS];
        self.erases += 1;
        Ok(())
    }
}

/// Plain word array standing in for the emulated EEPROM.
#[derive(Clone, Debug)]
pub struct RamStorage<const WORDS: usize> {
    words: [u16; WORDS],
    fail_init: bool,
    writes: usize,
    budget: usize,
}

impl<const WORDS: usize> RamStorage<WORDS> {
    pub const fn new() -> Self {
        Self {
            words: [ERASED_WORD; WORDS],
            fail_init: false,
            writes: 0,
            budget: usize::MAX,
        }
    }

    pub fn set_fail_init(&mut self, fail: bool) {
        self.fail_init = fail;
    }

    /// Overwrite a word directly, bypassing the write counter.
    pub fn set_word(&mut self, addr: u16, value: u16) {
        if let Some(w) = self.words.get_mut(addr as usize) {
            *w = value;
        }
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Allow `n` more writes, then fail every one after.
    pub fn fail_after(&mut self, n: usize) {
        self.budget = n;
    }
}

impl<const WORDS: usize> Default for RamStorage<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> WordStorage for RamStorage<WORDS> {
    fn init(&mut self) -> Result<(), StorageError> {
        if self.fail_init {
            Err(StorageError::InitFailed)
        } else {
            Ok(())
        }
    }

    fn read_word(&mut self, addr: u16) -> Result<u16, StorageError> {
        self.words
            .get(addr as usize)
            .copied()
            .ok_or(StorageError::OutOfRange(addr))
    }

    fn write_word(&mut self, addr: u16, value: u16) -> Result<(), StorageError> {
        if addr as usize >= WORDS {
            return Err(StorageError::OutOfRange(addr));
        }
        if self.budget == 0 {
            return Err(FlashError::ProgramFailed.into());
        }
        self.budget -= 1;
        self.words[addr as usize] = value;
        self.writes += 1;
        Ok(())
    }

    fn capacity(&self) -> u16 {
        WORDS as u16
    }
}
