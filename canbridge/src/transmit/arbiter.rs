// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Dual-slot transmit arbitration.
//!
//! Slot A is preferred; slot B is used only while A is busy. With both busy, slot A is polled at a
//! fixed interval until it frees or the wait budget runs out, in which case the frame is dropped.
//! Completion and error events arrive separately from the bus controller and never retry.

use embedded_hal::delay::DelayNs;
use log::{debug, trace};

use crate::config::{SLOT_POLL_INTERVAL_US, SLOT_WAIT_BUDGET_US};
use crate::diagnostics::Diagnostics;
use crate::protocol::TxFrame;

/// One of the two hardware transmit slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::A, Slot::B];

    pub fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }
}

/// Bus-controller primitives for the two transmit slots.
pub trait TxSlots {
    /// True while the slot holds a frame that has not finished transmitting.
    fn is_busy(&mut self, slot: Slot) -> bool;

    /// Copy `frame` into the slot without requesting transmission.
    fn load(&mut self, slot: Slot, frame: &TxFrame);

    /// Request transmission of the loaded frame.
    fn fire(&mut self, slot: Slot);

    /// Cancel any pending transmission and mark the slot free.
    fn abort(&mut self, slot: Slot);
}

/// States visited by one call to [`TransmitArbiter::transmit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArbiterState {
    SlotAFree,
    SlotABusyCheckB,
    BothBusyWait,
    TimedOut,
    Sent(Slot),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransmitOutcome {
    Sent(Slot),
    TimedOut,
}

impl TransmitOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, TransmitOutcome::Sent(_))
    }
}

/// Error conditions latched by the bus controller.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BusErrorFlags {
    raw: u8,
}

impl BusErrorFlags {
    pub const BUS_OFF: u8 = 1 << 0;
    pub const ERROR_PASSIVE: u8 = 1 << 1;
    pub const ERROR_WARNING: u8 = 1 << 2;
    pub const INVALID_FRAME: u8 = 1 << 3;

    pub const fn from_raw(raw: u8) -> Self {
        Self { raw }
    }

    #[inline]
    pub fn raw(&self) -> u8 {
        self.raw
    }

    /// Transmit error counter overflowed; the controller left the bus.
    #[inline]
    pub fn bus_off(&self) -> bool {
        (self.raw & Self::BUS_OFF) != 0
    }

    /// An error counter passed 127.
    #[inline]
    pub fn error_passive(&self) -> bool {
        (self.raw & Self::ERROR_PASSIVE) != 0
    }

    /// An error counter reached the warning limit (96).
    #[inline]
    pub fn error_warning(&self) -> bool {
        (self.raw & Self::ERROR_WARNING) != 0
    }

    /// A malformed frame was seen on the bus.
    #[inline]
    pub fn invalid_frame(&self) -> bool {
        (self.raw & Self::INVALID_FRAME) != 0
    }
}

/// Asynchronous notification from the bus controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    TxComplete(Slot),
    Error(BusErrorFlags),
}

/// Slot selection with a bounded wait.
#[derive(Debug)]
pub struct TransmitArbiter {
    poll_interval_us: u32,
    wait_budget_us: u32,
    last_state: Option<ArbiterState>,
}

impl TransmitArbiter {
    /// Poll every `poll_interval_us` for at most `wait_budget_us`.
    ///
    /// An interval of 0 is treated as 1.
    pub const fn new(poll_interval_us: u32, wait_budget_us: u32) -> Self {
        Self {
            poll_interval_us: if poll_interval_us == 0 { 1 } else { poll_interval_us },
            wait_budget_us,
            last_state: None,
        }
    }

    /// Terminal state of the most recent call.
    pub fn last_state(&self) -> Option<ArbiterState> {
        self.last_state
    }

    pub fn transmit<S: TxSlots, D: DelayNs>(
        &mut self,
        slots: &mut S,
        delay: &mut D,
        frame: &TxFrame,
        diag: &Diagnostics,
    ) -> TransmitOutcome {
        let mut waited_us = 0u32;
        let mut state = if slots.is_busy(Slot::A) {
            ArbiterState::SlotABusyCheckB
        } else {
            ArbiterState::SlotAFree
        };

        loop {
            state = match state {
                ArbiterState::SlotAFree => {
                    Self::load_and_fire(slots, Slot::A, frame, diag);
                    ArbiterState::Sent(Slot::A)
                }
                ArbiterState::SlotABusyCheckB => {
                    if slots.is_busy(Slot::B) {
                        ArbiterState::BothBusyWait
                    } else {
                        Self::load_and_fire(slots, Slot::B, frame, diag);
                        ArbiterState::Sent(Slot::B)
                    }
                }
                ArbiterState::BothBusyWait => {
                    if waited_us >= self.wait_budget_us {
                        ArbiterState::TimedOut
                    } else {
                        delay.delay_us(self.poll_interval_us);
                        waited_us = waited_us.saturating_add(self.poll_interval_us);
                        if slots.is_busy(Slot::A) {
                            ArbiterState::BothBusyWait
                        } else {
                            ArbiterState::SlotAFree
                        }
                    }
                }
                ArbiterState::TimedOut => {
                    diag.tx_timeouts.inc();
                    debug!("tx: no free slot after {} us, dropped {:#05x}", waited_us, frame.id());
                    self.last_state = Some(state);
                    return TransmitOutcome::TimedOut;
                }
                ArbiterState::Sent(slot) => {
                    self.last_state = Some(state);
                    return TransmitOutcome::Sent(slot);
                }
            };
        }
    }

    fn load_and_fire<S: TxSlots>(slots: &mut S, slot: Slot, frame: &TxFrame, diag: &Diagnostics) {
        slots.load(slot, frame);
        slots.fire(slot);
        diag.tx_attempted.inc();
        trace!("tx: {:#05x} -> slot {:?}", frame.id(), slot);
    }
}

impl Default for TransmitArbiter {
    fn default() -> Self {
        Self::new(SLOT_POLL_INTERVAL_US, SLOT_WAIT_BUDGET_US)
    }
}

/// Sole owner of the transmit slots.
pub struct TransmitContext<S, D> {
    slots: S,
    delay: D,
    arbiter: TransmitArbiter,
}

impl<S: TxSlots, D: DelayNs> TransmitContext<S, D> {
    pub fn new(slots: S, delay: D) -> Self {
        Self::with_arbiter(slots, delay, TransmitArbiter::default())
    }

    pub fn with_arbiter(slots: S, delay: D, arbiter: TransmitArbiter) -> Self {
        Self {
            slots,
            delay,
            arbiter,
        }
    }

    pub fn transmit(&mut self, frame: &TxFrame, diag: &Diagnostics) -> TransmitOutcome {
        self.arbiter.transmit(&mut self.slots, &mut self.delay, frame, diag)
    }

    /// Submit both frames of a cycle. `second` goes out before `first`.
    pub fn transmit_pair(
        &mut self,
        first: &TxFrame,
        second: &TxFrame,
        diag: &Diagnostics,
    ) -> [TransmitOutcome; 2] {
        let second_outcome = self.transmit(second, diag);
        let first_outcome = self.transmit(first, diag);
        [first_outcome, second_outcome]
    }

    /// Account for a completion or error reported by the controller.
    ///
    /// Any error aborts both slots; in-flight frames are dropped rather than retried.
    pub fn on_bus_event(&mut self, event: BusEvent, diag: &Diagnostics) {
        diag.bus_interrupts.inc();
        match event {
            BusEvent::TxComplete(slot) => {
                diag.tx_completed.inc();
                trace!("tx: slot {:?} complete", slot);
            }
            BusEvent::Error(flags) => {
                diag.bus_errors.inc();
                if flags.bus_off() {
                    diag.bus_off.inc();
                }
                if flags.error_passive() {
                    diag.error_passive.inc();
                }
                if flags.error_warning() {
                    diag.error_warning.inc();
                }
                if flags.invalid_frame() {
                    diag.invalid_frame.inc();
                }

                for slot in Slot::ALL {
                    if self.slots.is_busy(slot) {
                        diag.tx_aborted.inc();
                    }
                    self.slots.abort(slot);
                }
                debug!("tx: bus error {:#04x}, slots cleared", flags.raw());
            }
        }
    }

    pub fn last_state(&self) -> Option<ArbiterState> {
        self.arbiter.last_state()
    }

    pub fn slots(&self) -> &S {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut S {
        &mut self.slots
    }

    pub fn free(self) -> (S, D) {
        (self.slots, self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimClock, SimDelay, SimSlots, SlotState};

    const FRAME_US: u64 = 130;

    fn frame(id: u16) -> TxFrame {
        TxFrame::new(id, [id, 0, 0, 0])
    }

    #[test]
    fn prefers_slot_a() {
        let clock = SimClock::new();
        let diag = Diagnostics::new();
        let mut tx = TransmitContext::new(SimSlots::new(&clock, FRAME_US), SimDelay::new(&clock));

        assert_eq!(tx.transmit(&frame(0x600), &diag), TransmitOutcome::Sent(Slot::A));
        assert_eq!(tx.last_state(), Some(ArbiterState::Sent(Slot::A)));
        assert_eq!(diag.tx_attempted.get(), 1);
        assert_eq!(clock.now_us(), 0);
    }

    #[test]
    fn uses_slot_b_when_a_busy() {
        let clock = SimClock::new();
        let diag = Diagnostics::new();
        let mut slots = SimSlots::new(&clock, FRAME_US);
        slots.set_state(Slot::A, SlotState::Stuck);
        let mut tx = TransmitContext::new(slots, SimDelay::new(&clock));

        assert_eq!(tx.transmit(&frame(0x600), &diag), TransmitOutcome::Sent(Slot::B));
        assert_eq!(tx.slots().sent()[0], (Slot::B, frame(0x600)));
        assert_eq!(clock.now_us(), 0);
    }

    #[test]
    fn waits_for_slot_a_within_budget() {
        let clock = SimClock::new();
        let diag = Diagnostics::new();
        let mut slots = SimSlots::new(&clock, FRAME_US);
        slots.set_state(Slot::A, SlotState::BusyUntil(55));
        slots.set_state(Slot::B, SlotState::Stuck);
        let mut tx = TransmitContext::new(slots, SimDelay::new(&clock));

        assert_eq!(tx.transmit(&frame(0x602), &diag), TransmitOutcome::Sent(Slot::A));
        // Polled every 10 us; A observed free at the first poll at or after 55 us.
        assert_eq!(clock.now_us(), 60);
        assert_eq!(diag.tx_timeouts.get(), 0);
    }

    #[test]
    fn times_out_past_budget_and_counts_once() {
        let clock = SimClock::new();
        let diag = Diagnostics::new();
        let mut slots = SimSlots::new(&clock, FRAME_US);
        slots.set_state(Slot::A, SlotState::Stuck);
        slots.set_state(Slot::B, SlotState::Stuck);
        let mut tx = TransmitContext::new(slots, SimDelay::new(&clock));

        assert_eq!(tx.transmit(&frame(0x600), &diag), TransmitOutcome::TimedOut);
        assert_eq!(tx.last_state(), Some(ArbiterState::TimedOut));
        assert_eq!(diag.tx_timeouts.get(), 1);
        assert_eq!(diag.tx_attempted.get(), 0);
        assert_eq!(clock.now_us(), SLOT_WAIT_BUDGET_US as u64);
        assert!(tx.slots().sent().is_empty());
    }

    #[test]
    fn zero_interval_still_times_out() {
        let clock = SimClock::new();
        let diag = Diagnostics::new();
        let mut slots = SimSlots::new(&clock, FRAME_US);
        slots.set_state(Slot::A, SlotState::Stuck);
        slots.set_state(Slot::B, SlotState::Stuck);
        let arbiter = TransmitArbiter::new(0, 20);
        let mut tx = TransmitContext::with_arbiter(slots, SimDelay::new(&clock), arbiter);

        assert_eq!(tx.transmit(&frame(0x600), &diag), TransmitOutcome::TimedOut);
        assert_eq!(diag.tx_timeouts.get(), 1);
        assert_eq!(clock.now_us(), 20);
    }

    #[test]
    fn budget_near_max_does_not_wrap() {
        let clock = SimClock::new();
        let diag = Diagnostics::new();
        let mut slots = SimSlots::new(&clock, FRAME_US);
        slots.set_state(Slot::A, SlotState::Stuck);
        slots.set_state(Slot::B, SlotState::Stuck);
        let arbiter = TransmitArbiter::new(u32::MAX / 2 + 1, u32::MAX);
        let mut tx = TransmitContext::with_arbiter(slots, SimDelay::new(&clock), arbiter);

        assert_eq!(tx.transmit(&frame(0x600), &diag), TransmitOutcome::TimedOut);
        assert_eq!(diag.tx_timeouts.get(), 1);
    }

    #[test]
    fn pair_sends_second_frame_first() {
        let clock = SimClock::new();
        let diag = Diagnostics::new();
        let mut tx = TransmitContext::new(SimSlots::new(&clock, FRAME_US), SimDelay::new(&clock));

        let a = frame(0x600);
        let b = frame(0x602);
        let outcomes = tx.transmit_pair(&a, &b, &diag);

        assert_eq!(outcomes, [TransmitOutcome::Sent(Slot::B), TransmitOutcome::Sent(Slot::A)]);
        let sent = tx.slots().sent();
        assert_eq!(sent[0], (Slot::A, b));
        assert_eq!(sent[1], (Slot::B, a));
    }

    #[test]
    fn completion_counts_success() {
        let clock = SimClock::new();
        let diag = Diagnostics::new();
        let mut tx = TransmitContext::new(SimSlots::new(&clock, FRAME_US), SimDelay::new(&clock));

        tx.on_bus_event(BusEvent::TxComplete(Slot::A), &diag);
        assert_eq!(diag.tx_completed.get(), 1);
        assert_eq!(diag.bus_interrupts.get(), 1);
        assert_eq!(diag.bus_errors.get(), 0);
    }

    #[test]
    fn bus_error_decodes_causes_and_clears_slots() {
        let clock = SimClock::new();
        let diag = Diagnostics::new();
        let mut slots = SimSlots::new(&clock, FRAME_US);
        slots.set_state(Slot::A, SlotState::Stuck);
        slots.set_state(Slot::B, SlotState::Stuck);
        let mut tx = TransmitContext::new(slots, SimDelay::new(&clock));

        let flags = BusErrorFlags::from_raw(BusErrorFlags::BUS_OFF | BusErrorFlags::INVALID_FRAME);
        tx.on_bus_event(BusEvent::Error(flags), &diag);

        assert_eq!(diag.bus_errors.get(), 1);
        assert_eq!(diag.bus_off.get(), 1);
        assert_eq!(diag.invalid_frame.get(), 1);
        assert_eq!(diag.error_passive.get(), 0);
        assert_eq!(diag.error_warning.get(), 0);
        assert_eq!(diag.tx_aborted.get(), 2);
        assert!(!tx.slots_mut().is_busy(Slot::A));
        assert!(!tx.slots_mut().is_busy(Slot::B));

        // Slots are usable again straight away.
        assert_eq!(tx.transmit(&frame(0x600), &diag), TransmitOutcome::Sent(Slot::A));
    }
}
