// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! CAN1 transmit mailboxes as the bridge's two transmit slots.
//!
//! - Bring-up (bit timing, interrupt enables) goes through `bxcan`.
//! - Mailboxes 0 and 1 are driven directly through the CAN1 registers so the arbiter decides which
//!   slot a frame lands in. Mailbox 2 is left unused.
//! - `take_completions` and `take_error` are called from the CAN1_TX and CAN1_SCE interrupts.

use bxcan::Interrupts;
use canbridge::transmit::{BusErrorFlags, Slot, TxSlots};
use canbridge::TxFrame;
use stm32f7xx_hal::{can as hal_can, pac};

// TSR
const TSR_RQCP: [u32; 2] = [1 << 0, 1 << 8];
const TSR_TXOK: [u32; 2] = [1 << 1, 1 << 9];
const TSR_ABRQ: [u32; 2] = [1 << 7, 1 << 15];
const TSR_TME: [u32; 2] = [1 << 26, 1 << 27];

// ESR
const ESR_EWGF: u32 = 1 << 0;
const ESR_EPVF: u32 = 1 << 1;
const ESR_BOFF: u32 = 1 << 2;
const ESR_LEC_SHIFT: u32 = 4;
const ESR_LEC_MASK: u32 = 0b111 << ESR_LEC_SHIFT;

// MSR
const MSR_ERRI: u32 = 1 << 2;

// TIxR
const TIR_TXRQ: u32 = 1 << 0;
const TIR_STID_SHIFT: u32 = 21;

/// CAN_BTR for 1 Mbit/s from a 16 MHz APB1 clock: 16 tq, 87.5 % sample point.
pub const BTR_1M_16MHZ: u32 = 0x001C_0000;

/// Compute CAN_BTR for `bitrate` with a sample point near 87.5 %.
///
/// Returns `None` when no prescaler divides the clock into 8..=25 time quanta per bit.
pub fn bit_timing(pclk1_hz: u32, bitrate: u32) -> Option<u32> {
    if bitrate == 0 {
        return None;
    }
    (1..=1024u32).find_map(|brp| {
        let per_bit = brp.checked_mul(bitrate)?;
        if pclk1_hz % per_bit != 0 {
            return None;
        }
        let tq = pclk1_hz / per_bit;
        if !(8..=25).contains(&tq) {
            return None;
        }
        let ts2 = ((tq + 4) / 8).clamp(1, 8);
        let ts1 = tq - 1 - ts2;
        if !(1..=16).contains(&ts1) {
            return None;
        }
        Some(((ts2 - 1) << 20) | ((ts1 - 1) << 16) | (brp - 1))
    })
}

pub struct CanSlots {
    _can: bxcan::Can<hal_can::Can<pac::CAN1>>,
}

impl CanSlots {
    /// Enable CAN1 at the given bit timing with completion and error interrupts.
    pub fn new(can1: hal_can::Can<pac::CAN1>, btr: u32) -> Self {
        let mut can = bxcan::Can::builder(can1).set_bit_timing(btr).enable();
        can.enable_interrupts(
            Interrupts::TRANSMIT_MAILBOX_EMPTY
                | Interrupts::ERROR_WARNING
                | Interrupts::ERROR_PASSIVE
                | Interrupts::BUS_OFF
                | Interrupts::LAST_ERROR_CODE
                | Interrupts::ERROR,
        );
        Self { _can: can }
    }

    #[inline]
    fn regs() -> &'static pac::can1::RegisterBlock {
        unsafe { &*pac::CAN1::ptr() }
    }

    /// Acknowledge finished mailboxes. Aborted or failed requests are cleared but not reported.
    pub fn take_completions(&mut self) -> [Option<Slot>; 2] {
        let regs = Self::regs();
        let tsr = regs.tsr.read().bits();
        let mut out = [None; 2];
        let mut clear = 0;
        for slot in Slot::ALL {
            let n = slot.index();
            if tsr & TSR_RQCP[n] != 0 {
                clear |= TSR_RQCP[n];
                if tsr & TSR_TXOK[n] != 0 {
                    out[n] = Some(slot);
                }
            }
        }
        if clear != 0 {
            regs.tsr.write(|w| unsafe { w.bits(clear) });
        }
        out
    }

    /// Latched error state, if the error interrupt fired.
    pub fn take_error(&mut self) -> Option<BusErrorFlags> {
        let regs = Self::regs();
        if regs.msr.read().bits() & MSR_ERRI == 0 {
            return None;
        }

        let esr = regs.esr.read().bits();
        let mut raw = 0;
        if esr & ESR_BOFF != 0 {
            raw |= BusErrorFlags::BUS_OFF;
        }
        if esr & ESR_EPVF != 0 {
            raw |= BusErrorFlags::ERROR_PASSIVE;
        }
        if esr & ESR_EWGF != 0 {
            raw |= BusErrorFlags::ERROR_WARNING;
        }
        if esr & ESR_LEC_MASK != 0 {
            raw |= BusErrorFlags::INVALID_FRAME;
        }

        // Reset LEC so the next error code is seen as new, then acknowledge.
        regs.esr
            .modify(|r, w| unsafe { w.bits(r.bits() & !ESR_LEC_MASK) });
        regs.msr.write(|w| unsafe { w.bits(MSR_ERRI) });

        Some(BusErrorFlags::from_raw(raw))
    }
}

impl TxSlots for CanSlots {
    #[inline]
    fn is_busy(&mut self, slot: Slot) -> bool {
        Self::regs().tsr.read().bits() & TSR_TME[slot.index()] == 0
    }

    fn load(&mut self, slot: Slot, frame: &TxFrame) {
        let mb = &Self::regs().tx[slot.index()];
        let data = frame.data();
        let id = (frame.standard_id().as_raw() as u32) << TIR_STID_SHIFT;

        mb.tir.write(|w| unsafe { w.bits(id) });
        mb.tdtr.write(|w| unsafe { w.bits(frame.dlc().min(8) as u32) });
        mb.tdlr
            .write(|w| unsafe { w.bits(u32::from_le_bytes([data[0], data[1], data[2], data[3]])) });
        mb.tdhr
            .write(|w| unsafe { w.bits(u32::from_le_bytes([data[4], data[5], data[6], data[7]])) });
    }

    fn fire(&mut self, slot: Slot) {
        let mb = &Self::regs().tx[slot.index()];
        mb.tir.modify(|r, w| unsafe { w.bits(r.bits() | TIR_TXRQ) });
    }

    fn abort(&mut self, slot: Slot) {
        let regs = Self::regs();
        regs.tsr.write(|w| unsafe { w.bits(TSR_ABRQ[slot.index()]) });
    }
}
