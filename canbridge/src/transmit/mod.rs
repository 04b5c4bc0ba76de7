// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

pub mod arbiter;

pub use arbiter::{
    ArbiterState, BusErrorFlags, BusEvent, Slot, TransmitArbiter, TransmitContext,
    TransmitOutcome, TxSlots,
};
