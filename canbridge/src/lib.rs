// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # CAN Bridge Core
//!
//! Hardware-independent core of the ADC-to-CAN bridge firmware. The bridge samples eight analog
//! channels at 1 kHz, decimates them 10:1, packs the results into two CAN frames every 10 ms and
//! keeps its bus identifiers and boot count in a flash-emulated EEPROM.
//!
//! Everything that touches a peripheral goes through a narrow trait, so this crate builds and tests
//! on the host. The `canbridge-firmware` crate provides the STM32F777 implementations.
//!
//! ## Crate Structure
//!
//! | Module | Purpose |
//! | ------ | -------- |
//! | [`config`] | Compile-time constants (rates, budgets, default identifiers) |
//! | [`storage`] | Emulated EEPROM and the persisted [`ConfigRecord`] store |
//! | [`acquisition`] | Fixed-rate sampling, 10:1 decimation and display calibration |
//! | [`protocol`] | Bus frame layout and the frame builder |
//! | [`transmit`] | Two-slot transmit arbitration and bus error recovery |
//! | [`scheduler`] | The periodic tick tying acquisition and transmission together |
//! | [`diagnostics`] | Process-wide counters and the console status report |
//! | `sim` | Test doubles for every hardware primitive (`sim` feature) |
//!
//! ## Getting Started
//!
//! Run the host tests and the simulator:
//!
//! ```bash
//! cargo test
//! RUST_LOG=debug cargo run -p canbridge-sim
//! ```
//!
//! ## License
//!
//! Licensed under the **MIT License**.
//!
//! © 2025–2026 Christopher Liu

#![no_std]

#[cfg(test)]
extern crate std;

pub mod acquisition;
pub mod config;
pub mod diagnostics;
pub mod protocol;
pub mod scheduler;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod storage;
pub mod transmit;

pub use acquisition::{AcquisitionContext, AdcConverter};
pub use diagnostics::Diagnostics;
pub use protocol::{FrameBuilder, TxFrame};
pub use scheduler::{Scheduler, TickTimer};
pub use storage::{ConfigRecord, ConfigStore, WordStorage};
pub use transmit::{TransmitArbiter, TransmitContext, TxSlots};
