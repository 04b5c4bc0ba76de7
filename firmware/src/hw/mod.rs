// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! MCU-level implementations of the bridge's hardware primitives.

pub mod adc;
pub mod can;
pub mod delay;
pub mod flash;
pub mod led;
pub mod pins;
pub mod timer;
pub mod usart;

pub use adc::Adc;
pub use can::CanSlots;
pub use delay::CycleDelay;
pub use flash::SectorFlash;
pub use led::Led;
pub use pins::BoardPins;
pub use timer::Tim2Tick;
pub use usart::{Console, Usart};
