// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Busy-wait delay counted in core cycles.
//!
//! Owns no peripheral, so it can live inside interrupt-owned state.

use embedded_hal::delay::DelayNs;

pub struct CycleDelay {
    sysclk_hz: u32,
}

impl CycleDelay {
    pub fn new(sysclk_hz: u32) -> Self {
        Self { sysclk_hz }
    }
}

impl DelayNs for CycleDelay {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = (ns as u64 * self.sysclk_hz as u64) / 1_000_000_000;
        cortex_m::asm::delay(cycles.max(1) as u32);
    }
}
