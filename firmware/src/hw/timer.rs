// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! TIM2 as the periodic tick source.
//!
//! The counter runs at 1 MHz and reloads once per tick, so `CNT` is the microseconds spent in the
//! current period and a set update flag at the end of the handler means the next tick is overdue.

use canbridge::TickTimer;
use stm32f7xx_hal::pac;

const COUNTER_HZ: u32 = 1_000_000;

pub struct Tim2Tick {
    tim: pac::TIM2,
}

impl Tim2Tick {
    /// Configure TIM2 to raise its update interrupt `tick_hz` times per second.
    pub fn new(tim2: pac::TIM2, timer_clock_hz: u32, tick_hz: u32) -> Self {
        let rcc = unsafe { &*pac::RCC::ptr() };
        rcc.apb1enr.modify(|_, w| w.tim2en().set_bit());

        let tim = tim2;

        // Disable counter while configuring
        tim.cr1.modify(|_, w| w.cen().clear_bit());

        let psc = (timer_clock_hz / COUNTER_HZ).saturating_sub(1);
        tim.psc.write(|w| unsafe { w.bits(psc) });
        tim.arr.write(|w| unsafe { w.bits(COUNTER_HZ / tick_hz.max(1) - 1) });

        // Load the prescaler now, then drop the flag that raised
        tim.egr.write(|w| w.ug().set_bit());
        tim.sr.modify(|_, w| w.uif().clear_bit());

        tim.dier.modify(|_, w| w.uie().set_bit());
        tim.cr1.modify(|_, w| w.cen().set_bit());

        Self { tim }
    }

    /// Acknowledge the update interrupt. Call first thing in the handler.
    #[inline]
    pub fn clear_update(&mut self) {
        self.tim.sr.modify(|_, w| w.uif().clear_bit());
    }

    #[inline]
    pub fn free(self) -> pac::TIM2 {
        self.tim
    }
}

impl TickTimer for Tim2Tick {
    #[inline]
    fn elapsed(&self) -> u32 {
        self.tim.cnt.read().bits()
    }

    #[inline]
    fn overrun_pending(&self) -> bool {
        self.tim.sr.read().uif().bit_is_set()
    }
}
