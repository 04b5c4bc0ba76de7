// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! ADC1 single-shot conversions using direct PAC register access.
//!
//! Every conversion is software-triggered on one channel. The bridge core polls for completion
//! itself, with a bound, so nothing here blocks.

use canbridge::AdcConverter;
use stm32f7xx_hal::pac;

/// Sample time code written to SMPRx for every channel (144 cycles).
const SAMPLE_TIME: u8 = 0b110;

pub struct Adc<ADC> {
    adc: ADC,
}

impl<ADC> Adc<ADC> {
    #[inline]
    pub fn free(self) -> ADC {
        self.adc
    }
}

impl Adc<pac::ADC1> {
    /// Create and initialize ADC1.
    pub fn adc1(adc1: pac::ADC1) -> Self {
        let rcc = unsafe { &*pac::RCC::ptr() };
        rcc.apb2enr.modify(|_, w| w.adc1en().set_bit());

        let common = unsafe { &*pac::ADC_COMMON::ptr() };
        // ADC prescaler: PCLK2 / 2
        common.ccr.modify(|_, w| w.adcpre().div2());

        // Power off to configure
        adc1.cr2.modify(|_, w| w.adon().clear_bit());

        // 12-bit, right-aligned, single conversion, software trigger
        adc1.cr1.modify(|_, w| w.res().bits(0b00));
        adc1.cr2.modify(|_, w| {
            w.cont().clear_bit();
            w.align().right();
            w.exten().disabled();
            w
        });

        // One conversion per sequence
        adc1.sqr1.modify(|_, w| w.l().bits(0));

        // Same sample time on every input
        let smp = SAMPLE_TIME as u32;
        let smpr2 = (0..10).fold(0u32, |acc, ch| acc | (smp << (3 * ch)));
        let smpr1 = (0..9).fold(0u32, |acc, ch| acc | (smp << (3 * ch)));
        adc1.smpr2.write(|w| unsafe { w.bits(smpr2) });
        adc1.smpr1.write(|w| unsafe { w.bits(smpr1) });

        adc1.cr2.modify(|_, w| w.adon().set_bit());

        Self { adc: adc1 }
    }
}

impl AdcConverter for Adc<pac::ADC1> {
    fn start(&mut self, channel: u8) {
        // Drop a result or overrun left by a conversion nobody waited for.
        self.adc
            .sr
            .modify(|_, w| w.eoc().clear_bit().ovr().clear_bit());
        self.adc
            .sqr3
            .modify(|_, w| unsafe { w.sq1().bits(channel & 0x1F) });
        self.adc.cr2.modify(|_, w| w.swstart().set_bit());
    }

    #[inline]
    fn is_ready(&mut self) -> bool {
        self.adc.sr.read().eoc().bit_is_set()
    }

    /// Reading DR also clears EOC.
    #[inline]
    fn read(&mut self) -> u16 {
        self.adc.dr.read().data().bits() as u16
    }
}
