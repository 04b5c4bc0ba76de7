// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Fixed-rate multi-channel sampling with 10:1 decimation.
//!
//! Every tick converts each monitored channel once and stores the result in a per-channel ring at
//! a shared index, so all channels advance in lock-step. When the index wraps, each ring holds the
//! last [`DECIMATION_FACTOR`] samples in chronological order and is reduced to one value.

use crate::config::{
    ADC_FULL_SCALE, ADC_MAX_CHANNEL, ADC_READY_SPIN_LIMIT, CHANNEL_COUNT, DECIMATION_FACTOR,
};
use crate::diagnostics::Diagnostics;
use crate::scheduler::TickTimer;

/// Single-shot conversion primitives of the analog front end.
pub trait AdcConverter {
    /// Select `channel` and start one conversion.
    fn start(&mut self, channel: u8);

    /// True once the started conversion has completed.
    fn is_ready(&mut self) -> bool;

    /// Result of the last completed conversion. Clears the ready state.
    fn read(&mut self) -> u16;
}

/// Reduction applied to each channel's window of raw samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecimationFilter {
    /// Truncating integer mean.
    Mean,
    /// Weighted sum divided by the tap total. Taps are ordered oldest sample first.
    Weighted([u16; DECIMATION_FACTOR]),
}

impl DecimationFilter {
    pub fn apply(&self, window: &[u16; DECIMATION_FACTOR]) -> u16 {
        match self {
            DecimationFilter::Mean => {
                let sum: u32 = window.iter().map(|&v| v as u32).sum();
                (sum / DECIMATION_FACTOR as u32) as u16
            }
            DecimationFilter::Weighted(taps) => {
                let total: u32 = taps.iter().map(|&t| t as u32).sum();
                if total == 0 {
                    return 0;
                }
                let acc: u64 = taps
                    .iter()
                    .zip(window.iter())
                    .map(|(&t, &v)| t as u64 * v as u64)
                    .sum();
                (acc / total as u64) as u16
            }
        }
    }
}

/// Sampling state. Sole writer of the raw rings and the decimated values.
pub struct AcquisitionContext<A> {
    adc: A,
    channel_map: [u8; CHANNEL_COUNT],
    reference_channel: u8,
    filter: DecimationFilter,

    ring: [[u16; DECIMATION_FACTOR]; CHANNEL_COUNT],
    index: usize,
    decimated: [u16; CHANNEL_COUNT],
    reference_raw: u16,
}

impl<A: AdcConverter> AcquisitionContext<A> {
    /// `channel_map[i]` is the converter input wired to logical channel `i`.
    pub fn new(adc: A, channel_map: [u8; CHANNEL_COUNT], reference_channel: u8) -> Self {
        Self {
            adc,
            channel_map,
            reference_channel,
            filter: DecimationFilter::Mean,
            ring: [[0; DECIMATION_FACTOR]; CHANNEL_COUNT],
            index: 0,
            decimated: [0; CHANNEL_COUNT],
            reference_raw: 0,
        }
    }

    /// Replace the default truncating mean.
    pub fn with_filter(mut self, filter: DecimationFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Run one conversion and wait, bounded, for the result.
    ///
    /// Returns 0 for a channel the converter does not have or a conversion that never completes.
    pub fn convert(&mut self, channel: u8, diag: &Diagnostics) -> u16 {
        if channel > ADC_MAX_CHANNEL {
            diag.adc_out_of_range.inc();
            return 0;
        }

        // A conversion that completed after an earlier timeout is still flagged ready.
        if self.adc.is_ready() {
            let _ = self.adc.read();
        }
        self.adc.start(channel);

        let mut spins = 0;
        while !self.adc.is_ready() {
            spins += 1;
            if spins >= ADC_READY_SPIN_LIMIT {
                diag.adc_timeouts.inc();
                return 0;
            }
        }

        diag.adc_conversions.inc();
        self.adc.read() & ADC_FULL_SCALE
    }

    /// Sample every monitored channel plus the reference, then advance the ring.
    ///
    /// Returns true when this pass completed a window and the decimated values were refreshed.
    pub fn sample_all_channels<T: TickTimer>(&mut self, timer: &T, diag: &Diagnostics) -> bool {
        let slot = self.index;
        for ch in 0..CHANNEL_COUNT {
            let raw = self.convert(self.channel_map[ch], diag);
            self.ring[ch][slot] = raw;
        }

        self.reference_raw = self.convert(self.reference_channel, diag);
        diag.publish_reference(self.reference_raw);

        self.index = (self.index + 1) % DECIMATION_FACTOR;
        let decimated = self.index == 0;
        if decimated {
            self.decimate();
            diag.publish_decimated(&self.decimated);
        }

        diag.adc_capture_time_max.record_max(timer.elapsed());
        decimated
    }

    /// Reduce each channel's window to one value.
    pub fn decimate(&mut self) {
        for (out, window) in self.decimated.iter_mut().zip(self.ring.iter()) {
            *out = self.filter.apply(window);
        }
    }

    pub fn decimated(&self) -> &[u16; CHANNEL_COUNT] {
        &self.decimated
    }

    pub fn reference_raw(&self) -> u16 {
        self.reference_raw
    }

    /// Ring slot the next pass writes.
    pub fn ring_index(&self) -> usize {
        self.index
    }

    pub fn adc_mut(&mut self) -> &mut A {
        &mut self.adc
    }

    pub fn free(self) -> A {
        self.adc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimAdc, SimTimer};

    const MAP: [u8; CHANNEL_COUNT] = [0, 1, 2, 3, 4, 5, 9, 10];
    const REF: u8 = 11;

    fn context() -> AcquisitionContext<SimAdc> {
        AcquisitionContext::new(SimAdc::new(), MAP, REF)
    }

    #[test]
    fn mean_truncates() {
        let window = [10, 10, 10, 10, 10, 10, 10, 10, 10, 19];
        assert_eq!(DecimationFilter::Mean.apply(&window), 10);

        let window = [4095; DECIMATION_FACTOR];
        assert_eq!(DecimationFilter::Mean.apply(&window), 4095);

        let window = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        assert_eq!(DecimationFilter::Mean.apply(&window), 4);
    }

    #[test]
    fn weighted_taps_favor_newest() {
        let mut taps = [0u16; DECIMATION_FACTOR];
        taps[DECIMATION_FACTOR - 1] = 1;
        let window = [1, 2, 3, 4, 5, 6, 7, 8, 9, 100];
        assert_eq!(DecimationFilter::Weighted(taps).apply(&window), 100);
        assert_eq!(DecimationFilter::Weighted([0; DECIMATION_FACTOR]).apply(&window), 0);
    }

    #[test]
    fn decimates_only_when_ring_wraps() {
        let diag = Diagnostics::new();
        let timer = SimTimer::new();
        let mut acq = context();
        let samples = [10, 10, 10, 10, 10, 10, 10, 10, 10, 19];

        for (i, &s) in samples.iter().enumerate() {
            for &input in MAP.iter() {
                acq.adc_mut().set(input, s + input as u16);
            }
            let refreshed = acq.sample_all_channels(&timer, &diag);
            assert_eq!(refreshed, i == DECIMATION_FACTOR - 1);
            if !refreshed {
                assert_eq!(acq.decimated(), &[0; CHANNEL_COUNT]);
            }
        }

        assert_eq!(acq.ring_index(), 0);
        for (ch, &input) in MAP.iter().enumerate() {
            // Nine samples of 10 + input and one of 19 + input.
            assert_eq!(acq.decimated()[ch], 10 + input as u16);
        }
        assert_eq!(diag.decimated(), *acq.decimated());
    }

    #[test]
    fn counts_every_conversion_including_reference() {
        let diag = Diagnostics::new();
        let timer = SimTimer::new();
        timer.set_elapsed(42);
        let mut acq = context();
        acq.adc_mut().set(REF, 2742);

        acq.sample_all_channels(&timer, &diag);

        assert_eq!(diag.adc_conversions.get(), CHANNEL_COUNT as u32 + 1);
        assert_eq!(acq.reference_raw(), 2742);
        assert_eq!(diag.reference_raw(), 2742);
        assert_eq!(diag.adc_capture_time_max.get(), 42);
    }

    #[test]
    fn out_of_range_channel_reads_zero_without_touching_others() {
        let diag = Diagnostics::new();
        let timer = SimTimer::new();
        let mut map = MAP;
        map[3] = ADC_MAX_CHANNEL + 1;
        let mut acq = AcquisitionContext::new(SimAdc::new(), map, REF);
        for &input in map.iter() {
            acq.adc_mut().set(input, 1000);
        }

        for _ in 0..DECIMATION_FACTOR {
            acq.sample_all_channels(&timer, &diag);
        }

        assert_eq!(diag.adc_out_of_range.get(), DECIMATION_FACTOR as u32);
        assert_eq!(acq.decimated()[3], 0);
        for ch in (0..CHANNEL_COUNT).filter(|&c| c != 3) {
            assert_eq!(acq.decimated()[ch], 1000);
        }
    }

    #[test]
    fn stuck_conversion_times_out() {
        let diag = Diagnostics::new();
        let mut acq = context();
        acq.adc_mut().set(0, 1234);
        acq.adc_mut().set_stuck(true);

        assert_eq!(acq.convert(0, &diag), 0);
        assert_eq!(diag.adc_timeouts.get(), 1);
        assert_eq!(diag.adc_conversions.get(), 0);
    }

    #[test]
    fn late_result_after_timeout_is_not_reused() {
        let diag = Diagnostics::new();
        let mut acq = context();
        acq.adc_mut().set(0, 111);
        acq.adc_mut().set(1, 222);

        acq.adc_mut().set_stuck(true);
        assert_eq!(acq.convert(0, &diag), 0);
        assert_eq!(diag.adc_timeouts.get(), 1);

        // Channel 0 finishes after the wait was abandoned.
        acq.adc_mut().set_stuck(false);
        acq.adc_mut().finish_pending();

        assert_eq!(acq.convert(1, &diag), 222);
        assert_eq!(acq.convert(0, &diag), 111);
    }

    #[test]
    fn results_are_masked_to_twelve_bits() {
        let diag = Diagnostics::new();
        let mut acq = context();
        acq.adc_mut().set(1, 0xF123);
        assert_eq!(acq.convert(1, &diag), 0x0123);
    }
}
