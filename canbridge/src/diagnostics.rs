// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Process-wide diagnostic counters and the console status report.
//!
//! [`Diagnostics`] is written from the periodic tick and the bus completion interrupt and read
//! from the mainline console. Every field is an independent atomic: a reader gets a consistent
//! value per field but no atomicity across fields, which is acceptable for a diagnostic display.

use core::fmt;
use core::sync::atomic::{AtomicU16, AtomicU32, Ordering};

use crate::acquisition::calibration::{reference_volts, Calibration, DEFAULT_CALIBRATION};
use crate::config::CHANNEL_COUNT;
use crate::storage::ConfigRecord;

/// Updates before [`ChannelStats`] starts a fresh min/max/average window.
pub const STATS_WINDOW: u32 = 1_000;

/// Event counter shared between interrupt priorities.
#[derive(Debug)]
pub struct Counter(AtomicU32);

impl Counter {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Add one, wrapping on overflow.
    #[inline]
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, value: u32) {
        self.0.store(value, Ordering::Relaxed);
    }

    /// Keep the largest value seen (worst-case timings).
    #[inline]
    pub fn record_max(&self, value: u32) {
        self.0.fetch_max(value, Ordering::Relaxed);
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// All counters maintained by the bridge.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Periodic ticks serviced.
    pub ticks: Counter,
    /// Worst-case timer ticks spent in one periodic tick.
    pub tick_time_max: Counter,
    /// Ticks that found the next tick already pending on exit.
    pub tick_overruns: Counter,
    /// Millisecond part of the uptime (0..=999).
    pub uptime_ms: Counter,
    /// Whole seconds of uptime.
    pub uptime_s: Counter,

    /// Conversions completed, including the reference channel.
    pub adc_conversions: Counter,
    /// Conversion requests for a channel the converter does not have.
    pub adc_out_of_range: Counter,
    /// Conversions that never signalled completion.
    pub adc_timeouts: Counter,
    /// Worst-case timer ticks from tick start to the end of a sampling pass.
    pub adc_capture_time_max: Counter,

    /// Frames loaded into a transmit slot and fired.
    pub tx_attempted: Counter,
    /// Frames dropped because no slot freed up within the wait budget.
    pub tx_timeouts: Counter,
    /// Transmissions the controller reported complete.
    pub tx_completed: Counter,
    /// Slots cleared after a bus error.
    pub tx_aborted: Counter,
    /// Completion or error events delivered by the bus controller.
    pub bus_interrupts: Counter,
    /// Bus error events, any cause.
    pub bus_errors: Counter,
    /// Error events with the controller in bus-off.
    pub bus_off: Counter,
    /// Error events with the controller error-passive.
    pub error_passive: Counter,
    /// Error events with the error-warning limit reached.
    pub error_warning: Counter,
    /// Error events caused by a malformed frame on the bus.
    pub invalid_frame: Counter,

    decimated: [AtomicU16; CHANNEL_COUNT],
    reference_raw: AtomicU16,
}

impl Diagnostics {
    pub const fn new() -> Self {
        Self {
            ticks: Counter::new(),
            tick_time_max: Counter::new(),
            tick_overruns: Counter::new(),
            uptime_ms: Counter::new(),
            uptime_s: Counter::new(),
            adc_conversions: Counter::new(),
            adc_out_of_range: Counter::new(),
            adc_timeouts: Counter::new(),
            adc_capture_time_max: Counter::new(),
            tx_attempted: Counter::new(),
            tx_timeouts: Counter::new(),
            tx_completed: Counter::new(),
            tx_aborted: Counter::new(),
            bus_interrupts: Counter::new(),
            bus_errors: Counter::new(),
            bus_off: Counter::new(),
            error_passive: Counter::new(),
            error_warning: Counter::new(),
            invalid_frame: Counter::new(),
            decimated: [const { AtomicU16::new(0) }; CHANNEL_COUNT],
            reference_raw: AtomicU16::new(0),
        }
    }

    /// Mirror the latest decimated values for the console.
    pub fn publish_decimated(&self, values: &[u16; CHANNEL_COUNT]) {
        for (slot, &v) in self.decimated.iter().zip(values.iter()) {
            slot.store(v, Ordering::Relaxed);
        }
    }

    pub fn publish_reference(&self, raw: u16) {
        self.reference_raw.store(raw, Ordering::Relaxed);
    }

    /// Latest decimated values. May mix two decimation periods if read during a tick.
    pub fn decimated(&self) -> [u16; CHANNEL_COUNT] {
        let mut out = [0u16; CHANNEL_COUNT];
        for (o, slot) in out.iter_mut().zip(self.decimated.iter()) {
            *o = slot.load(Ordering::Relaxed);
        }
        out
    }

    pub fn reference_raw(&self) -> u16 {
        self.reference_raw.load(Ordering::Relaxed)
    }

    /// Copy every counter into plain values.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            ticks: self.ticks.get(),
            tick_time_max: self.tick_time_max.get(),
            tick_overruns: self.tick_overruns.get(),
            uptime_ms: self.uptime_ms.get(),
            uptime_s: self.uptime_s.get(),
            adc_conversions: self.adc_conversions.get(),
            adc_out_of_range: self.adc_out_of_range.get(),
            adc_timeouts: self.adc_timeouts.get(),
            adc_capture_time_max: self.adc_capture_time_max.get(),
            tx_attempted: self.tx_attempted.get(),
            tx_timeouts: self.tx_timeouts.get(),
            tx_completed: self.tx_completed.get(),
            tx_aborted: self.tx_aborted.get(),
            bus_interrupts: self.bus_interrupts.get(),
            bus_errors: self.bus_errors.get(),
            bus_off: self.bus_off.get(),
            error_passive: self.error_passive.get(),
            error_warning: self.error_warning.get(),
            invalid_frame: self.invalid_frame.get(),
            decimated: self.decimated(),
            reference_raw: self.reference_raw(),
        }
    }
}

/// Plain copy of [`Diagnostics`] taken at one point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub ticks: u32,
    pub tick_time_max: u32,
    pub tick_overruns: u32,
    pub uptime_ms: u32,
    pub uptime_s: u32,
    pub adc_conversions: u32,
    pub adc_out_of_range: u32,
    pub adc_timeouts: u32,
    pub adc_capture_time_max: u32,
    pub tx_attempted: u32,
    pub tx_timeouts: u32,
    pub tx_completed: u32,
    pub tx_aborted: u32,
    pub bus_interrupts: u32,
    pub bus_errors: u32,
    pub bus_off: u32,
    pub error_passive: u32,
    pub error_warning: u32,
    pub invalid_frame: u32,
    pub decimated: [u16; CHANNEL_COUNT],
    pub reference_raw: u16,
}

/// Running min/max/average of one channel's calibrated voltage.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChannelStats {
    pub last: f32,
    pub min: f32,
    pub max: f32,
    sum: f32,
    count: u32,
}

impl ChannelStats {
    /// Fold in one reading. The first reading of a window seeds min, max and sum.
    pub fn update(&mut self, volts: f32) {
        if self.count >= STATS_WINDOW {
            self.count = 0;
        }
        if self.count == 0 {
            self.min = volts;
            self.max = volts;
            self.sum = volts;
        } else {
            self.min = self.min.min(volts);
            self.max = self.max.max(volts);
            self.sum += volts;
        }
        self.last = volts;
        self.count += 1;
    }

    pub fn average(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f32
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Mainline-owned state behind the console display.
#[derive(Clone, Debug)]
pub struct ConsoleStats {
    calibration: [Calibration; CHANNEL_COUNT],
    channels: [ChannelStats; CHANNEL_COUNT],
}

impl ConsoleStats {
    pub fn new(calibration: [Calibration; CHANNEL_COUNT]) -> Self {
        Self {
            calibration,
            channels: [ChannelStats::default(); CHANNEL_COUNT],
        }
    }

    /// Convert the latest decimated values and fold them into the running statistics.
    pub fn update(&mut self, decimated: &[u16; CHANNEL_COUNT]) {
        for ((stats, cal), &raw) in self
            .channels
            .iter_mut()
            .zip(self.calibration.iter())
            .zip(decimated.iter())
        {
            stats.update(cal.volts(raw));
        }
    }

    pub fn channels(&self) -> &[ChannelStats; CHANNEL_COUNT] {
        &self.channels
    }
}

impl Default for ConsoleStats {
    fn default() -> Self {
        Self::new(DEFAULT_CALIBRATION)
    }
}

/// Console status screen.
///
/// Lines end in CRLF for serial terminals.
pub struct StatusReport<'a> {
    pub snapshot: &'a Snapshot,
    pub stats: &'a ConsoleStats,
    pub config: &'a ConfigRecord,
}

impl fmt::Display for StatusReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.snapshot;
        let window = self.stats.channels[0].count();

        write!(f, "ADC-CAN Status\r\n")?;
        write!(f, "------------------------------------------\r\n")?;
        write!(f, "Uptime: {}.{:03}s  window: {}\r\n", s.uptime_s, s.uptime_ms, window)?;
        write!(f, "       RAW    VOLTS      MAX      MIN      AVG\r\n")?;
        for (i, (stats, raw)) in self.stats.channels.iter().zip(s.decimated.iter()).enumerate() {
            write!(
                f,
                "CH{}: {:04} {:+8.3} {:+8.3} {:+8.3} {:+8.3}\r\n",
                i,
                raw,
                stats.last,
                stats.max,
                stats.min,
                stats.average()
            )?;
        }
        write!(
            f,
            "VCC5: {:04} {:+8.3}\r\n",
            s.reference_raw,
            reference_volts(s.reference_raw)
        )?;
        write!(
            f,
            "CAN TX: {} completed, {} tried, {} timeouts, {} aborted\r\n",
            s.tx_completed, s.tx_attempted, s.tx_timeouts, s.tx_aborted
        )?;
        write!(
            f,
            "CAN errors: {} (bus-off {}, passive {}, warning {}, invalid {}), events {}\r\n",
            s.bus_errors, s.bus_off, s.error_passive, s.error_warning, s.invalid_frame,
            s.bus_interrupts
        )?;
        write!(
            f,
            "ADC: {} conversions, {} out of range, {} timeouts\r\n",
            s.adc_conversions, s.adc_out_of_range, s.adc_timeouts
        )?;
        write!(
            f,
            "ADC capture time: {} ticks, tick service time: {} ticks, overruns: {}\r\n",
            s.adc_capture_time_max, s.tick_time_max, s.tick_overruns
        )?;
        write!(
            f,
            "Boots: {}  ID A: {:#05x}  ID B: {:#05x}  serial: {}\r\n",
            self.config.boot_count,
            self.config.frame_a.id,
            self.config.frame_b.id,
            self.config.serial_number
        )
    }
}
