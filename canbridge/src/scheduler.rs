// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! The periodic tick.
//!
//! Called once per timer period from the highest-priority interrupt. Each call:
//!
//! 1. advances the millisecond/second uptime clock,
//! 2. samples every channel (while capture is enabled),
//! 3. every [`FRAME_DIVIDER`] ticks builds and transmits both sample frames,
//! 4. records its own worst-case service time and flags an overrun if the next period already
//!    elapsed.

use embedded_hal::delay::DelayNs;
use log::trace;

use crate::acquisition::{AcquisitionContext, AdcConverter};
use crate::config::{FRAME_DIVIDER, TICK_HZ};
use crate::diagnostics::Diagnostics;
use crate::protocol::{FrameBuilder, SequenceCounter};
use crate::storage::ConfigRecord;
use crate::transmit::{TransmitContext, TransmitOutcome, TxSlots};

/// Hardware timer driving the tick.
pub trait TickTimer {
    /// Timer counts since the current period started.
    fn elapsed(&self) -> u32;

    /// True if the next period has already started.
    fn overrun_pending(&self) -> bool;
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub sampled: bool,
    pub decimated: bool,
    /// Outcomes for frame A and frame B, when frames were due.
    pub frames: Option<[TransmitOutcome; 2]>,
    pub overrun: bool,
}

const MS_PER_TICK: u32 = 1_000 / TICK_HZ;

pub struct Scheduler {
    cycle: u8,
    divider: u8,
    sequence: SequenceCounter,
    ms: u32,
    seconds: u32,
    capture_enabled: bool,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self::with_divider(FRAME_DIVIDER)
    }

    /// Transmit every `divider` ticks. A divider of 0 is treated as 1.
    pub const fn with_divider(divider: u8) -> Self {
        Self {
            cycle: 0,
            divider: if divider == 0 { 1 } else { divider },
            sequence: SequenceCounter::new(),
            ms: 0,
            seconds: 0,
            capture_enabled: true,
        }
    }

    /// While disabled the tick only keeps time.
    pub fn set_capture_enabled(&mut self, enabled: bool) {
        self.capture_enabled = enabled;
    }

    pub fn capture_enabled(&self) -> bool {
        self.capture_enabled
    }

    pub fn cycle(&self) -> u8 {
        self.cycle
    }

    /// Uptime as (seconds, milliseconds).
    pub fn uptime(&self) -> (u32, u32) {
        (self.seconds, self.ms)
    }

    pub fn next_sequence(&self) -> u16 {
        self.sequence.peek()
    }

    pub fn tick<A, S, D, T>(
        &mut self,
        acq: &mut AcquisitionContext<A>,
        tx: &mut TransmitContext<S, D>,
        config: &ConfigRecord,
        timer: &T,
        diag: &Diagnostics,
    ) -> TickOutcome
    where
        A: AdcConverter,
        S: TxSlots,
        D: DelayNs,
        T: TickTimer,
    {
        let mut outcome = TickOutcome::default();
        diag.ticks.inc();

        self.ms += MS_PER_TICK;
        if self.ms >= 1_000 {
            self.ms -= 1_000;
            self.seconds = self.seconds.wrapping_add(1);
        }
        diag.uptime_ms.set(self.ms);
        diag.uptime_s.set(self.seconds);

        self.cycle = (self.cycle + 1) % self.divider;

        if self.capture_enabled {
            outcome.sampled = true;
            outcome.decimated = acq.sample_all_channels(timer, diag);

            if self.cycle == 0 {
                let seq = self.sequence.next();
                let (a, b) = FrameBuilder::build(acq.decimated(), config, seq);
                outcome.frames = Some(tx.transmit_pair(&a, &b, diag));
                trace!("tick: frames {} sent", seq);
            }
        }

        diag.tick_time_max.record_max(timer.elapsed());
        if timer.overrun_pending() {
            diag.tick_overruns.inc();
            outcome.overrun = true;
        }
        outcome
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
