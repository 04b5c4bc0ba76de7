// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Host simulator for the ADC-to-CAN bridge.
//!
//! Runs the bridge core against the simulated ADC, transmit slots and flash, feeding a slow
//! synthetic waveform into every channel. Decoded sample frames are logged at `debug`, and the
//! console status report is printed once per simulated second.
//!
//! ```bash
//! RUST_LOG=debug cargo run -p canbridge-sim -- 3
//! ```
//!
//! The optional argument is the run length in seconds.

use std::env;

use log::{debug, info, warn};

use canbridge::config::{ADC_FULL_SCALE, CHANNEL_COUNT, EEPROM_WORDS, TICK_HZ};
use canbridge::diagnostics::{ConsoleStats, StatusReport};
use canbridge::protocol::decode_samples;
use canbridge::sim::{RamFlash, SimAdc, SimClock, SimDelay, SimSlots, SimTimer};
use canbridge::storage::EmulatedEeprom;
use canbridge::transmit::BusEvent;
use canbridge::{
    AcquisitionContext, ConfigStore, Diagnostics, FrameBuilder, Scheduler, TransmitContext,
};

// ---------------------------------------------------------------------------
// Board model
// ---------------------------------------------------------------------------

const CHANNEL_MAP: [u8; CHANNEL_COUNT] = [0, 1, 2, 3, 4, 5, 6, 7];
const REFERENCE_CHANNEL: u8 = 10;

/// 5 V through the 1/3 divider against a 2.49 V reference.
const REFERENCE_COUNTS: u16 = 2742;

/// Bus time of one 8-byte frame at 1 Mbit/s, rounded up.
const FRAME_TIME_US: u64 = 130;

const DEFAULT_RUN_SECONDS: u32 = 2;

/// Emulated flash large enough for a few hundred saves per page.
type Flash = RamFlash<512>;

// ---------------------------------------------------------------------------
// Synthetic inputs
// ---------------------------------------------------------------------------

/// Channel `ch` at time `t` seconds: a triangle wave, phase-shifted per channel.
fn waveform(ch: usize, t: f64) -> u16 {
    let period = 1.0 + 0.25 * ch as f64;
    let phase = (t / period + ch as f64 / CHANNEL_COUNT as f64).fract();
    let tri = if phase < 0.5 { phase * 2.0 } else { 2.0 - phase * 2.0 };
    (tri * ADC_FULL_SCALE as f64) as u16
}

fn drive_inputs(adc: &mut SimAdc, t: f64) {
    for (ch, &input) in CHANNEL_MAP.iter().enumerate() {
        adc.set(input, waveform(ch, t));
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();

    let seconds = match env::args().nth(1) {
        Some(arg) => arg.parse().unwrap_or_else(|_| {
            warn!("ignoring run length {:?}, using {} s", arg, DEFAULT_RUN_SECONDS);
            DEFAULT_RUN_SECONDS
        }),
        None => DEFAULT_RUN_SECONDS,
    };
    info!("Starting canbridge simulator for {} s", seconds);

    let clock = SimClock::new();
    let timer = SimTimer::new();
    let diag = Diagnostics::new();

    // Persisted configuration
    let mut store = ConfigStore::new(EmulatedEeprom::new(Flash::new(), EEPROM_WORDS));
    let config = store.init();
    info!(
        "config {:?}: boot {}, frame ids {:#05x}/{:#05x}, startup id {:#05x}",
        store.outcome(),
        config.boot_count,
        config.frame_a.id,
        config.frame_b.id,
        config.startup_id
    );

    // Bus
    let mut tx = TransmitContext::new(
        SimSlots::new(&clock, FRAME_TIME_US),
        SimDelay::new(&clock),
    );
    let outcome = tx.transmit(&FrameBuilder::startup(&config), &diag);
    info!("startup frame {:?}", outcome);
    tx.slots_mut().clear_sent();

    // Inputs
    let mut adc = SimAdc::new();
    adc.set(REFERENCE_CHANNEL, REFERENCE_COUNTS);
    drive_inputs(&mut adc, 0.0);
    let mut acq = AcquisitionContext::new(adc, CHANNEL_MAP, REFERENCE_CHANNEL);

    let mut scheduler = Scheduler::new();
    let mut stats = ConsoleStats::default();
    let tick_us = 1_000_000 / TICK_HZ as u64;

    for tick in 1..=seconds * TICK_HZ {
        clock.advance_us(tick_us);
        drive_inputs(acq.adc_mut(), clock.now_us() as f64 / 1e6);

        while let Some(slot) = tx.slots_mut().take_completed() {
            tx.on_bus_event(BusEvent::TxComplete(slot), &diag);
        }

        let out = scheduler.tick(&mut acq, &mut tx, &config, &timer, &diag);
        if out.overrun {
            warn!("tick {} overran", tick);
        }

        for (slot, frame) in tx.slots().sent() {
            debug!(
                "{:?} id {:#05x} seq {:5} samples {:?}",
                slot,
                frame.id(),
                frame.sequence(),
                decode_samples(frame)
            );
        }
        tx.slots_mut().clear_sent();

        if out.decimated {
            stats.update(&diag.decimated());
        }

        if tick % TICK_HZ == 0 {
            let snapshot = diag.snapshot();
            let report = StatusReport {
                snapshot: &snapshot,
                stats: &stats,
                config: &config,
            };
            print!("{}", report);
        }
    }

    info!(
        "done: {} frames sent, {} timeouts",
        diag.tx_completed.get(),
        diag.tx_timeouts.get()
    );
}
