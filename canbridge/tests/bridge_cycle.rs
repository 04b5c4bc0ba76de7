// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! End-to-end runs of the bridge against the simulated hardware.

use canbridge::config::{CHANNEL_COUNT, EEPROM_WORDS, SLOT_WAIT_BUDGET_US};
use canbridge::protocol::decode_samples;
use canbridge::sim::{RamFlash, SimAdc, SimClock, SimDelay, SimSlots, SimTimer, SlotState};
use canbridge::storage::{EmulatedEeprom, LoadOutcome};
use canbridge::transmit::{BusErrorFlags, BusEvent, Slot, TransmitOutcome};
use canbridge::{
    AcquisitionContext, ConfigRecord, ConfigStore, Diagnostics, FrameBuilder, Scheduler,
    TransmitContext,
};

type Flash = RamFlash<512>;

const MAP: [u8; CHANNEL_COUNT] = [0, 1, 2, 3, 4, 5, 6, 7];
const REFERENCE: u8 = 10;
const FRAME_US: u64 = 130;

fn boot(flash: Flash) -> (ConfigRecord, LoadOutcome, Flash) {
    let mut store = ConfigStore::new(EmulatedEeprom::new(flash, EEPROM_WORDS));
    let record = store.init();
    let outcome = store.outcome();
    (record, outcome, store.free().free())
}

#[test]
fn boot_count_persists_across_power_cycles() {
    let mut flash = Flash::new();
    for expected in 1..=200u32 {
        let (record, outcome, f) = boot(flash);
        assert_eq!(record.boot_count, expected);
        if expected == 1 {
            assert_eq!(outcome, LoadOutcome::NoSignature);
        } else {
            assert_eq!(outcome, LoadOutcome::Loaded);
        }
        flash = f;
    }
    // Enough saves to force several page transfers.
    assert!(flash.erases() > 2);
}

#[test]
fn console_save_survives_reboot() {
    let mut store = ConfigStore::new(EmulatedEeprom::new(Flash::new(), EEPROM_WORDS));
    let mut record = store.init();
    record.frame_a.id = 0x610;
    record.serial_number = 77;
    assert!(store.request_save(&record));

    let (loaded, outcome, _) = boot(store.free().free());
    assert_eq!(outcome, LoadOutcome::Loaded);
    assert_eq!(loaded.frame_a.id, 0x610);
    assert_eq!(loaded.serial_number, 77);
    assert_eq!(loaded.boot_count, record.boot_count + 1);
}

#[test]
fn one_second_of_traffic() {
    let clock = SimClock::new();
    let timer = SimTimer::new();
    let diag = Diagnostics::new();
    let (config, _, _) = boot(Flash::new());

    let mut adc = SimAdc::new();
    for (ch, &input) in MAP.iter().enumerate() {
        adc.set(input, 512 * ch as u16);
    }
    adc.set(REFERENCE, 2742);

    let mut acq = AcquisitionContext::new(adc, MAP, REFERENCE);
    let mut tx = TransmitContext::new(SimSlots::new(&clock, FRAME_US), SimDelay::new(&clock));
    let mut sched = Scheduler::new();

    assert!(tx.transmit(&FrameBuilder::startup(&config), &diag).is_sent());

    let mut sample_frames = 0;
    for _ in 0..1_000 {
        clock.advance_us(1_000);
        while let Some(slot) = tx.slots_mut().take_completed() {
            tx.on_bus_event(BusEvent::TxComplete(slot), &diag);
        }

        let out = sched.tick(&mut acq, &mut tx, &config, &timer, &diag);
        if let Some(frames) = out.frames {
            assert!(frames.iter().all(TransmitOutcome::is_sent));
            sample_frames += 2;
        }

        for (_, frame) in tx.slots().sent().iter().filter(|(_, f)| f.id() == config.frame_a.id) {
            assert_eq!(decode_samples(frame), [0, 512, 1024, 1536]);
        }
        tx.slots_mut().clear_sent();
    }

    assert_eq!(sample_frames, 200);
    assert_eq!(diag.tx_attempted.get(), 201);
    assert_eq!(diag.tx_timeouts.get(), 0);
    // The last pair is still on the bus.
    assert_eq!(diag.tx_completed.get(), 199);
    assert_eq!(diag.uptime_s.get(), 1);
    assert_eq!(diag.reference_raw(), 2742);
    assert_eq!(diag.decimated(), [0, 512, 1024, 1536, 2048, 2560, 3072, 3584]);
}

#[test]
fn bus_error_recovers_on_next_cycle() {
    let clock = SimClock::new();
    let timer = SimTimer::new();
    let diag = Diagnostics::new();
    let config = ConfigRecord::defaults();
    let mut acq = AcquisitionContext::new(SimAdc::new(), MAP, REFERENCE);
    let mut slots = SimSlots::new(&clock, FRAME_US);
    slots.set_state(Slot::A, SlotState::Stuck);
    slots.set_state(Slot::B, SlotState::Stuck);
    let mut tx = TransmitContext::new(slots, SimDelay::new(&clock));
    let mut sched = Scheduler::new();

    for _ in 0..10 {
        sched.tick(&mut acq, &mut tx, &config, &timer, &diag);
    }
    assert_eq!(diag.tx_timeouts.get(), 2);
    assert_eq!(clock.now_us(), 2 * SLOT_WAIT_BUDGET_US as u64);

    let flags =
        BusErrorFlags::from_raw(BusErrorFlags::ERROR_PASSIVE | BusErrorFlags::ERROR_WARNING);
    tx.on_bus_event(BusEvent::Error(flags), &diag);
    assert_eq!(diag.tx_aborted.get(), 2);
    assert_eq!(diag.error_passive.get(), 1);

    let mut last = None;
    for _ in 0..10 {
        last = sched
            .tick(&mut acq, &mut tx, &config, &timer, &diag)
            .frames
            .or(last);
    }
    assert_eq!(
        last,
        Some([TransmitOutcome::Sent(Slot::B), TransmitOutcome::Sent(Slot::A)])
    );
    assert_eq!(tx.slots().sent()[0].1.sequence(), 1);
}
