// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! STM32F777 ADC-to-CAN bridge.
//!
//! Interrupt priorities, highest first: TIM2 (the 1 kHz tick), CAN1_TX / CAN1_SCE (bus completion
//! and error events), then the mainline loop, which prints the status report every 100 ms and
//! blinks the heartbeat LED.

#![no_main]
#![no_std]

use core::cell::RefCell;

use cortex_m::interrupt::{free, Mutex};
use cortex_m::peripheral::NVIC;
use cortex_m_rt::entry;
use log::{info, warn, LevelFilter};
use panic_halt as _;

use hal::{
    can::Can,
    pac::{self, interrupt, Interrupt},
    prelude::*,
    serial::{Config, Serial},
};
use stm32f7xx_hal as hal;

use canbridge::config::{CAN_BITRATE, EEPROM_WORDS, TICK_HZ};
use canbridge::diagnostics::{ConsoleStats, StatusReport};
use canbridge::storage::{EmulatedEeprom, LoadOutcome};
use canbridge::transmit::BusEvent;
use canbridge::{
    AcquisitionContext, ConfigRecord, ConfigStore, Diagnostics, FrameBuilder, Scheduler,
    TransmitContext,
};

mod hw;
use hw::can::{bit_timing, BTR_1M_16MHZ};
use hw::pins::{ADC_CHANNEL_MAP, ADC_REFERENCE_CHANNEL};
use hw::usart::init_logger;
use hw::{Adc, BoardPins, CanSlots, Console, CycleDelay, Led, SectorFlash, Tim2Tick, Usart};

/// Ticks between status reports.
const REPORT_PERIOD_TICKS: u32 = 100;

const PRIO_TICK: u8 = 0x00;
const PRIO_BUS: u8 = 0x40;

/// Everything the tick and bus interrupts touch.
struct Bridge {
    acq: AcquisitionContext<Adc<pac::ADC1>>,
    tx: TransmitContext<CanSlots, CycleDelay>,
    scheduler: Scheduler,
    config: ConfigRecord,
    timer: Tim2Tick,
}

static DIAG: Diagnostics = Diagnostics::new();
static CONSOLE: Console = Console::new();
static BRIDGE: Mutex<RefCell<Option<Bridge>>> = Mutex::new(RefCell::new(None));

#[entry]
fn main() -> ! {
    // Peripherals
    let dp = pac::Peripherals::take().unwrap();
    let mut cp = cortex_m::Peripherals::take().unwrap();

    // Clocks
    let rcc = dp.RCC.constrain();
    let clocks = rcc.cfgr.freeze();
    let mut apb1 = rcc.apb1;

    // GPIO
    let pins = BoardPins::new(dp.GPIOA, dp.GPIOC, dp.GPIOD);
    let mut led_fault = Led::active_low(pins.leds.red);
    let mut led_bus = Led::active_low(pins.leds.yellow);
    let mut led_heartbeat = Led::active_low(pins.leds.green);

    // USART1 console
    let usart_cfg = Config {
        baud_rate: 115_200.bps(),
        ..Default::default()
    };
    let serial = Serial::new(
        dp.USART1,
        (pins.usart1.tx, pins.usart1.rx),
        &clocks,
        usart_cfg,
    );
    CONSOLE.attach(Usart::new(serial));
    let _ = init_logger(&CONSOLE, LevelFilter::Info);
    info!("bridge: sysclk {} Hz", clocks.sysclk().raw());

    // Persisted configuration
    let eeprom = EmulatedEeprom::new(SectorFlash::new(dp.FLASH), EEPROM_WORDS);
    let mut store = ConfigStore::new(eeprom);
    let config = store.init();
    if store.outcome() == LoadOutcome::StorageUnavailable {
        led_fault.on();
    }
    info!(
        "bridge: boot {}, frame ids {:#05x}/{:#05x}",
        config.boot_count, config.frame_a.id, config.frame_b.id
    );

    // CAN1
    let pclk1 = clocks.pclk1().raw();
    let btr = bit_timing(pclk1, CAN_BITRATE).unwrap_or_else(|| {
        warn!("can: no bit timing for {} Hz, assuming 16 MHz", pclk1);
        BTR_1M_16MHZ
    });
    let can1 = Can::new(dp.CAN1, &mut apb1, (pins.can1.tx, pins.can1.rx));
    let mut tx = TransmitContext::new(
        CanSlots::new(can1, btr),
        CycleDelay::new(clocks.sysclk().raw()),
    );

    let outcome = tx.transmit(&FrameBuilder::startup(&config), &DIAG);
    info!("can: startup frame {:?}", outcome);

    // ADC1
    let acq = AcquisitionContext::new(Adc::adc1(dp.ADC1), ADC_CHANNEL_MAP, ADC_REFERENCE_CHANNEL);

    // TIM2 tick
    let timer = Tim2Tick::new(dp.TIM2, clocks.timclk1().raw(), TICK_HZ);

    free(|cs| {
        BRIDGE.borrow(cs).replace(Some(Bridge {
            acq,
            tx,
            scheduler: Scheduler::new(),
            config,
            timer,
        }));
    });

    unsafe {
        cp.NVIC.set_priority(Interrupt::TIM2, PRIO_TICK);
        cp.NVIC.set_priority(Interrupt::CAN1_TX, PRIO_BUS);
        cp.NVIC.set_priority(Interrupt::CAN1_SCE, PRIO_BUS);
        NVIC::unmask(Interrupt::CAN1_TX);
        NVIC::unmask(Interrupt::CAN1_SCE);
        NVIC::unmask(Interrupt::TIM2);
    }
    info!("bridge: running at {} Hz", TICK_HZ);

    let mut stats = ConsoleStats::default();
    let mut last_report = 0u32;
    let mut last_second = 0u32;

    loop {
        cortex_m::asm::wfi();

        let snapshot = DIAG.snapshot();

        if snapshot.uptime_s != last_second {
            last_second = snapshot.uptime_s;
            led_heartbeat.toggle();
        }

        if snapshot.ticks.wrapping_sub(last_report) >= REPORT_PERIOD_TICKS {
            last_report = snapshot.ticks;
            led_bus.set(snapshot.bus_errors != 0 || snapshot.tx_timeouts != 0);

            stats.update(&snapshot.decimated);
            let report = StatusReport {
                snapshot: &snapshot,
                stats: &stats,
                config: &config,
            };
            CONSOLE.print(format_args!("\x1b[2J\x1b[H{}", report));
        }
    }
}

#[interrupt]
fn TIM2() {
    free(|cs| {
        if let Some(bridge) = BRIDGE.borrow(cs).borrow_mut().as_mut() {
            bridge.timer.clear_update();
            bridge.scheduler.tick(
                &mut bridge.acq,
                &mut bridge.tx,
                &bridge.config,
                &bridge.timer,
                &DIAG,
            );
        }
    });
}

#[interrupt]
fn CAN1_TX() {
    free(|cs| {
        if let Some(bridge) = BRIDGE.borrow(cs).borrow_mut().as_mut() {
            let done = bridge.tx.slots_mut().take_completions();
            for slot in done.into_iter().flatten() {
                bridge.tx.on_bus_event(BusEvent::TxComplete(slot), &DIAG);
            }
        }
    });
}

#[interrupt]
fn CAN1_SCE() {
    free(|cs| {
        if let Some(bridge) = BRIDGE.borrow(cs).borrow_mut().as_mut() {
            if let Some(flags) = bridge.tx.slots_mut().take_error() {
                bridge.tx.on_bus_event(BusEvent::Error(flags), &DIAG);
            }
        }
    });
}
