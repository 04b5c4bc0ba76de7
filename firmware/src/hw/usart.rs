// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! USART console and `log` backend.
//!
//! Note: output is CRLF-terminated for serial terminals.
//!
//! To access the terminal on the host machine, connect to the debug USB port and use
//! ```
//! $ screen /dev/tty.usbmodem* 115200
//! ```
//!
//! The port lives in a [`Console`] static. A writer takes the port out of the static inside a short
//! critical section, writes with interrupts enabled, and puts it back. A second writer arriving in
//! between (for example a log call from an interrupt) finds the port taken and its output is
//! dropped, so the periodic tick is never held up by console output.

use core::cell::RefCell;
use core::fmt::{self, Write};

use cortex_m::interrupt::{free, Mutex};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use nb::block;

use stm32f7xx_hal::{
    pac,
    prelude::*,
    serial::{Instance, Pins, Serial, Tx},
};

pub struct Usart<U: Instance> {
    tx: Tx<U>,
}

impl<U: Instance> Usart<U> {
    pub fn new<PINS: Pins<U>>(serial: Serial<U, PINS>) -> Self {
        let (tx, _rx) = serial.split();
        Self { tx }
    }

    #[inline]
    pub fn write_byte(&mut self, b: u8) {
        let _ = block!(self.tx.write(b));
    }

    pub fn write_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            self.write_byte(b);
        }
    }

    /// Block until the hardware TX FIFO/drain is flushed.
    #[inline]
    pub fn flush(&mut self) {
        let _ = block!(self.tx.flush());
    }
}

impl<U: Instance> fmt::Write for Usart<U> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Usart::write_str(self, s);
        Ok(())
    }
}

pub type ConsolePort = Usart<pac::USART1>;

pub struct Console {
    port: Mutex<RefCell<Option<ConsolePort>>>,
}

impl Console {
    pub const fn new() -> Self {
        Self {
            port: Mutex::new(RefCell::new(None)),
        }
    }

    pub fn attach(&self, port: ConsolePort) {
        free(|cs| {
            self.port.borrow(cs).replace(Some(port));
        });
    }

    /// Run `f` with exclusive use of the port. Returns `None` if the port is busy or detached.
    pub fn with<R>(&self, f: impl FnOnce(&mut ConsolePort) -> R) -> Option<R> {
        let mut port = free(|cs| self.port.borrow(cs).borrow_mut().take())?;
        let r = f(&mut port);
        free(|cs| {
            self.port.borrow(cs).replace(Some(port));
        });
        Some(r)
    }

    /// Print preformatted output.
    pub fn print(&self, args: fmt::Arguments<'_>) {
        self.with(|port| {
            let _ = port.write_fmt(args);
        });
    }
}

impl Log for Console {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.print(format_args!("[{:<5}] {}\r\n", record.level(), record.args()));
    }

    fn flush(&self) {
        self.with(|port| port.flush());
    }
}

/// Route the `log` macros to `console`.
pub fn init_logger(console: &'static Console, level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(console)?;
    log::set_max_level(level);
    Ok(())
}
