// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Pin definitions for the STM32F777 bridge board.
//!
//! | Function | Pins | Peripheral |
//! |---|---|---|
//! | Status LEDs | PD8 (red), PD9 (yellow), PD10 (green) | GPIO, active low |
//! | Console | PA9 TX, PA10 RX | USART1, AF7 |
//! | Bus | PA12 TX, PA11 RX | CAN1, AF9 |
//! | Channels 0-7 | PA0-PA7 | ADC1 IN0-IN7 |
//! | 5 V reference | PC0 | ADC1 IN10, 1/3 divider |

use canbridge::config::CHANNEL_COUNT;
use stm32f7xx_hal::{
    gpio::{gpioa, gpioc, gpiod, Alternate, Analog, Output, PushPull},
    pac,
    prelude::*,
};

/// ADC input wired to each logical channel.
pub const ADC_CHANNEL_MAP: [u8; CHANNEL_COUNT] = [0, 1, 2, 3, 4, 5, 6, 7];

/// ADC input of the divided 5 V rail.
pub const ADC_REFERENCE_CHANNEL: u8 = 10;

/// All board pins. Construct this once at startup using:
///
/// ```rust
/// let pins = BoardPins::new(dp.GPIOA, dp.GPIOC, dp.GPIOD);
/// ```
pub struct BoardPins {
    pub leds: LedPins,
    pub usart1: Usart1Pins,
    pub can1: Can1Pins,
    pub analog: AnalogPins,
}

pub struct LedPins {
    pub red: gpiod::PD8<Output<PushPull>>,
    pub yellow: gpiod::PD9<Output<PushPull>>,
    pub green: gpiod::PD10<Output<PushPull>>,
}

pub struct Usart1Pins {
    pub tx: gpioa::PA9<Alternate<7>>,
    pub rx: gpioa::PA10<Alternate<7>>,
}

/// CAN1 bus pins
pub struct Can1Pins {
    pub tx: gpioa::PA12<Alternate<9>>,
    pub rx: gpioa::PA11<Alternate<9>>,
}

/// Monitored inputs. Held only to keep the pins in analog mode.
pub struct AnalogPins {
    pub ch0: gpioa::PA0<Analog>,
    pub ch1: gpioa::PA1<Analog>,
    pub ch2: gpioa::PA2<Analog>,
    pub ch3: gpioa::PA3<Analog>,
    pub ch4: gpioa::PA4<Analog>,
    pub ch5: gpioa::PA5<Analog>,
    pub ch6: gpioa::PA6<Analog>,
    pub ch7: gpioa::PA7<Analog>,
    pub vcc5: gpioc::PC0<Analog>,
}

impl BoardPins {
    /// Create all named pins from raw GPIO peripherals.
    pub fn new(gpioa: pac::GPIOA, gpioc: pac::GPIOC, gpiod: pac::GPIOD) -> Self {
        let gpioa = gpioa.split();
        let gpioc = gpioc.split();
        let gpiod = gpiod.split();

        Self {
            leds: LedPins {
                red: gpiod.pd8.into_push_pull_output(),
                yellow: gpiod.pd9.into_push_pull_output(),
                green: gpiod.pd10.into_push_pull_output(),
            },

            usart1: Usart1Pins {
                tx: gpioa.pa9.into_alternate::<7>(),
                rx: gpioa.pa10.into_alternate::<7>(),
            },

            can1: Can1Pins {
                tx: gpioa.pa12.into_alternate::<9>(),
                rx: gpioa.pa11.into_alternate::<9>().internal_pull_up(true),
            },

            analog: AnalogPins {
                ch0: gpioa.pa0.into_analog(),
                ch1: gpioa.pa1.into_analog(),
                ch2: gpioa.pa2.into_analog(),
                ch3: gpioa.pa3.into_analog(),
                ch4: gpioa.pa4.into_analog(),
                ch5: gpioa.pa5.into_analog(),
                ch6: gpioa.pa6.into_analog(),
                ch7: gpioa.pa7.into_analog(),
                vcc5: gpioc.pc0.into_analog(),
            },
        }
    }
}
