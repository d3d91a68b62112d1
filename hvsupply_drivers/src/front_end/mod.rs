// Implements the SPI1 link to the ADS131M02 analog front-end.

// Key Features:
// - Hardware reset and chip select handled here; data ready arrives on EXTI line 4.
// - One blocking frame read per data-ready event, decoded and CRC checked by the algo crate.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use hal::{
    gpio::{self, Edge, Pin, Pull},
    pac::SPI1,
    spi::{BaudRate, Spi, SpiConfig, SpiMode},
};

use hvsupply_algo::analog::front_end::{decode_frame, FRONT_END_FRAME_LEN};
use hvsupply_algo::analog::sampling::RawFrame;

use super::pinout;

/// EXTI line of the data ready input.
pub const DRDY_EXTI_LINE: u8 = 4;

pub struct FrontEnd {
    spi: Spi<SPI1>,
    cs_pin: Pin,
    reset_pin: Pin,
}

impl FrontEnd {
    pub fn new(spi_reg: SPI1) -> Self {
        let spi_cfg = SpiConfig {
            mode: SpiMode::mode1(),
            ..Default::default()
        };

        pinout::front_end::SPI1_SCK.init();
        pinout::front_end::SPI1_MISO.init();
        pinout::front_end::SPI1_MOSI.init();
        let mut cs_pin = pinout::front_end::SPI1_CS.init();
        cs_pin.set_high();
        let mut reset_pin = pinout::front_end::RESET.init();
        reset_pin.set_low(); // Held in reset until `begin`

        let spi = Spi::new(spi_reg, spi_cfg, BaudRate::Div8);

        FrontEnd {
            spi,
            cs_pin,
            reset_pin,
        }
    }

    /// Releases the converter from reset and arms the data ready interrupt.
    pub fn begin(&mut self) {
        self.reset_pin.set_high();
        let mut drdy = pinout::front_end::DRDY.init();
        drdy.pull(Pull::Up);
        drdy.enable_interrupt(Edge::Falling);
    }

    /// Acknowledges the data ready interrupt.
    #[inline(always)]
    pub fn clear_drdy(&mut self) {
        gpio::clear_exti_interrupt(DRDY_EXTI_LINE);
    }

    /// Clocks out one output frame. A failed transfer yields an invalid frame.
    pub fn read_frame(&mut self) -> RawFrame {
        let mut buf = [0u8; FRONT_END_FRAME_LEN]; // NULL command
        self.cs_pin.set_low();
        let transferred = self.spi.transfer(&mut buf).is_ok();
        self.cs_pin.set_high();
        if !transferred {
            defmt::warn!("FRONT-END: SPI transfer failed");
            return RawFrame::default();
        }
        decode_frame(&buf)
    }
}
