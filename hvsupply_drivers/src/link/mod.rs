// Implements the USART1 side of the telemetry link.

// Key Features:
// - Interrupt-driven receive: bytes, line idle and per-byte line errors are reported
//   separately so the frame logic can stay hardware independent.
// - Interrupt-driven transmit of one frame at a time; a second start while busy is refused.
// - Receive can be stopped and restarted after hard errors.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use hal::{
    clocks::Clocks,
    pac::USART1,
    usart::{Usart, UsartConfig, UsartInterrupt},
};

use hvsupply_algo::telemetry::{FrameTransmit, LineErrors, FRAME_LEN, LINK_BAUD};

use super::pinout;

/// Transmission refused, the previous frame is still going out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub struct TxBusy;

pub struct SerialLink {
    usart: Usart<USART1>,
    tx: [u8; FRAME_LEN],
    tx_pos: usize,
    tx_busy: bool,
}

impl SerialLink {
    pub fn new(usart1: USART1, clock_cfg: &Clocks) -> Self {
        pinout::link::USART1_TX.init();
        pinout::link::USART1_RX.init();

        let usart = Usart::new(usart1, LINK_BAUD, UsartConfig::default(), clock_cfg);
        SerialLink {
            usart,
            tx: [0; FRAME_LEN],
            tx_pos: 0,
            tx_busy: false,
        }
    }

    /// Enables reception; bytes and idle line raise the USART1 interrupt.
    pub fn start_rx(&mut self) {
        self.take_line_errors();
        self.usart.enable_interrupt(UsartInterrupt::ReadNotEmpty);
        self.usart.enable_interrupt(UsartInterrupt::Idle);
    }

    pub fn stop_rx(&mut self) {
        self.usart.disable_interrupt(UsartInterrupt::ReadNotEmpty);
        self.usart.disable_interrupt(UsartInterrupt::Idle);
    }

    /// Reads and clears parity, framing, noise and overrun flags.
    pub fn take_line_errors(&mut self) -> LineErrors {
        let isr = self.usart.regs.isr.read();
        let errors = LineErrors {
            parity: isr.pe().bit_is_set(),
            framing: isr.fe().bit_is_set(),
            noise: isr.nf().bit_is_set(),
            overrun: isr.ore().bit_is_set(),
        };
        if errors.any() {
            self.usart.regs.icr.write(|w| {
                w.pecf().set_bit();
                w.fecf().set_bit();
                w.ncf().set_bit();
                w.orecf().set_bit()
            });
        }
        errors
    }

    #[inline(always)]
    pub fn read_byte(&mut self) -> Option<u8> {
        if self.usart.check_status_flag(UsartInterrupt::ReadNotEmpty) {
            Some(self.usart.read_one())
        } else {
            None
        }
    }

    /// True once per idle line after a burst of bytes.
    pub fn take_idle(&mut self) -> bool {
        if self.usart.check_status_flag(UsartInterrupt::Idle) {
            self.usart.clear_interrupt(UsartInterrupt::Idle);
            true
        } else {
            false
        }
    }

    /// Transmit interrupt service. Returns true when the last byte has left the shifter.
    pub fn service_tx(&mut self) -> bool {
        if !self.tx_busy {
            return false;
        }
        if self.tx_pos < FRAME_LEN {
            if self.usart.check_status_flag(UsartInterrupt::TransmitEmpty) {
                self.usart.write_one(self.tx[self.tx_pos]);
                self.tx_pos += 1;
                if self.tx_pos == FRAME_LEN {
                    self.usart.disable_interrupt(UsartInterrupt::TransmitEmpty);
                    self.usart.enable_interrupt(UsartInterrupt::TransmissionComplete);
                }
            }
            return false;
        }
        if self.usart.check_status_flag(UsartInterrupt::TransmissionComplete) {
            self.usart.clear_interrupt(UsartInterrupt::TransmissionComplete);
            self.usart.disable_interrupt(UsartInterrupt::TransmissionComplete);
            self.tx_busy = false;
            return true;
        }
        false
    }
}

impl FrameTransmit for SerialLink {
    type Error = TxBusy;

    fn start_transmit(&mut self, frame: &[u8; FRAME_LEN]) -> Result<(), TxBusy> {
        if self.tx_busy {
            return Err(TxBusy);
        }
        self.tx = *frame;
        self.tx_pos = 0;
        self.tx_busy = true;
        self.usart.enable_interrupt(UsartInterrupt::TransmitEmpty);
        Ok(())
    }
}
