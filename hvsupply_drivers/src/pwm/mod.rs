// Implements the power stage PWM on TIM1.

// Key Features:
// - Cathode on the complementary output CH1N, extract CH2, focus CH3, pump CH4.
// - Duty 0.0..=1.0 mapped onto the timer period; values above 1.0 or NaN are ignored.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use hal::{
    clocks::Clocks,
    pac::TIM1,
    timer::{
        Alignment, CaptureCompareDma, CountDir, OutputCompare, TimChannel, Timer, TimerConfig,
        UpdateReqSrc,
    },
};

use hvsupply_algo::regulator::{PwmChannel, PwmOutput};

use super::pinout;

/// Converter switching frequency.
pub const PWM_FREQ_HZ: f32 = 100_000.0;

pub struct PowerStagePwm {
    tim: Timer<TIM1>,
}

impl PowerStagePwm {
    pub fn new(tim1: TIM1, clock_cfg: &Clocks, freq: f32) -> Self {
        let timer = Timer::new_tim1(
            tim1,
            freq,
            TimerConfig {
                one_pulse_mode: false,
                update_request_source: UpdateReqSrc::Any,
                auto_reload_preload: true,
                alignment: Alignment::Edge,
                capture_compare_dma: CaptureCompareDma::Update,
                direction: CountDir::Up,
            },
            clock_cfg,
        );
        PowerStagePwm { tim: timer }
    }

    /// Enables all four outputs at zero duty and starts the timer.
    pub fn begin(&mut self) {
        for channel in [TimChannel::C1, TimChannel::C2, TimChannel::C3, TimChannel::C4] {
            self.tim.enable_pwm_output(channel, OutputCompare::Pwm1, 0.0);
        }
        // Cathode stage is wired to the complementary output; advanced timer outputs
        // stay off until MOE is set
        self.tim.regs.ccer.modify(|_, w| w.cc1ne().set_bit());
        self.tim.regs.bdtr.modify(|_, w| w.moe().set_bit());

        pinout::power_stage::PWM_CATHODE.init();
        pinout::power_stage::PWM_EXTRACT.init();
        pinout::power_stage::PWM_FOCUS.init();
        pinout::power_stage::PWM_PUMP.init();

        self.tim.enable();
    }

    fn timer_channel(channel: PwmChannel) -> TimChannel {
        match channel {
            PwmChannel::Cathode => TimChannel::C1,
            PwmChannel::Extract => TimChannel::C2,
            PwmChannel::Focus => TimChannel::C3,
            PwmChannel::Pump => TimChannel::C4,
        }
    }
}

impl PwmOutput for PowerStagePwm {
    fn set_duty(&mut self, channel: PwmChannel, duty: f32) {
        if !(duty <= 1.0) {
            return;
        }
        let period = self.tim.get_max_duty();
        // Negative duty saturates to 0 in the cast
        self.tim
            .set_duty(Self::timer_channel(channel), (duty * period as f32) as u16);
    }
}
