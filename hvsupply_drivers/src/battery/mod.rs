use hal::{
    adc::{Adc, AdcDevice, InputType, SampleTime},
    clocks::Clocks,
    pac::ADC1,
};

use super::pinout;

/// ADC1 input of the battery divider.
pub const BATTERY_CHANNEL: u8 = 1;

/// Single conversion reader of the battery voltage.
pub struct BatteryAdc {
    adc: Adc<ADC1>,
}

impl BatteryAdc {
    pub fn new(adc1: ADC1, clock_cfg: &Clocks) -> Self {
        pinout::panel::BATTERY_SENSE.init();
        let mut adc = Adc::new_adc1(adc1, AdcDevice::One, Default::default(), clock_cfg.systick());
        adc.set_input_type(BATTERY_CHANNEL, InputType::SingleEnded);
        adc.set_sample_time(BATTERY_CHANNEL, SampleTime::T92);
        BatteryAdc { adc }
    }

    /// Right-aligned 12-bit code.
    #[inline(always)]
    pub fn read(&mut self) -> u16 {
        self.adc.read(BATTERY_CHANNEL)
    }
}
