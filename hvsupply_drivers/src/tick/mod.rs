use hal::{
    clocks::Clocks,
    pac::TIM6,
    timer::{Timer, TimerInterrupt},
};

use hvsupply_algo::regulator::{TickControl, PID_PERIOD};

/// Control tick on TIM6; its update interrupt runs the regulator.
pub struct ControlTick {
    tim: Timer<TIM6>,
}

impl ControlTick {
    pub fn new(tim6: TIM6, clock_cfg: &Clocks) -> Self {
        let mut timer = Timer::new_tim6(tim6, 1.0 / PID_PERIOD, Default::default(), clock_cfg);
        timer.enable_interrupt(TimerInterrupt::Update);
        ControlTick { tim: timer }
    }

    #[inline(always)]
    pub fn clear(&mut self) {
        self.tim.clear_interrupt(TimerInterrupt::Update);
    }
}

impl TickControl for ControlTick {
    fn start(&mut self) {
        self.tim.enable();
    }

    fn stop(&mut self) {
        self.tim.disable();
    }
}
