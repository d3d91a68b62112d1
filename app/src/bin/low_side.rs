#![no_main]
#![no_std]

// Low side controller: operator panel, cathode and pump stages, anode current sensing,
// and the regulation of the remote extract and focus stages over the telemetry link.

use defmt_rtt as _;
use panic_probe as _;

use cortex_m::peripheral::syst::SystClkSource;
use hal::{self, clocks::Clocks, pac};

use hvsupply_algo::{
    analog::{
        battery::BatteryMonitor,
        calibration::Calibration,
        sampling::{SampleOutcome, SamplingPipeline, Side, LOW_SIDE_FILTERS},
    },
    indicator::{Blinker, Indicator},
    operator::{enter_command, CommandOutcome, KeyEvent, KeyScanner, OperatorCommand, KEY_POWER_OFF_SCANS, KEY_SCAN_MS},
    recorder::{HfSource, Recorder},
    settings,
    system::{BatteryState, FrontEndStatus, RegulatedValues, SweepResult, SystemFlags, SystemState},
    telemetry::{recovery, restart_pending, LinkReceiver, LinkWatchdog, Recovery, COMM_WATCHDOG_TICKS},
    SupplyController,
};

static FLAGS: SystemFlags = SystemFlags::new();
static WATCHDOG: LinkWatchdog = LinkWatchdog::new(COMM_WATCHDOG_TICKS);

/// Link statistics are logged every this many frames.
const LINK_STATS_FRAMES: u32 = 1000;

#[rtic::app(device = pac, peripherals = true, dispatchers = [TIM7])]
mod app {
    use super::*;

    use rtic::mutex_prelude::*;

    use hvsupply_drivers::*;

    type Controller = SupplyController<'static, pwm::PowerStagePwm, tick::ControlTick>;

    #[shared]
    struct Shared {
        meas: RegulatedValues,
        reference: RegulatedValues,
        sweep_result: SweepResult,
        front_end_status: FrontEndStatus,
        battery: BatteryState,
        controller: Controller,
    }

    #[local]
    struct Local {
        front_end: front_end::FrontEnd,
        pipeline: SamplingPipeline,
        link: link::SerialLink,
        receiver: LinkReceiver,
        fault_led: panel::Led,
        link_led: panel::Led,
        activity_led: panel::Led,
        battery_led: panel::Led,
        blinker: Blinker,
        battery_adc: battery::BatteryAdc,
        battery_monitor: BatteryMonitor,
        settings: flash::FlashSettings,
        power_key: panel::Key,
        enter_key: panel::Key,
        power_scan: KeyScanner,
        enter_scan: KeyScanner,
        power_latch: panel::PowerLatch,
        ms: u32,
    }

    #[init(local = [recorder: Recorder = Recorder::new(HfSource::CathodeVolt)])]
    fn init(ctx: init::Context) -> (Shared, Local) {
        let dp = ctx.device;
        let clock_cfg = Clocks::default();
        if clock_cfg.setup().is_err() {
            defmt::panic!("SYSTEM: clock setup failed");
        }
        defmt::debug!("SYSTEM: Clock frequency is {} MHz", clock_cfg.sysclk() / 1000000);

        let power_latch = panel::PowerLatch::hold();

        let mut flash_settings = flash::FlashSettings::new(dp.FLASH);
        let state = SystemState::new(settings::load_or_default(&mut flash_settings));

        let mut power_pwm = pwm::PowerStagePwm::new(dp.TIM1, &clock_cfg, pwm::PWM_FREQ_HZ);
        power_pwm.begin();
        let control_tick = tick::ControlTick::new(dp.TIM6, &clock_cfg);

        let calibration = Calibration::trimmed();
        let controller = SupplyController::new(calibration.pump, ctx.local.recorder, power_pwm, control_tick);
        let pipeline = SamplingPipeline::new(Side::Low, &calibration, LOW_SIDE_FILTERS);

        let mut link = link::SerialLink::new(dp.USART1, &clock_cfg);
        link.start_rx();

        let mut front_end = front_end::FrontEnd::new(dp.SPI1);
        front_end.begin();

        let battery_adc = battery::BatteryAdc::new(dp.ADC1, &clock_cfg);

        // 1 ms system tick for the link watchdog and the panel
        let mut syst = ctx.core.SYST;
        syst.set_clock_source(SystClkSource::Core);
        syst.set_reload(clock_cfg.systick() / 1000 - 1);
        syst.clear_current();
        syst.enable_interrupt();
        syst.enable_counter();

        // The latch holds, the high side is supplied from now on
        FLAGS.set_high_side_powered(true);

        defmt::info!("SYSTEM: low side up, cathode {} V", state.reference.cathode_volt);

        (
            Shared {
                meas: state.meas,
                reference: state.reference,
                sweep_result: state.sweep_result,
                front_end_status: FrontEndStatus {
                    ready: true,
                    ..state.front_end
                },
                battery: state.battery,
                controller,
            },
            Local {
                front_end,
                pipeline,
                link,
                receiver: LinkReceiver::new(LOW_SIDE_FILTERS),
                fault_led: panel::Led::new(&pinout::panel::LED_RED),
                link_led: panel::Led::new(&pinout::panel::LED_GREEN),
                activity_led: panel::Led::new(&pinout::panel::LED_BLUE),
                battery_led: panel::Led::new(&pinout::panel::LED_ORANGE),
                blinker: Blinker::new(),
                battery_adc,
                battery_monitor: BatteryMonitor::new(),
                settings: flash_settings,
                power_key: panel::Key::new(&pinout::panel::KEY_PWR),
                enter_key: panel::Key::new(&pinout::panel::KEY_ENTER),
                power_scan: KeyScanner::new(KEY_POWER_OFF_SCANS),
                enter_scan: KeyScanner::new(u32::MAX - 1), // Never reports a hold
                power_latch,
                ms: 0,
            },
        )
    }

    /// Front-end data ready: anode current and cathode voltage.
    #[task(binds = EXTI4, priority = 3, shared = [meas, reference, controller, front_end_status], local = [front_end, pipeline])]
    fn acquisition(mut cx: acquisition::Context) {
        cx.local.front_end.clear_drdy();
        let frame = cx.local.front_end.read_frame();

        let pipeline = cx.local.pipeline;
        let (outcome, meas) = cx.shared.meas.lock(|meas| (pipeline.process(&frame, meas), *meas));
        if outcome == SampleOutcome::Invalid {
            let invalid_frames = pipeline.invalid_frames();
            cx.shared.front_end_status.lock(|status| status.invalid_frames = invalid_frames);
            return;
        }

        (&mut cx.shared.reference, &mut cx.shared.controller)
            .lock(|reference, ctrl| ctrl.on_acquisition(&meas, reference, &FLAGS));
    }

    /// Telemetry from the high side.
    #[task(binds = USART1, priority = 2, shared = [meas], local = [link, receiver, fault_led])]
    fn link_rx(mut cx: link_rx::Context) {
        let link = cx.local.link;
        let receiver = cx.local.receiver;

        if restart_pending(&FLAGS) {
            defmt::info!("LINK: high side powered again, receiver restarted");
            receiver.restart(&FLAGS);
            link.start_rx();
            return;
        }

        let errors = link.take_line_errors();
        if errors.any() {
            receiver.on_line_errors(errors);
        }
        while let Some(byte) = link.read_byte() {
            receiver.on_byte(byte);
        }
        if errors.overrun {
            match recovery(&FLAGS) {
                Recovery::Restart => {
                    link.stop_rx();
                    link.start_rx();
                }
                Recovery::Stop => {
                    defmt::info!("LINK: high side off, receiver stopped");
                    link.stop_rx();
                }
            }
        }

        if link.take_idle() {
            let was_ok = FLAGS.communication_ok();
            let fault_led = cx.local.fault_led;
            let result = cx
                .shared
                .meas
                .lock(|meas| receiver.on_idle(meas, &FLAGS, &WATCHDOG, fault_led));
            if let Some(Ok(_)) = result {
                if !was_ok {
                    link_up::spawn().ok();
                }
            }
            let stats = receiver.stats();
            if result.is_some() && stats.frames % LINK_STATS_FRAMES == 0 {
                defmt::debug!("LINK: {}", stats);
            }
        }
    }

    /// Starts regulation the first time the high side reports.
    #[task(priority = 1, shared = [reference, controller])]
    async fn link_up(mut cx: link_up::Context) {
        let reference = cx.shared.reference.lock(|reference| *reference);
        cx.shared.controller.lock(|ctrl| match ctrl.link_up(&reference, &FLAGS) {
            Ok(true) => defmt::info!("REGULATOR: running"),
            Ok(false) => {}
            Err(err) => defmt::error!("REGULATOR: start failed, {}", err),
        });
    }

    /// Control tick: sweep/logger, then the PID loops.
    #[task(binds = TIM6_DACUNDER, priority = 1, shared = [meas, reference, sweep_result, controller])]
    fn control_tick(mut cx: control_tick::Context) {
        let meas = cx.shared.meas.lock(|meas| *meas);
        let exit = (&mut cx.shared.reference, &mut cx.shared.sweep_result, &mut cx.shared.controller).lock(
            |reference, sweep_result, ctrl| {
                ctrl.tick_timer_mut().clear();
                ctrl.tick(&meas, reference, sweep_result, &FLAGS)
            },
        );
        if let Some(exit) = exit {
            defmt::info!("SWEEP: finished, {}", exit);
        }
    }

    /// 1 ms system tick: link watchdog, link LED, panel scan scheduling.
    #[task(binds = SysTick, priority = 1, local = [link_led, ms])]
    fn system_tick(cx: system_tick::Context) {
        *cx.local.ms = cx.local.ms.wrapping_add(1);

        if WATCHDOG.tick(&FLAGS) {
            defmt::warn!("LINK: no frames for {} ms", COMM_WATCHDOG_TICKS);
        }
        cx.local.link_led.set(FLAGS.communication_ok());

        // A stopped receiver has no interrupt source of its own
        if restart_pending(&FLAGS) {
            rtic::pend(pac::Interrupt::USART1);
        }

        if *cx.local.ms % KEY_SCAN_MS == 0 {
            panel_scan::spawn(*cx.local.ms).ok();
        }
    }

    /// Keys, battery and activity LEDs.
    #[task(
        priority = 1,
        shared = [battery],
        local = [power_key, enter_key, power_scan, enter_scan, power_latch, battery_adc, battery_monitor, battery_led, activity_led, blinker]
    )]
    async fn panel_scan(mut cx: panel_scan::Context, now_ms: u32) {
        let monitor = cx.local.battery_monitor.tick(cx.local.battery_adc.read());
        let state = monitor.state();
        FLAGS.set_low_battery(monitor.is_low());
        cx.local.battery_led.set(monitor.is_low());
        cx.shared.battery.lock(|battery| *battery = state);

        if FLAGS.sweep_active() || FLAGS.logger_active() {
            cx.local.blinker.blink(cx.local.activity_led, now_ms);
        } else {
            cx.local.activity_led.set(false);
        }

        if cx.local.power_scan.scan(cx.local.power_key.is_pressed()) == Some(KeyEvent::Held) {
            operator::spawn(OperatorCommand::HighSidePower(false)).ok();
            cx.local.power_latch.release();
        }
        if cx.local.enter_scan.scan(cx.local.enter_key.is_pressed()) == Some(KeyEvent::Pressed) {
            operator::spawn(enter_command(&FLAGS)).ok();
        }
    }

    /// Entry point of the operator interface.
    #[task(priority = 1, shared = [meas, reference, sweep_result, controller], local = [settings])]
    async fn operator(mut cx: operator::Context, command: OperatorCommand) {
        let meas = cx.shared.meas.lock(|meas| *meas);
        let outcome = (&mut cx.shared.reference, &mut cx.shared.sweep_result, &mut cx.shared.controller)
            .lock(|reference, sweep_result, ctrl| ctrl.apply(command, &meas, reference, sweep_result, &FLAGS));

        match outcome {
            CommandOutcome::Done => {
                if command == OperatorCommand::HighSidePower(true) && FLAGS.communication_ok() {
                    link_up::spawn().ok();
                }
            }
            CommandOutcome::Refused => defmt::warn!("OPERATOR: {} refused", command),
            CommandOutcome::SweepFinished(exit) => defmt::info!("SWEEP: {}", exit),
            CommandOutcome::SaveRequested => {
                let reference = cx.shared.reference.lock(|reference| *reference);
                if let Err(err) = settings::save(cx.local.settings, &reference) {
                    defmt::error!("SETTINGS: save failed, {}", err);
                }
            }
        }
    }
}

// same panicking *behavior* as panic-probe but doesn't print a panic message
// this prevents the panic message being printed *twice* when defmt::panic is invoked
#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
