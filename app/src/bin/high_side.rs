#![no_main]
#![no_std]

// High side controller: floats at the cathode potential, measures the extract and focus
// voltages and streams them to the low side, one frame per acquisition.

use defmt_rtt as _;
use panic_probe as _;

use cortex_m::peripheral::syst::SystClkSource;
use hal::{self, clocks::Clocks, pac};

use hvsupply_algo::{
    analog::{
        calibration::Calibration,
        sampling::{SampleOutcome, SamplingPipeline, Side, HIGH_SIDE_FILTERS},
    },
    indicator::Blinker,
    system::RegulatedValues,
    telemetry::{SendOutcome, TelemetrySender},
};

/// Sender statistics are logged every this many milliseconds.
const SENDER_STATS_MS: u32 = 10_000;

#[rtic::app(device = pac, peripherals = true)]
mod app {
    use super::*;

    use rtic::mutex_prelude::*;

    use hvsupply_drivers::*;

    #[shared]
    struct Shared {
        link: link::SerialLink,
        sender: TelemetrySender,
    }

    #[local]
    struct Local {
        front_end: front_end::FrontEnd,
        pipeline: SamplingPipeline,
        meas: RegulatedValues,
        fault_led: panel::Led,
        heartbeat_led: panel::Led,
        blinker: Blinker,
        last_sent: u32,
        ms: u32,
    }

    #[init]
    fn init(ctx: init::Context) -> (Shared, Local) {
        let dp = ctx.device;
        let clock_cfg = Clocks::default();
        if clock_cfg.setup().is_err() {
            defmt::panic!("SYSTEM: clock setup failed");
        }
        defmt::debug!("SYSTEM: Clock frequency is {} MHz", clock_cfg.sysclk() / 1000000);

        let link = link::SerialLink::new(dp.USART1, &clock_cfg);

        let mut front_end = front_end::FrontEnd::new(dp.SPI1);
        front_end.begin();

        let mut syst = ctx.core.SYST;
        syst.set_clock_source(SystClkSource::Core);
        syst.set_reload(clock_cfg.systick() / 1000 - 1);
        syst.clear_current();
        syst.enable_interrupt();
        syst.enable_counter();

        defmt::info!("SYSTEM: high side up");

        (
            Shared {
                link,
                sender: TelemetrySender::new(),
            },
            Local {
                front_end,
                pipeline: SamplingPipeline::new(Side::High, &Calibration::trimmed(), HIGH_SIDE_FILTERS),
                meas: RegulatedValues::unmeasured(),
                fault_led: panel::Led::new(&pinout::panel::LED_RED),
                heartbeat_led: panel::Led::new(&pinout::panel::LED_GREEN),
                blinker: Blinker::new(),
                last_sent: 0,
                ms: 0,
            },
        )
    }

    /// Front-end data ready: extract and focus voltage, then a frame to the low side.
    #[task(binds = EXTI4, priority = 3, shared = [link, sender], local = [front_end, pipeline, meas, fault_led])]
    fn acquisition(cx: acquisition::Context) {
        cx.local.front_end.clear_drdy();
        let frame = cx.local.front_end.read_frame();

        if cx.local.pipeline.process(&frame, cx.local.meas) != SampleOutcome::Transmit {
            return;
        }

        let meas = cx.local.meas;
        let fault_led = cx.local.fault_led;
        let outcome = (cx.shared.link, cx.shared.sender).lock(|link, sender| sender.offer(meas, link, fault_led));
        if outcome == SendOutcome::Failed {
            defmt::warn!("LINK: transmit refused by the peripheral");
        }
    }

    /// Transmit progress and completion.
    #[task(binds = USART1, priority = 2, shared = [link, sender])]
    fn link_tx(cx: link_tx::Context) {
        (cx.shared.link, cx.shared.sender).lock(|link, sender| {
            if link.service_tx() {
                sender.on_transmit_complete();
            }
        });
    }

    /// 1 ms system tick: heartbeat LED while frames leave.
    #[task(binds = SysTick, priority = 1, shared = [sender], local = [heartbeat_led, blinker, last_sent, ms])]
    fn system_tick(mut cx: system_tick::Context) {
        *cx.local.ms = cx.local.ms.wrapping_add(1);
        let stats = cx.shared.sender.lock(|sender| sender.stats());
        if stats.sent != *cx.local.last_sent {
            *cx.local.last_sent = stats.sent;
            cx.local.blinker.blink(cx.local.heartbeat_led, *cx.local.ms);
        }
        if *cx.local.ms % SENDER_STATS_MS == 0 {
            defmt::debug!("LINK: {}", stats);
        }
    }
}

// same panicking *behavior* as panic-probe but doesn't print a panic message
// this prevents the panic message being printed *twice* when defmt::panic is invoked
#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
