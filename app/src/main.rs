#![no_main]
#![no_std]

use defmt_rtt as _;
use panic_probe as _;

use embedded_time::rate::Hertz;
use hal::{
    self,
    clocks::Clocks,
    dma,
    dma::{Dma, DmaChannel, DmaInput, DmaInterrupt, DmaPeriph},
    pac,
    pac::DMA1,
    timer::TimerInterrupt,
};

use pmsm_foc::{DriveConfig, MotorApp, UserParams};

mod board;
use board::{AdcFeedback, Load, TimPwm};

const PWM_FREQ: Hertz = Hertz(16_000);

/// Control ticks between two speed demand polls (100 Hz)
const POT_POLL_DIVIDER: u16 = 160;

/// No start button on this board: the motor runs whenever the bus allows it
const RUN_CMD: bool = true;

type Motor = MotorApp<AdcFeedback, TimPwm, Load>;

#[rtic::app(device = pac, peripherals = true, dispatchers = [TIM7])]
mod app {
    use super::*;

    #[shared]
    struct Shared {
        motor: Motor,
    }

    #[local]
    struct Local {
        underflow: bool,
        poll_counter: u16,
        dma1: Dma<DMA1>,
    }

    #[init]
    fn init(ctx: init::Context) -> (Shared, Local) {
        let dp = ctx.device;
        let clock_cfg = Clocks::default();
        clock_cfg.setup().unwrap();

        let sysclk_freq = clock_cfg.sysclk(); // System clock frequency in Hz
        defmt::debug!("SYSTEM: Clock frequency is {} MHz", sysclk_freq / 1000000);

        let config = defmt::unwrap!(DriveConfig::from_user(&UserParams::default()));

        board::init_driver_pins();

        let mut timer_pwm = TimPwm::new(
            dp.TIM2,
            &clock_cfg,
            PWM_FREQ,
            config.foc.pwm_period,
            config.app.min_duty,
        );
        timer_pwm.begin();

        let dma1 = Dma::new(dp.DMA1);
        dma::enable_mux1();
        dma::mux(DmaPeriph::Dma1, DmaChannel::C1, DmaInput::Adc1);

        let feedback = AdcFeedback::new(dp.ADC1, &clock_cfg);
        let motor = MotorApp::new(config, feedback, timer_pwm, Load::new());

        (
            Shared { motor },
            Local {
                underflow: true,
                poll_counter: 0,
                dma1,
            },
        )
    }

    #[task(binds = TIM2, shared = [motor], local = [underflow, poll_counter], priority = 2)]
    fn tim2_period_elapsed(mut cx: tim2_period_elapsed::Context) {
        *cx.local.underflow = !*cx.local.underflow;

        cx.shared.motor.lock(|motor| {
            motor
                .pwm_mut()
                .get_timer()
                .clear_interrupt(TimerInterrupt::Update);

            // Sample at the overflow, control at the underflow
            if *cx.local.underflow {
                motor.isr_tick();
            } else {
                motor.feedback_mut().begin_read();
            }
        });

        if *cx.local.underflow {
            *cx.local.poll_counter += 1;
            if *cx.local.poll_counter >= POT_POLL_DIVIDER {
                *cx.local.poll_counter = 0;
                pot_poll::spawn().ok();
            }
        }
    }

    #[task(priority = 1, shared = [motor])]
    async fn pot_poll(mut cx: pot_poll::Context) {
        let pot = AdcFeedback::pot();
        cx.shared.motor.lock(|motor| motor.set_input(RUN_CMD, pot));
    }

    #[task(binds = DMA1_CH1, local = [dma1], priority = 1)]
    fn adc_end_read(cx: adc_end_read::Context) {
        dma::clear_interrupt(
            DmaPeriph::Dma1,
            DmaChannel::C1,
            DmaInterrupt::TransferComplete,
        );
        cx.local.dma1.stop(DmaChannel::C1);
    }
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
