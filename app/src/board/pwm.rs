use embedded_time::rate::Hertz;
use hal::{
    clocks::Clocks,
    gpio::Pin,
    pac::TIM2,
    timer::{
        Alignment, CaptureCompareDma, CountDir, OutputCompare, TimChannel, Timer, TimerConfig,
        TimerInterrupt, UpdateReqSrc,
    },
};

use pmsm_foc::{DutyCycles, PwmSink};

use super::pinout;

/// Three-phase center-aligned PWM on TIM2 with the driver enable pin
pub struct TimPwm {
    tim: Timer<TIM2>,
    enable: Pin,
    /// Full-scale duty as produced by the modulator
    period: u16,
    min_duty: u16,
}

impl TimPwm {
    pub fn new(tim2: TIM2, clock_cfg: &Clocks, freq: Hertz, period: u16, min_duty: u16) -> Self {
        let mut timer = Timer::new_tim2(
            tim2,
            freq.0 as f32,
            TimerConfig {
                one_pulse_mode: false,
                update_request_source: UpdateReqSrc::Any,
                auto_reload_preload: true,
                alignment: Alignment::Center1,
                capture_compare_dma: CaptureCompareDma::Update,
                direction: CountDir::Up,
            },
            clock_cfg,
        );
        // Update fires on both the overflow and the underflow
        timer.enable_interrupt(TimerInterrupt::Update);
        timer.enable();

        let mut enable = pinout::ENABLE.init();
        enable.set_low();

        TimPwm {
            tim: timer,
            enable,
            period,
            min_duty,
        }
    }

    pub fn get_timer(&mut self) -> &mut Timer<TIM2> {
        &mut self.tim
    }

    /// Connects the three channels to their pins with zero duty
    pub fn begin(&mut self) {
        self.tim
            .enable_pwm_output(TimChannel::C1, OutputCompare::Pwm1, 0.0);
        self.tim
            .enable_pwm_output(TimChannel::C2, OutputCompare::Pwm1, 0.0);
        self.tim
            .enable_pwm_output(TimChannel::C3, OutputCompare::Pwm1, 0.0);

        pinout::PWM_A.init();
        pinout::PWM_B.init();
        pinout::PWM_C.init();
    }

    fn to_compare(&self, duty: u16, max_duty: u32) -> u32 {
        let duty = duty.max(self.min_duty).min(self.period);
        duty as u32 * max_duty / self.period as u32
    }
}

impl PwmSink for TimPwm {
    fn set_duty_cycles(&mut self, duty: &DutyCycles) {
        let max_duty = self.tim.get_max_duty();
        let [a, b, c] = duty.as_array();
        let (a, b, c) = (
            self.to_compare(a, max_duty),
            self.to_compare(b, max_duty),
            self.to_compare(c, max_duty),
        );
        self.tim.set_duty(TimChannel::C1, a);
        self.tim.set_duty(TimChannel::C2, b);
        self.tim.set_duty(TimChannel::C3, c);
    }

    fn enable_outputs(&mut self) {
        self.enable.set_high();
    }

    fn disable_outputs(&mut self) {
        self.enable.set_low();
    }
}
