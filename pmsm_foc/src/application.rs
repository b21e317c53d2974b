// Implements the per-inverter application: the supervisory state machine that
// wraps the field oriented controller with current calibration, bus voltage
// gating, load sequencing and fault handling.

// Key Features:
// - One `isr_tick` per PWM/ADC interrupt: read inputs, step, write duty cycles
// - Offset measurement with the bridge disabled before every start
// - Over-current and controller faults disable the outputs in the same tick
// - Run command and speed demand buffered from a lower priority context

// Detailed Operation:
// INIT -> CMD_WAIT -> OFFSET -> LOAD_START_READY_CHECK -> RUN
//      -> LOAD_STOP_READY_CHECK -> STOP -> INIT
// Any state may end in FAULT, which is left only through `reset`.
// The hardware is reached exclusively through the `MotorFeedbackSource`,
// `PwmSink` and `LoadController` implementations given at construction.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::analog::{over_current, CurrentSense, SupplyVoltage};
use crate::config::{AppConfig, DriveConfig};
use crate::foc::{FaultKind, Foc};
use crate::hal::{LoadController, MotorFeedbackSource, MotorInputs, PwmSink};
use crate::math_integer::normalization::norm_to_milli;

/// Gain of the bus voltage reading filter
const VDC_FILTER_K: i16 = 1000;

/// States of the application state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AppState {
    Init,
    CmdWait,
    Offset,
    LoadStartReadyCheck,
    Run,
    LoadStopReadyCheck,
    Stop,
    Fault,
}

/// One motor with its controller and its hardware
pub struct MotorApp<F, P, L>
where
    F: MotorFeedbackSource,
    P: PwmSink,
    L: LoadController,
{
    config: AppConfig,
    state: AppState,

    feedback: F,
    pwm: P,
    load: L,

    foc: Foc,
    current: CurrentSense,
    supply: SupplyVoltage,
    inputs: MotorInputs,

    run_cmd: bool,
    run_cmd_buffer: bool,
    target_velocity: i16,
    fault: Option<FaultKind>,
}

impl<F, P, L> MotorApp<F, P, L>
where
    F: MotorFeedbackSource,
    P: PwmSink,
    L: LoadController,
{
    pub fn new(config: DriveConfig, feedback: F, mut pwm: P, load: L) -> Self {
        pwm.disable_outputs();
        let app = config.app;
        Self {
            config: app,
            state: AppState::Init,
            feedback,
            pwm,
            load,
            foc: Foc::new(config.foc),
            current: CurrentSense::new(app.offset_samples_log2),
            supply: SupplyVoltage::new(
                app.dc_min_run,
                app.dc_max_stop,
                VDC_FILTER_K,
                app.peak_voltage_mv,
            ),
            inputs: MotorInputs::default(),
            run_cmd: false,
            run_cmd_buffer: false,
            target_velocity: config.foc.control.initial_target,
            fault: None,
        }
    }

    /// Runs one control interrupt
    pub fn isr_tick(&mut self) {
        self.inputs = self.feedback.read();
        self.supply.tick(self.inputs.vdc);

        self.step();

        self.pwm.set_duty_cycles(&self.foc.duty());
    }

    fn step(&mut self) {
        match self.state {
            AppState::Init => {
                self.pwm.disable_outputs();
                self.run_cmd = false;

                self.foc.init();
                self.current.init();
                self.load.init();

                self.enter(AppState::CmdWait);
                self.accept_run_command();
            }

            AppState::CmdWait => {
                if self.run_cmd {
                    self.enter(AppState::Offset);
                }
            }

            AppState::Offset => {
                self.current.measure_offset(&self.inputs);
                if self.current.is_offset_ready() {
                    self.enter(AppState::LoadStartReadyCheck);
                }
            }

            AppState::LoadStartReadyCheck => {
                self.current.calibrate(&mut self.inputs);
                self.load.tick();

                if self.load.is_ready_to_start() {
                    self.pwm.enable_outputs();
                    self.foc.set_target_velocity(self.target_velocity);
                    self.foc.start();
                    self.load.start();
                    self.enter(AppState::Run);
                }
            }

            AppState::Run => {
                self.current.calibrate(&mut self.inputs);

                if over_current(&self.inputs, self.config.over_current_limit) {
                    error!(
                        "APP: over-current ia {} mA ib {} mA",
                        norm_to_milli(self.inputs.ia, self.config.peak_current_ma),
                        norm_to_milli(self.inputs.ib, self.config.peak_current_ma)
                    );
                    self.foc.signal_fault(FaultKind::OverCurrent);
                    self.fault = Some(FaultKind::OverCurrent);
                    self.enter(AppState::Fault);
                } else {
                    self.foc.tick(&self.inputs);
                    if self.foc.fault_status() {
                        self.fault = self.foc.fault().or(Some(FaultKind::ControlScheme));
                        self.enter(AppState::Fault);
                    } else {
                        self.load.tick();
                        if !self.run_cmd {
                            self.enter(AppState::LoadStopReadyCheck);
                        }
                    }
                }
            }

            AppState::LoadStopReadyCheck => {
                self.load.tick();

                self.current.calibrate(&mut self.inputs);
                self.foc.tick(&self.inputs);

                if self.load.is_ready_to_stop() {
                    self.load.stop();
                    self.enter(AppState::Stop);
                }
            }

            AppState::Stop => {
                self.pwm.disable_outputs();
                self.enter(AppState::Init);
            }

            AppState::Fault => {
                self.pwm.disable_outputs();
            }
        }

        if self.foc.fault_status() || self.state == AppState::Fault {
            self.pwm.disable_outputs();
        }
    }

    fn enter(&mut self, state: AppState) {
        if self.state != state {
            info!("APP: {} -> {}", self.state, state);
        }
        self.state = state;
    }

    /// Takes the buffered run command when the bus and the controller allow it
    fn accept_run_command(&mut self) {
        if self.supply.can_run() && !self.foc.fault_status() {
            self.run_cmd = self.run_cmd_buffer;
        }
        if self.supply.must_stop() {
            self.run_cmd = false;
        }
    }

    /// Buffers the run command and maps the speed demand onto the speed range.
    ///
    /// # Arguments
    /// * `run_cmd` - Requested run state
    /// * `pot` - Speed demand, 0..=32767 from minimum to maximum speed
    pub fn set_input(&mut self, run_cmd: bool, pot: i16) {
        let motor = &self.foc.config().motor;
        let (min, max) = (motor.min_speed as i32, motor.max_speed as i32);
        let target = min + (((max - min) * pot as i32) >> 15);
        self.target_velocity = target.clamp(min, max) as i16;
        self.run_cmd_buffer = run_cmd;

        if self.run_cmd {
            self.foc.set_target_velocity(self.target_velocity);
        }
        self.accept_run_command();
    }

    /// Leaves FAULT (or any state) through a full re-initialization
    pub fn reset(&mut self) {
        self.pwm.disable_outputs();
        self.fault = None;
        self.enter(AppState::Init);
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn fault(&self) -> Option<FaultKind> {
        self.fault
    }

    pub fn run_command(&self) -> bool {
        self.run_cmd
    }

    pub fn target_velocity(&self) -> i16 {
        self.target_velocity
    }

    /// Inputs of the last tick, offset-compensated once calibration is done
    pub fn inputs(&self) -> &MotorInputs {
        &self.inputs
    }

    pub fn foc(&self) -> &Foc {
        &self.foc
    }

    pub fn supply(&self) -> &SupplyVoltage {
        &self.supply
    }

    pub fn current_sense(&self) -> &CurrentSense {
        &self.current
    }

    pub fn feedback_mut(&mut self) -> &mut F {
        &mut self.feedback
    }

    pub fn pwm(&self) -> &P {
        &self.pwm
    }

    pub fn pwm_mut(&mut self) -> &mut P {
        &mut self.pwm
    }

    pub fn load(&self) -> &L {
        &self.load
    }
}
