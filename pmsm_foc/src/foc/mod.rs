// Implements the sensorless field oriented controller and the state machine
// that sequences rotor alignment, open-loop start-up and closed-loop operation.

// Key Features:
// - INIT re-initializes every sub-block and falls straight into ROTOR_LOCK
// - ROTOR_LOCK aligns the rotor with a fixed d-axis current at angle zero
// - OPEN_LOOP ramps a forced rotating field while the PLL converges
// - CLOSED_LOOP runs the speed loop and flux weakening on the estimated angle
// - FAULT is terminal until the next INIT

// Detailed Operation:
// One call of `tick` per PWM/ADC interrupt. Every non-fault state runs the
// feedback path, decides the current references and the angle, then runs the
// forward path, so duty cycles are refreshed on every tick. The open to closed
// loop hand-over stores the angle difference between the forced field and the
// estimator and bleeds it off by 10 counts per tick.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

pub mod control;
pub mod estimator_pll;
pub mod flux_weakening;
pub mod paths;

use crate::config::FocConfig;
use crate::hal::MotorInputs;
use crate::math_integer::controllers::{SatMode, PI};
use crate::math_integer::svm::DutyCycles;
use crate::math_integer::transforms::{Abc, AlphaBeta, Dq};
use crate::math_integer::trigonometry::SinCos;

use control::ControlParams;
use estimator_pll::EstimatorPLL;
use flux_weakening::FluxWeakening;

/// Angle offset removed per closed-loop tick after the hand-over
const THETA_OFFSET_STEP: i16 = 10;

/// States of the control state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FocState {
    Init = 0,
    RotorLock = 1,
    OpenLoop = 2,
    ClosedLoop = 3,
    Fault = 4,
}

impl From<u8> for FocState {
    /// Unknown raw values map to `Fault`
    fn from(raw: u8) -> Self {
        match raw {
            0 => FocState::Init,
            1 => FocState::RotorLock,
            2 => FocState::OpenLoop,
            3 => FocState::ClosedLoop,
            _ => FocState::Fault,
        }
    }
}

/// Cause of the latched fault
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    OverCurrent,
    ControlScheme,
    InvalidState,
}

pub struct Foc {
    config: FocConfig,
    state: FocState,

    pi_d: PI,
    pi_q: PI,
    pi_speed: PI,
    estimator: EstimatorPLL,
    flux: FluxWeakening,
    ctrl: ControlParams,

    iabc: Abc,
    ialphabeta: AlphaBeta,
    idq: Dq,
    vdq: Dq,
    valphabeta: AlphaBeta,
    vabc: Abc,
    vdc: i16,

    theta: i16,        // Angle used by the transforms this tick
    theta_offset: i16, // Open-loop minus estimated angle, decays to zero
    sincos: SinCos,

    duty: DutyCycles,
    fault_status: bool,
    fault: Option<FaultKind>,
}

impl Foc {
    pub fn new(config: FocConfig) -> Self {
        Self {
            config,
            state: FocState::Init,
            pi_d: PI::new(config.d_current),
            pi_q: PI::new(config.q_current),
            pi_speed: PI::new(config.speed),
            estimator: EstimatorPLL::new(config.pll, config.motor),
            flux: FluxWeakening::new(config.flux, &config.motor),
            ctrl: ControlParams::new(config.control),
            iabc: Abc::default(),
            ialphabeta: AlphaBeta::default(),
            idq: Dq::default(),
            vdq: Dq::default(),
            valphabeta: AlphaBeta::default(),
            vabc: Abc::default(),
            vdc: 0,
            theta: 0,
            theta_offset: 0,
            sincos: SinCos::ZERO_ANGLE,
            duty: DutyCycles::ZERO,
            fault_status: false,
            fault: None,
        }
    }

    /// Resets all control and estimator state and returns to INIT.
    ///
    /// Clears the fault latch and zeroes the duty cycles.
    pub fn init(&mut self) {
        self.pi_d.reset(0);
        self.pi_q.reset(0);
        self.pi_speed.reset(0);
        self.flux.reset();
        self.estimator.reset();
        self.ctrl.reset();

        self.idq = Dq::default();
        self.vdq = Dq::default();
        self.valphabeta = AlphaBeta::default();
        self.vabc = Abc::default();
        self.theta = 0;
        self.theta_offset = 0;
        self.sincos = SinCos::ZERO_ANGLE;

        self.duty = DutyCycles::ZERO;
        self.fault_status = false;
        self.fault = None;
        self.state = FocState::Init;
    }

    /// Runs one control period and returns the new duty cycles
    pub fn tick(&mut self, inputs: &MotorInputs) -> DutyCycles {
        if self.state == FocState::Init {
            self.init();
            self.enter(FocState::RotorLock);
        }

        match self.state {
            FocState::RotorLock => self.tick_rotor_lock(inputs),
            FocState::OpenLoop => self.tick_open_loop(inputs),
            FocState::ClosedLoop => self.tick_closed_loop(inputs),
            FocState::Init | FocState::Fault => {}
        }
        self.duty
    }

    fn tick_rotor_lock(&mut self, inputs: &MotorInputs) {
        self.feedback_path(inputs);

        self.theta = 0;
        self.ctrl.iq_ref = 0;
        self.ctrl.id_ref = self.ctrl.config.lock_current;

        self.forward_path();

        self.ctrl.lock_time = self.ctrl.lock_time.saturating_add(1);
        if self.ctrl.lock_time >= self.ctrl.config.lock_time_limit {
            self.ctrl.lock_time = 0;
            self.ctrl.speed_ramp_skip_cnt = 0;
            self.ctrl.reset_open_loop_angle();
            self.theta = self.ctrl.ol_theta;
            self.enter(FocState::OpenLoop);
        }
    }

    fn tick_open_loop(&mut self, inputs: &MotorInputs) {
        self.feedback_path(inputs);

        self.ctrl.ramp_open_loop_current();

        let max_ol_speed = self.config.motor.max_ol_speed;
        if self.ctrl.ramp_open_loop_speed(max_ol_speed)
            && !self.ctrl.config.open_loop_only
            && self.estimator.omega_filtered() > max_ol_speed
        {
            // Hand over without an angle or torque step
            self.theta_offset = self.ctrl.ol_theta.wrapping_sub(self.estimator.theta());
            self.pi_speed.reset(self.idq.q);
            self.ctrl.speed_ramp_skip_cnt = 0;
            self.enter(FocState::ClosedLoop);
            debug!(
                "FOC: theta offset {} speed estimate {}",
                self.theta_offset,
                self.estimator.omega_filtered()
            );
        }

        self.estimator.tick(self.ialphabeta, self.valphabeta);

        self.theta = self.ctrl.advance_open_loop_angle();
        self.ctrl.iq_ref = self.ctrl.ol_current;
        if self.ctrl.id_ref > 0 {
            self.ctrl.id_ref -= 1;
        }

        self.forward_path();
    }

    fn tick_closed_loop(&mut self, inputs: &MotorInputs) {
        self.feedback_path(inputs);

        self.estimator.tick(self.ialphabeta, self.valphabeta);

        self.theta_offset = if self.theta_offset > THETA_OFFSET_STEP {
            self.theta_offset - THETA_OFFSET_STEP
        } else if self.theta_offset < -THETA_OFFSET_STEP {
            self.theta_offset + THETA_OFFSET_STEP
        } else {
            0
        };
        self.theta = self.estimator.theta().wrapping_add(self.theta_offset);

        self.ctrl.ramp_speed_reference();

        self.ctrl.iq_ref = self.pi_speed.update(
            self.ctrl.vel_ref,
            self.estimator.omega_filtered(),
            SatMode::None,
        );
        self.ctrl.id_ref = self.flux.tick(self.vdq, self.ctrl.vel_ref);

        self.forward_path();
    }

    fn enter(&mut self, state: FocState) {
        if self.state != state {
            info!("FOC: {} -> {}", self.state, state);
        }
        self.state = state;
    }

    /// Start transition: begins rotor alignment on the next tick
    pub fn start(&mut self) {
        self.enter(FocState::RotorLock);
    }

    /// Forces the state machine to a raw state value; unknown values end in FAULT
    pub fn set_state(&mut self, raw: u8) {
        match FocState::from(raw) {
            FocState::Fault if raw != FocState::Fault as u8 => {
                warn!("FOC: invalid state {}", raw);
                self.signal_fault(FaultKind::InvalidState);
            }
            FocState::Fault => self.signal_fault(FaultKind::ControlScheme),
            state => self.enter(state),
        }
    }

    /// Enters FAULT immediately and latches the fault status
    pub fn signal_fault(&mut self, kind: FaultKind) {
        if !self.fault_status {
            error!("FOC: fault {}", kind);
            self.fault = Some(kind);
        }
        self.fault_status = true;
        self.enter(FocState::Fault);
    }

    /// Speed the closed loop ramps toward
    pub fn set_target_velocity(&mut self, target: i16) {
        self.ctrl.target_velocity = target;
    }

    pub fn state(&self) -> FocState {
        self.state
    }

    /// Sticky fault flag, cleared only by `init`
    pub fn fault_status(&self) -> bool {
        self.fault_status
    }

    pub fn fault(&self) -> Option<FaultKind> {
        self.fault
    }

    pub fn duty(&self) -> DutyCycles {
        self.duty
    }

    pub fn idq(&self) -> Dq {
        self.idq
    }

    pub fn vdq(&self) -> Dq {
        self.vdq
    }

    pub fn ialphabeta(&self) -> AlphaBeta {
        self.ialphabeta
    }

    /// Voltage vector commanded this tick, before bus compensation
    pub fn valphabeta(&self) -> AlphaBeta {
        self.valphabeta
    }

    pub fn vabc(&self) -> Abc {
        self.vabc
    }

    pub fn theta(&self) -> i16 {
        self.theta
    }

    pub fn theta_offset(&self) -> i16 {
        self.theta_offset
    }

    pub fn estimator(&self) -> &EstimatorPLL {
        &self.estimator
    }

    pub fn control(&self) -> &ControlParams {
        &self.ctrl
    }

    pub fn flux_weakening(&self) -> &FluxWeakening {
        &self.flux
    }

    pub fn config(&self) -> &FocConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserParams;

    const BUS: MotorInputs = MotorInputs {
        ia: 0,
        ib: 0,
        ibus: 0,
        vdc: 22481,
        pot: 0,
    };

    fn foc_with(user: UserParams) -> Foc {
        Foc::new(FocConfig::from_user(&user).unwrap())
    }

    fn foc() -> Foc {
        foc_with(UserParams::default())
    }

    #[test]
    fn raw_states_map_to_fault_when_unknown() {
        assert_eq!(FocState::from(0), FocState::Init);
        assert_eq!(FocState::from(3), FocState::ClosedLoop);
        assert_eq!(FocState::from(4), FocState::Fault);
        assert_eq!(FocState::from(5), FocState::Fault);
        assert_eq!(FocState::from(255), FocState::Fault);
    }

    #[test]
    fn invalid_state_enters_fault() {
        let mut foc = foc();
        foc.tick(&BUS);
        foc.set_state(42);
        assert_eq!(foc.state(), FocState::Fault);
        assert!(foc.fault_status());
        assert_eq!(foc.fault(), Some(FaultKind::InvalidState));
    }

    #[test]
    fn init_falls_through_into_rotor_lock() {
        let mut foc = foc();
        assert_eq!(foc.state(), FocState::Init);
        let duty = foc.tick(&BUS);
        assert_eq!(foc.state(), FocState::RotorLock);
        assert_eq!(foc.control().lock_time(), 1);
        // Forward path ran: duty is no longer the cleared value
        assert_ne!(duty, DutyCycles::ZERO);
    }

    #[test]
    fn rotor_lock_lasts_lock_time_limit_ticks() {
        let user = UserParams {
            lock_time: 300,
            ..UserParams::default()
        };
        let mut foc = foc_with(user);
        for _ in 0..299 {
            foc.tick(&BUS);
            assert_eq!(foc.state(), FocState::RotorLock);
            assert_eq!(foc.theta(), 0);
            assert_eq!(foc.control().iq_ref(), 0);
            assert_eq!(foc.control().id_ref(), foc.config().control.lock_current);
        }
        foc.tick(&BUS);
        assert_eq!(foc.state(), FocState::OpenLoop);
        assert_eq!(foc.control().ol_theta_sum(), 0);
        assert_eq!(foc.control().ol_theta(), 0);
        assert_eq!(foc.control().lock_time(), 0);
    }

    #[test]
    fn lock_current_builds_d_axis_voltage() {
        let mut foc = foc();
        for _ in 0..200 {
            foc.tick(&BUS);
        }
        // No feedback current: the d loop integrates toward its limit, q stays idle
        assert!(foc.vdq().d > 0);
        assert_eq!(foc.vdq().q, 0);
    }

    #[test]
    fn missing_or_negative_bus_leaves_no_voltage() {
        for vdc in [-200, 0] {
            let mut foc = foc();
            let inputs = MotorInputs { vdc, ..BUS };
            for _ in 0..10 {
                foc.tick(&inputs);
            }
            assert_eq!(foc.state(), FocState::RotorLock);
            assert_eq!(foc.vdq(), Dq::default());
            assert_eq!(foc.vabc(), Abc::default());
        }
    }

    fn into_open_loop(foc: &mut Foc) {
        while foc.state() != FocState::OpenLoop {
            foc.tick(&BUS);
        }
    }

    #[test]
    fn open_loop_ramps_speed_and_decays_lock_current() {
        let user = UserParams {
            lock_time: 10,
            ..UserParams::default()
        };
        let mut foc = foc_with(user);
        into_open_loop(&mut foc);
        let lock_current = foc.config().control.lock_current;
        for _ in 0..110 {
            foc.tick(&BUS);
        }
        assert_eq!(foc.state(), FocState::OpenLoop);
        assert_eq!(foc.control().vel_ref(), 10);
        assert_eq!(foc.control().id_ref(), lock_current - 110);
        assert_eq!(foc.control().iq_ref(), foc.config().control.ol_current_max);
        assert_eq!(foc.theta(), foc.control().ol_theta());
    }

    #[test]
    fn single_transition_to_closed_loop_with_theta_offset() {
        let user = UserParams {
            lock_time: 10,
            ..UserParams::default()
        };
        let mut foc = foc_with(user);
        into_open_loop(&mut foc);
        for _ in 0..50 {
            foc.tick(&BUS);
        }

        let max_ol = foc.config().motor.max_ol_speed;
        foc.ctrl.vel_ref = max_ol;
        foc.estimator.preset_speed(max_ol + 500);

        let expected = foc.control().ol_theta().wrapping_sub(foc.estimator().theta());
        foc.tick(&BUS);
        assert_eq!(foc.state(), FocState::ClosedLoop);
        assert_eq!(foc.theta_offset(), expected);

        let mut transitions = 0;
        let mut last = foc.state();
        for _ in 0..200 {
            foc.tick(&BUS);
            if foc.state() != last {
                transitions += 1;
                last = foc.state();
            }
        }
        assert_eq!(transitions, 0);
    }

    #[test]
    fn open_loop_only_never_closes() {
        let user = UserParams {
            lock_time: 10,
            open_loop_only: true,
            ..UserParams::default()
        };
        let mut foc = foc_with(user);
        into_open_loop(&mut foc);
        let max_ol = foc.config().motor.max_ol_speed;
        foc.ctrl.vel_ref = max_ol;
        foc.estimator.preset_speed(max_ol + 500);
        for _ in 0..100 {
            foc.tick(&BUS);
        }
        assert_eq!(foc.state(), FocState::OpenLoop);
    }

    #[test]
    fn theta_offset_decays_by_fixed_steps() {
        let mut foc = foc();
        foc.state = FocState::ClosedLoop;
        foc.theta_offset = 95;
        let mut seen = [0i16; 11];
        for slot in seen.iter_mut() {
            foc.tick(&BUS);
            *slot = foc.theta_offset();
        }
        assert_eq!(&seen[..10], &[85, 75, 65, 55, 45, 35, 25, 15, 5, 0]);
        assert_eq!(seen[10], 0);

        foc.theta_offset = -23;
        foc.tick(&BUS);
        assert_eq!(foc.theta_offset(), -13);
        foc.tick(&BUS);
        assert_eq!(foc.theta_offset(), -3);
        foc.tick(&BUS);
        assert_eq!(foc.theta_offset(), 0);
    }

    #[test]
    fn fault_is_terminal_and_sticky() {
        let mut foc = foc();
        for _ in 0..20 {
            foc.tick(&BUS);
        }
        foc.signal_fault(FaultKind::OverCurrent);
        let frozen = foc.duty();
        for _ in 0..20 {
            assert_eq!(foc.tick(&BUS), frozen);
            assert_eq!(foc.state(), FocState::Fault);
        }
        assert!(foc.fault_status());
        // A second fault does not overwrite the first cause
        foc.signal_fault(FaultKind::ControlScheme);
        assert_eq!(foc.fault(), Some(FaultKind::OverCurrent));

        foc.init();
        assert!(!foc.fault_status());
        assert_eq!(foc.state(), FocState::Init);
        assert_eq!(foc.duty(), DutyCycles::ZERO);
        foc.tick(&BUS);
        assert_eq!(foc.state(), FocState::RotorLock);
    }

    #[test]
    fn start_enters_rotor_lock() {
        let mut foc = foc();
        foc.init();
        foc.start();
        assert_eq!(foc.state(), FocState::RotorLock);
        foc.tick(&BUS);
        assert_eq!(foc.control().lock_time(), 1);
    }
}
