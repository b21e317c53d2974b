// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

#![allow(dead_code)]

use std::f64::consts::PI;

use pmsm_foc::{FocConfig, FocState, Foc, MotorInputs, UserParams};

/// Normalized bus voltage used by the simulations
pub const VDC_FULL: i16 = 32767;

/// Drive parameters that reach closed loop within a few hundred ticks
pub fn fast_start_params() -> UserParams {
    UserParams {
        lock_time: 500,
        ol_speed_ramp_rate: 150,
        cl_speed_ramp_rate: 1,
        cl_ramp_up_skip: 2,
        cl_ramp_down_skip: 2,
        speed_ki: 60.0 / 32767.0,
        ..UserParams::default()
    }
}

pub fn fast_start_foc() -> Foc {
    Foc::new(FocConfig::from_user(&fast_start_params()).unwrap())
}

/// Electrical model of the default motor in normalized units.
///
/// Stator currents follow `L di = v - R i - e` once per tick. While the
/// controller forces the angle (lock and open loop) the rotor follows the
/// commanded field; in closed loop it accelerates with the q-axis current
/// against a viscous load.
pub struct Plant {
    pub i_alpha: f64,
    pub i_beta: f64,
    /// Electrical angle in radians
    pub theta: f64,
    /// Speed in normalized counts
    pub omega: f64,
    /// Speed change per tick per count of q current
    pub torque_gain: f64,
    /// Fraction of the speed lost per tick
    pub load: f64,
}

impl Plant {
    const RS: f64 = 3128.0 / 32768.0;
    const LS_DT: f64 = 13904.0 / 4096.0;
    const KFI: f64 = 16384.0 / 26751.0;
    const DELTA_T: f64 = 2560.0;

    pub fn new(load: f64) -> Self {
        Self {
            i_alpha: 0.0,
            i_beta: 0.0,
            theta: 0.0,
            omega: 0.0,
            torque_gain: 0.0025,
            load,
        }
    }

    /// Phase currents as the ADC would deliver them
    pub fn inputs(&self, vdc: i16) -> MotorInputs {
        let ia = self.i_alpha;
        let ib = -self.i_alpha / 2.0 + 3f64.sqrt() / 2.0 * self.i_beta;
        MotorInputs {
            ia: ia.round() as i16,
            ib: ib.round() as i16,
            ibus: 0,
            vdc,
            pot: 0,
        }
    }

    /// Advances the model by one tick with the voltage just commanded
    pub fn step(&mut self, foc: &Foc) {
        match foc.state() {
            FocState::RotorLock | FocState::OpenLoop => {
                self.omega = foc.control().vel_ref() as f64;
                self.theta = foc.theta() as f64 * PI / 32768.0;
            }
            _ => {
                let iq = -self.i_alpha * self.theta.sin() + self.i_beta * self.theta.cos();
                self.omega += self.torque_gain * iq - self.load * self.omega;
                self.theta += self.omega * Self::DELTA_T / 32768.0 * PI / 32768.0;
            }
        }

        let e = self.omega * Self::KFI;
        let e_alpha = -e * self.theta.sin();
        let e_beta = e * self.theta.cos();

        let v = foc.valphabeta();
        self.i_alpha += (v.alpha as f64 - Self::RS * self.i_alpha - e_alpha) / Self::LS_DT;
        self.i_beta += (v.beta as f64 - Self::RS * self.i_beta - e_beta) / Self::LS_DT;
    }
}

/// One control tick followed by one plant step
pub fn tick(foc: &mut Foc, plant: &mut Plant) {
    foc.tick(&plant.inputs(VDC_FULL));
    plant.step(foc);
}
