// Implements the back-EMF PLL estimator, the sensorless observer that infers
// rotor angle and speed from measured currents and applied voltages.

// Key Features:
// - Current derivative over one or four samples depending on speed
// - Stator resistance and inductance drops removed from the applied voltage
// - Back-EMF rotated into the estimated rotor frame and low-pass filtered
// - Speed from the q-axis back-EMF, corrected by the d-axis error
// - Angle by integrating speed; filtered speed for the outer speed loop

// Detailed Operation:
// Each tick the estimator takes the alpha/beta current of this tick and the
// alpha/beta voltage commanded on the previous tick. The back-EMF is rotated
// using the angle estimated on the previous tick, so the estimate lags one
// control period behind the rotor. When aligned, the d-axis back-EMF is zero;
// a non-zero Ed shifts the speed estimate until the integrated angle locks on.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::config::{MotorConfig, PllConfig};
use crate::math_integer::filters::accumulator::Accumulator;
use crate::math_integer::q15;
use crate::math_integer::sample_ring::SampleRing;
use crate::math_integer::transforms::{park, AlphaBeta, Dq};
use crate::math_integer::trigonometry::sincos;

/// Depth of the current history used for the low-speed derivative
const HISTORY_DEPTH: usize = 4;

pub struct EstimatorPLL {
    config: PllConfig,
    motor: MotorConfig,

    history: SampleRing<AlphaBeta, HISTORY_DEPTH>,

    di: AlphaBeta,       // Limited current difference of this tick
    v_ind: AlphaBeta,    // Inductive voltage drop
    bemf: AlphaBeta,     // Back-EMF in the stationary frame
    bemf_dq: Dq,         // Back-EMF in the estimated rotor frame, unfiltered
    esd: Accumulator,    // Filtered d-axis back-EMF
    esq: Accumulator,    // Filtered q-axis back-EMF
    omega: i16,          // Raw speed estimate
    omega_filt: Accumulator,
    theta: Accumulator,
}

impl EstimatorPLL {
    pub fn new(config: PllConfig, motor: MotorConfig) -> Self {
        Self {
            config,
            motor,
            history: SampleRing::new(),
            di: AlphaBeta::default(),
            v_ind: AlphaBeta::default(),
            bemf: AlphaBeta::default(),
            bemf_dq: Dq::default(),
            esd: Accumulator::new(),
            esq: Accumulator::new(),
            omega: 0,
            omega_filt: Accumulator::new(),
            theta: Accumulator::new(),
        }
    }

    /// Clears all estimator state: history, filters, angle and speed
    pub fn reset(&mut self) {
        self.history.clear();
        self.di = AlphaBeta::default();
        self.v_ind = AlphaBeta::default();
        self.bemf = AlphaBeta::default();
        self.bemf_dq = Dq::default();
        self.esd.reset();
        self.esq.reset();
        self.omega = 0;
        self.omega_filt.reset();
        self.theta.reset();
    }

    /// Runs one estimator step.
    ///
    /// # Arguments
    /// * `current` - Alpha/beta current measured this tick
    /// * `voltage` - Alpha/beta voltage commanded on the previous tick
    pub fn tick(&mut self, current: AlphaBeta, voltage: AlphaBeta) {
        self.inductive_drop(current);
        self.history.push(current);

        // E = V - Rs·I - Ls·dI/dt
        let rs = self.motor.rs;
        let rs_scale = self.motor.rs_scale;
        self.bemf = AlphaBeta {
            alpha: voltage
                .alpha
                .wrapping_sub(q15::mul_shr(rs, current.alpha, rs_scale))
                .wrapping_sub(self.v_ind.alpha),
            beta: voltage
                .beta
                .wrapping_sub(q15::mul_shr(rs, current.beta, rs_scale))
                .wrapping_sub(self.v_ind.beta),
        };

        // Rotate with the angle of the previous tick
        self.bemf_dq = park(self.bemf, sincos(self.theta.output()));
        let ed = self.esd.filter(self.bemf_dq.d, self.config.kfilter_esdq);
        let eq = self.esq.filter(self.bemf_dq.q, self.config.kfilter_esdq);

        // Above the decimation speed Eq carries a trustworthy sign
        let positive = if q15::abs(self.omega_filt.output()) > self.config.threshold_speed_bemf {
            eq > 0
        } else {
            self.omega_filt.output() > 0
        };
        let delta_es = if positive {
            eq.wrapping_sub(ed)
        } else {
            eq.wrapping_add(ed)
        };
        self.omega = ((self.config.inv_kfi as i32 * delta_es as i32) >> self.config.inv_kfi_scale)
            as i16;

        self.theta.integrate(self.omega, self.config.delta_t);
        self.omega_filt
            .filter(self.omega, self.config.omega_filt_const);
    }

    /// Limited current derivative and the matching inductive voltage drop
    fn inductive_drop(&mut self, current: AlphaBeta) {
        let (reference, limit, shift) =
            if q15::abs(self.omega_filt.output()) < self.config.threshold_speed_derivative {
                // Low speed: difference across four samples, Δt four times longer
                (
                    self.history.oldest(),
                    self.config.di_limit_ls,
                    self.motor.ls_dt_scale + 2,
                )
            } else {
                (
                    self.history.latest(),
                    self.config.di_limit_hs,
                    self.motor.ls_dt_scale,
                )
            };

        let diff = |now: i16, then: i16| -> i16 {
            (now as i32 - then as i32).clamp(-(limit as i32), limit as i32) as i16
        };
        self.di = AlphaBeta {
            alpha: diff(current.alpha, reference.alpha),
            beta: diff(current.beta, reference.beta),
        };

        let ls_dt = self.motor.ls_dt as i32;
        self.v_ind = AlphaBeta {
            alpha: ((ls_dt * self.di.alpha as i32) >> shift) as i16,
            beta: ((ls_dt * self.di.beta as i32) >> shift) as i16,
        };
    }

    /// Estimated electrical angle
    #[inline(always)]
    pub fn theta(&self) -> i16 {
        self.theta.output()
    }

    /// Filtered speed estimate, input of the speed loop
    #[inline(always)]
    pub fn omega_filtered(&self) -> i16 {
        self.omega_filt.output()
    }

    /// Unfiltered speed estimate of the last tick
    pub fn omega(&self) -> i16 {
        self.omega
    }

    /// Filtered back-EMF in the estimated rotor frame
    pub fn bemf_dq_filtered(&self) -> Dq {
        Dq {
            d: self.esd.output(),
            q: self.esq.output(),
        }
    }

    pub fn bemf_alpha_beta(&self) -> AlphaBeta {
        self.bemf
    }

    pub fn current_delta(&self) -> AlphaBeta {
        self.di
    }

    #[cfg(test)]
    pub(crate) fn preset_speed(&mut self, omega: i16) {
        self.omega = omega;
        self.omega_filt = Accumulator::preloaded(omega);
    }
}
