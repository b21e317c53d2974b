// Feedback and forward paths of the field oriented controller.

// Detailed Operation:
// Feedback: two measured phase currents, the third by Kirchhoff, Clarke and
// Park transforms with the angle of the previous tick.
// Forward: d-axis current loop first, then a q-axis voltage limit from the
// voltage circle sqrt(Vmax² - Vd²), then the q-axis loop. The voltage vector is
// rotated back with the angle chosen for this tick, split into phases,
// compensated for the actual bus voltage, scaled by √3 and modulated.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use super::Foc;
use crate::hal::MotorInputs;
use crate::math_integer::controllers::SatMode;
use crate::math_integer::q15;
use crate::math_integer::svm::space_vector;
use crate::math_integer::transforms::{clarke, inverse_clarke, inverse_park, park, Abc};
use crate::math_integer::trigonometry::sincos;

impl Foc {
    /// Measured currents into the rotating frame
    pub(super) fn feedback_path(&mut self, inputs: &MotorInputs) {
        self.iabc = Abc::from_ab(inputs.ia, inputs.ib);
        self.vdc = inputs.vdc;
        self.ialphabeta = clarke(self.iabc);
        self.idq = park(self.ialphabeta, self.sincos);
    }

    /// Current loops, inverse transforms and modulation
    pub(super) fn forward_path(&mut self) {
        self.vdq.d = self
            .pi_d
            .update(self.ctrl.id_ref, self.idq.d, SatMode::None);

        // Voltage circle: the q-axis gets what the d-axis leaves
        let v_phase_max = q15::mul(self.config.vmax_factor, self.vdc).max(0);
        let v_max_sq = q15::mul(v_phase_max, v_phase_max);
        let vd_sq = q15::mul(self.vdq.d, self.vdq.d);
        let vq_limit = q15::sqrt(v_max_sq.saturating_sub(vd_sq));
        self.pi_d.set_limits(-v_phase_max, v_phase_max);
        self.pi_q.set_limits(-vq_limit, vq_limit);

        self.vdq.q = self
            .pi_q
            .update(self.ctrl.iq_ref, self.idq.q, SatMode::None);

        self.sincos = sincos(self.theta);
        self.valphabeta = inverse_park(self.vdq, self.sincos);
        self.vabc = inverse_clarke(self.valphabeta);

        let compensated = dc_link_compensation(self.vabc, self.vdc, self.config.dc_link_base);
        let scaled = modulation_signal(compensated);
        self.duty = space_vector(scaled, self.config.pwm_period);
    }
}

/// Rescales phase voltages from the rated to the measured bus voltage.
///
/// Above the rated voltage the ratio `base / vdc` is applied directly. Between
/// half and full rated voltage the ratio would exceed 1.0, so half the base is
/// divided instead and the result shifted one bit less. Below half rated the
/// output is forced to zero.
pub fn dc_link_compensation(vabc: Abc, vdc: i16, base: i16) -> Abc {
    let (ratio, scale) = if vdc > base {
        (q15::div(base, vdc), 0)
    } else if vdc > (base >> 1) {
        (q15::div(base >> 1, vdc), 1)
    } else {
        (0, 0)
    };
    let shift = 15 - scale;
    Abc {
        a: q15::mul_shr(vabc.a, ratio, shift),
        b: q15::mul_shr(vabc.b, ratio, shift),
        c: q15::mul_shr(vabc.c, ratio, shift),
    }
}

/// Multiplies each phase by √3, the input convention of the modulator
pub fn modulation_signal(vabc: Abc) -> Abc {
    Abc {
        a: q15::mul_shr(vabc.a, q15::SQRT3_Q14, 14),
        b: q15::mul_shr(vabc.b, q15::SQRT3_Q14, 14),
        c: q15::mul_shr(vabc.c, q15::SQRT3_Q14, 14),
    }
}
