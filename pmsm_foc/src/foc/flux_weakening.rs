// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::config::{FluxWeakeningConfig, MotorConfig};
use crate::math_integer::controllers::{SatMode, PI};
use crate::math_integer::filters::accumulator::Accumulator;
use crate::math_integer::q15;
use crate::math_integer::transforms::Dq;

/// Voltage feedback flux weakening.
///
/// Above half the nominal speed a PI loop drives the magnitude of the commanded
/// voltage vector toward a reference just below the usable maximum. Its output
/// is a negative d-axis current reference that weakens the rotor field. Below
/// that speed the reference is zero and the PI is held in reset.
pub struct FluxWeakening {
    config: FluxWeakeningConfig,
    nominal_speed: i16,
    pi: PI,
    filter: Accumulator,
    voltage_mag: i16,
    id_ref: i16,
}

impl FluxWeakening {
    pub fn new(config: FluxWeakeningConfig, motor: &MotorConfig) -> Self {
        Self {
            config,
            nominal_speed: motor.nominal_speed,
            pi: PI::new(config.pi),
            filter: Accumulator::new(),
            voltage_mag: 0,
            id_ref: 0,
        }
    }

    pub fn reset(&mut self) {
        self.pi.reset(0);
        self.filter.reset();
        self.voltage_mag = 0;
        self.id_ref = 0;
    }

    /// Computes the d-axis current reference.
    ///
    /// # Arguments
    /// * `vdq` - Voltage vector commanded on the previous tick
    /// * `vel_ref` - Present speed reference
    pub fn tick(&mut self, vdq: Dq, vel_ref: i16) -> i16 {
        let vd_sq = q15::mul(vdq.d, vdq.d);
        let vq_sq = q15::mul(vdq.q, vdq.q);
        self.voltage_mag = q15::sqrt(vd_sq.saturating_add(vq_sq));

        let id_ref = if vel_ref > (self.nominal_speed >> 1) {
            self.pi
                .update(self.config.voltage_mag_ref, self.voltage_mag, SatMode::None)
        } else {
            // Held at zero so that re-entering starts without a step
            self.pi.reset(0);
            0
        };

        self.id_ref = if self.config.idref_filter {
            self.filter
                .filter(id_ref, self.config.idref_filt_const)
                .clamp(self.config.idref_min, 0)
        } else {
            id_ref
        };
        self.id_ref
    }

    pub fn id_ref(&self) -> i16 {
        self.id_ref
    }

    /// Magnitude of the last evaluated voltage vector
    pub fn voltage_mag(&self) -> i16 {
        self.voltage_mag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FocConfig, UserParams};

    fn block(filter: bool) -> (FluxWeakening, FocConfig) {
        let user = UserParams {
            fw_idref_filter: filter,
            ..UserParams::default()
        };
        let cfg = FocConfig::from_user(&user).unwrap();
        (FluxWeakening::new(cfg.flux, &cfg.motor), cfg)
    }

    #[test]
    fn inactive_below_half_nominal_speed() {
        let (mut fw, cfg) = block(false);
        let slow = (cfg.motor.nominal_speed >> 1) - 1;
        for _ in 0..100 {
            assert_eq!(fw.tick(Dq { d: 0, q: 20000 }, slow), 0);
        }
    }

    #[test]
    fn weakens_field_when_voltage_exceeds_reference() {
        let (mut fw, cfg) = block(false);
        let fast = cfg.motor.nominal_speed;
        let mut id = 0;
        for _ in 0..2000 {
            id = fw.tick(Dq { d: 0, q: 16000 }, fast);
        }
        assert!(fw.voltage_mag() > cfg.flux.voltage_mag_ref);
        assert!(id < 0);
        assert!(id >= cfg.flux.idref_min);
    }

    #[test]
    fn stays_at_zero_when_voltage_has_headroom() {
        let (mut fw, cfg) = block(false);
        for _ in 0..500 {
            assert_eq!(fw.tick(Dq { d: 0, q: 4000 }, cfg.motor.nominal_speed), 0);
        }
    }

    #[test]
    fn dropping_below_threshold_resets_integrator() {
        let (mut fw, cfg) = block(false);
        let fast = cfg.motor.nominal_speed;
        for _ in 0..2000 {
            fw.tick(Dq { d: 0, q: 16000 }, fast);
        }
        assert_eq!(fw.tick(Dq { d: 0, q: 16000 }, 0), 0);
        // Back above threshold with headroom: no leftover negative reference
        assert_eq!(fw.tick(Dq { d: 0, q: 4000 }, fast), 0);
    }

    #[test]
    fn filtered_reference_moves_gradually() {
        let (mut raw, cfg) = block(false);
        let (mut filtered, _) = block(true);
        let fast = cfg.motor.nominal_speed;
        let vdq = Dq { d: 0, q: 16000 };
        for _ in 0..50 {
            raw.tick(vdq, fast);
            filtered.tick(vdq, fast);
        }
        assert!(filtered.id_ref() > raw.id_ref());
        assert!(filtered.id_ref() <= 0);
    }
}
