// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::math_integer::q15::{sat, sat32};

/// Output limiting applied on top of the configured `[out_min, out_max]` range
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SatMode {
    /// Use the configured limits as they are
    None,
    /// Override both limits with `±limit` for this update
    Symmetric(i16),
}

/// Gains and limits of one PI loop.
///
/// Gains are Q15 with an extra left shift (`nkp`, `nki`) to reach values above 1.0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PiGains {
    pub kp: i16,
    pub nkp: u8,
    pub ki: i16,
    pub nki: u8,
    /// Anti-windup back-calculation gain, just below 1.0
    pub kc: i16,
    pub out_min: i16,
    pub out_max: i16,
}

/// A proportional-integral controller with back-calculation anti-windup.
///
/// **Note**
/// - Based on integer implementation and works with i16 range
/// - Works with constant dt only
/// - The integrator is kept in `output << 15` scale
pub struct PI {
    kp: i16,
    nkp: u8,
    ki: i16,
    nki: u8,
    kc: i16,

    out_min: i16,
    out_max: i16,

    /// Accumulator for the integral term
    integrator: i32,

    p_out: i16,
    i_out: i16,
    /// The PI controller output
    output: i16,
}

impl PI {
    /// Constructor for the PI controller
    ///
    /// # Arguments
    /// * `gains` - Gains, shifts and output limits
    ///
    /// # Returns
    /// A new controller with a cleared integrator.
    pub const fn new(gains: PiGains) -> Self {
        Self {
            kp: gains.kp,
            nkp: gains.nkp,
            ki: gains.ki,
            nki: gains.nki,
            kc: gains.kc,
            out_min: gains.out_min,
            out_max: gains.out_max,
            integrator: 0,
            p_out: 0,
            i_out: 0,
            output: 0,
        }
    }

    /// Update the PI controller calculations
    ///
    /// # Arguments
    /// * `reference` - Desired value
    /// * `measured` - Measured value
    /// * `mode` - Output limiting mode for this update
    ///
    /// # Returns
    /// The new controller output, clamped to the active limits.
    pub fn update(&mut self, reference: i16, measured: i16, mode: SatMode) -> i16 {
        let (out_min, out_max) = match mode {
            SatMode::None => (self.out_min, self.out_max.max(self.out_min)),
            SatMode::Symmetric(limit) => {
                let limit = limit.max(0);
                (-limit, limit)
            }
        };

        let error = sat(reference as i32 - measured as i32) as i64;

        // ######################## PROPORTIONAL TERM #################################
        let p = (error * self.kp as i64) << self.nkp;

        // ############################## OUTPUT ######################################
        // Unclamped sum in output << 15 scale; i64 keeps kp << nkp from overflowing
        let unclamped = self.integrator as i64 + p;
        let clamped = unclamped.clamp((out_min as i64) << 15, (out_max as i64) << 15);

        // ########################## INTEGRAL TERM ###################################
        // Excess is zero unless the output is actually limited
        let excess = unclamped - clamped;
        let integral = (error * self.ki as i64) << self.nki;
        let correction = (self.kc as i64 * excess) >> 15;
        self.integrator = sat32(self.integrator as i64 + integral - correction);

        self.output = (clamped >> 15) as i16;
        self.p_out = sat((p >> 15) as i32);
        self.i_out = (self.integrator >> 15) as i16;

        self.output
    }

    /// Resets the integrator so that the next zero-error update outputs `preload`
    pub fn reset(&mut self, preload: i16) {
        self.integrator = (preload as i32) << 15;
        self.p_out = 0;
        self.i_out = preload;
        self.output = preload;
    }

    /// Changes the output limits; used for limits that follow the bus voltage.
    ///
    /// A crossed pair collapses to `out_min` on both sides.
    #[inline(always)]
    pub fn set_limits(&mut self, out_min: i16, out_max: i16) {
        self.out_min = out_min;
        self.out_max = out_max.max(out_min);
    }

    /// Retrieve the output value of the PI controller
    #[inline(always)]
    pub fn output(&self) -> i16 {
        self.output
    }

    /// Proportional part of the last update
    pub fn proportional(&self) -> i16 {
        self.p_out
    }

    /// Integrator in output scale
    pub fn integral(&self) -> i16 {
        self.i_out
    }

    /// Raw integrator, `output << 15` scale
    pub fn integrator(&self) -> i32 {
        self.integrator
    }

    pub fn limits(&self) -> (i16, i16) {
        (self.out_min, self.out_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math_integer::normalization::to_q15;

    fn gains(kp: i16, ki: i16, out_max: i16) -> PiGains {
        PiGains {
            kp,
            nkp: 0,
            ki,
            nki: 0,
            kc: to_q15(0.99999),
            out_min: -out_max,
            out_max,
        }
    }

    #[test]
    fn zero_error_holds_output() {
        let mut pi = PI::new(gains(12874, 362, 15000));
        for _ in 0..50 {
            pi.update(3000, 1000, SatMode::None);
        }
        let held = pi.output();
        let integrator = pi.integrator();
        for _ in 0..1000 {
            assert_eq!(pi.update(500, 500, SatMode::None), pi.integral());
        }
        assert_eq!(pi.integrator(), integrator);
        // With zero error only the integrator remains, proportional part vanishes
        assert_eq!(pi.output(), (integrator >> 15) as i16);
        assert!(held > pi.output());
    }

    #[test]
    fn positive_error_saturates_and_integrator_stays_bounded() {
        let half = to_q15(0.5);
        let out_max = 20000;
        let mut pi = PI::new(gains(half, half, out_max));

        let mut saturated_at = None;
        for tick in 0..10_000 {
            let out = pi.update(i16::MAX, 0, SatMode::None);
            if saturated_at.is_none() && out == out_max {
                saturated_at = Some(tick);
            }
            if saturated_at.is_some() {
                assert_eq!(out, out_max);
            }
            // Back-calculation keeps the integrator near the limit
            let bound = (out_max as i32) << 15;
            assert!(pi.integrator() <= bound + (32767 * half as i32), "tick {}", tick);
        }
        assert!(saturated_at.unwrap() < 3);
    }

    #[test]
    fn recovers_quickly_after_saturation() {
        let mut pi = PI::new(gains(to_q15(0.5), to_q15(0.5), 20000));
        for _ in 0..10_000 {
            pi.update(i16::MAX, 0, SatMode::None);
        }
        // A few ticks of negative error must pull the output off the limit
        let mut out = 0;
        for _ in 0..3 {
            out = pi.update(0, 10000, SatMode::None);
        }
        assert!(out < 20000);
    }

    #[test]
    fn small_error_integrates_without_truncation_loss() {
        // Gains like the speed loop: a tiny ki must still move the output
        let mut pi = PI::new(PiGains {
            kp: 13140,
            nkp: 1,
            ki: 7,
            nki: 0,
            kc: to_q15(0.99999),
            out_min: -6318,
            out_max: 6318,
        });
        pi.reset(-1041);
        let start = pi.update(3000, 1655, SatMode::None);
        for _ in 0..1000 {
            pi.update(3000, 1655, SatMode::None);
        }
        assert!(pi.output() > start + 200);
    }

    #[test]
    fn reset_preloads_output() {
        let mut pi = PI::new(gains(1000, 100, 10000));
        pi.reset(1234);
        assert_eq!(pi.output(), 1234);
        assert_eq!(pi.update(0, 0, SatMode::None), 1234);
    }

    #[test]
    fn symmetric_mode_overrides_limits() {
        let mut pi = PI::new(gains(to_q15(0.5), 0, 20000));
        assert_eq!(pi.update(i16::MAX, 0, SatMode::Symmetric(5000)), 5000);
        assert_eq!(pi.update(i16::MIN, 0, SatMode::Symmetric(5000)), -5000);
        assert_eq!(pi.limits(), (-20000, 20000));
    }

    #[test]
    fn dynamic_limits_apply_on_next_update() {
        let mut pi = PI::new(gains(to_q15(0.5), 0, 20000));
        pi.set_limits(-100, 100);
        assert_eq!(pi.update(10000, 0, SatMode::None), 100);
    }

    #[test]
    fn crossed_limits_collapse_instead_of_panicking() {
        let mut pi = PI::new(gains(to_q15(0.5), to_q15(0.5), 20000));
        pi.set_limits(138, -138);
        assert_eq!(pi.limits(), (138, 138));
        assert_eq!(pi.update(10000, 0, SatMode::None), 138);
        assert_eq!(pi.update(-10000, 0, SatMode::None), 138);

        // Crossed limits straight from the gains
        let mut pi = PI::new(PiGains {
            out_min: 50,
            out_max: -50,
            ..gains(to_q15(0.5), 0, 0)
        });
        assert_eq!(pi.update(-10000, 0, SatMode::None), 50);
    }
}
