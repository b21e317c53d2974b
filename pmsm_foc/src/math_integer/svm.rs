// Space vector modulation for a three phase bridge with center-aligned PWM.
//
// Detailed Operation:
// The modulator input is the √3-scaled phase voltage set. The scale is removed
// again here and the common mode (midpoint of the largest and smallest phase)
// is subtracted, which places the switching pattern exactly where classic
// sector-based SVM puts it. The result is a fraction of the bus voltage that
// is mapped around half of the PWM period. Duties are clamped to [0, period].

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use super::q15::INV_SQRT3;
use super::transforms::Abc;

/// Duty cycles of the three half bridges in timer counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DutyCycles {
    pub a: u16,
    pub b: u16,
    pub c: u16,
}

impl DutyCycles {
    pub const ZERO: DutyCycles = DutyCycles { a: 0, b: 0, c: 0 };

    pub fn as_array(&self) -> [u16; 3] {
        [self.a, self.b, self.c]
    }
}

/// Computes duty cycles from the √3-scaled phase voltage command.
///
/// ### Arguments
/// * `scaled` - Phase voltages multiplied by √3 (Q15)
/// * `period` - PWM period in timer counts
///
/// ### Returns
/// * Duty cycles, each within `[0, period]`; a zero command yields `period / 2` on every phase.
pub fn space_vector(scaled: Abc, period: u16) -> DutyCycles {
    let (a, b, c) = (scaled.a as i32, scaled.b as i32, scaled.c as i32);

    // Common mode between the extreme phases
    let max = a.max(b).max(c);
    let min = a.min(b).min(c);
    let mid = (max + min) >> 1;

    let period = period as i32;
    let half = period >> 1;

    let duty = |v: i32| -> u16 {
        let v = ((v - mid) * INV_SQRT3 as i32) >> 15;
        let d = half + ((v * period) >> 15);
        d.clamp(0, period) as u16
    };

    DutyCycles {
        a: duty(a),
        b: duty(b),
        c: duty(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math_integer::transforms::{inverse_clarke, inverse_park, Dq};
    use crate::math_integer::trigonometry::sincos;

    const PERIOD: u16 = 6249;

    #[test]
    fn zero_command_is_half_period() {
        let duty = space_vector(Abc::default(), PERIOD);
        for d in duty.as_array() {
            assert!((d as i32 - (PERIOD as i32 >> 1)).abs() <= 1);
        }
    }

    #[test]
    fn duties_always_within_period() {
        let extremes = [i16::MIN, -20000, -1, 0, 1, 20000, i16::MAX];
        for &a in extremes.iter() {
            for &b in extremes.iter() {
                for &c in extremes.iter() {
                    let duty = space_vector(Abc { a, b, c }, PERIOD);
                    for d in duty.as_array() {
                        assert!(d <= PERIOD);
                    }
                }
            }
        }
    }

    #[test]
    fn rotating_vector_keeps_common_mode_centered() {
        let dq = Dq { d: 0, q: 12000 };
        let mut angle: i32 = 0;
        while angle < 65536 {
            let v = inverse_clarke(inverse_park(dq, sincos(angle as i16)));
            let duty = space_vector(v, PERIOD);
            let arr = duty.as_array();
            let max = *arr.iter().max().unwrap() as i32;
            let min = *arr.iter().min().unwrap() as i32;
            // Zero sequence injection centers max and min around half period
            assert!(((max + min) - PERIOD as i32).abs() <= 4, "angle {}", angle);
            angle += 1000;
        }
    }
}
