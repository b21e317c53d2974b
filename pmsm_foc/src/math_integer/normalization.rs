// Conversions between physical quantities and normalized Q15 counts.
// A normalized value is the quantity divided by its full-scale base
// (peak board voltage, peak board current, peak speed) in Q15.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

/// Converts a fraction in [-1.0, 1.0] to Q15 with symmetric rounding.
///
/// Negative values scale by 32768 so that -1.0 maps to `i16::MIN`;
/// positive values scale by 32767. Out-of-range inputs saturate.
pub const fn to_q15(value: f32) -> i16 {
    let scaled = if value < 0.0 {
        32768.0 * value - 0.5
    } else {
        32767.0 * value + 0.5
    };
    // `as` truncates toward zero and saturates at the integer bounds
    let raw = scaled as i32;
    if raw > i16::MAX as i32 {
        i16::MAX
    } else if raw < i16::MIN as i32 {
        i16::MIN
    } else {
        raw as i16
    }
}

/// Normalizes `value` against the full-scale `base` (same unit).
///
/// # Arguments
/// * `value` - Physical value (volts, amps, rpm)
/// * `base` - Full-scale value of the same unit, must be positive
///
/// # Returns
/// The normalized value [i16]
pub const fn norm_value(value: f32, base: f32) -> i16 {
    to_q15(value / base)
}

/// Converts normalized value to milliamps, millivolts, etc.
///
/// # Arguments
/// * `value_norm` - The normalized value [i16]
/// * `full_scale` - The full scale value in milliamps, millivolts, etc. (only positive range) [i32]
///
/// # Returns
/// The value in milliamps, millivolts, etc. [i32]
pub const fn norm_to_milli(value_norm: i16, full_scale: i32) -> i32 {
    const BIT_SHIFT: u8 = 9; // Define bit shift for resolution enhancement

    // Pre-shift the full scale so the product stays within i32
    let scale = full_scale >> (15 - BIT_SHIFT);

    (value_norm as i32 * scale) >> BIT_SHIFT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn q15_rounds_symmetrically() {
        assert_eq!(to_q15(1.0), 32767);
        assert_eq!(to_q15(-1.0), -32768);
        assert_eq!(to_q15(0.5), 16384);
        assert_eq!(to_q15(-0.5), -16384);
        assert_eq!(to_q15(0.99999), 32767);
        assert_eq!(to_q15(0.0), 0);
    }

    #[test]
    fn usable_in_constants() {
        const KC: i16 = to_q15(0.99999);
        const BUS: i16 = norm_value(311.0, 453.3);
        assert_eq!(KC, 32767);
        assert_eq!(BUS, 22481);
    }

    #[test]
    fn q15_saturates() {
        assert_eq!(to_q15(2.0), i16::MAX);
        assert_eq!(to_q15(-3.0), i16::MIN);
    }

    #[test]
    fn norm_value_of_board_quantities() {
        // 311 V bus against a 453.3 V measurement range
        assert_eq!(norm_value(311.0, 453.3), 22481);
        // 500 rpm against a 7500 rpm peak speed
        assert_eq!(norm_value(500.0, 7500.0), 2184);
    }

    #[test]
    fn norm_to_milli_inverts_normalization() {
        let amps = norm_value(4.242, 22.0);
        let milli = norm_to_milli(amps, 22000);
        assert!((milli - 4242).abs() < 10, "{}", milli);
    }
}
