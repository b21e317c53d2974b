// Q15 fixed-point helpers shared by every control block.
// A value of ±32767 represents ±1.0; all products go through an i32 intermediate
// before being shifted back and saturated to i16.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

/// Largest representable Q15 value (≈ +1.0)
pub const ONE: i16 = i16::MAX;

/// √3 in Q14, used to scale phase voltages into the modulator input range
pub const SQRT3_Q14: i16 = 28377;

/// 1/√3 in Q15
pub const INV_SQRT3: i16 = 18919;

/// √3/2 in Q15
pub const SQRT3_DIV2: i16 = 28378;

/// Saturates an i32 to the i16 range.
#[inline(always)]
pub const fn sat(value: i32) -> i16 {
    if value > i16::MAX as i32 {
        i16::MAX
    } else if value < i16::MIN as i32 {
        i16::MIN
    } else {
        value as i16
    }
}

/// Saturates an i64 to the i32 range.
#[inline(always)]
pub const fn sat32(value: i64) -> i32 {
    if value > i32::MAX as i64 {
        i32::MAX
    } else if value < i32::MIN as i64 {
        i32::MIN
    } else {
        value as i32
    }
}

/// Q15 product `a * b >> 15`, saturated.
#[inline(always)]
pub const fn mul(a: i16, b: i16) -> i16 {
    sat((a as i32 * b as i32) >> 15)
}

/// Product with an arbitrary right shift, used for values carrying their own Q-scale.
#[inline(always)]
pub const fn mul_shr(a: i16, b: i16, shift: u8) -> i16 {
    sat((a as i32 * b as i32) >> shift)
}

/// Absolute value; `i16::MIN` maps to `i16::MAX`.
#[inline(always)]
pub const fn abs(value: i16) -> i16 {
    if value == i16::MIN {
        i16::MAX
    } else if value < 0 {
        -value
    } else {
        value
    }
}

/// Q15 square root. Non-positive inputs return 0.
pub const fn sqrt(value: i16) -> i16 {
    if value <= 0 {
        return 0;
    }
    // sqrt(x / 2^15) * 2^15 == sqrt(x * 2^15)
    let root = isqrt((value as u32) << 15);
    if root > i16::MAX as u32 {
        i16::MAX
    } else {
        root as i16
    }
}

/// Fractional division `(num << 15) / den`, saturated. Division by zero yields 0.
pub const fn div(num: i16, den: i16) -> i16 {
    if den == 0 {
        return 0;
    }
    sat(((num as i32) << 15) / den as i32)
}

/// Bitwise integer square root (floor).
const fn isqrt(value: u32) -> u32 {
    let mut rem = value;
    let mut root: u32 = 0;
    let mut bit: u32 = 1 << 30;

    while bit > rem {
        bit >>= 2;
    }
    while bit != 0 {
        if rem >= root + bit {
            rem -= root + bit;
            root = (root >> 1) + bit;
        } else {
            root >>= 1;
        }
        bit >>= 2;
    }
    root
}
