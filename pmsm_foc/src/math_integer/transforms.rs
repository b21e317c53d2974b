// Reference frame transforms between the three phase (a, b, c), stationary
// (alpha, beta) and rotating (d, q) frames, all in Q15.

// Key Features:
// - Amplitude invariant Clarke transform from two measured phases (c = -a - b)
// - Park and inverse Park rotation by a precomputed sine/cosine pair
// - Inverse Clarke producing all three phase values
//
// Every product uses an i32 intermediate; sums of two products saturate
// before the shift so that full-scale inputs never wrap. Shifts round to
// nearest instead of truncating toward minus infinity.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use super::q15::{sat, INV_SQRT3, SQRT3_DIV2};
use super::trigonometry::SinCos;

/// Half of one Q15 LSB, added before `>> 15`
const ROUND: i32 = 1 << 14;

/// Three phase quantity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Abc {
    pub a: i16,
    pub b: i16,
    pub c: i16,
}

/// Stationary frame quantity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlphaBeta {
    pub alpha: i16,
    pub beta: i16,
}

/// Rotating frame quantity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Dq {
    pub d: i16,
    pub q: i16,
}

impl Abc {
    /// Builds the three phase set from two phases, deriving `c` by Kirchhoff.
    #[inline]
    pub const fn from_ab(a: i16, b: i16) -> Self {
        Abc {
            a,
            b,
            c: sat(-(a as i32) - b as i32),
        }
    }
}

/// Clarke transform: alpha = a, beta = (a + 2b) / √3.
#[inline]
pub const fn clarke(abc: Abc) -> AlphaBeta {
    let a = abc.a as i32;
    let b = abc.b as i32;
    AlphaBeta {
        alpha: abc.a,
        beta: sat(((a + 2 * b) * INV_SQRT3 as i32 + ROUND) >> 15),
    }
}

/// Park transform: d = alpha·cos + beta·sin, q = -alpha·sin + beta·cos.
#[inline]
pub const fn park(ab: AlphaBeta, sc: SinCos) -> Dq {
    let (alpha, beta) = (ab.alpha as i32, ab.beta as i32);
    let (sin, cos) = (sc.sin as i32, sc.cos as i32);
    Dq {
        d: sat((alpha * cos).saturating_add(beta * sin).saturating_add(ROUND) >> 15),
        q: sat((beta * cos).saturating_sub(alpha * sin).saturating_add(ROUND) >> 15),
    }
}

/// Inverse Park transform: alpha = d·cos - q·sin, beta = d·sin + q·cos.
#[inline]
pub const fn inverse_park(dq: Dq, sc: SinCos) -> AlphaBeta {
    let (d, q) = (dq.d as i32, dq.q as i32);
    let (sin, cos) = (sc.sin as i32, sc.cos as i32);
    AlphaBeta {
        alpha: sat((d * cos).saturating_sub(q * sin).saturating_add(ROUND) >> 15),
        beta: sat((d * sin).saturating_add(q * cos).saturating_add(ROUND) >> 15),
    }
}

/// Inverse Clarke transform:
/// a = alpha, b = -alpha/2 + (√3/2)·beta, c = -alpha/2 - (√3/2)·beta.
#[inline]
pub const fn inverse_clarke(ab: AlphaBeta) -> Abc {
    let half_alpha = -(ab.alpha as i32) * 16384;
    let beta_sqrt3_div2 = ab.beta as i32 * SQRT3_DIV2 as i32;
    Abc {
        a: ab.alpha,
        b: sat((half_alpha + beta_sqrt3_div2 + ROUND) >> 15),
        c: sat((half_alpha - beta_sqrt3_div2 + ROUND) >> 15),
    }
}
