// Two-field accumulator: a wide i32 state and its Q15 view (state >> 15).
// Used for first-order low-pass filters and for integrating speed into angle.
// Wraparound of the state is explicit (wrapping ops), so an integrated angle
// rolls over from +π to -π exactly like the 16-bit angle it feeds.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Accumulator {
    state: i32,  // Wide accumulator (output << 15 plus fraction)
    output: i16, // Q15 view of the state
}

impl Accumulator {
    pub const fn new() -> Self {
        Self {
            state: 0,
            output: 0,
        }
    }

    /// Creates an accumulator that already rests at `value`
    pub const fn preloaded(value: i16) -> Self {
        Self {
            state: (value as i32) << 15,
            output: value,
        }
    }

    /// First-order IIR: state += (input - output) * k
    ///
    /// `k` is the Q15 filter gain (larger is faster).
    #[inline]
    pub fn filter(&mut self, input: i16, k: i16) -> i16 {
        let diff = input as i32 - self.output as i32;
        self.state = self.state.wrapping_add(diff * k as i32);
        self.output = (self.state >> 15) as i16;
        self.output
    }

    /// Integrator: state += input * k, output wraps with the state
    #[inline]
    pub fn integrate(&mut self, input: i16, k: i16) -> i16 {
        self.state = self.state.wrapping_add(input as i32 * k as i32);
        self.output = (self.state >> 15) as i16;
        self.output
    }

    /// Clears state and output
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn output(&self) -> i16 {
        self.output
    }

    pub fn state(&self) -> i32 {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_settles_on_constant_input() {
        let mut lpf = Accumulator::new();
        for _ in 0..2000 {
            lpf.filter(10000, 1700);
        }
        assert!((lpf.output() - 10000).abs() <= 1);
    }

    #[test]
    fn filter_first_step_is_gain_scaled() {
        let mut lpf = Accumulator::new();
        // 16384 * 16384 >> 15 = 8192
        assert_eq!(lpf.filter(16384, 16384), 8192);
    }

    #[test]
    fn integrator_wraps_like_an_angle() {
        let mut theta = Accumulator::preloaded(32000);
        // k = i16::MAX is one count short of 1.0
        theta.integrate(1000, i16::MAX);
        theta.integrate(1000, i16::MAX);
        assert!(theta.output() < 0, "angle must wrap to the negative half turn");
        assert!((theta.output() as i32 + 65536 - 34000).abs() <= 2);
    }

    #[test]
    fn preloaded_matches_output() {
        let acc = Accumulator::preloaded(-1234);
        assert_eq!(acc.output(), -1234);
        assert_eq!(acc.state(), -1234 << 15);
    }
}
