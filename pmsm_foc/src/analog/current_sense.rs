// Implements phase current offset calibration and over-current detection.

// Key Features:
// - Averages 2^N samples of each current channel while the bridge is off
// - Removes the latched offsets from every later measurement
// - Flags phase currents beyond the configured fault limit

// Detailed Operation:
// The offset measurement runs before the first start with PWM disabled, so the
// sampled currents are pure amplifier offset. Samples are summed in i32 and the
// average is taken with a shift once the sample count is reached.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::hal::MotorInputs;
use crate::math_integer::q15;

/// Offset calibration of the phase and bus current channels
pub struct CurrentSense {
    samples_log2: u8,
    count: u32,

    sum_a: i32,
    sum_b: i32,
    sum_bus: i32,

    offset_a: i16,
    offset_b: i16,
    offset_bus: i16,

    ready: bool,
}

impl CurrentSense {
    /// # Arguments
    /// * `samples_log2` - Offset averaging length as a power of two (at most 16)
    pub fn new(samples_log2: u8) -> Self {
        Self {
            samples_log2: samples_log2.min(16),
            count: 0,
            sum_a: 0,
            sum_b: 0,
            sum_bus: 0,
            offset_a: 0,
            offset_b: 0,
            offset_bus: 0,
            ready: false,
        }
    }

    /// Discards the accumulated samples and the latched offsets
    pub fn init(&mut self) {
        *self = Self::new(self.samples_log2);
    }

    /// Adds one sample of every channel to the running sums
    pub fn measure_offset(&mut self, inputs: &MotorInputs) {
        if self.ready {
            return;
        }
        self.sum_a += inputs.ia as i32;
        self.sum_b += inputs.ib as i32;
        self.sum_bus += inputs.ibus as i32;
        self.count += 1;

        if self.count >= 1 << self.samples_log2 {
            self.offset_a = (self.sum_a >> self.samples_log2) as i16;
            self.offset_b = (self.sum_b >> self.samples_log2) as i16;
            self.offset_bus = (self.sum_bus >> self.samples_log2) as i16;
            self.ready = true;
            info!(
                "CURRENT: offsets a {} b {} bus {}",
                self.offset_a,
                self.offset_b,
                self.offset_bus
            );
        }
    }

    pub fn is_offset_ready(&self) -> bool {
        self.ready
    }

    /// Removes the latched offsets from a measurement
    pub fn calibrate(&self, inputs: &mut MotorInputs) {
        inputs.ia = inputs.ia.saturating_sub(self.offset_a);
        inputs.ib = inputs.ib.saturating_sub(self.offset_b);
        inputs.ibus = inputs.ibus.saturating_sub(self.offset_bus);
    }

    /// Latched offsets of phase A, phase B and the bus channel
    pub fn offsets(&self) -> (i16, i16, i16) {
        (self.offset_a, self.offset_b, self.offset_bus)
    }
}

/// True when either measured phase current exceeds `limit` in magnitude
pub fn over_current(inputs: &MotorInputs, limit: i16) -> bool {
    q15::abs(inputs.ia) > limit || q15::abs(inputs.ib) > limit
}
