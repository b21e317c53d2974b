// Implements DC bus supervision: run/stop thresholds on the measured bus
// voltage and a filtered reading in millivolts for diagnostics.

// Key Features:
// - Gates the run command on a minimum bus voltage
// - Forces a stop when the bus collapses below the stop threshold
// - Low-pass filtered bus voltage scaled to millivolts

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::math_integer::filters::accumulator::Accumulator;
use crate::math_integer::normalization::norm_to_milli;

/// DC bus voltage monitor
pub struct SupplyVoltage {
    /// Smooths the reading reported in millivolts
    filter: Accumulator,
    k_filter: i16,

    /// Full-scale voltage in millivolts
    max_voltage_mv: i32,

    dc_min_run: i16,
    dc_max_stop: i16,

    /// Latest unfiltered normalized voltage
    voltage_norm: i16,
    voltage_mv: i32,
}

impl SupplyVoltage {
    /// # Arguments
    /// * `dc_min_run` - Normalized voltage required to accept a run command
    /// * `dc_max_stop` - Normalized voltage below which the motor is stopped
    /// * `k_filter` - Q15 gain of the millivolt reading filter
    /// * `max_voltage_mv` - Full-scale bus voltage in millivolts
    pub fn new(dc_min_run: i16, dc_max_stop: i16, k_filter: i16, max_voltage_mv: i32) -> Self {
        Self {
            filter: Accumulator::new(),
            k_filter,
            max_voltage_mv,
            dc_min_run,
            dc_max_stop,
            voltage_norm: 0,
            voltage_mv: 0,
        }
    }

    /// Takes a new normalized bus voltage sample
    pub fn tick(&mut self, vdc: i16) -> &Self {
        self.voltage_norm = vdc;
        let filtered = self.filter.filter(vdc, self.k_filter);
        self.voltage_mv = norm_to_milli(filtered, self.max_voltage_mv);
        self
    }

    /// Bus is high enough to accept a run command
    pub fn can_run(&self) -> bool {
        self.voltage_norm >= self.dc_min_run
    }

    /// Bus is too low to keep running
    pub fn must_stop(&self) -> bool {
        self.voltage_norm < self.dc_max_stop
    }

    pub fn voltage_norm(&self) -> i16 {
        self.voltage_norm
    }

    /// Filtered bus voltage in millivolts
    pub fn voltage_mv(&self) -> i32 {
        self.voltage_mv
    }
}
