// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::config::ControlConfig;

/// Run-time references and counters of the FOC state machine.
///
/// Rate limits are applied with skip counters: a reference changes by its
/// ramp rate only once every `limit` ticks.
pub struct ControlParams {
    pub(crate) config: ControlConfig,

    /// Open-loop angle accumulator, `ol_theta << 15` scale
    pub(crate) ol_theta_sum: i32,
    pub(crate) ol_theta: i16,
    pub(crate) ol_current: i16,

    pub(crate) vel_ref: i16,
    pub(crate) target_velocity: i16,
    pub(crate) id_ref: i16,
    pub(crate) iq_ref: i16,

    pub(crate) speed_ramp_skip_cnt: u16,
    pub(crate) lock_time: u16,
}

impl ControlParams {
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            ol_theta_sum: 0,
            ol_theta: 0,
            ol_current: config.ol_current_min,
            vel_ref: 0,
            target_velocity: config.initial_target,
            id_ref: 0,
            iq_ref: 0,
            speed_ramp_skip_cnt: 0,
            lock_time: 0,
        }
    }

    /// Clears everything except the externally supplied target velocity
    pub fn reset(&mut self) {
        self.ol_theta_sum = 0;
        self.ol_theta = 0;
        self.ol_current = self.config.ol_current_min;
        self.vel_ref = 0;
        self.id_ref = 0;
        self.iq_ref = 0;
        self.speed_ramp_skip_cnt = 0;
        self.lock_time = 0;
    }

    /// Restarts the open-loop angle at zero
    pub(crate) fn reset_open_loop_angle(&mut self) {
        self.ol_theta_sum = 0;
        self.ol_theta = 0;
    }

    /// Raises the open-loop current toward its maximum
    pub(crate) fn ramp_open_loop_current(&mut self) {
        if self.ol_current < self.config.ol_current_max {
            self.ol_current = self
                .ol_current
                .saturating_add(self.config.ol_current_ramp_rate)
                .min(self.config.ol_current_max);
        }
    }

    /// Raises the open-loop speed by one step every `ol_speed_skip_limit` ticks.
    ///
    /// Returns `true` once the reference has reached the hand-over speed.
    pub(crate) fn ramp_open_loop_speed(&mut self, max_ol_speed: i16) -> bool {
        if self.vel_ref < max_ol_speed {
            if self.speed_ramp_skip_cnt >= self.config.ol_speed_skip_limit {
                self.speed_ramp_skip_cnt = 0;
                self.vel_ref = self.vel_ref.saturating_add(self.config.ol_speed_ramp_rate);
            } else {
                self.speed_ramp_skip_cnt += 1;
            }
            false
        } else {
            true
        }
    }

    /// Advances the open-loop angle by one control period at `vel_ref`
    pub(crate) fn advance_open_loop_angle(&mut self) -> i16 {
        self.ol_theta_sum = self
            .ol_theta_sum
            .wrapping_add(self.vel_ref as i32 * self.config.norm_delta_t as i32);
        self.ol_theta = (self.ol_theta_sum >> 15) as i16;
        self.ol_theta
    }

    /// Moves the speed reference toward the target with separate up/down rates
    pub(crate) fn ramp_speed_reference(&mut self) {
        let delta = self.vel_ref as i32 - self.target_velocity as i32;
        if delta < 0 {
            if self.speed_ramp_skip_cnt >= self.config.cl_ramp_inc_limit {
                self.speed_ramp_skip_cnt = 0;
                self.vel_ref = self
                    .vel_ref
                    .saturating_add(self.config.cl_speed_ramp_rate)
                    .min(self.target_velocity);
            }
        } else if delta > 0 {
            if self.speed_ramp_skip_cnt >= self.config.cl_ramp_dec_limit {
                self.speed_ramp_skip_cnt = 0;
                self.vel_ref = self
                    .vel_ref
                    .saturating_sub(self.config.cl_speed_ramp_rate)
                    .max(self.target_velocity);
            }
        } else {
            self.speed_ramp_skip_cnt = 0;
        }
        self.speed_ramp_skip_cnt = self.speed_ramp_skip_cnt.saturating_add(1);
    }

    pub fn vel_ref(&self) -> i16 {
        self.vel_ref
    }

    pub fn target_velocity(&self) -> i16 {
        self.target_velocity
    }

    pub fn id_ref(&self) -> i16 {
        self.id_ref
    }

    pub fn iq_ref(&self) -> i16 {
        self.iq_ref
    }

    pub fn ol_theta(&self) -> i16 {
        self.ol_theta
    }

    pub fn ol_theta_sum(&self) -> i32 {
        self.ol_theta_sum
    }

    pub fn ol_current(&self) -> i16 {
        self.ol_current
    }

    pub fn lock_time(&self) -> u16 {
        self.lock_time
    }
}
