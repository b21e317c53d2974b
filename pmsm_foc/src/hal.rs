//! Capability interfaces between the control core and the board layer.
//!
//! The board provides measurements, a PWM output stage and the mechanical load
//! supervision. Each inverter instance gets its own implementations injected.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::math_integer::svm::DutyCycles;

/// Measurements of one control tick, already scaled and sign adjusted (Q15)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorInputs {
    /// Phase A current
    pub ia: i16,
    /// Phase B current
    pub ib: i16,
    /// DC bus current
    pub ibus: i16,
    /// DC bus voltage
    pub vdc: i16,
    /// Speed demand (potentiometer), 0..=32767
    pub pot: i16,
}

/// Source of the per-tick measurements
pub trait MotorFeedbackSource {
    fn read(&mut self) -> MotorInputs;
}

/// Three phase PWM output stage
pub trait PwmSink {
    /// Writes the duty cycles; the implementation applies its own minimum duty
    fn set_duty_cycles(&mut self, duty: &DutyCycles);
    fn enable_outputs(&mut self);
    fn disable_outputs(&mut self);
}

/// Mechanical load attached to the motor
pub trait LoadController {
    fn init(&mut self);
    fn tick(&mut self);
    fn is_ready_to_start(&self) -> bool;
    fn is_ready_to_stop(&self) -> bool;
    /// Called together with the motor start transition
    fn start(&mut self);
    /// Requests the load to stop; called when the motor leaves the run state
    fn stop(&mut self);
}
