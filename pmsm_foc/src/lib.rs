#![cfg_attr(not(test), no_std)]

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

// This must go first so the logging macros are visible to every module
#[macro_use]
mod fmt;

pub mod math_integer;

pub mod config;
pub mod hal;

pub mod analog;
pub mod foc;
pub mod load;

pub mod application;

pub use application::{AppState, MotorApp};
pub use config::{AppConfig, ConfigError, DriveConfig, FocConfig, MotorConfig, UserParams};
pub use foc::{FaultKind, Foc, FocState};
pub use hal::{LoadController, MotorFeedbackSource, MotorInputs, PwmSink};
pub use load::GenericLoad;
pub use math_integer::svm::DutyCycles;
