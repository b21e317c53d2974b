// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

pub mod current_sense;
pub mod supply_voltage;

pub use current_sense::{over_current, CurrentSense};
pub use supply_voltage::SupplyVoltage;
