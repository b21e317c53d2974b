// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::hal::LoadController;

/// States of a load without its own sequencing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadState {
    Wait,
    Run,
    Stop,
}

/// Load that is always ready to start and to stop
pub struct GenericLoad {
    state: LoadState,
}

impl GenericLoad {
    pub const fn new() -> Self {
        Self {
            state: LoadState::Wait,
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }
}

impl Default for GenericLoad {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadController for GenericLoad {
    fn init(&mut self) {
        self.state = LoadState::Wait;
    }

    // Nothing to sequence; the states only record where the motor is
    fn tick(&mut self) {}

    fn is_ready_to_start(&self) -> bool {
        true
    }

    fn is_ready_to_stop(&self) -> bool {
        true
    }

    fn start(&mut self) {
        self.state = LoadState::Run;
    }

    fn stop(&mut self) {
        self.state = LoadState::Stop;
    }
}
