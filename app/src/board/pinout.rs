//! Pin assignment of the inverter board.
use hal::gpio::{Pin, PinMode, Port};

/// Represents the definition of a GPIO pin.
pub struct PinDef {
    port: Port,
    pin: u8,
    mode: PinMode,
}

impl PinDef {
    /// Configures the pin and returns its handle
    pub fn init(&self) -> Pin {
        Pin::new(self.port, self.pin, self.mode)
    }
}

/// Gate driver reset, active low
pub const RESET: PinDef = PinDef {
    port: Port::B,
    pin: 2,
    mode: PinMode::Output,
};

/// Gate driver enable; low keeps all six switches off
pub const ENABLE: PinDef = PinDef {
    port: Port::A,
    pin: 4,
    mode: PinMode::Output,
};

/// TIM2_CH1, phase A
pub const PWM_A: PinDef = PinDef {
    port: Port::A,
    pin: 0,
    mode: PinMode::Alt(1),
};

/// TIM2_CH2, phase B
pub const PWM_B: PinDef = PinDef {
    port: Port::A,
    pin: 1,
    mode: PinMode::Alt(1),
};

/// TIM2_CH3, phase C
pub const PWM_C: PinDef = PinDef {
    port: Port::B,
    pin: 10,
    mode: PinMode::Alt(1),
};
