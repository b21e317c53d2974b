//! Board support: the inverter's implementations of the control core interfaces.

pub mod feedback;
pub mod pinout;
pub mod pwm;

pub use feedback::AdcFeedback;
pub use pwm::TimPwm;

/// The board drives no mechanical load with its own sequencing
pub type Load = pmsm_foc::GenericLoad;

/// Releases the gate driver from reset
pub fn init_driver_pins() {
    let mut dr_reset = pinout::RESET.init();
    dr_reset.set_high();
}
