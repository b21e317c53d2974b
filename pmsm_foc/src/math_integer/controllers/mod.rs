pub mod pi;

pub use pi::{PiGains, SatMode, PI};
