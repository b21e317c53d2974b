// Implements the drive configuration: physical user parameters and their
// normalized fixed-point counterparts consumed by the control blocks.

// Key Features:
// - `UserParams` in engineering units (volts, amps, rpm) with tuned defaults
// - One-time normalization into `MotorConfig`, `FocConfig` and `AppConfig`
// - Validation that rejects inconsistent parameter sets before the motor runs

// Detailed Operation:
// Voltages are normalized to the peak measurable board voltage, currents to the
// peak measurable current and speeds to the peak speed, all as Q15. Motor
// constants that come out of the tuning sheet (resistance, inductance/dt,
// inverse flux constant) are already normalized and carry their own Q-scale.
// Normalization happens once at start-up; the resulting structures are never
// mutated while the motor runs.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::math_integer::controllers::PiGains;
use crate::math_integer::normalization::{norm_value, to_q15};

/// Reasons a parameter set is rejected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A full-scale base (voltage, current, speed) is zero or negative
    NonPositiveBase,
    /// Speeds must satisfy min <= open loop end <= nominal <= max <= peak
    SpeedOrder,
    /// A configured current is negative or exceeds the measurable peak current
    CurrentOutOfRange,
    ZeroPwmPeriod,
    /// A Q-format shift does not fit a 16-bit value
    ShiftTooLarge,
    LockTimeZero,
}

/// Engineering-unit parameters of the board, motor and tuning.
///
/// Defaults describe a Leadshine EL5-M0400 on a 311 V bus.
#[derive(Clone, Debug, PartialEq)]
pub struct UserParams {
    // Board measurement ranges
    pub peak_voltage: f32,
    pub peak_current: f32,
    /// Rated DC bus voltage (rated line voltage · √2)
    pub base_voltage: f32,
    pub peak_speed_rpm: f32,
    pub pwm_frequency_hz: f32,
    pub pwm_period: u16,
    /// Lowest duty the gate driver accepts, applied by the PWM sink
    pub min_duty: u16,

    // Motor
    pub pole_pairs: u8,
    pub nominal_speed_rpm: f32,
    pub max_speed_rpm: f32,
    pub min_speed_rpm: f32,
    /// Open-loop to closed-loop hand-over speed
    pub end_speed_rpm: f32,
    pub nominal_current_peak: f32,

    // Pre-normalized motor constants
    pub rs: i16,
    pub rs_scale: u8,
    pub ls_dt: i16,
    pub ls_dt_scale: u8,
    pub inv_kfi: i16,
    pub inv_kfi_scale: u8,
    pub di_limit_hs: i16,
    pub di_limit_ls: i16,

    // Current loops (d and q share gains)
    pub current_kp: i16,
    pub current_kp_scale: u8,
    pub current_ki: i16,
    pub current_ki_scale: u8,
    pub voltage_util_factor: f32,

    // Speed loop
    pub speed_kp: f32,
    pub speed_kp_scale: u8,
    pub speed_ki: f32,
    pub speed_ki_scale: u8,

    // Estimator
    pub kfilter_esdq: i16,
    pub kfilter_velestim: i16,
    pub decimate_speed_rpm: f32,

    // Flux weakening
    pub fw_voltage_ref_factor: f32,
    pub fw_kp: i16,
    pub fw_kp_scale: u8,
    pub fw_ki: i16,
    /// Deepest field weakening as a fraction of nominal current
    pub fw_id_min_factor: f32,
    pub fw_idref_filter: bool,
    pub fw_idref_filt_const: i16,

    // Start-up
    pub lock_time: u16,
    pub lock_current: f32,
    pub ol_speed_ramp_rate: i16,
    pub ol_speed_ramp_skip: u16,
    pub ol_current_min: f32,
    pub ol_current_max: f32,
    pub ol_current_ramp_rate: i16,
    /// Never leave open loop (commissioning aid)
    pub open_loop_only: bool,

    // Closed-loop speed ramp
    pub cl_speed_ramp_rate: i16,
    pub cl_ramp_up_skip: u16,
    pub cl_ramp_down_skip: u16,

    // Supervision
    pub min_dc_voltage: f32,
    pub fault_current_factor: f32,
    pub offset_samples_log2: u8,
}

impl Default for UserParams {
    fn default() -> Self {
        const NOMINAL_SPEED_RPM: f32 = 3000.0;
        const NOMINAL_CURRENT_PEAK: f32 = 3.0 * 1.414;
        Self {
            peak_voltage: 453.3,
            peak_current: 22.0,
            base_voltage: 311.0,
            peak_speed_rpm: 2.5 * NOMINAL_SPEED_RPM,
            pwm_frequency_hz: 16_000.0,
            pwm_period: 6249,
            min_duty: 600,

            pole_pairs: 5,
            nominal_speed_rpm: NOMINAL_SPEED_RPM,
            max_speed_rpm: 5000.0,
            min_speed_rpm: 500.0,
            end_speed_rpm: 500.0,
            nominal_current_peak: NOMINAL_CURRENT_PEAK,

            rs: 3128,
            rs_scale: 15,
            ls_dt: 13904,
            ls_dt_scale: 12,
            inv_kfi: 26751,
            inv_kfi_scale: 14,
            di_limit_hs: 1024,
            di_limit_ls: 8192,

            current_kp: 12874,
            current_kp_scale: 0,
            current_ki: 362,
            current_ki_scale: 0,
            voltage_util_factor: 0.82,

            speed_kp: 0.401,
            speed_kp_scale: 1,
            speed_ki: 0.00022,
            speed_ki_scale: 0,

            kfilter_esdq: 1700,
            kfilter_velestim: 500,
            decimate_speed_rpm: 100.0,

            fw_voltage_ref_factor: 0.93,
            fw_kp: 305,
            fw_kp_scale: 1,
            fw_ki: 2,
            fw_id_min_factor: 0.8,
            fw_idref_filter: false,
            fw_idref_filt_const: 1000,

            lock_time: 5000,
            lock_current: 0.5,
            ol_speed_ramp_rate: 1,
            ol_speed_ramp_skip: 10,
            ol_current_min: 1.0,
            ol_current_max: 1.0,
            ol_current_ramp_rate: 1,
            open_loop_only: false,

            cl_speed_ramp_rate: 1,
            cl_ramp_up_skip: 20,
            cl_ramp_down_skip: 20,

            min_dc_voltage: 100.0,
            fault_current_factor: 1.6,
            offset_samples_log2: 7,
        }
    }
}

impl UserParams {
    /// Checks the parameter set for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bases = [
            self.peak_voltage,
            self.peak_current,
            self.base_voltage,
            self.peak_speed_rpm,
            self.pwm_frequency_hz,
        ];
        if bases.iter().any(|&b| !(b > 0.0)) {
            return Err(ConfigError::NonPositiveBase);
        }

        let speeds = [
            self.min_speed_rpm,
            self.end_speed_rpm,
            self.nominal_speed_rpm,
            self.max_speed_rpm,
            self.peak_speed_rpm,
        ];
        if speeds.windows(2).any(|w| w[0] > w[1]) || self.min_speed_rpm < 0.0 {
            return Err(ConfigError::SpeedOrder);
        }

        let currents = [
            self.nominal_current_peak,
            self.nominal_current_peak * self.fault_current_factor,
            self.lock_current,
            self.ol_current_min,
            self.ol_current_max,
            self.nominal_current_peak * self.fw_id_min_factor,
        ];
        if currents.iter().any(|&i| i < 0.0 || i > self.peak_current)
            || self.ol_current_min > self.ol_current_max
            || self.di_limit_hs < 0
            || self.di_limit_ls < 0
        {
            return Err(ConfigError::CurrentOutOfRange);
        }

        if self.pwm_period == 0 {
            return Err(ConfigError::ZeroPwmPeriod);
        }

        let shifts = [
            self.rs_scale,
            self.ls_dt_scale + 2,
            self.inv_kfi_scale,
            self.current_kp_scale,
            self.current_ki_scale,
            self.speed_kp_scale,
            self.speed_ki_scale,
            self.fw_kp_scale,
            self.offset_samples_log2,
        ];
        if shifts.iter().any(|&s| s > 15) {
            return Err(ConfigError::ShiftTooLarge);
        }

        if self.lock_time == 0 {
            return Err(ConfigError::LockTimeZero);
        }

        Ok(())
    }
}

/// Normalized, immutable description of the motor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorConfig {
    pub pole_pairs: u8,
    pub rs: i16,
    pub rs_scale: u8,
    pub ls_dt: i16,
    pub ls_dt_scale: u8,
    pub nominal_speed: i16,
    pub max_speed: i16,
    pub min_speed: i16,
    /// Speed at which open loop hands over to the estimator
    pub max_ol_speed: i16,
    pub rated_current: i16,
}

impl MotorConfig {
    pub fn from_user(user: &UserParams) -> Result<Self, ConfigError> {
        user.validate()?;
        let speed = |rpm: f32| norm_value(rpm, user.peak_speed_rpm);
        Ok(Self {
            pole_pairs: user.pole_pairs,
            rs: user.rs,
            rs_scale: user.rs_scale,
            ls_dt: user.ls_dt,
            ls_dt_scale: user.ls_dt_scale,
            nominal_speed: speed(user.nominal_speed_rpm),
            max_speed: speed(user.max_speed_rpm),
            min_speed: speed(user.min_speed_rpm),
            max_ol_speed: speed(user.end_speed_rpm),
            rated_current: norm_value(user.nominal_current_peak, user.peak_current),
        })
    }
}

/// Back-EMF PLL estimator constants
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllConfig {
    pub inv_kfi: i16,
    pub inv_kfi_scale: u8,
    pub kfilter_esdq: i16,
    /// Normalized control period, converts speed into angle increments
    pub delta_t: i16,
    pub omega_filt_const: i16,
    pub di_limit_hs: i16,
    pub di_limit_ls: i16,
    /// Below this speed the speed sign comes from the filtered speed, not from Eq
    pub threshold_speed_bemf: i16,
    /// Below this speed the current derivative spans four samples
    pub threshold_speed_derivative: i16,
}

/// Voltage feedback flux weakening constants
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FluxWeakeningConfig {
    pub voltage_mag_ref: i16,
    pub pi: PiGains,
    pub idref_filter: bool,
    pub idref_filt_const: i16,
    pub idref_min: i16,
}

/// Start-up sequencing and speed ramp parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlConfig {
    pub lock_time_limit: u16,
    pub lock_current: i16,
    pub ol_current_min: i16,
    pub ol_current_max: i16,
    pub ol_current_ramp_rate: i16,
    pub ol_speed_ramp_rate: i16,
    pub ol_speed_skip_limit: u16,
    pub cl_speed_ramp_rate: i16,
    pub cl_ramp_inc_limit: u16,
    pub cl_ramp_dec_limit: u16,
    pub norm_delta_t: i16,
    pub open_loop_only: bool,
    /// Target velocity applied at init, before any command arrives
    pub initial_target: i16,
}

/// Everything the FOC block needs, in normalized counts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FocConfig {
    pub motor: MotorConfig,
    pub d_current: PiGains,
    pub q_current: PiGains,
    pub speed: PiGains,
    pub pll: PllConfig,
    pub flux: FluxWeakeningConfig,
    pub control: ControlConfig,
    pub pwm_period: u16,
    /// Converts the measured bus voltage into the largest phase voltage
    pub vmax_factor: i16,
    /// Rated bus voltage, normalized
    pub dc_link_base: i16,
}

impl FocConfig {
    pub fn from_user(user: &UserParams) -> Result<Self, ConfigError> {
        let motor = MotorConfig::from_user(user)?;
        let current = |amps: f32| norm_value(amps, user.peak_current);

        // Voltage circle used by both current loops
        let vmax_closed_loop = norm_value(
            user.voltage_util_factor * user.base_voltage * 0.577,
            user.base_voltage,
        );
        let current_loop = PiGains {
            kp: user.current_kp,
            nkp: user.current_kp_scale,
            ki: user.current_ki,
            nki: user.current_ki_scale,
            kc: to_q15(0.99999),
            out_min: -vmax_closed_loop,
            out_max: vmax_closed_loop,
        };

        let speed = PiGains {
            kp: to_q15(user.speed_kp),
            nkp: user.speed_kp_scale,
            ki: to_q15(user.speed_ki),
            nki: user.speed_ki_scale,
            kc: to_q15(0.99999),
            out_min: -motor.rated_current,
            out_max: motor.rated_current,
        };

        // Angle advance per control period at full-scale speed
        let delta_t = (user.peak_speed_rpm * user.pole_pairs as f32 / 30.0 / user.pwm_frequency_hz
            * 32768.0) as i16;

        let pll = PllConfig {
            inv_kfi: user.inv_kfi,
            inv_kfi_scale: user.inv_kfi_scale,
            kfilter_esdq: user.kfilter_esdq,
            delta_t,
            omega_filt_const: user.kfilter_velestim,
            di_limit_hs: user.di_limit_hs,
            di_limit_ls: user.di_limit_ls,
            threshold_speed_bemf: norm_value(user.decimate_speed_rpm, user.peak_speed_rpm),
            threshold_speed_derivative: motor.nominal_speed,
        };

        let idref_min = current(-user.nominal_current_peak * user.fw_id_min_factor);
        let flux = FluxWeakeningConfig {
            voltage_mag_ref: (vmax_closed_loop as f32 * user.fw_voltage_ref_factor) as i16,
            pi: PiGains {
                kp: user.fw_kp,
                nkp: user.fw_kp_scale,
                ki: user.fw_ki,
                nki: 0,
                kc: to_q15(0.9999),
                out_min: idref_min,
                out_max: 0,
            },
            idref_filter: user.fw_idref_filter,
            idref_filt_const: user.fw_idref_filt_const,
            idref_min,
        };

        let control = ControlConfig {
            lock_time_limit: user.lock_time,
            lock_current: current(user.lock_current),
            ol_current_min: current(user.ol_current_min),
            ol_current_max: current(user.ol_current_max),
            ol_current_ramp_rate: user.ol_current_ramp_rate,
            ol_speed_ramp_rate: user.ol_speed_ramp_rate,
            ol_speed_skip_limit: user.ol_speed_ramp_skip,
            cl_speed_ramp_rate: user.cl_speed_ramp_rate,
            cl_ramp_inc_limit: user.cl_ramp_up_skip,
            cl_ramp_dec_limit: user.cl_ramp_down_skip,
            norm_delta_t: delta_t,
            open_loop_only: user.open_loop_only,
            initial_target: motor.max_ol_speed,
        };

        let vmax_factor = (0.577 * user.voltage_util_factor * 32767.0 * user.peak_voltage
            / user.base_voltage) as i16;

        Ok(Self {
            motor,
            d_current: current_loop,
            q_current: current_loop,
            speed,
            pll,
            flux,
            control,
            pwm_period: user.pwm_period,
            vmax_factor,
            dc_link_base: norm_value(user.base_voltage, user.peak_voltage),
        })
    }
}

/// Application-level supervision limits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AppConfig {
    /// Bus voltage needed to accept a run command
    pub dc_min_run: i16,
    /// Bus voltage below which a running motor is stopped
    pub dc_max_stop: i16,
    pub over_current_limit: i16,
    pub offset_samples_log2: u8,
    pub min_duty: u16,
    /// Full-scale current in mA, for log output
    pub peak_current_ma: i32,
    /// Full-scale voltage in mV, for the bus voltage reading
    pub peak_voltage_mv: i32,
}

impl AppConfig {
    pub fn from_user(user: &UserParams) -> Result<Self, ConfigError> {
        user.validate()?;
        let dc_min = norm_value(user.min_dc_voltage, user.peak_voltage);
        Ok(Self {
            dc_min_run: dc_min,
            dc_max_stop: dc_min,
            over_current_limit: norm_value(
                user.nominal_current_peak * user.fault_current_factor,
                user.peak_current,
            ),
            offset_samples_log2: user.offset_samples_log2,
            min_duty: user.min_duty,
            peak_current_ma: (user.peak_current * 1000.0) as i32,
            peak_voltage_mv: (user.peak_voltage * 1000.0) as i32,
        })
    }
}

/// Complete normalized configuration of one inverter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveConfig {
    pub foc: FocConfig,
    pub app: AppConfig,
}

impl DriveConfig {
    pub fn from_user(user: &UserParams) -> Result<Self, ConfigError> {
        if let Err(err) = user.validate() {
            error!("CONFIG: parameters rejected, {}", err);
            return Err(err);
        }
        let config = Self {
            foc: FocConfig::from_user(user)?,
            app: AppConfig::from_user(user)?,
        };
        debug!(
            "CONFIG: nominal speed {} max OL speed {} rated current {}",
            config.foc.motor.nominal_speed,
            config.foc.motor.max_ol_speed,
            config.foc.motor.rated_current
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_normalize_to_tuning_sheet_values() {
        let cfg = DriveConfig::from_user(&UserParams::default()).unwrap();
        let foc = cfg.foc;

        assert_eq!(foc.motor.nominal_speed, 13107);
        assert_eq!(foc.motor.max_ol_speed, 2184);
        assert_eq!(foc.motor.rated_current, 6318);
        assert_eq!(foc.pll.delta_t, 2560);
        assert_eq!(foc.control.norm_delta_t, 2560);
        assert_eq!(foc.pll.threshold_speed_derivative, foc.motor.nominal_speed);
        assert_eq!(foc.pll.threshold_speed_bemf, 437);
        assert_eq!(foc.dc_link_base, 22481);
        assert!((foc.vmax_factor as i32 - 22597).abs() <= 2);
        assert!((foc.d_current.out_max as i32 - 15504).abs() <= 2);
        assert_eq!(foc.flux.pi.out_max, 0);
        assert!(foc.flux.idref_min < 0);
        assert_eq!(foc.control.initial_target, foc.motor.max_ol_speed);
        assert_eq!(cfg.app.dc_min_run, cfg.app.dc_max_stop);
    }

    #[test]
    fn rejects_unordered_speeds() {
        let user = UserParams {
            min_speed_rpm: 4000.0,
            ..UserParams::default()
        };
        assert_eq!(user.validate(), Err(ConfigError::SpeedOrder));
        assert_eq!(
            FocConfig::from_user(&user).err(),
            Some(ConfigError::SpeedOrder)
        );
    }

    #[test]
    fn rejects_currents_above_board_range() {
        let user = UserParams {
            lock_current: 30.0,
            ..UserParams::default()
        };
        assert_eq!(user.validate(), Err(ConfigError::CurrentOutOfRange));
    }

    #[test]
    fn rejects_negative_limits() {
        let negative_fw = UserParams {
            fw_id_min_factor: -0.5,
            ..UserParams::default()
        };
        assert_eq!(negative_fw.validate(), Err(ConfigError::CurrentOutOfRange));

        let negative_hs = UserParams {
            di_limit_hs: -1,
            ..UserParams::default()
        };
        assert_eq!(negative_hs.validate(), Err(ConfigError::CurrentOutOfRange));

        let negative_ls = UserParams {
            di_limit_ls: -8192,
            ..UserParams::default()
        };
        assert_eq!(
            FocConfig::from_user(&negative_ls).err(),
            Some(ConfigError::CurrentOutOfRange)
        );
    }

    #[test]
    fn rejects_degenerate_values() {
        let zero_base = UserParams {
            peak_voltage: 0.0,
            ..UserParams::default()
        };
        assert_eq!(zero_base.validate(), Err(ConfigError::NonPositiveBase));

        let no_period = UserParams {
            pwm_period: 0,
            ..UserParams::default()
        };
        assert_eq!(no_period.validate(), Err(ConfigError::ZeroPwmPeriod));

        let wide_shift = UserParams {
            ls_dt_scale: 14,
            ..UserParams::default()
        };
        assert_eq!(wide_shift.validate(), Err(ConfigError::ShiftTooLarge));

        let no_lock = UserParams {
            lock_time: 0,
            ..UserParams::default()
        };
        assert_eq!(no_lock.validate(), Err(ConfigError::LockTimeZero));
    }
}
