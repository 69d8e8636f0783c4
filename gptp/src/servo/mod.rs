//! Proportional-integral clock servo
//!
//! The servo turns measured offsets into a frequency correction using integer
//! arithmetic only, so the same sequence of offsets always yields the same
//! sequence of corrections.

use crate::{
    config::{ConfigError, Section},
    time::Duration,
};

/// Gains and limits of the [`PiServo`]
///
/// Gains are fixed point numbers: a correction is computed as
/// `(kp * error + ki * integral) >> scale` ppb, with the error in nanoseconds.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ServoConfig {
    pub kp: u32,
    pub ki: u32,
    pub scale: u8,
    /// Bound on the absolute value of the accumulated error (ns)
    pub integral_limit: i64,
    /// Bound on the absolute value of the correction (ppb)
    pub output_limit: u32,
    /// The first offset after a reset that exceeds this is corrected by
    /// stepping the clock
    pub step_threshold: Duration,
    /// Offsets above this while the servo is running are treated as
    /// measurement errors
    pub discontinuity_threshold: Duration,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            kp: 717,
            ki: 307,
            scale: 10,
            integral_limit: 1_600_000,
            output_limit: 500_000,
            step_threshold: Duration::from_micros(1_000),
            discontinuity_threshold: Duration::from_millis(10),
        }
    }
}

impl ServoConfig {
    pub(crate) fn validate(&self, section: Section) -> Result<(), ConfigError> {
        let check = |key, value: i64, min: i64, max: i64| {
            if (min..=max).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::OutOfRange {
                    section,
                    key,
                    value,
                    min,
                    max,
                })
            }
        };

        check("kp", self.kp as i64, 0, 1 << 24)?;
        check("ki", self.ki as i64, 0, 1 << 24)?;
        check("scale", self.scale as i64, 0, 32)?;
        check("integral-limit", self.integral_limit, 1, 1 << 40)?;
        check("output-limit", self.output_limit as i64, 1, 100_000_000)?;
        check(
            "step-threshold",
            self.step_threshold.nanos_saturating(),
            0,
            i64::MAX,
        )?;
        check(
            "discontinuity-threshold",
            self.discontinuity_threshold.nanos_saturating(),
            1,
            i64::MAX,
        )
    }
}

/// A proportional-integral controller
#[derive(Debug, Clone)]
pub struct PiServo {
    kp: i128,
    ki: i128,
    scale: u8,
    integral_limit: i64,
    output_limit: i64,
    base: i64,
    integral: i64,
    output: i32,
}

impl PiServo {
    /// Create a servo with a zero integral and zero output
    pub fn new(config: &ServoConfig) -> Self {
        Self {
            kp: config.kp as i128,
            ki: config.ki as i128,
            scale: config.scale,
            integral_limit: config.integral_limit,
            output_limit: config.output_limit as i64,
            base: 0,
            integral: 0,
            output: 0,
        }
    }

    /// Feed the next measured offset (ns) and get the new correction (ppb)
    pub fn update(&mut self, offset: i64) -> i32 {
        self.integral = self
            .integral
            .saturating_add(offset)
            .clamp(-self.integral_limit, self.integral_limit);

        let control = (self.kp * offset as i128 + self.ki * self.integral as i128) >> self.scale;
        let output = (self.base as i128 + control)
            .clamp(-self.output_limit as i128, self.output_limit as i128);

        // the clamp bounds fit in an i32 as output_limit is validated
        self.output = output as i32;
        self.output
    }

    /// Restart the controller from the given correction, forgetting all
    /// accumulated error
    pub fn reset(&mut self, initial_output: i32) {
        self.base = initial_output as i64;
        self.integral = 0;
        self.output = initial_output;
    }

    /// The most recent correction (ppb)
    pub fn output(&self) -> i32 {
        self.output
    }

    /// The accumulated error (ns)
    pub fn integral(&self) -> i64 {
        self.integral
    }
}
