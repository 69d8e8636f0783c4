//! Definitions of the abstract clock types

use crate::{
    config::ClockTarget,
    time::{Duration, Time},
};

/// Clock manipulation and querying interface
///
/// A domain owns one clock and steers it towards the time of its grandmaster.
/// Implementations on the platform side map this onto hardware clocks, the
/// operating system clock, or software clocks such as
/// [`OverlayClock`](crate::OverlayClock).
pub trait Clock {
    /// Type of the error the methods of this [`Clock`] may return
    type Error: core::fmt::Debug;

    /// Get the current time of the clock
    fn now(&self) -> Time;

    /// Change the current time of the clock by offset. Returns
    /// the time at which the change was applied.
    fn step_clock(&mut self, offset: Duration) -> Result<Time, Self::Error>;

    /// Set the frequency of the clock, returning the time
    /// at which the change was applied. The value is in ppm
    /// difference from the clock's nominal frequency.
    fn set_frequency(&mut self, ppm: f64) -> Result<Time, Self::Error>;
}

/// Source of the clocks the domains of an
/// [`Engine`](crate::Engine) steer
pub trait ClockProvider {
    /// The clocks handed out
    type Clock: Clock;
    /// Reason a clock could not be made available
    type Error: core::fmt::Debug;

    /// Make the clock behind `target` available for the domain with the given
    /// domain number
    fn open(&mut self, domain_number: u8, target: ClockTarget) -> Result<Self::Clock, Self::Error>;
}
