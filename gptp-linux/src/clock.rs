//! Implementation of the abstract clock for the linux platform

use std::path::Path;

use clock_steering::{unix::UnixClock, TimeOffset};
use gptp::{
    config::ClockTarget,
    time::{Duration, Time},
    Clock, ClockProvider, OverlayClock,
};

/// An operating system or hardware clock, steered through `clock_adjtime`
#[derive(Debug, Clone)]
pub struct LinuxClock {
    clock: UnixClock,
}

impl LinuxClock {
    pub const CLOCK_REALTIME: Self = Self {
        clock: UnixClock::CLOCK_REALTIME,
    };

    /// Open a PTP hardware clock, such as `/dev/ptp0`
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let clock = UnixClock::open(path)?;

        Ok(Self { clock })
    }
}

fn timestamp_to_time(timestamp: clock_steering::Timestamp) -> Time {
    Time::from_fixed_nanos(timestamp.seconds as i128 * 1_000_000_000i128 + timestamp.nanos as i128)
}

impl Clock for LinuxClock {
    type Error = clock_steering::unix::Error;

    fn now(&self) -> Time {
        use clock_steering::Clock;

        match self.clock.now() {
            Ok(timestamp) => timestamp_to_time(timestamp),
            Err(error) => {
                tracing::error!("Could not read clock: {:?}", error);
                Time::default()
            }
        }
    }

    fn step_clock(&mut self, offset: Duration) -> Result<Time, Self::Error> {
        use clock_steering::Clock;

        // nanos has to be in [0, 1_000_000_000)
        let offset_nanos = offset.nanos_rounded();
        let offset = TimeOffset {
            seconds: offset_nanos.div_euclid(1_000_000_000) as _,
            nanos: offset_nanos.rem_euclid(1_000_000_000) as _,
        };

        tracing::trace!(
            "Stepping clock: {:e}ns",
            (offset.seconds as f64) * 1e9 + (offset.nanos as f64)
        );

        self.clock.step_clock(offset).map(timestamp_to_time)
    }

    fn set_frequency(&mut self, ppm: f64) -> Result<Time, Self::Error> {
        use clock_steering::Clock;

        tracing::trace!("Setting clock frequency: {:e}ppm", ppm);
        self.clock.set_frequency(ppm).map(timestamp_to_time)
    }
}

/// The clock a domain steers
#[derive(Debug)]
pub enum DomainClock {
    Linux(LinuxClock),
    Overlay(OverlayClock<LinuxClock>),
}

impl DomainClock {
    /// The clock timestamps are taken from. For an overlay clock this is the
    /// underlying read-only clock.
    pub fn timestamp_clock(&self) -> LinuxClock {
        match self {
            DomainClock::Linux(clock) => clock.clone(),
            DomainClock::Overlay(clock) => clock.underlying().clone(),
        }
    }

    /// Convert a timestamp taken from [`Self::timestamp_clock`] into the
    /// timescale of this clock
    pub fn convert_timestamp(&self, time: Time) -> Time {
        match self {
            DomainClock::Linux(_) => time,
            DomainClock::Overlay(clock) => clock.time_from_underlying(time),
        }
    }
}

impl Clock for DomainClock {
    type Error = clock_steering::unix::Error;

    fn now(&self) -> Time {
        match self {
            DomainClock::Linux(clock) => clock.now(),
            DomainClock::Overlay(clock) => clock.now(),
        }
    }

    fn step_clock(&mut self, offset: Duration) -> Result<Time, Self::Error> {
        match self {
            DomainClock::Linux(clock) => clock.step_clock(offset),
            DomainClock::Overlay(clock) => clock.step_clock(offset),
        }
    }

    fn set_frequency(&mut self, ppm: f64) -> Result<Time, Self::Error> {
        match self {
            DomainClock::Linux(clock) => clock.set_frequency(ppm),
            DomainClock::Overlay(clock) => clock.set_frequency(ppm),
        }
    }
}

/// Opens the clocks named in the configuration
#[derive(Debug, Default)]
pub struct LinuxClockProvider;

impl ClockProvider for LinuxClockProvider {
    type Clock = DomainClock;
    type Error = std::io::Error;

    fn open(&mut self, domain_number: u8, target: ClockTarget) -> Result<DomainClock, Self::Error> {
        let clock = match target {
            ClockTarget::System => DomainClock::Linux(LinuxClock::CLOCK_REALTIME),
            ClockTarget::Hardware(index) => {
                DomainClock::Linux(LinuxClock::open(format!("/dev/ptp{index}"))?)
            }
            ClockTarget::Virtual => {
                DomainClock::Overlay(OverlayClock::new(LinuxClock::CLOCK_REALTIME))
            }
        };
        tracing::debug!("Domain {} uses clock {:?}", domain_number, clock);
        Ok(clock)
    }
}
