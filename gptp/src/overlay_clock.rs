use crate::{
    time::{Duration, Time},
    Clock,
};

/// An overlay over another, read-only clock, frequency-locked to it.
///
/// In other words, a virtual clock which can be tuned in software without
/// affecting the underlying system or hardware clock. This lets every domain
/// of an engine own a clock of its own.
#[derive(Debug)]
pub struct OverlayClock<C: Clock> {
    roclock: C,
    last_sync: Time,
    shift: Duration,
    freq_scale_ppm_diff: f64,
}

impl<C: Clock> OverlayClock<C> {
    /// Creates a new OverlayClock based on the given clock
    pub fn new(underlying_clock: C) -> Self {
        let now = underlying_clock.now();
        Self {
            roclock: underlying_clock,
            last_sync: now,
            shift: Duration::ZERO,
            freq_scale_ppm_diff: 0.0,
        }
    }

    /// Converts (shifts and scales) a [`Time`] in the underlying clock's
    /// timescale to the overlay clock timescale
    pub fn time_from_underlying(&self, roclock_time: Time) -> Time {
        let elapsed = roclock_time - self.last_sync;
        let corr = elapsed * self.freq_scale_ppm_diff / 1_000_000;

        roclock_time + self.shift + corr
    }

    /// Returns a reference to the underlying clock
    pub fn underlying(&self) -> &C {
        &self.roclock
    }
}

impl<C: Clock> Clock for OverlayClock<C> {
    type Error = C::Error;

    fn now(&self) -> Time {
        self.time_from_underlying(self.roclock.now())
    }

    fn set_frequency(&mut self, ppm: f64) -> Result<Time, Self::Error> {
        // fold the correction so far into the shift
        let now_roclock = self.roclock.now();
        let now_local = self.time_from_underlying(now_roclock);
        self.shift = now_local - now_roclock;
        self.last_sync = now_roclock;

        self.freq_scale_ppm_diff = ppm;
        Ok(now_local)
    }

    fn step_clock(&mut self, offset: Duration) -> Result<Time, Self::Error> {
        let now_roclock = self.roclock.now();
        let now_local = self.time_from_underlying(now_roclock);
        self.shift = now_local - now_roclock + offset;
        self.last_sync = now_roclock;
        Ok(self.time_from_underlying(now_roclock))
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;

    #[derive(Debug, Default)]
    struct ManualClock {
        now: Cell<u64>,
    }

    impl Clock for &ManualClock {
        type Error = ();

        fn now(&self) -> Time {
            Time::from_nanos(self.now.get())
        }

        fn step_clock(&mut self, _offset: Duration) -> Result<Time, Self::Error> {
            Err(())
        }

        fn set_frequency(&mut self, _ppm: f64) -> Result<Time, Self::Error> {
            Err(())
        }
    }

    #[test]
    fn follows_underlying_clock() {
        let underlying = ManualClock::default();
        underlying.now.set(1_000_000_000);
        let overlay = OverlayClock::new(&underlying);

        underlying.now.set(3_000_000_000);
        assert_eq!(overlay.now(), Time::from_secs(3));
    }

    #[test]
    fn step_and_frequency() {
        let underlying = ManualClock::default();
        underlying.now.set(1_000_000_000);
        let mut overlay = OverlayClock::new(&underlying);

        overlay.step_clock(Duration::from_millis(-500)).unwrap();
        assert_eq!(overlay.now(), Time::from_millis(500));

        overlay.set_frequency(100.0).unwrap();
        underlying.now.set(2_000_000_000);
        // one second at +100 ppm
        assert_eq!(overlay.now(), Time::from_nanos(1_500_100_000));

        overlay.set_frequency(0.0).unwrap();
        underlying.now.set(3_000_000_000);
        assert_eq!(overlay.now(), Time::from_nanos(2_500_100_000));
    }
}
