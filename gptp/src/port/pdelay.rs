//! Measurement of the propagation delay to the link peer

use crate::{
    config::{PathDelayConfig, PdelayMode},
    datastructures::common::PortIdentity,
    time::{Duration, Time},
};

use super::sequence_id::SequenceIdGenerator;

/// A single request/response exchange. Timestamps are filled in as they
/// become known, in whatever order that happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Exchange {
    id: u16,
    t1: Option<Time>,
    response: Option<Response>,
    t3: Option<Time>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Response {
    responder: PortIdentity,
    t2: Time,
    t4: Time,
}

/// Result of a completed exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Measurement {
    Accepted(Duration),
    Rejected(Duration),
}

/// Requester side of the peer delay mechanism of a single port
///
/// The delay is `((t4 - t1) - (t3 - t2)) / 2` where t1 and t4 are the local
/// send and receive times and t2 and t3 the receive and send times at the
/// peer.
#[derive(Debug)]
pub(crate) struct PathDelayEstimator {
    mode: PdelayMode,
    threshold: Duration,
    sensitivity: Duration,
    smoothing: u8,
    allowed_failures: u8,

    sequence_ids: SequenceIdGenerator,
    exchange: Option<Exchange>,

    estimate: Option<Duration>,
    valid: bool,
    frozen: bool,
    failures: u8,
    last_reported: Option<Duration>,
}

impl PathDelayEstimator {
    pub(crate) fn new(
        config: &PathDelayConfig,
        allowed_failures: u8,
        seed: Option<Duration>,
    ) -> Self {
        let seed = match config.mode {
            PdelayMode::Silent => Some(seed.unwrap_or(Duration::ZERO)),
            PdelayMode::Standard | PdelayMode::Static => seed,
        };

        Self {
            mode: config.mode,
            threshold: config.threshold,
            sensitivity: config.sensitivity,
            smoothing: config.smoothing,
            allowed_failures,
            sequence_ids: SequenceIdGenerator::new(),
            exchange: None,
            estimate: seed,
            valid: seed.is_some(),
            frozen: seed.is_some() && config.mode == PdelayMode::Static,
            failures: 0,
            last_reported: seed,
        }
    }

    /// The current delay, if it is known
    pub(crate) fn delay(&self) -> Option<Duration> {
        if self.valid {
            self.estimate
        } else {
            None
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether requests are sent at all
    pub(crate) fn is_requesting(&self) -> bool {
        match self.mode {
            PdelayMode::Standard => true,
            PdelayMode::Static => !self.frozen,
            PdelayMode::Silent => false,
        }
    }

    pub(crate) fn has_pending_exchange(&self) -> bool {
        self.exchange.is_some()
    }

    /// Start a new exchange, giving up on any exchange still in progress.
    /// Returns the sequence id to use for the request.
    pub(crate) fn start_request(&mut self) -> Option<u16> {
        if let Some(previous) = self.exchange.take() {
            log::debug!("Peer delay exchange {} got no complete response", previous.id);
            self.register_failure();
        }

        if !self.is_requesting() {
            return None;
        }

        let id = self.sequence_ids.generate();
        self.exchange = Some(Exchange {
            id,
            t1: None,
            response: None,
            t3: None,
        });
        Some(id)
    }

    /// Forget the exchange in progress, for example because the interval
    /// changed
    pub(crate) fn reset(&mut self) {
        self.exchange = None;
        self.failures = 0;
    }

    pub(crate) fn request_sent(&mut self, id: u16, t1: Time) -> Option<Measurement> {
        let exchange = self.exchange.as_mut().filter(|e| e.id == id)?;
        exchange.t1 = Some(t1);
        self.try_complete()
    }

    pub(crate) fn response_received(
        &mut self,
        id: u16,
        responder: PortIdentity,
        t2: Time,
        t4: Time,
    ) -> Option<Measurement> {
        let exchange = self.exchange.as_mut().filter(|e| e.id == id)?;
        if exchange.response.is_some() {
            log::warn!("Duplicate peer delay response for {}", id);
            return None;
        }
        exchange.response = Some(Response { responder, t2, t4 });
        self.try_complete()
    }

    pub(crate) fn follow_up_received(
        &mut self,
        id: u16,
        responder: PortIdentity,
        t3: Time,
    ) -> Option<Measurement> {
        let exchange = self.exchange.as_mut().filter(|e| e.id == id)?;
        match exchange.response {
            Some(response) if response.responder == responder => {
                exchange.t3 = Some(t3);
                self.try_complete()
            }
            _ => {
                log::debug!("Peer delay follow up {} without matching response", id);
                None
            }
        }
    }

    fn try_complete(&mut self) -> Option<Measurement> {
        let exchange = self.exchange?;
        let (Some(t1), Some(response), Some(t3)) = (exchange.t1, exchange.response, exchange.t3)
        else {
            return None;
        };
        self.exchange = None;

        let delay = ((response.t4 - t1) - (t3 - response.t2)) / 2;

        if delay.is_negative() || delay > self.threshold {
            log::warn!(
                "Rejected peer delay {} (threshold {})",
                delay,
                self.threshold
            );
            self.register_failure();
            return Some(Measurement::Rejected(delay));
        }

        self.failures = 0;
        self.valid = true;
        self.estimate = Some(match (self.mode, self.estimate) {
            (PdelayMode::Standard, Some(average)) => {
                average + (delay - average) / (1i64 << self.smoothing)
            }
            _ => delay,
        });
        if self.mode == PdelayMode::Static {
            self.frozen = true;
        }

        log::debug!("Measured peer delay {}", delay);
        Some(Measurement::Accepted(delay))
    }

    fn register_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.allowed_failures {
            if self.valid {
                log::warn!(
                    "Peer delay unknown after {} failed exchanges",
                    self.failures
                );
            }
            self.valid = false;
            self.failures = 0;
            // a recovered link starts over from its first sample
            if self.is_requesting() {
                self.estimate = None;
            }
        }
    }

    /// Returns the estimate if it moved more than the configured sensitivity
    /// since it was last returned
    pub(crate) fn take_significant_change(&mut self) -> Option<Duration> {
        let current = self.delay()?;
        let changed = match self.last_reported {
            Some(last) => (current - last).abs() > self.sensitivity,
            None => true,
        };

        if changed {
            self.last_reported = Some(current);
            Some(current)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastructures::common::ClockIdentity;

    const PEER: PortIdentity = PortIdentity {
        clock_identity: ClockIdentity([9; 8]),
        port_number: 1,
    };

    fn config(mode: PdelayMode) -> PathDelayConfig {
        PathDelayConfig {
            mode,
            threshold: Duration::from_nanos(10_000),
            sensitivity: Duration::from_nanos(10),
            smoothing: 2,
        }
    }

    /// Run one exchange over a link with the given delay. The peer clock runs
    /// `peer_offset` ahead and takes 5us to respond.
    fn exchange(
        estimator: &mut PathDelayEstimator,
        start: u64,
        delay: u64,
        peer_offset: u64,
    ) -> Option<Measurement> {
        let id = estimator.start_request()?;
        let t1 = start;
        let t2 = t1 + delay + peer_offset;
        let t3 = t2 + 5_000;
        let t4 = t3 - peer_offset + delay;

        assert_eq!(estimator.request_sent(id, Time::from_nanos(t1)), None);
        assert_eq!(
            estimator.response_received(id, PEER, Time::from_nanos(t2), Time::from_nanos(t4)),
            None
        );
        estimator.follow_up_received(id, PEER, Time::from_nanos(t3))
    }

    #[test]
    fn converges_to_uniform_delay() {
        let mut estimator = PathDelayEstimator::new(&config(PdelayMode::Standard), 3, None);
        assert_eq!(estimator.delay(), None);

        for i in 0..10 {
            let result = exchange(&mut estimator, 1_000_000 * i, 250, 12_345_678);
            assert_eq!(result, Some(Measurement::Accepted(Duration::from_nanos(250))));
        }
        assert_eq!(estimator.delay(), Some(Duration::from_nanos(250)));
    }

    #[test]
    fn smooths_changes() {
        let mut estimator = PathDelayEstimator::new(&config(PdelayMode::Standard), 3, None);
        exchange(&mut estimator, 0, 200, 0);
        exchange(&mut estimator, 1_000_000, 600, 0);
        // 200 + (600 - 200) / 4
        assert_eq!(estimator.delay(), Some(Duration::from_nanos(300)));
    }

    #[test]
    fn rejects_out_of_bounds() {
        let mut estimator = PathDelayEstimator::new(&config(PdelayMode::Standard), 3, None);
        assert!(matches!(
            exchange(&mut estimator, 0, 20_000, 0),
            Some(Measurement::Rejected(_))
        ));
        assert_eq!(estimator.delay(), None);

        // negative delay: response claims to have been sent before it was received
        let id = estimator.start_request().unwrap();
        estimator.request_sent(id, Time::from_nanos(1_000));
        estimator.response_received(id, PEER, Time::from_nanos(0), Time::from_nanos(1_100));
        assert!(matches!(
            estimator.follow_up_received(id, PEER, Time::from_nanos(500)),
            Some(Measurement::Rejected(d)) if d.is_negative()
        ));
    }

    #[test]
    fn three_failures_make_delay_unknown() {
        let mut estimator = PathDelayEstimator::new(&config(PdelayMode::Standard), 3, None);
        exchange(&mut estimator, 0, 300, 0);
        assert!(estimator.is_valid());

        // requests that never get an answer
        estimator.start_request();
        estimator.start_request();
        assert!(estimator.is_valid());
        estimator.start_request();
        assert!(estimator.is_valid());
        estimator.start_request();
        assert!(!estimator.is_valid());
        assert_eq!(estimator.delay(), None);

        // a success restores it
        exchange(&mut estimator, 10_000_000, 300, 0);
        assert!(estimator.is_valid());
    }

    #[test]
    fn recovery_starts_from_the_new_sample() {
        let mut estimator = PathDelayEstimator::new(&config(PdelayMode::Standard), 3, None);
        exchange(&mut estimator, 0, 300, 0);
        assert_eq!(estimator.delay(), Some(Duration::from_nanos(300)));

        for _ in 0..4 {
            estimator.start_request();
        }
        assert!(!estimator.is_valid());

        // not averaged with the delay measured before the link went away
        exchange(&mut estimator, 10_000_000, 700, 0);
        assert_eq!(estimator.delay(), Some(Duration::from_nanos(700)));
    }

    #[test]
    fn silent_seed_survives_failures() {
        let mut estimator = PathDelayEstimator::new(
            &config(PdelayMode::Silent),
            3,
            Some(Duration::from_nanos(420)),
        );
        for _ in 0..4 {
            assert_eq!(estimator.start_request(), None);
        }
        assert_eq!(estimator.delay(), Some(Duration::from_nanos(420)));
    }

    #[test]
    fn timestamp_after_follow_up() {
        let mut estimator = PathDelayEstimator::new(&config(PdelayMode::Standard), 3, None);
        let id = estimator.start_request().unwrap();
        estimator.response_received(id, PEER, Time::from_nanos(1_100), Time::from_nanos(2_200));
        estimator.follow_up_received(id, PEER, Time::from_nanos(2_000));
        assert_eq!(
            estimator.request_sent(id, Time::from_nanos(1_000)),
            Some(Measurement::Accepted(Duration::from_nanos(150)))
        );
    }

    #[test]
    fn stale_sequence_ids_are_ignored() {
        let mut estimator = PathDelayEstimator::new(&config(PdelayMode::Standard), 3, None);
        let id = estimator.start_request().unwrap();
        assert_eq!(
            estimator.response_received(
                id.wrapping_add(7),
                PEER,
                Time::from_nanos(0),
                Time::from_nanos(0)
            ),
            None
        );
        assert_eq!(estimator.request_sent(id.wrapping_sub(1), Time::from_nanos(0)), None);
    }

    #[test]
    fn static_freezes() {
        let mut estimator = PathDelayEstimator::new(&config(PdelayMode::Static), 3, None);
        assert!(estimator.is_requesting());
        exchange(&mut estimator, 0, 400, 0);
        assert!(!estimator.is_requesting());
        assert_eq!(estimator.start_request(), None);
        assert_eq!(estimator.delay(), Some(Duration::from_nanos(400)));

        let seeded =
            PathDelayEstimator::new(&config(PdelayMode::Static), 3, Some(Duration::from_nanos(77)));
        assert!(!seeded.is_requesting());
        assert_eq!(seeded.delay(), Some(Duration::from_nanos(77)));
    }

    #[test]
    fn silent_never_requests() {
        let mut estimator = PathDelayEstimator::new(&config(PdelayMode::Silent), 3, None);
        assert_eq!(estimator.start_request(), None);
        assert_eq!(estimator.delay(), Some(Duration::ZERO));
        for _ in 0..5 {
            estimator.start_request();
        }
        assert!(estimator.is_valid());
    }

    #[test]
    fn reports_significant_changes_only() {
        let mut estimator = PathDelayEstimator::new(&config(PdelayMode::Standard), 3, None);
        exchange(&mut estimator, 0, 200, 0);
        assert_eq!(
            estimator.take_significant_change(),
            Some(Duration::from_nanos(200))
        );
        exchange(&mut estimator, 1_000_000, 220, 0);
        // moved 5ns
        assert_eq!(estimator.take_significant_change(), None);
        exchange(&mut estimator, 2_000_000, 400, 0);
        assert!(estimator.take_significant_change().is_some());
    }
}
