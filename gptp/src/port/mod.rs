//! Ports of a gPTP domain
//!
//! A [`Port`] is driven by its domain. Every handler returns the
//! [`PortAction`]s the user has to perform: sending messages and resetting
//! timers. Roles are only changed through [`Port::apply_role`], which the
//! domain calls with the outcome of the best master clock algorithm.

use crate::{
    bmc::{bmca::PortInput, bmca::RecommendedRole, ReceivedInfo},
    config::{DelayMechanism, DomainConfig, EngineConfig, PortConfig, Profile, ReverseSyncConfig},
    datastructures::{
        common::PortIdentity,
        messages::{Message, MessageBody},
    },
    observability::port::{PortCounters, PortStatus},
    time::{Duration, Time},
};

pub use actions::{PortAction, PortActionIterator, PortTimer, TimestampContext};
use actions::TimestampContextInner;
pub(crate) use pdelay::Measurement;
use pdelay::PathDelayEstimator;
use sequence_id::SequenceIdGenerator;
pub(crate) use state::PortState;
use state::SlaveState;

// Needs to be here because of use rules
macro_rules! actions {
    [$($action:expr),* $(,)?] => {
        {
            #[allow(unused_mut)]
            let mut list = ::arrayvec::ArrayVec::new();
            $(list.push($action);)*
            crate::port::PortActionIterator::from(list)
        }
    };
}

mod actions;
mod master;
mod pdelay;
mod sequence_id;
mod slave;
mod state;

/// Where the path delay of a port comes from
#[derive(Debug)]
enum PathDelaySource {
    Measured(PathDelayEstimator),
    /// Copied from the same port in domain 0
    Common(Option<Duration>),
}

impl PathDelaySource {
    fn delay(&self) -> Option<Duration> {
        match self {
            PathDelaySource::Measured(estimator) => estimator.delay(),
            PathDelaySource::Common(delay) => *delay,
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            PathDelaySource::Measured(estimator) => estimator.is_valid(),
            PathDelaySource::Common(delay) => delay.is_some(),
        }
    }
}

/// A single port within a gPTP domain
#[derive(Debug)]
pub struct Port {
    port_identity: PortIdentity,
    domain_number: u8,
    profile: Profile,
    config: PortConfig,
    reverse_sync: ReverseSyncConfig,

    state: PortState,
    enabled: bool,
    link_up: bool,
    operational: bool,

    received: ReceivedInfo,
    path_delay: PathDelaySource,
    delay_valid: bool,

    announce_seq_ids: SequenceIdGenerator,
    sync_seq_ids: SequenceIdGenerator,

    measurement: Option<SyncMeasurement>,
    bmca_requested: bool,
    counters: PortCounters,
}

/// Offset of the local clock to the master, from one Sync/Follow_Up pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SyncMeasurement {
    pub(crate) offset: Duration,
    pub(crate) master: PortIdentity,
    pub(crate) event_time: Time,
}

impl Port {
    pub(crate) fn new(
        engine: &EngineConfig,
        domain: &DomainConfig,
        index: usize,
        seed: Option<Duration>,
    ) -> Self {
        let config = domain.ports[index];
        let path_delay = match config.delay_mechanism {
            DelayMechanism::P2P => PathDelaySource::Measured(PathDelayEstimator::new(
                &engine.path_delay,
                config.allowed_lost_responses,
                seed,
            )),
            DelayMechanism::CommonP2P => PathDelaySource::Common(None),
        };

        let delay_valid = path_delay.is_valid();

        Port {
            port_identity: PortIdentity {
                clock_identity: engine.clock_identity,
                port_number: index as u16 + 1,
            },
            domain_number: domain.domain_number,
            profile: engine.profile,
            config,
            reverse_sync: domain.reverse_sync,
            state: PortState::Disabled,
            enabled: config.enabled,
            link_up: true,
            operational: false,
            received: ReceivedInfo::default(),
            path_delay,
            delay_valid,
            announce_seq_ids: SequenceIdGenerator::new(),
            sync_seq_ids: SequenceIdGenerator::new(),
            measurement: None,
            bmca_requested: false,
            counters: PortCounters::default(),
        }
    }

    /// Bring the port up according to its administrative and link state
    pub(crate) fn start(&mut self) -> PortActionIterator {
        if !(self.enabled && self.link_up) {
            self.set_forced_port_state(PortState::Disabled);
            return actions![];
        }

        self.set_forced_port_state(PortState::Initializing);
        self.bmca_requested = true;

        match &self.path_delay {
            PathDelaySource::Measured(estimator) if estimator.is_requesting() => {
                actions![PortAction::ResetPdelayTimer {
                    duration: core::time::Duration::ZERO,
                }]
            }
            _ => actions![],
        }
    }

    /// Change the administrative state of the port
    pub fn set_enabled(&mut self, enabled: bool) -> PortActionIterator {
        if self.enabled == enabled {
            return actions![];
        }
        self.enabled = enabled;

        if enabled {
            if self.link_up {
                self.start()
            } else {
                actions![]
            }
        } else {
            self.shut_down(PortState::Disabled);
            actions![]
        }
    }

    /// Change the link state of the port. A port without link is faulty.
    pub fn set_link_up(&mut self, up: bool) -> PortActionIterator {
        if self.link_up == up {
            return actions![];
        }
        self.link_up = up;

        if !self.enabled {
            return actions![];
        }

        if up {
            self.start()
        } else {
            self.shut_down(PortState::Faulty);
            actions![]
        }
    }

    fn shut_down(&mut self, state: PortState) {
        self.set_forced_port_state(state);
        self.received.clear();
        self.measurement = None;
        if let PathDelaySource::Measured(estimator) = &mut self.path_delay {
            estimator.reset();
        }
        self.update_delay_validity();
        self.bmca_requested = true;
    }

    /// Switch between the initial and the operational message intervals
    pub(crate) fn set_operational(&mut self, operational: bool) -> PortActionIterator {
        if self.operational == operational {
            return actions![];
        }
        self.operational = operational;

        log::debug!(
            "port {} switches to {} intervals",
            self.port_identity.port_number,
            if operational { "operational" } else { "initial" }
        );

        let participating = self.is_participating();
        let restart_pdelay = match &mut self.path_delay {
            PathDelaySource::Measured(estimator) if participating => {
                estimator.reset();
                estimator.is_requesting()
            }
            _ => false,
        };

        let pdelay = PortAction::ResetPdelayTimer {
            duration: self.pdelay_interval().as_core_duration(),
        };
        let sync = PortAction::ResetSyncTimer {
            duration: self.sync_interval().as_core_duration(),
        };

        match (restart_pdelay, matches!(self.state, PortState::Master)) {
            (true, true) => actions![pdelay, sync],
            (true, false) => actions![pdelay],
            (false, true) => actions![sync],
            (false, false) => actions![],
        }
    }

    /// Apply the role decided by the best master clock algorithm.
    ///
    /// Applying the role the port already has is a no-op, so timers keep
    /// running undisturbed.
    pub(crate) fn apply_role(
        &mut self,
        role: RecommendedRole,
        remote_master: Option<PortIdentity>,
    ) -> PortActionIterator {
        match (role, &self.state) {
            (RecommendedRole::Unchanged, _) => actions![],
            (_, PortState::Disabled | PortState::Faulty) => actions![],
            (RecommendedRole::Master, PortState::Master) => actions![],
            (RecommendedRole::Passive, PortState::Passive) => actions![],
            (RecommendedRole::Slave, PortState::Slave(slave) | PortState::Uncalibrated(slave))
                if slave.remote_master() == remote_master =>
            {
                actions![]
            }
            (RecommendedRole::Master, _) => {
                self.set_forced_port_state(PortState::Master);
                let sync = PortAction::ResetSyncTimer {
                    duration: core::time::Duration::ZERO,
                };
                match self.profile {
                    Profile::Standard => actions![
                        PortAction::ResetAnnounceTimer {
                            duration: core::time::Duration::ZERO,
                        },
                        sync
                    ],
                    Profile::Automotive => actions![sync],
                }
            }
            (RecommendedRole::Passive, _) => {
                self.set_forced_port_state(PortState::Passive);
                actions![PortAction::ResetAnnounceReceiptTimer {
                    duration: self.config.announce_receipt_duration(),
                }]
            }
            (RecommendedRole::Slave, _) => {
                self.set_forced_port_state(PortState::Slave(SlaveState::new(remote_master)));
                self.slave_entry_actions()
            }
        }
    }

    /// Handle a received message. `time` is the receive timestamp, which is
    /// only relevant for event messages.
    pub fn handle_message(&mut self, message: &Message, time: Time) -> PortActionIterator {
        if !self.is_participating() {
            self.counters.rx_discarded += 1;
            return actions![];
        }

        if message.header.source_port_identity.clock_identity == self.port_identity.clock_identity
        {
            log::trace!("Ignoring message sent by ourselves");
            self.counters.rx_discarded += 1;
            return actions![];
        }

        let time = if message.is_event() {
            time - self.config.rx_delay_compensation
        } else {
            time
        };

        match &message.body {
            MessageBody::Announce(announce) => {
                self.counters.rx_announce += 1;
                self.handle_announce(message, announce, time)
            }
            MessageBody::Sync(_) => {
                self.counters.rx_sync += 1;
                self.handle_sync(&message.header, time)
            }
            MessageBody::FollowUp(follow_up) => {
                self.counters.rx_follow_up += 1;
                self.handle_follow_up(&message.header, follow_up)
            }
            MessageBody::PDelayReq(_) => {
                self.counters.rx_pdelay_req += 1;
                self.handle_pdelay_req(&message.header, time)
            }
            MessageBody::PDelayResp(response) => {
                self.counters.rx_pdelay_resp += 1;
                if response.requesting_port_identity != self.port_identity {
                    self.counters.rx_discarded += 1;
                    return actions![];
                }
                let t2 = response.request_receipt_timestamp + message.header.correction_field;
                let measurement = self.with_estimator(|estimator| {
                    estimator.response_received(
                        message.header.sequence_id,
                        message.header.source_port_identity,
                        t2,
                        time,
                    )
                });
                self.handle_pdelay_measurement(measurement);
                actions![]
            }
            MessageBody::PDelayRespFollowUp(follow_up) => {
                self.counters.rx_pdelay_resp_follow_up += 1;
                if follow_up.requesting_port_identity != self.port_identity {
                    self.counters.rx_discarded += 1;
                    return actions![];
                }
                let t3 = follow_up.response_origin_timestamp + message.header.correction_field;
                let measurement = self.with_estimator(|estimator| {
                    estimator.follow_up_received(
                        message.header.sequence_id,
                        message.header.source_port_identity,
                        t3,
                    )
                });
                self.handle_pdelay_measurement(measurement);
                actions![]
            }
        }
    }

    /// Handle the transmit timestamp of a message sent through
    /// [`PortAction::SendEvent`]
    pub fn handle_send_timestamp(
        &mut self,
        context: TimestampContext,
        timestamp: Time,
    ) -> PortActionIterator {
        let timestamp = timestamp + self.config.tx_delay_compensation;

        match context.inner {
            TimestampContextInner::Sync { id } => self.send_follow_up(id, timestamp, false),
            TimestampContextInner::ReverseSync { id } => self.send_follow_up(id, timestamp, true),
            TimestampContextInner::PDelayReq { id } => {
                let measurement =
                    self.with_estimator(|estimator| estimator.request_sent(id, timestamp));
                self.handle_pdelay_measurement(measurement);
                actions![]
            }
            TimestampContextInner::PDelayResp {
                id,
                requestor_identity,
            } => {
                if !self.is_participating() {
                    return actions![];
                }
                self.counters.tx_pdelay_resp_follow_up += 1;
                actions![PortAction::SendGeneral {
                    message: Message::pdelay_resp_follow_up(
                        self.domain_number,
                        self.port_identity,
                        requestor_identity,
                        id,
                        timestamp,
                    ),
                }]
            }
        }
    }

    /// Send the next peer delay request
    pub fn handle_pdelay_timer(&mut self) -> PortActionIterator {
        if !self.is_participating() {
            return actions![];
        }

        let PathDelaySource::Measured(estimator) = &mut self.path_delay else {
            return actions![];
        };
        if estimator.has_pending_exchange() {
            self.counters.pdelay_lost_responses += 1;
        }
        let id = estimator.start_request();
        self.update_delay_validity();

        let Some(id) = id else {
            return actions![];
        };

        self.counters.tx_pdelay_req += 1;
        actions![
            PortAction::ResetPdelayTimer {
                duration: self.pdelay_interval().as_core_duration(),
            },
            PortAction::SendEvent {
                context: TimestampContext {
                    inner: TimestampContextInner::PDelayReq { id },
                },
                message: Message::pdelay_req(
                    self.domain_number,
                    self.port_identity,
                    id,
                    self.pdelay_interval(),
                ),
            }
        ]
    }

    /// Received grandmaster information expired
    pub fn handle_announce_receipt_timer(&mut self) -> PortActionIterator {
        if self.profile == Profile::Automotive || !self.is_participating() {
            return actions![];
        }

        if self.received.clear() {
            log::info!(
                "Announce receipt timeout on port {}",
                self.port_identity.port_number
            );
            self.counters.announce_receipt_timeouts += 1;
            self.bmca_requested = true;
        }

        actions![]
    }

    /// Replace the path delay of a port using the delay of domain 0
    pub(crate) fn set_common_path_delay(&mut self, delay: Option<Duration>) {
        if let PathDelaySource::Common(current) = &mut self.path_delay {
            *current = delay;
        }
        self.update_delay_validity();
    }

    fn with_estimator(
        &mut self,
        f: impl FnOnce(&mut PathDelayEstimator) -> Option<Measurement>,
    ) -> Option<Measurement> {
        match &mut self.path_delay {
            PathDelaySource::Measured(estimator) => f(estimator),
            PathDelaySource::Common(_) => None,
        }
    }

    fn handle_pdelay_measurement(&mut self, measurement: Option<Measurement>) {
        if let Some(Measurement::Rejected(delay)) = measurement {
            log::debug!(
                "Rejected path delay {} on port {}",
                delay,
                self.port_identity.port_number
            );
            self.counters.pdelay_rejected += 1;
        }
        self.update_delay_validity();
    }

    /// The best master clock algorithm only considers ports with a known path
    /// delay, so a change in validity requires a new decision
    fn update_delay_validity(&mut self) {
        let valid = self.path_delay_valid();
        if valid != self.delay_valid {
            log::info!(
                "Path delay on port {} in domain {} is now {}",
                self.port_identity.port_number,
                self.domain_number,
                if valid { "valid" } else { "invalid" }
            );
            self.delay_valid = valid;
            self.bmca_requested = true;
        }
    }

    fn set_forced_port_state(&mut self, state: PortState) {
        log::info!(
            "new state for port {} in domain {}: {} -> {}",
            self.port_identity.port_number,
            self.domain_number,
            self.state,
            state
        );
        self.state = state;
    }

    fn is_participating(&self) -> bool {
        !matches!(self.state, PortState::Disabled | PortState::Faulty)
    }

    fn pdelay_interval(&self) -> crate::time::Interval {
        self.config.pdelay_req_interval(self.operational)
    }

    fn sync_interval(&self) -> crate::time::Interval {
        self.config.sync_interval(self.operational)
    }

    /// Whether the path delay to the link peer is known
    pub fn path_delay_valid(&self) -> bool {
        self.path_delay.is_valid()
    }

    /// The current path delay to the link peer
    pub fn path_delay(&self) -> Option<Duration> {
        self.path_delay.delay()
    }

    /// Identity of this port
    pub fn identity(&self) -> PortIdentity {
        self.port_identity
    }

    pub(crate) fn state(&self) -> &PortState {
        &self.state
    }

    /// The master this port receives time from, when it is a slave
    pub fn remote_master(&self) -> Option<PortIdentity> {
        match &self.state {
            PortState::Slave(slave) | PortState::Uncalibrated(slave) => slave.remote_master(),
            _ => None,
        }
    }

    pub(crate) fn configured_role(&self) -> crate::config::PortRole {
        self.config.role
    }

    pub(crate) fn bmca_input(&self) -> PortInput {
        let candidate = if self.path_delay_valid() {
            self.received.best().copied()
        } else {
            None
        };

        PortInput {
            port_identity: self.port_identity,
            participating: self.is_participating(),
            candidate,
        }
    }

    pub(crate) fn take_bmca_request(&mut self) -> bool {
        core::mem::take(&mut self.bmca_requested)
    }

    pub(crate) fn take_measurement(&mut self) -> Option<SyncMeasurement> {
        self.measurement.take()
    }

    pub(crate) fn take_path_delay_change(&mut self) -> Option<Duration> {
        match &mut self.path_delay {
            PathDelaySource::Measured(estimator) => estimator.take_significant_change(),
            PathDelaySource::Common(_) => None,
        }
    }

    /// Snapshot of the state of this port
    pub fn status(&self) -> PortStatus {
        PortStatus {
            port_identity: self.port_identity,
            state: self.state.observable(),
            enabled: self.enabled,
            path_delay: self.path_delay(),
            remote_master: self.remote_master(),
            received_grandmaster: self.received.best().map(|d| d.grandmaster.clock_identity),
            counters: self.counters,
        }
    }
}
