//! Coordination of the ports of a single gPTP domain
//!
//! A [`Domain`] owns its ports and its clock. After every event it collects
//! the consequences from the ports: offsets are fed into the servo, path delay
//! changes are reported and, when any port asks for it, the roles of all
//! ports are decided again.

use alloc::vec::Vec;

use crate::{
    bmc::{
        bmca::{self, PortInput, RecommendedRole},
        SystemIdentity,
    },
    clock::Clock,
    config::{DomainConfig, EngineConfig, PortRole, Profile, ServoConfig},
    datastructures::{
        common::{ClockIdentity, PortIdentity},
        messages::{AnnounceContents, Message},
    },
    observability::{port::PortState, DomainStatus},
    port::{Port, PortAction, PortActionIterator, PortTimer, SyncMeasurement, TimestampContext},
    servo::PiServo,
    time::{Duration, Time},
};

/// Consecutive accepted offsets after which a slave is considered
/// synchronized
pub const OPERATIONAL_LOCK_SAMPLES: u32 = 8;

/// Consecutive discontinuities after which the servo starts over
const MAX_REJECTED_OFFSETS: u8 = 3;

/// Something the user of a [`Domain`] has to act upon
#[derive(Debug)]
pub enum DomainAction {
    /// An action for the port with the given index
    Port { port: usize, action: PortAction },
    /// Something changed that may be of interest outside of the engine
    Notify(Notification),
}

/// Events reported to collaborators of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// A different grandmaster was selected for the domain
    GrandmasterChanged {
        domain_number: u8,
        grandmaster: ClockIdentity,
    },
    /// The state of a port changed
    PortRoleChanged {
        domain_number: u8,
        port: usize,
        state: PortState,
    },
    /// The path delay of a port moved by more than the configured
    /// sensitivity
    PathDelayChanged {
        domain_number: u8,
        port: usize,
        delay: Duration,
    },
}

#[derive(Debug)]
struct ServoInstance {
    servo: PiServo,
    port: usize,
    master: Option<PortIdentity>,
    /// No offset has been processed since the servo was (re)started
    fresh: bool,
}

/// A single gPTP domain
#[derive(Debug)]
pub struct Domain<C> {
    domain_number: u8,
    profile: Profile,
    gm_capable: bool,
    automotive_gm: Option<ClockIdentity>,
    local: SystemIdentity,
    clock: C,
    ports: Vec<Port>,
    reported_states: Vec<PortState>,
    shared_delays: Vec<Option<Duration>>,

    grandmaster: SystemIdentity,
    steps_removed: u16,
    slave: Option<(usize, Option<PortIdentity>)>,

    servo_config: ServoConfig,
    servo: Option<ServoInstance>,
    locked_samples: u32,
    rejected_in_row: u8,
    operational: bool,

    last_offset: Option<Duration>,
    rejected_offsets: u64,
    clock_steps: u64,
    stopped: bool,
}

impl<C: Clock> Domain<C> {
    /// Create a domain from validated configuration. `seeds` holds initial
    /// path delays by port index.
    pub fn new(
        engine: &EngineConfig,
        config: &DomainConfig,
        clock: C,
        seeds: &[Option<Duration>],
    ) -> Self {
        let local = SystemIdentity {
            priority_1: config.grandmaster.effective_priority_1(),
            clock_quality: config.grandmaster.clock_quality,
            priority_2: config.grandmaster.priority_2,
            clock_identity: engine.clock_identity,
        };

        let ports: Vec<Port> = (0..config.ports.len())
            .map(|index| Port::new(engine, config, index, seeds.get(index).copied().flatten()))
            .collect();
        let reported_states = ports.iter().map(|port| port.state().observable()).collect();
        let shared_delays = alloc::vec![None; ports.len()];

        Domain {
            domain_number: config.domain_number,
            profile: engine.profile,
            gm_capable: config.grandmaster.gm_capable,
            automotive_gm: engine.gm_id,
            local,
            clock,
            ports,
            reported_states,
            shared_delays,
            grandmaster: local,
            steps_removed: 0,
            slave: None,
            servo_config: config.servo,
            servo: None,
            locked_samples: 0,
            rejected_in_row: 0,
            operational: false,
            last_offset: None,
            rejected_offsets: 0,
            clock_steps: 0,
            stopped: false,
        }
    }

    /// Start all ports and decide the initial roles
    pub fn start(&mut self) -> Vec<DomainAction> {
        log::info!(
            "Starting domain {} with {} ports",
            self.domain_number,
            self.ports.len()
        );

        let mut out = Vec::new();
        for index in 0..self.ports.len() {
            let actions = self.ports[index].start();
            push_port_actions(&mut out, index, actions);
        }
        self.settle(&mut out);
        out
    }

    /// Stop all activity. Afterwards no messages are sent and the clock is no
    /// longer adjusted.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        log::info!("Stopping domain {}", self.domain_number);
        self.stopped = true;
        self.servo = None;
        for port in &mut self.ports {
            let _ = port.set_enabled(false);
        }
    }

    /// Handle a message received on the port with the given index
    pub fn handle_message(
        &mut self,
        port: usize,
        message: &Message,
        time: Time,
    ) -> Vec<DomainAction> {
        self.with_port(port, |port| port.handle_message(message, time))
    }

    /// Handle the transmit timestamp of an event message
    pub fn handle_send_timestamp(
        &mut self,
        port: usize,
        context: TimestampContext,
        time: Time,
    ) -> Vec<DomainAction> {
        self.with_port(port, |port| port.handle_send_timestamp(context, time))
    }

    /// Handle the expiry of a timer of a port
    pub fn handle_timer(&mut self, port: usize, timer: PortTimer) -> Vec<DomainAction> {
        let contents = self.announce_contents();
        self.with_port(port, |port| match timer {
            PortTimer::Announce => port.handle_announce_timer(&contents),
            PortTimer::Sync => port.handle_sync_timer(),
            PortTimer::Pdelay => port.handle_pdelay_timer(),
            PortTimer::AnnounceReceipt => port.handle_announce_receipt_timer(),
            PortTimer::SyncReceipt => port.handle_sync_receipt_timer(),
            PortTimer::ReverseSync => port.handle_reverse_sync_timer(),
        })
    }

    /// Change the administrative state of a port
    pub fn set_port_enabled(&mut self, port: usize, enabled: bool) -> Vec<DomainAction> {
        self.with_port(port, |port| port.set_enabled(enabled))
    }

    /// Change the link state of a port
    pub fn set_link_state(&mut self, port: usize, up: bool) -> Vec<DomainAction> {
        self.with_port(port, |port| port.set_link_up(up))
    }

    /// Use the path delay measured in domain 0 for a port configured for the
    /// common peer delay mechanism
    pub fn set_common_path_delay(
        &mut self,
        port: usize,
        delay: Option<Duration>,
    ) -> Vec<DomainAction> {
        self.with_port(port, |port| {
            port.set_common_path_delay(delay);
            PortActionIterator::empty()
        })
    }

    /// Path delays that changed since the last call, for sharing with the
    /// ports of other domains that use the common peer delay mechanism
    pub fn take_shared_path_delays(&mut self) -> Vec<(usize, Option<Duration>)> {
        let mut changed = Vec::new();
        for (index, (port, shared)) in self.ports.iter().zip(&mut self.shared_delays).enumerate() {
            let delay = port.path_delay();
            if delay != *shared {
                *shared = delay;
                changed.push((index, delay));
            }
        }
        changed
    }

    fn with_port(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut Port) -> PortActionIterator,
    ) -> Vec<DomainAction> {
        if self.stopped {
            return Vec::new();
        }

        let Some(port) = self.ports.get_mut(index) else {
            log::warn!(
                "Event for unknown port {} in domain {}",
                index,
                self.domain_number
            );
            return Vec::new();
        };

        let mut out = Vec::new();
        let actions = f(port);
        push_port_actions(&mut out, index, actions);
        self.settle(&mut out);
        out
    }

    /// Process everything the ports produced while handling an event
    fn settle(&mut self, out: &mut Vec<DomainAction>) {
        for index in 0..self.ports.len() {
            if let Some(measurement) = self.ports[index].take_measurement() {
                self.handle_measurement(index, measurement);
            }
            if let Some(delay) = self.ports[index].take_path_delay_change() {
                out.push(DomainAction::Notify(Notification::PathDelayChanged {
                    domain_number: self.domain_number,
                    port: index,
                    delay,
                }));
            }
        }

        let mut requested = false;
        for port in &mut self.ports {
            requested |= port.take_bmca_request();
        }
        if requested {
            match self.profile {
                Profile::Standard => self.run_bmca(out),
                Profile::Automotive => self.apply_static_roles(out),
            }
        }

        self.update_operational(out);

        for (index, (port, reported)) in self
            .ports
            .iter()
            .zip(&mut self.reported_states)
            .enumerate()
        {
            let state = port.state().observable();
            if state != *reported {
                *reported = state;
                out.push(DomainAction::Notify(Notification::PortRoleChanged {
                    domain_number: self.domain_number,
                    port: index,
                    state,
                }));
            }
        }
    }

    fn run_bmca(&mut self, out: &mut Vec<DomainAction>) {
        let inputs: Vec<PortInput> = self.ports.iter().map(Port::bmca_input).collect();
        let decision = bmca::decide(self.local, &inputs);

        let slave = decision
            .slave
            .map(|(index, master)| (index, Some(master)));
        self.apply_roles(
            decision.grandmaster,
            decision.steps_removed,
            &decision.roles,
            slave,
            out,
        );
    }

    fn apply_static_roles(&mut self, out: &mut Vec<DomainAction>) {
        let roles: Vec<RecommendedRole> = self
            .ports
            .iter()
            .map(|port| match port.configured_role() {
                PortRole::Master => RecommendedRole::Master,
                PortRole::Slave => RecommendedRole::Slave,
                PortRole::Disabled => RecommendedRole::Passive,
            })
            .collect();

        let slave = roles
            .iter()
            .position(|role| *role == RecommendedRole::Slave)
            .map(|index| (index, None));

        let (grandmaster, steps_removed) = match (slave, self.automotive_gm) {
            (Some(_), Some(gm_id)) => (
                SystemIdentity {
                    clock_identity: gm_id,
                    ..self.local
                },
                1,
            ),
            _ => (self.local, 0),
        };

        self.apply_roles(grandmaster, steps_removed, &roles, slave, out);
    }

    fn apply_roles(
        &mut self,
        grandmaster: SystemIdentity,
        steps_removed: u16,
        roles: &[RecommendedRole],
        slave: Option<(usize, Option<PortIdentity>)>,
        out: &mut Vec<DomainAction>,
    ) {
        for (index, (port, role)) in self.ports.iter_mut().zip(roles).enumerate() {
            let remote_master = match slave {
                Some((slave_index, master)) if slave_index == index => master,
                _ => None,
            };
            let actions = port.apply_role(*role, remote_master);
            push_port_actions(out, index, actions);
        }

        if grandmaster.clock_identity != self.grandmaster.clock_identity {
            log::info!(
                "New grandmaster for domain {}: {}",
                self.domain_number,
                grandmaster.clock_identity
            );
            out.push(DomainAction::Notify(Notification::GrandmasterChanged {
                domain_number: self.domain_number,
                grandmaster: grandmaster.clock_identity,
            }));
        }
        self.grandmaster = grandmaster;
        self.steps_removed = steps_removed;

        if slave != self.slave {
            if let Some((index, master)) = slave {
                match master {
                    Some(master) => log::info!(
                        "Domain {} follows {} through port {}",
                        self.domain_number,
                        master,
                        index
                    ),
                    None => log::info!(
                        "Domain {} follows any master on port {}",
                        self.domain_number,
                        index
                    ),
                }
            }
            self.slave = slave;
            self.reset_servo();
        }
    }

    fn reset_servo(&mut self) {
        self.servo = None;
        self.locked_samples = 0;
        self.rejected_in_row = 0;
    }

    fn handle_measurement(&mut self, index: usize, measurement: SyncMeasurement) {
        let Some((slave_index, master)) = self.slave else {
            return;
        };
        if slave_index != index {
            return;
        }

        let servo = self.servo.get_or_insert_with(|| ServoInstance {
            servo: PiServo::new(&self.servo_config),
            port: slave_index,
            master,
            fresh: true,
        });
        debug_assert_eq!(servo.port, slave_index);

        let offset = measurement.offset;
        self.last_offset = Some(offset);

        if servo.fresh {
            servo.fresh = false;
            if offset.abs() > self.servo_config.step_threshold {
                log::info!(
                    "Stepping clock of domain {} by {}",
                    self.domain_number,
                    -offset
                );
                if let Err(error) = self.clock.step_clock(-offset) {
                    log::error!("Could not step clock: {:?}", error);
                }
                self.clock_steps += 1;
                return;
            }
        } else if offset.abs() > self.servo_config.discontinuity_threshold {
            self.rejected_offsets += 1;
            self.rejected_in_row += 1;
            log::warn!(
                "Rejecting offset {} from {} in domain {}",
                offset,
                measurement.master,
                self.domain_number
            );
            if self.rejected_in_row >= MAX_REJECTED_OFFSETS {
                log::warn!(
                    "Restarting servo of domain {} after {} rejected offsets",
                    self.domain_number,
                    self.rejected_in_row
                );
                self.reset_servo();
            }
            return;
        }

        self.rejected_in_row = 0;
        let correction = servo.servo.update(offset.nanos_saturating());
        log::debug!(
            "Offset {} in domain {}, frequency correction {}ppb",
            offset,
            self.domain_number,
            correction
        );

        // A positive offset means our clock is ahead and has to slow down
        if let Err(error) = self.clock.set_frequency(-(correction as f64) / 1000.0) {
            log::error!("Could not adjust clock frequency: {:?}", error);
        }
        self.locked_samples = self.locked_samples.saturating_add(1);
    }

    fn update_operational(&mut self, out: &mut Vec<DomainAction>) {
        let synchronized = match self.slave {
            None => self.gm_capable || self.profile == Profile::Automotive,
            Some(_) => self.locked_samples >= OPERATIONAL_LOCK_SAMPLES,
        };

        if synchronized != self.operational {
            log::info!(
                "Domain {} is {}",
                self.domain_number,
                if synchronized {
                    "synchronized"
                } else {
                    "no longer synchronized"
                }
            );
            self.operational = synchronized;
            for (index, port) in self.ports.iter_mut().enumerate() {
                let actions = port.set_operational(synchronized);
                push_port_actions(out, index, actions);
            }
        }
    }

    fn announce_contents(&self) -> AnnounceContents {
        AnnounceContents {
            grandmaster_priority_1: self.grandmaster.priority_1,
            grandmaster_clock_quality: self.grandmaster.clock_quality,
            grandmaster_priority_2: self.grandmaster.priority_2,
            grandmaster_identity: self.grandmaster.clock_identity,
            steps_removed: self.steps_removed,
        }
    }

    /// The number of this domain in messages
    pub fn domain_number(&self) -> u8 {
        self.domain_number
    }

    /// The number of ports of this domain
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// The current time of the clock this domain steers
    pub fn synchronized_time(&self) -> Time {
        self.clock.now()
    }

    /// The clock this domain steers
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// State of the port with the given index
    pub fn port_state(&self, port: usize) -> Option<PortState> {
        self.ports.get(port).map(|port| port.state().observable())
    }

    /// Path delay of the port with the given index, if known
    pub fn path_delay(&self, port: usize) -> Option<Duration> {
        self.ports.get(port).and_then(Port::path_delay)
    }

    /// Whether the local clock is the grandmaster of this domain
    pub fn is_grandmaster(&self) -> bool {
        self.slave.is_none()
    }

    /// Snapshot of the domain and its ports
    pub fn status(&self) -> DomainStatus {
        DomainStatus {
            domain_number: self.domain_number,
            grandmaster: self.grandmaster.clock_identity,
            steps_removed: self.steps_removed,
            is_grandmaster: self.is_grandmaster(),
            operational: self.operational,
            last_offset: self.last_offset,
            frequency_correction: self.servo.as_ref().map(|servo| servo.servo.output()),
            rejected_offsets: self.rejected_offsets,
            clock_steps: self.clock_steps,
            ports: self.ports.iter().map(Port::status).collect(),
        }
    }
}

fn push_port_actions(out: &mut Vec<DomainAction>, port: usize, actions: PortActionIterator) {
    out.extend(actions.map(|action| DomainAction::Port { port, action }));
}

#[cfg(test)]
pub(crate) mod tests {
    use alloc::{vec, vec::Vec};
    use core::cell::RefCell;

    use super::*;
    use crate::{
        config::{ClockQuality, PdelayMode, PortConfig},
        datastructures::messages::{
            AnnounceMessage, FollowUpMessage, Header, MessageBody, SyncMessage,
        },
        port::tests::{engine_config, LOCAL, PEER},
    };

    /// Records every adjustment made to it
    #[derive(Debug, Default)]
    pub(crate) struct TestClock {
        pub(crate) now: Time,
        pub(crate) steps: RefCell<Vec<Duration>>,
        pub(crate) frequencies: RefCell<Vec<f64>>,
    }

    impl Clock for &TestClock {
        type Error = core::convert::Infallible;

        fn now(&self) -> Time {
            self.now
        }

        fn step_clock(&mut self, offset: Duration) -> Result<Time, Self::Error> {
            self.steps.borrow_mut().push(offset);
            Ok(self.now)
        }

        fn set_frequency(&mut self, ppm: f64) -> Result<Time, Self::Error> {
            self.frequencies.borrow_mut().push(ppm);
            Ok(self.now)
        }
    }

    fn standard_domain(clock: &TestClock) -> Domain<&TestClock> {
        let engine = engine_config(Profile::Standard, PdelayMode::Standard);
        Domain::new(
            &engine,
            &engine.domains[0],
            clock,
            &[Some(Duration::from_nanos(200))],
        )
    }

    fn header(sequence_id: u16) -> Header {
        Header {
            domain_number: 0,
            correction_field: Duration::ZERO,
            source_port_identity: PEER,
            sequence_id,
            log_message_interval: -3,
        }
    }

    fn announce(priority_1: u8) -> Message {
        Message {
            header: header(0),
            body: MessageBody::Announce(AnnounceMessage {
                grandmaster_priority_1: priority_1,
                grandmaster_clock_quality: ClockQuality::default(),
                grandmaster_priority_2: 248,
                grandmaster_identity: PEER.clock_identity,
                steps_removed: 0,
            }),
        }
    }

    fn feed_offset(domain: &mut Domain<&TestClock>, id: u16, offset_ns: i64) {
        let origin = Time::from_secs(100);
        // path delay of 200ns is subtracted by the port
        let receipt = origin + Duration::from_nanos(offset_ns + 200);
        let sync = Message {
            header: header(id),
            body: MessageBody::Sync(SyncMessage {}),
        };
        let follow_up = Message {
            header: header(id),
            body: MessageBody::FollowUp(FollowUpMessage {
                precise_origin_timestamp: origin,
            }),
        };
        domain.handle_message(0, &sync, receipt);
        domain.handle_message(0, &follow_up, receipt);
    }

    fn notifications(actions: &[DomainAction]) -> Vec<Notification> {
        actions
            .iter()
            .filter_map(|action| match action {
                DomainAction::Notify(notification) => Some(*notification),
                DomainAction::Port { .. } => None,
            })
            .collect()
    }

    #[test]
    fn lone_domain_becomes_grandmaster() {
        let clock = TestClock::default();
        let mut domain = standard_domain(&clock);
        let actions = domain.start();

        assert_eq!(domain.port_state(0), Some(PortState::Master));
        assert!(domain.is_grandmaster());
        assert!(domain.status().operational);
        assert!(actions.iter().any(|action| matches!(
            action,
            DomainAction::Port {
                port: 0,
                action: PortAction::ResetAnnounceTimer { .. }
            }
        )));
        assert!(notifications(&actions).contains(&Notification::PortRoleChanged {
            domain_number: 0,
            port: 0,
            state: PortState::Master,
        }));
    }

    #[test]
    fn better_announce_makes_slave() {
        let clock = TestClock::default();
        let mut domain = standard_domain(&clock);
        domain.start();

        let actions = domain.handle_message(0, &announce(10), Time::from_secs(1));
        assert_eq!(domain.port_state(0), Some(PortState::Slave));
        assert!(!domain.is_grandmaster());
        assert_eq!(domain.status().grandmaster, PEER.clock_identity);
        assert_eq!(domain.status().steps_removed, 1);

        let raised = notifications(&actions);
        assert!(raised.contains(&Notification::GrandmasterChanged {
            domain_number: 0,
            grandmaster: PEER.clock_identity,
        }));
        assert!(raised.contains(&Notification::PortRoleChanged {
            domain_number: 0,
            port: 0,
            state: PortState::Slave,
        }));

        // Leaving the grandmaster role falls back to the initial intervals
        assert!(!domain.status().operational);

        // Same information again changes nothing
        let actions = domain.handle_message(0, &announce(10), Time::from_secs(2));
        assert!(notifications(&actions).is_empty());
    }

    #[test]
    fn worse_announce_keeps_master() {
        let clock = TestClock::default();
        let mut domain = standard_domain(&clock);
        domain.start();

        domain.handle_message(0, &announce(250), Time::from_secs(1));
        assert_eq!(domain.port_state(0), Some(PortState::Master));
    }

    #[test]
    fn first_large_offset_steps_clock() {
        let clock = TestClock::default();
        let mut domain = standard_domain(&clock);
        domain.start();
        domain.handle_message(0, &announce(10), Time::from_secs(1));

        feed_offset(&mut domain, 1, 5_000_000);
        assert_eq!(*clock.steps.borrow(), vec![Duration::from_nanos(-5_000_000)]);
        assert!(clock.frequencies.borrow().is_empty());

        feed_offset(&mut domain, 2, 800);
        assert_eq!(clock.steps.borrow().len(), 1);
        let frequencies = clock.frequencies.borrow();
        assert_eq!(frequencies.len(), 1);
        // Ahead of the master, so slow down
        assert!(frequencies[0] < 0.0);
    }

    #[test]
    fn small_first_offset_is_slewed() {
        let clock = TestClock::default();
        let mut domain = standard_domain(&clock);
        domain.start();
        domain.handle_message(0, &announce(10), Time::from_secs(1));

        feed_offset(&mut domain, 1, 800);
        assert!(clock.steps.borrow().is_empty());
        assert_eq!(clock.frequencies.borrow().len(), 1);
        assert_eq!(domain.status().last_offset, Some(Duration::from_nanos(800)));
    }

    #[test]
    fn discontinuities_are_rejected() {
        let clock = TestClock::default();
        let mut domain = standard_domain(&clock);
        domain.start();
        domain.handle_message(0, &announce(10), Time::from_secs(1));

        feed_offset(&mut domain, 1, 100);
        for id in 2..4 {
            feed_offset(&mut domain, id, 50_000_000);
        }
        assert_eq!(domain.status().rejected_offsets, 2);
        assert!(clock.steps.borrow().is_empty());
        assert_eq!(clock.frequencies.borrow().len(), 1);

        // The third one restarts the servo, the next offset steps the clock
        feed_offset(&mut domain, 4, 50_000_000);
        feed_offset(&mut domain, 5, 50_000_000);
        assert_eq!(domain.status().rejected_offsets, 3);
        assert_eq!(*clock.steps.borrow(), vec![Duration::from_nanos(-50_000_000)]);
    }

    #[test]
    fn operational_after_lock() {
        let clock = TestClock::default();
        let mut domain = standard_domain(&clock);
        domain.start();
        domain.handle_message(0, &announce(10), Time::from_secs(1));

        for id in 0..OPERATIONAL_LOCK_SAMPLES as u16 - 1 {
            feed_offset(&mut domain, id, 100);
        }
        assert!(!domain.status().operational);

        let sync = Message {
            header: header(100),
            body: MessageBody::Sync(SyncMessage {}),
        };
        let follow_up = Message {
            header: header(100),
            body: MessageBody::FollowUp(FollowUpMessage {
                precise_origin_timestamp: Time::from_secs(100),
            }),
        };
        domain.handle_message(0, &sync, Time::from_secs(100) + Duration::from_nanos(300));
        let actions = domain.handle_message(0, &follow_up, Time::from_secs(100));
        assert!(domain.status().operational);
        assert!(actions.iter().any(|action| matches!(
            action,
            DomainAction::Port {
                action: PortAction::ResetPdelayTimer { .. },
                ..
            }
        )));
    }

    #[test]
    fn automotive_static_roles() {
        let clock = TestClock::default();
        let mut engine = engine_config(Profile::Automotive, PdelayMode::Static);
        engine.gm_id = Some(PEER.clock_identity);
        engine.domains[0].ports = vec![
            PortConfig {
                role: PortRole::Slave,
                ..Default::default()
            },
            PortConfig {
                role: PortRole::Master,
                ..Default::default()
            },
        ];

        let mut domain = Domain::new(
            &engine,
            &engine.domains[0],
            &clock,
            &[Some(Duration::from_nanos(200)), None],
        );
        domain.start();

        assert_eq!(domain.port_state(0), Some(PortState::Slave));
        assert_eq!(domain.port_state(1), Some(PortState::Master));
        assert_eq!(domain.status().grandmaster, PEER.clock_identity);

        // Announces have no influence
        domain.handle_message(0, &announce(1), Time::from_secs(1));
        assert_eq!(domain.port_state(1), Some(PortState::Master));

        feed_offset(&mut domain, 1, 800);
        assert_eq!(domain.status().last_offset, Some(Duration::from_nanos(800)));
    }

    #[test]
    fn announce_carries_selected_grandmaster() {
        let clock = TestClock::default();
        let mut domain = standard_domain(&clock);
        domain.start();

        let actions = domain.handle_timer(0, PortTimer::Announce);
        let message = actions
            .into_iter()
            .find_map(|action| match action {
                DomainAction::Port {
                    action: PortAction::SendGeneral { message },
                    ..
                } => Some(message),
                _ => None,
            })
            .unwrap();
        let MessageBody::Announce(announce) = message.body else {
            panic!("Unexpected message");
        };
        assert_eq!(announce.grandmaster_identity, LOCAL);
        assert_eq!(announce.grandmaster_priority_1, 248);
    }

    #[test]
    fn shutdown_stops_everything() {
        let clock = TestClock::default();
        let mut domain = standard_domain(&clock);
        domain.start();
        domain.handle_message(0, &announce(10), Time::from_secs(1));
        domain.shutdown();

        feed_offset(&mut domain, 1, 800);
        assert!(clock.frequencies.borrow().is_empty());
        assert!(domain.handle_timer(0, PortTimer::Sync).is_empty());
    }

    #[test]
    fn unknown_port_is_ignored() {
        let clock = TestClock::default();
        let mut domain = standard_domain(&clock);
        domain.start();
        assert!(domain.handle_timer(5, PortTimer::Sync).is_empty());
    }
}
