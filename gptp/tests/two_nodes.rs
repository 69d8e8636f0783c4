use std::{
    cell::Cell,
    collections::VecDeque,
    convert::Infallible,
    rc::Rc,
};

use gptp::{
    config::{ClockTarget, DomainConfig, EngineConfig, PathDelayConfig, PortConfig, Profile},
    observability::{port::PortState, DomainStatus},
    time::{Duration, Time},
    Clock, ClockIdentity, ClockProvider, DomainAction, Engine, EngineAction, Message,
    Notification, PathDelaySeeds, PortAction, PortTimer,
};

const LINK_DELAY: u64 = 200;
const START: u64 = 1_000_000_000_000;
const SECOND: u64 = 1_000_000_000;

const IDENTITIES: [ClockIdentity; 2] = [ClockIdentity([0xa; 8]), ClockIdentity([0xb; 8])];

/// A clock running at the simulation time plus a fixed offset
#[derive(Clone)]
struct SimClock {
    global: Rc<Cell<u64>>,
    offset: Rc<Cell<i64>>,
    steps: Rc<Cell<u32>>,
}

impl Clock for SimClock {
    type Error = Infallible;

    fn now(&self) -> Time {
        Time::from_nanos((self.global.get() as i64 + self.offset.get()) as u64)
    }

    fn step_clock(&mut self, offset: Duration) -> Result<Time, Self::Error> {
        self.offset
            .set(self.offset.get() + offset.nanos_rounded() as i64);
        self.steps.set(self.steps.get() + 1);
        Ok(self.now())
    }

    fn set_frequency(&mut self, _ppm: f64) -> Result<Time, Self::Error> {
        Ok(self.now())
    }
}

struct SimProvider(SimClock);

impl ClockProvider for SimProvider {
    type Clock = SimClock;
    type Error = Infallible;

    fn open(&mut self, _domain_number: u8, _target: ClockTarget) -> Result<SimClock, Infallible> {
        Ok(self.0.clone())
    }
}

struct Node {
    engine: Engine<SimClock>,
    clock: SimClock,
    timers: Vec<(u8, usize, PortTimer, u64)>,
    notifications: Vec<Notification>,
}

struct Packet {
    to: usize,
    port: usize,
    at: u64,
    message: Message,
}

/// Two nodes, connected through port 0
struct Network {
    now: Rc<Cell<u64>>,
    nodes: Vec<Node>,
    wire: Vec<Packet>,
    link_up: bool,
}

impl Network {
    fn new(priorities: [u8; 2], offsets: [i64; 2]) -> Self {
        let now = Rc::new(Cell::new(START));
        let nodes = (0..2)
            .map(|index| {
                let mut domain =
                    DomainConfig::new(0, ClockTarget::System, vec![PortConfig::default()]);
                domain.grandmaster.priority_1 = priorities[index];
                let config = EngineConfig {
                    clock_identity: IDENTITIES[index],
                    profile: Profile::Standard,
                    gm_id: None,
                    path_delay: PathDelayConfig::default(),
                    domains: vec![domain],
                };

                let clock = SimClock {
                    global: now.clone(),
                    offset: Rc::new(Cell::new(offsets[index])),
                    steps: Rc::new(Cell::new(0)),
                };
                let engine = Engine::new(
                    &config,
                    &mut SimProvider(clock.clone()),
                    &PathDelaySeeds::new(),
                )
                .unwrap();

                Node {
                    engine,
                    clock,
                    timers: Vec::new(),
                    notifications: Vec::new(),
                }
            })
            .collect();

        Network {
            now,
            nodes,
            wire: Vec::new(),
            link_up: true,
        }
    }

    fn start(&mut self) {
        for node in 0..2 {
            let actions = self.nodes[node].engine.start();
            self.apply(node, actions);
        }
    }

    fn send(&mut self, from: usize, port: usize, message: Message) {
        if self.link_up {
            self.wire.push(Packet {
                to: 1 - from,
                port,
                at: self.now.get() + LINK_DELAY,
                message,
            });
        }
    }

    fn apply(&mut self, node: usize, actions: Vec<EngineAction>) {
        let mut queue = VecDeque::from(actions);
        while let Some(EngineAction {
            domain_number,
            action,
        }) = queue.pop_front()
        {
            match action {
                DomainAction::Notify(notification) => {
                    self.nodes[node].notifications.push(notification)
                }
                DomainAction::Port { port, action } => match action {
                    PortAction::SendEvent { context, message } => {
                        let tx_time = self.nodes[node].clock.now();
                        self.send(node, port, message);
                        queue.extend(self.nodes[node].engine.handle_send_timestamp(
                            domain_number,
                            port,
                            context,
                            tx_time,
                        ));
                    }
                    PortAction::SendGeneral { message } => self.send(node, port, message),
                    action => {
                        let (timer, duration) = action.timer().unwrap();
                        let deadline = self.now.get() + duration.as_nanos() as u64;
                        let timers = &mut self.nodes[node].timers;
                        timers.retain(|&(d, p, t, _)| (d, p, t) != (domain_number, port, timer));
                        timers.push((domain_number, port, timer, deadline));
                    }
                },
            }
        }
    }

    fn run_for(&mut self, duration: u64) {
        let end = self.now.get() + duration;
        loop {
            let next_packet = self.wire.iter().map(|packet| packet.at).min();
            let next_timer = self
                .nodes
                .iter()
                .flat_map(|node| node.timers.iter().map(|timer| timer.3))
                .min();
            let Some(next) = [next_packet, next_timer].into_iter().flatten().min() else {
                break;
            };
            if next > end {
                break;
            }
            self.now.set(next);

            if let Some(index) = self.wire.iter().position(|packet| packet.at == next) {
                let packet = self.wire.remove(index);
                let rx_time = self.nodes[packet.to].clock.now();
                let actions = self.nodes[packet.to].engine.handle_message(
                    packet.port,
                    &packet.message,
                    rx_time,
                );
                self.apply(packet.to, actions);
                continue;
            }

            for node in 0..2 {
                if let Some(index) = self.nodes[node]
                    .timers
                    .iter()
                    .position(|timer| timer.3 == next)
                {
                    let (domain_number, port, timer, _) = self.nodes[node].timers.remove(index);
                    let actions = self.nodes[node]
                        .engine
                        .handle_timer(domain_number, port, timer);
                    self.apply(node, actions);
                    break;
                }
            }
        }
        self.now.set(end);
    }

    fn status(&self, node: usize) -> DomainStatus {
        self.nodes[node].engine.status().remove(0)
    }
}

#[test]
fn better_master_is_followed() {
    let mut network = Network::new([10, 248], [0, 800]);
    network.start();
    network.run_for(3 * SECOND);

    let master = network.status(0);
    let slave = network.status(1);

    assert_eq!(master.ports[0].state, PortState::Master);
    assert!(master.is_grandmaster);
    assert_eq!(slave.ports[0].state, PortState::Slave);
    assert!(!slave.is_grandmaster);
    assert_eq!(slave.grandmaster, IDENTITIES[0]);
    assert_eq!(slave.steps_removed, 1);

    assert_eq!(slave.ports[0].path_delay, Some(Duration::from_nanos(200)));
    assert_eq!(slave.last_offset, Some(Duration::from_nanos(800)));
    assert!(slave.frequency_correction.is_some());

    assert!(network.nodes[1]
        .notifications
        .contains(&Notification::GrandmasterChanged {
            domain_number: 0,
            grandmaster: IDENTITIES[0],
        }));
    assert!(network.nodes[1]
        .notifications
        .contains(&Notification::PortRoleChanged {
            domain_number: 0,
            port: 0,
            state: PortState::Slave,
        }));
    assert!(!network.nodes[0]
        .notifications
        .iter()
        .any(|notification| matches!(notification, Notification::GrandmasterChanged { .. })));
}

#[test]
fn large_offset_is_stepped_away() {
    let mut network = Network::new([10, 248], [0, 5_000_000]);
    network.start();
    network.run_for(3 * SECOND);

    let slave = network.status(1);
    assert_eq!(slave.clock_steps, 1);
    assert_eq!(network.nodes[1].clock.steps.get(), 1);
    assert_eq!(slave.last_offset, Some(Duration::ZERO));
    assert_eq!(
        network.nodes[1].engine.synchronized_time(0),
        Some(network.nodes[0].clock.now())
    );
}

#[test]
fn lost_master_is_replaced() {
    let mut network = Network::new([10, 248], [0, 800]);
    network.start();
    network.run_for(3 * SECOND);
    assert_eq!(network.status(1).ports[0].state, PortState::Slave);
    network.nodes[1].notifications.clear();

    network.link_up = false;
    network.wire.clear();
    network.run_for(SECOND);

    let former_slave = network.status(1);
    assert_eq!(former_slave.ports[0].counters.sync_receipt_timeouts, 1);
    assert_eq!(former_slave.ports[0].state, PortState::Master);
    assert!(former_slave.is_grandmaster);
    assert_eq!(former_slave.grandmaster, IDENTITIES[1]);
    assert!(network.nodes[1]
        .notifications
        .contains(&Notification::GrandmasterChanged {
            domain_number: 0,
            grandmaster: IDENTITIES[1],
        }));
}

#[test]
fn equal_priorities_decided_by_identity() {
    let mut network = Network::new([248, 248], [0, 0]);
    network.start();
    network.run_for(3 * SECOND);

    // The lower clock identity wins
    assert_eq!(network.status(0).ports[0].state, PortState::Master);
    assert_eq!(network.status(1).ports[0].state, PortState::Slave);
    assert_eq!(network.status(1).last_offset, Some(Duration::ZERO));
}
