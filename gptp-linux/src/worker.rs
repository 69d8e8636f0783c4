//! One task per domain
//!
//! A worker owns a [`Domain`] and the sockets of its ports. Received
//! messages, timer expiries and path delays shared by domain 0 are processed
//! one at a time, so the domain never sees concurrent events. Every port
//! socket has a small receive task that timestamps incoming messages and
//! queues them for the worker.

use std::{
    collections::{BTreeMap, VecDeque},
    future::Future,
    pin::{pin, Pin},
    sync::Arc,
};

use gptp::{
    observability::DomainStatus,
    time::{Duration, Time},
    Clock, Domain, DomainAction, Message, Notification, PortAction, PortTimer,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, Sleep},
};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::{DomainClock, LinuxClock},
    transport::{PortSocket, MAX_MESSAGE_SIZE},
};

const EVENT_QUEUE_SIZE: usize = 64;

pin_project_lite::pin_project! {
    struct Timer {
        #[pin]
        timer: Sleep,
        running: bool,
    }
}

impl Timer {
    fn new() -> Self {
        Timer {
            timer: tokio::time::sleep(std::time::Duration::from_secs(0)),
            running: false,
        }
    }

    fn reset_at(self: Pin<&mut Self>, deadline: Instant) {
        let this = self.project();
        this.timer.reset(deadline);
        *this.running = true;
    }

    fn stop(self: Pin<&mut Self>) {
        *self.project().running = false;
    }
}

impl Future for Timer {
    type Output = ();

    fn poll(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        let this = self.project();
        if *this.running {
            let result = this.timer.poll(cx);
            if result != std::task::Poll::Pending {
                *this.running = false;
            }
            result
        } else {
            std::task::Poll::Pending
        }
    }
}

/// Input of a worker
#[derive(Debug)]
pub enum WorkerEvent {
    /// A message arrived. The timestamp was taken from the timestamp clock of
    /// the domain.
    Message {
        port: usize,
        message: Message,
        timestamp: Time,
    },
    /// A changed path delay of a port in domain 0
    CommonPathDelay { port: usize, delay: Option<Duration> },
}

/// Queue of events for one worker
pub fn event_channel() -> (mpsc::Sender<WorkerEvent>, mpsc::Receiver<WorkerEvent>) {
    mpsc::channel(EVENT_QUEUE_SIZE)
}

/// Where a worker sends things that concern more than its own domain
#[derive(Debug, Clone)]
pub struct WorkerLinks {
    pub notifications: mpsc::Sender<Notification>,
    /// Event queues of the other domains. Only used by the worker of domain 0.
    pub common_path_delay: Vec<mpsc::Sender<WorkerEvent>>,
}

#[derive(Debug)]
pub struct WorkerHandle {
    domain_number: u8,
    status: watch::Receiver<DomainStatus>,
    events: mpsc::Sender<WorkerEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    receivers: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Start running a domain. `sockets` holds the socket of every port, in
    /// port order, and `events` the queue created with [`event_channel`].
    pub fn spawn(
        domain: Domain<DomainClock>,
        sockets: Vec<PortSocket>,
        events: (mpsc::Sender<WorkerEvent>, mpsc::Receiver<WorkerEvent>),
        links: WorkerLinks,
        cancel: CancellationToken,
    ) -> Self {
        let domain_number = domain.domain_number();
        let (event_sender, event_receiver) = events;
        let sockets: Vec<_> = sockets.into_iter().map(Arc::new).collect();

        let timestamp_clock = domain.clock().timestamp_clock();
        let receivers = sockets
            .iter()
            .enumerate()
            .map(|(port, socket)| {
                tokio::spawn(receive_task(
                    port,
                    socket.clone(),
                    timestamp_clock.clone(),
                    event_sender.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        let (status_sender, status) = watch::channel(domain.status());
        let worker = Worker {
            domain,
            sockets,
            deadlines: BTreeMap::new(),
            links,
            status: status_sender,
        };
        let task = tokio::spawn(worker.run(event_receiver, cancel.clone()));

        WorkerHandle {
            domain_number,
            status,
            events: event_sender,
            cancel,
            task,
            receivers,
        }
    }

    pub fn domain_number(&self) -> u8 {
        self.domain_number
    }

    /// Latest status of the domain
    pub fn subscribe(&self) -> watch::Receiver<DomainStatus> {
        self.status.clone()
    }

    /// Queue an event for the worker. Fails once the worker has ended.
    pub async fn send(&self, event: WorkerEvent) -> Result<(), WorkerEvent> {
        self.events.send(event).await.map_err(|error| error.0)
    }

    /// Ask the worker to stop. The domain is shut down before the task ends.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until the worker and its receive tasks have ended
    pub async fn join(self) {
        for receiver in self.receivers {
            if let Err(error) = receiver.await {
                tracing::error!(
                    "Receive task of domain {} failed: {}",
                    self.domain_number,
                    error
                );
            }
        }
        if let Err(error) = self.task.await {
            tracing::error!("Worker of domain {} failed: {}", self.domain_number, error);
        }
    }
}

async fn receive_task(
    port: usize,
    socket: Arc<PortSocket>,
    clock: LinuxClock,
    events: mpsc::Sender<WorkerEvent>,
    cancel: CancellationToken,
) {
    let mut buffer = [0; MAX_MESSAGE_SIZE];
    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => break,
            result = socket.recv(&mut buffer) => match result {
                Ok(message) => message,
                Err(error) => {
                    tracing::warn!("Error receiving on port {}: {}", port, error);
                    continue;
                }
            },
        };
        let timestamp = clock.now();

        let event = WorkerEvent::Message {
            port,
            message,
            timestamp,
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
}

enum Wakeup {
    Cancelled,
    Timer,
    Event(WorkerEvent),
}

struct Worker {
    domain: Domain<DomainClock>,
    sockets: Vec<Arc<PortSocket>>,
    deadlines: BTreeMap<(usize, PortTimer), Instant>,
    links: WorkerLinks,
    status: watch::Sender<DomainStatus>,
}

impl Worker {
    async fn run(mut self, mut events: mpsc::Receiver<WorkerEvent>, cancel: CancellationToken) {
        let mut timer = pin!(Timer::new());

        let actions = self.domain.start();
        self.handle_actions(actions).await;

        loop {
            match self.deadlines.values().min() {
                Some(&deadline) => timer.as_mut().reset_at(deadline),
                None => timer.as_mut().stop(),
            }

            let wakeup = tokio::select! {
                () = cancel.cancelled() => Wakeup::Cancelled,
                () = &mut timer => Wakeup::Timer,
                event = events.recv() => match event {
                    Some(event) => Wakeup::Event(event),
                    None => Wakeup::Cancelled,
                },
            };

            match wakeup {
                Wakeup::Cancelled => break,
                Wakeup::Timer => {
                    while let Some((port, port_timer)) = self.next_expired() {
                        self.deadlines.remove(&(port, port_timer));
                        tracing::trace!(
                            "{:?} timer of port {} in domain {} expired",
                            port_timer,
                            port,
                            self.domain.domain_number()
                        );
                        let actions = self.domain.handle_timer(port, port_timer);
                        self.handle_actions(actions).await;
                    }
                }
                Wakeup::Event(event) => {
                    let actions = self.handle_event(event);
                    self.handle_actions(actions).await;
                }
            }
        }

        self.domain.shutdown();
        self.status.send_replace(self.domain.status());
    }

    fn next_expired(&self) -> Option<(usize, PortTimer)> {
        let now = Instant::now();
        self.deadlines
            .iter()
            .filter(|(_, &deadline)| deadline <= now)
            .min_by_key(|(_, &deadline)| deadline)
            .map(|(&key, _)| key)
    }

    fn handle_event(&mut self, event: WorkerEvent) -> Vec<DomainAction> {
        match event {
            WorkerEvent::Message {
                port,
                message,
                timestamp,
            } => {
                let time = self.domain.clock().convert_timestamp(timestamp);
                self.domain.handle_message(port, &message, time)
            }
            WorkerEvent::CommonPathDelay { port, delay } => {
                self.domain.set_common_path_delay(port, delay)
            }
        }
    }

    async fn handle_actions(&mut self, actions: Vec<DomainAction>) {
        let domain_number = self.domain.domain_number();
        let mut queue = VecDeque::from(actions);

        while let Some(action) = queue.pop_front() {
            let (port, action) = match action {
                DomainAction::Notify(notification) => {
                    if let Err(error) = self.links.notifications.try_send(notification) {
                        tracing::warn!(
                            "Dropping notification of domain {}: {}",
                            domain_number,
                            error
                        );
                    }
                    continue;
                }
                DomainAction::Port { port, action } => (port, action),
            };

            let Some(socket) = self.sockets.get(port) else {
                tracing::error!(
                    "Action for unknown port {} in domain {}",
                    port,
                    domain_number
                );
                continue;
            };

            match action {
                PortAction::SendEvent { context, message } => match socket.send(&message).await {
                    Ok(()) => {
                        let time = self.domain.clock().now();
                        queue.extend(self.domain.handle_send_timestamp(port, context, time));
                    }
                    Err(error) => tracing::warn!(
                        "Could not send {:?} on port {} of domain {}: {}",
                        message.message_type(),
                        port,
                        domain_number,
                        error
                    ),
                },
                PortAction::SendGeneral { message } => {
                    if let Err(error) = socket.send(&message).await {
                        tracing::warn!(
                            "Could not send {:?} on port {} of domain {}: {}",
                            message.message_type(),
                            port,
                            domain_number,
                            error
                        );
                    }
                }
                action => {
                    if let Some((timer, duration)) = action.timer() {
                        self.deadlines.insert((port, timer), Instant::now() + duration);
                    }
                }
            }
        }

        if domain_number == 0 {
            for (port, delay) in self.domain.take_shared_path_delays() {
                for target in &self.links.common_path_delay {
                    // a closed queue means that domain is shutting down
                    let _ = target.send(WorkerEvent::CommonPathDelay { port, delay }).await;
                }
            }
        }

        self.status.send_replace(self.domain.status());
    }
}

#[cfg(test)]
mod tests {
    use gptp::{
        config::{ClockTarget, DomainConfig, EngineConfig, PathDelayConfig, PortConfig, Profile},
        observability::port::PortState,
        ClockIdentity, Engine, Header, MessageBody, PDelayReqMessage, PathDelaySeeds,
        PortIdentity,
    };

    use super::*;
    use crate::clock::LinuxClockProvider;

    #[tokio::test]
    async fn timer_fires_once() {
        let mut timer = pin!(Timer::new());

        // not running, so it never fires
        let result =
            tokio::time::timeout(std::time::Duration::from_millis(20), &mut timer).await;
        assert!(result.is_err());

        timer
            .as_mut()
            .reset_at(Instant::now() + std::time::Duration::from_millis(10));
        tokio::time::timeout(std::time::Duration::from_millis(500), &mut timer)
            .await
            .unwrap();

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(20), &mut timer).await;
        assert!(result.is_err());
    }

    fn single_domain() -> Domain<DomainClock> {
        let config = EngineConfig {
            clock_identity: ClockIdentity([0x02, 1, 2, 3, 4, 5, 6, 7]),
            profile: Profile::Standard,
            gm_id: None,
            path_delay: PathDelayConfig::default(),
            domains: vec![DomainConfig::new(
                0,
                ClockTarget::Virtual,
                vec![PortConfig::default()],
            )],
        };

        Engine::new(&config, &mut LinuxClockProvider, &PathDelaySeeds::new())
            .unwrap()
            .into_domains()
            .remove(0)
    }

    #[tokio::test]
    async fn lone_domain_announces_itself() {
        let peer = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = PortSocket::bind(
            "127.0.0.1:0".parse().unwrap(),
            peer.local_addr().unwrap(),
        )
        .unwrap();

        let (notifications, mut notification_receiver) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let handle = WorkerHandle::spawn(
            single_domain(),
            vec![socket],
            event_channel(),
            WorkerLinks {
                notifications,
                common_path_delay: vec![],
            },
            cancel.clone(),
        );
        let mut status = handle.subscribe();

        let mut buffer = [0; MAX_MESSAGE_SIZE];
        let announce = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                let length = peer.recv(&mut buffer).await.unwrap();
                let message: Message = serde_json::from_slice(&buffer[..length]).unwrap();
                if matches!(message.body, MessageBody::Announce(_)) {
                    break message;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(announce.header.domain_number, 0);
        assert_eq!(
            announce.header.source_port_identity.clock_identity,
            ClockIdentity([0x02, 1, 2, 3, 4, 5, 6, 7])
        );

        assert!(matches!(
            notification_receiver.recv().await,
            Some(Notification::PortRoleChanged {
                state: PortState::Master,
                ..
            })
        ));
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            status.wait_for(|status| status.is_grandmaster),
        )
        .await
        .unwrap()
        .unwrap();

        cancel.cancel();
        handle.join().await;
        assert_eq!(status.borrow().ports[0].state, PortState::Disabled);
    }

    #[tokio::test]
    async fn queued_pdelay_request_is_answered() {
        let peer = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = PortSocket::bind(
            "127.0.0.1:0".parse().unwrap(),
            peer.local_addr().unwrap(),
        )
        .unwrap();

        let (notifications, _notification_receiver) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let handle = WorkerHandle::spawn(
            single_domain(),
            vec![socket],
            event_channel(),
            WorkerLinks {
                notifications,
                common_path_delay: vec![],
            },
            cancel.clone(),
        );

        let requester = PortIdentity {
            clock_identity: ClockIdentity([0x02, 9, 9, 9, 9, 9, 9, 9]),
            port_number: 1,
        };
        let request = Message {
            header: Header {
                domain_number: 0,
                correction_field: Duration::ZERO,
                source_port_identity: requester,
                sequence_id: 42,
                log_message_interval: 0,
            },
            body: MessageBody::PDelayReq(PDelayReqMessage {}),
        };
        handle
            .send(WorkerEvent::Message {
                port: 0,
                message: request,
                timestamp: Time::from_secs(1_700_000_000),
            })
            .await
            .unwrap();

        let mut buffer = [0; MAX_MESSAGE_SIZE];
        let response = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                let length = peer.recv(&mut buffer).await.unwrap();
                let message: Message = serde_json::from_slice(&buffer[..length]).unwrap();
                if let MessageBody::PDelayResp(response) = message.body {
                    break (message.header, response);
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(response.0.sequence_id, 42);
        assert_eq!(response.1.requesting_port_identity, requester);

        cancel.cancel();
        handle.join().await;
    }
}
