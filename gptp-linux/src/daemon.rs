//! Bring-up and teardown of the daemon
//!
//! The engine is created from the configuration and split into its domains.
//! Every domain gets a worker, started in domain order. When a worker can't
//! bind its sockets, the workers started before it are stopped again and the
//! daemon exits.

use std::{net::SocketAddr, path::PathBuf};

use gptp::{
    lifecycle::{start_all, stop_all, Lifecycle},
    Domain, Engine, EngineError, Notification,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    clock::{DomainClock, LinuxClockProvider},
    config::{Config, ConfigFileError},
    nvram::{Nvram, NvramError},
    stats,
    transport::PortSocket,
    worker::{event_channel, WorkerEvent, WorkerHandle, WorkerLinks},
};

const NOTIFICATION_QUEUE_SIZE: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigFileError),
    #[error(transparent)]
    Nvram(#[from] NvramError),
    #[error(transparent)]
    Engine(#[from] EngineError<std::io::Error>),
    #[error("could not bind port {port} of domain {domain_number} to {address}: {source}")]
    Bind {
        domain_number: u8,
        port: usize,
        address: SocketAddr,
        source: std::io::Error,
    },
}

type WorkerEvents = (mpsc::Sender<WorkerEvent>, mpsc::Receiver<WorkerEvent>);

/// What the workers share while they are started and stopped
struct WorkerContext {
    cancel: CancellationToken,
}

/// A domain waiting for its worker, and afterwards the worker running it
struct PendingWorker {
    domain: Option<Domain<DomainClock>>,
    addresses: Vec<(SocketAddr, SocketAddr)>,
    events: Option<WorkerEvents>,
    links: WorkerLinks,
    handle: Option<WorkerHandle>,
}

impl Lifecycle<WorkerContext> for PendingWorker {
    type Error = DaemonError;

    fn start(&mut self, context: &mut WorkerContext) -> Result<(), DaemonError> {
        let (Some(domain), Some(events)) = (self.domain.take(), self.events.take()) else {
            return Ok(());
        };
        let domain_number = domain.domain_number();

        let mut sockets = Vec::with_capacity(self.addresses.len());
        for (port, &(bind, peer)) in self.addresses.iter().enumerate() {
            let socket = PortSocket::bind(bind, peer).map_err(|source| DaemonError::Bind {
                domain_number,
                port,
                address: bind,
                source,
            })?;
            tracing::debug!(
                "Port {} of domain {} bound to {}, peer {}",
                port,
                domain_number,
                bind,
                peer
            );
            sockets.push(socket);
        }

        self.handle = Some(WorkerHandle::spawn(
            domain,
            sockets,
            events,
            self.links.clone(),
            context.cancel.child_token(),
        ));
        tracing::info!("Started domain {}", domain_number);
        Ok(())
    }

    fn stop(&mut self, _context: &mut WorkerContext) {
        if let Some(handle) = &self.handle {
            tracing::info!("Stopping domain {}", handle.domain_number());
            handle.cancel();
        }
    }
}

async fn join_all(workers: Vec<PendingWorker>) {
    for worker in workers {
        if let Some(handle) = worker.handle {
            handle.join().await;
        }
    }
}

/// Run the daemon until `cancel` is triggered
pub async fn run(config: Config, cancel: CancellationToken) -> Result<(), DaemonError> {
    let engine_config = config.engine_config()?;

    let nvram_file = config.automotive.nvram_file.clone();
    let nvram = match &nvram_file {
        Some(path) => Nvram::load(path)?,
        None => Nvram::default(),
    };
    let mut seeds = config.initial_path_delays();
    seeds.extend(nvram.seeds());

    let domains = Engine::new(&engine_config, &mut LinuxClockProvider, &seeds)?.into_domains();

    let (notifications, notification_receiver) = mpsc::channel(NOTIFICATION_QUEUE_SIZE);
    let mut workers: Vec<PendingWorker> = domains
        .into_iter()
        .map(|domain| {
            let domain_number = domain.domain_number();
            let addresses = config
                .domains
                .iter()
                .find(|section| section.domain_number == domain_number)
                .map(|section| {
                    section
                        .ports
                        .iter()
                        .map(|port| (port.bind, port.peer))
                        .collect()
                })
                .unwrap_or_default();

            PendingWorker {
                domain: Some(domain),
                addresses,
                events: Some(event_channel()),
                links: WorkerLinks {
                    notifications: notifications.clone(),
                    common_path_delay: Vec::new(),
                },
                handle: None,
            }
        })
        .collect();

    // domain 0 forwards its path delays to the other domains
    let others: Vec<_> = workers
        .iter()
        .filter(|worker| !is_domain_zero(worker))
        .filter_map(|worker| worker.events.as_ref().map(|(sender, _)| sender.clone()))
        .collect();
    if let Some(zero) = workers.iter_mut().find(|worker| is_domain_zero(worker)) {
        zero.links.common_path_delay = others;
    }

    let notification_task = tokio::spawn(handle_notifications(
        notification_receiver,
        nvram,
        nvram_file,
    ));
    // the workers hold the remaining senders, so the task ends with them
    drop(notifications);

    let mut context = WorkerContext {
        cancel: cancel.child_token(),
    };
    if let Err((index, error)) = start_all(&mut workers, &mut context) {
        tracing::error!("Could not start worker {}, shutting down", index);
        join_all(workers).await;
        let _ = notification_task.await;
        return Err(error);
    }

    let stats_task = (config.stats_interval > 0).then(|| {
        let receivers = workers
            .iter()
            .filter_map(|worker| worker.handle.as_ref().map(WorkerHandle::subscribe))
            .collect();
        tokio::spawn(stats::report(
            std::time::Duration::from_secs(config.stats_interval),
            receivers,
            cancel.clone(),
        ))
    });

    cancel.cancelled().await;
    tracing::info!("Shutting down");

    stop_all(&mut workers, &mut context);
    join_all(workers).await;
    if let Err(error) = notification_task.await {
        tracing::error!("Notification task failed: {}", error);
    }
    if let Some(stats_task) = stats_task {
        if let Err(error) = stats_task.await {
            tracing::error!("Status task failed: {}", error);
        }
    }

    Ok(())
}

fn is_domain_zero(worker: &PendingWorker) -> bool {
    worker
        .domain
        .as_ref()
        .map_or(false, |domain| domain.domain_number() == 0)
}

async fn handle_notifications(
    mut notifications: mpsc::Receiver<Notification>,
    mut nvram: Nvram,
    nvram_file: Option<PathBuf>,
) {
    while let Some(notification) = notifications.recv().await {
        match notification {
            Notification::GrandmasterChanged {
                domain_number,
                grandmaster,
            } => {
                tracing::info!("Domain {} now follows grandmaster {}", domain_number, grandmaster);
            }
            Notification::PortRoleChanged {
                domain_number,
                port,
                state,
            } => {
                tracing::info!("Port {} of domain {} is now {}", port, domain_number, state);
            }
            Notification::PathDelayChanged {
                domain_number,
                port,
                delay,
            } => {
                tracing::info!(
                    "Path delay of port {} in domain {} is now {}ns",
                    port,
                    domain_number,
                    delay.nanos_rounded()
                );

                let Some(path) = &nvram_file else {
                    continue;
                };
                if nvram.record(domain_number, port, Some(delay)) {
                    if let Err(error) = nvram.store(path).await {
                        tracing::warn!("Could not store path delays: {}", error);
                    }
                }
            }
        }
    }
}
