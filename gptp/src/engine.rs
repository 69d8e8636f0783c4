//! The synchronization engine, owning all domains
//!
//! The [`Engine`] routes events to the domain they belong to and forwards the
//! path delays measured in domain 0 to the ports of the other domains that use
//! the common peer delay mechanism.

use alloc::{collections::BTreeMap, vec::Vec};
use core::fmt::Debug;

use crate::{
    clock::{Clock, ClockProvider},
    config::{ConfigError, DomainConfig, EngineConfig},
    datastructures::messages::Message,
    domain::{Domain, DomainAction},
    lifecycle::{self, Lifecycle},
    observability::DomainStatus,
    port::{PortTimer, TimestampContext},
    time::{Duration, Time},
};

/// Initial path delays, by domain number and port index
pub type PathDelaySeeds = BTreeMap<(u8, usize), Duration>;

/// An action of one of the domains of the engine
#[derive(Debug)]
pub struct EngineAction {
    pub domain_number: u8,
    pub action: DomainAction,
}

/// Reasons an [`Engine`] could not be created
#[derive(Debug)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum EngineError<E: Debug> {
    /// The configuration is invalid
    #[cfg_attr(feature = "std", error(transparent))]
    Config(ConfigError),
    /// The clock of a domain could not be made available
    #[cfg_attr(
        feature = "std",
        error("could not open the clock of domain {domain_number}: {error:?}")
    )]
    Clock { domain_number: u8, error: E },
}

impl<E: Debug> From<ConfigError> for EngineError<E> {
    fn from(error: ConfigError) -> Self {
        EngineError::Config(error)
    }
}

/// A domain during engine creation
struct PendingDomain<'a, C> {
    engine: &'a EngineConfig,
    config: &'a DomainConfig,
    seeds: Vec<Option<Duration>>,
    domain: Option<Domain<C>>,
}

impl<'a, P: ClockProvider> Lifecycle<P> for PendingDomain<'a, P::Clock> {
    type Error = EngineError<P::Error>;

    fn start(&mut self, provider: &mut P) -> Result<(), Self::Error> {
        let domain_number = self.config.domain_number;
        let clock = provider
            .open(domain_number, self.config.clock_target)
            .map_err(|error| EngineError::Clock {
                domain_number,
                error,
            })?;

        log::debug!(
            "Opened {:?} clock for domain {}",
            self.config.clock_target,
            domain_number
        );
        self.domain = Some(Domain::new(self.engine, self.config, clock, &self.seeds));
        Ok(())
    }

    fn stop(&mut self, _provider: &mut P) {
        if let Some(mut domain) = self.domain.take() {
            domain.shutdown();
        }
    }
}

/// All domains of this time-aware system
///
/// The engine doesn't run on its own. The user invokes the `handle_*`
/// methods for every received message, transmit timestamp and timer expiry,
/// and performs the returned actions.
#[derive(Debug)]
pub struct Engine<C> {
    domains: Vec<Domain<C>>,
}

impl<C: Clock> Engine<C> {
    /// Validate the configuration and create all domains, opening their
    /// clocks through `provider`. When a clock can't be opened, the domains
    /// created so far are shut down again in reverse order.
    pub fn new<P: ClockProvider<Clock = C>>(
        config: &EngineConfig,
        provider: &mut P,
        seeds: &PathDelaySeeds,
    ) -> Result<Self, EngineError<P::Error>> {
        config.validate()?;

        let mut pending: Vec<PendingDomain<'_, C>> = config
            .domains
            .iter()
            .map(|domain| PendingDomain {
                engine: config,
                config: domain,
                seeds: (0..domain.ports.len())
                    .map(|port| seeds.get(&(domain.domain_number, port)).copied())
                    .collect(),
                domain: None,
            })
            .collect();

        lifecycle::start_all(&mut pending, provider).map_err(|(index, error)| {
            log::error!("Could not start domain at position {}: {:?}", index, error);
            error
        })?;

        Ok(Engine {
            domains: pending
                .into_iter()
                .filter_map(|pending| pending.domain)
                .collect(),
        })
    }

    /// Start all domains, returning the actions that get them going
    pub fn start(&mut self) -> Vec<EngineAction> {
        let mut out = Vec::new();
        for domain in &mut self.domains {
            let domain_number = domain.domain_number();
            out.extend(wrap(domain_number, domain.start()));
        }
        self.share_path_delays(&mut out);
        out
    }

    /// Shut down all domains, in reverse order of creation
    pub fn shutdown(&mut self) {
        for domain in self.domains.iter_mut().rev() {
            domain.shutdown();
        }
    }

    /// Handle a message received on the port with the given index. The
    /// message is routed by its domain number.
    pub fn handle_message(
        &mut self,
        port: usize,
        message: &Message,
        time: Time,
    ) -> Vec<EngineAction> {
        let domain_number = message.header.domain_number;
        self.route(domain_number, |domain| {
            domain.handle_message(port, message, time)
        })
    }

    /// Handle the transmit timestamp of an event message
    pub fn handle_send_timestamp(
        &mut self,
        domain_number: u8,
        port: usize,
        context: TimestampContext,
        time: Time,
    ) -> Vec<EngineAction> {
        self.route(domain_number, |domain| {
            domain.handle_send_timestamp(port, context, time)
        })
    }

    /// Handle the expiry of a port timer
    pub fn handle_timer(
        &mut self,
        domain_number: u8,
        port: usize,
        timer: PortTimer,
    ) -> Vec<EngineAction> {
        self.route(domain_number, |domain| domain.handle_timer(port, timer))
    }

    /// Change the administrative state of a port in a single domain
    pub fn set_port_enabled(
        &mut self,
        domain_number: u8,
        port: usize,
        enabled: bool,
    ) -> Vec<EngineAction> {
        self.route(domain_number, |domain| {
            domain.set_port_enabled(port, enabled)
        })
    }

    /// Change the link state of a port. The link is shared by all domains.
    pub fn set_link_state(&mut self, port: usize, up: bool) -> Vec<EngineAction> {
        let mut out = Vec::new();
        for domain in &mut self.domains {
            let domain_number = domain.domain_number();
            out.extend(wrap(domain_number, domain.set_link_state(port, up)));
        }
        self.share_path_delays(&mut out);
        out
    }

    fn route(
        &mut self,
        domain_number: u8,
        f: impl FnOnce(&mut Domain<C>) -> Vec<DomainAction>,
    ) -> Vec<EngineAction> {
        let Some(domain) = self
            .domains
            .iter_mut()
            .find(|domain| domain.domain_number() == domain_number)
        else {
            log::trace!("Ignoring event for unknown domain {}", domain_number);
            return Vec::new();
        };

        let mut out = wrap(domain_number, f(domain));
        if domain_number == 0 {
            self.share_path_delays(&mut out);
        }
        out
    }

    fn share_path_delays(&mut self, out: &mut Vec<EngineAction>) {
        let Some(default) = self
            .domains
            .iter_mut()
            .find(|domain| domain.domain_number() == 0)
        else {
            return;
        };

        let updates = default.take_shared_path_delays();
        if updates.is_empty() {
            return;
        }

        for domain in &mut self.domains {
            let domain_number = domain.domain_number();
            if domain_number == 0 {
                continue;
            }
            for &(port, delay) in &updates {
                out.extend(wrap(
                    domain_number,
                    domain.set_common_path_delay(port, delay),
                ));
            }
        }
    }

    /// The domain with the given number
    pub fn domain(&self, domain_number: u8) -> Option<&Domain<C>> {
        self.domains
            .iter()
            .find(|domain| domain.domain_number() == domain_number)
    }

    /// All domains, in configuration order
    pub fn domains(&self) -> &[Domain<C>] {
        &self.domains
    }

    /// Split the engine into its domains, in configuration order.
    ///
    /// This lets every domain run in its own context. Afterwards the caller
    /// forwards [`Domain::take_shared_path_delays`] of domain 0 to the other
    /// domains itself.
    pub fn into_domains(self) -> Vec<Domain<C>> {
        self.domains
    }

    /// Current time of the clock steered by the given domain
    pub fn synchronized_time(&self, domain_number: u8) -> Option<Time> {
        self.domain(domain_number).map(Domain::synchronized_time)
    }

    /// Snapshot of all domains
    pub fn status(&self) -> Vec<DomainStatus> {
        self.domains.iter().map(Domain::status).collect()
    }
}

fn wrap(domain_number: u8, actions: Vec<DomainAction>) -> Vec<EngineAction> {
    actions
        .into_iter()
        .map(|action| EngineAction {
            domain_number,
            action,
        })
        .collect()
}
