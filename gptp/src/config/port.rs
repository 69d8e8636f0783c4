use crate::time::{Duration, Interval};

/// Role a port is configured with.
///
/// Only the automotive profile uses these as the actual port roles. Under the
/// standard profile the best master clock algorithm decides and the role is
/// ignored. Use [`PortConfig::enabled`] to take a port out of service.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PortRole {
    Master,
    Slave,
    #[default]
    Disabled,
}

/// Which delay mechanism a port is using.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DelayMechanism {
    /// Peer to peer delay mechanism, measured by this domain.
    #[default]
    P2P,
    /// Peer to peer delay mechanism, reusing the measurement made by the same
    /// port in domain 0.
    CommonP2P,
}

/// Configuration of a single port within a domain. Dynamic fields are kept
/// as part of [`Port`](crate::port::Port).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PortConfig {
    pub role: PortRole,
    /// Administrative state at startup
    pub enabled: bool,
    pub delay_mechanism: DelayMechanism,

    /// Peer delay request interval until the domain is synchronized
    pub initial_pdelay_req_interval: Interval,
    /// Sync interval until the domain is synchronized
    pub initial_sync_interval: Interval,
    pub announce_interval: Interval,
    /// Peer delay request interval once the domain is synchronized
    pub oper_pdelay_req_interval: Interval,
    /// Sync interval once the domain is synchronized
    pub oper_sync_interval: Interval,

    /// Number of announce intervals before received grandmaster information
    /// expires
    pub announce_receipt_timeout: u8,
    /// Number of sync intervals without a sync before a slave port loses its
    /// master
    pub sync_receipt_timeout: u8,
    /// Number of consecutive failed peer delay exchanges after which the path
    /// delay is considered unknown
    pub allowed_lost_responses: u8,

    /// Latency between the receive timestamp point and the wire
    pub rx_delay_compensation: Duration,
    /// Latency between the transmit timestamp point and the wire
    pub tx_delay_compensation: Duration,
    /// The estimated asymmetry of the link connected to this port
    pub delay_asymmetry: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            role: PortRole::Disabled,
            enabled: true,
            delay_mechanism: DelayMechanism::P2P,
            initial_pdelay_req_interval: Interval::from_log_2(0),
            initial_sync_interval: Interval::from_log_2(-3),
            announce_interval: Interval::from_log_2(0),
            oper_pdelay_req_interval: Interval::from_log_2(0),
            oper_sync_interval: Interval::from_log_2(-3),
            announce_receipt_timeout: 3,
            sync_receipt_timeout: 3,
            allowed_lost_responses: 3,
            rx_delay_compensation: Duration::ZERO,
            tx_delay_compensation: Duration::ZERO,
            delay_asymmetry: Duration::ZERO,
        }
    }
}

impl PortConfig {
    /// Pdelay request interval for the given phase
    pub fn pdelay_req_interval(&self, operational: bool) -> Interval {
        if operational {
            self.oper_pdelay_req_interval
        } else {
            self.initial_pdelay_req_interval
        }
    }

    /// Sync interval for the given phase
    pub fn sync_interval(&self, operational: bool) -> Interval {
        if operational {
            self.oper_sync_interval
        } else {
            self.initial_sync_interval
        }
    }

    /// Time after which received grandmaster information expires
    pub fn announce_receipt_duration(&self) -> core::time::Duration {
        self.announce_interval.as_core_duration() * self.announce_receipt_timeout as u32
    }
}
