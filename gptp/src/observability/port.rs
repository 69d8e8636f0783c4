use core::fmt::{Display, Formatter};

use crate::{
    datastructures::common::{ClockIdentity, PortIdentity},
    time::Duration,
};

/// State of a port as seen from the outside
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum PortState {
    Disabled,
    Initializing,
    Faulty,
    Master,
    Passive,
    Uncalibrated,
    Slave,
}

impl Display for PortState {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            PortState::Disabled => "Disabled",
            PortState::Initializing => "Initializing",
            PortState::Faulty => "Faulty",
            PortState::Master => "Master",
            PortState::Passive => "Passive",
            PortState::Uncalibrated => "Uncalibrated",
            PortState::Slave => "Slave",
        };
        f.write_str(name)
    }
}

/// Message and event counters of a single port
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub struct PortCounters {
    pub rx_sync: u64,
    pub rx_follow_up: u64,
    pub rx_announce: u64,
    pub rx_pdelay_req: u64,
    pub rx_pdelay_resp: u64,
    pub rx_pdelay_resp_follow_up: u64,
    /// Messages dropped without effect: wrong state, unexpected sender,
    /// unmatched Follow_Up, filtered Announce
    pub rx_discarded: u64,
    pub tx_sync: u64,
    pub tx_follow_up: u64,
    pub tx_announce: u64,
    pub tx_pdelay_req: u64,
    pub tx_pdelay_resp: u64,
    pub tx_pdelay_resp_follow_up: u64,
    pub pdelay_lost_responses: u64,
    pub pdelay_rejected: u64,
    pub announce_receipt_timeouts: u64,
    pub sync_receipt_timeouts: u64,
}

/// Snapshot of a port
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortStatus {
    /// Identity the port sends messages with
    pub port_identity: PortIdentity,
    /// Current state
    pub state: PortState,
    /// Administrative state
    pub enabled: bool,
    /// Path delay to the link peer, when known
    pub path_delay: Option<Duration>,
    /// Master the port follows when it is a slave
    pub remote_master: Option<PortIdentity>,
    /// Grandmaster of the best Announce information received on this port
    pub received_grandmaster: Option<ClockIdentity>,
    #[allow(missing_docs)]
    pub counters: PortCounters,
}
