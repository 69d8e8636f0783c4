use core::fmt::{Display, Formatter};

use crate::{
    datastructures::common::PortIdentity,
    observability::port::PortState as ObservablePortState,
    time::{Duration, Time},
};

#[derive(Debug, Default)]
pub(crate) enum PortState {
    #[default]
    Disabled,
    Initializing,
    Faulty,
    Master,
    Passive,
    Uncalibrated(SlaveState),
    Slave(SlaveState),
}

impl PortState {
    pub(crate) fn observable(&self) -> ObservablePortState {
        match self {
            PortState::Disabled => ObservablePortState::Disabled,
            PortState::Initializing => ObservablePortState::Initializing,
            PortState::Faulty => ObservablePortState::Faulty,
            PortState::Master => ObservablePortState::Master,
            PortState::Passive => ObservablePortState::Passive,
            PortState::Uncalibrated(_) => ObservablePortState::Uncalibrated,
            PortState::Slave(_) => ObservablePortState::Slave,
        }
    }
}

impl Display for PortState {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        Display::fmt(&self.observable(), f)
    }
}

/// Progress of receiving time from the master
#[derive(Debug)]
pub(crate) struct SlaveState {
    /// `None` when any sender is accepted, which is the case for a statically
    /// configured slave port
    pub(super) remote_master: Option<PortIdentity>,
    pub(super) sync_state: SyncState,
}

impl SlaveState {
    pub(super) fn new(remote_master: Option<PortIdentity>) -> Self {
        SlaveState {
            remote_master,
            sync_state: SyncState::Empty,
        }
    }

    pub(crate) fn remote_master(&self) -> Option<PortIdentity> {
        self.remote_master
    }

    pub(super) fn accepts(&self, sender: PortIdentity) -> bool {
        self.remote_master.map_or(true, |master| master == sender)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum SyncState {
    Empty,
    /// A Sync arrived, its Follow_Up has not
    Measuring {
        id: u16,
        sender: PortIdentity,
        recv_time: Time,
        correction: Duration,
    },
}
