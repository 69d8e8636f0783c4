//! Grandmaster information received on a port

use super::{PriorityVector, SystemIdentity};
use crate::{
    datastructures::{
        common::PortIdentity,
        messages::{AnnounceMessage, Header},
    },
    time::Time,
};

/// A grandmaster candidate as advertised in an Announce message
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnnounceDataset {
    pub grandmaster: SystemIdentity,
    pub steps_removed: u16,
    pub sender: PortIdentity,
    pub received_at: Time,
}

impl AnnounceDataset {
    pub(crate) fn from_announce(header: &Header, announce: &AnnounceMessage, time: Time) -> Self {
        Self {
            grandmaster: SystemIdentity {
                priority_1: announce.grandmaster_priority_1,
                clock_quality: announce.grandmaster_clock_quality,
                priority_2: announce.grandmaster_priority_2,
                clock_identity: announce.grandmaster_identity,
            },
            steps_removed: announce.steps_removed,
            sender: header.source_port_identity,
            received_at: time,
        }
    }

    /// The candidate as seen through the port with the given number
    pub fn priority_vector(&self, port_number: u16) -> PriorityVector {
        PriorityVector {
            root: self.grandmaster,
            steps_removed: self.steps_removed,
            source_port_identity: self.sender,
            port_number,
        }
    }

    fn same_contents(&self, other: &Self) -> bool {
        self.grandmaster == other.grandmaster
            && self.steps_removed == other.steps_removed
            && self.sender == other.sender
    }
}

/// The best information a port received, until it expires
///
/// Information from the current sender always replaces the stored
/// information, so a master can advertise a worse grandmaster. Information
/// from any other sender only replaces it when better.
#[derive(Debug, Default)]
pub(crate) struct ReceivedInfo {
    current: Option<AnnounceDataset>,
}

impl ReceivedInfo {
    /// Store a newly received dataset. Returns whether the information used
    /// by the best master clock algorithm changed.
    pub(crate) fn register(&mut self, dataset: AnnounceDataset, port_number: u16) -> bool {
        match &mut self.current {
            Some(current) if current.same_contents(&dataset) => {
                current.received_at = dataset.received_at;
                false
            }
            Some(current)
                if current.sender == dataset.sender
                    || dataset
                        .priority_vector(port_number)
                        .is_better_than(&current.priority_vector(port_number)) =>
            {
                *current = dataset;
                true
            }
            Some(_) => false,
            None => {
                self.current = Some(dataset);
                true
            }
        }
    }

    /// Forget the stored information. Returns whether there was any.
    pub(crate) fn clear(&mut self) -> bool {
        self.current.take().is_some()
    }

    pub(crate) fn best(&self) -> Option<&AnnounceDataset> {
        self.current.as_ref()
    }
}
