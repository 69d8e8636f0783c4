//! Role decision of the best master clock algorithm

use alloc::vec::Vec;

use super::{AnnounceDataset, PriorityVector, SystemIdentity};
use crate::datastructures::common::PortIdentity;

/// What the algorithm needs to know about a single port
#[derive(Debug, Clone, Copy)]
pub(crate) struct PortInput {
    pub(crate) port_identity: PortIdentity,
    /// Disabled and faulty ports take no part
    pub(crate) participating: bool,
    /// Best received information, if the port may become slave
    pub(crate) candidate: Option<AnnounceDataset>,
}

/// The role the algorithm assigns to a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecommendedRole {
    Master,
    Slave,
    Passive,
    /// The port takes no part and keeps its current state
    Unchanged,
}

/// Outcome of a run of the algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Decision {
    pub(crate) grandmaster: SystemIdentity,
    pub(crate) steps_removed: u16,
    /// Index of the slave port and the identity of its master
    pub(crate) slave: Option<(usize, PortIdentity)>,
    pub(crate) roles: Vec<RecommendedRole>,
}

/// Decide the roles of all ports of a domain.
///
/// This is a pure function of its inputs, so running it again without any
/// change in inputs yields the same roles.
pub(crate) fn decide(local: SystemIdentity, ports: &[PortInput]) -> Decision {
    let local_vector = PriorityVector::local(local);

    let best = ports
        .iter()
        .enumerate()
        .filter(|(_, port)| port.participating)
        .filter_map(|(index, port)| {
            port.candidate.map(|candidate| {
                (
                    index,
                    candidate,
                    candidate.priority_vector(port.port_identity.port_number),
                )
            })
        })
        .min_by(|(_, _, a), (_, _, b)| a.cmp(b));

    let best = match best {
        Some((index, candidate, vector))
            if PriorityVector {
                steps_removed: vector.steps_removed.saturating_add(1),
                ..vector
            }
            .is_better_than(&local_vector) =>
        {
            Some((index, candidate, vector))
        }
        _ => None,
    };

    let Some((slave_index, slave_candidate, slave_vector)) = best else {
        return Decision {
            grandmaster: local,
            steps_removed: 0,
            slave: None,
            roles: ports
                .iter()
                .map(|port| {
                    if port.participating {
                        RecommendedRole::Master
                    } else {
                        RecommendedRole::Unchanged
                    }
                })
                .collect(),
        };
    };

    let steps_removed = slave_vector.steps_removed.saturating_add(1);

    let roles = ports
        .iter()
        .enumerate()
        .map(|(index, port)| {
            if !port.participating {
                return RecommendedRole::Unchanged;
            }
            if index == slave_index {
                return RecommendedRole::Slave;
            }

            // What this port would send when it becomes master
            let master_vector = PriorityVector {
                root: slave_vector.root,
                steps_removed,
                source_port_identity: port.port_identity,
                port_number: port.port_identity.port_number,
            };

            match port.candidate {
                Some(candidate)
                    if candidate
                        .priority_vector(port.port_identity.port_number)
                        .is_better_than(&master_vector) =>
                {
                    RecommendedRole::Passive
                }
                _ => RecommendedRole::Master,
            }
        })
        .collect();

    Decision {
        grandmaster: slave_vector.root,
        steps_removed,
        slave: Some((slave_index, slave_candidate.sender)),
        roles,
    }
}
