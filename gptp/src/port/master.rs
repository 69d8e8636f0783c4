use super::{
    actions::TimestampContextInner, Port, PortAction, PortActionIterator, PortState,
    TimestampContext,
};
use crate::{
    config::Profile,
    datastructures::messages::{AnnounceContents, Header, Message},
    time::Time,
};

impl Port {
    /// Send an Announce carrying the grandmaster information of the domain
    pub(crate) fn handle_announce_timer(
        &mut self,
        contents: &AnnounceContents,
    ) -> PortActionIterator {
        if self.profile == Profile::Automotive || !matches!(self.state, PortState::Master) {
            return actions![];
        }

        let seq_id = self.announce_seq_ids.generate();
        self.counters.tx_announce += 1;
        log::trace!(
            "Sending announce {} on port {}",
            seq_id,
            self.port_identity.port_number
        );

        actions![
            PortAction::ResetAnnounceTimer {
                duration: self.config.announce_interval.as_core_duration(),
            },
            PortAction::SendGeneral {
                message: Message::announce(
                    self.domain_number,
                    self.port_identity,
                    seq_id,
                    self.config.announce_interval,
                    *contents,
                ),
            }
        ]
    }

    pub(crate) fn handle_sync_timer(&mut self) -> PortActionIterator {
        if !matches!(self.state, PortState::Master) {
            return actions![];
        }

        let seq_id = self.sync_seq_ids.generate();
        self.counters.tx_sync += 1;

        actions![
            PortAction::ResetSyncTimer {
                duration: self.sync_interval().as_core_duration(),
            },
            PortAction::SendEvent {
                context: TimestampContext {
                    inner: TimestampContextInner::Sync { id: seq_id },
                },
                message: Message::sync(
                    self.domain_number,
                    self.port_identity,
                    seq_id,
                    self.sync_interval(),
                ),
            }
        ]
    }

    /// Follow_Up for a Sync we sent, carrying its transmit time. Reverse sync
    /// is sent by a slave port towards its master.
    pub(super) fn send_follow_up(
        &mut self,
        id: u16,
        timestamp: Time,
        reverse: bool,
    ) -> PortActionIterator {
        let allowed = if reverse {
            matches!(self.state, PortState::Slave(_) | PortState::Uncalibrated(_))
        } else {
            matches!(self.state, PortState::Master)
        };
        if !allowed {
            log::debug!(
                "Dropping Follow_Up {} on port {} after role change",
                id,
                self.port_identity.port_number
            );
            return actions![];
        }

        self.counters.tx_follow_up += 1;
        actions![PortAction::SendGeneral {
            message: Message::follow_up(
                self.domain_number,
                self.port_identity,
                id,
                self.sync_interval(),
                timestamp,
            ),
        }]
    }

    /// Responder side of the peer delay mechanism
    pub(super) fn handle_pdelay_req(&mut self, header: &Header, time: Time) -> PortActionIterator {
        log::trace!(
            "Responding to pdelay request {} from {}",
            header.sequence_id,
            header.source_port_identity
        );
        self.counters.tx_pdelay_resp += 1;

        actions![PortAction::SendEvent {
            context: TimestampContext {
                inner: TimestampContextInner::PDelayResp {
                    id: header.sequence_id,
                    requestor_identity: header.source_port_identity,
                },
            },
            message: Message::pdelay_resp(self.domain_number, self.port_identity, header, time),
        }]
    }
}
