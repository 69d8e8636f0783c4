use super::{
    actions::TimestampContextInner,
    state::{SlaveState, SyncState},
    Port, PortAction, PortActionIterator, PortState, SyncMeasurement, TimestampContext,
};
use crate::{
    bmc::AnnounceDataset,
    config::Profile,
    datastructures::messages::{AnnounceMessage, FollowUpMessage, Header, Message},
    time::{Interval, Time},
};

impl Port {
    pub(super) fn handle_announce(
        &mut self,
        message: &Message,
        announce: &AnnounceMessage,
        time: Time,
    ) -> PortActionIterator {
        if self.profile == Profile::Automotive {
            log::trace!("Ignoring announce, roles are static");
            return actions![];
        }

        if announce.steps_removed >= 255 {
            log::warn!(
                "Discarding announce from {} with {} steps removed",
                message.header.source_port_identity,
                announce.steps_removed
            );
            self.counters.rx_discarded += 1;
            return actions![];
        }

        if announce.grandmaster_identity == self.port_identity.clock_identity {
            log::warn!(
                "Discarding announce from {} naming us as grandmaster",
                message.header.source_port_identity
            );
            self.counters.rx_discarded += 1;
            return actions![];
        }

        let dataset = AnnounceDataset::from_announce(&message.header, announce, time);
        if self.received.register(dataset, self.port_identity.port_number) {
            self.bmca_requested = true;
        }

        let from_current = self
            .received
            .best()
            .is_some_and(|best| best.sender == message.header.source_port_identity);
        if from_current {
            actions![PortAction::ResetAnnounceReceiptTimer {
                duration: self.config.announce_receipt_duration(),
            }]
        } else {
            actions![]
        }
    }

    pub(super) fn handle_sync(&mut self, header: &Header, time: Time) -> PortActionIterator {
        match &mut self.state {
            PortState::Slave(slave) | PortState::Uncalibrated(slave)
                if slave.accepts(header.source_port_identity) =>
            {
                slave.sync_state = SyncState::Measuring {
                    id: header.sequence_id,
                    sender: header.source_port_identity,
                    recv_time: time,
                    correction: header.correction_field,
                };
            }
            _ => {
                log::trace!(
                    "Ignoring sync {} from {}",
                    header.sequence_id,
                    header.source_port_identity
                );
                self.counters.rx_discarded += 1;
            }
        }

        actions![]
    }

    pub(super) fn handle_follow_up(
        &mut self,
        header: &Header,
        follow_up: &FollowUpMessage,
    ) -> PortActionIterator {
        let pending = match &mut self.state {
            PortState::Slave(slave) | PortState::Uncalibrated(slave) => match slave.sync_state {
                SyncState::Measuring {
                    id,
                    sender,
                    recv_time,
                    correction,
                } if id == header.sequence_id && sender == header.source_port_identity => {
                    slave.sync_state = SyncState::Empty;
                    Some((sender, recv_time, correction))
                }
                _ => None,
            },
            _ => None,
        };

        let Some((sender, recv_time, sync_correction)) = pending else {
            log::warn!(
                "Discarding Follow_Up {} from {} without matching Sync",
                header.sequence_id,
                header.source_port_identity
            );
            self.counters.rx_discarded += 1;
            return actions![];
        };

        let Some(path_delay) = self.path_delay() else {
            log::debug!(
                "Path delay on port {} unknown, skipping sync",
                self.port_identity.port_number
            );
            self.counters.rx_discarded += 1;
            return actions![];
        };

        let offset = recv_time
            - follow_up.precise_origin_timestamp
            - (sync_correction + header.correction_field)
            - path_delay
            - self.config.delay_asymmetry;

        log::debug!(
            "Measured offset {} to {} on port {}",
            offset,
            sender,
            self.port_identity.port_number
        );

        self.measurement = Some(SyncMeasurement {
            offset,
            master: sender,
            event_time: recv_time,
        });

        if let PortState::Uncalibrated(slave) = &self.state {
            let remote_master = slave.remote_master();
            self.set_forced_port_state(PortState::Slave(SlaveState::new(remote_master)));
        }

        actions![PortAction::ResetSyncReceiptTimer {
            duration: self.sync_receipt_duration(Some(header.log_message_interval)),
        }]
    }

    /// No usable time from the master for too long
    pub(crate) fn handle_sync_receipt_timer(&mut self) -> PortActionIterator {
        let PortState::Slave(slave) = &self.state else {
            return actions![];
        };
        let remote_master = slave.remote_master();

        log::warn!(
            "Sync receipt timeout on port {} in domain {}",
            self.port_identity.port_number,
            self.domain_number
        );
        self.counters.sync_receipt_timeouts += 1;
        self.measurement = None;
        self.set_forced_port_state(PortState::Uncalibrated(SlaveState::new(remote_master)));

        if self.profile == Profile::Standard {
            self.received.clear();
            self.bmca_requested = true;
        }

        actions![]
    }

    pub(crate) fn handle_reverse_sync_timer(&mut self) -> PortActionIterator {
        if !self.reverse_sync.enabled
            || !matches!(self.state, PortState::Slave(_) | PortState::Uncalibrated(_))
        {
            return actions![];
        }

        let seq_id = self.sync_seq_ids.generate();
        self.counters.tx_sync += 1;

        actions![
            PortAction::ResetReverseSyncTimer {
                duration: self.reverse_sync.interval,
            },
            PortAction::SendEvent {
                context: TimestampContext {
                    inner: TimestampContextInner::ReverseSync { id: seq_id },
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

    pub(super) fn slave_entry_actions(&self) -> PortActionIterator {
        let sync_receipt = PortAction::ResetSyncReceiptTimer {
            duration: self.sync_receipt_duration(None),
        };
        let reverse_sync = PortAction::ResetReverseSyncTimer {
            duration: self.reverse_sync.interval,
        };

        match (self.profile, self.reverse_sync.enabled) {
            (Profile::Standard, true) => actions![
                sync_receipt,
                PortAction::ResetAnnounceReceiptTimer {
                    duration: self.config.announce_receipt_duration(),
                },
                reverse_sync
            ],
            (Profile::Standard, false) => actions![
                sync_receipt,
                PortAction::ResetAnnounceReceiptTimer {
                    duration: self.config.announce_receipt_duration(),
                }
            ],
            (Profile::Automotive, true) => actions![sync_receipt, reverse_sync],
            (Profile::Automotive, false) => actions![sync_receipt],
        }
    }

    /// The sync interval advertised by the master is used when it is sane,
    /// our own configured one otherwise
    fn sync_receipt_duration(&self, advertised: Option<i8>) -> core::time::Duration {
        let interval = advertised
            .filter(|log_2| (-7..=7).contains(log_2))
            .map(Interval::from_log_2)
            .unwrap_or_else(|| self.sync_interval());
        interval.as_core_duration() * self.config.sync_receipt_timeout as u32
    }
}
