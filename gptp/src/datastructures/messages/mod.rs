//! gPTP network messages
//!
//! Only the message types needed by the 802.1AS peer-to-peer delay mechanism
//! and its synchronization exchange are modelled.

pub use announce::AnnounceMessage;
pub use p_delay::{PDelayReqMessage, PDelayRespFollowUpMessage, PDelayRespMessage};
pub use sync::{FollowUpMessage, SyncMessage};

use super::common::{ClockIdentity, ClockQuality, PortIdentity};
use crate::time::{Duration, Interval, Time};

mod announce;
mod p_delay;
mod sync;

/// Discriminant of the messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageType {
    Sync,
    PDelayReq,
    PDelayResp,
    FollowUp,
    PDelayRespFollowUp,
    Announce,
}

impl MessageType {
    /// Event messages need a transmit or receive timestamp
    pub fn is_event(self) -> bool {
        matches!(self, Self::Sync | Self::PDelayReq | Self::PDelayResp)
    }
}

/// Fields shared by all messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header {
    pub domain_number: u8,
    /// Accumulated residence and link delay corrections
    pub correction_field: Duration,
    pub source_port_identity: PortIdentity,
    pub sequence_id: u16,
    pub log_message_interval: i8,
}

/// A full gPTP message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    pub header: Header,
    pub body: MessageBody,
}

/// Message type specific contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageBody {
    Sync(SyncMessage),
    PDelayReq(PDelayReqMessage),
    PDelayResp(PDelayRespMessage),
    FollowUp(FollowUpMessage),
    PDelayRespFollowUp(PDelayRespFollowUpMessage),
    Announce(AnnounceMessage),
}

impl MessageBody {
    /// The type of this body
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Sync(_) => MessageType::Sync,
            MessageBody::PDelayReq(_) => MessageType::PDelayReq,
            MessageBody::PDelayResp(_) => MessageType::PDelayResp,
            MessageBody::FollowUp(_) => MessageType::FollowUp,
            MessageBody::PDelayRespFollowUp(_) => MessageType::PDelayRespFollowUp,
            MessageBody::Announce(_) => MessageType::Announce,
        }
    }
}

/// The grandmaster information carried in Announce messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AnnounceContents {
    pub(crate) grandmaster_priority_1: u8,
    pub(crate) grandmaster_clock_quality: ClockQuality,
    pub(crate) grandmaster_priority_2: u8,
    pub(crate) grandmaster_identity: ClockIdentity,
    pub(crate) steps_removed: u16,
}

impl Message {
    /// The type of this message
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    /// Whether the message needs a timestamp on send and receipt
    pub fn is_event(&self) -> bool {
        self.message_type().is_event()
    }

    fn with_header(
        domain_number: u8,
        source_port_identity: PortIdentity,
        sequence_id: u16,
        log_message_interval: Interval,
        body: MessageBody,
    ) -> Self {
        Message {
            header: Header {
                domain_number,
                correction_field: Duration::ZERO,
                source_port_identity,
                sequence_id,
                log_message_interval: log_message_interval.as_log_2(),
            },
            body,
        }
    }

    pub(crate) fn announce(
        domain_number: u8,
        source_port_identity: PortIdentity,
        sequence_id: u16,
        log_message_interval: Interval,
        contents: AnnounceContents,
    ) -> Self {
        Self::with_header(
            domain_number,
            source_port_identity,
            sequence_id,
            log_message_interval,
            MessageBody::Announce(AnnounceMessage {
                grandmaster_priority_1: contents.grandmaster_priority_1,
                grandmaster_clock_quality: contents.grandmaster_clock_quality,
                grandmaster_priority_2: contents.grandmaster_priority_2,
                grandmaster_identity: contents.grandmaster_identity,
                steps_removed: contents.steps_removed,
            }),
        )
    }

    pub(crate) fn sync(
        domain_number: u8,
        source_port_identity: PortIdentity,
        sequence_id: u16,
        log_message_interval: Interval,
    ) -> Self {
        Self::with_header(
            domain_number,
            source_port_identity,
            sequence_id,
            log_message_interval,
            MessageBody::Sync(SyncMessage {}),
        )
    }

    pub(crate) fn follow_up(
        domain_number: u8,
        source_port_identity: PortIdentity,
        sequence_id: u16,
        log_message_interval: Interval,
        precise_origin_timestamp: Time,
    ) -> Self {
        Self::with_header(
            domain_number,
            source_port_identity,
            sequence_id,
            log_message_interval,
            MessageBody::FollowUp(FollowUpMessage {
                precise_origin_timestamp,
            }),
        )
    }

    pub(crate) fn pdelay_req(
        domain_number: u8,
        source_port_identity: PortIdentity,
        sequence_id: u16,
        log_message_interval: Interval,
    ) -> Self {
        Self::with_header(
            domain_number,
            source_port_identity,
            sequence_id,
            log_message_interval,
            MessageBody::PDelayReq(PDelayReqMessage {}),
        )
    }

    pub(crate) fn pdelay_resp(
        domain_number: u8,
        source_port_identity: PortIdentity,
        request_header: &Header,
        request_receipt_timestamp: Time,
    ) -> Self {
        Self::with_header(
            domain_number,
            source_port_identity,
            request_header.sequence_id,
            Interval::from_log_2(0x7f),
            MessageBody::PDelayResp(PDelayRespMessage {
                request_receipt_timestamp,
                requesting_port_identity: request_header.source_port_identity,
            }),
        )
    }

    pub(crate) fn pdelay_resp_follow_up(
        domain_number: u8,
        source_port_identity: PortIdentity,
        requesting_port_identity: PortIdentity,
        sequence_id: u16,
        response_origin_timestamp: Time,
    ) -> Self {
        Self::with_header(
            domain_number,
            source_port_identity,
            sequence_id,
            Interval::from_log_2(0x7f),
            MessageBody::PDelayRespFollowUp(PDelayRespFollowUpMessage {
                response_origin_timestamp,
                requesting_port_identity,
            }),
        )
    }
}
