use crate::{datastructures::common::PortIdentity, time::Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PDelayReqMessage {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PDelayRespMessage {
    /// Time at which the responder received the request (t2)
    pub request_receipt_timestamp: Time,
    pub requesting_port_identity: PortIdentity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PDelayRespFollowUpMessage {
    /// Time at which the responder sent its response (t3)
    pub response_origin_timestamp: Time,
    pub requesting_port_identity: PortIdentity,
}
