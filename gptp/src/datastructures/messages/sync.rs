use crate::time::Time;

/// A two-step Sync. Its origin timestamp is carried by the matching
/// [`FollowUpMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SyncMessage {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FollowUpMessage {
    /// Transmit time of the Sync with the same sequence id
    pub precise_origin_timestamp: Time,
}
