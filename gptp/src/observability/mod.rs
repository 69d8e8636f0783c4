//! Snapshots of the engine state, for status reporting
pub mod port;

use alloc::vec::Vec;

use crate::{datastructures::common::ClockIdentity, time::Duration};
use port::PortStatus;

/// Snapshot of a single domain
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DomainStatus {
    /// Number of the domain in messages
    pub domain_number: u8,
    /// The currently selected grandmaster
    pub grandmaster: ClockIdentity,
    /// Hops between the grandmaster and us
    pub steps_removed: u16,
    /// Whether the local clock is the grandmaster
    pub is_grandmaster: bool,
    /// Whether the ports use the operational message intervals
    pub operational: bool,
    /// Last offset to the master fed into the servo
    pub last_offset: Option<Duration>,
    /// Current frequency correction in parts per billion, while a servo is
    /// running
    pub frequency_correction: Option<i32>,
    /// Offsets rejected as discontinuities
    pub rejected_offsets: u64,
    /// Times the clock was stepped
    pub clock_steps: u64,
    #[allow(missing_docs)]
    pub ports: Vec<PortStatus>,
}
