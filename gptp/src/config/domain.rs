use alloc::vec::Vec;

use super::PortConfig;
use crate::{datastructures::common::ClockQuality, servo::ServoConfig, time::Duration};

/// Identifies the clock a domain steers.
///
/// Two domains can never share a [`ClockTarget::System`] or
/// [`ClockTarget::Hardware`] clock. Every [`ClockTarget::Virtual`] clock is
/// private to its domain.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClockTarget {
    /// The operating system clock
    System,
    /// A hardware clock, by index
    Hardware(u32),
    /// A software clock layered over a read-only clock
    Virtual,
}

/// Properties of the local clock as advertised to the network
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct GrandmasterParams {
    /// Whether the local clock may become grandmaster. When unset the local
    /// clock competes with priority1 255.
    pub gm_capable: bool,
    pub priority_1: u8,
    pub priority_2: u8,
    pub clock_quality: ClockQuality,
}

impl Default for GrandmasterParams {
    fn default() -> Self {
        Self {
            gm_capable: true,
            priority_1: 248,
            priority_2: 248,
            clock_quality: ClockQuality::default(),
        }
    }
}

impl GrandmasterParams {
    /// The priority1 value actually used for comparisons
    pub fn effective_priority_1(&self) -> u8 {
        if self.gm_capable {
            self.priority_1
        } else {
            255
        }
    }
}

/// How the neighbor propagation delay is obtained
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PdelayMode {
    /// Continuously measured and averaged
    #[default]
    Standard,
    /// Measured until the first valid value, then frozen
    Static,
    /// Never measured; the seed value, or zero, is used
    Silent,
}

/// Peer delay measurement parameters shared by all ports
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PathDelayConfig {
    pub mode: PdelayMode,
    /// Measurements above this value are rejected
    pub threshold: Duration,
    /// Minimum change of the delay before a
    /// [`Notification::PathDelayChanged`](crate::Notification::PathDelayChanged)
    /// is emitted
    pub sensitivity: Duration,
    /// Weight of new samples in the running average, as a power of two. Zero
    /// disables averaging.
    pub smoothing: u8,
}

impl Default for PathDelayConfig {
    fn default() -> Self {
        Self {
            mode: PdelayMode::Standard,
            threshold: Duration::from_nanos(800),
            sensitivity: Duration::from_nanos(10),
            smoothing: 3,
        }
    }
}

/// Reverse sync makes a slave port send Sync/Follow_Up back to its master so
/// the master can observe how well this system follows it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ReverseSyncConfig {
    pub enabled: bool,
    pub interval: core::time::Duration,
}

impl Default for ReverseSyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: core::time::Duration::from_millis(112),
        }
    }
}

/// Configuration of a single gPTP domain
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DomainConfig {
    pub domain_number: u8,
    pub clock_target: ClockTarget,
    pub grandmaster: GrandmasterParams,
    pub reverse_sync: ReverseSyncConfig,
    pub servo: ServoConfig,
    pub ports: Vec<PortConfig>,
}

impl DomainConfig {
    /// A domain with default parameters and the given ports
    pub fn new(domain_number: u8, clock_target: ClockTarget, ports: Vec<PortConfig>) -> Self {
        Self {
            domain_number,
            clock_target,
            grandmaster: GrandmasterParams::default(),
            reverse_sync: ReverseSyncConfig::default(),
            servo: ServoConfig::default(),
            ports,
        }
    }
}
