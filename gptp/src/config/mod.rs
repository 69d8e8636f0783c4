//! Configuration of the synchronization engine
//!
//! An [`EngineConfig`] is validated as a whole by [`EngineConfig::validate`]
//! before any domain is created. Errors name the section and key at fault.

mod domain;
mod port;

use alloc::vec::Vec;

pub use domain::{
    ClockTarget, DomainConfig, GrandmasterParams, PathDelayConfig, PdelayMode, ReverseSyncConfig,
};
pub use port::{DelayMechanism, PortConfig, PortRole};

pub use crate::{
    datastructures::common::{ClockIdentity, ClockQuality, PortIdentity},
    servo::ServoConfig,
};
use crate::time::{Duration, Interval};

/// Maximum number of domains an engine can run
pub const MAX_DOMAINS: usize = 3;

/// Lowest and highest grandmaster identity accepted for the automotive
/// profile. Identities outside of this range are not valid EUI-64s derived
/// from a mac address.
const GM_ID_RANGE: (u64, u64) = (0x0000_00FF_FE00_0000, 0xFFFF_FFFF_FEFF_FFFF);

/// Protocol profile. Applies to all domains.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Profile {
    /// Roles are decided by the best master clock algorithm
    #[default]
    Standard,
    /// Roles are static and the grandmaster is known up front
    Automotive,
}

/// Configuration of the complete engine
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct EngineConfig {
    pub clock_identity: ClockIdentity,
    pub profile: Profile,
    /// Identity of the grandmaster, automotive profile only
    pub gm_id: Option<ClockIdentity>,
    pub path_delay: PathDelayConfig,
    pub domains: Vec<DomainConfig>,
}

/// Location of a configuration problem
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Section {
    General,
    Automotive,
    Domain(usize),
    Grandmaster(usize),
    Servo(usize),
    Port { domain: usize, port: usize },
}

impl core::fmt::Display for Section {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Section::General => write!(f, "general"),
            Section::Automotive => write!(f, "automotive"),
            Section::Domain(domain) => write!(f, "domain.{domain}"),
            Section::Grandmaster(domain) => write!(f, "domain.{domain}.grandmaster"),
            Section::Servo(domain) => write!(f, "domain.{domain}.servo"),
            Section::Port { domain, port } => write!(f, "domain.{domain}.port.{port}"),
        }
    }
}

/// A problem with the configuration
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum ConfigError {
    #[cfg_attr(
        feature = "std",
        error("[{section}] {key}: {value} is outside of the range {min}..={max}")
    )]
    OutOfRange {
        section: Section,
        key: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    #[cfg_attr(feature = "std", error("[{section}] {key}: missing"))]
    Missing {
        section: Section,
        key: &'static str,
    },
    #[cfg_attr(
        feature = "std",
        error("[{section}] {key}: {identity} is not a valid grandmaster identity")
    )]
    InvalidIdentity {
        section: Section,
        key: &'static str,
        identity: ClockIdentity,
    },
    #[cfg_attr(
        feature = "std",
        error("[{section}] {key}: only a single port per domain can be a slave")
    )]
    MultipleSlavePorts {
        section: Section,
        key: &'static str,
    },
    #[cfg_attr(
        feature = "std",
        error("[{section}] {key}: domain {domain_number} is configured more than once")
    )]
    DuplicateDomain {
        section: Section,
        key: &'static str,
        domain_number: u8,
    },
    #[cfg_attr(
        feature = "std",
        error("[{section}] {key}: clock is already used by another domain")
    )]
    SharedClock {
        section: Section,
        key: &'static str,
    },
    #[cfg_attr(
        feature = "std",
        error("[{section}] {key}: only allowed for domains other than domain 0")
    )]
    CommonP2pInDefaultDomain {
        section: Section,
        key: &'static str,
    },
    #[cfg_attr(
        feature = "std",
        error("[{section}] {key}: expected {expected} ports, as in domain 0, found {found}")
    )]
    PortCountMismatch {
        section: Section,
        key: &'static str,
        expected: usize,
        found: usize,
    },
    #[cfg_attr(feature = "std", error("[general] domain: no domain with domain number 0"))]
    MissingDefaultDomain,
}

impl ConfigError {
    /// Section the problem was found in
    pub fn section(&self) -> Section {
        match self {
            ConfigError::OutOfRange { section, .. }
            | ConfigError::Missing { section, .. }
            | ConfigError::InvalidIdentity { section, .. }
            | ConfigError::MultipleSlavePorts { section, .. }
            | ConfigError::DuplicateDomain { section, .. }
            | ConfigError::SharedClock { section, .. }
            | ConfigError::CommonP2pInDefaultDomain { section, .. }
            | ConfigError::PortCountMismatch { section, .. } => *section,
            ConfigError::MissingDefaultDomain => Section::General,
        }
    }

    /// Key the problem was found in
    pub fn key(&self) -> &'static str {
        match self {
            ConfigError::OutOfRange { key, .. }
            | ConfigError::Missing { key, .. }
            | ConfigError::InvalidIdentity { key, .. }
            | ConfigError::MultipleSlavePorts { key, .. }
            | ConfigError::DuplicateDomain { key, .. }
            | ConfigError::SharedClock { key, .. }
            | ConfigError::CommonP2pInDefaultDomain { key, .. }
            | ConfigError::PortCountMismatch { key, .. } => key,
            ConfigError::MissingDefaultDomain => "domain",
        }
    }
}

fn check_range(
    section: Section,
    key: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            section,
            key,
            value,
            min,
            max,
        })
    }
}

fn check_interval(
    section: Section,
    key: &'static str,
    interval: Interval,
) -> Result<(), ConfigError> {
    check_range(section, key, interval.as_log_2() as i64, -5, 3)
}

fn check_compensation(
    section: Section,
    key: &'static str,
    value: Duration,
) -> Result<(), ConfigError> {
    check_range(section, key, value.nanos_saturating(), -1_000_000, 1_000_000)
}

impl EngineConfig {
    /// Index of the domain carrying domain number 0
    pub fn default_domain(&self) -> Option<usize> {
        self.domains.iter().position(|d| d.domain_number == 0)
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            Section::General,
            "domain",
            self.domains.len() as i64,
            1,
            MAX_DOMAINS as i64,
        )?;

        let default_domain = self
            .default_domain()
            .ok_or(ConfigError::MissingDefaultDomain)?;
        let port_count = self.domains[default_domain].ports.len();

        match self.profile {
            Profile::Automotive => {
                let gm_id = self.gm_id.ok_or(ConfigError::Missing {
                    section: Section::General,
                    key: "gm-id",
                })?;
                if !(GM_ID_RANGE.0..=GM_ID_RANGE.1).contains(&gm_id.as_u64()) {
                    return Err(ConfigError::InvalidIdentity {
                        section: Section::General,
                        key: "gm-id",
                        identity: gm_id,
                    });
                }
            }
            Profile::Standard => {}
        }

        check_range(
            Section::Automotive,
            "neighbor-prop-delay-threshold",
            self.path_delay.threshold.nanos_saturating(),
            1,
            100_000_000,
        )?;
        check_range(
            Section::Automotive,
            "neighbor-prop-delay-sensitivity",
            self.path_delay.sensitivity.nanos_saturating(),
            0,
            100_000_000,
        )?;
        check_range(
            Section::Automotive,
            "neighbor-prop-delay-smoothing",
            self.path_delay.smoothing as i64,
            0,
            16,
        )?;

        for (index, domain) in self.domains.iter().enumerate() {
            self.validate_domain(index, domain, port_count)?;
        }

        Ok(())
    }

    fn validate_domain(
        &self,
        index: usize,
        domain: &DomainConfig,
        port_count: usize,
    ) -> Result<(), ConfigError> {
        let section = Section::Domain(index);

        check_range(section, "domain-number", domain.domain_number as i64, 0, 127)?;

        if self.domains[..index]
            .iter()
            .any(|other| other.domain_number == domain.domain_number)
        {
            return Err(ConfigError::DuplicateDomain {
                section,
                key: "domain-number",
                domain_number: domain.domain_number,
            });
        }

        if domain.clock_target != ClockTarget::Virtual
            && self.domains[..index]
                .iter()
                .any(|other| other.clock_target == domain.clock_target)
        {
            return Err(ConfigError::SharedClock {
                section,
                key: "clock",
            });
        }

        if domain.ports.is_empty() {
            return Err(ConfigError::Missing {
                section,
                key: "port",
            });
        }

        if domain.ports.len() != port_count {
            return Err(ConfigError::PortCountMismatch {
                section,
                key: "port",
                expected: port_count,
                found: domain.ports.len(),
            });
        }

        if domain.reverse_sync.enabled {
            check_range(
                section,
                "reverse-sync-interval",
                domain.reverse_sync.interval.as_millis() as i64,
                32,
                10_000,
            )?;
        }

        domain.servo.validate(Section::Servo(index))?;

        let mut slave_seen = false;
        for (port_index, port) in domain.ports.iter().enumerate() {
            let section = Section::Port {
                domain: index,
                port: port_index,
            };

            if port.role == PortRole::Slave {
                if slave_seen {
                    return Err(ConfigError::MultipleSlavePorts {
                        section,
                        key: "role",
                    });
                }
                slave_seen = true;
            }

            if domain.domain_number == 0 && port.delay_mechanism == DelayMechanism::CommonP2P {
                return Err(ConfigError::CommonP2pInDefaultDomain {
                    section,
                    key: "delay-mechanism",
                });
            }

            check_interval(
                section,
                "initial-log-pdelay-req-interval",
                port.initial_pdelay_req_interval,
            )?;
            check_interval(section, "initial-log-sync-interval", port.initial_sync_interval)?;
            check_interval(section, "log-announce-interval", port.announce_interval)?;
            check_interval(
                section,
                "oper-log-pdelay-req-interval",
                port.oper_pdelay_req_interval,
            )?;
            check_interval(section, "oper-log-sync-interval", port.oper_sync_interval)?;
            check_range(
                section,
                "announce-receipt-timeout",
                port.announce_receipt_timeout as i64,
                2,
                255,
            )?;
            check_range(
                section,
                "sync-receipt-timeout",
                port.sync_receipt_timeout as i64,
                2,
                255,
            )?;
            check_range(
                section,
                "allowed-lost-responses",
                port.allowed_lost_responses as i64,
                1,
                255,
            )?;
            check_compensation(section, "rx-delay-compensation", port.rx_delay_compensation)?;
            check_compensation(section, "tx-delay-compensation", port.tx_delay_compensation)?;
            check_compensation(section, "delay-asymmetry", port.delay_asymmetry)?;
        }

        Ok(())
    }
}
