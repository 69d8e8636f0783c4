//! The configuration file of the daemon
//!
//! Keys are kebab-case and unknown keys are rejected. Everything but the
//! domain numbers and the port addresses has a default.

use std::{
    fs::read_to_string,
    net::SocketAddr,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use gptp::{
    config::{
        ClockIdentity, ClockQuality, ClockTarget, DelayMechanism, EngineConfig,
        GrandmasterParams, PathDelayConfig, PdelayMode, PortRole, Profile, ReverseSyncConfig,
        ServoConfig,
    },
    time::{Duration, Interval},
    PathDelaySeeds,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Deserializer};
use tracing::warn;

use crate::logging::LogLevel;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub profile: ProfileName,
    #[serde(default, deserialize_with = "deserialize_clock_identity")]
    pub gm_id: Option<ClockIdentity>,
    /// Seconds between status reports, 0 disables them
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
    #[serde(default, deserialize_with = "deserialize_clock_identity")]
    pub clock_identity: Option<ClockIdentity>,
    #[serde(default)]
    pub automotive: AutomotiveConfig,
    #[serde(rename = "domain")]
    pub domains: Vec<DomainConfig>,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProfileName {
    #[default]
    Standard,
    Automotive,
}

/// Neighbor propagation delay handling. Named after the automotive profile,
/// but the threshold, smoothing and persistence apply to both profiles.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AutomotiveConfig {
    /// Only used with the automotive profile, the standard profile always
    /// measures continuously
    #[serde(default = "default_neighbor_prop_delay_mode")]
    pub neighbor_prop_delay_mode: NeighborPropDelayMode,
    /// Path delay in nanoseconds used until the first measurement
    #[serde(default)]
    pub initial_neighbor_prop_delay: Option<i64>,
    #[serde(default = "default_neighbor_prop_delay_sensitivity")]
    pub neighbor_prop_delay_sensitivity: i64,
    #[serde(default = "default_neighbor_prop_delay_smoothing")]
    pub neighbor_prop_delay_smoothing: u8,
    /// File the measured path delays are kept in across restarts
    #[serde(default)]
    pub nvram_file: Option<PathBuf>,
}

impl Default for AutomotiveConfig {
    fn default() -> Self {
        Self {
            neighbor_prop_delay_mode: default_neighbor_prop_delay_mode(),
            initial_neighbor_prop_delay: None,
            neighbor_prop_delay_sensitivity: default_neighbor_prop_delay_sensitivity(),
            neighbor_prop_delay_smoothing: default_neighbor_prop_delay_smoothing(),
            nvram_file: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NeighborPropDelayMode {
    Standard,
    Static,
    Silent,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DomainConfig {
    pub domain_number: u8,
    /// `system`, `overlay`, or the path of a PTP hardware clock
    #[serde(default = "default_clock", deserialize_with = "deserialize_clock")]
    pub clock: ClockTarget,
    #[serde(default = "default_gm_capable")]
    pub gm_capable: bool,
    #[serde(default = "default_priority")]
    pub priority1: u8,
    #[serde(default = "default_priority")]
    pub priority2: u8,
    #[serde(default = "default_clock_class")]
    pub clock_class: u8,
    #[serde(default = "default_clock_accuracy")]
    pub clock_accuracy: u8,
    #[serde(default = "default_offset_scaled_log_variance")]
    pub offset_scaled_log_variance: u16,
    /// Nanoseconds. Only the value of domain 0 is used.
    #[serde(default = "default_neighbor_prop_delay_threshold")]
    pub neighbor_prop_delay_threshold: i64,
    #[serde(default)]
    pub reverse_sync: bool,
    /// Milliseconds
    #[serde(default = "default_reverse_sync_interval")]
    pub reverse_sync_interval: u64,
    #[serde(default)]
    pub servo: ServoSection,
    #[serde(rename = "port")]
    pub ports: Vec<PortConfig>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct ServoSection {
    pub kp: u32,
    pub ki: u32,
    pub scale: u8,
    pub integral_limit: i64,
    pub output_limit: u32,
    /// Nanoseconds
    pub step_threshold: i64,
    /// Nanoseconds
    pub discontinuity_threshold: i64,
}

impl Default for ServoSection {
    fn default() -> Self {
        let servo = ServoConfig::default();
        Self {
            kp: servo.kp,
            ki: servo.ki,
            scale: servo.scale,
            integral_limit: servo.integral_limit,
            output_limit: servo.output_limit,
            step_threshold: servo.step_threshold.nanos_saturating(),
            discontinuity_threshold: servo.discontinuity_threshold.nanos_saturating(),
        }
    }
}

impl From<&ServoSection> for ServoConfig {
    fn from(servo: &ServoSection) -> Self {
        Self {
            kp: servo.kp,
            ki: servo.ki,
            scale: servo.scale,
            integral_limit: servo.integral_limit,
            output_limit: servo.output_limit,
            step_threshold: Duration::from_nanos(servo.step_threshold),
            discontinuity_threshold: Duration::from_nanos(servo.discontinuity_threshold),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PortConfig {
    /// Local address messages are received on
    pub bind: SocketAddr,
    /// Address of the link peer
    pub peer: SocketAddr,
    #[serde(default)]
    pub role: RoleName,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub delay_mechanism: DelayMechanismName,
    #[serde(default = "default_log_pdelay_req_interval")]
    pub initial_log_pdelay_req_interval: i8,
    #[serde(default = "default_log_sync_interval")]
    pub initial_log_sync_interval: i8,
    #[serde(default = "default_log_announce_interval")]
    pub log_announce_interval: i8,
    #[serde(default = "default_log_pdelay_req_interval")]
    pub oper_log_pdelay_req_interval: i8,
    #[serde(default = "default_log_sync_interval")]
    pub oper_log_sync_interval: i8,
    #[serde(default = "default_receipt_timeout")]
    pub announce_receipt_timeout: u8,
    #[serde(default = "default_receipt_timeout")]
    pub sync_receipt_timeout: u8,
    #[serde(default = "default_allowed_lost_responses")]
    pub allowed_lost_responses: u8,
    /// Nanoseconds
    #[serde(default)]
    pub rx_delay_compensation: i64,
    /// Nanoseconds
    #[serde(default)]
    pub tx_delay_compensation: i64,
    /// Nanoseconds
    #[serde(default)]
    pub delay_asymmetry: i64,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoleName {
    Master,
    Slave,
    #[default]
    Disabled,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DelayMechanismName {
    #[default]
    P2p,
    CommonP2p,
}

impl From<&PortConfig> for gptp::config::PortConfig {
    fn from(pc: &PortConfig) -> Self {
        Self {
            role: match pc.role {
                RoleName::Master => PortRole::Master,
                RoleName::Slave => PortRole::Slave,
                RoleName::Disabled => PortRole::Disabled,
            },
            enabled: pc.enabled,
            delay_mechanism: match pc.delay_mechanism {
                DelayMechanismName::P2p => DelayMechanism::P2P,
                DelayMechanismName::CommonP2p => DelayMechanism::CommonP2P,
            },
            initial_pdelay_req_interval: Interval::from_log_2(pc.initial_log_pdelay_req_interval),
            initial_sync_interval: Interval::from_log_2(pc.initial_log_sync_interval),
            announce_interval: Interval::from_log_2(pc.log_announce_interval),
            oper_pdelay_req_interval: Interval::from_log_2(pc.oper_log_pdelay_req_interval),
            oper_sync_interval: Interval::from_log_2(pc.oper_log_sync_interval),
            announce_receipt_timeout: pc.announce_receipt_timeout,
            sync_receipt_timeout: pc.sync_receipt_timeout,
            allowed_lost_responses: pc.allowed_lost_responses,
            rx_delay_compensation: Duration::from_nanos(pc.rx_delay_compensation),
            tx_delay_compensation: Duration::from_nanos(pc.tx_delay_compensation),
            delay_asymmetry: Duration::from_nanos(pc.delay_asymmetry),
        }
    }
}

impl From<&DomainConfig> for gptp::config::DomainConfig {
    fn from(dc: &DomainConfig) -> Self {
        Self {
            domain_number: dc.domain_number,
            clock_target: dc.clock,
            grandmaster: GrandmasterParams {
                gm_capable: dc.gm_capable,
                priority_1: dc.priority1,
                priority_2: dc.priority2,
                clock_quality: ClockQuality {
                    clock_class: dc.clock_class,
                    clock_accuracy: dc.clock_accuracy,
                    offset_scaled_log_variance: dc.offset_scaled_log_variance,
                },
            },
            reverse_sync: ReverseSyncConfig {
                enabled: dc.reverse_sync,
                interval: std::time::Duration::from_millis(dc.reverse_sync_interval),
            },
            servo: (&dc.servo).into(),
            ports: dc.ports.iter().map(Into::into).collect(),
        }
    }
}

fn deserialize_clock_identity<'de, D>(deserializer: D) -> Result<Option<ClockIdentity>, D::Error>
where
    D: Deserializer<'de>,
{
    use hex::FromHex;
    use serde::de::Error;
    let raw: String = Deserialize::deserialize(deserializer)?;
    let raw = raw.replace([':', '-'], "");
    Ok(Some(ClockIdentity(<[u8; 8]>::from_hex(raw).map_err(
        |e| D::Error::custom(format!("Invalid clock identifier: {}", e)),
    )?)))
}

fn deserialize_clock<'de, D>(deserializer: D) -> Result<ClockTarget, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let raw: String = Deserialize::deserialize(deserializer)?;
    match raw.as_str() {
        "system" => Ok(ClockTarget::System),
        "overlay" => Ok(ClockTarget::Virtual),
        path => path
            .strip_prefix("/dev/ptp")
            .and_then(|index| index.parse().ok())
            .map(ClockTarget::Hardware)
            .ok_or_else(|| {
                D::Error::custom(format!(
                    "Invalid clock {path:?}, expected system, overlay or /dev/ptpN"
                ))
            }),
    }
}

/// A random locally administered unicast EUI-64
fn random_clock_identity() -> ClockIdentity {
    let mut identity: [u8; 8] = StdRng::from_entropy().gen();
    identity[0] = (identity[0] & 0xfc) | 0x02;
    ClockIdentity(identity)
}

impl Config {
    /// Parse config from file
    pub fn from_file(file: &Path) -> Result<Config, ConfigFileError> {
        let meta = std::fs::metadata(file)?;
        let perm = meta.permissions();

        if perm.mode() as libc::mode_t & libc::S_IWOTH != 0 {
            warn!("Unrestricted config file permissions: Others can write.");
        }

        let contents = read_to_string(file)?;
        let config: Config = toml::de::from_str(&contents)?;
        Ok(config)
    }

    /// Warns about config values that are accepted but likely a mistake
    pub fn warn_when_unreasonable(&self) {
        if self.profile == ProfileName::Standard && self.gm_id.is_some() {
            warn!("gm-id is only used with the automotive profile");
        }

        let threshold = self
            .domains
            .iter()
            .find(|domain| domain.domain_number == 0)
            .map(|domain| domain.neighbor_prop_delay_threshold);
        if self.domains.iter().any(|domain| {
            Some(domain.neighbor_prop_delay_threshold) != threshold
                && domain.neighbor_prop_delay_threshold != default_neighbor_prop_delay_threshold()
        }) {
            warn!("neighbor-prop-delay-threshold is only used from domain 0");
        }
    }

    /// Convert to the configuration of the protocol engine and validate it.
    /// Without a configured clock identity a random one is picked.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigFileError> {
        let profile = match self.profile {
            ProfileName::Standard => Profile::Standard,
            ProfileName::Automotive => Profile::Automotive,
        };

        let mode = match (profile, self.automotive.neighbor_prop_delay_mode) {
            (Profile::Standard, _) | (_, NeighborPropDelayMode::Standard) => PdelayMode::Standard,
            (Profile::Automotive, NeighborPropDelayMode::Static) => PdelayMode::Static,
            (Profile::Automotive, NeighborPropDelayMode::Silent) => PdelayMode::Silent,
        };

        let threshold = self
            .domains
            .iter()
            .find(|domain| domain.domain_number == 0)
            .map_or(default_neighbor_prop_delay_threshold(), |domain| {
                domain.neighbor_prop_delay_threshold
            });

        let config = EngineConfig {
            clock_identity: self.clock_identity.unwrap_or_else(random_clock_identity),
            profile,
            gm_id: self.gm_id,
            path_delay: PathDelayConfig {
                mode,
                threshold: Duration::from_nanos(threshold),
                sensitivity: Duration::from_nanos(self.automotive.neighbor_prop_delay_sensitivity),
                smoothing: self.automotive.neighbor_prop_delay_smoothing,
            },
            domains: self.domains.iter().map(Into::into).collect(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Initial path delays for all ports from `initial-neighbor-prop-delay`
    pub fn initial_path_delays(&self) -> PathDelaySeeds {
        let Some(delay) = self.automotive.initial_neighbor_prop_delay else {
            return PathDelaySeeds::new();
        };

        self.domains
            .iter()
            .flat_map(|domain| {
                (0..domain.ports.len())
                    .map(move |port| ((domain.domain_number, port), Duration::from_nanos(delay)))
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("io error while reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("config toml parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] gptp::config::ConfigError),
}

fn default_stats_interval() -> u64 {
    10
}

fn default_neighbor_prop_delay_mode() -> NeighborPropDelayMode {
    NeighborPropDelayMode::Static
}

fn default_neighbor_prop_delay_sensitivity() -> i64 {
    PathDelayConfig::default().sensitivity.nanos_saturating()
}

fn default_neighbor_prop_delay_smoothing() -> u8 {
    PathDelayConfig::default().smoothing
}

fn default_neighbor_prop_delay_threshold() -> i64 {
    PathDelayConfig::default().threshold.nanos_saturating()
}

fn default_clock() -> ClockTarget {
    ClockTarget::System
}

fn default_gm_capable() -> bool {
    true
}

fn default_priority() -> u8 {
    248
}

fn default_clock_class() -> u8 {
    ClockQuality::default().clock_class
}

fn default_clock_accuracy() -> u8 {
    ClockQuality::default().clock_accuracy
}

fn default_offset_scaled_log_variance() -> u16 {
    ClockQuality::default().offset_scaled_log_variance
}

fn default_reverse_sync_interval() -> u64 {
    112
}

fn default_enabled() -> bool {
    true
}

fn default_log_pdelay_req_interval() -> i8 {
    0
}

fn default_log_sync_interval() -> i8 {
    -3
}

fn default_log_announce_interval() -> i8 {
    0
}

fn default_receipt_timeout() -> u8 {
    3
}

fn default_allowed_lost_responses() -> u8 {
    3
}

#[cfg(test)]
mod tests {
    use gptp::config::Section;

    use super::*;

    const MINIMAL_CONFIG: &str = r#"
[[domain]]
domain-number = 0

[[domain.port]]
bind = "127.0.0.1:7000"
peer = "127.0.0.1:7001"
"#;

    // Minimal amount of config results in default values
    #[test]
    fn minimal_config() {
        let expected_port = PortConfig {
            bind: "127.0.0.1:7000".parse().unwrap(),
            peer: "127.0.0.1:7001".parse().unwrap(),
            role: RoleName::Disabled,
            enabled: true,
            delay_mechanism: DelayMechanismName::P2p,
            initial_log_pdelay_req_interval: 0,
            initial_log_sync_interval: -3,
            log_announce_interval: 0,
            oper_log_pdelay_req_interval: 0,
            oper_log_sync_interval: -3,
            announce_receipt_timeout: 3,
            sync_receipt_timeout: 3,
            allowed_lost_responses: 3,
            rx_delay_compensation: 0,
            tx_delay_compensation: 0,
            delay_asymmetry: 0,
        };

        let expected_domain = DomainConfig {
            domain_number: 0,
            clock: ClockTarget::System,
            gm_capable: true,
            priority1: 248,
            priority2: 248,
            clock_class: 248,
            clock_accuracy: 0xFE,
            offset_scaled_log_variance: 0x4100,
            neighbor_prop_delay_threshold: 800,
            reverse_sync: false,
            reverse_sync_interval: 112,
            servo: ServoSection::default(),
            ports: vec![expected_port],
        };

        let expected = Config {
            log_level: LogLevel::Info,
            profile: ProfileName::Standard,
            gm_id: None,
            stats_interval: 10,
            clock_identity: None,
            automotive: AutomotiveConfig::default(),
            domains: vec![expected_domain],
        };

        let actual: Config = toml::from_str(MINIMAL_CONFIG).unwrap();
        assert_eq!(expected, actual);

        let engine = actual.engine_config().unwrap();
        assert_eq!(engine.profile, Profile::Standard);
        assert_eq!(engine.path_delay.mode, PdelayMode::Standard);
        assert_eq!(engine.domains[0].ports[0], gptp::config::PortConfig::default());
        assert_eq!(engine.domains[0].servo, ServoConfig::default());
        // locally administered, unicast
        assert_eq!(engine.clock_identity.0[0] & 0x03, 0x02);
    }

    #[test]
    fn automotive_config() {
        const CONFIG: &str = r#"
profile = "automotive"
gm-id = "00:11:22:ff:fe:33:44:55"
clock-identity = "0011223344556677"
log-level = "debug"

[automotive]
neighbor-prop-delay-mode = "silent"
initial-neighbor-prop-delay = 350

[[domain]]
domain-number = 0
clock = "/dev/ptp1"

[[domain.port]]
bind = "127.0.0.1:7000"
peer = "127.0.0.1:7001"
role = "slave"

[[domain.port]]
bind = "127.0.0.1:7002"
peer = "127.0.0.1:7003"
role = "master"

[[domain]]
domain-number = 20
clock = "overlay"

[[domain.port]]
bind = "127.0.0.1:7004"
peer = "127.0.0.1:7005"
delay-mechanism = "common-p2p"
role = "slave"

[[domain.port]]
bind = "127.0.0.1:7006"
peer = "127.0.0.1:7007"
delay-mechanism = "common-p2p"
role = "master"
"#;

        let config: Config = toml::from_str(CONFIG).unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);

        let engine = config.engine_config().unwrap();
        assert_eq!(engine.profile, Profile::Automotive);
        assert_eq!(
            engine.gm_id,
            Some(ClockIdentity([0x00, 0x11, 0x22, 0xff, 0xfe, 0x33, 0x44, 0x55]))
        );
        assert_eq!(
            engine.clock_identity,
            ClockIdentity([0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77])
        );
        assert_eq!(engine.path_delay.mode, PdelayMode::Silent);
        assert_eq!(engine.domains[0].clock_target, ClockTarget::Hardware(1));
        assert_eq!(engine.domains[1].clock_target, ClockTarget::Virtual);
        assert_eq!(engine.domains[1].ports[0].role, PortRole::Slave);
        assert_eq!(
            engine.domains[1].ports[0].delay_mechanism,
            DelayMechanism::CommonP2P
        );

        let seeds = config.initial_path_delays();
        assert_eq!(seeds.len(), 4);
        assert_eq!(seeds.get(&(20, 1)), Some(&Duration::from_nanos(350)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let config = format!("{MINIMAL_CONFIG}\npriority3 = 1\n");
        assert!(toml::from_str::<Config>(&config).is_err());
    }

    #[test]
    fn invalid_clock() {
        let config = MINIMAL_CONFIG.replace(
            "domain-number = 0",
            "domain-number = 0\nclock = \"/dev/rtc0\"",
        );
        assert!(toml::from_str::<Config>(&config).is_err());
    }

    #[test]
    fn engine_errors_name_the_key() {
        let config = MINIMAL_CONFIG.replace(
            "peer = \"127.0.0.1:7001\"",
            "peer = \"127.0.0.1:7001\"\ninitial-log-sync-interval = 9",
        );
        let config: Config = toml::from_str(&config).unwrap();

        let Err(ConfigFileError::Invalid(error)) = config.engine_config() else {
            panic!("expected a validation error");
        };
        assert_eq!(error.section(), Section::Port { domain: 0, port: 0 });
        assert_eq!(error.key(), "initial-log-sync-interval");
    }

    #[test]
    fn automotive_requires_gm_id() {
        let config = format!("profile = \"automotive\"\n{MINIMAL_CONFIG}");
        let config: Config = toml::from_str(&config).unwrap();

        assert!(matches!(
            config.engine_config(),
            Err(ConfigFileError::Invalid(gptp::config::ConfigError::Missing {
                key: "gm-id",
                ..
            }))
        ));
    }
}
