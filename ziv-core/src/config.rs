//! Meter configuration
//!
//! `MeterConfig` is built once at startup, either from YAML or through
//! [`MeterConfigBuilder`], and is immutable afterwards. Both paths end in
//! [`MeterConfigBuilder::build`], which rejects settings the meter cannot
//! work with.

use crate::error::ConfigError;
use crate::register::{RegisterId, RegisterSet};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Shortest polling interval the meter keeps up with
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The meter only talks at 9600 baud
pub const REQUIRED_BAUD_RATE: u32 = 9600;

/// Default deadline for one request/response exchange
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default silence after which a partial frame is checked for completion
pub const DEFAULT_INTER_BYTE_TIMEOUT: Duration = Duration::from_millis(100);

const ONE_BYTE_ADDRESS_MAX: u16 = 0x7F;
const TWO_BYTE_ADDRESS_MAX: u16 = 0x3FFF;

/// LOW authentication value must fit a short-form BER length
pub const MAX_PASSWORD_LEN: usize = 0x7F;

/// Polling cadence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PollInterval {
    /// Only poll on an explicit trigger
    #[default]
    Never,
    Every(Duration),
}

impl PollInterval {
    pub fn period(&self) -> Option<Duration> {
        match self {
            PollInterval::Never => None,
            PollInterval::Every(d) => Some(*d),
        }
    }
}

impl FromStr for PollInterval {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("never") {
            Ok(PollInterval::Never)
        } else {
            humantime::parse_duration(s.trim())
                .map(PollInterval::Every)
                .map_err(|e| ConfigError::InvalidDuration(format!("{}: {}", s.trim(), e)))
        }
    }
}

impl TryFrom<String> for PollInterval {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PollInterval> for String {
    fn from(interval: PollInterval) -> Self {
        interval.to_string()
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollInterval::Never => f.write_str("never"),
            PollInterval::Every(d) => write!(f, "{}", humantime::format_duration(*d)),
        }
    }
}

fn default_baud_rate() -> u32 {
    REQUIRED_BAUD_RATE
}

fn default_line() -> bool {
    true
}

/// UART parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_line")]
    pub rx: bool,
    #[serde(default = "default_line")]
    pub tx: bool,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: REQUIRED_BAUD_RATE,
            rx: true,
            tx: true,
        }
    }
}

fn default_client_address() -> u16 {
    2
}

fn default_server_logical() -> u16 {
    1
}

fn default_server_physical() -> u16 {
    0x10
}

fn default_password() -> String {
    "00000001".to_string()
}

/// DLMS link addressing and LOW-level authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_client_address")]
    pub client_address: u16,
    #[serde(default = "default_server_logical")]
    pub server_logical: u16,
    #[serde(default = "default_server_physical")]
    pub server_physical: u16,
    #[serde(default = "default_password")]
    pub password: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            client_address: default_client_address(),
            server_logical: default_server_logical(),
            server_physical: default_server_physical(),
            password: default_password(),
        }
    }
}

impl LinkConfig {
    /// Check addresses against the HDLC address widths and the password length
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_address == 0 || self.client_address > ONE_BYTE_ADDRESS_MAX {
            return Err(ConfigError::InvalidAddress(format!(
                "client address {} must be within 1..={}",
                self.client_address, ONE_BYTE_ADDRESS_MAX
            )));
        }
        if self.server_logical == 0 || self.server_logical > TWO_BYTE_ADDRESS_MAX {
            return Err(ConfigError::InvalidAddress(format!(
                "server logical address {} must be within 1..={}",
                self.server_logical, TWO_BYTE_ADDRESS_MAX
            )));
        }
        if self.server_physical > TWO_BYTE_ADDRESS_MAX {
            return Err(ConfigError::InvalidAddress(format!(
                "server physical address {} exceeds {}",
                self.server_physical, TWO_BYTE_ADDRESS_MAX
            )));
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::InvalidPassword {
                length: self.password.len(),
                maximum: MAX_PASSWORD_LEN,
            });
        }
        Ok(())
    }
}

/// On-disk layout, durations in humantime notation
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MeterConfigFile {
    serial: SerialConfig,
    #[serde(default)]
    update_interval: PollInterval,
    #[serde(default)]
    registers: Vec<RegisterId>,
    #[serde(default, with = "humantime_serde")]
    response_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    inter_byte_timeout: Option<Duration>,
    #[serde(default)]
    link: LinkConfig,
}

/// Validated meter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterConfig {
    serial: SerialConfig,
    update_interval: PollInterval,
    registers: RegisterSet,
    response_timeout: Duration,
    inter_byte_timeout: Duration,
    link: LinkConfig,
}

impl MeterConfig {
    /// Start building a configuration for the meter on `port`
    pub fn builder(port: impl Into<String>) -> MeterConfigBuilder {
        MeterConfigBuilder::new(port)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let file: MeterConfigFile = serde_yml::from_str(yaml)?;

        MeterConfigBuilder {
            serial: file.serial,
            update_interval: file.update_interval,
            registers: file.registers.into_iter().collect(),
            response_timeout: file.response_timeout.unwrap_or(DEFAULT_RESPONSE_TIMEOUT),
            inter_byte_timeout: file
                .inter_byte_timeout
                .unwrap_or(DEFAULT_INTER_BYTE_TIMEOUT),
            link: file.link,
        }
        .build()
    }

    /// Read, parse and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn serial(&self) -> &SerialConfig {
        &self.serial
    }

    pub fn update_interval(&self) -> PollInterval {
        self.update_interval
    }

    /// Enabled registers, possibly empty
    pub fn registers(&self) -> &RegisterSet {
        &self.registers
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    pub fn inter_byte_timeout(&self) -> Duration {
        self.inter_byte_timeout
    }

    pub fn link(&self) -> &LinkConfig {
        &self.link
    }

    /// Log the effective configuration
    pub fn dump(&self) {
        info!("Ziv meter:");
        info!(
            "  Port: {} ({} baud, rx={}, tx={})",
            self.serial.port, self.serial.baud_rate, self.serial.rx, self.serial.tx
        );
        for register in RegisterId::ALL {
            if self.registers.contains(register) {
                info!("  Register '{}' at {}", register, register.obis());
            }
        }
        if self.registers.is_empty() {
            info!("  No registers enabled");
        }
        info!("  Update interval: {}", self.update_interval);
        info!(
            "  Response timeout: {:?}, inter-byte gap: {:?}",
            self.response_timeout, self.inter_byte_timeout
        );
        info!(
            "  Client {} -> server {}/{}",
            self.link.client_address, self.link.server_logical, self.link.server_physical
        );
    }
}

/// Builder for [`MeterConfig`]
#[derive(Debug, Clone)]
pub struct MeterConfigBuilder {
    serial: SerialConfig,
    update_interval: PollInterval,
    registers: RegisterSet,
    response_timeout: Duration,
    inter_byte_timeout: Duration,
    link: LinkConfig,
}

impl MeterConfigBuilder {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            serial: SerialConfig::new(port),
            update_interval: PollInterval::Never,
            registers: RegisterSet::new(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            inter_byte_timeout: DEFAULT_INTER_BYTE_TIMEOUT,
            link: LinkConfig::default(),
        }
    }

    pub fn serial(mut self, serial: SerialConfig) -> Self {
        self.serial = serial;
        self
    }

    pub fn update_interval(mut self, interval: PollInterval) -> Self {
        self.update_interval = interval;
        self
    }

    /// Enable one register
    pub fn register(mut self, register: RegisterId) -> Self {
        self.registers.insert(register);
        self
    }

    /// Replace the enabled set
    pub fn registers(mut self, registers: RegisterSet) -> Self {
        self.registers = registers;
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn inter_byte_timeout(mut self, timeout: Duration) -> Self {
        self.inter_byte_timeout = timeout;
        self
    }

    pub fn link(mut self, link: LinkConfig) -> Self {
        self.link = link;
        self
    }

    /// Validate and freeze the configuration
    pub fn build(self) -> Result<MeterConfig, ConfigError> {
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::MissingPort);
        }
        if self.serial.baud_rate != REQUIRED_BAUD_RATE {
            return Err(ConfigError::BaudRate(self.serial.baud_rate));
        }
        if !self.serial.rx {
            return Err(ConfigError::MissingLine("RX"));
        }
        if !self.serial.tx {
            return Err(ConfigError::MissingLine("TX"));
        }
        if let PollInterval::Every(interval) = self.update_interval {
            if interval < MIN_POLL_INTERVAL {
                return Err(ConfigError::IntervalTooShort {
                    interval,
                    minimum: MIN_POLL_INTERVAL,
                });
            }
        }
        if self.response_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("response_timeout"));
        }
        if self.inter_byte_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("inter_byte_timeout"));
        }
        self.link.validate()?;

        Ok(MeterConfig {
            serial: self.serial,
            update_interval: self.update_interval,
            registers: self.registers,
            response_timeout: self.response_timeout,
            inter_byte_timeout: self.inter_byte_timeout,
            link: self.link,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MeterConfig::builder("/dev/ttyUSB0").build().unwrap();
        assert_eq!(config.update_interval(), PollInterval::Never);
        assert!(config.registers().is_empty());
        assert_eq!(config.response_timeout(), Duration::from_secs(2));
        assert_eq!(config.inter_byte_timeout(), Duration::from_millis(100));
        assert_eq!(config.link().client_address, 2);
        assert_eq!(config.link().server_physical, 0x10);
        assert_eq!(config.link().password, "00000001");
    }

    #[test]
    fn test_interval_below_minimum_is_rejected() {
        let err = MeterConfig::builder("/dev/ttyUSB0")
            .update_interval(PollInterval::Every(Duration::from_secs(1)))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::IntervalTooShort { .. }));

        let ok = MeterConfig::builder("/dev/ttyUSB0")
            .update_interval(PollInterval::Every(MIN_POLL_INTERVAL))
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_serial_constraints() {
        let mut serial = SerialConfig::new("/dev/ttyS1");
        serial.baud_rate = 115200;
        let err = MeterConfig::builder("x").serial(serial).build().unwrap_err();
        assert!(matches!(err, ConfigError::BaudRate(115200)));

        let mut serial = SerialConfig::new("/dev/ttyS1");
        serial.tx = false;
        let err = MeterConfig::builder("x").serial(serial).build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingLine("TX")));

        let err = MeterConfig::builder("  ").build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingPort));
    }

    #[test]
    fn test_poll_interval_text() {
        let parse = |text: &str| text.parse::<PollInterval>();
        assert_eq!(parse("never").unwrap(), PollInterval::Never);
        assert_eq!(parse(" NEVER ").unwrap(), PollInterval::Never);
        assert_eq!(
            parse("30s").unwrap(),
            PollInterval::Every(Duration::from_secs(30))
        );
        assert_eq!(
            parse(" 2min ").unwrap(),
            PollInterval::Every(Duration::from_secs(120))
        );
        assert_eq!(
            parse("1min 30s").unwrap(),
            PollInterval::Every(Duration::from_secs(90))
        );
        assert!(matches!(parse("30"), Err(ConfigError::InvalidDuration(_))));
        assert!(matches!(parse("s"), Err(ConfigError::InvalidDuration(_))));

        assert_eq!(PollInterval::Every(Duration::from_secs(90)).to_string(), "1m 30s");
        assert_eq!(PollInterval::Every(Duration::from_secs(120)).to_string(), "2m");
        for interval in [
            PollInterval::Never,
            PollInterval::Every(Duration::from_secs(90)),
            PollInterval::Every(Duration::from_millis(5500)),
        ] {
            assert_eq!(parse(&interval.to_string()).unwrap(), interval);
        }
    }

    #[test]
    fn test_from_yaml_compound_durations() {
        let yaml = "serial:\n  port: /dev/ttyUSB0\nupdate_interval: 1min 30s\ninter_byte_timeout: 50ms\n";
        let config = MeterConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(
            config.update_interval(),
            PollInterval::Every(Duration::from_secs(90))
        );
        assert_eq!(config.inter_byte_timeout(), Duration::from_millis(50));
        assert_eq!(config.response_timeout(), DEFAULT_RESPONSE_TIMEOUT);

        let yaml = "serial:\n  port: /dev/ttyUSB0\nresponse_timeout: soon\n";
        assert!(matches!(
            MeterConfig::from_yaml_str(yaml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
serial:
  port: /dev/ttyUSB0
update_interval: 30s
registers: [export_active_power, import_active_energy]
response_timeout: 1500ms
"#;
        let config = MeterConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(
            config.update_interval(),
            PollInterval::Every(Duration::from_secs(30))
        );
        let order: Vec<_> = config.registers().iter().collect();
        assert_eq!(
            order,
            vec![RegisterId::ImportActiveEnergy, RegisterId::ExportActivePower]
        );
        assert_eq!(config.response_timeout(), Duration::from_millis(1500));
        assert_eq!(config.serial().baud_rate, 9600);
        assert_eq!(config.link(), &LinkConfig::default());
    }

    #[test]
    fn test_from_yaml_rejects_short_interval() {
        let yaml = "serial:\n  port: /dev/ttyUSB0\nupdate_interval: 500ms\n";
        let err = MeterConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::IntervalTooShort { .. }));
    }

    #[test]
    fn test_from_yaml_rejects_unknown_register() {
        let yaml = "serial:\n  port: /dev/ttyUSB0\nregisters: [reactive_power]\n";
        assert!(matches!(
            MeterConfig::from_yaml_str(yaml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_link_address_range() {
        let link = LinkConfig {
            client_address: 0x80,
            ..LinkConfig::default()
        };
        let err = MeterConfig::builder("/dev/ttyUSB0").link(link).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress(_)));
    }

    #[test]
    fn test_password_too_long() {
        let link = LinkConfig {
            password: "x".repeat(MAX_PASSWORD_LEN + 1),
            ..LinkConfig::default()
        };
        let err = MeterConfig::builder("/dev/ttyUSB0").link(link).build().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidPassword {
                length: 128,
                maximum: MAX_PASSWORD_LEN
            }
        ));

        let link = LinkConfig {
            password: "x".repeat(MAX_PASSWORD_LEN),
            ..LinkConfig::default()
        };
        assert!(link.validate().is_ok());
    }
}
