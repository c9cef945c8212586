use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::types::{Address, LocalIdentity, MAX_DISTANCE, MAX_ENTRY_VEC_LEN};

/// How ROUTE advertisements are spread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FloodingMode {
    /// One datagram to the multicast group
    #[default]
    Multicast,
    /// One datagram per neighbour, relayed hop by hop
    Unicast,
}

impl FromStr for FloodingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "multicast" => Ok(Self::Multicast),
            "unicast" => Ok(Self::Unicast),
            other => bail!("unknown flooding mode '{}'", other),
        }
    }
}

impl fmt::Display for FloodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Multicast => write!(f, "multicast"),
            Self::Unicast => write!(f, "unicast"),
        }
    }
}

/// Neighbour configured at startup, written `NAME:IP:PORT:DIST` on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticNeighbour {
    pub name: Address,
    pub ip: String,
    pub port: u16,
    pub dist: u32,
}

impl FromStr for StaticNeighbour {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        // rsplitn keeps IPv6 colons inside the ip part
        let mut parts = s.rsplitn(3, ':');
        let (Some(dist), Some(port), Some(rest)) = (parts.next(), parts.next(), parts.next())
        else {
            bail!("expected NAME:IP:PORT:DIST, got '{}'", s);
        };
        let Some((name, ip)) = rest.split_once(':') else {
            bail!("expected NAME:IP:PORT:DIST, got '{}'", s);
        };

        let mut chars = name.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            bail!("neighbour name must be one letter, got '{}'", name);
        };

        Ok(Self {
            name: Address::new(c)?,
            ip: ip.to_string(),
            port: port.parse().with_context(|| format!("invalid port '{}'", port))?,
            dist: dist.parse().with_context(|| format!("invalid distance '{}'", dist))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub name: Address,
    pub anycast: Vec<Address>,
    pub unicast_port: u16,
    pub multicast_group: Ipv4Addr,
    pub multicast_port: u16,
    /// Seconds between periodic announcements
    pub announce_period: u64,
    /// Milliseconds that must separate two announcements
    pub min_interval_ms: u64,
    /// Announce as soon as neighbours or link state change
    pub send_if_changes: bool,
    pub flooding: FloodingMode,
    pub capacity: usize,
    pub max_path_len: usize,
    pub neighbours: Vec<StaticNeighbour>,
    pub control_port: Option<u16>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            name: Address::default(),
            anycast: vec![],
            unicast_port: 20001,
            multicast_group: Ipv4Addr::new(224, 0, 0, 5),
            multicast_port: 20000,
            announce_period: 10,
            min_interval_ms: 1000,
            send_if_changes: true,
            flooding: FloodingMode::Multicast,
            capacity: 10,
            max_path_len: 26,
            neighbours: vec![],
            control_port: None,
        }
    }
}

impl RouterConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: RouterConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.announce_period == 0 {
            bail!("announce_period must be at least 1 second");
        }
        if self.capacity == 0 || self.capacity > MAX_ENTRY_VEC_LEN {
            bail!(
                "capacity must be between 1 and {} (got {})",
                MAX_ENTRY_VEC_LEN,
                self.capacity
            );
        }
        if self.max_path_len == 0 || self.max_path_len > u8::MAX as usize {
            bail!("max_path_len must be between 1 and 255 (got {})", self.max_path_len);
        }
        if self.flooding == FloodingMode::Multicast && !self.multicast_group.is_multicast() {
            bail!("{} is not a multicast address", self.multicast_group);
        }
        if self.anycast.contains(&self.name) {
            bail!("anycast aliases must differ from the local name {}", self.name);
        }
        if self.neighbours.len() > self.capacity {
            bail!(
                "{} static neighbours exceed capacity {}",
                self.neighbours.len(),
                self.capacity
            );
        }
        for n in &self.neighbours {
            if n.name == self.name {
                bail!("static neighbour {} equals the local name", n.name);
            }
            if n.dist == 0 || n.dist > MAX_DISTANCE {
                bail!("static neighbour {} has invalid distance {}", n.name, n.dist);
            }
        }
        Ok(())
    }

    pub fn identity(&self) -> LocalIdentity {
        LocalIdentity::new(self.name, self.anycast.clone())
    }

    pub fn announce_period(&self) -> Duration {
        Duration::from_secs(self.announce_period)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn multicast_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.multicast_group, self.multicast_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_is_valid() {
        let config = RouterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.announce_period(), Duration::from_secs(10));
        assert_eq!(config.min_interval(), Duration::from_millis(1000));
        assert_eq!(config.multicast_addr().to_string(), "224.0.0.5:20000");
    }

    #[test]
    fn test_save_and_load() {
        let mut config = RouterConfig::default();
        config.name = Address::new('C').unwrap();
        config.flooding = FloodingMode::Unicast;
        config.neighbours.push("B:127.0.0.1:20002:3".parse().unwrap());

        let file = NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();
        let loaded = RouterConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"name": "D", "flooding": "unicast"}"#).unwrap();

        let loaded = RouterConfig::load(file.path()).unwrap();
        assert_eq!(loaded.name, Address::new('D').unwrap());
        assert_eq!(loaded.flooding, FloodingMode::Unicast);
        assert_eq!(loaded.capacity, 10);
    }

    #[test]
    fn test_invalid_name_rejected() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"name": "a"}"#).unwrap();
        assert!(RouterConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_validate_rejections() {
        let mut config = RouterConfig::default();
        config.announce_period = 0;
        assert!(config.validate().is_err());

        let mut config = RouterConfig::default();
        config.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = RouterConfig::default();
        config.max_path_len = 300;
        assert!(config.validate().is_err());

        let mut config = RouterConfig::default();
        config.neighbours.push("B:127.0.0.1:20002:0".parse().unwrap());
        assert!(config.validate().is_err());

        let mut config = RouterConfig::default();
        config.multicast_group = Ipv4Addr::new(10, 0, 0, 1);
        assert!(config.validate().is_err());
        config.flooding = FloodingMode::Unicast;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_static_neighbour() {
        let n: StaticNeighbour = "B:127.0.0.1:5001:3".parse().unwrap();
        assert_eq!(n.name, Address::new('B').unwrap());
        assert_eq!(n.ip, "127.0.0.1");
        assert_eq!(n.port, 5001);
        assert_eq!(n.dist, 3);

        let v6: StaticNeighbour = "C:::1:5002:4".parse().unwrap();
        assert_eq!(v6.ip, "::1");

        assert!("B:127.0.0.1:5001".parse::<StaticNeighbour>().is_err());
        assert!("b:127.0.0.1:5001:3".parse::<StaticNeighbour>().is_err());
        assert!("BB:127.0.0.1:5001:3".parse::<StaticNeighbour>().is_err());
    }

    #[test]
    fn test_flooding_mode_parse() {
        assert_eq!("Unicast".parse::<FloodingMode>().unwrap(), FloodingMode::Unicast);
        assert!("broadcast".parse::<FloodingMode>().is_err());
    }
}
