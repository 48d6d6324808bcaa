use std::net::Ipv4Addr;
use std::time::Duration;

use crate::dns::Resolver;
use crate::error::{ConfigError, TraceError};

pub const DEFAULT_MAX_TTL: u16 = 30;
pub const DEFAULT_PACKET_SIZE: i64 = 64;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_PROBES_PER_HOP: u32 = 3;
pub const DEFAULT_DELAY_BETWEEN_PROBES: Duration = Duration::from_millis(500);

/// IPv4 datagram limit minus the 20 byte IP header and the 8 byte ICMP header.
pub const MAX_PACKET_SIZE: usize = 65_535 - 20 - 8;

/// Longest accepted probe timeout and inter-probe delay.
pub const MAX_WAIT: Duration = Duration::from_secs(3600);

/// Unvalidated trace settings, as they come from the command line.
#[derive(Clone, Debug)]
pub struct TraceOptions {
    pub destination: String,
    pub max_ttl: u16,
    pub packet_size: i64,
    pub timeout: Duration,
    pub probes_per_hop: u32,
    pub delay_between_probes: Duration,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            destination: String::new(),
            max_ttl: DEFAULT_MAX_TTL,
            packet_size: DEFAULT_PACKET_SIZE,
            timeout: DEFAULT_TIMEOUT,
            probes_per_hop: DEFAULT_PROBES_PER_HOP,
            delay_between_probes: DEFAULT_DELAY_BETWEEN_PROBES,
        }
    }
}

impl TraceOptions {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            ..Self::default()
        }
    }

    /// Validates the numeric settings, then resolves the destination.
    /// Nothing is looked up if a setting is out of range.
    pub fn resolve(&self, resolver: &impl Resolver) -> Result<TraceConfig, TraceError> {
        if self.destination.trim().is_empty() {
            return Err(ConfigError::EmptyDestination.into());
        }
        let checked = Checked::from_options(self)?;
        let address = resolver.resolve(self.destination.trim())?;
        Ok(checked.into_config(self.destination.trim().to_owned(), address))
    }
}

/// Validated settings for one trace. Only obtainable through validation.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceConfig {
    destination_name: String,
    destination: Ipv4Addr,
    max_ttl: u8,
    packet_size: usize,
    timeout: Duration,
    probes_per_hop: usize,
    delay_between_probes: Duration,
}

impl TraceConfig {
    /// Builds a config for an already resolved destination, applying the same checks as
    /// [`TraceOptions::resolve`].
    pub fn new(
        destination_name: impl Into<String>,
        destination: Ipv4Addr,
        options: &TraceOptions,
    ) -> Result<Self, ConfigError> {
        let checked = Checked::from_options(options)?;
        Ok(checked.into_config(destination_name.into(), destination))
    }

    pub fn destination_name(&self) -> &str {
        &self.destination_name
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    pub fn max_ttl(&self) -> u8 {
        self.max_ttl
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn probes_per_hop(&self) -> usize {
        self.probes_per_hop
    }

    pub fn delay_between_probes(&self) -> Duration {
        self.delay_between_probes
    }

    /// Upper bound on how long a full trace can take.
    pub fn worst_case_duration(&self) -> Duration {
        let probes = u32::try_from(self.probes_per_hop)
            .unwrap_or(u32::MAX)
            .saturating_mul(self.max_ttl as u32);
        self.timeout
            .saturating_add(self.delay_between_probes)
            .saturating_mul(probes)
    }
}

struct Checked {
    max_ttl: u8,
    packet_size: usize,
    timeout: Duration,
    probes_per_hop: usize,
    delay_between_probes: Duration,
}

impl Checked {
    fn from_options(options: &TraceOptions) -> Result<Self, ConfigError> {
        let max_ttl = match u8::try_from(options.max_ttl) {
            Ok(ttl) if ttl >= 1 => ttl,
            _ => return Err(ConfigError::InvalidMaxTtl(options.max_ttl)),
        };
        let packet_size = usize::try_from(options.packet_size)
            .map_err(|_| ConfigError::InvalidPacketSize(options.packet_size))?;
        if packet_size > MAX_PACKET_SIZE {
            return Err(ConfigError::PacketTooLarge {
                size: packet_size,
                max: MAX_PACKET_SIZE,
            });
        }
        for (name, wait) in [
            ("timeout", options.timeout),
            ("delay between probes", options.delay_between_probes),
        ] {
            if wait > MAX_WAIT {
                return Err(ConfigError::WaitTooLong {
                    name,
                    max_secs: MAX_WAIT.as_secs(),
                });
            }
        }
        if options.probes_per_hop == 0 {
            return Err(ConfigError::InvalidProbeCount);
        }

        Ok(Self {
            max_ttl,
            packet_size,
            timeout: options.timeout,
            probes_per_hop: options.probes_per_hop as usize,
            delay_between_probes: options.delay_between_probes,
        })
    }

    fn into_config(self, destination_name: String, destination: Ipv4Addr) -> TraceConfig {
        TraceConfig {
            destination_name,
            destination,
            max_ttl: self.max_ttl,
            packet_size: self.packet_size,
            timeout: self.timeout,
            probes_per_hop: self.probes_per_hop,
            delay_between_probes: self.delay_between_probes,
        }
    }
}
