use thiserror::Error;

/// Rejected configuration values. Raised before any probe is sent.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid TTL value {0}. Must be between 1 and 255.")]
    InvalidMaxTtl(u16),
    #[error("Packet size must be a non-negative integer, got {0}")]
    InvalidPacketSize(i64),
    #[error("Packet size {size} does not fit into an IPv4 datagram (max {max})")]
    PacketTooLarge { size: usize, max: usize },
    #[error("The {name} may not exceed {max_secs} seconds")]
    WaitTooLong { name: &'static str, max_secs: u64 },
    #[error("Probes per hop must be at least 1")]
    InvalidProbeCount,
    #[error("No destination given")]
    EmptyDestination,
}

#[derive(Error, Debug)]
pub enum TraceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to resolve {host}: {source}")]
    Resolution {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No IPv4 address found for {host}")]
    NoIpv4Address { host: String },

    /// Raw transport could not be opened, or a send/receive failed.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A finished hop could not be handed on, e.g. stdout was closed.
    #[error("Failed to emit hop result: {0}")]
    Output(#[source] std::io::Error),
}

impl TraceError {
    /// True for the errors caused by the user's input rather than the network stack.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            TraceError::Config(_) | TraceError::Resolution { .. } | TraceError::NoIpv4Address { .. }
        )
    }
}
