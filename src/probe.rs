use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::Serialize;

use crate::error::TraceError;

/// Result of a single probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Reply {
        responder: IpAddr,
        #[serde(rename = "rtt_ms", serialize_with = "serialize_millis")]
        rtt: Duration,
    },
    Timeout,
}

impl ProbeOutcome {
    pub fn reply(responder: impl Into<IpAddr>, rtt: Duration) -> Self {
        ProbeOutcome::Reply {
            responder: responder.into(),
            rtt,
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, ProbeOutcome::Reply { .. })
    }
}

/// Sends one TTL-limited echo request and waits for whatever answers it.
///
/// Implementations must put exactly `payload_size` bytes behind the ICMP header,
/// must not block longer than `timeout`, and report an unanswered probe as
/// [`ProbeOutcome::Timeout`]. `Err` is reserved for transport failures that end the trace.
pub trait Prober {
    fn probe(
        &mut self,
        destination: Ipv4Addr,
        ttl: u8,
        payload_size: usize,
        timeout: Duration,
    ) -> Result<ProbeOutcome, TraceError>;
}

impl<P: Prober + ?Sized> Prober for &mut P {
    fn probe(
        &mut self,
        destination: Ipv4Addr,
        ttl: u8,
        payload_size: usize,
        timeout: Duration,
    ) -> Result<ProbeOutcome, TraceError> {
        (**self).probe(destination, ttl, payload_size, timeout)
    }
}

pub(crate) fn serialize_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}
