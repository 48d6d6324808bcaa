#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::Ipv4Addr;
use std::time::Duration;

use hoptrace::config::{TraceConfig, TraceOptions};
use hoptrace::dns::Resolver;
use hoptrace::error::TraceError;
use hoptrace::probe::{ProbeOutcome, Prober};

pub const DESTINATION: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeCall {
    pub destination: Ipv4Addr,
    pub ttl: u8,
    pub payload_size: usize,
    pub timeout: Duration,
}

/// Answers probes from a per-TTL script; anything unscripted times out.
#[derive(Default)]
pub struct ScriptedProber {
    script: HashMap<u8, VecDeque<ProbeOutcome>>,
    fail_at_ttl: Option<u8>,
    pub calls: Vec<ProbeCall>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, ttl: u8, outcome: ProbeOutcome) -> Self {
        self.script.entry(ttl).or_default().push_back(outcome);
        self
    }

    pub fn fail_at(mut self, ttl: u8) -> Self {
        self.fail_at_ttl = Some(ttl);
        self
    }
}

impl Prober for ScriptedProber {
    fn probe(
        &mut self,
        destination: Ipv4Addr,
        ttl: u8,
        payload_size: usize,
        timeout: Duration,
    ) -> Result<ProbeOutcome, TraceError> {
        self.calls.push(ProbeCall {
            destination,
            ttl,
            payload_size,
            timeout,
        });
        if self.fail_at_ttl == Some(ttl) {
            return Err(TraceError::Transport(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "operation not permitted",
            )));
        }
        Ok(self
            .script
            .get_mut(&ttl)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ProbeOutcome::Timeout))
    }
}

pub struct StaticResolver(pub Ipv4Addr);

impl Resolver for StaticResolver {
    fn resolve(&self, _target: &str) -> Result<Ipv4Addr, TraceError> {
        Ok(self.0)
    }
}

pub fn reply(last_octet: u8, millis: u64) -> ProbeOutcome {
    ProbeOutcome::reply(Ipv4Addr::new(10, 0, 0, last_octet), Duration::from_millis(millis))
}

pub fn destination_reply(millis: u64) -> ProbeOutcome {
    ProbeOutcome::reply(DESTINATION, Duration::from_millis(millis))
}

pub fn config(max_ttl: u16, probes_per_hop: u32) -> TraceConfig {
    TraceOptions {
        destination: "dns.google".to_owned(),
        max_ttl,
        probes_per_hop,
        delay_between_probes: Duration::ZERO,
        ..TraceOptions::default()
    }
    .resolve(&StaticResolver(DESTINATION))
    .unwrap()
}
