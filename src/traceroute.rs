use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::thread;
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;

use crate::config::TraceConfig;
use crate::error::TraceError;
use crate::probe::{serialize_millis, ProbeOutcome, Prober};

/// Aggregate over all probes sent with one TTL.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HopResult {
    ttl: u8,
    outcomes: Vec<ProbeOutcome>,
    #[serde(rename = "avg_rtt_ms", serialize_with = "serialize_opt_millis")]
    avg_rtt: Option<Duration>,
    loss_pct: f64,
    responder: Option<IpAddr>,
}

impl HopResult {
    /// Finalizes a hop from its outcomes, in probe order.
    /// The responder is the one of the last reply.
    pub fn from_outcomes(ttl: u8, outcomes: Vec<ProbeOutcome>) -> Self {
        let mut rtt_sum = Duration::ZERO;
        let mut replies: u32 = 0;
        let mut responder = None;

        for outcome in &outcomes {
            if let ProbeOutcome::Reply { responder: addr, rtt } = outcome {
                rtt_sum += *rtt;
                replies += 1;
                responder = Some(*addr);
            }
        }

        let avg_rtt = if replies > 0 { Some(rtt_sum / replies) } else { None };
        let loss_pct = if outcomes.is_empty() {
            100.0
        } else {
            100.0 * (outcomes.len() - replies as usize) as f64 / outcomes.len() as f64
        };

        Self {
            ttl,
            outcomes,
            avg_rtt,
            loss_pct,
            responder,
        }
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    pub fn outcomes(&self) -> &[ProbeOutcome] {
        &self.outcomes
    }

    /// Mean RTT over the replies, `None` if nothing answered.
    pub fn avg_rtt(&self) -> Option<Duration> {
        self.avg_rtt
    }

    pub fn loss_pct(&self) -> f64 {
        self.loss_pct
    }

    pub fn responder(&self) -> Option<IpAddr> {
        self.responder
    }

    pub fn replies(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_reply()).count()
    }

    pub fn timeouts(&self) -> usize {
        self.outcomes.len() - self.replies()
    }

    pub fn is_destination(&self, destination: Ipv4Addr) -> bool {
        self.responder == Some(IpAddr::V4(destination))
    }
}

/// Completed trace, hops ordered by TTL starting at 1.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TraceReport {
    destination: String,
    address: Ipv4Addr,
    max_ttl: u8,
    hops: Vec<HopResult>,
    reached: bool,
}

impl TraceReport {
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn max_ttl(&self) -> u8 {
        self.max_ttl
    }

    pub fn hops(&self) -> &[HopResult] {
        &self.hops
    }

    pub fn reached(&self) -> bool {
        self.reached
    }
}

pub struct Tracer<P> {
    prober: P,
}

impl<P: Prober> Tracer<P> {
    pub fn new(prober: P) -> Self {
        Self { prober }
    }

    pub fn into_prober(self) -> P {
        self.prober
    }

    pub fn run(&mut self, config: &TraceConfig) -> Result<TraceReport, TraceError> {
        self.trace(config, |_| Ok(()))
    }

    /// Runs the hop loop, handing every finished hop to `on_hop` before moving to the next TTL.
    ///
    /// Stops after the hop whose last responder is the destination, or after `max_ttl`.
    /// A transport failure, or an error from `on_hop`, aborts the trace and no partial
    /// report is returned.
    pub fn trace<F>(&mut self, config: &TraceConfig, mut on_hop: F) -> Result<TraceReport, TraceError>
    where
        F: FnMut(&HopResult) -> io::Result<()>,
    {
        let destination = config.destination();
        let mut hops = Vec::with_capacity(config.max_ttl() as usize);
        let mut reached = false;

        for ttl in 1..=config.max_ttl() {
            let hop = self.probe_hop(config, ttl)?;
            debug!(
                "Hop {}: responder {:?}, loss {:.2}%",
                ttl,
                hop.responder(),
                hop.loss_pct()
            );
            on_hop(&hop).map_err(TraceError::Output)?;

            reached = hop.is_destination(destination);
            hops.push(hop);
            if reached {
                info!("Reached {} after {} hops", destination, ttl);
                break;
            }
        }

        if !reached {
            info!(
                "{} not reached within {} hops",
                destination,
                config.max_ttl()
            );
        }

        Ok(TraceReport {
            destination: config.destination_name().to_owned(),
            address: destination,
            max_ttl: config.max_ttl(),
            hops,
            reached,
        })
    }

    fn probe_hop(&mut self, config: &TraceConfig, ttl: u8) -> Result<HopResult, TraceError> {
        let mut outcomes = Vec::with_capacity(config.probes_per_hop());

        for _ in 0..config.probes_per_hop() {
            let outcome = self.prober.probe(
                config.destination(),
                ttl,
                config.packet_size(),
                config.timeout(),
            )?;
            debug!("ttl={} {:?}", ttl, outcome);
            outcomes.push(outcome);

            if !config.delay_between_probes().is_zero() {
                thread::sleep(config.delay_between_probes());
            }
        }

        Ok(HopResult::from_outcomes(ttl, outcomes))
    }
}

fn serialize_opt_millis<S: serde::Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(duration) => serialize_millis(duration, serializer),
        None => serializer.serialize_none(),
    }
}
