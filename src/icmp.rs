use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use log::{debug, trace};
use pnet::packet::{
    icmp::{
        checksum as icmp_checksum,
        echo_reply::EchoReplyPacket,
        echo_request::{EchoRequestPacket, MutableEchoRequestPacket},
        IcmpCode, IcmpPacket, IcmpTypes,
    },
    ip::IpNextHeaderProtocols,
    ipv4::{checksum as ipv4_checksum, Ipv4Packet, MutableIpv4Packet},
    Packet,
};
use pnet::transport::TransportChannelType::Layer3;
use pnet::transport::{icmp_packet_iter, transport_channel, TransportReceiver, TransportSender};

use crate::config::MAX_WAIT;
use crate::error::TraceError;
use crate::probe::{ProbeOutcome, Prober};

pub const IPV4_HEADER_LEN: usize = 20;
pub const ICMP_HEADER_LEN: usize = 8;
/// Byte the echo payload is filled with.
pub const PAYLOAD_FILL: u8 = b'X';

const RECV_BUFFER_SIZE: usize = 4096;
// socket timeouts below this round down to "block forever"
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Builds an IPv4 datagram carrying an ICMP echo request with `payload_size` bytes of payload.
/// `None` if the payload does not fit into a single datagram.
pub fn create_icmp_packet(
    dest: Ipv4Addr,
    ttl: u8,
    identifier: u16,
    sequence_number: u16,
    payload_size: usize,
) -> Option<Vec<u8>> {
    let icmp_len = ICMP_HEADER_LEN + payload_size;
    let total_len = u16::try_from(IPV4_HEADER_LEN + icmp_len).ok()?;

    let mut buf_icmp = vec![0u8; icmp_len];
    let mut icmp_packet = MutableEchoRequestPacket::new(&mut buf_icmp)?;
    icmp_packet.set_icmp_type(IcmpTypes::EchoRequest);
    icmp_packet.set_icmp_code(IcmpCode::new(0));
    icmp_packet.set_identifier(identifier);
    icmp_packet.set_sequence_number(sequence_number);
    icmp_packet.set_payload(&vec![PAYLOAD_FILL; payload_size]);
    let checksum = icmp_checksum(&IcmpPacket::new(icmp_packet.packet())?);
    icmp_packet.set_checksum(checksum);

    let mut buf_ip = vec![0u8; total_len as usize];
    let mut ipv4_packet = MutableIpv4Packet::new(&mut buf_ip)?;
    ipv4_packet.set_version(4);
    ipv4_packet.set_header_length((IPV4_HEADER_LEN / 4) as u8);
    ipv4_packet.set_total_length(total_len);
    ipv4_packet.set_identification(sequence_number);
    ipv4_packet.set_ttl(ttl);
    ipv4_packet.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
    ipv4_packet.set_destination(dest);
    ipv4_packet.set_payload(icmp_packet.packet());
    let checksum = ipv4_checksum(&ipv4_packet.to_immutable());
    ipv4_packet.set_checksum(checksum);

    Some(buf_ip)
}

/// When to give up on a probe sent at `sent_at`. Waits are capped at [`MAX_WAIT`].
pub fn probe_deadline(sent_at: Instant, timeout: Duration) -> Instant {
    sent_at + timeout.min(MAX_WAIT)
}

/// Looks at a received IPv4 datagram and returns the responder if it answers the
/// probe identified by `identifier`/`sequence_number`.
///
/// Echo replies come from the destination itself. Time exceeded and destination
/// unreachable messages quote the start of our request, which is where the ids are read from.
pub fn match_reply(
    datagram: &[u8],
    source: IpAddr,
    identifier: u16,
    sequence_number: u16,
) -> Option<IpAddr> {
    let icmp = IcmpPacket::new(strip_ipv4_header(datagram)?)?;

    let ids = match icmp.get_icmp_type() {
        IcmpTypes::EchoReply => {
            let reply = EchoReplyPacket::new(icmp.packet())?;
            (reply.get_identifier(), reply.get_sequence_number())
        }
        IcmpTypes::TimeExceeded | IcmpTypes::DestinationUnreachable => {
            let quoted = strip_ipv4_header(icmp.packet().get(ICMP_HEADER_LEN..)?)?;
            let request = EchoRequestPacket::new(quoted)?;
            if request.get_icmp_type() != IcmpTypes::EchoRequest {
                return None;
            }
            (request.get_identifier(), request.get_sequence_number())
        }
        other => {
            trace!("Ignoring ICMP type {:?} from {}", other, source);
            return None;
        }
    };

    if ids == (identifier, sequence_number) {
        Some(source)
    } else {
        trace!("Ignoring reply from {} for id/seq {:?}", source, ids);
        None
    }
}

fn strip_ipv4_header(datagram: &[u8]) -> Option<&[u8]> {
    let header = Ipv4Packet::new(datagram)?;
    let len = header.get_header_length() as usize * 4;
    if len < IPV4_HEADER_LEN {
        return None;
    }
    datagram.get(len..)
}

/// [`Prober`] sending real ICMP echo requests through a raw IPv4 socket.
/// Needs root or `CAP_NET_RAW`.
pub struct IcmpProber {
    tx: TransportSender,
    rx: TransportReceiver,
    identifier: u16,
    next_sequence: u16,
}

impl IcmpProber {
    pub fn new() -> Result<Self, TraceError> {
        let (tx, rx) = transport_channel(RECV_BUFFER_SIZE, Layer3(IpNextHeaderProtocols::Icmp))?;
        Ok(Self {
            tx,
            rx,
            identifier: std::process::id() as u16,
            next_sequence: 0,
        })
    }

    fn wait_for_reply(
        &mut self,
        sequence_number: u16,
        sent_at: Instant,
        timeout: Duration,
    ) -> Result<ProbeOutcome, TraceError> {
        let deadline = probe_deadline(sent_at, timeout);
        let mut rx = icmp_packet_iter(&mut self.rx);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining < MIN_WAIT {
                return Ok(ProbeOutcome::Timeout);
            }
            match rx.next_with_timeout(remaining) {
                Ok(Some((reply, host))) => {
                    if let Some(responder) =
                        match_reply(reply.packet(), host, self.identifier, sequence_number)
                    {
                        return Ok(ProbeOutcome::reply(responder, sent_at.elapsed()));
                    }
                }
                Ok(None) => return Ok(ProbeOutcome::Timeout),
                Err(err) if is_retryable(&err) => continue,
                Err(err) => return Err(TraceError::Transport(err)),
            }
        }
    }
}

fn oversized(payload_size: usize) -> TraceError {
    TraceError::Transport(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{} byte payload does not fit into an IPv4 datagram", payload_size),
    ))
}

fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

impl Prober for IcmpProber {
    fn probe(
        &mut self,
        destination: Ipv4Addr,
        ttl: u8,
        payload_size: usize,
        timeout: Duration,
    ) -> Result<ProbeOutcome, TraceError> {
        let sequence_number = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let buf = create_icmp_packet(destination, ttl, self.identifier, sequence_number, payload_size)
            .ok_or_else(|| oversized(payload_size))?;
        let packet = Ipv4Packet::new(&buf).ok_or_else(|| oversized(payload_size))?;

        let sent_at = Instant::now();
        self.tx.send_to(packet, IpAddr::V4(destination))?;
        debug!("Sent echo request seq={} ttl={} to {}", sequence_number, ttl, destination);

        self.wait_for_reply(sequence_number, sent_at, timeout)
    }
}
