use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use crate::probe::ProbeOutcome;
use crate::traceroute::{HopResult, TraceReport};

/// Where the text report goes when the user asks for a file without naming one.
pub const DEFAULT_OUTPUT_FILE: &str = "tracert_output.txt";

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

pub fn write_header<W: Write>(
    writer: &mut W,
    destination: &str,
    address: impl std::fmt::Display,
    max_ttl: u8,
) -> io::Result<()> {
    writeln!(
        writer,
        "Tracing route to {} [{}] with a maximum of {} hops:",
        destination, address, max_ttl
    )?;
    writeln!(writer)
}

/// One line per probe, then the hop summary and a blank line.
pub fn write_hop<W: Write>(writer: &mut W, hop: &HopResult) -> io::Result<()> {
    for outcome in hop.outcomes() {
        match outcome {
            ProbeOutcome::Reply { responder, rtt } => writeln!(
                writer,
                "Hop {}: {} | RTT: {:.2} ms",
                hop.ttl(),
                responder,
                millis(*rtt)
            )?,
            ProbeOutcome::Timeout => writeln!(writer, "Hop {}: Request timed out.", hop.ttl())?,
        }
    }

    match hop.avg_rtt() {
        Some(avg) => writeln!(
            writer,
            "Average RTT: {:.2} ms | Packet loss: {:.2}%",
            millis(avg),
            hop.loss_pct()
        )?,
        None => writeln!(writer, "Packet loss: 100.00%")?,
    }
    writeln!(writer)
}

pub fn write_footer<W: Write>(writer: &mut W, report: &TraceReport) -> io::Result<()> {
    if report.reached() {
        writeln!(writer, "Reached the destination.")?;
    }
    Ok(())
}

pub fn write_report<W: Write>(writer: &mut W, report: &TraceReport) -> io::Result<()> {
    write_header(writer, report.destination(), report.address(), report.max_ttl())?;
    for hop in report.hops() {
        write_hop(writer, hop)?;
    }
    write_footer(writer, report)
}

/// The full text report. Same report in, same bytes out.
pub fn render_text(report: &TraceReport) -> io::Result<String> {
    let mut buf = Vec::new();
    write_report(&mut buf, report)?;
    String::from_utf8(buf).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

pub fn render_json(report: &TraceReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Writes the text report to `path`, replacing any previous content.
pub fn save(report: &TraceReport, path: impl AsRef<Path>) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_report(&mut writer, report)?;
    writer.flush()
}
