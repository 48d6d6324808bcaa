use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use flexi_logger::{colored_default_format, Logger, LoggerHandle};
use log::{info, Level};

use hoptrace::config::{TraceOptions, DEFAULT_MAX_TTL, DEFAULT_PACKET_SIZE, DEFAULT_PROBES_PER_HOP};
use hoptrace::dns::DnsResolver;
use hoptrace::icmp::IcmpProber;
use hoptrace::report::{self, DEFAULT_OUTPUT_FILE};
use hoptrace::traceroute::Tracer;

/// ICMP traceroute reporting per-hop latency and packet loss
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Host name or IPv4 address to trace
    destination: String,

    /// Maximum number of hops (1-255)
    #[arg(short = 'm', long, env = "HOPTRACE_MAX_TTL", default_value_t = DEFAULT_MAX_TTL)]
    max_ttl: u16,

    /// ICMP payload size in bytes
    #[arg(short = 's', long, env = "HOPTRACE_PACKET_SIZE", default_value_t = DEFAULT_PACKET_SIZE, allow_hyphen_values = true)]
    packet_size: i64,

    /// Seconds to wait for each reply
    #[arg(short = 'w', long, env = "HOPTRACE_TIMEOUT", default_value = "2", value_parser = parse_seconds)]
    timeout: Duration,

    /// Probes sent per hop
    #[arg(short = 'p', long = "probes", env = "HOPTRACE_PROBES", default_value_t = DEFAULT_PROBES_PER_HOP)]
    probes_per_hop: u32,

    /// Seconds to pause after each probe
    #[arg(short = 'z', long = "delay", env = "HOPTRACE_DELAY", default_value = "0.5", value_parser = parse_seconds)]
    delay_between_probes: Duration,

    /// Also write the text report to FILE (`-o` alone writes tracert_output.txt)
    #[arg(short, long, value_name = "FILE", num_args = 0..=1, require_equals = true, default_missing_value = DEFAULT_OUTPUT_FILE)]
    output: Option<PathBuf>,

    /// Print the report as JSON once the trace is done
    #[arg(long)]
    json: bool,

    #[clap(flatten)]
    verbose: Verbosity<WarnLevel>,
}

impl Cli {
    fn options(&self) -> TraceOptions {
        TraceOptions {
            destination: self.destination.clone(),
            max_ttl: self.max_ttl,
            packet_size: self.packet_size,
            timeout: self.timeout,
            probes_per_hop: self.probes_per_hop,
            delay_between_probes: self.delay_between_probes,
        }
    }
}

fn parse_seconds(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .parse()
        .map_err(|_| format!("`{}` is not a number of seconds", raw))?;
    Duration::try_from_secs_f64(secs).map_err(|err| format!("`{}`: {}", raw, err))
}

fn configure_logging(verbose: &Verbosity<WarnLevel>) -> Result<LoggerHandle> {
    let cli_level = verbose.log_level().unwrap_or(Level::Error);

    Logger::try_with_env_or_str(cli_level.to_string())
        .context("Failed to parse logger spec from env RUST_LOG or cli level")?
        .format(colored_default_format)
        .start()
        .context("Failed to start logger")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logger = configure_logging(&cli.verbose)?;

    let config = cli
        .options()
        .resolve(&DnsResolver)
        .with_context(|| format!("Cannot trace {}", cli.destination))?;
    info!(
        "Worst case duration for this trace: {:?}",
        config.worst_case_duration()
    );

    let prober = IcmpProber::new()
        .context("Failed to open raw ICMP socket (root or CAP_NET_RAW required)")?;
    let mut tracer = Tracer::new(prober);

    let trace_report = if cli.json {
        let trace_report = tracer.run(&config)?;
        println!("{}", report::render_json(&trace_report)?);
        trace_report
    } else {
        let mut stdout = io::stdout().lock();
        report::write_header(
            &mut stdout,
            config.destination_name(),
            config.destination(),
            config.max_ttl(),
        )?;

        let trace_report = tracer.trace(&config, |hop| {
            report::write_hop(&mut stdout, hop)?;
            stdout.flush()
        })?;
        report::write_footer(&mut stdout, &trace_report)?;
        trace_report
    };

    if let Some(path) = &cli.output {
        report::save(&trace_report, path)
            .with_context(|| format!("Failed to write report to {:?}", path))?;
        info!("Report written to {:?}", path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_map_onto_trace_options() {
        let cli = Cli::try_parse_from(["hoptrace", "example.com"]).unwrap();
        let options = cli.options();

        assert_eq!(options.destination, "example.com");
        assert_eq!(options.max_ttl, 30);
        assert_eq!(options.packet_size, 64);
        assert_eq!(options.timeout, Duration::from_secs(2));
        assert_eq!(options.probes_per_hop, 3);
        assert_eq!(options.delay_between_probes, Duration::from_millis(500));
        assert_eq!(cli.output, None);
        assert!(!cli.json);
    }

    #[test]
    fn short_flags_map_onto_trace_options() {
        let cli = Cli::try_parse_from([
            "hoptrace", "-m", "12", "-s", "-1", "-w", "0.25", "-p", "5", "-z", "0", "-q",
            "8.8.8.8",
        ])
        .unwrap();
        let options = cli.options();

        assert_eq!(options.destination, "8.8.8.8");
        assert_eq!(options.max_ttl, 12);
        assert_eq!(options.packet_size, -1);
        assert_eq!(options.timeout, Duration::from_millis(250));
        assert_eq!(options.probes_per_hop, 5);
        assert_eq!(options.delay_between_probes, Duration::ZERO);
    }

    #[test]
    fn output_file_needs_equals_sign() {
        let cli = Cli::try_parse_from(["hoptrace", "-o", "example.com"]).unwrap();
        assert_eq!(cli.destination, "example.com");
        assert_eq!(cli.output, Some(PathBuf::from(DEFAULT_OUTPUT_FILE)));

        let cli = Cli::try_parse_from(["hoptrace", "--output=trace.txt", "example.com"]).unwrap();
        assert_eq!(cli.output, Some(PathBuf::from("trace.txt")));
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("0.5"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_seconds("2"), Ok(Duration::from_secs(2)));
        assert_eq!(parse_seconds("0"), Ok(Duration::ZERO));
        assert!(parse_seconds("-1").is_err());
        assert!(parse_seconds("NaN").is_err());
        assert!(parse_seconds("inf").is_err());
        assert!(parse_seconds("soon").is_err());
    }
}
