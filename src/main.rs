use clap::Parser;
use clap::error::ErrorKind;
use std::net::IpAddr;
use std::path::PathBuf;

use gungnir::dns::DNSResourceClass;
use gungnir::error::Result;
use gungnir::message_manager::Transport;
use gungnir::worker::{DataSource, WorkerConfig, WorkerReport, run_workers};

/// DNS query load generator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Default query class
    #[arg(short = 'C', value_name = "qclass", default_value = "IN", value_parser = parse_query_class)]
    query_class: DNSResourceClass,

    /// Input data file path; "-" means standard input
    #[arg(short = 'd', value_name = "datafile", conflicts_with = "query_data")]
    datafile: Option<String>,

    /// Set the EDNS DNSSEC OK (DO) bit
    #[arg(short = 'D', value_name = "on|off", default_value = "on", value_parser = parse_on_off, action = clap::ArgAction::Set)]
    dnssec: bool,

    /// Include an EDNS OPT record in queries
    #[arg(short = 'e', value_name = "on|off", default_value = "on", value_parser = parse_on_off, action = clap::ArgAction::Set)]
    edns: bool,

    /// Test duration in seconds
    #[arg(short = 'l', value_name = "seconds", default_value_t = 30)]
    duration: u64,

    /// Preload all queries before starting the test
    #[arg(short = 'L')]
    preload: bool,

    /// Number of parallel worker threads
    #[arg(short = 'n', value_name = "threads", default_value_t = 1)]
    threads: usize,

    /// Destination UDP/TCP port
    #[arg(short = 'p', value_name = "port", default_value_t = 53)]
    port: u16,

    /// Default transport protocol
    #[arg(short = 'P', value_name = "udp|tcp", default_value = "udp", value_parser = parse_transport)]
    protocol: Transport,

    /// Inline newline-separated query data
    #[arg(short = 'Q', value_name = "queries")]
    query_data: Option<String>,

    /// Destination server address (IPv4 or IPv6)
    #[arg(short = 's', value_name = "server_addr", default_value = "::1")]
    server: IpAddr,
}

fn parse_on_off(value: &str) -> std::result::Result<bool, String> {
    match value {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(format!("expected 'on' or 'off', got '{other}'")),
    }
}

fn parse_transport(value: &str) -> std::result::Result<Transport, String> {
    value.parse()
}

fn parse_query_class(value: &str) -> std::result::Result<DNSResourceClass, String> {
    value.parse()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Bad flag values, an unknown protocol or class, and -d with -Q are
    // all configuration errors and exit 1 like any other failure; only
    // the help and version displays exit 0.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    if let Err(e) = run(args) {
        eprintln!("Unexpected failure: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    if !args.edns && args.dnssec {
        eprintln!("warning: EDNS is disabled but the DNSSEC DO bit is on; EDNS will be included");
    }

    let source = match (&args.query_data, args.datafile.as_deref()) {
        // Accept both real newlines and shell-literal "\n" separators.
        (Some(data), _) => DataSource::Inline(data.replace("\\n", "\n")),
        (None, Some("-")) | (None, None) => DataSource::Stdin,
        (None, Some(path)) => DataSource::File(PathBuf::from(path)),
    };

    let config = WorkerConfig {
        source,
        workers: args.threads,
        server_address: args.server,
        server_port: args.port,
        protocol: args.protocol,
        query_class: args.query_class,
        use_edns: args.edns,
        use_dnssec: args.dnssec,
        duration_secs: args.duration,
        preload: args.preload,
    };

    let reports = run_workers(&config)?;
    print_report(&reports, args.threads);
    Ok(())
}

fn print_report(reports: &[WorkerReport], workers: usize) {
    for report in reports {
        println!(
            "  Worker {} queries per second: {:.6} qps",
            report.worker,
            report.stats.qps()
        );
    }
    let summed_qps: f64 = reports.iter().map(|r| r.stats.qps()).sum();
    if workers > 1 {
        println!("  Summed queries per second:    {summed_qps:.6} qps");
    }

    let sent: u64 = reports.iter().map(|r| r.stats.queries_sent).sum();
    let completed: u64 = reports.iter().map(|r| r.stats.queries_completed).sum();
    let (percent_completed, percent_lost) = if sent > 0 {
        let completed_pct = completed as f64 / sent as f64 * 100.0;
        (completed_pct, 100.0 - completed_pct)
    } else {
        (0.0, 0.0)
    };
    let started = reports.iter().map(|r| r.stats.start_time).min();
    let finished = reports.iter().map(|r| r.stats.end_time).max();

    println!();
    println!("Statistics:");
    println!();
    println!("  Queries sent:         {sent} queries");
    println!("  Queries completed:    {completed} queries");
    println!("  Percentage completed: {percent_completed:.2}%");
    println!("  Percentage lost:      {percent_lost:.2}%");
    println!();
    if let (Some(started), Some(finished)) = (started, finished) {
        println!(
            "  Started at:           {}",
            started.format("%Y-%m-%d %H:%M:%S%.6f")
        );
        println!(
            "  Finished at:          {}",
            finished.format("%Y-%m-%d %H:%M:%S%.6f")
        );
        let micros = (finished - started).num_microseconds().unwrap_or(0);
        println!("  Ran for:              {:.6} seconds", micros as f64 / 1e6);
        println!();
    }
    println!("  Queries per second:   {summed_qps:.6} qps");
}
