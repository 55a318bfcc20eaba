use std::io::Read;
use std::net::IpAddr;
use std::path::PathBuf;
use std::thread;

use tracing::error;

use crate::dispatcher::Dispatcher;
use crate::dns::DNSResourceClass;
use crate::error::{GungnirError, Result};
use crate::message_manager::Transport;
use crate::stats::SessionStats;

/// Where a worker gets its query script from. Files are reopened per
/// worker; inline data is cloned; standard input is slurped once by the
/// harness and cannot be shared by more than one worker.
#[derive(Clone, Debug)]
pub enum DataSource {
    File(PathBuf),
    Inline(String),
    Stdin,
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub source: DataSource,
    pub workers: usize,
    pub server_address: IpAddr,
    pub server_port: u16,
    pub protocol: Transport,
    pub query_class: DNSResourceClass,
    pub use_edns: bool,
    pub use_dnssec: bool,
    pub duration_secs: u64,
    pub preload: bool,
}

#[derive(Clone, Debug)]
pub struct WorkerReport {
    pub worker: usize,
    pub stats: SessionStats,
}

/// Run `config.workers` independent test sessions in parallel threads
/// and collect their statistics.
///
/// Workers share nothing: each thread builds its own repository,
/// message manager, and single-threaded runtime. A worker that fails is
/// reported on the error log and skipped; the surviving workers'
/// reports are still aggregated. An error is returned only when the
/// configuration is unusable or every worker failed.
pub fn run_workers(config: &WorkerConfig) -> Result<Vec<WorkerReport>> {
    if config.workers == 0 {
        return Err(GungnirError::Config(
            "worker count must be at least 1".to_string(),
        ));
    }

    let source = match &config.source {
        DataSource::Stdin => {
            if config.workers > 1 {
                return Err(GungnirError::Config(
                    "standard input cannot be shared by multiple workers".to_string(),
                ));
            }
            let mut data = String::new();
            std::io::stdin().read_to_string(&mut data)?;
            DataSource::Inline(data)
        }
        other => other.clone(),
    };

    let mut handles = Vec::with_capacity(config.workers);
    for worker in 0..config.workers {
        let config = WorkerConfig {
            source: source.clone(),
            ..config.clone()
        };
        let handle = thread::Builder::new()
            .name(format!("worker-{worker}"))
            .spawn(move || worker_session(&config))
            .map_err(|e| {
                GungnirError::Session(format!("failed to create a worker thread: {e}"))
            })?;
        handles.push((worker, handle));
    }

    let mut reports = Vec::with_capacity(config.workers);
    for (worker, handle) in handles {
        match handle.join() {
            Ok(Ok(stats)) => reports.push(WorkerReport { worker, stats }),
            Ok(Err(e)) => error!("Worker thread died unexpectedly: {e}"),
            Err(_) => error!("Worker thread died unexpectedly: panic"),
        }
    }
    if reports.is_empty() {
        return Err(GungnirError::Session(
            "no worker completed its session".to_string(),
        ));
    }
    Ok(reports)
}

/// One worker's whole life: build a dispatcher over a private
/// repository, apply the session configuration, and run it to
/// completion on a current-thread runtime.
fn worker_session(config: &WorkerConfig) -> Result<SessionStats> {
    let mut dispatcher = match &config.source {
        DataSource::File(path) => Dispatcher::from_file(path)?,
        DataSource::Inline(data) => Dispatcher::from_input(data.clone()),
        DataSource::Stdin => {
            return Err(GungnirError::Config(
                "standard input must be materialized before the workers start".to_string(),
            ));
        }
    };

    dispatcher.set_server_address(config.server_address)?;
    dispatcher.set_server_port(config.server_port)?;
    dispatcher.set_test_duration(config.duration_secs)?;
    dispatcher.set_protocol(config.protocol)?;
    dispatcher.set_default_query_class(config.query_class)?;
    dispatcher.set_edns(config.use_edns)?;
    dispatcher.set_dnssec(config.use_dnssec)?;
    if config.preload {
        dispatcher.load_queries()?;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| GungnirError::Session(format!("failed to build worker runtime: {e}")))?;
    runtime.block_on(dispatcher.run())?;

    dispatcher.stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn stdin_config(workers: usize) -> WorkerConfig {
        WorkerConfig {
            source: DataSource::Stdin,
            workers,
            server_address: IpAddr::V6(Ipv6Addr::LOCALHOST),
            server_port: 53,
            protocol: Transport::Udp,
            query_class: DNSResourceClass::IN,
            use_edns: true,
            use_dnssec: true,
            duration_secs: 1,
            preload: false,
        }
    }

    #[test]
    fn test_stdin_with_multiple_workers_rejected() {
        let err = run_workers(&stdin_config(2)).unwrap_err();
        assert!(matches!(err, GungnirError::Config(_)));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = run_workers(&stdin_config(0)).unwrap_err();
        assert!(matches!(err, GungnirError::Config(_)));
    }
}
