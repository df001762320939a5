//! Subnet scanner for SSH-reachable provisioning targets.
//!
//! Probes every host address concurrently through a [`Prober`], bounded by a
//! semaphore so the local interface is not flooded. Results fan in through a
//! channel and come back in discovery order.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use ipnet::Ipv4Net;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info};

use crate::errors::FleetError;
use crate::probe::{ProbeMethod, Prober};

/// Scan tuning
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub port: u16,

    /// Per-host connect timeout
    pub timeout: Duration,

    /// Max probes in flight
    pub concurrency: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            port: 22,
            timeout: Duration::from_secs(2),
            concurrency: 128,
        }
    }
}

/// Every host address of `net`, network and broadcast excluded.
///
/// /31 and /32 have no such addresses and yield nothing.
pub fn host_addresses(net: Ipv4Net) -> Vec<Ipv4Addr> {
    if net.prefix_len() >= 31 {
        return Vec::new();
    }
    net.trunc().hosts().collect()
}

/// Scan `cidr` (e.g. `"10.0.100.0/24"`) and return hosts accepting a TCP
/// connection on the SSH port, in the order they answered.
pub async fn scan_subnet_for_ssh(
    prober: Arc<dyn Prober>,
    cidr: &str,
    options: &ScanOptions,
) -> Result<Vec<Ipv4Addr>, FleetError> {
    let net: Ipv4Net = cidr
        .trim()
        .parse()
        .map_err(|e| FleetError::Validation(format!("bad CIDR {:?}: {}", cidr, e)))?;

    let hosts = host_addresses(net);
    info!("Scanning {} hosts in {}", hosts.len(), net);
    if hosts.is_empty() {
        return Ok(Vec::new());
    }

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let (tx, mut rx) = mpsc::channel::<Ipv4Addr>(hosts.len());
    let method = ProbeMethod::Tcp { port: options.port };

    for ip in hosts {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| FleetError::Internal(format!("scan semaphore closed: {}", e)))?;
        let prober = prober.clone();
        let tx = tx.clone();
        let timeout = options.timeout;
        tokio::spawn(async move {
            let _permit = permit;
            if prober.is_reachable(&ip.to_string(), method, timeout).await {
                let _ = tx.send(ip).await;
            }
        });
    }
    drop(tx);

    let mut found = Vec::new();
    while let Some(ip) = rx.recv().await {
        debug!("SSH answered on {}", ip);
        found.push(ip);
    }

    info!("Scan complete: {} hosts found", found.len());
    Ok(found)
}

/// True for addresses that are probably the router (`.1` or `.254`).
pub fn is_likely_gateway(ip: Ipv4Addr) -> bool {
    matches!(ip.octets()[3], 1 | 254)
}

/// Move likely gateways to the end, keeping discovery order in each group.
pub fn prioritize_targets(found: &[Ipv4Addr]) -> Vec<Ipv4Addr> {
    let (mut first, last): (Vec<Ipv4Addr>, Vec<Ipv4Addr>) =
        found.iter().copied().partition(|ip| !is_likely_gateway(*ip));
    first.extend(last);
    first
}
