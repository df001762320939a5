//! Reachability probing.
//!
//! TCP probes are pure async connects; ICMP echo shells out to the platform
//! `ping` since raw sockets need privileges the controller does not hold.

use std::net::SocketAddr;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::debug;

/// How a host is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum ProbeMethod {
    /// TCP connect to a port
    Tcp { port: u16 },

    /// Single ICMP echo
    Icmp,
}

/// "Is this host answering" check, bounded by a timeout.
///
/// Probe failures are data, not errors, so the result is a plain bool.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn is_reachable(&self, host: &str, method: ProbeMethod, timeout: Duration) -> bool;
}

/// Prober backed by real sockets and the system `ping`
#[derive(Debug, Clone, Default)]
pub struct NetworkProber;

#[async_trait]
impl Prober for NetworkProber {
    async fn is_reachable(&self, host: &str, method: ProbeMethod, timeout: Duration) -> bool {
        match method {
            ProbeMethod::Tcp { port } => tcp_connect(host, port, timeout).await,
            ProbeMethod::Icmp => icmp_echo(host, timeout).await,
        }
    }
}

async fn tcp_connect(host: &str, port: u16, timeout: Duration) -> bool {
    let target = match host.parse::<std::net::IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port).to_string(),
        Err(_) => format!("{}:{}", host, port),
    };
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(&target)).await,
        Ok(Ok(_))
    )
}

async fn icmp_echo(host: &str, timeout: Duration) -> bool {
    let mut cmd = Command::new("ping");
    if cfg!(windows) {
        cmd.args(["-n", "1", "-w", &timeout.as_millis().to_string(), host]);
    } else {
        let secs = timeout.as_secs().max(1);
        cmd.args(["-c", "1", "-W", &secs.to_string(), host]);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    // Allow the child a little longer than its own deadline before giving up.
    let budget = timeout + Duration::from_secs(1);
    match tokio::time::timeout(budget, cmd.status()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            debug!("ping {} could not run: {}", host, e);
            false
        }
        Err(_) => false,
    }
}

/// Poll until `host` answers or `budget` runs out.
pub async fn wait_until_reachable(
    prober: &dyn Prober,
    host: &str,
    method: ProbeMethod,
    probe_timeout: Duration,
    budget: Duration,
    retry_delay: Duration,
) -> bool {
    let deadline = Instant::now() + budget;
    loop {
        if prober.is_reachable(host, method, probe_timeout).await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(retry_delay).await;
    }
}

/// Split `host:port` into its host part; bare hosts are returned unchanged.
pub fn host_part(address: &str) -> &str {
    match address.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>().is_ok() && !host.contains(':') => host,
        _ => address,
    }
}
