//! Switch firmware drivers.
//!
//! Every firmware family hides its web-login handshake and reboot trigger
//! behind [`DeviceDriver`]. Handshake details stay private to each driver.

pub mod netgear;
pub mod tplink;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::SecretString;
use tracing::debug;
use url::Url;

use crate::errors::FleetError;
use crate::models::device::DeviceModel;
use crate::probe::{host_part, ProbeMethod, Prober};

pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36";
pub(crate) const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Login material for a device's web management UI
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Where a device lives and how to reach it
#[derive(Debug)]
pub struct DeviceEndpoint {
    pub name: String,

    /// Host or `host:port` of the web management UI
    pub address: String,

    pub credentials: Credentials,

    /// Probe used to confirm that a reboot took the device down
    pub probe: ProbeMethod,
    pub probe_timeout: Duration,
}

impl DeviceEndpoint {
    /// Base URL of the management UI, always with a trailing slash.
    pub fn base_url(&self) -> Result<Url, FleetError> {
        Url::parse(&format!("http://{}/", self.address))
            .map_err(|e| FleetError::Config(format!("{}: bad address {:?}: {}", self.name, self.address, e)))
    }

    pub fn host(&self) -> &str {
        host_part(&self.address)
    }
}

/// An authenticated web-management session.
///
/// Drivers that rely on a cookie jar keep state inside the client; drivers
/// that must hand-craft the cookie header use `cookie`.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) client: Client,
    pub(crate) cookie: Option<String>,
}

impl Session {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cookie: None,
        }
    }
}

/// How a reboot request concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootOutcome {
    /// The firmware answered the reboot request normally
    Accepted,

    /// The connection died after the request was sent, which rebooting
    /// firmware does legitimately. `confirmed_down` records whether a
    /// follow-up probe found the device unreachable.
    ConnectionLost { confirmed_down: bool },
}

/// Capability contract for one switch firmware family
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    fn model(&self) -> DeviceModel;

    /// Perform the firmware's login handshake.
    ///
    /// Fails with `Auth` on rejected credentials, `Transport` on network
    /// failure and `Protocol` when a page does not have the expected shape.
    async fn authenticate(&self) -> Result<Session, FleetError>;

    /// Trigger a reboot using an authenticated session.
    async fn reboot(&self, session: &mut Session) -> Result<RebootOutcome, FleetError>;
}

/// Build the driver for a firmware family.
pub fn driver_for(
    model: DeviceModel,
    endpoint: DeviceEndpoint,
    prober: Arc<dyn Prober>,
) -> Result<Arc<dyn DeviceDriver>, FleetError> {
    let driver: Arc<dyn DeviceDriver> = match model {
        DeviceModel::TplinkSg108e => Arc::new(tplink::TplinkDriver::new(endpoint, prober)?),
        DeviceModel::NetgearGs308e => Arc::new(netgear::NetgearDriver::new(endpoint, prober)?),
    };
    Ok(driver)
}

/// Decide the final outcome of a reboot POST.
///
/// A dropped or timed-out connection after the request went out counts as
/// success. Any other failure counts as success only if a fresh probe finds
/// the device already gone.
pub(crate) async fn settle_reboot(
    result: Result<reqwest::Response, reqwest::Error>,
    endpoint: &DeviceEndpoint,
    prober: &dyn Prober,
) -> Result<RebootOutcome, FleetError> {
    let error = match result {
        Ok(response) => {
            let status = response.status();
            if status.is_success() || status.is_redirection() {
                return Ok(RebootOutcome::Accepted);
            }
            FleetError::Protocol(format!("reboot failed: {}", status))
        }
        Err(e) => FleetError::from_reqwest(e),
    };

    let reachable = prober
        .is_reachable(endpoint.host(), endpoint.probe, endpoint.probe_timeout)
        .await;
    debug!(
        "{}: reboot request ended with '{}', device reachable={}",
        endpoint.name, error, reachable
    );

    match error.transport_kind() {
        Some(kind) if kind.is_drop_or_timeout() => Ok(RebootOutcome::ConnectionLost {
            confirmed_down: !reachable,
        }),
        _ if !reachable => Ok(RebootOutcome::ConnectionLost {
            confirmed_down: true,
        }),
        _ => Err(error),
    }
}
