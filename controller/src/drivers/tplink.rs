//! TP-Link Easy Smart (TL-SG108E) web management driver.
//!
//! Plain form login; the session lives in the client's cookie jar.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, ORIGIN, REFERER};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use tracing::debug;
use url::Url;

use crate::drivers::{settle_reboot, DeviceDriver, DeviceEndpoint, RebootOutcome, Session, ACCEPT_HTML};
use crate::errors::FleetError;
use crate::models::device::DeviceModel;
use crate::probe::Prober;

const HTTP_TIMEOUT: Duration = Duration::from_secs(2);
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

struct TplinkUrls {
    origin: String,
    root: Url,
    logon: Url,
    reboot: Url,
    reboot_page: Url,
}

pub struct TplinkDriver {
    endpoint: DeviceEndpoint,
    prober: Arc<dyn Prober>,
    urls: TplinkUrls,
}

impl TplinkDriver {
    pub fn new(endpoint: DeviceEndpoint, prober: Arc<dyn Prober>) -> Result<Self, FleetError> {
        let root = endpoint.base_url()?;
        let join = |path: &str| {
            root.join(path)
                .map_err(|e| FleetError::Config(format!("{}: {}", endpoint.name, e)))
        };
        let urls = TplinkUrls {
            origin: format!("http://{}", endpoint.address),
            logon: join("logon.cgi")?,
            reboot: join("reboot.cgi")?,
            reboot_page: join("SystemRebootRpm.htm")?,
            root: root.clone(),
        };
        Ok(Self {
            endpoint,
            prober,
            urls,
        })
    }
}

#[async_trait]
impl DeviceDriver for TplinkDriver {
    fn model(&self) -> DeviceModel {
        DeviceModel::TplinkSg108e
    }

    async fn authenticate(&self) -> Result<Session, FleetError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| FleetError::Internal(format!("http client: {}", e)))?;

        // Prime the cookie jar the way a browser landing on the UI would.
        client
            .get(self.urls.root.clone())
            .header(ACCEPT, ACCEPT_HTML)
            .header("Upgrade-Insecure-Requests", "1")
            .send()
            .await
            .map_err(FleetError::from_reqwest)?;

        let credentials = &self.endpoint.credentials;
        let form = [
            ("username", credentials.username.as_str()),
            ("password", credentials.password.expose_secret()),
            ("cpassword", ""),
            ("logon", "Login"),
        ];
        let response = client
            .post(self.urls.logon.clone())
            .header(ORIGIN, &self.urls.origin)
            .header(REFERER, self.urls.root.as_str())
            .header(ACCEPT, ACCEPT_HTML)
            .header("Upgrade-Insecure-Requests", "1")
            .form(&form)
            .send()
            .await
            .map_err(FleetError::from_reqwest)?;

        let status = response.status();
        debug!("{}: logon.cgi answered {}", self.endpoint.name, status);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FleetError::Auth(format!(
                "{}: login rejected ({})",
                self.endpoint.name, status
            ))),
            s if s == StatusCode::OK || s.is_redirection() => Ok(Session::new(client)),
            s => Err(FleetError::Protocol(format!("unexpected login status: {}", s))),
        }
    }

    async fn reboot(&self, session: &mut Session) -> Result<RebootOutcome, FleetError> {
        let result = session
            .client
            .post(self.urls.reboot.clone())
            .header(CONTENT_TYPE, FORM_URLENCODED)
            .header(ORIGIN, &self.urls.origin)
            .header(REFERER, self.urls.reboot_page.as_str())
            .header(ACCEPT, ACCEPT_HTML)
            .header("Upgrade-Insecure-Requests", "1")
            .body("reboot_op=reboot&save_op=false")
            .send()
            .await;

        settle_reboot(result, &self.endpoint, self.prober.as_ref()).await
    }
}
