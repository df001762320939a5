//! NETGEAR Plus (GS308E/EP) web management driver.
//!
//! Login is a challenge-response: the login page carries a nonce in a hidden
//! `rand` input, the browser posts `md5(interleave(password, nonce))`. The
//! reboot trigger needs a one-time hash scraped from the dashboard.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use md5::{Digest, Md5};
use rand::Rng;
use regex::Regex;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE, COOKIE, ORIGIN, PRAGMA, REFERER, SET_COOKIE,
    USER_AGENT as USER_AGENT_HEADER,
};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::ExposeSecret;
use tracing::debug;
use url::Url;

use crate::drivers::{settle_reboot, DeviceDriver, DeviceEndpoint, RebootOutcome, Session, ACCEPT_HTML, USER_AGENT};
use crate::errors::FleetError;
use crate::models::device::DeviceModel;
use crate::probe::Prober;
use crate::utils::hex;

const HTTP_TIMEOUT: Duration = Duration::from_secs(8);
const SID_LENGTH: usize = 72;
const SID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789[]^_-`\\";

const NONCE_PATTERN: &str = r#"(?i)<input[^>]+id=["']rand["'][^>]*value=["']([^"']+)["']"#;
const KEYED_HASH_PATTERN: &str = r"(?i)\bhash\b[^0-9a-fA-F]*([0-9a-fA-F]{32})";
const ANY_HASH_PATTERN: &str = r"\b[0-9a-fA-F]{32}\b";

/// Page scrapers for the firmware's hidden tokens
pub(crate) struct Scrapers {
    nonce: Regex,
    keyed_hash: Regex,
    any_hash: Regex,
}

impl Scrapers {
    pub(crate) fn new() -> Result<Self, FleetError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| FleetError::Internal(format!("bad scraper pattern: {}", e)))
        };
        Ok(Self {
            nonce: compile(NONCE_PATTERN)?,
            keyed_hash: compile(KEYED_HASH_PATTERN)?,
            any_hash: compile(ANY_HASH_PATTERN)?,
        })
    }

    /// Login nonce from the hidden `rand` input.
    pub(crate) fn nonce(&self, page: &str) -> Option<String> {
        self.nonce.captures(page).map(|caps| caps[1].to_string())
    }

    /// The keyed `hash` value wins; otherwise any standalone 32-hex token.
    pub(crate) fn reboot_hash(&self, page: &str) -> Option<String> {
        self.keyed_hash
            .captures(page)
            .map(|caps| caps[1].to_lowercase())
            .or_else(|| self.any_hash.find(page).map(|m| m.as_str().to_lowercase()))
    }
}

struct NetgearUrls {
    origin: String,
    root: Url,
    login: Url,
    index: Url,
    dashboard: Url,
    reboot: Url,
}

pub struct NetgearDriver {
    endpoint: DeviceEndpoint,
    prober: Arc<dyn Prober>,
    urls: NetgearUrls,
    scrapers: Scrapers,
}

impl NetgearDriver {
    pub fn new(endpoint: DeviceEndpoint, prober: Arc<dyn Prober>) -> Result<Self, FleetError> {
        let root = endpoint.base_url()?;
        let join = |path: &str| {
            root.join(path)
                .map_err(|e| FleetError::Config(format!("{}: {}", endpoint.name, e)))
        };
        let urls = NetgearUrls {
            origin: format!("http://{}", endpoint.address),
            login: join("login.cgi")?,
            index: join("index.cgi")?,
            dashboard: join("dashboard.cgi")?,
            reboot: join("device_reboot.cgi")?,
            root: root.clone(),
        };
        Ok(Self {
            endpoint,
            prober,
            urls,
            scrapers: Scrapers::new()?,
        })
    }

    /// Headers every request carries, plus the hand-rolled SID cookie.
    ///
    /// The firmware issues SIDs with backslashes which cookie jars reject,
    /// so the cookie is tracked on the session instead.
    fn browser(&self, session: &Session, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header(USER_AGENT_HEADER, USER_AGENT)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header("DNT", "1");
        match &session.cookie {
            Some(sid) => builder.header(COOKIE, format!("SID={}", sid)),
            None => builder,
        }
    }

    async fn fetch_page(&self, session: &mut Session, url: &Url, referer: &Url) -> Result<String, FleetError> {
        let request = session
            .client
            .get(url.clone())
            .header(ACCEPT, ACCEPT_HTML)
            .header("Upgrade-Insecure-Requests", "1")
            .header(ORIGIN, &self.urls.origin)
            .header(REFERER, referer.as_str());
        let response = self
            .browser(session, request)
            .send()
            .await
            .map_err(FleetError::from_reqwest)?;
        capture_sid(session, &response);
        response.text().await.map_err(FleetError::from_reqwest)
    }
}

#[async_trait]
impl DeviceDriver for NetgearDriver {
    fn model(&self) -> DeviceModel {
        DeviceModel::NetgearGs308e
    }

    async fn authenticate(&self) -> Result<Session, FleetError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| FleetError::Internal(format!("http client: {}", e)))?;
        let mut session = Session::new(client);

        // Browser warm-up; some firmware builds hand out the SID here.
        let _ = self.fetch_page(&mut session, &self.urls.login, &self.urls.root).await;
        let _ = self.fetch_page(&mut session, &self.urls.root, &self.urls.root).await;
        if session.cookie.is_none() {
            session.cookie = Some(synthesize_sid());
        }

        let page = self.fetch_page(&mut session, &self.urls.login, &self.urls.root).await?;
        let nonce = self
            .scrapers
            .nonce(&page)
            .ok_or_else(|| FleetError::Protocol(format!("{}: login page carried no nonce", self.endpoint.name)))?;
        let digest = password_digest(self.endpoint.credentials.password.expose_secret(), &nonce);

        let request = session
            .client
            .post(self.urls.login.clone())
            .header(ORIGIN, &self.urls.origin)
            .header(REFERER, self.urls.login.as_str())
            .header(ACCEPT, ACCEPT_HTML)
            .form(&[("password", digest.as_str())]);
        let response = self
            .browser(&session, request)
            .send()
            .await
            .map_err(FleetError::from_reqwest)?;
        capture_sid(&mut session, &response);
        drop(response);

        // A rejected login lands back on the login page.
        let index = self.fetch_page(&mut session, &self.urls.index, &self.urls.login).await?;
        let lowered = index.to_lowercase();
        if lowered.contains("/login.cgi") || lowered.contains("redirect to login") {
            return Err(FleetError::Auth(format!(
                "{}: login verify failed: redirected to login",
                self.endpoint.name
            )));
        }
        debug!("{}: login verified", self.endpoint.name);
        Ok(session)
    }

    async fn reboot(&self, session: &mut Session) -> Result<RebootOutcome, FleetError> {
        let request = session
            .client
            .get(self.urls.dashboard.clone())
            .header("X-Requested-With", "XMLHttpRequest")
            .header(ACCEPT, "*/*")
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .header(REFERER, self.urls.index.as_str());
        let response = self
            .browser(session, request)
            .send()
            .await
            .map_err(FleetError::from_reqwest)?;
        capture_sid(session, &response);
        let dashboard = response.text().await.map_err(FleetError::from_reqwest)?;

        let hash = self
            .scrapers
            .reboot_hash(&dashboard)
            .ok_or_else(|| FleetError::Protocol(format!("{}: no reboot hash from dashboard", self.endpoint.name)))?;

        let request = session
            .client
            .post(self.urls.reboot.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ORIGIN, &self.urls.origin)
            .header(REFERER, self.urls.index.as_str())
            .header("X-Requested-With", "XMLHttpRequest")
            .header(ACCEPT, "text/plain")
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .body(format!("hash={}", hash));
        let result = self.browser(session, request).send().await;

        settle_reboot(result, &self.endpoint, self.prober.as_ref()).await
    }
}

/// Adopt the first new `SID` the device sets.
fn capture_sid(session: &mut Session, response: &Response) {
    for value in response.headers().get_all(SET_COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        let Some(idx) = raw.find("SID=") else { continue };
        let rest = &raw[idx + 4..];
        let sid = rest.split(';').next().unwrap_or_default().trim();
        if !sid.is_empty() && session.cookie.as_deref() != Some(sid) {
            session.cookie = Some(sid.to_string());
            return;
        }
    }
}

fn synthesize_sid() -> String {
    let mut rng = rand::rng();
    (0..SID_LENGTH)
        .map(|_| SID_ALPHABET[rng.random_range(0..SID_ALPHABET.len())] as char)
        .collect()
}

/// Interleave two strings character by character; the longer tail is appended.
pub(crate) fn interleave(a: &str, b: &str) -> String {
    let mut out = String::with_capacity(a.len() + b.len());
    let mut left = a.chars();
    let mut right = b.chars();
    loop {
        match (left.next(), right.next()) {
            (None, None) => break,
            (l, r) => {
                out.extend(l);
                out.extend(r);
            }
        }
    }
    out
}

pub(crate) fn password_digest(password: &str, nonce: &str) -> String {
    hex::encode(Md5::digest(interleave(password, nonce).as_bytes()))
}
