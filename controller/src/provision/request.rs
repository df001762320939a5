//! Provisioning forms, their defaults and validation into a runnable plan

use std::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::errors::FleetError;
use crate::models::station::StationId;
use crate::provision::netcfg::{first_ipv4, parse_ipv4, parse_mask_to_cidr};

pub const DEFAULT_DISPLAY_ID: &str = "FTA1";
pub const DEFAULT_STATION_ID: &str = "R1";
pub const DEFAULT_API_HOST: &str = "http://10.0.100.5:8080";
pub const DEFAULT_SCAN_SUBNET: &str = "10.0.100.0/24";
pub const DEFAULT_SSH_USER: &str = "admin";
pub const DEFAULT_SSH_PASS: &str = "1234Five";
pub const DEFAULT_SUBNET_MASK: &str = "255.255.255.0";
pub const DEFAULT_GATEWAY: &str = "10.0.100.2";
pub const DEFAULT_DNS: &str = "10.0.100.2";

/// Independent provisioning job kinds; one may run per class at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobClass {
    /// Kiosk browser pointed at an arena display
    Display,

    /// Station E-stop/A-stop relay agent
    StationStops,
}

impl JobClass {
    pub const ALL: [JobClass; 2] = [JobClass::Display, JobClass::StationStops];

    /// Key under which sticky parameters are stored
    pub fn store_key(self) -> &'static str {
        match self {
            JobClass::Display => "provisioning.display",
            JobClass::StationStops => "provisioning.stops",
        }
    }

    pub fn remote_log(self) -> &'static str {
        match self {
            JobClass::Display => "/var/log/rpi-setup.log",
            JobClass::StationStops => "/var/log/rpi-stops-setup.log",
        }
    }

    pub fn remote_script(self) -> &'static str {
        match self {
            JobClass::Display => "/tmp/fieldnet-display.sh",
            JobClass::StationStops => "/tmp/fieldnet-stops.sh",
        }
    }
}

impl fmt::Display for JobClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobClass::Display => f.write_str("display"),
            JobClass::StationStops => f.write_str("station stops"),
        }
    }
}

/// Submitted form fields; blanks are filled from defaults.
///
/// One shape serves both job classes; fields a class does not use stay blank.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvisionForm {
    pub display_id: String,
    pub station_id: String,
    pub api_host: String,
    pub secret: String,

    /// Pinned target; the subnet is scanned when blank
    pub host: String,
    pub scan_subnet: String,
    pub static_host: String,
    pub subnet_mask: String,
    pub gateway: String,
    pub dns: String,
    pub ssh_user: String,
    pub ssh_pass: String,
}

impl fmt::Debug for ProvisionForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionForm")
            .field("display_id", &self.display_id)
            .field("station_id", &self.station_id)
            .field("api_host", &self.api_host)
            .field("host", &self.host)
            .field("scan_subnet", &self.scan_subnet)
            .field("static_host", &self.static_host)
            .field("subnet_mask", &self.subnet_mask)
            .field("gateway", &self.gateway)
            .field("dns", &self.dns)
            .field("ssh_user", &self.ssh_user)
            .finish_non_exhaustive()
    }
}

fn fill(field: &mut String, default: &str) {
    let trimmed = field.trim();
    *field = if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    };
}

impl ProvisionForm {
    /// Trim every field and fill blanks with the class defaults.
    pub fn with_defaults(mut self, class: JobClass, station_secret: &str) -> Self {
        fill(&mut self.host, "");
        fill(&mut self.static_host, "");
        fill(&mut self.scan_subnet, DEFAULT_SCAN_SUBNET);
        fill(&mut self.subnet_mask, DEFAULT_SUBNET_MASK);
        fill(&mut self.gateway, DEFAULT_GATEWAY);
        fill(&mut self.dns, DEFAULT_DNS);
        fill(&mut self.ssh_user, DEFAULT_SSH_USER);
        fill(&mut self.ssh_pass, DEFAULT_SSH_PASS);
        match class {
            JobClass::Display => {
                fill(&mut self.display_id, DEFAULT_DISPLAY_ID);
            }
            JobClass::StationStops => {
                fill(&mut self.station_id, DEFAULT_STATION_ID);
                self.station_id = self.station_id.to_uppercase();
                fill(&mut self.api_host, DEFAULT_API_HOST);
                self.api_host = self.api_host.trim_end_matches('/').to_string();
                fill(&mut self.secret, station_secret);
            }
        }
        self
    }
}

/// Where a job looks for agents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelection {
    Host(String),
    Scan(Ipv4Net),
}

/// Role-specific parameters
pub enum RoleParams {
    Display {
        display_id: String,
        url: String,
    },
    StationStops {
        station: StationId,
        api_host: String,
        api_url: String,
        secret: SecretString,
    },
}

/// A validated run, ready for the orchestrator
pub struct ProvisionPlan {
    pub class: JobClass,
    pub target: TargetSelection,
    pub ssh_user: String,
    pub ssh_pass: SecretString,
    pub static_cidr: String,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
    pub role: RoleParams,
}

impl ProvisionPlan {
    /// Validate a defaulted form. Nothing touches the network before this passes.
    pub fn from_form(class: JobClass, form: &ProvisionForm, arena_base_url: &str) -> Result<Self, FleetError> {
        let role = match class {
            JobClass::Display => RoleParams::Display {
                url: format!(
                    "{}/display?displayId={}",
                    arena_base_url.trim_end_matches('/'),
                    form.display_id
                ),
                display_id: form.display_id.clone(),
            },
            JobClass::StationStops => {
                let station: StationId = form.station_id.parse()?;
                RoleParams::StationStops {
                    api_url: format!("{}/api/stations/{}/stops", form.api_host, station),
                    api_host: form.api_host.clone(),
                    station,
                    secret: SecretString::from(form.secret.clone()),
                }
            }
        };

        let static_host = parse_ipv4(&form.static_host).ok_or_else(|| {
            FleetError::Validation("Static IP (host) required and must be IPv4, e.g. 10.0.100.41".to_string())
        })?;
        if form.subnet_mask.trim().is_empty() {
            return Err(FleetError::Validation(
                "Subnet mask required (e.g., 255.255.255.0 or 24)".to_string(),
            ));
        }
        let prefix = parse_mask_to_cidr(&form.subnet_mask).map_err(|e| match e {
            FleetError::Validation(reason) => FleetError::Validation(format!("Invalid subnet mask: {}", reason)),
            other => other,
        })?;
        let gateway = parse_ipv4(&form.gateway).ok_or_else(|| {
            FleetError::Validation("Gateway required and must be IPv4, e.g. 10.0.100.2".to_string())
        })?;
        let dns = first_ipv4(&form.dns).ok_or_else(|| {
            FleetError::Validation("DNS required and must be IPv4, e.g. 10.0.100.2".to_string())
        })?;

        let target = if form.host.trim().is_empty() {
            let net = form
                .scan_subnet
                .trim()
                .parse::<Ipv4Net>()
                .map_err(|_| FleetError::Validation(format!("Invalid scan subnet '{}'", form.scan_subnet)))?;
            TargetSelection::Scan(net)
        } else {
            TargetSelection::Host(form.host.trim().to_string())
        };

        Ok(Self {
            class,
            target,
            ssh_user: form.ssh_user.clone(),
            ssh_pass: SecretString::from(form.ssh_pass.clone()),
            static_cidr: format!("{}/{}", static_host, prefix),
            gateway,
            dns,
            role,
        })
    }

    /// First line of the job log.
    pub fn start_line(&self) -> String {
        let (host, subnet) = match &self.target {
            TargetSelection::Host(host) => (host.clone(), String::new()),
            TargetSelection::Scan(net) => (String::new(), net.to_string()),
        };
        match &self.role {
            RoleParams::Display { url, .. } => format!(
                "Starting... URL={} host={} scanSubnet={} static={} gw={} dns={} user={}",
                url, host, subnet, self.static_cidr, self.gateway, self.dns, self.ssh_user
            ),
            RoleParams::StationStops { station, api_host, .. } => format!(
                "Starting... station={} host={} scanSubnet={} static={} gw={} dns={} api={}",
                station, host, subnet, self.static_cidr, self.gateway, self.dns, api_host
            ),
        }
    }

    /// Placeholder values for the role script.
    pub fn script_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("USER", self.ssh_user.clone()),
            ("STATIC_CIDR", self.static_cidr.clone()),
            ("GATEWAY", self.gateway.to_string()),
            ("DNS", self.dns.to_string()),
        ];
        match &self.role {
            RoleParams::Display { display_id, url } => {
                params.push(("DISPLAY_ID", display_id.clone()));
                params.push(("URL", url.clone()));
            }
            RoleParams::StationStops {
                station,
                api_url,
                secret,
                ..
            } => {
                params.push(("STATION_ID", station.to_string()));
                params.push(("API_URL", api_url.clone()));
                // pre-encoded as a JSON string literal for the agent's report body
                let secret_json = serde_json::Value::String(secret.expose_secret().to_string()).to_string();
                params.push(("SECRET_JSON", secret_json));
            }
        }
        params
    }
}
