//! Scripted stand-ins for the network collaborators

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Semaphore;

use fieldnet::drivers::{DeviceDriver, RebootOutcome, Session};
use fieldnet::errors::{FleetError, TransportKind};
use fieldnet::models::device::DeviceModel;
use fieldnet::probe::{ProbeMethod, Prober};
use fieldnet::provision::remote::{CommandOutput, RemoteShell, ShellConnector};

/// Prober that answers from a set of "up" hosts
#[derive(Default)]
pub struct FakeProber {
    up: Mutex<HashSet<String>>,
}

impl FakeProber {
    pub fn with_up(hosts: &[&str]) -> Arc<Self> {
        let prober = Self::default();
        for host in hosts {
            prober.set_up(host, true);
        }
        Arc::new(prober)
    }

    pub fn set_up(&self, host: &str, up: bool) {
        let mut hosts = self.up.lock().unwrap();
        if up {
            hosts.insert(host.to_string());
        } else {
            hosts.remove(host);
        }
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn is_reachable(&self, host: &str, _method: ProbeMethod, _timeout: Duration) -> bool {
        self.up.lock().unwrap().contains(host)
    }
}

/// How a fake host behaves when provisioned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostBehavior {
    Healthy,
    RejectsPassword,
    UploadFails,
    DropsOnLaunch,
    Panics,
}

#[derive(Debug, Clone)]
pub struct ExecRecord {
    pub host: String,
    pub command: String,
    pub stdin: String,
}

/// Connector whose hosts follow a script
#[derive(Default)]
pub struct FakeConnector {
    behaviors: HashMap<String, HostBehavior>,
    pub connects: Mutex<Vec<String>>,
    pub execs: Arc<Mutex<Vec<ExecRecord>>>,
    pub passwords: Mutex<Vec<String>>,

    /// When set, every connect waits for a permit first
    pub gate: Option<Arc<Semaphore>>,
}

impl FakeConnector {
    pub fn new(behaviors: &[(&str, HostBehavior)]) -> Self {
        Self {
            behaviors: behaviors
                .iter()
                .map(|(host, behavior)| (host.to_string(), *behavior))
                .collect(),
            ..Default::default()
        }
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn connect_order(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }

    pub fn exec_log(&self) -> Vec<ExecRecord> {
        self.execs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShellConnector for FakeConnector {
    async fn connect(
        &self,
        host: &str,
        _user: &str,
        password: &SecretString,
    ) -> Result<Box<dyn RemoteShell>, FleetError> {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.connects.lock().unwrap().push(host.to_string());
        self.passwords.lock().unwrap().push(password.expose_secret().to_string());

        let behavior = self.behaviors.get(host).copied().unwrap_or(HostBehavior::Healthy);
        match behavior {
            HostBehavior::RejectsPassword => Err(FleetError::Auth(format!("ssh: password rejected for {}", host))),
            HostBehavior::Panics => panic!("connector exploded"),
            _ => Ok(Box::new(FakeShell {
                host: host.to_string(),
                behavior,
                execs: self.execs.clone(),
            })),
        }
    }
}

struct FakeShell {
    host: String,
    behavior: HostBehavior,
    execs: Arc<Mutex<Vec<ExecRecord>>>,
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn exec(&mut self, command: &str, stdin: &[u8]) -> Result<CommandOutput, FleetError> {
        self.execs.lock().unwrap().push(ExecRecord {
            host: self.host.clone(),
            command: command.to_string(),
            stdin: String::from_utf8_lossy(stdin).into_owned(),
        });

        if command.starts_with("bash -lc 'cat >") {
            if self.behavior == HostBehavior::UploadFails {
                return Ok(CommandOutput {
                    stderr: "cat: /tmp: Permission denied".to_string(),
                    exit_status: Some(1),
                    ..Default::default()
                });
            }
            return Ok(CommandOutput {
                stdout: "REMOTE: script uploaded".to_string(),
                exit_status: Some(0),
                ..Default::default()
            });
        }

        if self.behavior == HostBehavior::DropsOnLaunch {
            return Err(FleetError::transport(
                TransportKind::ConnectionDropped,
                "session closed before the command reported an exit status",
            ));
        }
        Ok(CommandOutput {
            stdout: "REMOTE: started".to_string(),
            exit_status: Some(0),
            ..Default::default()
        })
    }

    async fn close(&mut self) {}
}

/// Driver that records calls and returns a fixed result
pub struct FakeDriver {
    pub fail_auth: bool,
    pub calls: Mutex<Vec<&'static str>>,
}

impl FakeDriver {
    pub fn new(fail_auth: bool) -> Arc<Self> {
        Arc::new(Self {
            fail_auth,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl DeviceDriver for FakeDriver {
    fn model(&self) -> DeviceModel {
        DeviceModel::TplinkSg108e
    }

    async fn authenticate(&self) -> Result<Session, FleetError> {
        self.calls.lock().unwrap().push("authenticate");
        if self.fail_auth {
            return Err(FleetError::Auth("login rejected".to_string()));
        }
        Ok(Session::new(reqwest::Client::new()))
    }

    async fn reboot(&self, _session: &mut Session) -> Result<RebootOutcome, FleetError> {
        self.calls.lock().unwrap().push("reboot");
        Ok(RebootOutcome::Accepted)
    }
}
