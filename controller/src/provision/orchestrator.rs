//! Provisioning orchestrator.
//!
//! Each run is validated synchronously, then executed as a detached task:
//! resolve targets (pinned host or subnet scan), then for each target open a
//! shell, upload the rendered role script and launch it detached. Targets
//! are tried one at a time; failures are logged and the run moves on.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::errors::FleetError;
use crate::probe::{ProbeMethod, Prober};
use crate::provision::job::{JobSnapshot, JobState, ProvisioningJob};
use crate::provision::remote::{launch_script, upload_script, ShellConnector};
use crate::provision::request::{JobClass, ProvisionForm, ProvisionPlan, TargetSelection};
use crate::provision::script::render_role_script;
use crate::scanner::{prioritize_targets, scan_subnet_for_ssh, ScanOptions};
use crate::storage::params::KeyValueStore;
use crate::utils::generate_uuid;

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub arena_base_url: String,
    pub scan: ScanOptions,
    pub ssh_port: u16,

    /// Timeout of the reachability probe that confirms a dropped launch
    pub probe_timeout: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            arena_base_url: "http://10.0.100.5:8080".to_string(),
            scan: ScanOptions::default(),
            ssh_port: 22,
            probe_timeout: Duration::from_secs(1),
        }
    }
}

pub struct Orchestrator {
    jobs: HashMap<JobClass, Arc<ProvisioningJob>>,
    connector: Arc<dyn ShellConnector>,
    prober: Arc<dyn Prober>,
    store: Arc<dyn KeyValueStore>,
    options: OrchestratorOptions,
    station_secret: String,
}

impl Orchestrator {
    pub fn new(
        connector: Arc<dyn ShellConnector>,
        prober: Arc<dyn Prober>,
        store: Arc<dyn KeyValueStore>,
        options: OrchestratorOptions,
        station_secret: String,
    ) -> Self {
        let jobs = JobClass::ALL
            .iter()
            .map(|class| (*class, Arc::new(ProvisioningJob::new(*class))))
            .collect();
        Self {
            jobs,
            connector,
            prober,
            store,
            options,
            station_secret,
        }
    }

    fn job(&self, class: JobClass) -> Result<Arc<ProvisioningJob>, FleetError> {
        self.jobs
            .get(&class)
            .cloned()
            .ok_or_else(|| FleetError::Internal(format!("no job slot for {}", class)))
    }

    /// Restore sticky forms from the store. Unreadable entries are skipped.
    pub async fn load_sticky(&self) {
        for (class, job) in &self.jobs {
            match self.store.load(class.store_key()).await {
                Ok(Some(value)) => match serde_json::from_value::<ProvisionForm>(value) {
                    Ok(form) => job.set_last_form(form).await,
                    Err(e) => warn!("Ignoring stored {} parameters: {}", class, e),
                },
                Ok(None) => {}
                Err(e) => warn!("Unable to load stored {} parameters: {}", class, e),
            }
        }
    }

    /// Form to pre-fill the setup page with: the last submission, else defaults.
    pub async fn form_for_page(&self, class: JobClass) -> Result<ProvisionForm, FleetError> {
        let form = self.job(class)?.last_form().await.unwrap_or_default();
        Ok(form.with_defaults(class, &self.station_secret))
    }

    pub async fn snapshot(&self, class: JobClass) -> Result<JobSnapshot, FleetError> {
        Ok(self.job(class)?.snapshot().await)
    }

    /// Validate `form` and start a run of `class` in the background.
    ///
    /// Validation and conflict errors are returned before anything touches
    /// the network. The handle resolves when the run has finished.
    pub async fn run(self: &Arc<Self>, class: JobClass, form: ProvisionForm) -> Result<JoinHandle<()>, FleetError> {
        let form = form.with_defaults(class, &self.station_secret);
        let plan = ProvisionPlan::from_form(class, &form, &self.options.arena_base_url)?;
        let job = self.job(class)?;

        job.set_last_form(form.clone()).await;
        match serde_json::to_value(&form) {
            Ok(value) => {
                if let Err(e) = self.store.save(class.store_key(), value).await {
                    warn!("Unable to persist {} parameters: {}", class, e);
                }
            }
            Err(e) => warn!("Unable to encode {} parameters: {}", class, e),
        }

        job.try_start(plan.start_line()).await?;
        let run_id = generate_uuid();
        info!("Provisioning ({}) run {} started", class, run_id);

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(this.execute(&job, &plan)).catch_unwind().await;
            let state = match outcome {
                Ok(state) => state,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("Provisioning ({}) panicked: {}", class, message);
                    job.append(format!("panic: {}", message)).await;
                    JobState::Error
                }
            };
            job.finish(state).await;
            info!("Provisioning ({}) run {} finished: {}", class, run_id, state);
        });
        Ok(handle)
    }

    async fn execute(&self, job: &ProvisioningJob, plan: &ProvisionPlan) -> JobState {
        let targets = match &plan.target {
            TargetSelection::Host(host) => vec![host.clone()],
            TargetSelection::Scan(net) => {
                job.append(format!("Scanning {} for SSH...", net)).await;
                let found = match scan_subnet_for_ssh(self.prober.clone(), &net.to_string(), &self.options.scan).await
                {
                    Ok(found) => found,
                    Err(e) => {
                        job.append(format!("Scan error: {}", e)).await;
                        return JobState::Error;
                    }
                };
                if found.is_empty() {
                    job.append("No hosts found.").await;
                    return JobState::Error;
                }
                let listed: Vec<String> = found.iter().map(ToString::to_string).collect();
                job.append(format!("Found: {}", listed.join(", "))).await;
                prioritize_targets(&found).iter().map(ToString::to_string).collect()
            }
        };

        let script = match render_role_script(plan.class, &plan.script_params()) {
            Ok(script) => script,
            Err(e) => {
                job.append(format!("Script error: {}", e)).await;
                return JobState::Error;
            }
        };

        let mut configured = Vec::new();
        let mut failures = Vec::new();
        for target in &targets {
            job.append(format!("Connecting: {}", target)).await;
            match self.configure_target(job, plan, target, &script).await {
                Ok(()) => configured.push(target.clone()),
                Err(e) => {
                    warn!("Provisioning ({}) failed on {}: {}", plan.class, target, e);
                    job.append(format!("Error configuring {}: {}", target, e)).await;
                    failures.push(format!("{}: {}", target, e));
                }
            }
        }

        if !configured.is_empty() {
            job.append(format!("Configured OK: {}", configured.join(", "))).await;
            if !failures.is_empty() {
                job.append(format!("Failures: {}", failures.join("; "))).await;
            }
            JobState::Done
        } else if !failures.is_empty() {
            job.append(format!("All attempts failed: {}", failures.join("; "))).await;
            JobState::Error
        } else {
            job.append("No targets attempted.").await;
            JobState::Error
        }
    }

    async fn configure_target(
        &self,
        job: &ProvisioningJob,
        plan: &ProvisionPlan,
        target: &str,
        script: &str,
    ) -> Result<(), FleetError> {
        let mut shell = self.connector.connect(target, &plan.ssh_user, &plan.ssh_pass).await?;

        let mut remote_lines = Vec::new();
        let uploaded = upload_script(shell.as_mut(), plan.class, script, |lines| remote_lines.extend(lines)).await;
        job.append_all(std::mem::take(&mut remote_lines)).await;
        if let Err(e) = uploaded {
            shell.close().await;
            return Err(e);
        }

        let launched = launch_script(shell.as_mut(), plan.class, &plan.ssh_pass, |lines| {
            remote_lines.extend(lines)
        })
        .await;
        job.append_all(remote_lines).await;
        shell.close().await;

        match launched {
            Err(e) if e.transport_kind().is_some_and(|kind| kind.is_drop_or_timeout()) => {
                let method = ProbeMethod::Tcp {
                    port: self.options.ssh_port,
                };
                if self.prober.is_reachable(target, method, self.options.probe_timeout).await {
                    return Err(e);
                }
                job.append(format!(
                    "{}: connection lost during launch and host no longer answers; assuming started",
                    target
                ))
                .await;
                Ok(())
            }
            other => other,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
