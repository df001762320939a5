//! Application configuration options

use std::time::Duration;

use crate::provision::orchestrator::OrchestratorOptions;
use crate::provision::ssh::SshOptions;
use crate::scanner::ScanOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::monitor;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Where settings and sticky parameters live
    pub layout: StorageLayout,

    pub server: ServerOptions,

    /// Shared by every device monitor
    pub monitor: monitor::Options,

    pub ssh: SshOptions,

    pub provisioning: OrchestratorOptions,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            layout: StorageLayout::default(),
            server: ServerOptions::default(),
            monitor: monitor::Options::default(),
            ssh: SshOptions::default(),
            provisioning: OrchestratorOptions::default(),
            max_shutdown_delay: Duration::from_secs(10),
        }
    }
}

impl AppOptions {
    pub fn from_settings(layout: StorageLayout, settings: &Settings) -> Self {
        let provisioning = &settings.provisioning;
        Self {
            layout,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            monitor: monitor::Options {
                interval: settings.health.poll_interval(),
                enabled: settings.switch_management_enabled,
            },
            ssh: SshOptions {
                port: provisioning.ssh_port,
                connect_timeout: Duration::from_secs(provisioning.ssh_connect_timeout_secs),
                command_timeout: Duration::from_secs(provisioning.ssh_command_timeout_secs),
            },
            provisioning: OrchestratorOptions {
                arena_base_url: provisioning.arena_base_url.clone(),
                scan: ScanOptions {
                    port: provisioning.ssh_port,
                    timeout: Duration::from_millis(provisioning.scan_timeout_ms),
                    concurrency: provisioning.scan_concurrency,
                },
                ssh_port: provisioning.ssh_port,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}
