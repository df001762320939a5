//! Field network controller - Entry Point
//!
//! Manages venue switches, provisions display and station-stop agents, and
//! ingests remote stop reports.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use fieldnet::app::options::AppOptions;
use fieldnet::app::run::run;
use fieldnet::app::state::FleetController;
use fieldnet::filesys::file::File;
use fieldnet::logs::{init_logging, LogOptions};
use fieldnet::server::auth::BearerAuthorizer;
use fieldnet::storage::layout::StorageLayout;
use fieldnet::storage::settings::Settings;
use fieldnet::utils::version_info;

use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(text) => println!("{}", text),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    // Retrieve the settings file
    let layout = match cli_args.get("config") {
        Some(path) => StorageLayout::from_settings_path(path),
        None => StorageLayout::default(),
    };
    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };
    let settings = match Settings::load(&settings_file).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e}");
            return;
        }
    };

    // Initialize logging; the guard flushes the log file on exit
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
        json_format: settings.json_logs,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    info!(
        "Field network controller {} ({}) starting",
        version.version, version.git_hash
    );

    let options = AppOptions::from_settings(layout, &settings);
    info!("Running with options: {:?}", options);

    let controller = match FleetController::init(&options, &settings).await {
        Ok(controller) => Arc::new(controller),
        Err(e) => {
            error!("Failed to initialize controller: {e}");
            return;
        }
    };
    if settings.server.admin_token.trim().is_empty() {
        warn!("No admin token configured; privileged routes are open");
    }
    let authorizer = Arc::new(BearerAuthorizer::new(&settings.server.admin_token));

    if let Err(e) = run(options, controller, authorizer, await_shutdown_signal()).await {
        error!("Controller stopped with error: {e}");
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            _ => {
                warn!("Unable to install signal handlers, falling back to Ctrl+C");
                if tokio::signal::ctrl_c().await.is_err() {
                    error!("Failed to listen for Ctrl+C");
                }
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            error!("Failed to listen for Ctrl+C");
        }
        info!("Ctrl+C received, shutting down...");
    }
}
