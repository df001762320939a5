//! Secure shell connector backed by russh

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::errors::{kind_from_message, FleetError, TransportKind};
use crate::provision::remote::{CommandOutput, RemoteShell, ShellConnector};

/// Agents are freshly imaged boards whose host keys are not known ahead of time.
struct AcceptAnyHostKey;

impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

fn ssh_error(context: &str, err: russh::Error) -> FleetError {
    let kind = match &err {
        russh::Error::IO(io_err) => {
            return FleetError::from_io(std::io::Error::new(io_err.kind(), format!("{}: {}", context, io_err)))
        }
        russh::Error::Disconnect | russh::Error::HUP | russh::Error::SendError => TransportKind::ConnectionDropped,
        russh::Error::ConnectionTimeout | russh::Error::InactivityTimeout => TransportKind::Timeout,
        other => kind_from_message(&other.to_string()),
    };
    FleetError::transport(kind, format!("{}: {}", context, err))
}

/// Connector settings
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub port: u16,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            port: 22,
            connect_timeout: Duration::from_secs(4),
            command_timeout: Duration::from_secs(30),
        }
    }
}

pub struct SshConnector {
    options: SshOptions,
}

impl SshConnector {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ShellConnector for SshConnector {
    async fn connect(
        &self,
        host: &str,
        user: &str,
        password: &SecretString,
    ) -> Result<Box<dyn RemoteShell>, FleetError> {
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(self.options.command_timeout),
            ..Default::default()
        });

        let dial = async {
            let mut handle = client::connect(config, (host, self.options.port), AcceptAnyHostKey)
                .await
                .map_err(|e| ssh_error("ssh dial", e))?;
            let auth = handle
                .authenticate_password(user, password.expose_secret())
                .await
                .map_err(|e| ssh_error("ssh auth", e))?;
            if !auth.success() {
                return Err(FleetError::Auth(format!("ssh: password rejected for {}@{}", user, host)));
            }
            Ok::<_, FleetError>(handle)
        };
        let handle = tokio::time::timeout(self.options.connect_timeout, dial)
            .await
            .map_err(|_| FleetError::transport(TransportKind::Timeout, format!("ssh dial {}: timed out", host)))??;

        debug!("ssh: session open to {}@{}", user, host);
        Ok(Box::new(SshShell {
            handle,
            command_timeout: self.options.command_timeout,
        }))
    }
}

struct SshShell {
    handle: Handle<AcceptAnyHostKey>,
    command_timeout: Duration,
}

impl SshShell {
    async fn run(&mut self, command: &str, stdin: &[u8]) -> Result<CommandOutput, FleetError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ssh_error("open session", e))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| ssh_error("exec", e))?;
        if !stdin.is_empty() {
            channel.data(stdin).await.map_err(|e| ssh_error("write stdin", e))?;
        }
        channel.eof().await.map_err(|e| ssh_error("close stdin", e))?;

        let mut output = CommandOutput::default();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.stdout.push_str(&String::from_utf8_lossy(data)),
                ChannelMsg::ExtendedData { ref data, .. } => {
                    output.stderr.push_str(&String::from_utf8_lossy(data))
                }
                ChannelMsg::ExitStatus { exit_status } => output.exit_status = Some(exit_status),
                _ => {}
            }
        }

        if output.exit_status.is_none() {
            return Err(FleetError::transport(
                TransportKind::ConnectionDropped,
                "session closed before the command reported an exit status",
            ));
        }
        Ok(output)
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn exec(&mut self, command: &str, stdin: &[u8]) -> Result<CommandOutput, FleetError> {
        let timeout = self.command_timeout;
        tokio::time::timeout(timeout, self.run(command, stdin))
            .await
            .map_err(|_| FleetError::transport(TransportKind::Timeout, format!("command timed out after {:?}", timeout)))?
    }

    async fn close(&mut self) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await;
    }
}
