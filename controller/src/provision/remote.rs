//! Remote shell seam and the commands that deliver and launch role scripts

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::errors::FleetError;
use crate::provision::request::JobClass;

/// What a finished remote command left behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<u32>,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Non-empty output lines, stdout first.
    pub fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// An authenticated remote shell session
#[async_trait]
pub trait RemoteShell: Send {
    /// Run `command`, write `stdin` then EOF, and wait for it to exit.
    async fn exec(&mut self, command: &str, stdin: &[u8]) -> Result<CommandOutput, FleetError>;

    async fn close(&mut self);
}

/// Opens [`RemoteShell`] sessions with password authentication
#[async_trait]
pub trait ShellConnector: Send + Sync {
    async fn connect(
        &self,
        host: &str,
        user: &str,
        password: &SecretString,
    ) -> Result<Box<dyn RemoteShell>, FleetError>;
}

/// Reads the script from stdin into `remote_path`, strips CRs, marks it executable.
pub fn upload_command(remote_path: &str) -> String {
    format!(
        r#"bash -lc 'cat > {path} && sed -i "s/\r$//" {path} && chmod +x {path} && echo "REMOTE: script uploaded to {path}"'"#,
        path = remote_path
    )
}

/// Starts the script as root in its own session and returns at once.
///
/// `sudo -S` takes the password from stdin; the script's own stdin is
/// `/dev/null` so it never waits on the controller.
pub fn launch_command(remote_path: &str, remote_log: &str) -> String {
    format!(
        r#"sudo -S -p "" bash -lc 'setsid nohup /bin/bash {path} > {log} 2>&1 < /dev/null & echo "REMOTE: started ({path}); log: {log}"'"#,
        path = remote_path,
        log = remote_log
    )
}

/// Upload `script` to the class's temp path. Remote output lines go to
/// `on_output`, also on failure.
pub async fn upload_script<F>(
    shell: &mut dyn RemoteShell,
    class: JobClass,
    script: &str,
    mut on_output: F,
) -> Result<(), FleetError>
where
    F: FnMut(Vec<String>) + Send,
{
    let upload = shell
        .exec(&upload_command(class.remote_script()), script.as_bytes())
        .await?;
    on_output(upload.lines());
    if !upload.succeeded() {
        return Err(FleetError::Protocol(format!(
            "upload script: exit status {:?}",
            upload.exit_status
        )));
    }
    Ok(())
}

/// Launch the uploaded script detached under sudo, feeding the password on stdin.
pub async fn launch_script<F>(
    shell: &mut dyn RemoteShell,
    class: JobClass,
    sudo_password: &SecretString,
    mut on_output: F,
) -> Result<(), FleetError>
where
    F: FnMut(Vec<String>) + Send,
{
    let password_line = format!("{}\n", sudo_password.expose_secret());
    let launch = shell
        .exec(
            &launch_command(class.remote_script(), class.remote_log()),
            password_line.as_bytes(),
        )
        .await?;
    on_output(launch.lines());
    if !launch.succeeded() {
        return Err(FleetError::Protocol(format!(
            "sudo launch: exit status {:?}",
            launch.exit_status
        )));
    }
    Ok(())
}
