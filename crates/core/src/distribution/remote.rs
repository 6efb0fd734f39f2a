//! Delivery to another host over ssh/scp.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::checksum::parse_digest;
use super::transport::{join_remote, local_file_name};
use super::{DistributionError, Transport};
use crate::config::ChecksumKind;
use crate::process::{shell_quote, CommandRunner, CommandSpec};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(3600);

pub struct RemoteTransport {
    host: String,
    user: Option<String>,
    runner: Arc<dyn CommandRunner>,
}

impl RemoteTransport {
    pub fn new(host: impl Into<String>, user: Option<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            host: host.into(),
            user,
            runner,
        }
    }

    fn target(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// Run a shell command on the remote host. Every word must already be quoted.
    async fn ssh(&self, remote_command: String) -> Result<String, DistributionError> {
        let spec = CommandSpec::new("ssh")
            .args(["-o", "BatchMode=yes"])
            .arg(self.target())
            .arg(remote_command)
            .timeout(COMMAND_TIMEOUT);
        let output = self.runner.run(&spec).await?.check("ssh")?;
        Ok(output.stdout)
    }
}

#[async_trait]
impl Transport for RemoteTransport {
    async fn prepare(&self, dest_dir: &str) -> Result<(), DistributionError> {
        self.ssh(format!("mkdir -p {}", shell_quote(dest_dir)))
            .await
            .map(|_| ())
    }

    async fn deliver(&self, local: &Path, dest_dir: &str) -> Result<String, DistributionError> {
        let name = local_file_name(local)?;
        let dest = join_remote(dest_dir, &name);
        let part = format!("{}.part", dest);

        let copy = CommandSpec::new("scp")
            .args(["-q", "-o", "BatchMode=yes"])
            .path_arg(local)
            .arg(format!("{}:{}", self.target(), shell_quote(&part)))
            .timeout(COMMAND_TIMEOUT);
        self.runner.run(&copy).await?.check("scp")?;

        self.ssh(format!("mv -f {} {}", shell_quote(&part), shell_quote(&dest)))
            .await?;
        debug!(host = %self.host, dest = %dest, "Delivered file");
        Ok(dest)
    }

    async fn remote_digest(
        &self,
        path: &str,
        kind: ChecksumKind,
    ) -> Result<String, DistributionError> {
        let stdout = self
            .ssh(format!("{} {}", kind.remote_tool(), shell_quote(path)))
            .await?;
        parse_digest(&stdout).ok_or_else(|| {
            DistributionError::Transport(format!(
                "unparseable {} output for {}: {}",
                kind.remote_tool(),
                path,
                stdout.trim()
            ))
        })
    }

    async fn remove(&self, path: &str) -> Result<(), DistributionError> {
        self.ssh(format!("rm -f {}", shell_quote(path)))
            .await
            .map(|_| ())
    }

    fn location(&self, path: &str) -> String {
        format!("{}:{}", self.host, path)
    }
}
