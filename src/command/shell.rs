//! Shell command runner - runs commands through `sh -c` in their own process group

use crate::command::{CommandError, CommandOutput, CommandRunner};
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Timeout for collecting output from child process pipes after exit
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum captured output per command (10MB)
const MAX_OUTPUT_SIZE: usize = 10 * 1024 * 1024;

const TRUNCATION_MARKER: &str = "\n[output truncated at 10MB]\n";

const COLLECTION_TIMEOUT_MARKER: &str = "\n[output collection timed out]\n";

/// Pipe read size
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Runs commands with a shell, killing the whole process group on timeout
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    /// Shell used to interpret command strings
    shell: String,

    /// Extra environment for every command
    env: Vec<(String, String)>,

    /// How long to wait for pipes to close once the command has exited
    output_timeout: Duration,
}

impl Default for ShellCommandRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            env: Vec::new(),
            output_timeout: OUTPUT_COLLECTION_TIMEOUT,
        }
    }
}

impl ShellCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_output_timeout(mut self, timeout: Duration) -> Self {
        self.output_timeout = timeout;
        self
    }

    fn spawn(&self, command: &str, working_dir: &Path) -> Result<Child, CommandError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A group of its own, so a single signal reaches every descendant
            .process_group(0)
            .kill_on_drop(true);

        cmd.spawn().map_err(|source| CommandError::Spawn {
            command: command.to_string(),
            source,
        })
    }

    /// Wait for the pipe readers to hit EOF
    ///
    /// A descendant that outlives the command can hold a pipe open. Past
    /// `output_timeout` the group is killed and the output collected so far
    /// is returned with a marker.
    async fn finish_output(
        &self,
        group: Option<Pid>,
        readers: [JoinHandle<()>; 2],
        mut collector: JoinHandle<String>,
    ) -> String {
        if let Ok(result) = tokio::time::timeout(self.output_timeout, &mut collector).await {
            return result.unwrap_or_else(|e| {
                warn!("Output collector failed: {}", e);
                String::new()
            });
        }

        warn!("Timed out collecting command output, killing leftover processes");
        if let Some(group) = group {
            kill_group(group);
        }
        // Aborted readers drop their senders, which ends the collector
        for reader in readers {
            reader.abort();
        }
        let mut output = collector.await.unwrap_or_else(|e| {
            warn!("Output collector failed: {}", e);
            String::new()
        });
        output.push_str(COLLECTION_TIMEOUT_MARKER);
        output
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(
        &self,
        command: &str,
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        debug!("Running `{}` in {}", command, working_dir.display());
        let started = Instant::now();

        let mut child = self.spawn(command, working_dir)?;
        // The child leads its own group, so its pid is the group id
        let group = child.id().and_then(|pid| i32::try_from(pid).ok()).map(Pid::from_raw);

        // Drain both pipes while waiting, or a chatty child blocks on a full pipe
        let (tx, rx) = mpsc::unbounded_channel();
        let readers = [
            tokio::spawn(forward_chunks(child.stdout.take(), tx.clone(), MAX_OUTPUT_SIZE + 1)),
            tokio::spawn(forward_chunks(child.stderr.take(), tx, MAX_OUTPUT_SIZE + 1)),
        ];
        let collector = tokio::spawn(collect_output(rx));

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                terminate_process_group(&mut child).await;
                return Err(CommandError::Wait {
                    command: command.to_string(),
                    source,
                });
            }
            Err(_) => {
                error!("`{}` timed out after {}s, killing its process group", command, timeout.as_secs());
                terminate_process_group(&mut child).await;
                let output = self.finish_output(group, readers, collector).await;
                return Err(CommandError::Timeout {
                    command: command.to_string(),
                    timeout,
                    output,
                });
            }
        };

        let output = self.finish_output(group, readers, collector).await;
        let duration = started.elapsed();

        if status.success() {
            debug!("`{}` finished in {:?} ({} bytes of output)", command, duration, output.len());
            Ok(CommandOutput {
                output,
                exit_code: status.code(),
                duration,
            })
        } else {
            warn!("`{}` exited with {:?}", command, status.code());
            Err(CommandError::Failed {
                command: command.to_string(),
                exit_code: status.code(),
                output,
            })
        }
    }
}

/// Send SIGKILL to a process group; false if the group could not be signalled
fn kill_group(group: Pid) -> bool {
    match killpg(group, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => true,
        Err(e) => {
            warn!("killpg({}) failed: {}", group, e);
            false
        }
    }
}

/// Kill every process in the child's group and reap the child
async fn terminate_process_group(child: &mut Child) {
    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        if !kill_group(Pid::from_raw(pid)) {
            let _ = child.start_kill();
        }
    }
    if let Err(e) = child.wait().await {
        warn!("Failed to reap killed command: {}", e);
    }
}

/// Forward at most `limit` bytes from a pipe, then keep draining it to EOF
async fn forward_chunks<R>(reader: Option<R>, tx: mpsc::UnboundedSender<Vec<u8>>, limit: usize)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let mut forwarded = 0;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let take = n.min(limit - forwarded);
        if take == 0 {
            continue;
        }
        forwarded += take;
        if tx.send(buf[..take].to_vec()).is_err() {
            break;
        }
    }
}

/// Merge chunks into one string, capped at `MAX_OUTPUT_SIZE`
async fn collect_output(mut rx: mpsc::UnboundedReceiver<Vec<u8>>) -> String {
    let mut buf = Vec::new();
    let mut truncated = false;
    while let Some(chunk) = rx.recv().await {
        if truncated {
            continue;
        }
        let remaining = MAX_OUTPUT_SIZE.saturating_sub(buf.len());
        if chunk.len() > remaining {
            buf.extend_from_slice(&chunk[..remaining]);
            truncated = true;
        } else {
            buf.extend_from_slice(&chunk);
        }
    }
    let mut output = String::from_utf8_lossy(&buf).into_owned();
    if truncated {
        output.push_str(TRUNCATION_MARKER);
    }
    output
}
