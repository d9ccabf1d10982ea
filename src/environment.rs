//! Lifecycle of a server process driven over its stdio
//!
//! An [`Environment`] owns one child process: stdout and stdin are attached to
//! a [`StreamMultiplexer`], stderr lines are forwarded to the log sink.

use {
    crate::{
        client::McpClient,
        config::ClientConfig,
        error::{ClientError, ClientResult},
        logging::{self, McpConnectionId},
        multiplexer::StreamMultiplexer,
    },
    std::{
        path::{Path, PathBuf},
        process::{ExitStatus, Stdio},
    },
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        process::{Child, Command},
        task::JoinHandle,
    },
    tracing::{debug, info, Instrument},
};

/// How to launch a server process
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    pub client: ClientConfig,
}

impl EnvironmentConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            working_dir: None,
            client: ClientConfig::default(),
        }
    }

    /// Run `binary serve --source <source>` (this crate's own binary), which
    /// emulates the generated server described by the source file.
    pub fn emulated(binary: impl Into<PathBuf>, source: impl AsRef<Path>, api_base_url: Option<&str>) -> Self {
        let mut config = Self::new(binary)
            .arg("serve")
            .arg("--source")
            .arg(source.as_ref().to_string_lossy());
        if let Some(url) = api_base_url {
            config = config.arg("--api-base-url").arg(url);
        }
        config
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn client_config(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }
}

/// A running server process and the client attached to it
pub struct Environment {
    child: Child,
    client: McpClient,
    connection_id: McpConnectionId,
    stderr_task: JoinHandle<()>,
}

impl Environment {
    pub async fn start(config: EnvironmentConfig) -> ClientResult<Self> {
        let connection_id = McpConnectionId::new();
        let span = logging::connection_span(&connection_id);

        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .envs(config.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| ClientError::Spawn(format!("{}: {e}", config.program.display())))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClientError::Spawn("stdin was not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClientError::Spawn("stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClientError::Spawn("stderr was not captured".into()))?;

        let mux = StreamMultiplexer::with_connection_id(stdout, stdin, config.client, connection_id.clone());

        let log_tx = mux.log_sender();
        let stderr_id = connection_id.clone();
        let stderr_task = tokio::spawn(
            async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    logging::log_server_line(&stderr_id, &line);
                    let _ = log_tx.send(line);
                }
            }
            .instrument(span),
        );

        info!(
            connection_id = %connection_id,
            program = %config.program.display(),
            pid = child.id(),
            "Server process started"
        );

        Ok(Self {
            child,
            client: McpClient::new(mux),
            connection_id,
            stderr_task,
        })
    }

    pub fn client(&self) -> &McpClient {
        &self.client
    }

    pub fn multiplexer(&self) -> &StreamMultiplexer {
        self.client.multiplexer()
    }

    pub fn connection_id(&self) -> &McpConnectionId {
        &self.connection_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Reject pending requests, kill the process and reap it.
    pub async fn stop(mut self) -> ClientResult<ExitStatus> {
        self.client.multiplexer().shutdown();
        if let Err(e) = self.child.start_kill() {
            // Already exited on its own
            debug!(error = %e, "Kill failed");
        }
        let status = self.child.wait().await?;
        self.stderr_task.abort();
        info!(connection_id = %self.connection_id, ?status, "Server process stopped");
        Ok(status)
    }
}
