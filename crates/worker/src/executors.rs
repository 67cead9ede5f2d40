use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use orchestrator_core::{
    models::{LogLevel, RunLogEntry},
    traits::{BackupContext, BackupOutcome, BackupStrategy},
    OrchestratorError, OrchestratorResult,
};

/// 每个输出流最多保留的日志行数
const MAX_CAPTURED_LINES: usize = 200;

/// 本地命令策略的源配置，来自任务的 `source_config`
///
/// `output_path`、`args` 与 `remote_dir` 中的 `{run_id}` 会被替换为运行实例ID。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandSourceConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// 命令写出的备份文件
    pub output_path: String,
    /// 上报的远端目录；缺省时以 `output_path` 作为远端路径
    #[serde(default)]
    pub remote_dir: Option<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
}

impl CommandSourceConfig {
    pub fn from_context(context: &BackupContext) -> OrchestratorResult<Self> {
        serde_json::from_value(context.job.source_config.clone()).map_err(|e| {
            OrchestratorError::Configuration(format!(
                "任务 {} 的命令配置无效: {e}",
                context.job.name
            ))
        })
    }

    fn render(value: &str, run_id: i64) -> String {
        value.replace("{run_id}", &run_id.to_string())
    }

    fn output_path(&self, run_id: i64) -> PathBuf {
        PathBuf::from(Self::render(&self.output_path, run_id))
    }

    fn args(&self, run_id: i64) -> Vec<String> {
        self.args.iter().map(|a| Self::render(a, run_id)).collect()
    }

    fn remote_path(&self, output: &Path, run_id: i64) -> String {
        match (&self.remote_dir, output.file_name()) {
            (Some(dir), Some(name)) => format!(
                "{}/{}",
                Self::render(dir, run_id).trim_end_matches('/'),
                name.to_string_lossy()
            ),
            _ => output.to_string_lossy().into_owned(),
        }
    }
}

/// 在本机执行命令的备份策略
///
/// 用于 `files` 与 `custom` 类型：命令负责把备份写到 `output_path`，
/// 策略随后计算文件大小和 SHA-256。取消时直接结束子进程。
#[derive(Debug, Default, Clone)]
pub struct LocalCommandStrategy;

impl LocalCommandStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackupStrategy for LocalCommandStrategy {
    fn name(&self) -> &str {
        "local_command"
    }

    async fn execute(
        &self,
        context: &BackupContext,
        cancel: CancellationToken,
    ) -> OrchestratorResult<BackupOutcome> {
        let start_time = Instant::now();
        let config = CommandSourceConfig::from_context(context)?;
        let run_id = context.run_id;
        let args = config.args(run_id);
        let output = config.output_path(run_id);

        info!(
            "执行备份命令: run_id={}, command={}, args={:?}",
            run_id, config.command, args
        );

        let mut cmd = Command::new(&config.command);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &config.env_vars {
            cmd.env(key, value);
        }
        cmd.env("BACKUP_RUN_ID", run_id.to_string())
            .env("BACKUP_OUTPUT_PATH", &output);

        let mut child = cmd
            .spawn()
            .map_err(|e| OrchestratorError::BackupExecution(format!("启动备份命令失败: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OrchestratorError::BackupExecution("无法获取stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| OrchestratorError::BackupExecution("无法获取stderr".to_string()))?;
        let stdout_task = tokio::spawn(capture_lines(stdout, LogLevel::Info));
        let stderr_task = tokio::spawn(capture_lines(stderr, LogLevel::Warn));

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        let Some(status) = status else {
            warn!("运行实例 {} 的备份命令被取消，结束子进程", run_id);
            if let Err(e) = child.kill().await {
                warn!("结束子进程失败: {}", e);
            }
            stdout_task.abort();
            stderr_task.abort();
            return Ok(BackupOutcome::failure("cancelled").with_logs(vec![RunLogEntry::new(
                LogLevel::Warn,
                "Backup command killed after cancellation",
            )]));
        };
        let status = status
            .map_err(|e| OrchestratorError::BackupExecution(format!("等待进程结束失败: {e}")))?;

        let mut logs = stdout_task.await.unwrap_or_default();
        logs.extend(stderr_task.await.unwrap_or_default());

        if !status.success() {
            let message = format!("Backup command exited with {:?}", status.code());
            return Ok(BackupOutcome::failure(message).with_logs(logs));
        }

        let (size_bytes, checksum) = match checksum_file(&output).await {
            Ok(result) => result,
            Err(e) => {
                let message = format!("Backup output {} unreadable: {e}", output.display());
                return Ok(BackupOutcome::failure(message).with_logs(logs));
            }
        };

        let filename = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!(
            "备份命令完成: run_id={}, size={}, duration={}ms",
            run_id,
            size_bytes,
            start_time.elapsed().as_millis()
        );

        Ok(BackupOutcome::success(
            filename,
            config.remote_path(&output, run_id),
            size_bytes,
            checksum,
        )
        .with_logs(logs))
    }
}

async fn capture_lines<R>(reader: R, level: LogLevel) -> Vec<RunLogEntry>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut entries = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if entries.len() < MAX_CAPTURED_LINES {
            entries.push(RunLogEntry::new(level, line));
        }
    }
    entries
}

/// 流式计算文件大小与 SHA-256（十六进制小写）
pub async fn checksum_file(path: &Path) -> std::io::Result<(i64, String)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    let mut size: u64 = 0;

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        size += read as u64;
    }

    Ok((size as i64, format!("{:x}", hasher.finalize())))
}
