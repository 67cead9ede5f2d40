use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{value_parser, Arg, ArgMatches, Command};
use orchestrator_core::config::AppConfig;
use orchestrator_infrastructure::init_observability;
use tracing::{error, info};

mod app;
mod shutdown;

use app::Application;
use shutdown::{wait_for_shutdown_signal, ShutdownManager};

const DEFAULT_CONFIG_PATH: &str = "config/orchestrator.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    // 未显式指定时，默认配置文件存在才加载
    let config_path = matches
        .get_one::<String>("config")
        .cloned()
        .or_else(|| {
            Path::new(DEFAULT_CONFIG_PATH)
                .exists()
                .then(|| DEFAULT_CONFIG_PATH.to_string())
        });

    let mut config = AppConfig::load(config_path.as_deref())
        .with_context(|| format!("加载配置失败: {:?}", config_path))?;
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }

    init_observability(&config.observability)?;

    let node = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    info!("启动备份编排服务 node={}", node);
    info!("配置文件: {}", config_path.as_deref().unwrap_or("<默认值>"));

    let app = Arc::new(Application::new(config).await?);

    let result = match matches.subcommand() {
        Some(("trigger", sub)) => trigger(&app, sub).await,
        Some(("rotate", sub)) => rotate(&app, sub).await,
        Some(("preview", sub)) => preview(&app, sub).await,
        _ => serve(Arc::clone(&app)).await,
    };

    app.close().await;
    info!("备份编排服务已退出");
    result
}

fn cli() -> Command {
    Command::new("backup-orchestrator")
        .version("1.0.0")
        .about("备份任务编排：定时调度、重试与GFS保留轮换")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("配置文件路径"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .global(true)
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .global(true)
                .help("日志格式")
                .value_parser(["json", "pretty", "compact"]),
        )
        .subcommand(Command::new("serve").about("运行调度循环直到收到关闭信号"))
        .subcommand(
            Command::new("trigger")
                .about("手动触发一次备份并等待其结束")
                .arg(job_id_arg()),
        )
        .subcommand(
            Command::new("rotate")
                .about("对保留策略覆盖的产物执行一次轮换")
                .arg(
                    Arg::new("policy-id")
                        .required(true)
                        .value_parser(value_parser!(i64)),
                )
                .arg(
                    Arg::new("job")
                        .long("job")
                        .value_name("JOB_ID")
                        .help("只处理该任务")
                        .value_parser(value_parser!(i64)),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .help("只预览，不删除")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("preview")
                .about("列出任务接下来的触发时间")
                .arg(job_id_arg())
                .arg(
                    Arg::new("count")
                        .short('n')
                        .long("count")
                        .default_value("5")
                        .value_parser(value_parser!(usize)),
                ),
        )
}

fn job_id_arg() -> Arg {
    Arg::new("job-id")
        .required(true)
        .value_parser(value_parser!(i64))
}

fn required_i64(matches: &ArgMatches, name: &str) -> Result<i64> {
    matches
        .get_one::<i64>(name)
        .copied()
        .with_context(|| format!("缺少参数: {name}"))
}

async fn serve(app: Arc<Application>) -> Result<()> {
    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe().await;

    let app_handle = {
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("应用运行失败: {e}");
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    if let Err(e) = app_handle.await {
        error!("应用关闭时发生错误: {e}");
    }
    Ok(())
}

async fn trigger(app: &Application, matches: &ArgMatches) -> Result<()> {
    let job_id = required_i64(matches, "job-id")?;
    let run = app.controller().trigger_manual(job_id).await?;
    info!("已创建运行实例 {}，等待执行结束", run.id);
    app.drain().await;
    Ok(())
}

async fn rotate(app: &Application, matches: &ArgMatches) -> Result<()> {
    let policy_id = required_i64(matches, "policy-id")?;
    let job_id = matches.get_one::<i64>("job").copied();

    if matches.get_flag("dry-run") {
        let preview = app
            .rotation()
            .preview_policy(policy_id, job_id, Utc::now())
            .await?;
        info!(
            "轮换预览: 共 {} 个产物，保留 {}，删除 {}",
            preview.total, preview.would_keep, preview.would_delete
        );
        for candidate in &preview.artifacts {
            info!(
                "  将删除 {} ({}) 原因={:?}",
                candidate.id, candidate.filename, candidate.reason
            );
        }
        return Ok(());
    }

    let outcome = app
        .rotation()
        .run_policy(policy_id, job_id, Utc::now())
        .await?;
    info!("轮换完成: 保留 {}，删除 {}", outcome.kept, outcome.deleted);
    Ok(())
}

async fn preview(app: &Application, matches: &ArgMatches) -> Result<()> {
    let job_id = required_i64(matches, "job-id")?;
    let count = matches.get_one::<usize>("count").copied().unwrap_or(5);
    for fire_time in app.controller().schedule_preview(job_id, count).await? {
        info!("下次触发: {}", fire_time.to_rfc3339());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn test_rotate_arguments() {
        let matches = cli()
            .try_get_matches_from(["backup-orchestrator", "rotate", "3", "--job", "7", "--dry-run"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "rotate");
        assert_eq!(required_i64(sub, "policy-id").unwrap(), 3);
        assert_eq!(sub.get_one::<i64>("job"), Some(&7));
        assert!(sub.get_flag("dry-run"));
    }

    #[test]
    fn test_dry_run_without_job_covers_every_job() {
        let matches = cli()
            .try_get_matches_from(["backup-orchestrator", "rotate", "3", "--dry-run"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert!(sub.get_flag("dry-run"));
        assert_eq!(sub.get_one::<i64>("job"), None);
    }

    #[test]
    fn test_global_log_level_after_subcommand() {
        let matches = cli()
            .try_get_matches_from(["backup-orchestrator", "preview", "1", "-l", "debug"])
            .unwrap();
        assert_eq!(
            matches.get_one::<String>("log-level").map(String::as_str),
            Some("debug")
        );
    }
}
