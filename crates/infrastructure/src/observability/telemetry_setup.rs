use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use orchestrator_core::config::ObservabilityConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::structured_logger::{LogFormat, LoggingConfig};

pub fn init_structured_logging(config: LoggingConfig) -> Result<()> {
    let level = config.level.clone();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.level.clone().into());

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_id);

            registry.with(fmt_layer).try_init().context("初始化日志系统失败")?;
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_id);

            registry.with(fmt_layer).try_init().context("初始化日志系统失败")?;
        }
        LogFormat::Compact => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_thread_ids(config.include_thread_id);

            registry.with(fmt_layer).try_init().context("初始化日志系统失败")?;
        }
    }

    info!(
        logging.format = ?config.format,
        logging.level = level,
        "Structured logging initialized"
    );

    Ok(())
}

/// 安装 Prometheus 导出器，在 `bind_address` 上提供 `/metrics`
pub fn init_metrics(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind_address}"))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("安装Prometheus指标导出器失败")?;

    info!("Prometheus指标导出器已启动: http://{}/metrics", addr);
    Ok(())
}

pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_structured_logging(LoggingConfig::from(config))?;
    if config.metrics_enabled {
        init_metrics(&config.metrics_bind_address)?;
    }
    Ok(())
}
