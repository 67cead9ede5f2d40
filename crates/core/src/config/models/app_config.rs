use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::{DatabaseConfig, ExecutorConfig, ObservabilityConfig, RotationConfig, SchedulerConfig};

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub executor: ExecutorConfig,
    pub rotation: RotationConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 加载配置：默认值 <- 配置文件 <- 环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = ConfigBuilder::try_from(&AppConfig::default())
            .context("构建默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("ORCHESTRATOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("加载配置失败")?;
        let app_config: AppConfig = config.try_deserialize().context("解析配置失败")?;

        app_config.validate().context("配置验证失败")?;

        Ok(app_config)
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.scheduler.validate().context("调度器配置验证失败")?;
        self.executor.validate().context("执行器配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;
        Ok(())
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::models::MaxAgeMode;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.poll_interval_seconds, 60);
        assert_eq!(config.executor.retry_base_delay_seconds, 60);
        assert_eq!(config.rotation.max_age_mode, MaxAgeMode::KeepSetWins);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
[scheduler]
poll_interval_seconds = 30
exclusive_per_job = true

[rotation]
max_age_mode = "hard_ceiling"
"#,
        )
        .unwrap();

        assert_eq!(config.scheduler.poll_interval_seconds, 30);
        assert!(config.scheduler.exclusive_per_job);
        assert_eq!(config.scheduler.max_concurrent_runs, 4);
        assert_eq!(config.rotation.max_age_mode, MaxAgeMode::HardCeiling);
        assert_eq!(config.executor.default_timeout_seconds, 3600);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(AppConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = AppConfig::from_toml(
            r#"
[scheduler]
poll_interval_seconds = 0
"#,
        );
        assert!(result.is_err());

        let result = AppConfig::from_toml(
            r#"
[observability]
log_format = "xml"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
url = "sqlite::memory:"
max_connections = 1

[executor]
retry_base_delay_seconds = 5
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert!(config.database.is_in_memory());
        assert_eq!(config.executor.retry_base_delay_seconds, 5);
        assert_eq!(config.scheduler.poll_interval_seconds, 60);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/orchestrator.toml")).is_err());
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let text = include_str!("../../../../../config/orchestrator.toml");
        assert_eq!(AppConfig::from_toml(text).unwrap(), AppConfig::default());
    }
}
