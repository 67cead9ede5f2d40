use anyhow::Result;
use serde::{Deserialize, Serialize};

/// 运行台账数据库配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    /// 启动时是否执行内嵌的数据库迁移
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://orchestrator.db?mode=rwc".to_string(),
            max_connections: 5,
            min_connections: 1,
            connection_timeout_seconds: 30,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(anyhow::anyhow!("数据库URL不能为空"));
        }

        if !self.url.starts_with("sqlite:") {
            return Err(anyhow::anyhow!("数据库URL必须是SQLite连接字符串: {}", self.url));
        }

        if self.max_connections == 0 {
            return Err(anyhow::anyhow!("最大连接数必须大于0"));
        }

        if self.min_connections > self.max_connections {
            return Err(anyhow::anyhow!("最小连接数不能大于最大连接数"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时时间必须大于0"));
        }

        Ok(())
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = DatabaseConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.is_in_memory());
    }

    #[test]
    fn test_rejects_non_sqlite_url() {
        let config = DatabaseConfig {
            url: "postgresql://localhost/backups".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_pool_bounds() {
        let config = DatabaseConfig {
            min_connections: 10,
            max_connections: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
