use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 备份目标主机
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Target {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: i64,
    pub username: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Target {
    pub fn new(name: &str, host: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            host: host.to_string(),
            port: 22,
            username: "root".to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}
