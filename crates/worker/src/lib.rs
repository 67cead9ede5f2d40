//! 在本机运行的备份策略

pub mod executors;

pub use executors::{checksum_file, CommandSourceConfig, LocalCommandStrategy};
