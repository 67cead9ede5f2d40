pub mod notifier;
pub mod repository;
pub mod strategy;

pub use notifier::*;
pub use repository::*;
pub use strategy::*;
