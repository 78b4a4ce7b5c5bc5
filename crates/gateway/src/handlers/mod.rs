//! API handlers module

pub mod chat;
pub mod files;
pub mod health;
pub mod metrics;
pub mod preferences;
pub mod projects;
pub mod report;
