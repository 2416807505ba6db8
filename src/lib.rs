//! # Provisioning Engine Library
//!
//! Account provisioning and approval workflows for enterprise SaaS providers:
//! the secret vault, workflow engine, bulk provisioner, identity mapper,
//! provider adapters and audit trail, plus the HTTP surface over them.

pub mod audit;
pub mod auth;
pub mod config;
pub mod connectors;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod provisioner;
pub mod repositories;
pub mod secrets;
pub mod server;
pub mod telemetry;
pub mod workflow;
pub use migration;
