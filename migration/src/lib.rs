//! Database migrations for the provisioning engine.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_12_01_090000_create_employees;
mod m2025_12_01_090100_create_provider_accounts;
mod m2025_12_01_090200_create_workflow_requests;
mod m2025_12_01_090300_create_approvals;
mod m2025_12_01_090400_create_audit_logs;
mod m2025_12_01_090500_create_secret_bundles;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_12_01_090000_create_employees::Migration),
            Box::new(m2025_12_01_090100_create_provider_accounts::Migration),
            Box::new(m2025_12_01_090200_create_workflow_requests::Migration),
            Box::new(m2025_12_01_090300_create_approvals::Migration),
            Box::new(m2025_12_01_090400_create_audit_logs::Migration),
            Box::new(m2025_12_01_090500_create_secret_bundles::Migration),
        ]
    }
}
