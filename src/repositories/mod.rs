//! # Repository Layer
//!
//! Repositories encapsulate SeaORM operations per table. Reads go through
//! the repository's own connection; writes that must commit together take
//! any `ConnectionTrait` so callers can pass an open transaction.

pub mod approval;
pub mod audit_log;
pub mod employee;
pub mod provider_account;
pub mod secret_bundle;
pub mod workflow_request;

pub use approval::ApprovalRepository;
pub use audit_log::{AuditListFilter, AuditLogRepository};
pub use employee::{EmployeeRepository, NewEmployee};
pub use provider_account::{NewProviderAccount, ProviderAccountRepository};
pub use secret_bundle::SecretBundleRepository;
pub use workflow_request::{WorkflowListFilter, WorkflowRequestRepository};
