//! Bulk export and import pipelines for directory identity migration.
//!
//! The export pipeline drains the source directory into paginated page
//! objects; the import pipeline replays those pages into the target tenant,
//! applying a per-record transform (attribute mapping, migration-tracking
//! attributes, UPN domain rewrite, identity normalization, one-time
//! password) and persisting a per-batch audit record.

pub mod audit;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod password;
pub mod summary;
pub mod transform;

pub use audit::{AuditEntry, ImportAuditLog};
pub use config::{ExportConfig, ImportConfig, TargetSignInType, DEFAULT_SELECT_FIELDS};
pub use error::{PipelineError, PipelineResult};
pub use export::{page_key, ExportPipeline};
pub use import::ImportPipeline;
pub use password::{generate_password, meets_complexity, GENERATED_PASSWORD_LENGTH};
pub use summary::{ExecutionResult, RunSummary};
pub use transform::{reverse_upn, transform_upn, UserTransformer};
