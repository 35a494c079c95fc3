// Tellus core model
//
// This crate holds everything the execution engine agrees on before any I/O
// happens: the canonical I/O description model and its converters, the
// application-package model and loader, the process/job/service entities,
// the identifier grammar, the status vocabularies with their progress
// mapping, and the engine configuration.
//
// Key design decisions:
// - Every I/O dialect funnels through one canonical tagged model (IoKind)
// - Field-name aliasing is resolved in exactly one place (io::normalize_fields)
// - The loader resolves workflow steps through an iterative worklist, so
//   diamond DAGs load each sub-package once
// - Remote WPS-1 import is a trait seam; the XML lives in tellus-wps1
// - Converters return Result; nothing in this crate panics on bad documents

pub mod config;
pub mod error;
pub mod ident;
pub mod io;
pub mod job;
pub mod package;
pub mod process;
pub mod quote;
pub mod service;
pub mod status;

// Re-exports for convenience
pub use config::{EngineConfig, EngineRole, PollSchedule, RetryPolicy};
pub use error::{EngineError, Result};
pub use ident::{is_valid_identifier, sanitize_identifier, validate_identifier};
pub use io::{
    io_from_json, io_from_package_input, io_from_package_output, io_to_json,
    merge_io_descriptions, normalize_fields, AllowedValues, Format, IoDescription, IoKind,
    LiteralType, MaxOccurs, Metadata,
};
pub use job::{ExecuteMode, Job, JobException};
pub use package::{
    topological_order, ApplicationKind, ImportedProcess, LoadedPackage, Package, PackageClass,
    PackageLoader, RemoteProcessImporter, SubProcessResolver, WorkflowStep,
};
pub use process::{Process, ProcessType, Visibility};
pub use quote::{Bill, Quote};
pub use service::{Service, ServiceType};
pub use status::{map_progress, map_status, workflow_step_progress, JobStatus, RemoteStatus};
