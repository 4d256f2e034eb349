//! Graph core of a visual login/registration flow builder.
//!
//! Steps and their UI elements carry declarative action references; this crate
//! turns them into canvas edges, expands template placeholders into unique
//! ids, merges catalog display metadata into instances, and sequences the
//! initial canvas build through [`orchestrator::FlowInitializer`].
#![forbid(unsafe_code)]

pub mod catalog;
pub mod config;
pub mod definition;
pub mod edges;
pub mod error;
pub mod fingerprint;
pub mod id;
pub mod layout;
pub mod loader;
pub mod model;
pub mod orchestrator;
pub mod resolve;
pub mod template;
pub mod validate;

pub use config::ComposerConfig;
pub use edges::generate_edges;
pub use error::{FlowError, Result};
pub use model::{CanvasGraph, Edge, Step, StepType};
pub use validate::validate_edges;
