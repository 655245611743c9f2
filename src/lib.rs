//! Line-addressed diff engine: [`parse`] a diff document, then [`apply_batch`] it
//! under a project root.

pub mod applier;
pub mod config;
pub mod diff;
pub mod directive;
pub mod encoding;
pub mod error;
pub mod files;
pub mod lifecycle;
pub mod logging;
pub mod normalize;
pub mod numbered;
pub mod parser;
pub mod report;
pub mod verify;

pub use directive::{EditOperation, FileDirective};
pub use error::{BatchError, EditError};
pub use files::ProjectRoot;
pub use lifecycle::{ApplyOptions, apply_batch, apply_directives};
pub use parser::{ParsedBlock, parse, parse_operations};
pub use report::{ApplyResult, ApplyStatus, BatchReport};
