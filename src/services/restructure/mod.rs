//! Archival, mutation, validation and rollback of approved ops.

mod archive;
mod executor;
mod locks;
mod mutation;
mod validator;

pub use archive::{ArchiveManifest, ArchiveStore, ArchivedFile, ArchivedUnit};
pub use executor::{ExecutionReport, OpReport, RestructuringExecutor};
pub use locks::{UnitLockGuard, UnitLocks};
pub use mutation::{
    BODY_SEPARATOR, BodySections, body_sections, merge_units, render_descriptor, split_unit,
};
pub use validator::{
    DEFAULT_MAX_BODY_LINES, DefaultValidator, UnitCandidate, ValidationReport, Validator,
};
