//! # Enrollment Ledger
//!
//! A library for bulk student enrollment import with staged validation and
//! multi-stage tuition payment reconciliation.
//!
//! ## Core Concepts
//!
//! - **Raw rows**: the untyped cells a spreadsheet codec hands over, one per
//!   prospective student
//! - **Staging**: an in-memory review session where the operator fixes
//!   validation errors before anything is written
//! - **Commit**: sequential, per-row writes with failure isolation — one bad
//!   row never aborts the batch, and duplicates are skipped, not overwritten
//! - **Reconciliation**: a pure read-side breakdown of the payment ledger
//!   into per-student, per-stage totals and outstanding balances
//!
//! ## Example
//!
//! ```rust,ignore
//! use enrollment_ledger::*;
//!
//! let mut store = MemoryStore::with_courses(courses);
//!
//! // Review loop: parse, show errors, let the operator fix cells.
//! let mut session = stage_batch(&store, raw_rows)?;
//! session.edit(2, RowField::JoinDate, Some("15/01/2026".to_string()))?;
//! assert_eq!(session.readiness().error_count, 0);
//!
//! // Commit and report.
//! let outcome = CommitPipeline::new(&mut store)?.commit(session.into_rows());
//! println!("{}", outcome.to_markdown());
//!
//! // Reconcile the resulting ledger.
//! let report = breakdown(
//!     &store.list_students()?,
//!     &store.list_ledger_entries()?,
//!     &store.list_courses()?,
//!     &BreakdownFilter::default(),
//! );
//! ```

pub mod commit;
pub mod error;
pub mod identity;
pub mod normalize;
pub mod reconcile;
pub mod schema;
pub mod staging;
pub mod store;
pub mod utils;

pub use commit::CommitPipeline;
pub use error::{ImportError, Result};
pub use identity::{
    next_referral_code, next_student_code, resolve_referral, ResolvedReferral,
};
pub use normalize::{find_course, normalize};
pub use reconcile::{
    breakdown, BreakdownFilter, BreakdownReport, BreakdownTotals, OtherCell, SortKey,
    StageCell, StudentBreakdownRow,
};
pub use schema::*;
pub use staging::{Readiness, StagedRow, StagingSession};
pub use store::{EnrollmentStore, MemoryStore, StoreError};

use log::{debug, info};

/// Opens a staging session for a parsed batch, validating every row against
/// the store's course list.
pub fn stage_batch<S: EnrollmentStore>(
    store: &S,
    raw_rows: Vec<RawRow>,
) -> Result<StagingSession> {
    let courses = store.list_courses()?;
    let session = StagingSession::new(raw_rows, courses);

    let readiness = session.readiness();
    info!(
        "staged batch: {} row(s), {} ready, {} with errors",
        readiness.total, readiness.ready_count, readiness.error_count
    );
    Ok(session)
}

/// One-shot import: normalize and commit without an operator review loop.
/// Rows that fail validation are carried through and fail individually at
/// commit, so the outcome still accounts for every row.
pub fn import_batch<S: EnrollmentStore>(
    store: &mut S,
    raw_rows: Vec<RawRow>,
) -> Result<ImportOutcome> {
    let session = stage_batch(store, raw_rows)?;
    let readiness = session.readiness();
    if readiness.error_count > 0 {
        debug!(
            "committing with {} row(s) still failing validation",
            readiness.error_count
        );
    }

    let mut pipeline = CommitPipeline::new(store)?;
    Ok(pipeline.commit(session.into_rows()))
}
