//! rollcall-store — Durable state for Rollcall.
//!
//! Two stores live here: the enrollment database mapping each student
//! identity to its reference embeddings, and the attendance ledger, a CSV
//! table with one row per marking event and one column per student. The
//! [`query`] module derives reports from a ledger snapshot.

mod encode;
mod schema;

pub mod enrollment;
pub mod error;
pub mod ledger;
pub mod query;

pub use enrollment::EnrollmentStore;
pub use error::{EnrollmentError, LedgerError};
pub use ledger::{
    AttendanceRow, Ledger, LedgerSnapshot, Mark, RecordPolicy, DATE_COLUMN, SECTION_COLUMN,
    UNKNOWN_SECTION,
};
