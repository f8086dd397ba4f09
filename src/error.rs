//! Crate-level error aggregation for the handful of operations that cross module
//! boundaries (opening a database, running a full pipeline sweep). Individual
//! pipeline stages swallow their own per-page/per-cell failures as warnings
//! (spec.md §4.13) logged through the `log` facade; only genuinely fatal
//! conditions reach here.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Reading the file header failed: {0}")]
    Header(#[from] crate::header::Error),
    #[error("Accessing the evidence file failed: {0}")]
    Source(#[from] crate::source::Error),
    #[error("Walking the freelist failed: {0}")]
    Freelist(#[from] crate::freelist::Error),
}
