//! Precondition-violation errors (spec.md §7, class 2). Allocation failure
//! (class 1) is not represented here: it is infallible in practice on the
//! Rust global allocator, which aborts rather than returning control, so
//! `open`/`rebind` do not surface it as a checked error — matching the
//! reference implementation's own stated policy.

use thiserror::Error;

/// Errors returned for precondition violations on the public scheduler API.
/// The C reference implementation treats all of these as assertion
/// failures; this crate reports them instead, since the scheduler's public
/// entry points are reachable from parsed, untrusted PRIORITY/RST_STREAM
/// frames and a malformed frame should not be able to abort the connection.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// `close`/`rebind`/`set_active` was called with a `RefId` that does
    /// not currently name an open reference (already closed, or never
    /// opened on this scheduler).
    #[error("reference is not open")]
    NotOpen,
    /// `set_active` was called on a reference whose `self_is_active` was
    /// already true.
    #[error("reference is already active")]
    AlreadyActive,
    /// `dispose` was called while open references remain.
    #[error("scheduler disposed with open references remaining")]
    SchedulerNotEmpty,
}
