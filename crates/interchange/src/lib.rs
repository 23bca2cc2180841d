//! testboard-interchange: shared record and wire-message types.
//!
//! [`Record`] is the unit the store hands out. [`ServerFrame`] is the only
//! message the server pushes: a full snapshot of one kind's records plus the
//! schema entry describing them. Viewers decode it as a [`ReceivedFrame`],
//! which accepts records of any shape.

pub mod message;
pub mod record;

pub use message::{ReceivedFrame, ReceivedSnapshot, ServerFrame, SnapshotMessage, SNAPSHOT_EVENT};
pub use record::{Record, RecordStatus, SnapshotRecord};
