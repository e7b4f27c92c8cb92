//! Re-exports the workspace error type.
//!
//! A single serializable [`IngestError`] is shared by every crate in the
//! workspace rather than keeping a parallel non-serializable variant here, so
//! errors can cross the coordinator's filesystem boundary and the storage
//! sink's warning lists without a conversion layer.

pub use ingest_types::IngestError;
