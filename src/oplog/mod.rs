//! Per-dataset signed operation logs.
//!
//! Every dataset is recorded as an append-only chain of signed
//! [`Operation`](types::Operation)s owned by one author key. The chain is
//! folded to derive the dataset's current state and persisted whole as a
//! content-addressed blob.
//!
//! # Modules
//!
//! - [`types`]: [`Operation`](types::Operation) and
//!   [`OpPayload`](types::OpPayload) with canonical JSON
//! - [`fold`]: full replay and incremental apply
//! - [`log`]: the [`Oplog`](log::Oplog) container and its verification
//! - [`persist`]: read and write oplog blobs

pub mod fold;
pub mod log;
pub mod persist;
pub mod types;

pub use fold::{DatasetState, FoldError, VersionEntry};
pub use log::{Oplog, OplogError, sign_operation};
pub use types::{OpPayload, Operation, SignedOperation};
