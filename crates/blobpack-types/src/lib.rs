//! Foundation types for blobpack.
//!
//! Every other blobpack crate depends on `blobpack-types`.
//!
//! # Key Types
//!
//! - [`BlobId`] -- 20-byte content digest, the public identifier of a blob
//! - [`BlobLocation`] -- where a blob's bytes live: segment, offset, size
//! - [`BlobRecord`] -- a digest paired with its location (one index log line)

pub mod error;
pub mod id;
pub mod location;

pub use error::TypeError;
pub use id::{BlobId, DIGEST_LEN};
pub use location::{BlobLocation, BlobRecord};
