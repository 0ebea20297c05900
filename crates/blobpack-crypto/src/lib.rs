//! Content hashing for blobpack.
//!
//! The digest function is BLAKE3 read to a fixed 20-byte output. It is pure and
//! needs no synchronization. No custom cryptography.

pub mod hasher;

pub use hasher::ContentHasher;
