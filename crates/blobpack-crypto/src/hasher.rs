use blobpack_types::{BlobId, DIGEST_LEN};

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation. The digest is taken from BLAKE3's extendable output, truncated
/// to [`DIGEST_LEN`] bytes.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher used for stored blobs.
    pub const BLOB: Self = Self {
        domain: "blobpack-blob-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> BlobId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        let mut digest = [0u8; DIGEST_LEN];
        hasher.finalize_xof().fill(&mut digest);
        BlobId::from_digest(digest)
    }

    /// Verify that data produces the expected blob ID.
    pub fn verify(&self, data: &[u8], expected: &BlobId) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}
