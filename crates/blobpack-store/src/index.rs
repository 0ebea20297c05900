//! Index log: the line format and the append-only writer.
//!
//! ```text
//! blobpack index v1
//! <40 hex digest>,<segment>,<offset>,<size>
//! ...
//! ```
//!
//! Every line, header included, ends in `\n`. A record is written with one
//! `write_all` of the whole line, so a crash leaves at worst one final line
//! without its newline.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use blobpack_types::{BlobId, BlobLocation, BlobRecord, DIGEST_LEN};
use tracing::{debug, warn};

use crate::config::IndexSync;
use crate::error::{StoreError, StoreResult};

/// First line of every index file.
pub const INDEX_HEADER: &str = "blobpack index v1";

/// Encode one record as an index line, trailing newline included.
pub fn format_line(record: &BlobRecord) -> String {
    let loc = &record.location;
    format!(
        "{},{},{},{}\n",
        record.id.to_hex(),
        loc.segment,
        loc.offset,
        loc.size
    )
}

/// Decode one index line (without its newline). `line` is 1-based.
pub fn parse_line(raw: &[u8], line: u64) -> StoreResult<BlobRecord> {
    let invalid = |reason: String| StoreError::InvalidIndexLine { line, reason };

    let text = std::str::from_utf8(raw).map_err(|_| invalid("not valid UTF-8".into()))?;
    let fields: Vec<&str> = text.split(',').collect();
    let [digest, segment, offset, size] = fields.as_slice() else {
        return Err(invalid(format!("expected 4 fields, got {}", fields.len())));
    };

    let digest = hex::decode(digest).map_err(|e| invalid(format!("digest: {e}")))?;
    if digest.len() != DIGEST_LEN {
        return Err(StoreError::InvalidDigestLength {
            line,
            expected: DIGEST_LEN,
            actual: digest.len(),
        });
    }
    let id = BlobId::from_slice(&digest).map_err(|e| invalid(e.to_string()))?;

    let segment = segment
        .parse::<u32>()
        .map_err(|e| invalid(format!("segment {segment:?}: {e}")))?;
    let offset = offset
        .parse::<u64>()
        .map_err(|e| invalid(format!("offset {offset:?}: {e}")))?;
    let size = size
        .parse::<u64>()
        .map_err(|e| invalid(format!("size {size:?}: {e}")))?;

    Ok(BlobRecord::new(id, BlobLocation::new(segment, offset, size)))
}

/// Create a fresh index file holding only the header.
///
/// The header is written to a temporary file in the same directory and then
/// renamed into place, so a crash never leaves an empty or half-written
/// index behind.
pub fn create_index(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    tmp.write_all(INDEX_HEADER.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), "created index");
    Ok(())
}

/// Append handle on the index log.
pub struct IndexWriter {
    file: File,
    /// Length of the log up to the end of its last complete record.
    len: u64,
    sync: IndexSync,
}

impl IndexWriter {
    /// Open an existing index for appending.
    pub fn open(path: &Path, sync: IndexSync) -> io::Result<Self> {
        let file = OpenOptions::new().append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len, sync })
    }

    /// Append one record.
    ///
    /// On failure the file is cut back to its previous length so a torn
    /// record can never end up in the middle of the log.
    pub fn append(&mut self, record: &BlobRecord) -> StoreResult<()> {
        let line = format_line(record);
        if let Err(e) = self.write_line(line.as_bytes()) {
            if let Err(rollback) = self.file.set_len(self.len) {
                warn!(error = %rollback, len = self.len, "index rollback failed");
            }
            return Err(e.into());
        }
        self.len += line.len() as u64;
        Ok(())
    }

    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.file.write_all(line)?;
        if self.sync == IndexSync::EveryWrite {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Force everything appended so far to stable storage.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(byte: u8, segment: u32, offset: u64, size: u64) -> BlobRecord {
        BlobRecord::new(
            BlobId::from_digest([byte; DIGEST_LEN]),
            BlobLocation::new(segment, offset, size),
        )
    }

    #[test]
    fn format_is_comma_framed() {
        let line = format_line(&record(0xab, 2, 100, 7));
        assert_eq!(line, format!("{},2,100,7\n", "ab".repeat(20)));
    }

    #[test]
    fn parse_reads_formatted_line() {
        let rec = record(0x01, 7, 12345, 99);
        let line = format_line(&rec);
        let parsed = parse_line(line.trim_end().as_bytes(), 2).unwrap();
        assert_eq!(parsed, rec);
    }

    #[test]
    fn parse_rejects_wrong_field_count() {
        let err = parse_line(b"abcd,1,2", 4).unwrap_err();
        match err {
            StoreError::InvalidIndexLine { line, reason } => {
                assert_eq!(line, 4);
                assert!(reason.contains("3"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_rejects_short_digest() {
        let err = parse_line(b"deadbeef,0,0,5", 2).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidDigestLength {
                line: 2,
                expected: 20,
                actual: 4
            }
        ));
    }

    #[test]
    fn parse_rejects_bad_hex() {
        let raw = format!("{},0,0,5", "zz".repeat(20));
        let err = parse_line(raw.as_bytes(), 3).unwrap_err();
        assert!(matches!(err, StoreError::InvalidIndexLine { line: 3, .. }));
    }

    #[test]
    fn parse_rejects_negative_offset() {
        let raw = format!("{},0,-1,5", "00".repeat(20));
        let err = parse_line(raw.as_bytes(), 2).unwrap_err();
        assert!(matches!(err, StoreError::InvalidIndexLine { line: 2, .. }));
    }

    #[test]
    fn parse_rejects_non_utf8() {
        let err = parse_line(&[0xff, 0xfe, b','], 2).unwrap_err();
        assert!(matches!(err, StoreError::InvalidIndexLine { .. }));
    }

    #[test]
    fn create_writes_only_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("s_idx.txt");
        create_index(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, format!("{INDEX_HEADER}\n"));
        // No temporary files left behind.
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn writer_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s_idx.txt");
        create_index(&path).unwrap();

        let mut writer = IndexWriter::open(&path, IndexSync::EveryWrite).unwrap();
        let header_len = writer.len();
        writer.append(&record(1, 0, 0, 5)).unwrap();
        writer.append(&record(2, 0, 5, 7)).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], INDEX_HEADER);
        assert_eq!(writer.len(), contents.len() as u64);
        assert!(writer.len() > header_len);
        writer.sync().unwrap();
    }
}
