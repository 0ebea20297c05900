use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use blobpack_types::{BlobId, BlobLocation};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};
use crate::index::{create_index, parse_line, INDEX_HEADER};
use crate::segment::{index_path, segment_path};

/// Summary of what recovery found in the index log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// `true` if the index did not exist and was created.
    pub fresh: bool,
    /// Complete records replayed.
    pub records: usize,
    /// Records whose digest was already mapped by an earlier line.
    pub duplicates: usize,
    /// Bytes of an unterminated final line cut from the index.
    pub truncated_tail_bytes: u64,
    /// Distinct segments referenced by the log.
    pub segments: usize,
}

/// In-memory state rebuilt from disk.
#[derive(Debug)]
pub struct Recovered {
    pub blobs: HashMap<BlobId, BlobLocation>,
    /// Segment that takes new writes.
    pub current_segment: u32,
    pub report: RecoveryReport,
}

/// Replay the index log for the store rooted at `base_path`.
///
/// A missing index means a fresh store and is created with its header. An
/// existing index must start with [`INDEX_HEADER`]. Every complete line must
/// decode; only a final line without its newline is treated as a torn write,
/// and it is cut off so later appends begin on a line boundary. Every
/// referenced segment must exist and be long enough for its records.
pub fn recover(base_path: &Path) -> StoreResult<Recovered> {
    let idx_path = index_path(base_path);
    if !idx_path.exists() {
        create_index(&idx_path)?;
        info!(path = %idx_path.display(), "initialized new store");
        return Ok(Recovered {
            blobs: HashMap::new(),
            current_segment: 0,
            report: RecoveryReport {
                fresh: true,
                ..RecoveryReport::default()
            },
        });
    }

    let mut reader = BufReader::new(File::open(&idx_path)?);
    let mut line = Vec::new();

    // Bounded so a large foreign file is not read whole before rejection.
    let n = (&mut reader)
        .take(INDEX_HEADER.len() as u64 + 1)
        .read_until(b'\n', &mut line)?;
    if line.last() != Some(&b'\n') || &line[..n - 1] != INDEX_HEADER.as_bytes() {
        let found = String::from_utf8_lossy(line.strip_suffix(b"\n").unwrap_or(&line));
        return Err(StoreError::InvalidIndexHeader {
            found: found.into_owned(),
        });
    }

    let mut report = RecoveryReport::default();
    let mut blobs: HashMap<BlobId, BlobLocation> = HashMap::new();
    // Highest byte each segment must contain.
    let mut segment_ends: BTreeMap<u32, u64> = BTreeMap::new();
    let mut valid_len = n as u64;
    let mut line_no: u64 = 1;

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        line_no += 1;
        if line.last() != Some(&b'\n') {
            report.truncated_tail_bytes = n as u64;
            break;
        }

        let record = parse_line(&line[..n - 1], line_no)?;
        let location = record.location;
        let end = segment_ends.entry(location.segment).or_insert(0);
        *end = (*end).max(location.end());
        if blobs.insert(record.id, location).is_some() {
            report.duplicates += 1;
            warn!(id = %record.id, line = line_no, "duplicate digest in index; later record wins");
        }
        report.records += 1;
        valid_len += n as u64;
    }
    drop(reader);

    if report.truncated_tail_bytes > 0 {
        warn!(
            bytes = report.truncated_tail_bytes,
            line = line_no,
            "incomplete trailing index record; truncating"
        );
        let file = OpenOptions::new().write(true).open(&idx_path)?;
        file.set_len(valid_len)?;
        file.sync_all()?;
    }

    for (&segment, &needed) in &segment_ends {
        let path = segment_path(base_path, segment);
        let actual = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::SegmentFileMissing { segment, path });
            }
            Err(e) => return Err(e.into()),
        };
        if needed > actual {
            return Err(StoreError::SegmentTruncated {
                segment,
                needed,
                actual,
            });
        }
    }
    report.segments = segment_ends.len();

    // A rotation may have created later, still-empty segments.
    let mut current_segment = segment_ends.keys().next_back().copied().unwrap_or(0);
    while let Some(next) = current_segment.checked_add(1) {
        if !segment_path(base_path, next).exists() {
            break;
        }
        current_segment = next;
    }

    info!(
        records = report.records,
        blobs = blobs.len(),
        segments = report.segments,
        current_segment,
        "recovered index"
    );
    Ok(Recovered {
        blobs,
        current_segment,
        report,
    })
}
