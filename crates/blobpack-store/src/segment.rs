use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

/// Path of the index log for a store rooted at `base_path`.
pub fn index_path(base_path: &Path) -> PathBuf {
    with_suffix(base_path, "_idx.txt")
}

/// Path of segment `number` for a store rooted at `base_path`.
pub fn segment_path(base_path: &Path, number: u32) -> PathBuf {
    with_suffix(base_path, &format!("_{number}.txt"))
}

fn with_suffix(base_path: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(base_path.as_os_str());
    path.push(suffix);
    PathBuf::from(path)
}

/// The writable, current segment file.
///
/// Opened read+append so the same descriptor also serves reads of this
/// segment. `size` always equals the file's length on disk.
pub struct SegmentWriter {
    number: u32,
    file: File,
    size: u64,
}

impl SegmentWriter {
    /// Open (or create) segment `number`, positioned at its current end.
    pub fn open(base_path: &Path, number: u32) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(segment_path(base_path, number))?;
        let size = file.metadata()?.len();
        Ok(Self { number, file, size })
    }

    /// Append `data` and sync it to stable storage. Returns its offset.
    ///
    /// The offset is the file's real end, so bytes orphaned by an earlier
    /// failed write never shift later records.
    pub fn append(&mut self, data: &[u8]) -> io::Result<u64> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;
        self.size = offset + data.len() as u64;
        debug!(segment = self.number, offset, len = data.len(), "segment append");
        Ok(offset)
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Bytes written to this segment, including any orphaned tail.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn file(&self) -> &File {
        &self.file
    }
}

/// Read exactly `size` bytes starting at `offset`.
pub(crate) fn read_exact_at(file: &File, offset: u64, size: u64) -> io::Result<Vec<u8>> {
    let len = usize::try_from(size).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "blob size exceeds address space")
    })?;
    let mut reader = file;
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_layout() {
        let base = Path::new("/data/store");
        assert_eq!(index_path(base), PathBuf::from("/data/store_idx.txt"));
        assert_eq!(segment_path(base, 0), PathBuf::from("/data/store_0.txt"));
        assert_eq!(segment_path(base, 12), PathBuf::from("/data/store_12.txt"));
    }

    #[test]
    fn append_returns_increasing_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("s");
        let mut seg = SegmentWriter::open(&base, 0).unwrap();

        assert_eq!(seg.append(b"hello").unwrap(), 0);
        assert_eq!(seg.append(b"world!!").unwrap(), 5);
        assert_eq!(seg.size(), 12);
        assert_eq!(std::fs::metadata(segment_path(&base, 0)).unwrap().len(), 12);
    }

    #[test]
    fn reopen_resumes_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("s");
        {
            let mut seg = SegmentWriter::open(&base, 3).unwrap();
            seg.append(b"abc").unwrap();
        }
        let mut seg = SegmentWriter::open(&base, 3).unwrap();
        assert_eq!(seg.number(), 3);
        assert_eq!(seg.size(), 3);
        assert_eq!(seg.append(b"def").unwrap(), 3);
    }

    #[test]
    fn orphaned_bytes_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("s");
        let mut seg = SegmentWriter::open(&base, 0).unwrap();
        seg.append(b"abc").unwrap();
        // Bytes appended behind the writer's back.
        {
            let mut f = OpenOptions::new()
                .append(true)
                .open(segment_path(&base, 0))
                .unwrap();
            f.write_all(b"junk").unwrap();
        }
        assert_eq!(seg.append(b"xyz").unwrap(), 7);
        assert_eq!(seg.size(), 10);
    }

    #[test]
    fn read_exact_at_reads_the_range() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("s");
        let mut seg = SegmentWriter::open(&base, 0).unwrap();
        seg.append(b"hello").unwrap();
        seg.append(b"world").unwrap();

        assert_eq!(read_exact_at(seg.file(), 5, 5).unwrap(), b"world");
        assert_eq!(read_exact_at(seg.file(), 0, 5).unwrap(), b"hello");
        assert!(read_exact_at(seg.file(), 3, 0).unwrap().is_empty());
    }

    #[test]
    fn read_past_end_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("s");
        let mut seg = SegmentWriter::open(&base, 0).unwrap();
        seg.append(b"short").unwrap();
        let err = read_exact_at(seg.file(), 2, 10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
