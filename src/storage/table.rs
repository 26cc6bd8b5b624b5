//! Append-only CSV record tables.
//!
//! A [`RecordTable`] is the sink side of a job: one file, one header, rows
//! appended in capture order. The file is opened for append on every write,
//! so rows are never rewritten and a table survives process restarts.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::storage::StorageError;
use crate::storage::types::{Row, Sample};

/// Bytes scanned per step when looking for the last complete line.
const TAIL_WINDOW: u64 = 4096;

/// Append-only record table for one sample kind.
///
/// The header is written together with the first row of an empty file, in a
/// single write, so a table is never left holding only part of its header.
#[derive(Debug)]
pub struct RecordTable<S> {
    path: PathBuf,
    tail_checked: bool,
    rows_appended: u64,
    _sample: PhantomData<fn() -> S>,
}

impl<S: Sample> RecordTable<S> {
    /// Create a table handle. Nothing touches the disk until the first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tail_checked: false,
            rows_appended: 0,
            _sample: PhantomData,
        }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this handle.
    pub fn rows_appended(&self) -> u64 {
        self.rows_appended
    }

    /// Append one row, writing the header first if the file is empty.
    ///
    /// # Errors
    /// Returns `StorageError::Io` if the directory, file or write fails.
    pub fn append(&mut self, row: &Row<S>) -> Result<(), StorageError> {
        ensure_parent_dir(&self.path)?;

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;

        let mut len = file
            .metadata()
            .map_err(|e| StorageError::io(&self.path, e))?
            .len();

        if !self.tail_checked {
            len = repair_torn_tail(&mut file, &self.path, len)?;
            self.tail_checked = true;
        }

        let mut buf = String::new();
        if len == 0 {
            buf.push_str(S::KIND.header());
            buf.push('\n');
        }
        buf.push_str(&row.to_line());

        file.write_all(buf.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| StorageError::io(&self.path, e))?;

        self.rows_appended += 1;
        tracing::trace!(path = %self.path.display(), kind = %S::KIND, "Row appended");
        Ok(())
    }

    /// Read every row currently in the table.
    pub fn read_rows(&self) -> Result<Vec<Row<S>>, StorageError> {
        read_table(&self.path)
    }
}

/// Read a record table from disk.
///
/// An empty file yields no rows. Blank lines are ignored.
///
/// # Errors
/// Returns `StorageError::HeaderMismatch` if the first line is not the header
/// for `S`, or `StorageError::InvalidData` for an unparsable row.
pub fn read_table<S: Sample>(path: &Path) -> Result<Vec<Row<S>>, StorageError> {
    let content = std::fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
    data_lines::<S>(path, &content)?
        .map(Row::parse_line)
        .collect()
}

/// Read a record table, skipping rows that do not parse.
///
/// Returns the rows and the number of lines skipped.
///
/// # Errors
/// Returns `StorageError::Io` if the file cannot be read, or
/// `StorageError::HeaderMismatch` if the first line is not the header for `S`.
pub fn scan_table<S: Sample>(path: &Path) -> Result<(Vec<Row<S>>, usize), StorageError> {
    let content = std::fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
    let mut rows = Vec::new();
    let mut skipped = 0;
    for line in data_lines::<S>(path, &content)? {
        match Row::parse_line(line) {
            Ok(row) => rows.push(row),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Unparsable row skipped");
                skipped += 1;
            }
        }
    }
    Ok((rows, skipped))
}

/// Non-blank lines after a checked header.
fn data_lines<'a, S: Sample>(
    path: &Path,
    content: &'a str,
) -> Result<impl Iterator<Item = &'a str>, StorageError> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    if let Some(header) = lines.next()
        && header.trim() != S::KIND.header()
    {
        return Err(StorageError::HeaderMismatch {
            path: path.to_path_buf(),
            found: header.to_string(),
        });
    }
    Ok(lines)
}

fn ensure_parent_dir(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }
    Ok(())
}

/// Cut a trailing partial line left by an interrupted write.
///
/// Returns the file length after repair.
fn repair_torn_tail(file: &mut File, path: &Path, len: u64) -> Result<u64, StorageError> {
    if len == 0 {
        return Ok(0);
    }

    let mut end = len;
    let keep = loop {
        let start = end.saturating_sub(TAIL_WINDOW);
        let mut chunk = Vec::with_capacity((end - start) as usize);
        file.seek(SeekFrom::Start(start))
            .and_then(|_| Read::take(&mut *file, end - start).read_to_end(&mut chunk))
            .map_err(|e| StorageError::io(path, e))?;

        if end == len && chunk.last() == Some(&b'\n') {
            return Ok(len);
        }
        if let Some(pos) = chunk.iter().rposition(|b| *b == b'\n') {
            break start + pos as u64 + 1;
        }
        if start == 0 {
            break 0;
        }
        end = start;
    };

    tracing::warn!(
        path = %path.display(),
        dropped_bytes = len - keep,
        "Discarding partial trailing row"
    );
    file.set_len(keep).map_err(|e| StorageError::io(path, e))?;
    Ok(keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::{SpeedSample, UsageSample};
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::tempdir;

    fn ts(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(12, minute, 0)
            .unwrap()
    }

    fn usage_row(minute: u32, sent: u64, recv: u64) -> Row<UsageSample> {
        Row::new(ts(minute), UsageSample::new(sent, recv))
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usage.csv");
        let mut table = RecordTable::<UsageSample>::new(&path);

        for i in 0..4 {
            table.append(&usage_row(i, 100 * u64::from(i), 200)).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "timestamp,sent_bytes,recv_bytes");
        assert_eq!(
            content.matches("timestamp,").count(),
            1,
            "header must appear exactly once"
        );
        assert_eq!(table.rows_appended(), 4);
    }

    #[test]
    fn test_header_once_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usage.csv");

        RecordTable::<UsageSample>::new(&path)
            .append(&usage_row(0, 1, 2))
            .unwrap();
        // Simulates a process restart appending to the same file
        let mut reopened = RecordTable::<UsageSample>::new(&path);
        reopened.append(&usage_row(1, 3, 4)).unwrap();
        reopened.append(&usage_row(2, 5, 6)).unwrap();

        let rows = reopened.read_rows().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].sample, UsageSample::new(5, 6));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("timestamp,").count(), 1);
    }

    #[test]
    fn test_creates_results_dir_on_demand() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results").join("nested").join("speed.csv");
        let mut table = RecordTable::<SpeedSample>::new(&path);

        assert!(!path.exists());
        table
            .append(&Row::new(ts(0), SpeedSample::new(1.5, 2.5)))
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_torn_tail_is_repaired() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usage.csv");
        std::fs::write(
            &path,
            "timestamp,sent_bytes,recv_bytes\n2024-05-17 12:00:00,1,2\n2024-05-17 12:01",
        )
        .unwrap();

        let mut table = RecordTable::<UsageSample>::new(&path);
        table.append(&usage_row(2, 7, 8)).unwrap();

        let rows = table.read_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sample, UsageSample::new(1, 2));
        assert_eq!(rows[1].sample, UsageSample::new(7, 8));
    }

    #[test]
    fn test_torn_header_is_rewritten() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("speed.csv");
        std::fs::write(&path, "timestamp,downl").unwrap();

        let mut table = RecordTable::<SpeedSample>::new(&path);
        table
            .append(&Row::new(ts(0), SpeedSample::new(10.0, 20.0)))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("timestamp,download_speed,upload_speed\n"));
        assert_eq!(table.read_rows().unwrap().len(), 1);
    }

    #[test]
    fn test_append_failure_is_reported() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened as a table file
        let mut table = RecordTable::<UsageSample>::new(dir.path());

        let result = table.append(&usage_row(0, 1, 2));
        assert!(matches!(result, Err(StorageError::Io { .. })));
        assert_eq!(table.rows_appended(), 0);
    }

    #[test]
    fn test_read_rejects_wrong_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usage.csv");
        RecordTable::<UsageSample>::new(&path)
            .append(&usage_row(0, 1, 2))
            .unwrap();

        let result = read_table::<SpeedSample>(&path);
        assert!(matches!(result, Err(StorageError::HeaderMismatch { .. })));
    }

    #[test]
    fn test_read_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usage.csv");
        std::fs::write(&path, "").unwrap();

        assert!(read_table::<UsageSample>(&path).unwrap().is_empty());
    }

    #[test]
    fn test_scan_skips_bad_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usage.csv");
        std::fs::write(
            &path,
            "timestamp,sent_bytes,recv_bytes\n\
             2024-05-17 09:31:00,10,20\n\
             2024-05-17 09:32:00,garbage\n\
             2024-05-17 09:33:00,30,40\n\
             2024-05-17 09:3",
        )
        .unwrap();

        assert!(read_table::<UsageSample>(&path).is_err());
        let (rows, skipped) = scan_table::<UsageSample>(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(skipped, 2);
        assert_eq!(rows[1].sample.sent_bytes, 30);

        let result = scan_table::<SpeedSample>(&path);
        assert!(matches!(result, Err(StorageError::HeaderMismatch { .. })));
    }
}
