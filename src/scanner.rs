//! One-pass scanner turning a block-structured raw file into object records.
//!
//! A block is one `#` header line followed by the object's epoch rows. The
//! scanner only counts epoch rows; their values are parsed by the reader.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::record::ObjectRecord;

struct PendingHeader {
    text: String,
    offset: u64,
    line: u64,
}

/// Iterator over the records of one raw file, in file order.
///
/// Stops after the first error.
pub struct RecordScanner<R> {
    reader: R,
    path: PathBuf,
    position: u64,
    line: u64,
    pending: Option<PendingHeader>,
    buf: Vec<u8>,
    done: bool,
}

impl RecordScanner<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), path))
    }
}

impl<R: BufRead> RecordScanner<R> {
    /// `path` is only used to label errors.
    pub fn new(reader: R, path: &Path) -> Self {
        RecordScanner {
            reader,
            path: path.to_path_buf(),
            position: 0,
            line: 0,
            pending: None,
            buf: Vec::new(),
            done: false,
        }
    }

    /// Read one line; returns its starting offset, or `None` at EOF.
    fn read_line(&mut self) -> Result<Option<u64>> {
        self.buf.clear();
        let start = self.position;
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.position += n as u64;
        self.line += 1;
        Ok(Some(start))
    }

    fn is_blank(&self) -> bool {
        self.buf.iter().all(|b| b.is_ascii_whitespace())
    }

    fn is_header(&self) -> bool {
        self.buf.first() == Some(&b'#')
    }

    fn take_header(&self, offset: u64) -> Result<PendingHeader> {
        let text = std::str::from_utf8(&self.buf)
            .map_err(|_| Error::corruption(&self.path, self.line, "header is not valid UTF-8"))?
            .to_string();
        Ok(PendingHeader {
            text,
            offset,
            line: self.line,
        })
    }

    fn next_record(&mut self) -> Result<Option<ObjectRecord>> {
        let header = match self.pending.take() {
            Some(h) => h,
            None => loop {
                let Some(offset) = self.read_line()? else {
                    return Ok(None);
                };
                if self.is_blank() {
                    continue;
                }
                if !self.is_header() {
                    return Err(Error::corruption(
                        &self.path,
                        self.line,
                        "epoch row before the first header",
                    ));
                }
                break self.take_header(offset)?;
            },
        };

        let record = ObjectRecord::parse_header(&header.text, header.offset)
            .map_err(|msg| Error::corruption(&self.path, header.line, msg))?;

        let mut found: u32 = 0;
        while let Some(offset) = self.read_line()? {
            if self.is_header() {
                self.pending = Some(self.take_header(offset)?);
                break;
            }
            if !self.is_blank() {
                found += 1;
            }
        }

        if found != record.epoch_count {
            return Err(Error::EpochCountMismatch {
                path: self.path.clone(),
                id: record.id,
                declared: record.epoch_count,
                found,
            });
        }
        Ok(Some(record))
    }
}

impl<R: BufRead> Iterator for RecordScanner<R> {
    type Item = Result<ObjectRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(rec)) => Some(Ok(rec)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Scan a whole raw file into memory.
pub fn scan_file(path: &Path) -> Result<Vec<ObjectRecord>> {
    RecordScanner::open(path)?.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Band;
    use std::io::Cursor;

    fn scan(text: &str) -> Result<Vec<ObjectRecord>> {
        RecordScanner::new(Cursor::new(text.as_bytes()), Path::new("mem.txt")).collect()
    }

    const TWO_BLOCKS: &str = "\
# 1 2 1 5 0 10.5 20.5
58000.1 18.2 0.05 0.01 0
58001.1 18.3 0.05 0.01 0
# 2 1 2 5 3 10.6 20.6
58000.2 17.9 0.04 0.02 0
";

    #[test]
    fn offsets_point_at_header_lines() {
        let recs = scan(TWO_BLOCKS).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].byte_offset, 0);
        let second = TWO_BLOCKS.find("# 2").unwrap() as u64;
        assert_eq!(recs[1].byte_offset, second);
        assert_eq!(recs[1].band, Band::R);
        assert_eq!(recs[1].partition_id, 3);
    }

    #[test]
    fn crlf_offsets_count_raw_bytes() {
        let text = TWO_BLOCKS.replace('\n', "\r\n");
        let recs = scan(&text).unwrap();
        assert_eq!(recs[1].byte_offset, text.find("# 2").unwrap() as u64);
    }

    #[test]
    fn blank_lines_are_not_epochs() {
        let text = "\n# 1 1 1 5 0 10.5 20.5\n\n58000.1 18.2 0.05 0.01 0\n\n";
        let recs = scan(text).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].byte_offset, 1);
    }

    #[test]
    fn zero_epoch_block_at_eof() {
        let recs = scan("# 1 0 1 5 0 10.5 20.5").unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].epoch_count, 0);
    }

    #[test]
    fn epoch_count_mismatch_is_corruption() {
        let text = "# 1 3 1 5 0 10.5 20.5\n58000.1 18.2 0.05 0.01 0\n# 2 0 1 5 0 1 1\n";
        let mut scanner = RecordScanner::new(Cursor::new(text.as_bytes()), Path::new("m.txt"));
        let err = scanner.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::EpochCountMismatch {
                id: 1,
                declared: 3,
                found: 1,
                ..
            }
        ));
        assert!(err.is_corruption());
        assert!(scanner.next().is_none());
    }

    #[test]
    fn leading_epoch_row_is_corruption() {
        let err = scan("58000.1 18.2 0.05 0.01 0\n# 1 0 1 5 0 1 1\n").unwrap_err();
        assert!(matches!(err, Error::Corruption { line: 1, .. }));
    }

    #[test]
    fn unparsable_header_reports_its_line() {
        let err = scan("# 1 0 1 5 0 1 1\n# 2 0 9 5 0 1 1\n").unwrap_err();
        assert!(matches!(err, Error::Corruption { line: 2, .. }));
    }

    #[test]
    fn empty_input() {
        assert!(scan("").unwrap().is_empty());
    }
}
