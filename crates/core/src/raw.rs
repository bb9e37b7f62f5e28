//! Raw trace files: one file per process, one path-keyed record per line.
//!
//! Format: `path count time`, single-space separated, time in seconds with
//! microsecond resolution. Files are named `<prefix>.<rank>`; rank 0 for
//! non-distributed runs.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::debug;
use thiserror::Error;

use callprof_protocol::RawRecord;

#[derive(Debug, Error)]
pub enum RawFileError {
    #[error("{file}: {source}")]
    Io {
        file: String,
        #[source]
        source: io::Error,
    },
    #[error("{file}:{line}: malformed record `{text}`")]
    Parse {
        file: String,
        line: usize,
        text: String,
    },
}

/// File name for one process's raw trace.
pub fn raw_file_name(prefix: &str, rank: u32) -> String {
    format!("{prefix}.{rank}")
}

/// Write the finalized record set for one process.
pub fn write_raw_file(path: &Path, records: &[RawRecord]) -> Result<(), RawFileError> {
    let io_err = |source| RawFileError::Io {
        file: path.display().to_string(),
        source,
    };
    let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
    for record in records {
        writeln!(out, "{} {} {:.6}", record.path, record.count, record.time).map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;
    debug!("wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Open a raw trace file as a lazy record sequence.
///
/// Re-opening the same file yields the same sequence. Malformed lines are
/// reported as errors naming the file and line; they are never skipped.
pub fn read_raw_file(path: &Path) -> Result<RawRecords, RawFileError> {
    let file = File::open(path).map_err(|source| RawFileError::Io {
        file: path.display().to_string(),
        source,
    })?;
    debug!("reading raw trace {}", path.display());
    Ok(RawRecords {
        file: path.display().to_string(),
        lines: BufReader::new(file).lines(),
        line_no: 0,
    })
}

/// Iterator over the records of one raw trace file.
pub struct RawRecords {
    file: String,
    lines: io::Lines<BufReader<File>>,
    line_no: usize,
}

impl std::fmt::Debug for RawRecords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawRecords")
            .field("file", &self.file)
            .field("line_no", &self.line_no)
            .finish_non_exhaustive()
    }
}

impl Iterator for RawRecords {
    type Item = Result<RawRecord, RawFileError>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(source) => {
                return Some(Err(RawFileError::Io {
                    file: self.file.clone(),
                    source,
                }));
            }
        };
        self.line_no += 1;
        Some(parse_line(&self.file, self.line_no, &line))
    }
}

fn parse_line(file: &str, line_no: usize, text: &str) -> Result<RawRecord, RawFileError> {
    let malformed = || RawFileError::Parse {
        file: file.to_string(),
        line: line_no,
        text: text.to_string(),
    };

    let mut fields = text.split_whitespace();
    let (Some(path), Some(count), Some(time), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(malformed());
    };
    let count: u64 = count.parse().map_err(|_| malformed())?;
    let time: f64 = time.parse().map_err(|_| malformed())?;
    Ok(RawRecord::new(path, count, time))
}
