//! Record sources
//!
//! Reads raw records from files, one record per line. Plain files hold
//! `<time>,<link>` lines; `.jsonl`/`.json` files hold one JSON object with
//! `time` and `link` fields per line. Blank lines are ignored.
//!
//! Lines are not parsed into events here. A JSON line that cannot be
//! deserialized is returned as a failed [`SourceRecord`] so the ingestion
//! policy decides whether it is skipped or aborts the run.

use crate::error::{Error, Result};
use crate::event::RawRecord;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A raw record and the 1-based line it came from
#[derive(Debug)]
pub struct SourceRecord {
    pub line: usize,
    pub raw: Result<RawRecord>,
}

impl SourceRecord {
    pub fn new(line: usize, raw: RawRecord) -> Self {
        Self { line, raw: Ok(raw) }
    }
}

/// Input file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// `<time>,<link>` per line
    Lines,
    /// One JSON object per line
    JsonLines,
}

impl SourceFormat {
    /// Pick a format from the file extension
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl") | Some("json") | Some("ndjson") => SourceFormat::JsonLines,
            _ => SourceFormat::Lines,
        }
    }
}

/// Read every record of a file, detecting its format
pub fn read_records(path: &Path) -> Result<Vec<SourceRecord>> {
    let format = SourceFormat::detect(path);
    tracing::debug!("Reading {:?} as {:?}", path, format);
    read_from(BufReader::new(File::open(path)?), format)
}

/// Read records from several files, in order
pub fn read_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SourceRecord>> {
    let mut records = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let before = records.len();
        records.extend(read_records(path)?);
        tracing::info!("Read {} records from {:?}", records.len() - before, path);
    }
    Ok(records)
}

/// Read records from any buffered reader
pub fn read_from<R: BufRead>(reader: R, format: SourceFormat) -> Result<Vec<SourceRecord>> {
    let mut records = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;

        if line.trim().is_empty() {
            continue;
        }

        let raw = match format {
            SourceFormat::Lines => Ok(RawRecord::Line(line)),
            SourceFormat::JsonLines => serde_json::from_str::<RawRecord>(&line)
                .map_err(|e| Error::malformed(format!("invalid JSON record: {}", e))),
        };

        records.push(SourceRecord {
            line: line_no,
            raw: raw.map_err(|e| e.at_line(line_no)),
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RawTime;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_detect_format() {
        assert_eq!(SourceFormat::detect(Path::new("a.jsonl")), SourceFormat::JsonLines);
        assert_eq!(SourceFormat::detect(Path::new("a.json")), SourceFormat::JsonLines);
        assert_eq!(SourceFormat::detect(Path::new("a.csv")), SourceFormat::Lines);
        assert_eq!(SourceFormat::detect(Path::new("data")), SourceFormat::Lines);
    }

    #[test]
    fn test_read_lines_skips_blank() {
        let input = "23425332,linkone\n\n   \n23425300,linktwo\n";
        let records = read_from(Cursor::new(input), SourceFormat::Lines).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, 1);
        assert_eq!(records[1].line, 4);
        assert_eq!(
            records[1].raw.as_ref().unwrap(),
            &RawRecord::line("23425300,linktwo")
        );
    }

    #[test]
    fn test_read_json_lines() {
        let input = concat!(
            "{\"time\": 23532341, \"link\": \"linkthree\"}\n",
            "not json\n",
            "{\"time\": \"7\", \"link\": \"x\"}\n",
        );
        let records = read_from(Cursor::new(input), SourceFormat::JsonLines).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0].raw.as_ref().unwrap(),
            &RawRecord::structured(23532341, "linkthree")
        );

        match &records[1].raw {
            Err(Error::MalformedRecord { line, .. }) => assert_eq!(*line, Some(2)),
            other => panic!("expected malformed record, got {:?}", other),
        }

        assert!(matches!(
            records[2].raw.as_ref().unwrap(),
            RawRecord::Structured { time: RawTime::Text(_), .. }
        ));
    }

    #[test]
    fn test_read_files_in_order() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.jsonl");
        std::fs::write(&first, "1,a\n2,b\n").unwrap();
        std::fs::write(&second, "{\"time\": 3, \"link\": \"c\"}\n").unwrap();

        let records = read_files(&[first, second]).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[2].raw.as_ref().unwrap(),
            &RawRecord::structured(3, "c")
        );
    }

    #[test]
    fn test_missing_file() {
        let err = read_records(Path::new("/nonexistent/linkbucket/input.txt")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
