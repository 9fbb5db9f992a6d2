//! Segment files: the sorted partial indexes written by each flush

use std::{
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Lines, Write},
    path::{Path, PathBuf},
};

use log::debug;

use crate::base::{INDEX_EXTENSION, SEGMENT_PREFIX};
use crate::codec::{check_postings, split_line};
use crate::error::{Error, Result};

/// Path of the `number`-th segment within `folder`
pub fn segment_path(folder: &Path, number: usize) -> PathBuf {
    folder.join(format!("{}{}.{}", SEGMENT_PREFIX, number, INDEX_EXTENSION))
}

pub(crate) fn segment_number(path: &Path) -> Option<usize> {
    if path.extension()?.to_str()? != INDEX_EXTENSION {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(SEGMENT_PREFIX)?
        .parse()
        .ok()
}

/// Lists the segments of a folder in flush order
///
/// Other files (editor or desktop leftovers) are ignored.
pub fn list_segments(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(Error::Configuration(format!(
            "segment directory {} does not exist",
            folder.display()
        )));
    }

    let mut segments = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        match segment_number(&path) {
            Some(number) if path.is_file() => segments.push((number, path)),
            _ => debug!("Ignoring {} (not a segment)", path.display()),
        }
    }
    segments.sort_by_key(|(number, _)| *number);
    Ok(segments.into_iter().map(|(_, path)| path).collect())
}

/// Writes the lines of one segment
pub struct SegmentWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: usize,
}

impl SegmentWriter {
    pub fn create(path: PathBuf) -> Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    /// Flushes the segment and returns its path with the number of terms
    pub fn finish(mut self) -> Result<(PathBuf, usize)> {
        self.writer.flush()?;
        Ok((self.path, self.lines))
    }
}

/// Sequential reader over the lines of a segment
///
/// The cursor buffers one line: `head()` is the term the cursor is
/// positioned at, and its postings are handed out by `advance()`.
pub struct SegmentCursor {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    head: Option<(String, String)>,
}

impl SegmentCursor {
    /// Opens a segment and reads its first line
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::Configuration(format!("cannot open segment {}: {}", path.display(), e))
        })?;
        let mut cursor = Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
            head: None,
        };
        cursor.read_next()?;
        Ok(cursor)
    }

    fn read_next(&mut self) -> Result<()> {
        self.head = None;
        while let Some(line) = self.lines.next() {
            let line = line?;
            self.line_no += 1;
            if line.is_empty() {
                continue;
            }
            let (term, postings) = split_line(&line, &self.path, self.line_no)?;
            check_postings(postings, &self.path, self.line_no)?;
            self.head = Some((term.to_string(), postings.to_string()));
            break;
        }
        Ok(())
    }

    /// Current term, or `None` when the segment is exhausted
    pub fn head(&self) -> Option<&str> {
        self.head.as_ref().map(|(term, _)| term.as_str())
    }

    /// Returns the current term and postings, and moves to the next line
    pub fn advance(&mut self) -> Result<Option<(String, String)>> {
        let current = self.head.take();
        if current.is_some() {
            self.read_next()?;
        }
        Ok(current)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    #[test]
    fn segments_are_listed_in_flush_order() {
        let dir = TempDir::new().unwrap();
        for number in [10, 2, 0, 1] {
            SegmentWriter::create(segment_path(dir.path(), number))
                .unwrap()
                .finish()
                .unwrap();
        }
        fs::write(dir.path().join(".directory"), "x").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let segments = list_segments(dir.path()).unwrap();
        let names: Vec<_> = segments
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            ["segment0.ind", "segment1.ind", "segment2.ind", "segment10.ind"]
        );
    }

    #[test]
    fn missing_directory() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            list_segments(&dir.path().join("nope")),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn cursor_walks_lines() {
        let dir = TempDir::new().unwrap();
        let path = segment_path(dir.path(), 0);
        let mut writer = SegmentWriter::create(path.clone()).unwrap();
        writer.write_line("a;1:1.00").unwrap();
        writer.write_line("b;1:0.50;2:0.70").unwrap();
        let (_, lines) = writer.finish().unwrap();
        assert_eq!(lines, 2);

        let mut cursor = SegmentCursor::open(&path).unwrap();
        assert_eq!(cursor.head(), Some("a"));
        assert_eq!(
            cursor.advance().unwrap(),
            Some(("a".to_string(), "1:1.00".to_string()))
        );
        assert_eq!(cursor.head(), Some("b"));
        cursor.advance().unwrap();
        assert_eq!(cursor.head(), None);
        assert_eq!(cursor.advance().unwrap(), None);
    }

    #[test]
    fn cursor_reports_malformed_line() {
        let dir = TempDir::new().unwrap();
        let path = segment_path(dir.path(), 0);
        fs::write(&path, "a;1:1.00\nbroken\n").unwrap();

        let mut cursor = SegmentCursor::open(&path).unwrap();
        assert!(matches!(
            cursor.advance(),
            Err(Error::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn cursor_rejects_invalid_postings() {
        let dir = TempDir::new().unwrap();
        let path = segment_path(dir.path(), 0);

        fs::write(&path, "cat;x:abc\n").unwrap();
        assert!(matches!(
            SegmentCursor::open(&path),
            Err(Error::Parse { line: 1, .. })
        ));

        fs::write(&path, "cat;1:0.50\ndog;\n").unwrap();
        let mut cursor = SegmentCursor::open(&path).unwrap();
        assert!(matches!(
            cursor.advance(),
            Err(Error::Parse { line: 2, .. })
        ));
    }
}
