//! Bucket files: the final index, one file per term prefix

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    base::{Posting, INDEX_EXTENSION, TERM_DELIMITER},
    codec::{is_valid_term, parse_postings, split_line},
    error::{Error, Result},
};

pub const MIN_PREFIX_LENGTH: usize = 1;
pub const MAX_PREFIX_LENGTH: usize = 3;
pub const DEFAULT_PREFIX_LENGTH: usize = 3;

pub fn check_prefix_length(prefix_length: usize) -> Result<()> {
    if !(MIN_PREFIX_LENGTH..=MAX_PREFIX_LENGTH).contains(&prefix_length) {
        return Err(Error::Configuration(format!(
            "bucket prefix length should be between {} and {} (got {})",
            MIN_PREFIX_LENGTH, MAX_PREFIX_LENGTH, prefix_length
        )));
    }
    Ok(())
}

/// The first `prefix_length` characters of a term (the whole term if shorter)
pub fn bucket_prefix(term: &str, prefix_length: usize) -> &str {
    match term.char_indices().nth(prefix_length) {
        Some((end, _)) => &term[..end],
        None => term,
    }
}

pub fn bucket_path(folder: &Path, prefix: &str) -> PathBuf {
    folder.join(format!("{}.{}", prefix, INDEX_EXTENSION))
}

/// Lists the bucket files of a folder
pub fn list_buckets(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut buckets = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(INDEX_EXTENSION) {
            buckets.push(path);
        }
    }
    buckets.sort();
    Ok(buckets)
}

/// Guesses the prefix length from the bucket file names
///
/// Terms shorter than the prefix length produce shorter names, so the
/// longest stem wins. Returns `None` when there is no bucket.
pub fn infer_prefix_length(folder: &Path) -> Result<Option<usize>> {
    Ok(list_buckets(folder)?
        .iter()
        .filter_map(|path| path.file_stem().and_then(|s| s.to_str()))
        .map(|stem| stem.chars().count())
        .max())
}

/// Appends merged lines to bucket files
///
/// Terms arrive in ascending order, so all the terms of a bucket are
/// contiguous and a single file is open at a time.
pub struct BucketWriter {
    folder: PathBuf,
    prefix_length: usize,
    current: Option<(String, BufWriter<File>)>,
    buckets: usize,
}

impl BucketWriter {
    pub fn new(folder: &Path, prefix_length: usize) -> Self {
        Self {
            folder: folder.to_path_buf(),
            prefix_length,
            current: None,
            buckets: 0,
        }
    }

    pub fn write(&mut self, term: &str, postings: &str) -> Result<()> {
        if !is_valid_term(term) {
            return Err(Error::Configuration(format!(
                "term '{}' cannot name a bucket file",
                term
            )));
        }
        let prefix = bucket_prefix(term, self.prefix_length);

        let same_bucket = matches!(&self.current, Some((current, _)) if current.as_str() == prefix);
        if !same_bucket {
            self.close()?;
            let path = bucket_path(&self.folder, prefix);
            debug!("Opening bucket {}", path.display());
            let file = File::options().create(true).append(true).open(&path)?;
            self.current = Some((prefix.to_string(), BufWriter::new(file)));
            self.buckets += 1;
        }

        if let Some((_, writer)) = self.current.as_mut() {
            writeln!(writer, "{}{}{}", term, TERM_DELIMITER, postings)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some((_, mut writer)) = self.current.take() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Flushes the open bucket, and returns the number of buckets opened
    pub fn finish(mut self) -> Result<usize> {
        self.close()?;
        Ok(self.buckets)
    }
}

/// The parsed content of a bucket: term → postings
pub type Bucket = HashMap<String, Vec<Posting>>;

/// Parses the content of a bucket file
pub fn parse_bucket(data: &[u8], path: &Path) -> Result<Bucket> {
    let content = std::str::from_utf8(data)
        .map_err(|e| Error::parse(path, 0, format!("bucket is not valid UTF-8: {}", e)))?;

    let mut bucket = Bucket::new();
    for (ix, line) in content.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let (term, postings) = split_line(line, path, ix + 1)?;
        let postings = parse_postings(postings, path, ix + 1)?;
        bucket.entry(term.to_string()).or_default().extend(postings);
    }
    Ok(bucket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    #[test]
    fn prefixes() {
        assert_eq!(bucket_prefix("computer", 3), "com");
        assert_eq!(bucket_prefix("computer", 1), "c");
        assert_eq!(bucket_prefix("ab", 3), "ab");
        assert_eq!(bucket_prefix("éléphant", 2), "él");
        assert!(check_prefix_length(0).is_err());
        assert!(check_prefix_length(4).is_err());
        assert!(check_prefix_length(2).is_ok());
    }

    #[test]
    fn write_and_parse() {
        let dir = TempDir::new().unwrap();
        let mut writer = BucketWriter::new(dir.path(), 2);
        writer.write("cat", "1:0.71;2:0.50").unwrap();
        writer.write("cave", "3:1.00").unwrap();
        writer.write("dog", "3:0.20").unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let data = fs::read(bucket_path(dir.path(), "ca")).unwrap();
        assert_eq!(
            String::from_utf8_lossy(&data),
            "cat;1:0.71;2:0.50\ncave;3:1.00\n"
        );
        let bucket = parse_bucket(&data, Path::new("ca.ind")).unwrap();
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket["cat"].len(), 2);
        assert_eq!(bucket["cat"][1].weight, 0.5);

        assert_eq!(infer_prefix_length(dir.path()).unwrap(), Some(2));
    }

    #[test]
    fn terms_with_separators_are_refused() {
        let dir = TempDir::new().unwrap();
        let mut writer = BucketWriter::new(&dir.path().join("buckets"), 3);
        for term in ["/etc", "a/b", "..\\x"] {
            assert!(matches!(
                writer.write(term, "1:1.00"),
                Err(Error::Configuration(_))
            ));
        }
        assert_eq!(writer.finish().unwrap(), 0);
        assert!(!dir.path().join("etc.ind").exists());
    }

    #[test]
    fn inference_ignores_short_terms() {
        let dir = TempDir::new().unwrap();
        fs::write(bucket_path(dir.path(), "ab"), "ab;1:1.00\n").unwrap();
        fs::write(bucket_path(dir.path(), "abc"), "abcd;1:1.00\n").unwrap();
        fs::write(dir.path().join("information.cbor"), "").unwrap();
        assert_eq!(infer_prefix_length(dir.path()).unwrap(), Some(3));

        let empty = TempDir::new().unwrap();
        assert_eq!(infer_prefix_length(empty.path()).unwrap(), None);
    }

    #[test]
    fn malformed_bucket() {
        assert!(matches!(
            parse_bucket(b"cat;1:0.5\ncat 2:0.5\n", Path::new("c.ind")),
            Err(Error::Parse { line: 2, .. })
        ));
    }
}
