//! Term dictionary (term → IDF) and index information

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    base::{IndexMode, Weight, DICTIONARY_FILE, INDEX_CBOR, TERM_DELIMITER},
    codec::format_weight,
    error::{Error, Result},
};

/// Inverse document frequency `log10(N / df)`
pub fn idf(total_docs: u64, document_frequency: usize) -> Weight {
    if document_frequency == 0 {
        return 0.;
    }
    (total_docs as Weight / document_frequency as Weight).log10()
}

pub fn dictionary_path(folder: &Path) -> PathBuf {
    folder.join(DICTIONARY_FILE)
}

/// Appends `term;idf` lines to the dictionary file
pub struct DictionaryWriter {
    writer: BufWriter<File>,
    terms: usize,
}

impl DictionaryWriter {
    pub fn create(folder: &Path) -> Result<Self> {
        let file = File::options()
            .create(true)
            .append(true)
            .open(dictionary_path(folder))?;
        Ok(Self {
            writer: BufWriter::new(file),
            terms: 0,
        })
    }

    pub fn write(&mut self, term: &str, idf: Weight) -> Result<()> {
        writeln!(self.writer, "{}{}{}", term, TERM_DELIMITER, format_weight(idf))?;
        self.terms += 1;
        Ok(())
    }

    /// Flushes the file and returns the number of terms written
    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.terms)
    }
}

/// In-memory term → IDF map
#[derive(Debug, Default, Clone)]
pub struct Dictionary {
    idfs: HashMap<String, Weight>,
}

impl Dictionary {
    /// Loads the whole dictionary file of a folder
    pub fn load(folder: &Path) -> Result<Self> {
        let path = dictionary_path(folder);
        let file = File::open(&path).map_err(|e| {
            Error::Configuration(format!("cannot open dictionary {}: {}", path.display(), e))
        })?;

        let mut idfs = HashMap::new();
        for (ix, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let (term, idf) = line.split_once(TERM_DELIMITER).ok_or_else(|| {
                Error::parse(&path, ix + 1, format!("missing '{}'", TERM_DELIMITER))
            })?;
            let idf = idf
                .trim()
                .parse::<Weight>()
                .map_err(|_| Error::parse(&path, ix + 1, format!("invalid IDF '{}'", idf)))?;
            idfs.insert(term.to_string(), idf);
        }

        info!("Loaded {} terms from {}", idfs.len(), path.display());
        Ok(Self { idfs })
    }

    pub fn idf(&self, term: &str) -> Option<Weight> {
        self.idfs.get(term).copied()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.idfs.contains_key(term)
    }

    pub fn len(&self) -> usize {
        self.idfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idfs.is_empty()
    }
}

impl FromIterator<(String, Weight)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (String, Weight)>>(iter: T) -> Self {
        Self {
            idfs: iter.into_iter().collect(),
        }
    }
}

/// Global information on the final index, saved next to the dictionary
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IndexInformation {
    pub total_docs: u64,
    pub prefix_length: usize,
    pub mode: IndexMode,
    pub terms: usize,
    pub buckets: usize,
}

impl IndexInformation {
    pub fn save(&self, folder: &Path) -> Result<()> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(folder.join(INDEX_CBOR))?;
        let mut writer = BufWriter::new(file);
        ciborium::ser::into_writer(self, &mut writer)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }

    /// Loads the information file, if present
    pub fn load(folder: &Path) -> Result<Option<Self>> {
        let path = folder.join(INDEX_CBOR);
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path)?;
        let information = ciborium::de::from_reader(BufReader::new(file))
            .map_err(|e| Error::Serialization(format!("{}: {}", path.display(), e)))?;
        Ok(Some(information))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use temp_dir::TempDir;

    #[test]
    fn idf_values() {
        assert_eq!(idf(10, 10), 0.);
        assert!((idf(100, 1) - 2.).abs() < 1e-12);
        assert!((idf(3, 2) - 0.1760912590556812).abs() < 1e-12);
        assert_eq!(idf(10, 0), 0.);
    }

    #[test]
    fn idf_decreases_with_document_frequency() {
        let n = 1000;
        for df in 1..n as usize {
            assert!(idf(n, df) > idf(n, df + 1));
        }
    }

    #[test]
    fn write_then_load() {
        let dir = TempDir::new().unwrap();
        let mut writer = DictionaryWriter::create(dir.path()).unwrap();
        writer.write("cat", idf(3, 2)).unwrap();
        writer.write("dog", idf(3, 1)).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        assert_eq!(
            fs::read_to_string(dictionary_path(dir.path())).unwrap(),
            "cat;0.18\ndog;0.48\n"
        );

        let dictionary = Dictionary::load(dir.path()).unwrap();
        assert_eq!(dictionary.len(), 2);
        assert_eq!(dictionary.idf("cat"), Some(0.18));
        assert!(!dictionary.contains("bird"));
    }

    #[test]
    fn missing_or_malformed_dictionary() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Dictionary::load(dir.path()),
            Err(Error::Configuration(_))
        ));

        fs::write(dictionary_path(dir.path()), "cat;0.18\ndog\n").unwrap();
        assert!(matches!(
            Dictionary::load(dir.path()),
            Err(Error::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn information_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(IndexInformation::load(dir.path()).unwrap(), None);

        let information = IndexInformation {
            total_docs: 3,
            prefix_length: 2,
            mode: IndexMode::Ranking,
            terms: 4,
            buckets: 3,
        };
        information.save(dir.path()).unwrap();
        assert_eq!(
            IndexInformation::load(dir.path()).unwrap(),
            Some(information)
        );
    }
}
