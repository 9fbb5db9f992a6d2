use rand::{self, Rng, RngCore};
use rand_distr::{Distribution, Poisson};

use spimi_index::base::DocId;

/// Name of the `ix`-th vocabulary term (three letters or more)
pub fn term_name(ix: usize) -> String {
    let mut name = String::new();
    let mut n = ix;
    while n > 0 || name.len() < 3 {
        name.push((b'a' + (n % 26) as u8) as char);
        n /= 26;
    }
    name
}

pub struct TestDocument {
    pub docid: DocId,
    /// Tokens, possibly repeated
    pub terms: Vec<String>,
}

impl TestDocument {
    /// The `<docId><TAB><tokens>` input line
    pub fn line(&self) -> String {
        format!("{}\t{}", self.docid, self.terms.join(" "))
    }
}

pub fn create_document(
    docid: DocId,
    lambda_words: f32,
    max_words: usize,
    vocabulary_size: usize,
    rng: &mut dyn RngCore,
) -> TestDocument {
    let poi = Poisson::new(lambda_words).unwrap();
    let num_words = (1 + poi.sample(rng) as usize).min(max_words);

    let terms = (0..num_words)
        .map(|_| term_name(rng.gen_range(0..vocabulary_size)))
        .collect();

    TestDocument { docid, terms }
}
