use std::{cmp::Ordering, collections::BinaryHeap};

use serde::{Deserialize, Serialize};

use crate::base::{DocId, Weight};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub docid: DocId,
    pub score: Weight,
}

impl std::fmt::Display for ScoredDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.docid, self.score)
    }
}

impl PartialEq for ScoredDocument {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredDocument {}

impl PartialOrd for ScoredDocument {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Best documents first: higher score, then lower document ID
impl Ord for ScoredDocument {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.docid.cmp(&other.docid))
    }
}

/// Keeps the `top_k` best scored documents
///
/// The heap top is the worst document kept so far.
pub struct TopScoredDocuments {
    heap: BinaryHeap<ScoredDocument>,
    top_k: usize,
}

impl TopScoredDocuments {
    pub fn new(top_k: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            top_k,
        }
    }

    /// Add a new candidate, and returns the new lower bound on scores
    pub fn add(&mut self, candidate: DocId, score: Weight) -> Weight {
        if self.top_k == 0 {
            return Weight::INFINITY;
        }

        let document = ScoredDocument {
            docid: candidate,
            score,
        };
        if self.heap.len() < self.top_k {
            self.heap.push(document);
        } else if let Some(worst) = self.heap.peek() {
            if document < *worst {
                self.heap.pop();
                self.heap.push(document);
            }
        }

        match self.heap.peek() {
            Some(worst) if self.heap.len() >= self.top_k => worst.score,
            // If the heap is not full, returns -infinity
            _ => Weight::NEG_INFINITY,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Best document first
    pub fn into_sorted_vec(self) -> Vec<ScoredDocument> {
        self.heap.into_sorted_vec()
    }
}
