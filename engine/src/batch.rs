//! Batch outcomes.
//!
//! Every batch operation produces one [`Outcome`] per input. A
//! [`BatchResult`] groups them into three partitions (succeeded, skipped,
//! failed) while keeping the original input order inside each partition,
//! no matter what order the items finished in.

use crate::Error;

/// What happened to a single batch item.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T, I> {
    /// The item was persisted (or deleted); holds the stored entity.
    Succeeded(T),
    /// The item was a duplicate and skipping was requested.
    Skipped(T),
    /// The item failed; holds the original input and the reason.
    Failed(I, Error),
}

impl<T, I> Outcome<T, I> {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Outcome::Succeeded(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(..))
    }
}

/// A partition entry tagged with its position in the input batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<T> {
    pub index: usize,
    pub item: T,
}

/// A failed input together with why it failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure<I> {
    pub input: I,
    pub error: Error,
}

/// The three-way partition of a batch call.
///
/// `T` is the entity type, `I` the input type of the batch (an entity for
/// create, an id for delete, an id/patch pair for update).
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<T, I> {
    succeeded: Vec<Entry<T>>,
    skipped: Vec<Entry<T>>,
    failed: Vec<Entry<Failure<I>>>,
}

impl<T, I> Default for BatchResult<T, I> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T, I> BatchResult<T, I> {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a result from index-tagged outcomes in any order.
    ///
    /// Indices must be distinct.
    pub fn from_indexed(mut outcomes: Vec<(usize, Outcome<T, I>)>) -> Self {
        outcomes.sort_by_key(|(index, _)| *index);
        debug_assert!(
            outcomes.windows(2).all(|w| w[0].0 != w[1].0),
            "batch outcome indices must be distinct"
        );

        let mut result = Self::new();
        for (index, outcome) in outcomes {
            result.push(index, outcome);
        }
        result
    }

    fn push(&mut self, index: usize, outcome: Outcome<T, I>) {
        match outcome {
            Outcome::Succeeded(item) => self.succeeded.push(Entry { index, item }),
            Outcome::Skipped(item) => self.skipped.push(Entry { index, item }),
            Outcome::Failed(input, error) => self.failed.push(Entry {
                index,
                item: Failure { input, error },
            }),
        }
    }

    pub fn succeeded(&self) -> &[Entry<T>] {
        &self.succeeded
    }

    pub fn skipped(&self) -> &[Entry<T>] {
        &self.skipped
    }

    pub fn failed(&self) -> &[Entry<Failure<I>>] {
        &self.failed
    }

    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn skip_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn fail_count(&self) -> usize {
        self.failed.len()
    }

    /// Number of inputs the batch was called with.
    pub fn len(&self) -> usize {
        self.success_count() + self.skip_count() + self.fail_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when nothing was skipped or failed.
    pub fn is_complete_success(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }

    /// Stored entities of the succeeded partition, in input order.
    pub fn succeeded_items(&self) -> impl Iterator<Item = &T> {
        self.succeeded.iter().map(|e| &e.item)
    }

    /// Entities of the skipped partition, in input order.
    pub fn skipped_items(&self) -> impl Iterator<Item = &T> {
        self.skipped.iter().map(|e| &e.item)
    }

    /// Input indices of every partition, concatenated.
    pub fn indices(&self) -> Vec<usize> {
        self.succeeded
            .iter()
            .map(|e| e.index)
            .chain(self.skipped.iter().map(|e| e.index))
            .chain(self.failed.iter().map(|e| e.index))
            .collect()
    }

    pub fn into_parts(self) -> (Vec<Entry<T>>, Vec<Entry<T>>, Vec<Entry<Failure<I>>>) {
        (self.succeeded, self.skipped, self.failed)
    }
}

impl<T, I> FromIterator<Outcome<T, I>> for BatchResult<T, I> {
    /// Index outcomes by their position in the iterator.
    fn from_iter<It: IntoIterator<Item = Outcome<T, I>>>(iter: It) -> Self {
        let mut result = Self::new();
        for (index, outcome) in iter.into_iter().enumerate() {
            result.push(index, outcome);
        }
        result
    }
}
