//! Result Reporting
//!
//! Batch operations stream two kinds of output as they go: the objects they
//! produce and the per-item errors they hit. Both go to a [`Sink`] in the
//! order they happen; nothing is buffered by the engines.

use crate::status::ErrorRecord;

/// Receiver of streamed results
pub trait Sink<T> {
    fn item(&mut self, item: T);

    fn error(&mut self, error: ErrorRecord);
}

/// Sink that collects everything in memory
#[derive(Debug)]
pub struct BatchReport<T> {
    pub items: Vec<T>,
    pub errors: Vec<ErrorRecord>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Error ids in report order
    pub fn error_ids(&self) -> Vec<&'static str> {
        self.errors.iter().map(|e| e.id).collect()
    }
}

impl<T> Sink<T> for BatchReport<T> {
    fn item(&mut self, item: T) {
        self.items.push(item);
    }

    fn error(&mut self, error: ErrorRecord) {
        log::debug!("{error}");
        self.errors.push(error);
    }
}

impl<T> Extend<ErrorRecord> for BatchReport<T> {
    fn extend<I: IntoIterator<Item = ErrorRecord>>(&mut self, iter: I) {
        for error in iter {
            self.error(error);
        }
    }
}
