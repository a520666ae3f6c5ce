//! Named store of immutable datasets.
//!
//! The registry is the sole owner of every loaded [`Dataset`]. Writers take the
//! registry-wide write lock, so at most one registration proceeds at a time and
//! a reader sees either the old or the new dataset for a name, never a partial
//! one. Readers get an `Arc` snapshot and release the lock immediately.

use super::dataset::{Dataset, DatasetSummary};
use crate::error::{AnalysisError, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
struct Entry {
    dataset: Arc<Dataset>,
    /// Creation order, used to list entries deterministically
    order: u64,
}

#[derive(Debug, Default)]
struct Entries {
    by_name: HashMap<String, Entry>,
    next_order: u64,
}

impl Entries {
    /// Insert under `name`, replacing any previous entry. Returns true on replace.
    fn insert(&mut self, name: &str, dataset: Arc<Dataset>, max_datasets: usize) -> Result<bool> {
        let replaced = self.by_name.contains_key(name);
        if !replaced && self.by_name.len() >= max_datasets {
            return Err(AnalysisError::LimitExceeded {
                what: "dataset count",
                limit: max_datasets,
            });
        }
        self.next_order += 1;
        self.by_name.insert(
            name.to_owned(),
            Entry {
                dataset,
                order: self.next_order,
            },
        );
        Ok(replaced)
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct Registered {
    pub dataset: Arc<Dataset>,
    /// An earlier dataset with the same name was replaced
    pub replaced: bool,
}

/// Central registry for all loaded datasets
#[derive(Clone, Debug)]
pub struct DatasetRegistry {
    entries: Arc<RwLock<Entries>>,
    max_datasets: usize,
    max_name_length: usize,
}

impl DatasetRegistry {
    pub fn new(max_datasets: usize, max_name_length: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Entries::default())),
            max_datasets,
            max_name_length,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Entries>> {
        self.entries
            .read()
            .map_err(|e| AnalysisError::Internal(format!("Lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Entries>> {
        self.entries
            .write()
            .map_err(|e| AnalysisError::Internal(format!("Lock poisoned: {e}")))
    }

    /// Reject empty names and names over the configured length.
    pub fn validate_name(&self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(AnalysisError::InvalidName("name must not be empty".to_owned()));
        }
        let len = name.chars().count();
        if len > self.max_name_length {
            return Err(AnalysisError::InvalidName(format!(
                "name is {len} characters long, the maximum is {}",
                self.max_name_length
            )));
        }
        Ok(())
    }

    /// Store `dataset` under `name`, replacing any existing entry.
    pub fn register(&self, name: &str, mut dataset: Dataset) -> Result<Registered> {
        self.validate_name(name)?;
        name.clone_into(&mut dataset.name);
        let dataset = Arc::new(dataset);

        let replaced = self
            .write()?
            .insert(name, Arc::clone(&dataset), self.max_datasets)?;

        Ok(Registered { dataset, replaced })
    }

    /// Snapshot of the dataset currently registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<Dataset>> {
        self.read()?
            .by_name
            .get(name)
            .map(|e| Arc::clone(&e.dataset))
            .ok_or_else(|| AnalysisError::NotFound(name.to_owned()))
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.read()?.by_name.contains_key(name))
    }

    /// Summaries of every entry, in creation order.
    pub fn list(&self) -> Result<Vec<DatasetSummary>> {
        let entries = self.read()?;
        let mut all: Vec<&Entry> = entries.by_name.values().collect();
        all.sort_by_key(|e| e.order);
        Ok(all.into_iter().map(|e| e.dataset.summary()).collect())
    }

    /// Remove the entry under `name`.
    pub fn unload(&self, name: &str) -> Result<Arc<Dataset>> {
        self.write()?
            .by_name
            .remove(name)
            .map(|e| e.dataset)
            .ok_or_else(|| AnalysisError::NotFound(name.to_owned()))
    }

    /// Read `parent`, build a new dataset from it, and register the result under
    /// `new_name`, all inside one write-locked region.
    pub fn derive<F>(&self, parent: &str, new_name: &str, build: F) -> Result<Registered>
    where
        F: FnOnce(&Dataset) -> Result<Dataset>,
    {
        self.validate_name(new_name)?;
        let mut entries = self.write()?;

        let source = entries
            .by_name
            .get(parent)
            .map(|e| Arc::clone(&e.dataset))
            .ok_or_else(|| AnalysisError::NotFound(parent.to_owned()))?;

        let mut derived = build(&source)?;
        new_name.clone_into(&mut derived.name);
        let dataset = Arc::new(derived);
        let replaced = entries.insert(new_name, Arc::clone(&dataset), self.max_datasets)?;

        Ok(Registered { dataset, replaced })
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.by_name.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
