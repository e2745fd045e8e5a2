//! Feature lookup for requests that arrive without a feature vector.
//!
//! [`FileFeatureStore`] loads a JSON array of rows
//! `{store_nbr, family, date, features}` into memory and answers lookups
//! with the exact row when one exists, otherwise the per-(store, family)
//! mean over all dates. Reloading swaps the whole index atomically, so
//! lookups during a reload see either the old or the new data.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{FeatureVector, NUM_FEATURES};
use crate::validation::validate_date;
use crate::{HuginnError, Result};

/// How a feature vector was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSource {
    /// Row for the exact (store, family, date).
    Exact,
    /// Mean over all dates for (store, family).
    Aggregated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureLookup {
    pub features: FeatureVector,
    pub source: FeatureSource,
}

/// Snapshot of what a feature store holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureStoreMetadata {
    pub file_path: String,
    pub row_count: usize,
    pub groups: usize,
    pub data_date_min: Option<String>,
    pub data_date_max: Option<String>,
    /// RFC 3339 timestamp of the last successful load.
    pub loaded_at: String,
}

/// Source of stored feature vectors.
pub trait FeatureStore: Send + Sync {
    /// Features for (store, family, date), or `None` when nothing is stored
    /// for the (store, family) pair at all.
    fn lookup(&self, store_nbr: i32, family: &str, date: &str) -> Option<FeatureLookup>;

    fn metadata(&self) -> FeatureStoreMetadata;

    /// Re-read the backing data. Blocking; on failure the previous data stays.
    fn reload(&self) -> Result<FeatureStoreMetadata>;
}

#[derive(Debug, Deserialize)]
struct FeatureRow {
    store_nbr: i32,
    family: String,
    date: String,
    features: FeatureVector,
}

struct Group {
    by_date: HashMap<String, FeatureVector>,
    mean: FeatureVector,
}

struct Index {
    groups: HashMap<(i32, String), Group>,
    metadata: FeatureStoreMetadata,
}

/// In-memory feature store backed by a JSON file.
pub struct FileFeatureStore {
    path: PathBuf,
    index: RwLock<Arc<Index>>,
}

impl FileFeatureStore {
    /// Load `path`. Fails if the file is missing or any row is malformed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let index = load_index(&path)?;
        Ok(Self {
            path,
            index: RwLock::new(Arc::new(index)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeatureStore for FileFeatureStore {
    fn lookup(&self, store_nbr: i32, family: &str, date: &str) -> Option<FeatureLookup> {
        let index = self.index.read().clone();
        let group = index.groups.get(&(store_nbr, family.to_owned()))?;
        Some(match group.by_date.get(date) {
            Some(features) => FeatureLookup {
                features: *features,
                source: FeatureSource::Exact,
            },
            None => FeatureLookup {
                features: group.mean,
                source: FeatureSource::Aggregated,
            },
        })
    }

    fn metadata(&self) -> FeatureStoreMetadata {
        self.index.read().metadata.clone()
    }

    fn reload(&self) -> Result<FeatureStoreMetadata> {
        let index = load_index(&self.path)?;
        let metadata = index.metadata.clone();
        *self.index.write() = Arc::new(index);
        Ok(metadata)
    }
}

fn load_index(path: &Path) -> Result<Index> {
    let start = Instant::now();
    if !path.is_file() {
        return Err(HuginnError::Configuration(format!(
            "feature file not found: {}",
            path.display()
        )));
    }

    let bytes = std::fs::read(path)?;
    let rows: Vec<FeatureRow> = serde_json::from_slice(&bytes)
        .map_err(|e| HuginnError::DataError(format!("invalid feature file: {e}")))?;

    let mut sums: HashMap<(i32, String), ([f64; NUM_FEATURES], usize)> = HashMap::new();
    let mut by_group: HashMap<(i32, String), HashMap<String, FeatureVector>> = HashMap::new();
    let mut date_min: Option<String> = None;
    let mut date_max: Option<String> = None;

    for (i, row) in rows.iter().enumerate() {
        validate_date(&row.date)
            .map_err(|e| HuginnError::DataError(format!("row {i}: {e}")))?;

        let key = (row.store_nbr, row.family.clone());
        let (sum, count) = sums.entry(key.clone()).or_insert(([0.0; NUM_FEATURES], 0));
        for (acc, v) in sum.iter_mut().zip(row.features.as_slice()) {
            *acc += f64::from(*v);
        }
        *count += 1;
        by_group
            .entry(key)
            .or_default()
            .insert(row.date.clone(), row.features);

        // ISO dates order lexicographically.
        if date_min.as_deref().is_none_or(|d| row.date.as_str() < d) {
            date_min = Some(row.date.clone());
        }
        if date_max.as_deref().is_none_or(|d| row.date.as_str() > d) {
            date_max = Some(row.date.clone());
        }
    }

    let groups: HashMap<(i32, String), Group> = by_group
        .into_iter()
        .map(|(key, by_date)| {
            let mean = sums
                .get(&key)
                .map(|(sum, count)| mean_vector(sum, *count))
                .unwrap_or_default();
            (key, Group { by_date, mean })
        })
        .collect();

    let metadata = FeatureStoreMetadata {
        file_path: path.display().to_string(),
        row_count: rows.len(),
        groups: groups.len(),
        data_date_min: date_min,
        data_date_max: date_max,
        loaded_at: chrono::Utc::now().to_rfc3339(),
    };

    tracing::info!(
        rows = metadata.row_count,
        groups = metadata.groups,
        duration_ms = start.elapsed().as_millis() as u64,
        "feature store loaded"
    );

    Ok(Index { groups, metadata })
}

fn mean_vector(sum: &[f64; NUM_FEATURES], count: usize) -> FeatureVector {
    let mut mean = [0.0f32; NUM_FEATURES];
    if count > 0 {
        for (m, s) in mean.iter_mut().zip(sum) {
            *m = (s / count as f64) as f32;
        }
    }
    FeatureVector::from(mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_nothing_is_zero() {
        let mean = mean_vector(&[0.0; NUM_FEATURES], 0);
        assert_eq!(mean, FeatureVector::zeros());
    }

    #[test]
    fn mean_divides_by_count() {
        let mut sum = [0.0; NUM_FEATURES];
        sum[0] = 9.0;
        let mean = mean_vector(&sum, 3);
        assert_eq!(mean.as_slice()[0], 3.0);
    }
}
