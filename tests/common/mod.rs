//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use huginn::{
    FeatureVector, HuginnError, Inferencer, NUM_FEATURES, PredictRequest, Result, SharedStore,
    SharedStoreConnector,
};

// ============================================================================
// Engines
// ============================================================================

/// Engine returning the sum of its inputs, counting every call.
pub struct CountingEngine {
    pub calls: AtomicUsize,
    loaded: AtomicBool,
}

impl CountingEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            loaded: AtomicBool::new(true),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Inferencer for CountingEngine {
    fn name(&self) -> &str {
        "counting"
    }

    fn predict(&self, features: &[f32]) -> Result<f32> {
        if !self.is_loaded() {
            return Err(HuginnError::ModelUnavailable("closed".into()));
        }
        if features.len() != NUM_FEATURES {
            return Err(HuginnError::invalid("INVALID_FEATURES", "wrong length"));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(features.iter().sum())
    }

    fn predict_batch(&self, batch: &[FeatureVector]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(batch.iter().map(|f| f.as_slice().iter().sum()).collect())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.loaded.store(false, Ordering::SeqCst);
    }
}

/// Engine whose every call fails with `ComputeFailed`.
pub struct FailingEngine {
    pub calls: AtomicUsize,
}

impl FailingEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

impl Inferencer for FailingEngine {
    fn name(&self) -> &str {
        "failing"
    }

    fn predict(&self, _features: &[f32]) -> Result<f32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HuginnError::ComputeFailed("numeric failure".into()))
    }

    fn is_loaded(&self) -> bool {
        true
    }

    fn close(&self) {}
}

// ============================================================================
// Shared store
// ============================================================================

/// In-memory shared store that can be switched off mid-test.
#[derive(Default)]
pub struct MockStore {
    pub reachable: AtomicBool,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    /// Added latency on every call.
    pub delay: Mutex<Option<Duration>>,
    pub data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        let store = Self::default();
        store.reachable.store(true, Ordering::SeqCst);
        Arc::new(store)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    async fn enter(&self) -> Result<()> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(HuginnError::CacheUnavailable("connection refused".into()))
        }
    }
}

#[async_trait]
impl SharedStore for MockStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        Ok(self.data.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8], _ttl: Duration) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        self.data.lock().insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.enter().await
    }
}

/// Connector handing out one [`MockStore`], or failing while `up` is false.
pub struct MockConnector {
    pub store: Arc<MockStore>,
    pub up: AtomicBool,
    pub attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new(store: Arc<MockStore>, up: bool) -> Arc<Self> {
        Arc::new(Self {
            store,
            up: AtomicBool::new(up),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }
}

#[async_trait]
impl SharedStoreConnector for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn SharedStore>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.up.load(Ordering::SeqCst) {
            Ok(self.store.clone() as Arc<dyn SharedStore>)
        } else {
            Err(HuginnError::CacheUnavailable("connection refused".into()))
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Valid request for the canonical scenario tuple.
pub fn grocery_request() -> PredictRequest {
    PredictRequest {
        store_nbr: 1,
        family: "GROCERY I".into(),
        date: "2017-08-01".into(),
        features: vec![0.5; NUM_FEATURES],
        horizon: 90,
    }
}

pub fn request_for(store_nbr: i32, value: f32) -> PredictRequest {
    PredictRequest {
        store_nbr,
        features: vec![value; NUM_FEATURES],
        ..grocery_request()
    }
}
