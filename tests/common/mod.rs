//! Common test utilities and helpers
//!
//! Every test app runs against in-memory stores, so tests are isolated and
//! need no external services.

#![allow(dead_code)]

use mlsolid_db::{MemoryKvStore, MemoryObjectStore, ObjectStore, SolidStore};
use mlsolid_service::{CreateRunRequest, ServiceRegistry};
use std::sync::Arc;

pub mod fixtures;

/// Test application state
pub struct TestApp {
    pub store: SolidStore,
    pub objects: Arc<MemoryObjectStore>,
    pub services: ServiceRegistry,
}

impl TestApp {
    /// Create a test application with both stores configured
    pub fn new() -> Self {
        let store = SolidStore::new(Arc::new(MemoryKvStore::new()));
        let objects = Arc::new(MemoryObjectStore::new("test"));
        let services = ServiceRegistry::new(store.clone(), Some(objects.clone() as Arc<dyn ObjectStore>));

        Self {
            store,
            objects,
            services,
        }
    }

    /// Create a test application without an object store
    pub fn without_object_store() -> Self {
        let store = SolidStore::new(Arc::new(MemoryKvStore::new()));
        let services = ServiceRegistry::new(store.clone(), None);

        Self {
            store,
            objects: Arc::new(MemoryObjectStore::new("unused")),
            services,
        }
    }

    /// Create an empty run
    pub async fn create_run(&self, name: &str, experiment: &str) {
        self.services
            .runs()
            .create_run(CreateRunRequest::new(name, experiment))
            .await
            .expect("Failed to create run");
    }

    /// Create an empty registry
    pub async fn create_registry(&self, name: &str) {
        self.services
            .registries()
            .create_registry(name)
            .await
            .expect("Failed to create registry");
    }
}

/// Assert two floats are within 1e-9 of each other
pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "Expected {}, got {}",
        expected,
        actual
    );
}

/// Generate random string
pub fn random_string(len: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
        .collect::<String>()
        .to_lowercase()
}
