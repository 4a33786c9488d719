#![allow(dead_code)]

use async_trait::async_trait;
use pmoslideshow::{
    Error, ImageValidator, ManagerOptions, MemoryStore, NewImage, PlaylistManager,
    PlaylistSnapshot, Result, SlideshowStore, SqliteStore,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Validateur scripté : URLs refusées et délais par URL
#[derive(Default)]
pub struct FakeValidator {
    rejected: HashSet<String>,
    delays: HashMap<String, Duration>,
}

impl FakeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(mut self, url: impl Into<String>) -> Self {
        self.rejected.insert(url.into());
        self
    }

    pub fn delay(mut self, url: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(url.into(), delay);
        self
    }
}

#[async_trait]
impl ImageValidator for FakeValidator {
    async fn validate(&self, url: &str) -> Result<()> {
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        if self.rejected.contains(url) {
            return Err(Error::invalid_image(url, "image not found"));
        }
        Ok(())
    }
}

pub fn url(name: &str) -> String {
    format!("https://images.example.com/slides/{}.jpg", name)
}

pub fn img(name: &str, duration: u32) -> NewImage {
    NewImage::new(url(name), duration)
}

/// Backend de test (le répertoire temporaire vit aussi longtemps que le store)
pub struct Backend {
    pub name: &'static str,
    pub store: Arc<dyn SlideshowStore>,
    _dir: Option<TempDir>,
}

pub fn backends() -> Vec<Backend> {
    let dir = tempfile::tempdir().unwrap();
    let sqlite = SqliteStore::open(&dir.path().join("slideshow.db")).unwrap();
    vec![
        Backend {
            name: "memory",
            store: Arc::new(MemoryStore::new()),
            _dir: None,
        },
        Backend {
            name: "sqlite",
            store: Arc::new(sqlite),
            _dir: Some(dir),
        },
    ]
}

pub fn options() -> ManagerOptions {
    ManagerOptions {
        validation_timeout: Duration::from_secs(2),
        lock_timeout: Duration::from_secs(2),
        ..ManagerOptions::default()
    }
}

pub fn manager(backend: &Backend, validator: FakeValidator) -> PlaylistManager {
    PlaylistManager::new(backend.store.clone(), Arc::new(validator), options())
}

/// Exactement une entrée courante, et retourne son nom d'image
pub fn current_name(snapshot: &PlaylistSnapshot) -> String {
    let current: Vec<_> = snapshot
        .entries
        .iter()
        .filter(|(entry, _)| entry.current)
        .collect();
    assert_eq!(
        current.len(),
        1,
        "playlist {} must have exactly one current entry",
        snapshot.id()
    );
    current[0].1.name.clone()
}

pub fn names(snapshot: &PlaylistSnapshot) -> Vec<String> {
    snapshot
        .entries
        .iter()
        .map(|(_, image)| image.name.clone())
        .collect()
}
