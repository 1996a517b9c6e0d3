//! Asset catalog - custom assets keyed by name, and their persistence
//!
//! The catalog is saved as one JSON array under [`SAVED_ASSETS_KEY`] in an
//! [`AssetStore`]. Restoring hands every descriptor to the offline-storage
//! collaborator so it can re-attach unstore callbacks for stored copies.

use crate::{
    asset::AssetDescriptor,
    types::{Feature, KeySystem},
    Error, Result,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, instrument, warn};

/// Storage key the catalog is saved under
pub const SAVED_ASSETS_KEY: &str = "kino.savedAssets";

/// Key/value persistence for the catalog
pub trait AssetStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: String) -> Result<()>;
}

/// Offline-storage collaborator, consulted for every restored asset
pub trait OfflineStorage: Send + Sync {
    /// Attach an unstore callback and progress if a copy of `asset` is stored
    fn subscribe(&self, asset: &mut AssetDescriptor);
}

// ============================================================================
// Stores
// ============================================================================

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssetStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// A JSON object of key to string value, kept in one file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents)
            .map_err(|e| Error::Storage(format!("{}: {e}", self.path.display())))
    }
}

impl AssetStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&values)?)?;
        debug!(path = %self.path.display(), key, "Store written");
        Ok(())
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Custom assets, unique by name, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetCatalog {
    assets: Vec<AssetDescriptor>,
}

impl AssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Every asset, disabled ones included
    pub fn iter(&self) -> impl Iterator<Item = &AssetDescriptor> {
        self.assets.iter()
    }

    pub fn get(&self, name: &str) -> Option<&AssetDescriptor> {
        self.assets.iter().find(|asset| asset.name() == name)
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.assets
            .iter()
            .position(|asset| asset.name() == name)
            .ok_or_else(|| Error::AssetNotFound {
                name: name.to_string(),
            })
    }

    /// Add a new asset. It must be valid and its name unused.
    pub fn add(&mut self, asset: AssetDescriptor) -> Result<()> {
        asset.validate()?;
        if self.get(asset.name()).is_some() {
            return Err(Error::DuplicateName {
                name: asset.name().to_string(),
            });
        }
        info!(asset = asset.name(), "Asset added");
        self.assets.push(asset);
        Ok(())
    }

    /// Replace an asset with an edited version, releasing its stored copy first
    #[instrument(skip(self, replacement), fields(replacement = replacement.name()))]
    pub async fn replace(&mut self, name: &str, replacement: AssetDescriptor) -> Result<()> {
        let index = self.position(name)?;
        self.assets[index].unstore().await?;

        replacement.validate()?;
        let renamed_onto_other =
            replacement.name() != name && self.get(replacement.name()).is_some();
        if renamed_onto_other {
            return Err(Error::DuplicateName {
                name: replacement.name().to_string(),
            });
        }

        info!("Asset replaced");
        self.assets[index] = replacement;
        Ok(())
    }

    /// Remove an asset, releasing its stored copy first
    #[instrument(skip(self))]
    pub async fn remove(&mut self, name: &str) -> Result<AssetDescriptor> {
        let index = self.position(name)?;
        self.assets[index].unstore().await?;
        info!("Asset removed");
        Ok(self.assets.remove(index))
    }

    /// Assets shown in listings: everything not disabled
    pub fn listed(&self) -> impl Iterator<Item = &AssetDescriptor> {
        self.assets.iter().filter(|asset| !asset.is_disabled())
    }

    pub fn featured(&self) -> impl Iterator<Item = &AssetDescriptor> {
        self.listed().filter(|asset| asset.is_featured())
    }

    /// Listed assets carrying every one of `features`
    pub fn with_features<'a>(
        &'a self,
        features: &'a [Feature],
    ) -> impl Iterator<Item = &'a AssetDescriptor> {
        self.listed()
            .filter(move |asset| features.iter().all(|feature| asset.has_feature(*feature)))
    }

    pub fn with_key_system(&self, key_system: KeySystem) -> impl Iterator<Item = &AssetDescriptor> {
        self.listed()
            .filter(move |asset| asset.key_systems().contains(&key_system))
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write every asset as one JSON array
    pub fn save(&self, store: &dyn AssetStore) -> Result<()> {
        let values = self
            .assets
            .iter()
            .map(AssetDescriptor::to_json)
            .collect::<Result<Vec<Value>>>()?;
        store.set(SAVED_ASSETS_KEY, serde_json::to_string(&values)?)?;
        info!(count = values.len(), "Catalog saved");
        Ok(())
    }

    /// Read the catalog back, letting `offline` re-attach stored copies
    pub fn restore(store: &dyn AssetStore, offline: Option<&dyn OfflineStorage>) -> Result<Self> {
        let Some(saved) = store.get(SAVED_ASSETS_KEY)? else {
            debug!("No saved catalog");
            return Ok(Self::new());
        };

        let values: Vec<Value> = serde_json::from_str(&saved)?;
        let mut catalog = Self::new();
        for value in values {
            let mut asset = AssetDescriptor::from_json(value)?;
            if catalog.get(asset.name()).is_some() {
                warn!(asset = asset.name(), "Skipping duplicate saved asset");
                continue;
            }
            if let Some(offline) = offline {
                offline.subscribe(&mut asset);
            }
            catalog.assets.push(asset);
        }

        info!(count = catalog.len(), "Catalog restored");
        Ok(catalog)
    }
}
