//! Kino Loader - asset catalog and load-path controller for Kino
//!
//! This crate provides:
//! - Asset descriptors: manifest, DRM, feature and ad metadata for one piece of content
//! - An asset catalog with JSON persistence and offline-storage hooks
//! - Request/response filter plumbing scoped to a single load
//! - The load-path controller: attach, load, unload, detach and destroy,
//!   with interruption, retry abort and idle notifications
//! - A simulated platform for headless runs and tests
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Kino Loader                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Asset     │  │    Asset     │  │   Network    │           │
//! │  │  Descriptor  │──│   Catalog    │  │   Filters    │           │
//! │  └──────┬───────┘  └──────────────┘  └──────┬───────┘           │
//! │         │ LoadRequest                       │                   │
//! │         └──────────────────┬────────────────┘                   │
//! │                            │                                    │
//! │                    ┌───────┴───────┐                            │
//! │                    │   Load Path   │                            │
//! │                    │  Controller   │                            │
//! │                    └───────┬───────┘                            │
//! │                            │                                    │
//! │  ┌──────────────┐  ┌───────┴──────┐  ┌──────────────┐           │
//! │  │    Media     │  │   Manifest   │  │     DRM      │           │
//! │  │   Pipeline   │  │   Parsers    │  │    Engine    │           │
//! │  └──────────────┘  └──────────────┘  └──────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod asset;
pub mod catalog;
pub mod config;
pub mod drm;
pub mod engine;
pub mod error;
pub mod headers;
pub mod load_path;
pub mod net;
pub mod retry;
pub mod sim;
pub mod types;

pub use asset::{AssetDescriptor, LoadSource, UnstoreCallback};
pub use catalog::{
    AssetCatalog, AssetStore, JsonFileStore, MemoryStore, OfflineStorage, SAVED_ASSETS_KEY,
};
pub use config::LoadPathConfig;
pub use drm::{DrmEngine, DrmSettings};
pub use engine::{
    AdResolver, Collaborators, Manifest, ManifestParser, ManifestParserRegistry, MediaElement,
    MediaPipeline,
};
pub use error::{Error, Result};
pub use headers::Headers;
pub use load_path::{LoadPathController, LoadPathEvent, LoadPathState, LoadRequest};
pub use net::{FilterContext, NetworkSession, NetworkingEngine, Request, RequestType, Response};
pub use retry::RetryParameters;
pub use sim::SimulatedPlatform;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the loader library
pub fn init() {
    tracing::info!(version = VERSION, "Kino Loader initialized");
}
