//! Error types for Kino Loader

use thiserror::Error;

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Loader error types
#[derive(Error, Debug, Clone)]
pub enum Error {
    // Validation errors
    #[error("Asset '{name}' has no manifest URI and no ad-insertion or MediaTailor source")]
    MissingManifest { name: String },

    #[error("Asset '{name}' declares more than one source: {sources}")]
    AmbiguousSource { name: String, sources: String },

    #[error("Asset name must not be empty")]
    EmptyName,

    #[error("An asset named '{name}' already exists")]
    DuplicateName { name: String },

    #[error("No asset named '{name}'")]
    AssetNotFound { name: String },

    // Walk interruption
    #[error("Load interrupted by a newer request")]
    LoadInterrupted,

    // Controller lifecycle errors
    #[error("Player has been destroyed")]
    Destroyed,

    #[error("No media element attached")]
    NotAttached,

    // Transport / manifest / DRM errors
    #[error("Failed to fetch manifest: {0}")]
    ManifestFetch(String),

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    #[error("No manifest parser for {uri}")]
    NoManifestParser { uri: String },

    #[error("DRM initialization failed: {0}")]
    DrmInit(String),

    #[error("Media pipeline error: {0}")]
    MediaPipeline(String),

    #[error("Ad stream resolution failed: {0}")]
    AdResolution(String),

    #[error("Request failed: {uri} ({reason})")]
    Request { uri: String, reason: String },

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a manifest fetch error
    pub fn manifest_fetch(msg: impl Into<String>) -> Self {
        Error::ManifestFetch(msg.into())
    }

    /// Create a DRM error
    pub fn drm(msg: impl Into<String>) -> Self {
        Error::DrmInit(msg.into())
    }

    /// Returns true if this is the interruption signal raised on a superseded walk.
    ///
    /// Callers should not surface it as a user-facing failure.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Error::LoadInterrupted)
    }

    /// Returns true for validation failures detected at the save/load boundary
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::MissingManifest { .. }
                | Error::AmbiguousSource { .. }
                | Error::EmptyName
                | Error::DuplicateName { .. }
                | Error::AssetNotFound { .. }
        )
    }

    /// Returns true if this error is transient and worth another attempt
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ManifestFetch(_) | Error::Request { .. } | Error::DrmInit(_)
        )
    }

    /// Returns the error code for event reporting
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::MissingManifest { .. } => "MISSING_MANIFEST",
            Error::AmbiguousSource { .. } => "AMBIGUOUS_SOURCE",
            Error::EmptyName => "EMPTY_NAME",
            Error::DuplicateName { .. } => "DUPLICATE_NAME",
            Error::AssetNotFound { .. } => "ASSET_NOT_FOUND",
            Error::LoadInterrupted => "LOAD_INTERRUPTED",
            Error::Destroyed => "DESTROYED",
            Error::NotAttached => "NOT_ATTACHED",
            Error::ManifestFetch(_) => "MANIFEST_FETCH",
            Error::ManifestParse(_) => "MANIFEST_PARSE",
            Error::NoManifestParser { .. } => "NO_MANIFEST_PARSER",
            Error::DrmInit(_) => "DRM_INIT",
            Error::MediaPipeline(_) => "MEDIA_PIPELINE",
            Error::AdResolution(_) => "AD_RESOLUTION",
            Error::Request { .. } => "REQUEST",
            Error::Storage(_) => "STORAGE",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Io(_) => "IO",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interruption_is_not_validation() {
        assert!(Error::LoadInterrupted.is_interruption());
        assert!(!Error::LoadInterrupted.is_validation());
        assert!(!Error::LoadInterrupted.is_recoverable());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::manifest_fetch("timeout").is_recoverable());
        assert!(Error::drm("license server 503").is_recoverable());
        assert!(!Error::ManifestParse("bad xml".into()).is_recoverable());
        assert!(!Error::Destroyed.is_recoverable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::EmptyName.error_code(), "EMPTY_NAME");
        assert_eq!(Error::LoadInterrupted.error_code(), "LOAD_INTERRUPTED");
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.error_code(), "SERIALIZATION");
    }
}
