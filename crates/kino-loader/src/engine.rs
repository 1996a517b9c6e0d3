//! Collaborator seams used by the load path
//!
//! The load path orchestrates engines it does not implement:
//! - a media pipeline that feeds the media element (MSE-style)
//! - manifest parsers, looked up by URI extension or MIME type
//! - a DRM engine (see [`crate::drm`])
//! - an ad-stream resolver for DAI and MediaTailor assets
//! - a networking engine (see [`crate::net`])
//!
//! Their internals are out of scope; only their contracts live here.

use crate::{
    asset::LoadSource,
    drm::DrmEngine,
    net::{NetworkSession, NetworkingEngine},
    Result,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use url::Url;

/// The playback surface a controller is attached to.
///
/// Anyone may read `src`; only the load path assigns it.
pub struct MediaElement {
    label: String,
    src: RwLock<Option<String>>,
}

impl MediaElement {
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            src: RwLock::new(None),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The resource currently assigned for playback
    pub fn src(&self) -> Option<String> {
        self.src
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn assign_src(&self, src: Option<String>) {
        *self.src.write().unwrap_or_else(PoisonError::into_inner) = src;
    }
}

impl fmt::Debug for MediaElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaElement")
            .field("label", &self.label)
            .field("src", &self.src())
            .finish()
    }
}

/// Opaque summary of a parsed manifest
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub uri: String,
    pub is_live: bool,
    pub variant_count: usize,
    /// Concrete key-system ids the content is protected with
    pub key_system_ids: Vec<String>,
}

/// Media pipeline collaborator (MediaSource and its buffers)
#[async_trait]
pub trait MediaPipeline: Send + Sync {
    /// Whether the platform can run a media pipeline at all
    fn is_supported(&self) -> bool;

    /// Create a media source for `element`; returns the URL to assign as its src
    async fn initialize(&self, element: &MediaElement) -> Result<String>;

    /// Start buffering the parsed manifest
    async fn start(&self, manifest: &Manifest, start_time: Option<f64>) -> Result<()>;

    /// Tear the media source down. Safe to call when nothing was set up.
    async fn clear(&self);
}

/// Fetches and parses one manifest
#[async_trait]
pub trait ManifestParser: Send + Sync {
    /// Fetch the manifest through `network` and parse it
    async fn start(&self, uri: &str, network: &NetworkSession) -> Result<Manifest>;

    /// Stop any live updates
    async fn stop(&self);
}

/// Creates parser instances, one per load
pub type ParserFactory = Arc<dyn Fn() -> Arc<dyn ManifestParser> + Send + Sync>;

/// Resolves a URI or declared MIME type to a parser
#[derive(Clone, Default)]
pub struct ManifestParserRegistry {
    by_extension: HashMap<String, ParserFactory>,
    by_mime_type: HashMap<String, ParserFactory>,
}

impl ManifestParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser for file extensions and MIME types
    pub fn register(&mut self, extensions: &[&str], mime_types: &[&str], factory: ParserFactory) {
        for extension in extensions {
            self.by_extension
                .insert(extension.to_ascii_lowercase(), factory.clone());
        }
        for mime_type in mime_types {
            self.by_mime_type
                .insert(mime_type.to_ascii_lowercase(), factory.clone());
        }
    }

    /// Find a parser, checking the declared MIME type before the URI extension
    pub fn find(&self, uri: &str, mime_type: Option<&str>) -> Option<Arc<dyn ManifestParser>> {
        let by_mime = mime_type
            .map(base_mime_type)
            .and_then(|mime| self.by_mime_type.get(&mime));
        let by_extension = || {
            manifest_extension(uri).and_then(|extension| self.by_extension.get(&extension))
        };
        by_mime.or_else(by_extension).map(|factory| factory())
    }

    pub fn can_parse(&self, uri: &str, mime_type: Option<&str>) -> bool {
        self.find(uri, mime_type).is_some()
    }
}

impl fmt::Debug for ManifestParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut extensions: Vec<_> = self.by_extension.keys().collect();
        extensions.sort();
        f.debug_struct("ManifestParserRegistry")
            .field("extensions", &extensions)
            .finish_non_exhaustive()
    }
}

/// Strip parameters from a MIME type (`application/dash+xml; codecs=...`)
fn base_mime_type(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Extension of the URI path, lowercased. Smooth Streaming's
/// `.ism/Manifest` maps to `ism`.
pub fn manifest_extension(uri: &str) -> Option<String> {
    let path = match Url::parse(uri) {
        Ok(url) => url.path().to_ascii_lowercase(),
        Err(_) => uri
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase(),
    };

    if path.ends_with(".ism/manifest") {
        return Some("ism".to_string());
    }

    let file = path.rsplit('/').next()?;
    let (_, extension) = file.rsplit_once('.')?;
    (!extension.is_empty()).then(|| extension.to_string())
}

/// Resolves ad-stitched sources (IMA DAI, MediaTailor) to a manifest URI
#[async_trait]
pub trait AdResolver: Send + Sync {
    async fn resolve(&self, source: &LoadSource, network: &NetworkSession) -> Result<String>;
}

/// Everything the load path calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub media_pipeline: Arc<dyn MediaPipeline>,
    pub parsers: ManifestParserRegistry,
    pub drm: Arc<dyn DrmEngine>,
    pub networking: Arc<dyn NetworkingEngine>,
    pub ads: Option<Arc<dyn AdResolver>>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("media_source_supported", &self.media_pipeline.is_supported())
            .field("parsers", &self.parsers)
            .field("ads", &self.ads.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullParser;

    #[async_trait]
    impl ManifestParser for NullParser {
        async fn start(&self, uri: &str, _network: &NetworkSession) -> Result<Manifest> {
            Ok(Manifest {
                uri: uri.to_string(),
                is_live: false,
                variant_count: 0,
                key_system_ids: Vec::new(),
            })
        }

        async fn stop(&self) {}
    }

    fn registry() -> ManifestParserRegistry {
        let mut registry = ManifestParserRegistry::new();
        let factory: ParserFactory = Arc::new(|| Arc::new(NullParser) as Arc<dyn ManifestParser>);
        registry.register(&["mpd"], &["application/dash+xml"], factory.clone());
        registry.register(&["m3u8"], &["application/x-mpegurl"], factory);
        registry
    }

    #[test]
    fn test_detect_by_extension() {
        let registry = registry();
        assert!(registry.can_parse("https://example.com/master.m3u8", None));
        assert!(registry.can_parse("https://example.com/manifest.MPD?token=1", None));
        assert!(!registry.can_parse("https://example.com/video.mp4", None));
    }

    #[test]
    fn test_mime_type_takes_precedence() {
        let registry = registry();
        assert!(registry.can_parse(
            "https://example.com/play?id=7",
            Some("application/dash+xml; profiles=live")
        ));
        assert!(registry.can_parse("https://example.com/a.mpd", Some("video/mp4")));
    }

    #[test]
    fn test_manifest_extension() {
        assert_eq!(manifest_extension("https://a.com/x/y.m3u8").as_deref(), Some("m3u8"));
        assert_eq!(
            manifest_extension("https://a.com/tears.ism/Manifest").as_deref(),
            Some("ism")
        );
        assert_eq!(manifest_extension("/local/path/clip.webm#t=3").as_deref(), Some("webm"));
        assert_eq!(manifest_extension("https://a.com/stream"), None);
    }

    #[test]
    fn test_media_element_src() {
        let element = MediaElement::new("video");
        assert_eq!(element.src(), None);
        element.assign_src(Some("blob:1".into()));
        assert_eq!(element.src().as_deref(), Some("blob:1"));
    }
}
