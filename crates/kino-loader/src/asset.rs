//! Asset descriptors
//!
//! An [`AssetDescriptor`] describes one piece of playable content: where its
//! manifest lives (or which ad-insertion service resolves it), how it is
//! protected, what it is capable of, and any sidecar text, thumbnails or
//! configuration to apply when it loads.
//!
//! Descriptors are built as a declarative pipeline of chained mutators:
//!
//! ```
//! use kino_loader::{AssetDescriptor, Feature, KeySystem, Source};
//!
//! let asset = AssetDescriptor::new(
//!     "Angel One (multicodec, multilingual, Widevine)",
//!     "https://example.com/angel_one.png",
//!     "https://example.com/angel-one-widevine/dash.mpd",
//!     Source::Shaka,
//! )
//! .add_key_system(KeySystem::Widevine)
//! .add_license_server("com.widevine.alpha", "https://license.example.com/")
//! .add_feature(Feature::Dash)
//! .add_feature(Feature::MultipleLanguages);
//!
//! assert!(asset.validate().is_ok());
//! ```
//!
//! Setters never validate. Validation happens once, at the save or load
//! boundary, through [`AssetDescriptor::validate`].

use crate::{
    drm::DrmSettings,
    headers::Headers,
    net::{RequestFilter, ResponseFilter},
    types::*,
    Error, Result,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Releases an asset's offline copy. Installed by the offline-storage collaborator.
pub type UnstoreCallback = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// How a load resolves the asset's manifest. Decided once per load.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadSource {
    /// Direct manifest or media URI
    Manifest {
        uri: String,
        mime_type: Option<String>,
    },
    /// IMA DAI VOD stream, identified by content source and video
    ImaDai {
        content_source_id: String,
        video_id: String,
        manifest_type: ImaManifestType,
    },
    /// IMA DAI live stream, identified by asset key
    ImaAssetKey {
        asset_key: String,
        manifest_type: ImaManifestType,
    },
    /// AWS MediaTailor session
    MediaTailor {
        url: String,
        ads_params: BTreeMap<String, String>,
    },
}

impl LoadSource {
    /// Returns true if an ad service must resolve the manifest URI first
    pub fn needs_ad_resolution(&self) -> bool {
        !matches!(self, LoadSource::Manifest { .. })
    }

    /// The URI to hand to the manifest parser, when known without resolution
    pub fn direct_uri(&self) -> Option<&str> {
        match self {
            LoadSource::Manifest { uri, .. } => Some(uri),
            _ => None,
        }
    }

    /// The declared manifest MIME type, when known without resolution
    pub fn mime_type(&self) -> Option<&str> {
        match self {
            LoadSource::Manifest { mime_type, .. } => mime_type.as_deref(),
            LoadSource::ImaDai { manifest_type, .. }
            | LoadSource::ImaAssetKey { manifest_type, .. } => Some(manifest_type.mime_type()),
            LoadSource::MediaTailor { .. } => None,
        }
    }
}

/// Callbacks are behavior, not data: they are never serialized and never
/// take part in equality.
#[derive(Clone, Default)]
struct AssetCallbacks {
    request_filter: Option<RequestFilter>,
    response_filter: Option<ResponseFilter>,
    unstore: Option<UnstoreCallback>,
}

impl PartialEq for AssetCallbacks {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl fmt::Debug for AssetCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetCallbacks")
            .field("request_filter", &self.request_filter.is_some())
            .field("response_filter", &self.response_filter.is_some())
            .field("unstore", &self.unstore.is_some())
            .finish()
    }
}

/// One piece of content a player can load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetDescriptor {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    short_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    manifest_uri: String,
    icon_uri: String,
    mime_type: Option<String>,
    media_playlist_full_mime_type: Option<String>,
    certificate_uri: Option<String>,
    source: Source,

    // DRM
    #[serde(rename = "drm")]
    key_systems: BTreeSet<KeySystem>,
    license_servers: BTreeMap<String, String>,
    license_request_headers: Headers,

    features: BTreeSet<Feature>,

    // Ads
    ad_tag_uri: Option<String>,
    ima_content_src_id: Option<String>,
    ima_video_id: Option<String>,
    ima_asset_key: Option<String>,
    ima_manifest_type: Option<ImaManifestType>,
    media_tailor_url: Option<String>,
    media_tailor_ads_params: Option<BTreeMap<String, String>>,

    // Sidecar content
    extra_text: Vec<ExtraText>,
    extra_thumbnail: Vec<String>,
    extra_chapter: Vec<ExtraChapter>,

    extra_config: Option<Value>,
    extra_ui_config: Option<Value>,

    disabled: bool,
    is_featured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    featured_title: Option<String>,

    /// Offline download progress in `[0, 1]`
    stored_progress: f64,

    #[serde(skip)]
    callbacks: AssetCallbacks,
}

impl Default for AssetDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            short_name: None,
            description: None,
            manifest_uri: String::new(),
            icon_uri: String::new(),
            mime_type: None,
            media_playlist_full_mime_type: None,
            certificate_uri: None,
            source: Source::Custom,
            key_systems: BTreeSet::new(),
            license_servers: BTreeMap::new(),
            license_request_headers: Headers::new(),
            features: BTreeSet::new(),
            ad_tag_uri: None,
            ima_content_src_id: None,
            ima_video_id: None,
            ima_asset_key: None,
            ima_manifest_type: None,
            media_tailor_url: None,
            media_tailor_ads_params: None,
            extra_text: Vec::new(),
            extra_thumbnail: Vec::new(),
            extra_chapter: Vec::new(),
            extra_config: None,
            extra_ui_config: None,
            disabled: false,
            is_featured: false,
            featured_title: None,
            stored_progress: 1.0,
            callbacks: AssetCallbacks::default(),
        }
    }
}

impl AssetDescriptor {
    /// Create a manifest-first asset
    pub fn new(
        name: impl Into<String>,
        icon_uri: impl Into<String>,
        manifest_uri: impl Into<String>,
        source: Source,
    ) -> Self {
        Self {
            name: name.into(),
            icon_uri: icon_uri.into(),
            manifest_uri: manifest_uri.into(),
            source,
            ..Self::default()
        }
    }

    /// Create an empty custom asset, to be filled in field by field
    pub fn blank() -> Self {
        Self::default()
    }

    // =========================================================================
    // Builder
    // =========================================================================

    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn set_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = Some(short_name.into());
        self
    }

    pub fn set_manifest_uri(mut self, uri: impl Into<String>) -> Self {
        self.manifest_uri = uri.into();
        self
    }

    pub fn set_icon_uri(mut self, uri: impl Into<String>) -> Self {
        self.icon_uri = uri.into();
        self
    }

    pub fn set_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn set_media_playlist_full_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.media_playlist_full_mime_type = Some(mime_type.into());
        self
    }

    pub fn set_certificate_uri(mut self, uri: impl Into<String>) -> Self {
        self.certificate_uri = Some(uri.into());
        self
    }

    pub fn set_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    pub fn add_feature(mut self, feature: Feature) -> Self {
        self.features.insert(feature);
        self
    }

    pub fn add_key_system(mut self, key_system: KeySystem) -> Self {
        self.key_systems.insert(key_system);
        self
    }

    /// Upsert the license server for a concrete key-system id
    pub fn add_license_server(
        mut self,
        key_system_id: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        self.license_servers.insert(key_system_id.into(), uri.into());
        self
    }

    /// Upsert a license request header; colliding names are replaced
    pub fn add_license_request_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.license_request_headers.set(name, value);
        self
    }

    /// Set the client-side ad tag. Also tags the asset with [`Feature::Ads`].
    pub fn set_ad_tag_uri(mut self, uri: impl Into<String>) -> Self {
        self.ad_tag_uri = Some(uri.into());
        self.features.insert(Feature::Ads);
        self
    }

    /// Resolve the stream through a MediaTailor session
    pub fn set_media_tailor(
        mut self,
        url: impl Into<String>,
        ads_params: Option<BTreeMap<String, String>>,
    ) -> Self {
        self.media_tailor_url = Some(url.into());
        self.media_tailor_ads_params = ads_params;
        self
    }

    pub fn set_ima_content_source_id(mut self, id: impl Into<String>) -> Self {
        self.ima_content_src_id = Some(id.into());
        self
    }

    pub fn set_ima_video_id(mut self, id: impl Into<String>) -> Self {
        self.ima_video_id = Some(id.into());
        self
    }

    pub fn set_ima_asset_key(mut self, key: impl Into<String>) -> Self {
        self.ima_asset_key = Some(key.into());
        self
    }

    pub fn set_ima_manifest_type(mut self, manifest_type: ImaManifestType) -> Self {
        self.ima_manifest_type = Some(manifest_type);
        self
    }

    pub fn mark_as_featured(mut self, title: impl Into<String>) -> Self {
        self.is_featured = true;
        self.featured_title = Some(title.into());
        self
    }

    /// Disabled assets stay in the catalog but are left out of listings
    pub fn mark_as_disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Append a paragraph to the description
    pub fn add_description(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.description = Some(match self.description.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n\n{text}"),
            _ => text,
        });
        self
    }

    pub fn add_extra_text(mut self, text: ExtraText) -> Self {
        self.extra_text.push(text);
        self
    }

    pub fn add_extra_thumbnail(mut self, uri: impl Into<String>) -> Self {
        self.extra_thumbnail.push(uri.into());
        self
    }

    pub fn add_extra_chapter(mut self, chapter: ExtraChapter) -> Self {
        self.extra_chapter.push(chapter);
        self
    }

    /// Player configuration merged in at load time. Replaces any previous value.
    pub fn set_extra_config(mut self, config: Value) -> Self {
        self.extra_config = Some(config);
        self
    }

    /// UI configuration passed through to the front-end. Replaces any previous value.
    pub fn set_extra_ui_config(mut self, config: Value) -> Self {
        self.extra_ui_config = Some(config);
        self
    }

    pub fn set_request_filter(mut self, filter: RequestFilter) -> Self {
        self.callbacks.request_filter = Some(filter);
        self
    }

    pub fn set_response_filter(mut self, filter: ResponseFilter) -> Self {
        self.callbacks.response_filter = Some(filter);
        self
    }

    // =========================================================================
    // Offline storage hooks
    // =========================================================================

    /// Record download progress, clamped to `[0, 1]`. Non-finite progress counts as none.
    pub fn set_stored_progress(&mut self, progress: f64) {
        self.stored_progress = if progress.is_finite() {
            progress.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    pub fn set_unstore_callback(&mut self, callback: Option<UnstoreCallback>) {
        self.callbacks.unstore = callback;
    }

    pub fn has_unstore_callback(&self) -> bool {
        self.callbacks.unstore.is_some()
    }

    /// Release any offline copy of this asset. A no-op when nothing is stored.
    pub async fn unstore(&mut self) -> Result<()> {
        if let Some(callback) = self.callbacks.unstore.take() {
            debug!(asset = %self.name, "Releasing stored copy");
            if let Err(err) = callback().await {
                self.callbacks.unstore = Some(callback);
                return Err(err);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_name(&self) -> Option<&str> {
        self.short_name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn manifest_uri(&self) -> &str {
        &self.manifest_uri
    }

    pub fn icon_uri(&self) -> &str {
        &self.icon_uri
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn media_playlist_full_mime_type(&self) -> Option<&str> {
        self.media_playlist_full_mime_type.as_deref()
    }

    pub fn certificate_uri(&self) -> Option<&str> {
        self.certificate_uri.as_deref()
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn key_systems(&self) -> &BTreeSet<KeySystem> {
        &self.key_systems
    }

    pub fn license_servers(&self) -> &BTreeMap<String, String> {
        &self.license_servers
    }

    pub fn license_request_headers(&self) -> &Headers {
        &self.license_request_headers
    }

    pub fn features(&self) -> &BTreeSet<Feature> {
        &self.features
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn ad_tag_uri(&self) -> Option<&str> {
        self.ad_tag_uri.as_deref()
    }

    pub fn ima_content_src_id(&self) -> Option<&str> {
        self.ima_content_src_id.as_deref()
    }

    pub fn ima_video_id(&self) -> Option<&str> {
        self.ima_video_id.as_deref()
    }

    pub fn ima_asset_key(&self) -> Option<&str> {
        self.ima_asset_key.as_deref()
    }

    pub fn ima_manifest_type(&self) -> Option<ImaManifestType> {
        self.ima_manifest_type
    }

    pub fn media_tailor_url(&self) -> Option<&str> {
        self.media_tailor_url.as_deref()
    }

    pub fn media_tailor_ads_params(&self) -> Option<&BTreeMap<String, String>> {
        self.media_tailor_ads_params.as_ref()
    }

    pub fn extra_text(&self) -> &[ExtraText] {
        &self.extra_text
    }

    pub fn extra_thumbnail(&self) -> &[String] {
        &self.extra_thumbnail
    }

    pub fn extra_chapter(&self) -> &[ExtraChapter] {
        &self.extra_chapter
    }

    pub fn extra_config(&self) -> Option<&Value> {
        self.extra_config.as_ref()
    }

    pub fn extra_ui_config(&self) -> Option<&Value> {
        self.extra_ui_config.as_ref()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn is_featured(&self) -> bool {
        self.is_featured
    }

    pub fn featured_title(&self) -> Option<&str> {
        self.featured_title.as_deref()
    }

    pub fn stored_progress(&self) -> f64 {
        self.stored_progress
    }

    pub fn request_filter(&self) -> Option<&RequestFilter> {
        self.callbacks.request_filter.as_ref()
    }

    pub fn response_filter(&self) -> Option<&ResponseFilter> {
        self.callbacks.response_filter.as_ref()
    }

    // =========================================================================
    // Derived properties
    // =========================================================================

    /// No DRM scheme at all
    pub fn is_clear(&self) -> bool {
        self.key_systems.is_empty()
    }

    /// Protected by AES-128 segment encryption only
    pub fn is_aes128(&self) -> bool {
        self.key_systems.len() == 1 && self.key_systems.contains(&KeySystem::Aes128)
    }

    /// Fully downloaded for offline playback
    pub fn is_stored(&self) -> bool {
        self.has_unstore_callback() && self.stored_progress >= 1.0
    }

    /// Concrete key-system ids for every declared scheme
    pub fn key_system_ids(&self) -> Vec<&'static str> {
        self.key_systems
            .iter()
            .flat_map(|system| system.identifiers().iter().copied())
            .collect()
    }

    /// What the DRM engine needs to set up a session for this asset
    pub fn drm_settings(&self) -> DrmSettings {
        DrmSettings {
            key_system_ids: self.key_system_ids().into_iter().map(String::from).collect(),
            license_servers: self.license_servers.clone(),
            license_headers: self.license_request_headers.clone(),
            certificate_uri: self.certificate_uri.clone(),
        }
    }

    /// Configuration tree applied at load: DRM servers and certificate,
    /// with `extraConfig` deep-merged on top
    pub fn player_configuration(&self) -> Value {
        let mut servers = Map::new();
        for (id, uri) in &self.license_servers {
            servers.insert(id.clone(), Value::String(uri.clone()));
        }

        let mut drm = Map::new();
        drm.insert("servers".into(), Value::Object(servers));

        if let Some(certificate) = &self.certificate_uri {
            let mut advanced = Map::new();
            for id in self.key_system_ids() {
                let mut entry = Map::new();
                entry.insert("serverCertificateUri".into(), Value::String(certificate.clone()));
                advanced.insert(id.to_string(), Value::Object(entry));
            }
            drm.insert("advanced".into(), Value::Object(advanced));
        }

        let mut config = Value::Object(Map::from_iter([("drm".to_string(), Value::Object(drm))]));
        if let Some(extra) = &self.extra_config {
            merge_config(&mut config, extra);
        }
        config
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check the asset is complete enough to save and load
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::EmptyName);
        }
        self.load_source().map(|_| ())
    }

    /// Decide how a load resolves this asset's manifest.
    ///
    /// Exactly one of these must be present: a manifest URI, a MediaTailor
    /// URL, an IMA content source and video id pair, or an IMA asset key.
    pub fn load_source(&self) -> Result<LoadSource> {
        let manifest_type = self.ima_manifest_type.unwrap_or(ImaManifestType::Hls);
        let mut candidates = Vec::new();

        if !self.manifest_uri.is_empty() {
            candidates.push((
                "manifest URI",
                LoadSource::Manifest {
                    uri: self.manifest_uri.clone(),
                    mime_type: self.mime_type.clone(),
                },
            ));
        }
        if let Some(url) = non_empty(&self.media_tailor_url) {
            candidates.push((
                "MediaTailor URL",
                LoadSource::MediaTailor {
                    url: url.to_string(),
                    ads_params: self.media_tailor_ads_params.clone().unwrap_or_default(),
                },
            ));
        }
        if let (Some(content_source_id), Some(video_id)) =
            (non_empty(&self.ima_content_src_id), non_empty(&self.ima_video_id))
        {
            candidates.push((
                "IMA content source and video id",
                LoadSource::ImaDai {
                    content_source_id: content_source_id.to_string(),
                    video_id: video_id.to_string(),
                    manifest_type,
                },
            ));
        }
        if let Some(asset_key) = non_empty(&self.ima_asset_key) {
            candidates.push((
                "IMA asset key",
                LoadSource::ImaAssetKey {
                    asset_key: asset_key.to_string(),
                    manifest_type,
                },
            ));
        }

        match candidates.len() {
            0 => Err(Error::MissingManifest {
                name: self.name.clone(),
            }),
            1 => Ok(candidates.remove(0).1),
            _ => Err(Error::AmbiguousSource {
                name: self.name.clone(),
                sources: candidates
                    .iter()
                    .map(|(label, _)| *label)
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Plain JSON form, used for persistence
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild a descriptor from its plain JSON form. Callbacks are not restored.
    pub fn from_json(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Deep-merge `overlay` into `base`: objects merge key by key, anything else replaces
pub fn merge_config(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => merge_config(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn widevine_asset() -> AssetDescriptor {
        AssetDescriptor::new(
            "Sintel",
            "https://example.com/sintel.png",
            "https://example.com/sintel/dash.mpd",
            Source::Shaka,
        )
        .add_key_system(KeySystem::Widevine)
        .add_license_server("com.widevine.alpha", "https://license.example.com/wv")
        .add_feature(Feature::Dash)
    }

    #[test]
    fn test_adds_are_idempotent() {
        let asset = widevine_asset()
            .add_feature(Feature::Dash)
            .add_key_system(KeySystem::Widevine);
        assert_eq!(asset.features().len(), 1);
        assert_eq!(asset.key_systems().len(), 1);
    }

    #[test]
    fn test_ad_tag_implies_ads_feature() {
        let asset = widevine_asset().set_ad_tag_uri("https://ads.example.com/vmap");
        assert!(asset.has_feature(Feature::Ads));
        assert_eq!(asset.ad_tag_uri(), Some("https://ads.example.com/vmap"));
    }

    #[test]
    fn test_license_header_collision() {
        let asset = widevine_asset()
            .add_license_request_header("X", "1")
            .add_license_request_header("X", "2");
        let headers: Vec<_> = asset.license_request_headers().iter().collect();
        assert_eq!(headers, vec![("X", "2")]);
    }

    #[test]
    fn test_description_appends() {
        let asset = AssetDescriptor::blank()
            .add_description("First.")
            .add_description("Second.");
        assert_eq!(asset.description(), Some("First.\n\nSecond."));
    }

    #[test]
    fn test_extra_config_last_write_wins() {
        let asset = AssetDescriptor::blank()
            .set_extra_config(json!({"streaming": {"bufferingGoal": 30}}))
            .set_extra_config(json!({"manifest": {"dash": {"ignoreMinBufferTime": true}}}));
        assert_eq!(
            asset.extra_config(),
            Some(&json!({"manifest": {"dash": {"ignoreMinBufferTime": true}}}))
        );
    }

    #[test]
    fn test_blank_is_empty() {
        let asset = AssetDescriptor::blank();
        assert!(asset.name().is_empty());
        assert!(asset.manifest_uri().is_empty());
        assert!(asset.features().is_empty());
        assert!(asset.key_systems().is_empty());
        assert!(asset.license_request_headers().is_empty());
        assert!(asset.extra_text().is_empty());
        assert!(!asset.is_disabled());
        assert!(!asset.is_featured());
        assert!(!asset.is_stored());
    }

    #[test]
    fn test_validate_requires_some_source() {
        let asset = AssetDescriptor::blank().set_name("Custom");
        assert!(matches!(asset.validate(), Err(Error::MissingManifest { .. })));

        let unnamed = AssetDescriptor::blank().set_manifest_uri("https://a/b.mpd");
        assert!(matches!(unnamed.validate(), Err(Error::EmptyName)));
    }

    #[test]
    fn test_dai_pair_relaxes_manifest_requirement() {
        let partial = AssetDescriptor::blank()
            .set_name("Tears of Steel (DAI)")
            .set_ima_content_source_id("2528370");
        assert!(partial.validate().is_err());

        let complete = partial.set_ima_video_id("tears-of-steel");
        assert_eq!(
            complete.load_source().unwrap(),
            LoadSource::ImaDai {
                content_source_id: "2528370".into(),
                video_id: "tears-of-steel".into(),
                manifest_type: ImaManifestType::Hls,
            }
        );
    }

    #[test]
    fn test_asset_key_and_media_tailor_sources() {
        let live = AssetDescriptor::blank()
            .set_name("Big Buck Bunny (live DAI)")
            .set_ima_asset_key("c-rArva4ShKVIAkNfy6HUQ")
            .set_ima_manifest_type(ImaManifestType::Dash);
        assert!(matches!(
            live.load_source().unwrap(),
            LoadSource::ImaAssetKey { manifest_type: ImaManifestType::Dash, .. }
        ));

        let tailor = AssetDescriptor::blank()
            .set_name("MediaTailor")
            .set_media_tailor("https://mt.example.com/v1/session/abc/index.m3u8", None);
        let source = tailor.load_source().unwrap();
        assert!(source.needs_ad_resolution());
        assert_eq!(source.direct_uri(), None);
    }

    #[test]
    fn test_two_sources_are_ambiguous() {
        let asset = widevine_asset().set_ima_asset_key("key");
        match asset.validate() {
            Err(Error::AmbiguousSource { sources, .. }) => {
                assert_eq!(sources, "manifest URI, IMA asset key");
            }
            other => panic!("expected ambiguous source, got {other:?}"),
        }
    }

    #[test]
    fn test_player_configuration_merges_extra_config() {
        let asset = widevine_asset()
            .set_certificate_uri("https://example.com/cert.der")
            .set_extra_config(json!({
                "drm": {"servers": {"org.w3.clearkey": "https://ck.example.com"}},
                "streaming": {"lowLatencyMode": true}
            }));

        let config = asset.player_configuration();
        assert_eq!(
            config["drm"]["servers"]["com.widevine.alpha"],
            "https://license.example.com/wv"
        );
        assert_eq!(config["drm"]["servers"]["org.w3.clearkey"], "https://ck.example.com");
        assert_eq!(
            config["drm"]["advanced"]["com.widevine.alpha"]["serverCertificateUri"],
            "https://example.com/cert.der"
        );
        assert_eq!(config["streaming"]["lowLatencyMode"], true);
    }

    #[test]
    fn test_drm_settings() {
        let asset = widevine_asset()
            .add_key_system(KeySystem::PlayReady)
            .add_license_request_header("X-Token", "abc");
        let settings = asset.drm_settings();
        assert!(settings.key_system_ids.contains(&"com.widevine.alpha".to_string()));
        assert!(settings.key_system_ids.contains(&"com.microsoft.playready".to_string()));
        assert_eq!(settings.license_headers.get("x-token"), Some("abc"));
        assert!(!asset.is_clear());
        assert!(!asset.is_aes128());
    }

    #[test]
    fn test_json_round_trip() {
        let asset = widevine_asset()
            .set_short_name("Sintel")
            .add_description("Open movie.")
            .set_mime_type("application/dash+xml")
            .add_license_request_header("b", "2")
            .add_license_request_header("a", "1")
            .set_ad_tag_uri("https://ads.example.com/tag")
            .set_media_tailor("https://mt.example.com", Some(BTreeMap::from([(
                "param".to_string(),
                "value".to_string(),
            )])))
            .set_ima_manifest_type(ImaManifestType::Dash)
            .add_extra_text(
                ExtraText::new(
                    "https://example.com/en.vtt",
                    "en",
                    TextTrackKind::Subtitles,
                    "text/vtt",
                )
                .with_codecs("wvtt"),
            )
            .add_extra_thumbnail("https://example.com/thumbs.vtt")
            .add_extra_chapter(ExtraChapter::new("https://example.com/ch.vtt", "en", "text/vtt"))
            .set_extra_config(json!({"abr": {"enabled": false}}))
            .set_extra_ui_config(json!({"seekBarColors": {"base": "red"}}))
            .mark_as_featured("Sintel")
            .mark_as_disabled();

        let restored = AssetDescriptor::from_json(asset.to_json().unwrap()).unwrap();
        assert_eq!(restored, asset);
        let headers: Vec<_> = restored.license_request_headers().iter().collect();
        assert_eq!(headers, vec![("b", "2"), ("a", "1")]);
    }

    #[test]
    fn test_stored_progress_stays_serializable() {
        let mut asset = widevine_asset();
        asset.set_stored_progress(f64::NAN);
        assert_eq!(asset.stored_progress(), 0.0);
        asset.set_stored_progress(f64::INFINITY);
        assert_eq!(asset.stored_progress(), 0.0);
        asset.set_stored_progress(1.7);
        assert_eq!(asset.stored_progress(), 1.0);

        let restored = AssetDescriptor::from_json(asset.to_json().unwrap()).unwrap();
        assert_eq!(restored.stored_progress(), 1.0);
    }

    #[tokio::test]
    async fn test_unstore_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let callback: UnstoreCallback = Arc::new(move || -> BoxFuture<'static, Result<()>> {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let mut asset = widevine_asset();
        asset.set_unstore_callback(Some(callback));
        assert!(asset.is_stored());

        asset.unstore().await.unwrap();
        asset.unstore().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!asset.has_unstore_callback());
    }

    #[test]
    fn test_merge_config_replaces_scalars() {
        let mut base = json!({"a": {"b": 1, "c": 2}, "d": [1, 2]});
        merge_config(&mut base, &json!({"a": {"b": 10}, "d": [3]}));
        assert_eq!(base, json!({"a": {"b": 10, "c": 2}, "d": [3]}));
    }
}
