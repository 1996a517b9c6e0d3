//! Core types for Kino Loader

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one load walk's networking session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadSessionId(pub Uuid);

impl LoadSessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LoadSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LoadSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Abstract DRM scheme an asset is protected with
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeySystem {
    #[serde(rename = "Clear Key")]
    ClearKey,
    #[serde(rename = "FairPlay")]
    FairPlay,
    #[serde(rename = "PlayReady")]
    PlayReady,
    #[serde(rename = "Widevine")]
    Widevine,
    #[serde(rename = "AES-128")]
    Aes128,
}

impl KeySystem {
    pub const ALL: [KeySystem; 5] = [
        KeySystem::ClearKey,
        KeySystem::FairPlay,
        KeySystem::PlayReady,
        KeySystem::Widevine,
        KeySystem::Aes128,
    ];

    /// Concrete reverse-DNS key-system ids implementing this scheme.
    ///
    /// AES-128 is segment encryption handled without a CDM and has none.
    pub fn identifiers(&self) -> &'static [&'static str] {
        match self {
            KeySystem::ClearKey => &["org.w3.clearkey"],
            KeySystem::FairPlay => &["com.apple.fps", "com.apple.fps.1_0"],
            KeySystem::PlayReady => &[
                "com.microsoft.playready",
                "com.microsoft.playready.recommendation",
                "com.chromecast.playready",
            ],
            KeySystem::Widevine => &["com.widevine.alpha"],
            KeySystem::Aes128 => &[],
        }
    }

    /// Reverse lookup from a concrete key-system id
    pub fn from_identifier(id: &str) -> Option<KeySystem> {
        Self::ALL
            .into_iter()
            .find(|system| system.identifiers().iter().any(|known| *known == id))
    }

    /// Display name, also used as the persisted form
    pub fn name(&self) -> &'static str {
        match self {
            KeySystem::ClearKey => "Clear Key",
            KeySystem::FairPlay => "FairPlay",
            KeySystem::PlayReady => "PlayReady",
            KeySystem::Widevine => "Widevine",
            KeySystem::Aes128 => "AES-128",
        }
    }
}

impl fmt::Display for KeySystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Descriptive capability tag.
///
/// Tags drive filtering and compatibility display only; loading never
/// branches on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Feature {
    // Manifest and container formats
    Dash,
    Hls,
    Mss,
    Mp4,
    Mp2ts,
    Webm,
    // Resolution class
    HighDefinition,
    UltraHighDefinition,
    // Text
    Subtitles,
    Captions,
    Ttml,
    WebVtt,
    EmbeddedText,
    // Presentation
    Live,
    Vod,
    LowLatency,
    TrickMode,
    Thumbnails,
    MultipleLanguages,
    Surround,
    SpatialAudio,
    Hdr,
    AudioOnly,
    // DRM multiplicity
    MultiDrm,
    MultiKey,
    // Segment addressing
    SegmentBase,
    SegmentList,
    SegmentTemplateDuration,
    SegmentTemplateTimeline,
    Xlink,
    // Misc
    Offline,
    Ads,
    ContentSteering,
    Lcevc,
}

impl Feature {
    pub const ALL: [Feature; 34] = [
        Feature::Dash,
        Feature::Hls,
        Feature::Mss,
        Feature::Mp4,
        Feature::Mp2ts,
        Feature::Webm,
        Feature::HighDefinition,
        Feature::UltraHighDefinition,
        Feature::Subtitles,
        Feature::Captions,
        Feature::Ttml,
        Feature::WebVtt,
        Feature::EmbeddedText,
        Feature::Live,
        Feature::Vod,
        Feature::LowLatency,
        Feature::TrickMode,
        Feature::Thumbnails,
        Feature::MultipleLanguages,
        Feature::Surround,
        Feature::SpatialAudio,
        Feature::Hdr,
        Feature::AudioOnly,
        Feature::MultiDrm,
        Feature::MultiKey,
        Feature::SegmentBase,
        Feature::SegmentList,
        Feature::SegmentTemplateDuration,
        Feature::SegmentTemplateTimeline,
        Feature::Xlink,
        Feature::Offline,
        Feature::Ads,
        Feature::ContentSteering,
        Feature::Lcevc,
    ];

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Feature::Dash => "DASH",
            Feature::Hls => "HLS",
            Feature::Mss => "MSS",
            Feature::Mp4 => "MP4",
            Feature::Mp2ts => "MPEG-2 TS",
            Feature::Webm => "WebM",
            Feature::HighDefinition => "High definition",
            Feature::UltraHighDefinition => "Ultra-high definition",
            Feature::Subtitles => "Subtitles",
            Feature::Captions => "Captions",
            Feature::Ttml => "TTML",
            Feature::WebVtt => "WebVTT",
            Feature::EmbeddedText => "Embedded text",
            Feature::Live => "Live",
            Feature::Vod => "VOD",
            Feature::LowLatency => "Low latency",
            Feature::TrickMode => "Special trick mode track",
            Feature::Thumbnails => "Thumbnails",
            Feature::MultipleLanguages => "Multiple languages",
            Feature::Surround => "Surround sound",
            Feature::SpatialAudio => "Spatial audio",
            Feature::Hdr => "HDR",
            Feature::AudioOnly => "Audio only",
            Feature::MultiDrm => "Multiple DRM systems",
            Feature::MultiKey => "Multiple keys",
            Feature::SegmentBase => "SegmentBase",
            Feature::SegmentList => "SegmentList",
            Feature::SegmentTemplateDuration => "SegmentTemplate with duration",
            Feature::SegmentTemplateTimeline => "SegmentTemplate with timeline",
            Feature::Xlink => "XLink",
            Feature::Offline => "Downloadable",
            Feature::Ads => "Ads",
            Feature::ContentSteering => "Content steering",
            Feature::Lcevc => "LCEVC",
        }
    }

    /// Parse either the persisted tag (`HIGH_DEFINITION`) or the label
    pub fn parse(value: &str) -> Option<Feature> {
        let wanted = value.trim();
        Self::ALL.into_iter().find(|feature| {
            feature.label().eq_ignore_ascii_case(wanted)
                || serde_json::to_value(feature)
                    .ok()
                    .and_then(|v| v.as_str().map(|tag| tag.eq_ignore_ascii_case(wanted)))
                    .unwrap_or(false)
        })
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where an asset descriptor came from. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    #[default]
    Custom,
    Shaka,
    Axinom,
    UnifiedStreaming,
    DashIf,
    Wowza,
    Bitcodin,
    NimbleStreamer,
    AzureMediaServices,
    Gpac,
    Uplynk,
    Apple,
    Ima,
    MediaTailor,
    Google,
    Jwplayer,
    Bitmovin,
    Mux,
    Unified,
    Generic,
}

/// Manifest flavor requested from the IMA DAI stream manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImaManifestType {
    Hls,
    Dash,
}

impl ImaManifestType {
    /// MIME type of the manifest the stream manager resolves to
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImaManifestType::Hls => "application/x-mpegurl",
            ImaManifestType::Dash => "application/dash+xml",
        }
    }
}

/// Text track kind for sidecar text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextTrackKind {
    Subtitles,
    Captions,
}

impl fmt::Display for TextTrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextTrackKind::Subtitles => write!(f, "subtitles"),
            TextTrackKind::Captions => write!(f, "captions"),
        }
    }
}

/// Sidecar text track added to an asset at load time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraText {
    pub uri: String,
    /// BCP-47 language code
    pub language: String,
    pub kind: TextTrackKind,
    pub mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codecs: Option<String>,
}

impl ExtraText {
    pub fn new(
        uri: impl Into<String>,
        language: impl Into<String>,
        kind: TextTrackKind,
        mime: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            language: language.into(),
            kind,
            mime: mime.into(),
            codecs: None,
        }
    }

    pub fn with_codecs(mut self, codecs: impl Into<String>) -> Self {
        self.codecs = Some(codecs.into());
        self
    }
}

/// Sidecar chapter track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraChapter {
    pub uri: String,
    pub language: String,
    pub mime: String,
}

impl ExtraChapter {
    pub fn new(
        uri: impl Into<String>,
        language: impl Into<String>,
        mime: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            language: language.into(),
            mime: mime.into(),
        }
    }
}
