//! Simulated platform - in-memory collaborators for headless runs and tests
//!
//! Every collaborator the load path calls out to has a simulated counterpart
//! here, sharing one set of switches and counters:
//!
//! - media pipeline support can be turned off (direct `src=` playback only)
//! - manifest fetches can fail a fixed number of times, or always
//! - DRM setup can fail
//! - every step can be slowed down to widen interruption windows
//!
//! Parsers are registered for DASH (`.mpd`), HLS (`.m3u8`) and Smooth
//! Streaming (`.ism/Manifest`) and their MIME types. Progressive media
//! (`.mp4`, `.webm`, `.mp3`, `.m4a`) has no parser and plays directly.

use crate::{
    asset::LoadSource,
    drm::{DrmEngine, DrmSettings},
    engine::{
        AdResolver, Collaborators, Manifest, ManifestParser, ManifestParserRegistry, MediaElement,
        MediaPipeline, ParserFactory,
    },
    headers::Headers,
    net::{NetworkSession, NetworkingEngine, Request, RequestType, Response},
    types::{ImaManifestType, KeySystem},
    Error, Result,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Switches and counters shared by every simulated collaborator
#[derive(Debug)]
struct SimState {
    media_source_supported: AtomicBool,
    manifest_failures_left: AtomicU32,
    manifest_always_fails: AtomicBool,
    drm_fails: AtomicBool,
    step_delay_ms: AtomicU64,
    manifest_headers: Mutex<Headers>,
    offered_key_systems: Mutex<Vec<String>>,

    manifest_attempts: AtomicU32,
    pipeline_inits: AtomicU32,
    pipeline_clears: AtomicU32,
    drm_inits: AtomicU32,
    license_requests: Mutex<Vec<Request>>,
}

impl SimState {
    async fn pause(&self) {
        let delay = self.step_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    fn manifest_should_fail(&self) -> bool {
        if self.manifest_always_fails.load(Ordering::SeqCst) {
            return true;
        }
        self.manifest_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

/// A complete simulated playback platform
#[derive(Debug, Clone)]
pub struct SimulatedPlatform {
    state: Arc<SimState>,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlatform {
    /// A platform with media pipeline support, instant steps and no failures
    pub fn new() -> Self {
        let offered = KeySystem::ALL
            .iter()
            .flat_map(|system| system.identifiers().iter().map(|id| id.to_string()))
            .collect();

        Self {
            state: Arc::new(SimState {
                media_source_supported: AtomicBool::new(true),
                manifest_failures_left: AtomicU32::new(0),
                manifest_always_fails: AtomicBool::new(false),
                drm_fails: AtomicBool::new(false),
                step_delay_ms: AtomicU64::new(0),
                manifest_headers: Mutex::new(Headers::new()),
                offered_key_systems: Mutex::new(offered),
                manifest_attempts: AtomicU32::new(0),
                pipeline_inits: AtomicU32::new(0),
                pipeline_clears: AtomicU32::new(0),
                drm_inits: AtomicU32::new(0),
                license_requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Collaborators backed by this platform
    pub fn collaborators(&self) -> Collaborators {
        let mut parsers = ManifestParserRegistry::new();
        let state = self.state.clone();
        let factory: ParserFactory = Arc::new(move || {
            Arc::new(SimParser {
                state: state.clone(),
            }) as Arc<dyn ManifestParser>
        });
        parsers.register(&["mpd"], &["application/dash+xml"], factory.clone());
        parsers.register(
            &["m3u8"],
            &["application/x-mpegurl", "application/vnd.apple.mpegurl"],
            factory.clone(),
        );
        parsers.register(&["ism"], &["application/vnd.ms-sstr+xml"], factory);

        Collaborators {
            media_pipeline: Arc::new(SimPipeline {
                state: self.state.clone(),
            }),
            parsers,
            drm: Arc::new(SimDrm {
                state: self.state.clone(),
            }),
            networking: Arc::new(SimNetwork {
                state: self.state.clone(),
            }),
            ads: Some(Arc::new(SimAds)),
        }
    }

    // ========================================================================
    // Switches
    // ========================================================================

    pub fn set_media_source_supported(&self, supported: bool) {
        self.state
            .media_source_supported
            .store(supported, Ordering::SeqCst);
    }

    /// Fail the next `count` manifest fetches
    pub fn fail_manifest_times(&self, count: u32) {
        self.state
            .manifest_failures_left
            .store(count, Ordering::SeqCst);
    }

    pub fn fail_manifest_always(&self, fail: bool) {
        self.state
            .manifest_always_fails
            .store(fail, Ordering::SeqCst);
    }

    pub fn fail_drm(&self, fail: bool) {
        self.state.drm_fails.store(fail, Ordering::SeqCst);
    }

    /// Delay applied inside every simulated step and fetch
    pub fn set_step_delay(&self, delay: Duration) {
        self.state
            .step_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Header returned on every manifest response
    pub fn set_manifest_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.state
            .manifest_headers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set(name, value);
    }

    /// Key-system ids every parsed manifest claims to be protected with
    pub fn set_offered_key_systems(&self, ids: Vec<String>) {
        *self
            .state
            .offered_key_systems
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = ids;
    }

    // ========================================================================
    // Counters
    // ========================================================================

    pub fn manifest_attempts(&self) -> u32 {
        self.state.manifest_attempts.load(Ordering::SeqCst)
    }

    pub fn pipeline_inits(&self) -> u32 {
        self.state.pipeline_inits.load(Ordering::SeqCst)
    }

    pub fn pipeline_clears(&self) -> u32 {
        self.state.pipeline_clears.load(Ordering::SeqCst)
    }

    pub fn drm_inits(&self) -> u32 {
        self.state.drm_inits.load(Ordering::SeqCst)
    }

    /// License requests as they reached the network, after filters ran
    pub fn license_requests(&self) -> Vec<Request> {
        self.state
            .license_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ============================================================================
// Collaborators
// ============================================================================

struct SimPipeline {
    state: Arc<SimState>,
}

#[async_trait]
impl MediaPipeline for SimPipeline {
    fn is_supported(&self) -> bool {
        self.state.media_source_supported.load(Ordering::SeqCst)
    }

    async fn initialize(&self, element: &MediaElement) -> Result<String> {
        self.state.pause().await;
        let id = self.state.pipeline_inits.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(element = element.label(), id, "Simulated media source created");
        Ok(format!("blob:kino-sim/media-source/{id}"))
    }

    async fn start(&self, manifest: &Manifest, start_time: Option<f64>) -> Result<()> {
        self.state.pause().await;
        debug!(uri = %manifest.uri, ?start_time, "Simulated pipeline started");
        Ok(())
    }

    async fn clear(&self) {
        self.state.pipeline_clears.fetch_add(1, Ordering::SeqCst);
    }
}

struct SimParser {
    state: Arc<SimState>,
}

#[async_trait]
impl ManifestParser for SimParser {
    async fn start(&self, uri: &str, network: &NetworkSession) -> Result<Manifest> {
        self.state.manifest_attempts.fetch_add(1, Ordering::SeqCst);
        self.state.pause().await;

        let response = network
            .request(RequestType::Manifest, Request::get(uri))
            .await?;

        let key_system_ids = self
            .state
            .offered_key_systems
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        Ok(Manifest {
            uri: response.uri,
            is_live: uri.contains("live"),
            variant_count: 3,
            key_system_ids,
        })
    }

    async fn stop(&self) {}
}

struct SimDrm {
    state: Arc<SimState>,
}

#[async_trait]
impl DrmEngine for SimDrm {
    async fn init(
        &self,
        manifest: &Manifest,
        settings: &DrmSettings,
        network: &NetworkSession,
    ) -> Result<()> {
        self.state.drm_inits.fetch_add(1, Ordering::SeqCst);
        self.state.pause().await;

        if self.state.drm_fails.load(Ordering::SeqCst) {
            return Err(Error::drm("simulated CDM refused the session"));
        }

        if let Some(key_system) = settings.select_key_system(&manifest.key_system_ids) {
            let challenge = Bytes::from_static(b"kino-sim-challenge");
            let request = settings.license_request(key_system, challenge)?;
            network.request(RequestType::License, request).await?;
            debug!(key_system, "Simulated license acquired");
        }
        Ok(())
    }

    async fn destroy(&self) {}
}

struct SimNetwork {
    state: Arc<SimState>,
}

#[async_trait]
impl NetworkingEngine for SimNetwork {
    async fn fetch(&self, request_type: RequestType, request: &Request) -> Result<Response> {
        let uri = request.uris.first().cloned().unwrap_or_default();
        let mut headers = Headers::new();

        match request_type {
            RequestType::Manifest => {
                if self.state.manifest_should_fail() {
                    return Err(Error::manifest_fetch(format!("HTTP 503 from {uri}")));
                }
                headers = self
                    .state
                    .manifest_headers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
            }
            RequestType::License => {
                self.state
                    .license_requests
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(request.clone());
            }
            _ => {}
        }

        Ok(Response {
            uri,
            headers,
            data: Bytes::new(),
        })
    }
}

/// Resolves ad-stitched sources to deterministic simulated stream URIs
struct SimAds;

fn playlist_name(manifest_type: ImaManifestType) -> &'static str {
    match manifest_type {
        ImaManifestType::Hls => "master.m3u8",
        ImaManifestType::Dash => "manifest.mpd",
    }
}

#[async_trait]
impl AdResolver for SimAds {
    async fn resolve(&self, source: &LoadSource, network: &NetworkSession) -> Result<String> {
        match source {
            LoadSource::Manifest { uri, .. } => Ok(uri.clone()),
            LoadSource::ImaDai {
                content_source_id,
                video_id,
                manifest_type,
            } => Ok(format!(
                "https://dai.kino-sim.invalid/vod/{content_source_id}/{video_id}/{}",
                playlist_name(*manifest_type)
            )),
            LoadSource::ImaAssetKey {
                asset_key,
                manifest_type,
            } => Ok(format!(
                "https://dai.kino-sim.invalid/live/{asset_key}/{}",
                playlist_name(*manifest_type)
            )),
            LoadSource::MediaTailor { url, ads_params } => {
                let body = serde_json::to_vec(&serde_json::json!({ "adsParams": ads_params }))?;
                let response = network
                    .request(RequestType::Ads, Request::post(url.clone(), Bytes::from(body)))
                    .await?;
                Ok(response.uri)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_failure_budget() {
        let platform = SimulatedPlatform::new();
        platform.fail_manifest_times(2);
        assert!(platform.state.manifest_should_fail());
        assert!(platform.state.manifest_should_fail());
        assert!(!platform.state.manifest_should_fail());

        platform.fail_manifest_always(true);
        assert!(platform.state.manifest_should_fail());
    }

    #[test]
    fn test_registered_parsers() {
        let collaborators = SimulatedPlatform::new().collaborators();
        let parsers = &collaborators.parsers;
        assert!(parsers.can_parse("https://cdn.example.com/a/dash.mpd", None));
        assert!(parsers.can_parse("https://cdn.example.com/a/hls.m3u8", None));
        assert!(parsers.can_parse("https://cdn.example.com/a/tears.ism/Manifest", None));
        assert!(parsers.can_parse(
            "https://cdn.example.com/stream",
            Some("application/vnd.apple.mpegurl")
        ));
        assert!(!parsers.can_parse("https://cdn.example.com/a/clip.mp4", None));
        assert!(!parsers.can_parse("https://cdn.example.com/a/song.mp3", None));
    }

    #[tokio::test]
    async fn test_parser_counts_attempts_and_fails() {
        let platform = SimulatedPlatform::new();
        let collaborators = platform.collaborators();
        let network = NetworkSession::new(collaborators.networking.clone());
        let parser = collaborators
            .parsers
            .find("https://cdn.example.com/live/master.m3u8", None)
            .unwrap();

        platform.fail_manifest_times(1);
        assert!(matches!(
            parser.start("https://cdn.example.com/live/master.m3u8", &network).await,
            Err(Error::ManifestFetch(_))
        ));
        let manifest = parser
            .start("https://cdn.example.com/live/master.m3u8", &network)
            .await
            .unwrap();
        assert!(manifest.is_live);
        assert_eq!(platform.manifest_attempts(), 2);
    }

    #[tokio::test]
    async fn test_ad_resolution() {
        let collaborators = SimulatedPlatform::new().collaborators();
        let ads = collaborators.ads.clone().unwrap();
        let network = NetworkSession::new(collaborators.networking.clone());

        let dai = LoadSource::ImaDai {
            content_source_id: "2528370".into(),
            video_id: "tears-of-steel".into(),
            manifest_type: ImaManifestType::Dash,
        };
        let uri = ads.resolve(&dai, &network).await.unwrap();
        assert!(uri.ends_with("/2528370/tears-of-steel/manifest.mpd"));

        let tailor = LoadSource::MediaTailor {
            url: "https://mediatailor.example.com/v1/session/abc/index.m3u8".into(),
            ads_params: Default::default(),
        };
        assert_eq!(
            ads.resolve(&tailor, &network).await.unwrap(),
            "https://mediatailor.example.com/v1/session/abc/index.m3u8"
        );
    }

    #[tokio::test]
    async fn test_drm_requests_license_for_offered_system() {
        let platform = SimulatedPlatform::new();
        let collaborators = platform.collaborators();
        let network = NetworkSession::new(collaborators.networking.clone());
        let manifest = Manifest {
            uri: "https://cdn.example.com/a.mpd".into(),
            is_live: false,
            variant_count: 1,
            key_system_ids: vec!["com.widevine.alpha".into()],
        };
        let settings = DrmSettings {
            key_system_ids: vec!["com.widevine.alpha".into()],
            license_servers: [(
                "com.widevine.alpha".to_string(),
                "https://wv.example.com".to_string(),
            )]
            .into_iter()
            .collect(),
            ..DrmSettings::default()
        };

        collaborators.drm.init(&manifest, &settings, &network).await.unwrap();
        let requests = platform.license_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].uris[0], "https://wv.example.com");

        // Clear content never asks for a license
        collaborators
            .drm
            .init(&manifest, &DrmSettings::default(), &network)
            .await
            .unwrap();
        assert_eq!(platform.license_requests().len(), 1);

        platform.fail_drm(true);
        assert!(collaborators.drm.init(&manifest, &settings, &network).await.is_err());
        assert_eq!(platform.drm_inits(), 3);
    }
}
