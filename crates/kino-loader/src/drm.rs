//! DRM - settings handed to the DRM engine collaborator
//!
//! The engine itself (CDM access, license exchange) is opaque. This module
//! defines what the load path gives it: the concrete key-system ids an asset
//! declares, where to get licenses, which headers to attach, and the server
//! certificate for schemes that need one.

use crate::{
    engine::Manifest,
    error::{Error, Result},
    headers::Headers,
    net::{NetworkSession, Request},
    types::KeySystem,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// DRM configuration for one load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrmSettings {
    /// Concrete key-system ids, in preference order
    pub key_system_ids: Vec<String>,
    /// License server per concrete key-system id
    pub license_servers: BTreeMap<String, String>,
    /// Headers attached to every license request
    pub license_headers: Headers,
    /// Server certificate (FairPlay, Widevine privacy mode)
    pub certificate_uri: Option<String>,
}

impl DrmSettings {
    /// Check if any license server is configured
    pub fn is_configured(&self) -> bool {
        !self.license_servers.is_empty()
    }

    /// Abstract schemes covered by the configured servers
    pub fn supported_systems(&self) -> Vec<KeySystem> {
        let systems: BTreeSet<KeySystem> = self
            .license_servers
            .keys()
            .filter_map(|id| KeySystem::from_identifier(id))
            .collect();
        systems.into_iter().collect()
    }

    /// Pick the first key-system id the content offers that has a license server.
    ///
    /// Declared ids are preferred in declaration order; servers for ids the
    /// asset did not declare are still usable.
    pub fn select_key_system<'a>(&'a self, offered: &'a [String]) -> Option<&'a str> {
        self.key_system_ids
            .iter()
            .filter(|id| offered.contains(id))
            .chain(offered.iter())
            .find(|id| self.license_servers.contains_key(id.as_str()))
            .map(String::as_str)
    }

    /// Build the license request for a key system and CDM challenge
    pub fn license_request(&self, key_system_id: &str, challenge: Bytes) -> Result<Request> {
        let server = self
            .license_servers
            .get(key_system_id)
            .ok_or_else(|| Error::drm(format!("No license server for {key_system_id}")))?;

        let mut request = Request::post(server.clone(), challenge);
        for (name, value) in self.license_headers.iter() {
            request.headers.set(name, value);
        }
        Ok(request)
    }
}

/// DRM engine collaborator
#[async_trait]
pub trait DrmEngine: Send + Sync {
    /// Set up sessions for the manifest's protected streams.
    ///
    /// License requests go through `network` so asset filters apply.
    async fn init(
        &self,
        manifest: &Manifest,
        settings: &DrmSettings,
        network: &NetworkSession,
    ) -> Result<()>;

    /// Close every session. Safe to call when nothing was set up.
    async fn destroy(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DrmSettings {
        DrmSettings {
            key_system_ids: vec!["com.microsoft.playready".into(), "com.widevine.alpha".into()],
            license_servers: BTreeMap::from([
                ("com.widevine.alpha".to_string(), "https://wv.example.com".to_string()),
                ("org.w3.clearkey".to_string(), "https://ck.example.com".to_string()),
            ]),
            license_headers: [("X-Token", "abc")].into_iter().collect(),
            certificate_uri: None,
        }
    }

    #[test]
    fn test_drm_settings() {
        assert!(!DrmSettings::default().is_configured());

        let settings = settings();
        assert!(settings.is_configured());
        assert!(settings.supported_systems().contains(&KeySystem::Widevine));
        assert!(!settings.supported_systems().contains(&KeySystem::FairPlay));
    }

    #[test]
    fn test_select_key_system_prefers_declared_order() {
        let settings = settings();
        let offered = vec![
            "org.w3.clearkey".to_string(),
            "com.widevine.alpha".to_string(),
            "com.microsoft.playready".to_string(),
        ];
        // PlayReady is declared first but has no server
        assert_eq!(settings.select_key_system(&offered), Some("com.widevine.alpha"));

        let only_clearkey = vec!["org.w3.clearkey".to_string()];
        assert_eq!(settings.select_key_system(&only_clearkey), Some("org.w3.clearkey"));

        assert_eq!(settings.select_key_system(&[]), None);
    }

    #[test]
    fn test_license_request_carries_headers() {
        let request = settings()
            .license_request("com.widevine.alpha", Bytes::from_static(b"challenge"))
            .unwrap();
        assert_eq!(request.uris, vec!["https://wv.example.com".to_string()]);
        assert_eq!(request.method, "POST");
        assert_eq!(request.headers.get("x-token"), Some("abc"));

        assert!(settings()
            .license_request("com.apple.fps", Bytes::new())
            .is_err());
    }
}
