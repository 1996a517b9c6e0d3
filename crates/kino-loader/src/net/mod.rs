//! Request/response filter plumbing
//!
//! Handles:
//! - Request and response shapes handed to the networking collaborator
//! - Request/response filters attached by asset providers
//! - Per-load filter state, created fresh for every load walk
//!
//! Filters never see process-wide state. Two filters that cooperate across
//! requests (a manifest response filter feeding a license request filter)
//! share a [`FilterContext`] that lives exactly as long as one load.

pub mod uplynk;

use crate::{headers::Headers, types::LoadSessionId, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Why a request is being made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Manifest,
    Segment,
    License,
    App,
    Timing,
    ServerCertificate,
    Key,
    Ads,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestType::Manifest => "manifest",
            RequestType::Segment => "segment",
            RequestType::License => "license",
            RequestType::App => "app",
            RequestType::Timing => "timing",
            RequestType::ServerCertificate => "server-certificate",
            RequestType::Key => "key",
            RequestType::Ads => "ads",
        };
        f.write_str(name)
    }
}

/// Outgoing request
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Candidate URIs, tried in order
    pub uris: Vec<String>,
    pub method: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl Request {
    pub fn get(uri: impl Into<String>) -> Self {
        Self {
            uris: vec![uri.into()],
            method: "GET".to_string(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn post(uri: impl Into<String>, body: Bytes) -> Self {
        Self {
            uris: vec![uri.into()],
            method: "POST".to_string(),
            headers: Headers::new(),
            body: Some(body),
        }
    }
}

/// Incoming response
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Final URI after redirects
    pub uri: String,
    pub headers: Headers,
    pub data: Bytes,
}

/// Key/value scratch state shared by the filters of one load session
#[derive(Clone, Default)]
pub struct FilterContext {
    session: LoadSessionId,
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl FilterContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> LoadSessionId {
        self.session
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .ok()
            .and_then(|values| values.get(key).cloned())
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.into(), value.into());
        }
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.values.lock().ok().and_then(|mut values| values.remove(key))
    }
}

impl fmt::Debug for FilterContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterContext")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Rewrites an outgoing request before it is sent
pub type RequestFilter =
    Arc<dyn Fn(RequestType, &mut Request, &FilterContext) -> Result<()> + Send + Sync>;

/// Inspects or rewrites a response before it is handed back
pub type ResponseFilter =
    Arc<dyn Fn(RequestType, &mut Response, &FilterContext) -> Result<()> + Send + Sync>;

/// Transport collaborator that performs the actual requests
#[async_trait]
pub trait NetworkingEngine: Send + Sync {
    async fn fetch(&self, request_type: RequestType, request: &Request) -> Result<Response>;
}

/// Networking for one load walk: the engine plus that load's filters and context
#[derive(Clone)]
pub struct NetworkSession {
    engine: Arc<dyn NetworkingEngine>,
    request_filters: Vec<RequestFilter>,
    response_filters: Vec<ResponseFilter>,
    context: FilterContext,
}

impl NetworkSession {
    pub fn new(engine: Arc<dyn NetworkingEngine>) -> Self {
        Self {
            engine,
            request_filters: Vec::new(),
            response_filters: Vec::new(),
            context: FilterContext::new(),
        }
    }

    pub fn with_request_filter(mut self, filter: RequestFilter) -> Self {
        self.request_filters.push(filter);
        self
    }

    pub fn with_response_filter(mut self, filter: ResponseFilter) -> Self {
        self.response_filters.push(filter);
        self
    }

    pub fn context(&self) -> &FilterContext {
        &self.context
    }

    /// Run request filters, fetch, then run response filters
    pub async fn request(
        &self,
        request_type: RequestType,
        mut request: Request,
    ) -> Result<Response> {
        for filter in &self.request_filters {
            filter(request_type, &mut request, &self.context)?;
        }

        debug!(
            session = %self.context.session_id(),
            kind = %request_type,
            uri = request.uris.first().map(String::as_str).unwrap_or_default(),
            "Sending request"
        );

        let mut response = self.engine.fetch(request_type, &request).await?;

        for filter in &self.response_filters {
            filter(request_type, &mut response, &self.context)?;
        }

        Ok(response)
    }
}

impl fmt::Debug for NetworkSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkSession")
            .field("request_filters", &self.request_filters.len())
            .field("response_filters", &self.response_filters.len())
            .field("context", &self.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoEngine;

    #[async_trait]
    impl NetworkingEngine for EchoEngine {
        async fn fetch(&self, _request_type: RequestType, request: &Request) -> Result<Response> {
            let mut headers = Headers::new();
            headers.set("x-echo", request.uris[0].clone());
            Ok(Response {
                uri: request.uris[0].clone(),
                headers,
                data: Bytes::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_filters_run_in_order() {
        let rewrite: RequestFilter = Arc::new(|_, request, _| {
            request.uris[0].push_str("?token=1");
            Ok(())
        });
        let record: ResponseFilter = Arc::new(|kind, response, context| {
            if kind == RequestType::Manifest {
                if let Some(echo) = response.headers.get("x-echo") {
                    context.set("echo", echo);
                }
            }
            Ok(())
        });

        let session = NetworkSession::new(Arc::new(EchoEngine))
            .with_request_filter(rewrite)
            .with_response_filter(record);

        let response = session
            .request(RequestType::Manifest, Request::get("https://cdn.example/a.mpd"))
            .await
            .unwrap();

        assert_eq!(response.uri, "https://cdn.example/a.mpd?token=1");
        assert_eq!(
            session.context().get("echo").as_deref(),
            Some("https://cdn.example/a.mpd?token=1")
        );
    }

    #[test]
    fn test_contexts_are_isolated() {
        let first = FilterContext::new();
        let second = FilterContext::new();
        first.set("prefix", "https://a");
        assert_eq!(second.get("prefix"), None);
        assert_ne!(first.session_id(), second.session_id());

        let shared = first.clone();
        assert_eq!(shared.get("prefix").as_deref(), Some("https://a"));
    }
}
