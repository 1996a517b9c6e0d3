//! Uplynk license URL rewriting
//!
//! Uplynk manifests carry an `x-uplynk-prefix` response header. The license
//! server for that playback lives under the prefix, with a suffix naming the
//! DRM scheme (`/wv`, `/ck` or `/pr`). The response filter records the prefix
//! in the load's [`FilterContext`]; the request filter consumes it when the
//! license request goes out. License requests are only issued after the
//! manifest is parsed, so the prefix is always recorded first.

use super::{FilterContext, Request, RequestFilter, RequestType, Response, ResponseFilter};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

/// Response header carrying the license prefix
pub const PREFIX_HEADER: &str = "x-uplynk-prefix";

const PREFIX_KEY: &str = "uplynk.prefix";

/// Scheme markers, checked in this order
const SCHEME_MARKERS: [&str; 3] = ["wv", "ck", "pr"];

/// Build the Uplynk request/response filter pair
pub fn filters() -> (RequestFilter, ResponseFilter) {
    (Arc::new(rewrite_license_request), Arc::new(record_prefix))
}

fn record_prefix(
    kind: RequestType,
    response: &mut Response,
    context: &FilterContext,
) -> Result<()> {
    if kind != RequestType::Manifest {
        return Ok(());
    }
    match response.headers.get(PREFIX_HEADER) {
        Some(prefix) => {
            debug!(prefix, "Recorded Uplynk license prefix");
            context.set(PREFIX_KEY, prefix);
        }
        None => {
            context.remove(PREFIX_KEY);
        }
    }
    Ok(())
}

fn rewrite_license_request(
    kind: RequestType,
    request: &mut Request,
    context: &FilterContext,
) -> Result<()> {
    if kind != RequestType::License {
        return Ok(());
    }
    let Some(prefix) = context.get(PREFIX_KEY) else {
        return Ok(());
    };
    let Some(uri) = request.uris.first_mut() else {
        return Ok(());
    };
    if let Some(marker) = SCHEME_MARKERS.iter().find(|marker| uri.contains(*marker)) {
        let rewritten = format!("{}/{}", prefix.trim_end_matches('/'), marker);
        debug!(from = %uri, to = %rewritten, "Rewrote Uplynk license request");
        *uri = rewritten;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::Headers;
    use bytes::Bytes;

    fn manifest_response(prefix: Option<&str>) -> Response {
        let mut headers = Headers::new();
        if let Some(prefix) = prefix {
            headers.set("X-Uplynk-Prefix", prefix);
        }
        Response {
            uri: "https://content.uplynk.com/a.mpd".into(),
            headers,
            data: Bytes::new(),
        }
    }

    #[test]
    fn test_license_rewritten_with_recorded_prefix() {
        let (request_filter, response_filter) = filters();
        let context = FilterContext::new();

        response_filter(
            RequestType::Manifest,
            &mut manifest_response(Some("https://content-ause2.uplynk.com/abc")),
            &context,
        )
        .unwrap();

        let mut widevine = Request::get("https://content.uplynk.com/wv");
        request_filter(RequestType::License, &mut widevine, &context).unwrap();
        assert_eq!(widevine.uris[0], "https://content-ause2.uplynk.com/abc/wv");

        let mut playready = Request::get("https://content.uplynk.com/pr");
        request_filter(RequestType::License, &mut playready, &context).unwrap();
        assert_eq!(playready.uris[0], "https://content-ause2.uplynk.com/abc/pr");
    }

    #[test]
    fn test_missing_header_clears_prefix() {
        let (request_filter, response_filter) = filters();
        let context = FilterContext::new();

        response_filter(RequestType::Manifest, &mut manifest_response(Some("https://p")), &context)
            .unwrap();
        response_filter(RequestType::Manifest, &mut manifest_response(None), &context).unwrap();

        let mut request = Request::get("https://content.uplynk.com/ck");
        request_filter(RequestType::License, &mut request, &context).unwrap();
        assert_eq!(request.uris[0], "https://content.uplynk.com/ck");
    }

    #[test]
    fn test_only_license_requests_are_rewritten() {
        let (request_filter, _) = filters();
        let context = FilterContext::new();
        context.set(PREFIX_KEY, "https://p");

        let mut segment = Request::get("https://content.uplynk.com/wv/seg1.m4s");
        request_filter(RequestType::Segment, &mut segment, &context).unwrap();
        assert_eq!(segment.uris[0], "https://content.uplynk.com/wv/seg1.m4s");
    }

    #[test]
    fn test_prefix_does_not_leak_between_loads() {
        let (request_filter, response_filter) = filters();
        let first_load = FilterContext::new();
        let second_load = FilterContext::new();

        let mut response = manifest_response(Some("https://p1"));
        response_filter(RequestType::Manifest, &mut response, &first_load).unwrap();

        let mut request = Request::get("https://content.uplynk.com/wv");
        request_filter(RequestType::License, &mut request, &second_load).unwrap();
        assert_eq!(request.uris[0], "https://content.uplynk.com/wv");
    }
}
