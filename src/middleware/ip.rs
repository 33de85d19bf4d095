use axum::{
    extract::{connect_info::ConnectInfo, FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use crate::state::AppState;

/// Address named by `X-Forwarded-For` (first hop) or `X-Real-IP`.
pub fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(h) = headers.get("x-forwarded-for").and_then(|hv| hv.to_str().ok()) {
        if let Some(first) = h.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }
    headers.get("x-real-ip").and_then(|hv| hv.to_str().ok()).and_then(|h| h.trim().parse::<IpAddr>().ok())
}

/// Client address for rate limiting. Proxy headers count only when
/// `trust_proxy_headers` is set; otherwise anyone could pick their own key.
pub fn client_ip(headers: &HeaderMap, remote: Option<IpAddr>, trust_proxy_headers: bool) -> IpAddr {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(headers) {
            return ip;
        }
    }
    remote.unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

/// The requesting client's address for rate limiting. Never rejects: without
/// connection info (tests, custom services) it falls back to loopback.
#[derive(Clone, Copy, Debug)]
pub struct ClientIp(pub IpAddr);

impl<S> FromRequestParts<S> for ClientIp
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let trust = AppState::from_ref(state).config.server.trust_proxy_headers;
        let remote = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(client_ip(&parts.headers, remote, trust)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn proxied() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        headers
    }

    #[test]
    fn test_forwarded_for_wins_behind_proxy() {
        let ip = client_ip(&proxied(), Some(IpAddr::from([10, 0, 0, 9])), true);
        assert_eq!(ip, IpAddr::from([203, 0, 113, 7]));
    }

    #[test]
    fn test_proxy_headers_ignored_by_default() {
        let remote = Some(IpAddr::from([10, 0, 0, 9]));
        assert_eq!(client_ip(&proxied(), remote, false), IpAddr::from([10, 0, 0, 9]));
        assert_eq!(client_ip(&proxied(), None, false), IpAddr::from([127, 0, 0, 1]));
    }

    #[test]
    fn test_fallbacks() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, None, true), IpAddr::from([127, 0, 0, 1]));
        assert_eq!(client_ip(&headers, Some(IpAddr::from([10, 0, 0, 9])), true), IpAddr::from([10, 0, 0, 9]));
        headers.insert("x-forwarded-for", HeaderValue::from_static("garbage"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_ip(&headers, None, true), IpAddr::from([198, 51, 100, 2]));
    }
}
