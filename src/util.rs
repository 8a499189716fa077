//! Shared request-inspection helpers.

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Longest device description we keep around; anything past this is noise.
const DEVICE_INFO_MAX: usize = 200;
const USER_AGENT_MAX: usize = 300;

/// Resolve the real client IP behind CDNs and reverse proxies.
///
/// Precedence: `CF-Connecting-IP` (CDN), `X-Real-IP` (reverse proxy), first
/// entry of `X-Forwarded-For`, else the transport peer address.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(ip) = header_str(headers, "cf-connecting-ip") {
        return ip.trim().to_string();
    }
    if let Some(ip) = header_str(headers, "x-real-ip") {
        return ip.trim().to_string();
    }
    if let Some(chain) = header_str(headers, "x-forwarded-for") {
        // "client, proxy1, proxy2" - only the first entry is the client.
        if let Some(first) = chain.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    peer.ip().to_string()
}

/// Raw user-agent string, capped to the audit column width.
pub fn user_agent(headers: &HeaderMap) -> String {
    truncate(header_str(headers, "user-agent").unwrap_or(""), USER_AGENT_MAX)
}

/// Human-readable device description derived from the user agent.
pub fn device_info(headers: &HeaderMap) -> String {
    truncate(header_str(headers, "user-agent").unwrap_or(""), DEVICE_INFO_MAX)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
