//! Device identity resolution for the upgrade request

use std::net::SocketAddr;

use axum::http::HeaderMap;
use serde::Deserialize;

use crate::core::provisioning::DeviceIdentity;

pub const DEVICE_ID_HEADER: &str = "device-id";
pub const CLIENT_ID_HEADER: &str = "client-id";

/// Sent as a text frame before closing a connection without identity
pub const MISSING_IDENTITY_HINT: &str =
    "Missing device-id. Pass device-id and client-id as headers or query parameters.";

/// Identity fallback for clients that cannot set headers
#[derive(Debug, Default, Deserialize)]
pub struct IdentityQuery {
    #[serde(rename = "device-id")]
    pub device_id: Option<String>,
    #[serde(rename = "client-id")]
    pub client_id: Option<String>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolve the connecting device.
///
/// Headers win; when the `device-id` header is absent both ids come from the
/// query string. Returns `None` when no device id is available.
pub fn resolve_identity(
    headers: &HeaderMap,
    query: &IdentityQuery,
    peer: SocketAddr,
) -> Option<DeviceIdentity> {
    let (device_id, client_id) = match header_str(headers, DEVICE_ID_HEADER) {
        Some(device_id) => (
            Some(device_id.to_string()),
            header_str(headers, CLIENT_ID_HEADER).map(str::to_string),
        ),
        None => (
            query
                .device_id
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            query.client_id.clone(),
        ),
    };

    Some(DeviceIdentity {
        device_id: device_id?,
        client_id,
        client_ip: client_ip(headers, peer),
    })
}

/// `x-real-ip`, else the first `x-forwarded-for` entry, else the peer address
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(ip) = header_str(headers, "x-real-ip") {
        return ip.to_string();
    }
    if let Some(forwarded) = header_str(headers, "x-forwarded-for")
        && let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty())
    {
        return first.to_string();
    }
    peer.ip().to_string()
}
