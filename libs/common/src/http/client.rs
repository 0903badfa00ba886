use axum::http::HeaderMap;

use crate::session::ClientInfo;

/// First address in `X-Forwarded-For`, falling back to `X-Real-IP`
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
        })
        .map(str::to_string)
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    ClientInfo {
        ip_address: client_ip(headers),
        user_agent: user_agent(headers),
    }
}
