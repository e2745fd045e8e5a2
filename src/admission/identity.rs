use std::net::IpAddr;

/// Identity used when no signal is present at all.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the rate-limit identity of a request.
///
/// Priority: the trusted proxy header (`X-Real-IP`), then the first hop of
/// `X-Forwarded-For`, then the peer address of the connection. Blank
/// header values are skipped so the next signal applies.
pub fn resolve_client_identity(
    real_ip: Option<&str>,
    forwarded_for: Option<&str>,
    peer: Option<IpAddr>,
) -> String {
    if let Some(ip) = real_ip.map(str::trim).filter(|s| !s.is_empty()) {
        return ip.to_owned();
    }
    if let Some(first) = forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return first.to_owned();
    }
    match peer {
        Some(ip) => ip.to_string(),
        None => UNKNOWN_CLIENT.to_owned(),
    }
}
