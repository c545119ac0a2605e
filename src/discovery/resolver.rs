use super::types::ServiceRecord;
use crate::error::DiscoveryError;

/// Transport scheme used by every role.
pub const TCP_SCHEME: &str = "tcp";

/// Turns a record into `scheme://hostname:port`.
pub fn to_endpoint(record: &ServiceRecord, scheme: &str) -> Result<String, DiscoveryError> {
    if record.hostname.is_empty() {
        return Err(DiscoveryError::Unresolvable(record.clone()));
    }
    Ok(format!("{}://{}:{}", scheme, record.hostname, record.port))
}

/// Splits `scheme://host:port` into its parts. The port is taken after the
/// last `:` so bare IPv6 hosts survive.
pub fn parse_endpoint(endpoint: &str) -> Option<(&str, &str, u16)> {
    let (scheme, address) = endpoint.split_once("://")?;
    let (host, port) = address.rsplit_once(':')?;
    if scheme.is_empty() || host.is_empty() {
        return None;
    }
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Some((scheme, host, port.parse().ok()?))
}
