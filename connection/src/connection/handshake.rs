//! Outbound version message construction.

use super::configuration::ConnectionConfiguration;
use crate::address::Address;
use crate::wire::VersionPayload;
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

/// Gets the current Unix timestamp (seconds since January 1, 1970 00:00:00 UTC).
///
/// # Panics
///
/// If the system clock is set to a time before the Unix epoch
/// (January 1, 1970), which is extremely unlikely on modern systems.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time is before the Unix epoch")
        .as_secs() as i64
}

/// Generates a 64-bit nonce for use in version messages.
///
/// Not cryptographically secure, only needs to be distinct enough for the
/// protocol's self-connection detection.
pub fn generate_nonce() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_nanos() as u64;

    // Mix in the process ID for additional entropy.
    let pid = process::id() as u64;

    now ^ (pid.rotate_left(32))
}

/// Version payload we send to `peer` from `local`.
pub fn version_payload(
    configuration: &ConnectionConfiguration,
    local: Address,
    peer: Address,
) -> VersionPayload {
    VersionPayload {
        version: configuration.protocol_version,
        services: configuration.services,
        timestamp: unix_timestamp(),
        addr_me: local.with_services(configuration.services),
        addr_you: peer,
        nonce: generate_nonce(),
        user_agent: configuration.user_agent().as_str().to_string(),
        start_height: configuration.start_height,
        relay: configuration.relay,
    }
}
