use std::time::Duration;
use tracing::warn;

/// Overall deadline for a single forwarded query.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Stagger delay before querying a backup address of a well-known provider.
pub const WELL_KNOWN_HOST_BACKUP_DELAY: Duration = Duration::from_millis(200);

/// Idle connection timeout for pooled DoH clients.
pub const DOH_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Global cap on concurrent DoH requests.
#[cfg(any(target_os = "ios", target_os = "android"))]
pub const MAX_DOH_IN_FLIGHT: usize = 10;
#[cfg(not(any(target_os = "ios", target_os = "android")))]
pub const MAX_DOH_IN_FLIGHT: usize = 1000;

/// Default ceiling on UDP response size (RFC 6891 recommended payload).
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1232;

#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Deadline for a single forward call
    pub response_timeout: Duration,

    /// Stagger delay before querying a backup address of a well-known
    /// provider
    pub backup_delay: Duration,

    /// Maximum number of concurrent DoH requests across all queries
    pub max_doh_in_flight: usize,

    /// Largest UDP response accepted; longer responses are clipped and
    /// flagged truncated
    pub max_response_bytes: usize,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            response_timeout: env_duration_ms("BIFROST_RESPONSE_TIMEOUT_MS", RESPONSE_TIMEOUT),
            backup_delay: env_duration_ms("BIFROST_BACKUP_DELAY_MS", WELL_KNOWN_HOST_BACKUP_DELAY),
            max_doh_in_flight: env_usize("BIFROST_MAX_DOH_IN_FLIGHT", MAX_DOH_IN_FLIGHT),
            max_response_bytes: env_usize(
                "BIFROST_MAX_RESPONSE_BYTES",
                DEFAULT_MAX_RESPONSE_BYTES,
            ),
        }
    }
}

fn env_usize(var: &str, default: usize) -> usize {
    match std::env::var(var) {
        Ok(value) => match value.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Invalid value for {}: {}, using default {}", var, value, default);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_duration_ms(var: &str, default: Duration) -> Duration {
    match std::env::var(var) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    "Invalid value for {}: {}, using default {:?}",
                    var, value, default
                );
                default
            }
        },
        Err(_) => default,
    }
}
