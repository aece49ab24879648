//! Small helpers shared by the client and the binary.

use std::sync::Once;

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::warn;
use uuid::Uuid;

/// Fresh session id: a v4 UUID as 32 lowercase hex characters.
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Current UTC time as used in the `X-Timestamp` frame header.
pub fn iso_timestamp() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

/// Format as `YYYY-MM-DDTHH:MM:SS.mmmZ` in UTC.
pub fn format_timestamp(at: OffsetDateTime) -> String {
    let at = at.to_offset(time::UtcOffset::UTC);
    at.format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    ))
    .unwrap_or_else(|_| format!("{}Z", at.unix_timestamp()))
}

static CRYPTO_PROVIDER: Once = Once::new();

/// Install the ring crypto provider for rustls once per process.
///
/// Both the WebSocket and the HTTP client need a process-wide provider before
/// the first TLS connection.
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            warn!("A rustls crypto provider was already installed");
        }
    });
}
