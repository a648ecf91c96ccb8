// SPDX-License-Identifier: MIT
//! Synthetic session records and the seams for producing and encoding them.
//!
//! The emitter is generic over [`SessionSource`] (where records come from) and
//! [`EventSerializer`] (how they become a transport payload), so tests can
//! inject deterministic or failing implementations without touching the loop.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One unit of synthetic work: a fabricated user session.
///
/// Created fresh each cycle and discarded after emission; records carry no
/// relationship to one another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: Uuid,
    #[serde(rename = "email")]
    pub customer_email: String,
    #[serde(rename = "country")]
    pub login_country: String,
    pub browser: String,
    pub login_time: String,
    pub ip_address: String,
}

/// Produces one session record per call.
///
/// Implementations must be side-effect-free with respect to telemetry: the
/// emitter owns all logging and metric recording.
pub trait SessionSource: Send + Sync {
    fn next_session(&self) -> SessionEvent;
}

/// Encodes a session record into its transport representation.
pub trait EventSerializer: Send + Sync {
    /// # Errors
    /// [`SerializeError`] if the record cannot be encoded.
    fn serialize(&self, event: &SessionEvent) -> Result<String, SerializeError>;
}

/// A record could not be encoded for emission.
#[derive(Debug, Error)]
#[error("failed to encode session event: {reason}")]
pub struct SerializeError {
    reason: String,
}

impl SerializeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for SerializeError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// JSON encoding via `serde_json`; the production serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl EventSerializer for JsonSerializer {
    fn serialize(&self, event: &SessionEvent) -> Result<String, SerializeError> {
        Ok(serde_json::to_string(event)?)
    }
}

const FIRST_NAMES: &[&str] = &[
    "alice", "bruno", "chiara", "daniel", "elena", "farid", "greta", "hiro", "ines", "jonas",
    "karla", "luca", "marta", "nadia", "oscar", "paula",
];

const MAIL_DOMAINS: &[&str] = &[
    "example.com",
    "mail.test",
    "inbox.dev",
    "postbox.io",
    "letterbox.net",
];

const COUNTRIES: &[&str] = &[
    "Germany",
    "Italy",
    "France",
    "Spain",
    "Netherlands",
    "Poland",
    "Brazil",
    "Japan",
    "Canada",
    "Australia",
    "United States",
    "United Kingdom",
];

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0 Mobile Safari/537.36",
];

/// Fabricates plausible session records from fixed value pools.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticSource;

impl SessionSource for SyntheticSource {
    fn next_session(&self) -> SessionEvent {
        let mut rng = rand::rng();
        let name = FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())];
        let domain = MAIL_DOMAINS[rng.random_range(0..MAIL_DOMAINS.len())];

        SessionEvent {
            session_id: Uuid::new_v4(),
            customer_email: format!("{}{}@{}", name, rng.random_range(1..1000), domain),
            login_country: COUNTRIES[rng.random_range(0..COUNTRIES.len())].to_string(),
            browser: USER_AGENTS[rng.random_range(0..USER_AGENTS.len())].to_string(),
            login_time: Utc::now().to_rfc3339(),
            // First octet avoids reserved ranges starting at 224 (multicast).
            ip_address: format!(
                "{}.{}.{}.{}",
                rng.random_range(1..=223u8),
                rng.random_range(0..=255u8),
                rng.random_range(0..=255u8),
                rng.random_range(1..=254u8)
            ),
        }
    }
}
