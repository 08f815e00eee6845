use std::fmt;
use std::str::FromStr;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{SessionError, SessionResult};

// base64url, padding optional: the backend emits unpadded segments but some
// tooling pads them.
const SEGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Claims stripped from the display profile.
const NON_DISPLAY_CLAIMS: [&str; 3] = ["role", "iat", "exp"];

/// Role claim. Matching is case-sensitive: only the exact string `ADMIN` is the admin role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    #[default]
    User,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
            Role::Other(s) => s.as_str(),
        }
    }

    pub fn is_admin(&self) -> bool { matches!(self, Role::Admin) }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        match s {
            "ADMIN" => Role::Admin,
            "USER" => Role::User,
            other => Role::Other(other.to_string()),
        }
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Ok(Role::from(s)) }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Role::from(s.as_str()))
    }
}

#[derive(Deserialize)]
struct RawClaims {
    #[serde(default)]
    role: Option<Role>,
    exp: i64,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Client-decoded token payload.
///
/// Nothing here is signature-checked. `role` and `exp` drive UX decisions only;
/// the backend re-authorizes every privileged request.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    pub role: Role,
    /// Seconds since the Unix epoch.
    pub exp: i64,
    /// Every other claim in the payload, `iat` included.
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.exp, 0)
    }

    /// Seconds left until `exp`; zero or negative once expired.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        self.exp.saturating_sub(now.timestamp())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.remaining_secs(now) <= 0
    }

    /// Claims suitable for showing to the user (name, email, ...).
    pub fn display_claims(&self) -> Map<String, Value> {
        self.extra
            .iter()
            .filter(|(k, _)| !NON_DISPLAY_CLAIMS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Decode the payload segment of a compact `header.payload.signature` token.
/// The signature segment is never inspected.
pub fn decode_token(token: &str) -> SessionResult<Claims> {
    let mut parts = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(SessionError::decode("token must have exactly three segments"));
    };
    if payload.is_empty() {
        return Err(SessionError::decode("token payload segment is empty"));
    }
    let bytes = SEGMENT_ENGINE
        .decode(payload)
        .map_err(|e| SessionError::decode(format!("payload is not base64url: {}", e)))?;
    let raw: RawClaims = serde_json::from_slice(&bytes)
        .map_err(|e| SessionError::decode(format!("payload is not a claims object: {}", e)))?;
    Ok(Claims { role: raw.role.unwrap_or_default(), exp: raw.exp, extra: raw.rest })
}

/// Build an unsigned compact token around `payload`. Used by fixtures and mock
/// backends; real tokens always come from the backend.
pub fn compose_unsigned(payload: &Value) -> String {
    let header = SEGMENT_ENGINE.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = SEGMENT_ENGINE.encode(payload.to_string().as_bytes());
    format!("{}.{}.", header, body)
}
