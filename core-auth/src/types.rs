use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a signed-in Google account session.
///
/// A fresh id is minted on every successful sign-in, so tokens left behind by
/// an earlier session are never picked up by a later one.
///
/// # Examples
///
/// ```
/// use core_auth::ProfileId;
///
/// let profile_id = ProfileId::new();
/// let parsed = ProfileId::from_string(&profile_id.to_string()).unwrap();
/// assert_eq!(profile_id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(Uuid);

impl ProfileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a profile ID from its hyphenated UUID form
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ProfileId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// OAuth 2.0 token set.
///
/// `Debug` redacts both tokens so the struct can sit in tracing fields.
///
/// # Examples
///
/// ```
/// use core_auth::OAuthTokens;
///
/// let tokens = OAuthTokens::new("ya29.a0".to_string(), Some("1//0g".to_string()), 3600);
/// assert!(!tokens.expires_within(60));
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    /// Google only returns a refresh token on the first consent
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl OAuthTokens {
    /// Build a token set expiring `expires_in` seconds from now
    pub fn new(access_token: String, refresh_token: Option<String>, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        }
    }

    /// True when the access token is expired or expires within `buffer_seconds`
    pub fn expires_within(&self, buffer_seconds: i64) -> bool {
        Utc::now() >= self.expires_at - Duration::seconds(buffer_seconds)
    }

    /// Remaining lifetime, `None` once expired
    pub fn time_until_expiry(&self) -> Option<Duration> {
        let now = Utc::now();
        if now >= self.expires_at {
            None
        } else {
            Some(self.expires_at - now)
        }
    }

    /// Expiry as Unix seconds
    pub fn expires_at_unix(&self) -> i64 {
        self.expires_at.timestamp()
    }
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Basic profile returned by the Google userinfo endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// The active signed-in session, persisted so a restart does not force a
/// new consent screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub profile_id: ProfileId,
    pub profile: UserProfile,
    pub signed_in_at: DateTime<Utc>,
}

impl Session {
    pub fn new(profile_id: ProfileId, profile: UserProfile) -> Self {
        Self {
            profile_id,
            profile,
            signed_in_at: Utc::now(),
        }
    }
}

/// Authentication state of the account.
///
/// ```text
/// SignedOut -> SigningIn -> SignedIn
///                             ^  |
///                             |  v
///                      TokenRefreshing
/// ```
///
/// ```
/// use core_auth::AuthState;
///
/// assert!(!AuthState::SignedOut.is_authenticated());
/// assert!(AuthState::TokenRefreshing.is_authenticated());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AuthState {
    #[default]
    SignedOut,
    /// Waiting for the OAuth redirect
    SigningIn,
    SignedIn,
    TokenRefreshing,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::SignedIn | AuthState::TokenRefreshing)
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, AuthState::SigningIn | AuthState::TokenRefreshing)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::SignedOut => write!(f, "Signed Out"),
            AuthState::SigningIn => write!(f, "Signing In..."),
            AuthState::SignedIn => write!(f, "Signed In"),
            AuthState::TokenRefreshing => write!(f, "Refreshing Token..."),
        }
    }
}
