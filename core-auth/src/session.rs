//! Narrow view of the account session used by the sync coordinator.

use crate::error::Result;
use async_trait::async_trait;
use bridge_traits::storage::AccessToken;

/// Source of the bearer credential for remote document calls.
///
/// The coordinator only needs to know whether a session exists, to obtain a
/// currently valid token, and to drop the session on sign-out.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn is_signed_in(&self) -> bool;

    /// A token valid for at least the refresh buffer, refreshed if needed.
    ///
    /// # Errors
    ///
    /// `AuthError::NotAuthenticated` when nobody is signed in; refresh
    /// failures otherwise.
    async fn request_access_token(&self) -> Result<AccessToken>;

    /// Revoke the credential and forget the session. Succeeds when already
    /// signed out.
    async fn revoke(&self) -> Result<()>;
}
