//! # Authentication Module
//!
//! Google account sign-in for the sermon library.
//!
//! ## Overview
//!
//! - OAuth 2.0 authorization code flow with PKCE ([`oauth`])
//! - Token and session persistence in the host secure store ([`token_store`])
//! - Refresh five minutes before expiry, revocation, session restore
//!   ([`AuthManager`])
//! - [`SessionProvider`], the narrow interface the sync coordinator consumes
//! - Auth state events on the core event bus

pub mod error;
pub mod manager;
pub mod oauth;
pub mod session;
pub mod token_store;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::{AuthManager, TOKEN_REFRESH_BUFFER};
pub use oauth::{OAuthConfig, OAuthFlowManager, PkceVerifier};
pub use session::SessionProvider;
pub use token_store::TokenStore;
pub use types::{AuthState, OAuthTokens, ProfileId, Session, UserProfile};
