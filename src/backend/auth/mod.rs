//! OAuth credential lifecycle shared by the chat and music platforms
//!
//! Each remote service gets one [`CredentialManager`] which owns its token
//! pair, persists it to a flat JSON document and exposes
//! [`CredentialManager::with_token`], the refresh-once-then-retry wrapper
//! every remote call goes through.

mod callback;
mod credential;
mod store;

pub use callback::CallbackServer;
pub use credential::{CredentialManager, CredentialState, OAuthProvider, TokenValidation};
pub use store::{TokenDocument, TokenStore};
