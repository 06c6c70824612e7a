//! OAuth 2.0 bridge
//!
//! - **Login**: browser login verified by the external provider
//! - **Server**: authorization-code and refresh-token grants
//! - **Middleware**: bearer token authentication
//! - **Gate**: per-request provider session for protected routes

pub mod gate;
pub mod login;
pub mod middleware;
pub mod server;

pub use gate::{ProviderSessionHandle, session_gate};
pub use login::handle_login;
pub use middleware::{AuthenticatedUser, bearer_middleware, extract_bearer_token};
pub use server::{
    AuthorizationOutcome, AuthorizeParams, GrantService, PrincipalResolver, SessionPrincipal,
    TokenParams, generate_client_secret, handle_authorize, handle_token, register_client,
};

#[cfg(test)]
mod middleware_test;
