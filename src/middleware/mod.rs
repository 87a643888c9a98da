pub mod auth;
pub mod json;
pub mod security_headers;

pub use auth::{AdminSession, UserSession};
pub use json::JsonBody;
pub use security_headers::security_headers;
