pub mod auth;
pub mod deploy;
pub mod token;

pub use auth::*;
pub use deploy::*;
pub use token::*;
