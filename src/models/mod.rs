pub mod admin;
pub mod token;
pub mod user;

pub mod prelude {
    pub use super::admin::{self, Entity as Admin};
    pub use super::token::{self, Entity as Token};
    pub use super::user::{self, Entity as User};
}
