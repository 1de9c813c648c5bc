//! Built-in record models.

mod user;

pub use user::{User, UserFields};
