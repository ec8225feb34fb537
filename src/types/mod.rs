mod auth;
mod chat;

pub use auth::*;
pub use chat::*;
