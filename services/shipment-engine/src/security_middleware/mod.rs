pub mod auth;

pub use auth::{Caller, Claims, JwtAuth};
