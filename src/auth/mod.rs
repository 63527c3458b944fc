pub mod jwt;
pub mod password;

pub use jwt::{AuthUser, JwtKeys, TokenPair};
