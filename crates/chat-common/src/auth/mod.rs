//! Authentication utilities

mod jwt;

pub use jwt::{Claims, JwtService, ACCESS_TOKEN_TYPE};
