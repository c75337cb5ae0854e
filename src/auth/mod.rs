//! Authentication for vidtube
//!
//! Provides:
//! - Access/refresh JWT issuance, verification and rotation
//! - The per-request session gate
//! - Auth cookie parsing and `Set-Cookie` construction
//! - Password hashing with Argon2

pub mod cookies;
pub mod jwt;
pub mod password;
pub mod session;

pub use cookies::{read_cookie, CookiePolicy, ACCESS_COOKIE, REFRESH_COOKIE};
pub use jwt::{
    extract_token_from_header, AccessClaims, RefreshClaims, TokenConfig, TokenPair, TokenService,
};
pub use password::{hash_password, verify_password};
pub use session::{extract_access_token, SessionGate};
