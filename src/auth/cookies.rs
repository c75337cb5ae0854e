//! Auth cookies
//!
//! Reading `accessToken` / `refreshToken` from `Cookie` headers and building
//! the matching `Set-Cookie` values.

use hyper::header::COOKIE;
use hyper::HeaderMap;

use crate::auth::TokenPair;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Value of cookie `name`, searching every `Cookie` header
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Attributes applied to every auth cookie
#[derive(Debug, Clone, Copy)]
pub struct CookiePolicy {
    pub secure: bool,
    pub access_max_age: u64,
    pub refresh_max_age: u64,
}

impl CookiePolicy {
    fn build(&self, name: &str, value: &str, max_age: u64) -> String {
        let mut cookie = format!(
            "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
            name, value, max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` values carrying a new pair
    pub fn session(&self, pair: &TokenPair) -> [String; 2] {
        [
            self.build(ACCESS_COOKIE, &pair.access_token, self.access_max_age),
            self.build(REFRESH_COOKIE, &pair.refresh_token, self.refresh_max_age),
        ]
    }

    /// `Set-Cookie` values telling the client to drop both cookies
    pub fn cleared(&self) -> [String; 2] {
        [
            self.build(ACCESS_COOKIE, "", 0),
            self.build(REFRESH_COOKIE, "", 0),
        ]
    }
}
