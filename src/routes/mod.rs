//! HTTP routes for vidtube

pub mod health;
pub mod respond;
pub mod subscriptions;
pub mod users;

pub use health::{health_check, readiness_check, version_info};
pub use respond::{
    cors_preflight, empty_body, error_response, full_body, json_response, parse_json_body,
    parse_optional_json_body, success, with_cookies, with_cors, BoxBody, BoxError,
};
pub use subscriptions::{handle_subscriptions_request, SUBSCRIPTIONS_PREFIX};
pub use users::{handle_users_request, USERS_PREFIX};
