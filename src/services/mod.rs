//! Application services
//!
//! - `accounts`: registration, login/logout/refresh and profile updates
//! - `social`: subscription toggles and watch-history appends
//! - `media`: the upload collaborator and request-borne media payloads

pub mod accounts;
pub mod media;
pub mod social;

pub use accounts::{
    AccountService, ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest, Session,
    UpdateAccountRequest,
};
pub use media::{
    public_id_from_url, HttpMediaUploader, MediaPayload, MediaService, MediaUploader,
    UnconfiguredUploader, UploadedMedia,
};
pub use social::{SocialService, SubscriptionState};
