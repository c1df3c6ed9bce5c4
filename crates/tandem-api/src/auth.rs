use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};

use tandem_types::api::Claims;
use tandem_types::models::UserId;

/// Mint an HS256 token for `user_id` valid for `ttl`.
///
/// Production tokens come from the user service; this is for tooling and
/// tests that need a token the middleware will accept.
pub fn create_token(secret: &str, user_id: UserId, ttl: Duration) -> jsonwebtoken::errors::Result<String> {
    let claims = Claims {
        user_id,
        exp: (Utc::now() + ttl).timestamp().max(0) as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
