use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

use crate::{model::user::User, models::Claims};

fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

/// Issues the signed access token embedding the caller's organisational identity.
pub fn generate_token(user: &User, secret: &str, ttl: usize) -> Result<String, Error> {
    let claims = Claims {
        user_id: user.id,
        sub: user.email.clone(),
        vertical_id: user.vertical_id,
        position_id: user.position_id,
        employee_id: user.employee_id,
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    pub(crate) fn sample_user() -> User {
        User {
            id: 4,
            email: "ops@example.com".to_string(),
            password: "hash".to_string(),
            vertical_id: 2,
            position_id: 3,
            employee_id: 11,
            created_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn token_round_trips_identity_claims() {
        let token = generate_token(&sample_user(), "secret", 60).unwrap();
        let claims = verify_token(&token, "secret").unwrap();

        assert_eq!(claims.user_id, 4);
        assert_eq!(claims.sub, "ops@example.com");
        assert_eq!(claims.vertical_id, 2);
        assert_eq!(claims.position_id, 3);
        assert_eq!(claims.employee_id, 11);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_token(&sample_user(), "secret", 60).unwrap();
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = verify_token(
            &generate_token(&sample_user(), "secret", 60).unwrap(),
            "secret",
        )
        .unwrap();
        // well past the default validation leeway
        claims.exp = now() - 3600;
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        assert!(verify_token(&token, "secret").is_err());
    }
}
