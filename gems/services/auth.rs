use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use common::{database::DbPool, utils::config::Config};

use crate::{
    models::{
        auth::{LoginRequest, SignupRequest, StatusResponse, TokenResponse, UserType},
        user::AccountProfile,
    },
    utils::{
        database::{ARTISAN_COLUMNS, USER_COLUMNS, map_artisan_row, map_user_row},
        error::{ApiError, Result},
    },
};

/// Claims carried by every access token. `sub` is the artisan `user_id` for
/// artisans and the users row id for customers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub user_type: UserType,
    pub iat: i64,
    pub exp: i64,
}

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(config: &Config) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret_key.as_bytes()),
            token_ttl: Duration::minutes(config.access_token_expire_minutes),
        }
    }

    pub fn issue_token(&self, sub: &str, user_type: UserType) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: sub.to_owned(),
            user_type,
            iat: now.timestamp(),
            exp: (now + self.token_ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(format!("Failed to sign token: {e}")))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                warn!("Rejected access token: {e}");
                ApiError::Unauthorized("Invalid token".to_owned())
            })
    }

    #[instrument(skip(self, pool, request), fields(email = %request.email, user_type = request.user_type.as_str()))]
    pub async fn signup(&self, pool: &DbPool, request: SignupRequest) -> Result<StatusResponse> {
        let username = request.username.trim();
        let email = request.email.trim();

        if username.is_empty() {
            return Err(ApiError::validation("username", "Username is required"));
        }
        if !is_valid_email(email) {
            return Err(ApiError::validation("email", "Invalid email address"));
        }
        if request.password.is_empty() {
            return Err(ApiError::validation("password", "Password is required"));
        }

        let client = pool.get().await?;

        let taken: bool = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)
                     OR EXISTS(SELECT 1 FROM artisans WHERE email = $1)",
                &[&email],
            )
            .await?
            .get(0);
        if taken {
            return Err(ApiError::validation("email", "Email already registered"));
        }

        let password_hash = hash_password(&request.password).await?;

        match request.user_type {
            UserType::Artisan => {
                let user_id = Uuid::new_v4().to_string();
                let shop_name = format!("{username}'s Shop");
                client
                    .execute(
                        "INSERT INTO artisans (user_id, name, email, password_hash, shop_name, skills)
                         VALUES ($1, $2, $3, $4, $5, '{}')",
                        &[&user_id, &username, &email, &password_hash, &shop_name],
                    )
                    .await?;
            }
            UserType::Customer => {
                client
                    .execute(
                        "INSERT INTO users (username, email, password_hash, user_type)
                         VALUES ($1, $2, $3, $4)",
                        &[&username, &email, &password_hash, &UserType::Customer.as_str()],
                    )
                    .await?;
            }
        }

        info!("Account created");
        Ok(StatusResponse::success("User created successfully"))
    }

    #[instrument(skip(self, pool, request), fields(email = %request.email))]
    pub async fn login(&self, pool: &DbPool, request: LoginRequest) -> Result<TokenResponse> {
        let email = request.email.trim();
        let client = pool.get().await?;

        let customer = client
            .query_opt(
                "SELECT id, password_hash, user_type FROM users WHERE email = $1",
                &[&email],
            )
            .await?;

        let (subject, stored_hash, user_type) = if let Some(row) = customer {
            let id: Uuid = row.get("id");
            let hash: String = row.get("password_hash");
            (id.to_string(), Some(hash), UserType::from_db(row.get("user_type")))
        } else {
            let row = client
                .query_opt(
                    "SELECT user_id, password_hash FROM artisans WHERE email = $1",
                    &[&email],
                )
                .await?
                .ok_or_else(invalid_credentials)?;
            let user_id: String = row.get("user_id");
            let hash: Option<String> = row.get("password_hash");
            (user_id, hash, UserType::Artisan)
        };

        let stored_hash = stored_hash.ok_or_else(invalid_credentials)?;
        if !verify_password(&request.password, &stored_hash).await? {
            return Err(invalid_credentials());
        }

        let access_token = self.issue_token(&subject, user_type)?;
        info!(user_id = %subject, "Login succeeded");

        Ok(TokenResponse {
            access_token,
            token_type: "bearer".to_owned(),
            user_id: subject,
            user_type,
        })
    }

    pub async fn current_user(&self, pool: &DbPool, claims: &Claims) -> Result<AccountProfile> {
        let client = pool.get().await?;

        match claims.user_type {
            UserType::Artisan => {
                let query = format!("SELECT {ARTISAN_COLUMNS} FROM artisans WHERE user_id = $1");
                let row = client
                    .query_opt(&query, &[&claims.sub])
                    .await?
                    .ok_or_else(|| ApiError::not_found("User", &claims.sub))?;
                Ok(AccountProfile::Artisan(map_artisan_row(&row)))
            }
            UserType::Customer => {
                let id = Uuid::parse_str(&claims.sub)
                    .map_err(|_| ApiError::Unauthorized("Invalid token payload".to_owned()))?;
                let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
                let row = client
                    .query_opt(&query, &[&id])
                    .await?
                    .ok_or_else(|| ApiError::not_found("User", &claims.sub))?;
                Ok(AccountProfile::Customer(map_user_row(&row)))
            }
        }
    }
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid credentials".to_owned())
}

/// bcrypt is CPU-bound, so both directions run on the blocking pool.
pub async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await?
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {e}")))
}

pub async fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    let outcome = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await?;
    // A malformed stored hash can never match.
    Ok(outcome.unwrap_or(false))
}

pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(ttl_minutes: i64) -> AuthService {
        AuthService::new(&Config {
            secret_key: "test-secret".into(),
            access_token_expire_minutes: ttl_minutes,
            ..Config::default()
        })
    }

    #[test]
    fn issued_tokens_round_trip_their_claims() {
        let auth = service(10);
        let token = auth.issue_token("artisan-uid", UserType::Artisan).unwrap();
        let claims = auth.verify_token(&token).unwrap();

        assert_eq!(claims.sub, "artisan-uid");
        assert_eq!(claims.user_type, UserType::Artisan);
        assert_eq!(claims.exp - claims.iat, 600);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        // Past the default 60 second leeway.
        let auth = service(-5);
        let token = auth.issue_token("someone", UserType::Customer).unwrap();
        assert!(matches!(auth.verify_token(&token), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let token = service(10).issue_token("someone", UserType::Customer).unwrap();
        let other = AuthService::new(&Config {
            secret_key: "another-secret".into(),
            access_token_expire_minutes: 10,
            ..Config::default()
        });
        assert!(other.verify_token(&token).is_err());
        assert!(other.verify_token("not.a.jwt").is_err());
    }

    #[tokio::test]
    async fn bcrypt_hashes_verify_only_the_original_password() {
        let hash = hash_password("s3cret!").await.unwrap();
        assert_ne!(hash, "s3cret!");
        assert!(verify_password("s3cret!", &hash).await.unwrap());
        assert!(!verify_password("wrong", &hash).await.unwrap());
        assert!(!verify_password("s3cret!", "not-a-bcrypt-hash").await.unwrap());
    }

    #[test]
    fn email_syntax_check() {
        assert!(is_valid_email("meera@crafts.in"));
        assert!(is_valid_email("a.b+c@mail.example.com"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@crafts.in"));
        assert!(!is_valid_email("meera@localhost"));
        assert!(!is_valid_email("meera@crafts."));
        assert!(!is_valid_email("meera @crafts.in"));
        assert!(!is_valid_email("a@b@c.in"));
    }
}
