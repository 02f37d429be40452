use std::future::{ready, Ready};
use std::sync::Arc;

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    exp: usize,
}

/// Authenticated viewer, extracted from the `Authorization: Bearer` header.
///
/// The session service issues the tokens; this side only verifies the
/// signature and reads the subject.
#[derive(Debug, Clone, Copy)]
pub struct Viewer {
    pub user_id: Uuid,
}

impl FromRequest for Viewer {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_viewer(req))
    }
}

fn extract_viewer(req: &HttpRequest) -> Result<Viewer, AppError> {
    let config = req
        .app_data::<web::Data<Arc<AppConfig>>>()
        .ok_or_else(|| AppError::Internal("app config not registered".to_string()))?;

    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("invalid authorization header".to_string()))?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.auth.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("invalid or expired token".to_string()))?;

    Ok(Viewer {
        user_id: data.claims.sub,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::test::TestRequest;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn test_config() -> web::Data<Arc<AppConfig>> {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = SECRET.to_string();
        web::Data::new(Arc::new(config))
    }

    fn token_for(user_id: Uuid) -> String {
        let claims = Claims {
            sub: user_id,
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[actix_web::test]
    async fn accepts_a_valid_bearer_token() {
        let user_id = Uuid::new_v4();
        let req = TestRequest::default()
            .app_data(test_config())
            .insert_header(("Authorization", format!("Bearer {}", token_for(user_id))))
            .to_http_request();

        let viewer = extract_viewer(&req).unwrap();
        assert_eq!(viewer.user_id, user_id);
    }

    #[actix_web::test]
    async fn rejects_a_missing_header() {
        let req = TestRequest::default().app_data(test_config()).to_http_request();
        assert!(matches!(
            extract_viewer(&req),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[actix_web::test]
    async fn rejects_a_non_bearer_header() {
        let req = TestRequest::default()
            .app_data(test_config())
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert!(matches!(
            extract_viewer(&req),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[actix_web::test]
    async fn rejects_a_token_signed_with_another_secret() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"other-secret"),
        )
        .unwrap();

        let req = TestRequest::default()
            .app_data(test_config())
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_http_request();
        assert!(matches!(
            extract_viewer(&req),
            Err(AppError::Unauthorized(_))
        ));
    }
}
