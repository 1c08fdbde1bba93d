use crate::config::AppConfig;
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::{Role, User};
use crate::schema::users;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: Uuid,
    pub emp_id: String,
    pub role: Role,
    pub department: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub emp_id: String,
    pub role: Role,
    pub department: String,
}

impl AuthenticatedUser {
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ServiceError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            log::warn!(
                "User {} with role {} denied (requires one of {:?})",
                self.emp_id,
                self.role,
                allowed
            );
            Err(ServiceError::Forbidden(format!(
                "Role {} is not allowed to perform this action",
                self.role
            )))
        }
    }

    pub fn is_org_wide(&self) -> bool {
        matches!(self.role, Role::Hr | Role::Director)
    }

    // Un manager voit tout son département, HR et direction voient tout.
    pub fn oversees_department(&self, department: &str) -> bool {
        self.is_org_wide() || (self.role == Role::Manager && self.department == department)
    }
}

// Rôle, département et statut viennent du compte stocké, pas des claims
pub trait AccountStore: Send + Sync {
    fn find_account<'a>(
        &'a self,
        claims: &'a Claims,
    ) -> LocalBoxFuture<'a, Result<Option<User>, ServiceError>>;
}

impl AccountStore for DbPool {
    fn find_account<'a>(
        &'a self,
        claims: &'a Claims,
    ) -> LocalBoxFuture<'a, Result<Option<User>, ServiceError>> {
        Box::pin(async move {
            let mut conn = self.get().await?;
            let user = users::table
                .filter(users::id.eq(claims.sub))
                .select(User::as_select())
                .first::<User>(&mut conn)
                .await
                .optional()?;
            Ok(user)
        })
    }
}

pub fn account_store(pool: DbPool) -> web::Data<dyn AccountStore> {
    web::Data::from(Arc::new(pool) as Arc<dyn AccountStore>)
}

// Un token valide ne suffit pas : le compte doit encore exister et être actif.
pub fn resolve_account(claims: &Claims, account: Option<User>) -> Result<AuthenticatedUser, ServiceError> {
    let user = match account {
        Some(user) if user.is_active => user,
        Some(user) => {
            log::warn!("Token rejected for deactivated account {}", user.emp_id);
            return Err(ServiceError::Unauthorized(
                "Account is no longer active".to_string(),
            ));
        }
        None => {
            log::warn!("Token rejected for unknown account {}", claims.emp_id);
            return Err(ServiceError::Unauthorized(
                "Account is no longer active".to_string(),
            ));
        }
    };

    let role = user
        .role
        .parse::<Role>()
        .map_err(ServiceError::InternalServerError)?;
    if role != claims.role || user.department != claims.department {
        log::debug!(
            "Token claims for {} are stale, using stored role {} in {}",
            user.emp_id,
            role,
            user.department
        );
    }

    Ok(AuthenticatedUser {
        id: user.id,
        emp_id: user.emp_id,
        role,
        department: user.department,
    })
}

fn bearer_claims(req: &HttpRequest) -> Result<Claims, ServiceError> {
    let config = match req.app_data::<web::Data<AppConfig>>() {
        Some(config) => config,
        None => {
            log::error!("AppConfig is not registered as app data.");
            return Err(ServiceError::InternalServerError(
                "Authentication is not configured.".to_string(),
            ));
        }
    };

    let header_value = match req.headers().get(actix_web::http::header::AUTHORIZATION) {
        Some(value) => value,
        None => {
            log::debug!("Authorization header was NOT found on {}", req.path());
            return Err(ServiceError::Unauthorized(
                "Missing Authorization header. Authentication required.".to_string(),
            ));
        }
    };

    let header_str = match header_value.to_str() {
        Ok(value) => value,
        Err(_) => {
            log::warn!("Authorization header is not valid UTF-8.");
            return Err(ServiceError::Unauthorized(
                "Authorization header contains invalid characters.".to_string(),
            ));
        }
    };

    let token = match header_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => token.trim(),
        _ => {
            log::warn!("Authorization header is not a bearer token.");
            return Err(ServiceError::Unauthorized(
                "Authorization header must use the Bearer scheme.".to_string(),
            ));
        }
    };

    decode_token(token, &config.jwt_secret)
}

impl FromRequest for AuthenticatedUser {
    type Error = ServiceError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claims = bearer_claims(req);
        let store = req.app_data::<web::Data<dyn AccountStore>>().cloned();

        Box::pin(async move {
            let claims = claims?;
            let store = store.ok_or_else(|| {
                log::error!("AccountStore is not registered as app data.");
                ServiceError::InternalServerError("Authentication is not configured.".to_string())
            })?;

            let account = store.find_account(&claims).await?;
            let user = resolve_account(&claims, account)?;
            log::debug!("Authenticated {} ({})", user.emp_id, user.role);
            Ok(user)
        })
    }
}

pub fn issue_token(user: &User, config: &AppConfig) -> Result<(String, i64), ServiceError> {
    let role = user
        .role
        .parse::<Role>()
        .map_err(ServiceError::InternalServerError)?;
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user.id,
        emp_id: user.emp_id.clone(),
        role,
        department: user.department.clone(),
        iat: now,
        exp: now + config.jwt_expiry_hours * 3600,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        log::error!("Failed to sign token for {}: {}", user.emp_id, e);
        ServiceError::InternalServerError("Failed to issue token".to_string())
    })?;

    Ok((token, claims.exp))
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, ServiceError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["sub", "exp"]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        log::warn!("Rejected bearer token: {}", e);
        match e.kind() {
            ErrorKind::ExpiredSignature => {
                ServiceError::Unauthorized("Token expired".to_string())
            }
            ErrorKind::InvalidSignature => {
                ServiceError::Unauthorized("Invalid token signature".to_string())
            }
            _ => ServiceError::Unauthorized("Invalid token".to_string()),
        }
    })
}

pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            log::error!("Password hashing failed: {}", e);
            ServiceError::InternalServerError("Password hashing failed".to_string())
        })
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::error!("Stored password hash is malformed: {}", e);
            false
        }
    }
}
