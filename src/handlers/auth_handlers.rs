use crate::auth_utils::{hash_password, issue_token, verify_password, AuthenticatedUser};
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::{ChangePasswordPayload, LoginPayload, UpdateUserChangeset, User, UserProfile};
use crate::schema::users;
use actix_web::{get, post, put, web, HttpResponse};
use chrono::{DateTime, TimeZone, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Serialize, Debug)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

fn invalid_credentials() -> ServiceError {
    ServiceError::Unauthorized("Invalid email or password".to_string())
}

pub fn validate_new_password(current: &str, new_password: &str) -> Result<(), ServiceError> {
    if new_password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::BadRequest(format!(
            "new_password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        )));
    }
    if new_password == current {
        return Err(ServiceError::BadRequest(
            "new_password must differ from the current password".to_string(),
        ));
    }
    Ok(())
}

fn login_response(user: User, config: &AppConfig) -> Result<LoginResponse, ServiceError> {
    let (token, exp) = issue_token(&user, config)?;
    let expires_at = Utc
        .timestamp_opt(exp, 0)
        .single()
        .ok_or_else(|| ServiceError::InternalServerError("Invalid token expiry".to_string()))?;

    Ok(LoginResponse {
        token,
        expires_at,
        user: UserProfile::from(user),
    })
}

async fn load_active_user(conn: &mut AsyncPgConnection, user_id: Uuid) -> Result<User, ServiceError> {
    let user = users::table
        .filter(users::id.eq(user_id))
        .select(User::as_select())
        .first::<User>(conn)
        .await
        .optional()?;

    match user {
        Some(user) if user.is_active => Ok(user),
        // Compte supprimé ou désactivé depuis l'émission du token
        _ => Err(ServiceError::Unauthorized(
            "Account is no longer active".to_string(),
        )),
    }
}

#[post("/login")]
pub async fn login_handler(
    pool: web::Data<DbPool>,
    config: web::Data<AppConfig>,
    payload: web::Json<LoginPayload>,
) -> Result<HttpResponse, ServiceError> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || payload.password.is_empty() {
        return Err(ServiceError::BadRequest(
            "email and password are required".to_string(),
        ));
    }

    let mut conn = pool.get().await?;
    let user = users::table
        .filter(users::email.eq(&email))
        .select(User::as_select())
        .first::<User>(&mut conn)
        .await
        .optional()?;

    let user = match user {
        Some(user) if verify_password(&payload.password, &user.password_hash) => user,
        _ => {
            log::warn!("Failed login attempt for {}", email);
            return Err(invalid_credentials());
        }
    };
    if !user.is_active {
        log::warn!("Login refused for deactivated account {}", user.emp_id);
        return Err(invalid_credentials());
    }

    log::info!("User {} logged in", user.emp_id);
    Ok(HttpResponse::Ok().json(login_response(user, &config)?))
}

#[get("/me")]
pub async fn me_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let user = load_active_user(&mut conn, authenticated_user.id).await?;
    Ok(HttpResponse::Ok().json(UserProfile::from(user)))
}

#[post("/refresh")]
pub async fn refresh_handler(
    pool: web::Data<DbPool>,
    config: web::Data<AppConfig>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    // Relire l'utilisateur : le rôle ou le département a pu changer
    let user = load_active_user(&mut conn, authenticated_user.id).await?;
    Ok(HttpResponse::Ok().json(login_response(user, &config)?))
}

#[post("/logout")]
pub async fn logout_handler(authenticated_user: AuthenticatedUser) -> HttpResponse {
    log::info!("User {} logged out", authenticated_user.emp_id);
    HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Logged out"
    }))
}

#[put("/password")]
pub async fn change_password_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    payload: web::Json<ChangePasswordPayload>,
) -> Result<HttpResponse, ServiceError> {
    validate_new_password(&payload.current_password, &payload.new_password)?;

    let mut conn = pool.get().await?;
    let user = load_active_user(&mut conn, authenticated_user.id).await?;
    if !verify_password(&payload.current_password, &user.password_hash) {
        return Err(ServiceError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }

    let new_hash = hash_password(&payload.new_password)?;
    diesel::update(users::table.filter(users::id.eq(user.id)))
        .set(&UpdateUserChangeset {
            password_hash: Some(new_hash),
            updated_at: Some(Utc::now()),
            ..Default::default()
        })
        .execute(&mut conn)
        .await?;

    log::info!("User {} changed their password", user.emp_id);
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Password updated"
    })))
}
