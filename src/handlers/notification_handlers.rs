use crate::auth_utils::AuthenticatedUser;
use crate::db::DbPool;
use crate::deadline::{self, DeadlineCooldown};
use crate::error_handler::ServiceError;
use crate::models::Notification;
use crate::notifier;
use crate::schema::notifications;
use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Deserialize, Debug, Default)]
pub struct NotificationQueryParams {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}

#[derive(Deserialize, Debug, Default)]
pub struct DeadlineCheckParams {
    #[serde(default)]
    pub force: bool,
}

#[derive(Serialize, Debug)]
pub struct DeadlineCheckResponse {
    pub checked: bool,
    pub created: usize,
    pub unread_count: i64,
    pub next_check_at: DateTime<Utc>,
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

#[get("")]
pub async fn list_notifications_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    query_params: web::Query<NotificationQueryParams>,
) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;

    let mut query = notifications::table
        .filter(notifications::emp_id.eq(&authenticated_user.emp_id))
        .into_boxed();
    if query_params.unread_only {
        query = query.filter(notifications::read.eq(false));
    }

    let notification_list = query
        .order(notifications::created_at.desc())
        .limit(clamp_limit(query_params.limit))
        .select(Notification::as_select())
        .load::<Notification>(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(notification_list))
}

#[get("/unread-count")]
pub async fn unread_count_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let count = notifier::unread_count(&mut conn, &authenticated_user.emp_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "unread_count": count })))
}

// Doit être enregistré avant /{id}/read pour éviter toute ambiguïté
#[put("/read-all")]
pub async fn mark_all_read_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;

    let updated = diesel::update(
        notifications::table
            .filter(notifications::emp_id.eq(&authenticated_user.emp_id))
            .filter(notifications::read.eq(false)),
    )
    .set(notifications::read.eq(true))
    .execute(&mut conn)
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "updated": updated })))
}

#[put("/{notification_id_path}/read")]
pub async fn mark_read_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    notification_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let notification_id = notification_id_path.into_inner();
    let mut conn = pool.get().await?;

    // Filtrer sur emp_id : on ne révèle pas les notifications des autres
    let updated = diesel::update(
        notifications::table
            .filter(notifications::id.eq(notification_id))
            .filter(notifications::emp_id.eq(&authenticated_user.emp_id)),
    )
    .set(notifications::read.eq(true))
    .get_result::<Notification>(&mut conn)
    .await
    .optional()?;

    match updated {
        Some(notification) => Ok(HttpResponse::Ok().json(notification)),
        None => Err(ServiceError::NotFound(format!(
            "Notification with id {} not found",
            notification_id
        ))),
    }
}

#[delete("/{notification_id_path}")]
pub async fn delete_notification_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    notification_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let notification_id = notification_id_path.into_inner();
    let mut conn = pool.get().await?;

    let num_deleted = diesel::delete(
        notifications::table
            .filter(notifications::id.eq(notification_id))
            .filter(notifications::emp_id.eq(&authenticated_user.emp_id)),
    )
    .execute(&mut conn)
    .await?;

    if num_deleted > 0 {
        Ok(HttpResponse::Ok().json(json!({
            "status": "success",
            "message": format!("Notification with id {} deleted successfully", notification_id)
        })))
    } else {
        Err(ServiceError::NotFound(format!(
            "Notification with id {} not found",
            notification_id
        )))
    }
}

#[post("/check-deadlines")]
pub async fn check_deadlines_handler(
    pool: web::Data<DbPool>,
    cooldown: web::Data<DeadlineCooldown>,
    authenticated_user: AuthenticatedUser,
    query_params: web::Query<DeadlineCheckParams>,
) -> Result<HttpResponse, ServiceError> {
    let now = Utc::now();
    let mut conn = pool.get().await?;

    let (checked, created, next_check_at) = match cooldown
        .try_begin(&authenticated_user.emp_id, now, query_params.force)
        .await
    {
        Ok(slot) => {
            let checked = deadline::check_for_employee(
                &mut conn,
                authenticated_user.id,
                &authenticated_user.emp_id,
                now.date_naive(),
            )
            .await;
            match checked {
                Ok(created) => (true, created, slot.next_check_at),
                Err(e) => {
                    cooldown.release(&authenticated_user.emp_id, slot).await;
                    return Err(e);
                }
            }
        }
        Err(next_check_at) => {
            log::debug!(
                "Deadline check for {} skipped until {}",
                authenticated_user.emp_id,
                next_check_at
            );
            (false, 0, next_check_at)
        }
    };

    let unread_count = notifier::unread_count(&mut conn, &authenticated_user.emp_id).await?;

    Ok(HttpResponse::Ok().json(DeadlineCheckResponse {
        checked,
        created,
        unread_count,
        next_check_at,
    }))
}
