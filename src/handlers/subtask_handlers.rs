use crate::auth_utils::AuthenticatedUser;
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::handlers::task_handlers::{load_editable_task, load_visible_task};
use crate::models::{
    CreateSubtaskPayload, NewSubtask, Subtask, SubtaskStatus, UpdateSubtaskChangeset,
    UpdateSubtaskPayload,
};
use crate::schema::subtasks;
use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde_json::json;
use uuid::Uuid;

async fn load_subtask(conn: &mut AsyncPgConnection, subtask_id: Uuid) -> Result<Subtask, ServiceError> {
    subtasks::table
        .filter(subtasks::id.eq(subtask_id))
        .select(Subtask::as_select())
        .first::<Subtask>(conn)
        .await
        .optional()?
        .ok_or_else(|| ServiceError::NotFound(format!("Subtask with id {} not found", subtask_id)))
}

fn clean_title(raw: &str) -> Result<String, ServiceError> {
    let title = raw.trim();
    if title.is_empty() {
        Err(ServiceError::BadRequest("title cannot be empty".to_string()))
    } else {
        Ok(title.to_string())
    }
}

// === GET /subtasks/task/{task_id} ===
#[get("/task/{task_id_path}")]
pub async fn list_subtasks_for_task_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    task_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let parent_id = task_id_path.into_inner();
    let mut conn = pool.get().await?;
    load_visible_task(&mut conn, &authenticated_user, parent_id).await?;

    let subtask_list = subtasks::table
        .filter(subtasks::task_id.eq(parent_id))
        .order(subtasks::created_at.asc())
        .select(Subtask::as_select())
        .load::<Subtask>(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(subtask_list))
}

#[post("")]
pub async fn create_subtask_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    payload: web::Json<CreateSubtaskPayload>,
) -> Result<HttpResponse, ServiceError> {
    let title = clean_title(&payload.title)?;
    let mut conn = pool.get().await?;
    load_editable_task(&mut conn, &authenticated_user, payload.task_id).await?;

    let subtask = diesel::insert_into(subtasks::table)
        .values(&NewSubtask {
            task_id: payload.task_id,
            title,
            status: SubtaskStatus::Pending.as_str().to_string(),
        })
        .get_result::<Subtask>(&mut conn)
        .await?;

    Ok(HttpResponse::Created().json(subtask))
}

#[put("/{subtask_id_path}")]
pub async fn update_subtask_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    subtask_id_path: web::Path<Uuid>,
    payload: web::Json<UpdateSubtaskPayload>,
) -> Result<HttpResponse, ServiceError> {
    let subtask_id = subtask_id_path.into_inner();

    let changes = UpdateSubtaskChangeset {
        title: match &payload.title {
            Some(raw) => Some(clean_title(raw)?),
            None => None,
        },
        status: match &payload.status {
            Some(raw) => Some(
                raw.parse::<SubtaskStatus>()
                    .map_err(ServiceError::BadRequest)?
                    .as_str()
                    .to_string(),
            ),
            None => None,
        },
        updated_at: Some(Utc::now()),
    };

    let mut conn = pool.get().await?;
    let subtask = load_subtask(&mut conn, subtask_id).await?;
    load_editable_task(&mut conn, &authenticated_user, subtask.task_id).await?;

    let updated = diesel::update(subtasks::table.filter(subtasks::id.eq(subtask_id)))
        .set(&changes)
        .get_result::<Subtask>(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(updated))
}

#[put("/{subtask_id_path}/toggle")]
pub async fn toggle_subtask_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    subtask_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let subtask_id = subtask_id_path.into_inner();
    let mut conn = pool.get().await?;
    let subtask = load_subtask(&mut conn, subtask_id).await?;
    load_editable_task(&mut conn, &authenticated_user, subtask.task_id).await?;

    let next = if subtask.status == SubtaskStatus::Completed.as_str() {
        SubtaskStatus::Pending
    } else {
        SubtaskStatus::Completed
    };

    let updated = diesel::update(subtasks::table.filter(subtasks::id.eq(subtask_id)))
        .set(&UpdateSubtaskChangeset {
            status: Some(next.as_str().to_string()),
            updated_at: Some(Utc::now()),
            ..Default::default()
        })
        .get_result::<Subtask>(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(updated))
}

#[delete("/{subtask_id_path}")]
pub async fn delete_subtask_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    subtask_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let subtask_id = subtask_id_path.into_inner();
    let mut conn = pool.get().await?;
    let subtask = load_subtask(&mut conn, subtask_id).await?;
    load_editable_task(&mut conn, &authenticated_user, subtask.task_id).await?;

    diesel::delete(subtasks::table.filter(subtasks::id.eq(subtask_id)))
        .execute(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": format!("Subtask with id {} deleted successfully", subtask_id)
    })))
}
