use crate::auth_utils::AuthenticatedUser;
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::UserSummary;
use crate::schema::users;
use actix_web::{get, web, HttpResponse};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

// 400 avec les emp_ids qui ne correspondent à aucun employé actif
pub(crate) async fn ensure_employees_exist(
    conn: &mut AsyncPgConnection,
    emp_ids: &[String],
) -> Result<(), ServiceError> {
    if emp_ids.is_empty() {
        return Ok(());
    }

    let known = users::table
        .filter(users::emp_id.eq_any(emp_ids.to_vec()))
        .filter(users::is_active.eq(true))
        .select(users::emp_id)
        .load::<String>(conn)
        .await?;

    let unknown: Vec<&str> = emp_ids
        .iter()
        .filter(|emp| !known.contains(emp))
        .map(|emp| emp.as_str())
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::BadRequest(format!(
            "Unknown employee id(s): {}",
            unknown.join(", ")
        )))
    }
}

pub(crate) async fn summaries_for(
    conn: &mut AsyncPgConnection,
    emp_ids: &[String],
) -> Result<Vec<UserSummary>, ServiceError> {
    if emp_ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(users::table
        .filter(users::emp_id.eq_any(emp_ids.to_vec()))
        .order(users::name.asc())
        .select((users::emp_id, users::name, users::role, users::department))
        .load::<UserSummary>(conn)
        .await?)
}

#[get("")]
pub async fn list_users_handler(
    pool: web::Data<DbPool>,
    _authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;

    let directory = users::table
        .filter(users::is_active.eq(true))
        .order((users::department.asc(), users::name.asc()))
        .select((users::emp_id, users::name, users::role, users::department))
        .load::<UserSummary>(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(directory))
}

#[get("/department/{department_path}")]
pub async fn list_department_users_handler(
    pool: web::Data<DbPool>,
    _authenticated_user: AuthenticatedUser,
    department_path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let department = department_path.into_inner();
    let mut conn = pool.get().await?;

    // Département inconnu : liste vide
    let members = users::table
        .filter(users::department.eq(&department))
        .filter(users::is_active.eq(true))
        .order(users::name.asc())
        .select((users::emp_id, users::name, users::role, users::department))
        .load::<UserSummary>(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(members))
}

#[get("/{emp_id_path}")]
pub async fn get_user_handler(
    pool: web::Data<DbPool>,
    _authenticated_user: AuthenticatedUser,
    emp_id_path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let emp = emp_id_path.into_inner();
    let mut conn = pool.get().await?;

    let summary = users::table
        .filter(users::emp_id.eq(&emp))
        .select((users::emp_id, users::name, users::role, users::department))
        .first::<UserSummary>(&mut conn)
        .await
        .optional()?;

    match summary {
        Some(summary) => Ok(HttpResponse::Ok().json(summary)),
        None => Err(ServiceError::NotFound(format!(
            "Employee with emp_id {} not found",
            emp
        ))),
    }
}
