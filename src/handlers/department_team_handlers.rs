use crate::auth_utils::AuthenticatedUser;
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::handlers::user_handlers::{ensure_employees_exist, summaries_for};
use crate::models::{
    CreateDepartmentTeamPayload, DepartmentFilter, DepartmentTeam, NewDepartmentTeam,
    UpdateDepartmentTeamChangeset, UpdateDepartmentTeamPayload, UserSummary,
};
use crate::schema::department_teams;
use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Serialize, Debug)]
pub struct DepartmentTeamDetail {
    #[serde(flatten)]
    pub team: DepartmentTeam,
    pub manager: Option<UserSummary>,
    pub members: Vec<UserSummary>,
}

fn ensure_can_manage(user: &AuthenticatedUser, department: &str) -> Result<(), ServiceError> {
    if user.oversees_department(department) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "You cannot manage teams of department {}",
            department
        )))
    }
}

// Dédoublonne en conservant l'ordre
fn clean_members(member_emp_ids: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for emp in member_emp_ids.iter().map(|m| m.trim()).filter(|m| !m.is_empty()) {
        if !cleaned.iter().any(|c| c == emp) {
            cleaned.push(emp.to_string());
        }
    }
    cleaned
}

fn clean_team_name(raw: &str) -> Result<String, ServiceError> {
    let name = raw.trim();
    if name.is_empty() {
        Err(ServiceError::BadRequest("team_name cannot be empty".to_string()))
    } else {
        Ok(name.to_string())
    }
}

async fn load_team(conn: &mut AsyncPgConnection, team_id: Uuid) -> Result<DepartmentTeam, ServiceError> {
    department_teams::table
        .filter(department_teams::id.eq(team_id))
        .select(DepartmentTeam::as_select())
        .first::<DepartmentTeam>(conn)
        .await
        .optional()?
        .ok_or_else(|| ServiceError::NotFound(format!("Team with id {} not found", team_id)))
}

async fn team_detail(
    conn: &mut AsyncPgConnection,
    team: DepartmentTeam,
) -> Result<DepartmentTeamDetail, ServiceError> {
    let members = summaries_for(conn, &team.member_emp_ids).await?;
    let manager = match &team.manager_emp_id {
        Some(manager_emp_id) => summaries_for(conn, std::slice::from_ref(manager_emp_id))
            .await?
            .into_iter()
            .next(),
        None => None,
    };
    Ok(DepartmentTeamDetail {
        team,
        manager,
        members,
    })
}

#[get("")]
pub async fn list_department_teams_handler(
    pool: web::Data<DbPool>,
    _authenticated_user: AuthenticatedUser,
    query_params: web::Query<DepartmentFilter>,
) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;

    let mut query = department_teams::table.into_boxed();
    if let Some(department) = &query_params.department {
        query = query.filter(department_teams::department.eq(department.clone()));
    }
    let teams = query
        .order((department_teams::department.asc(), department_teams::team_name.asc()))
        .select(DepartmentTeam::as_select())
        .load::<DepartmentTeam>(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(teams))
}

#[get("/{team_id_path}")]
pub async fn get_department_team_handler(
    pool: web::Data<DbPool>,
    _authenticated_user: AuthenticatedUser,
    team_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let team = load_team(&mut conn, team_id_path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(team_detail(&mut conn, team).await?))
}

#[post("")]
pub async fn create_department_team_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    payload: web::Json<CreateDepartmentTeamPayload>,
) -> Result<HttpResponse, ServiceError> {
    let payload = payload.into_inner();
    let department = payload.department.trim().to_string();
    if department.is_empty() {
        return Err(ServiceError::BadRequest("department cannot be empty".to_string()));
    }
    ensure_can_manage(&authenticated_user, &department)?;

    let new_team = NewDepartmentTeam {
        department,
        team_name: clean_team_name(&payload.team_name)?,
        manager_emp_id: payload.manager_emp_id.map(|m| m.trim().to_string()),
        member_emp_ids: clean_members(&payload.member_emp_ids),
    };

    let mut conn = pool.get().await?;
    ensure_employees_exist(&mut conn, &new_team.member_emp_ids).await?;
    if let Some(manager_emp_id) = &new_team.manager_emp_id {
        ensure_employees_exist(&mut conn, std::slice::from_ref(manager_emp_id)).await?;
    }

    // Doublon (department, team_name) : 409 via la contrainte d'unicité
    let team = diesel::insert_into(department_teams::table)
        .values(&new_team)
        .get_result::<DepartmentTeam>(&mut conn)
        .await?;

    log::info!(
        "{} created team {} in {}",
        authenticated_user.emp_id,
        team.team_name,
        team.department
    );
    Ok(HttpResponse::Created().json(team_detail(&mut conn, team).await?))
}

#[put("/{team_id_path}")]
pub async fn update_department_team_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    team_id_path: web::Path<Uuid>,
    payload: web::Json<UpdateDepartmentTeamPayload>,
) -> Result<HttpResponse, ServiceError> {
    let team_id = team_id_path.into_inner();
    let payload = payload.into_inner();

    let mut conn = pool.get().await?;
    let existing = load_team(&mut conn, team_id).await?;
    ensure_can_manage(&authenticated_user, &existing.department)?;

    let changes = UpdateDepartmentTeamChangeset {
        team_name: match &payload.team_name {
            Some(raw) => Some(clean_team_name(raw)?),
            None => None,
        },
        manager_emp_id: payload
            .manager_emp_id
            .map(|manager| manager.map(|m| m.trim().to_string())),
        member_emp_ids: payload.member_emp_ids.as_deref().map(clean_members),
        updated_at: Some(Utc::now()),
    };
    if let Some(members) = &changes.member_emp_ids {
        ensure_employees_exist(&mut conn, members).await?;
    }
    if let Some(Some(manager_emp_id)) = &changes.manager_emp_id {
        ensure_employees_exist(&mut conn, std::slice::from_ref(manager_emp_id)).await?;
    }

    let team = diesel::update(department_teams::table.filter(department_teams::id.eq(team_id)))
        .set(&changes)
        .get_result::<DepartmentTeam>(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(team_detail(&mut conn, team).await?))
}

#[delete("/{team_id_path}")]
pub async fn delete_department_team_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    team_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let team_id = team_id_path.into_inner();
    let mut conn = pool.get().await?;
    let existing = load_team(&mut conn, team_id).await?;
    ensure_can_manage(&authenticated_user, &existing.department)?;

    diesel::delete(department_teams::table.filter(department_teams::id.eq(team_id)))
        .execute(&mut conn)
        .await?;

    log::info!(
        "{} deleted team {} in {}",
        authenticated_user.emp_id,
        existing.team_name,
        existing.department
    );
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": format!("Team with id {} deleted successfully", team_id)
    })))
}
