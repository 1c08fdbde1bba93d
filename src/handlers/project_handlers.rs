use crate::analytics::{self, ProjectProgress};
use crate::auth_utils::AuthenticatedUser;
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::handlers::user_handlers::{ensure_employees_exist, summaries_for};
use crate::models::{
    CreateProjectPayload, NewProject, Project, ProjectMembersPayload, ProjectStatus, Role, Task,
    UpdateProjectChangeset, UpdateProjectPayload, UserSummary,
};
use crate::notifier;
use crate::schema::{projects, tasks, users};
use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Serialize, Debug)]
pub struct ProjectDetailResponse {
    #[serde(flatten)]
    pub project: Project,
    pub member_details: Vec<UserSummary>,
    pub tasks: Vec<Task>,
    pub progress: ProjectProgress,
}

pub fn is_project_member(user: &AuthenticatedUser, project: &Project) -> bool {
    project.owner_id == user.id || project.members.contains(&user.emp_id)
}

pub fn can_manage_project(user: &AuthenticatedUser, project: &Project) -> bool {
    project.owner_id == user.id || matches!(user.role, Role::Manager | Role::Director)
}

fn parse_project_status(raw: &str) -> Result<ProjectStatus, ServiceError> {
    raw.parse::<ProjectStatus>().map_err(ServiceError::BadRequest)
}

pub(crate) async fn load_project(
    conn: &mut AsyncPgConnection,
    project_uuid: Uuid,
) -> Result<Project, ServiceError> {
    projects::table
        .filter(projects::id.eq(project_uuid))
        .select(Project::as_select())
        .first::<Project>(conn)
        .await
        .optional()?
        .ok_or_else(|| ServiceError::NotFound(format!("Project with id {} not found", project_uuid)))
}

async fn load_visible_project(
    conn: &mut AsyncPgConnection,
    user: &AuthenticatedUser,
    project_uuid: Uuid,
) -> Result<Project, ServiceError> {
    let project = load_project(conn, project_uuid).await?;
    if is_project_member(user, &project) || user.role != Role::Staff {
        Ok(project)
    } else {
        Err(ServiceError::NotFound(format!(
            "Project with id {} not found or not accessible",
            project_uuid
        )))
    }
}

async fn load_manageable_project(
    conn: &mut AsyncPgConnection,
    user: &AuthenticatedUser,
    project_uuid: Uuid,
) -> Result<Project, ServiceError> {
    let project = load_visible_project(conn, user, project_uuid).await?;
    if can_manage_project(user, &project) {
        Ok(project)
    } else {
        Err(ServiceError::Forbidden(format!(
            "You are not allowed to manage project {}",
            project_uuid
        )))
    }
}

#[post("")]
pub async fn create_project_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    payload: web::Json<CreateProjectPayload>,
) -> Result<HttpResponse, ServiceError> {
    let payload = payload.into_inner();
    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(ServiceError::BadRequest("title cannot be empty".to_string()));
    }
    let project_status = match payload.status.as_deref() {
        Some(raw) => parse_project_status(raw)?,
        None => ProjectStatus::Active,
    };

    // Le créateur est toujours membre
    let mut members = vec![authenticated_user.emp_id.clone()];
    let invited = notifier::newly_added(&members, &payload.members);
    members.extend(invited);

    let mut conn = pool.get().await?;
    ensure_employees_exist(&mut conn, &members[1..]).await?;

    let new_project_data = NewProject {
        title,
        description: payload.description,
        owner_id: authenticated_user.id,
        members,
        status: project_status.as_str().to_string(),
        department: payload
            .department
            .or_else(|| Some(authenticated_user.department.clone())),
        due_date: payload.due_date,
    };

    let project = diesel::insert_into(projects::table)
        .values(&new_project_data)
        .get_result::<Project>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    let notifications = notifier::project_added(&project, &authenticated_user.emp_id, &project.members);
    notifier::insert_notifications(&mut conn, &notifications).await?;

    log::info!("User {} created project {}", authenticated_user.emp_id, project.id);
    Ok(HttpResponse::Created().json(project))
}

#[get("")]
pub async fn list_projects_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;

    let project_list = projects::table
        .filter(
            projects::owner_id
                .eq(authenticated_user.id)
                .or(projects::members.contains(vec![authenticated_user.emp_id.clone()])),
        )
        .order(projects::created_at.desc())
        .select(Project::as_select())
        .load::<Project>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    Ok(HttpResponse::Ok().json(project_list))
}

#[get("/{project_id_path}")]
pub async fn get_project_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    project_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let project = load_visible_project(&mut conn, &authenticated_user, project_id_path.into_inner()).await?;

    let project_tasks = tasks::table
        .filter(tasks::project_id.eq(project.id))
        .order((tasks::due_date.asc(), tasks::priority.desc()))
        .select(Task::as_select())
        .load::<Task>(&mut conn)
        .await?;
    let member_details = summaries_for(&mut conn, &project.members).await?;
    let progress = analytics::project_progress(&project_tasks, Utc::now().date_naive());

    Ok(HttpResponse::Ok().json(ProjectDetailResponse {
        project,
        member_details,
        tasks: project_tasks,
        progress,
    }))
}

#[put("/{project_id_path}")]
pub async fn update_project_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    project_id_path: web::Path<Uuid>,
    payload: web::Json<UpdateProjectPayload>,
) -> Result<HttpResponse, ServiceError> {
    let project_to_update_id = project_id_path.into_inner();
    let payload = payload.into_inner();

    let title = match payload.title {
        Some(raw) if raw.trim().is_empty() => {
            return Err(ServiceError::BadRequest("title cannot be empty".to_string()))
        }
        Some(raw) => Some(raw.trim().to_string()),
        None => None,
    };
    let project_status = match payload.status.as_deref() {
        Some(raw) => Some(parse_project_status(raw)?.as_str().to_string()),
        None => None,
    };

    let project_changes = UpdateProjectChangeset {
        title,
        description: payload.description,
        status: project_status,
        department: payload.department,
        due_date: payload.due_date,
        updated_at: Some(Utc::now()),
        ..Default::default()
    };

    let mut conn = pool.get().await?;
    load_manageable_project(&mut conn, &authenticated_user, project_to_update_id).await?;

    let updated_project = diesel::update(projects::table.filter(projects::id.eq(project_to_update_id)))
        .set(&project_changes)
        .get_result::<Project>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    Ok(HttpResponse::Ok().json(updated_project))
}

#[delete("/{project_id_path}")]
pub async fn delete_project_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    project_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let project_to_delete_id = project_id_path.into_inner();

    let mut conn = pool.get().await?;
    let project = load_visible_project(&mut conn, &authenticated_user, project_to_delete_id).await?;
    if project.owner_id != authenticated_user.id && authenticated_user.role != Role::Director {
        return Err(ServiceError::Forbidden(
            "Only the project owner can delete a project".to_string(),
        ));
    }

    // Les tâches restent, leur project_id passe à NULL (ON DELETE SET NULL)
    let num_deleted = diesel::delete(projects::table.filter(projects::id.eq(project_to_delete_id)))
        .execute(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    if num_deleted > 0 {
        Ok(HttpResponse::Ok().json(json!({
            "status": "success",
            "message": format!("Project with id {} deleted successfully", project_to_delete_id)
        })))
    } else {
        Err(ServiceError::NotFound(format!(
            "Project with id {} not found",
            project_to_delete_id
        )))
    }
}

#[post("/{project_id_path}/members")]
pub async fn add_project_members_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    project_id_path: web::Path<Uuid>,
    payload: web::Json<ProjectMembersPayload>,
) -> Result<HttpResponse, ServiceError> {
    let project_uuid = project_id_path.into_inner();
    let requested: Vec<String> = payload
        .emp_ids
        .iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();

    let mut conn = pool.get().await?;
    let project = load_manageable_project(&mut conn, &authenticated_user, project_uuid).await?;

    let added = notifier::newly_added(&project.members, &requested);
    if added.is_empty() {
        return Ok(HttpResponse::Ok().json(project));
    }
    ensure_employees_exist(&mut conn, &added).await?;

    let mut members = project.members.clone();
    members.extend(added.iter().cloned());

    let updated_project = diesel::update(projects::table.filter(projects::id.eq(project_uuid)))
        .set(&UpdateProjectChangeset {
            members: Some(members),
            updated_at: Some(Utc::now()),
            ..Default::default()
        })
        .get_result::<Project>(&mut conn)
        .await?;

    let notifications = notifier::project_added(&updated_project, &authenticated_user.emp_id, &added);
    notifier::insert_notifications(&mut conn, &notifications).await?;

    log::info!(
        "User {} added {:?} to project {}",
        authenticated_user.emp_id,
        added,
        project_uuid
    );
    Ok(HttpResponse::Ok().json(updated_project))
}

#[delete("/{project_id_path}/members/{emp_id_path}")]
pub async fn remove_project_member_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    path_params: web::Path<(Uuid, String)>,
) -> Result<HttpResponse, ServiceError> {
    let (project_uuid, emp) = path_params.into_inner();

    let mut conn = pool.get().await?;
    let project = load_visible_project(&mut conn, &authenticated_user, project_uuid).await?;

    // Un membre peut se retirer lui-même
    if emp != authenticated_user.emp_id && !can_manage_project(&authenticated_user, &project) {
        return Err(ServiceError::Forbidden(format!(
            "You are not allowed to manage project {}",
            project_uuid
        )));
    }

    let owner_emp_id = users::table
        .filter(users::id.eq(project.owner_id))
        .select(users::emp_id)
        .first::<String>(&mut conn)
        .await?;
    if owner_emp_id == emp {
        return Err(ServiceError::BadRequest(
            "The project owner cannot be removed".to_string(),
        ));
    }
    if !project.members.contains(&emp) {
        return Err(ServiceError::NotFound(format!(
            "Employee {} is not a member of project {}",
            emp, project_uuid
        )));
    }

    let members: Vec<String> = project.members.into_iter().filter(|m| *m != emp).collect();
    let updated_project = diesel::update(projects::table.filter(projects::id.eq(project_uuid)))
        .set(&UpdateProjectChangeset {
            members: Some(members),
            updated_at: Some(Utc::now()),
            ..Default::default()
        })
        .get_result::<Project>(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(updated_project))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_owned_by(owner: Uuid, members: &[&str]) -> Project {
        Project {
            id: Uuid::new_v4(),
            title: "Migration".to_string(),
            description: None,
            owner_id: owner,
            members: members.iter().map(|m| m.to_string()).collect(),
            status: "active".to_string(),
            department: Some("IT".to_string()),
            due_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn caller(role: Role, emp_id: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            id: Uuid::new_v4(),
            emp_id: emp_id.to_string(),
            role,
            department: "IT".to_string(),
        }
    }

    #[test]
    fn membership_and_management_rules() {
        let owner = caller(Role::Staff, "E1");
        let project = project_owned_by(owner.id, &["E1", "E2"]);

        assert!(is_project_member(&owner, &project));
        assert!(is_project_member(&caller(Role::Staff, "E2"), &project));
        assert!(!is_project_member(&caller(Role::Staff, "E3"), &project));

        assert!(can_manage_project(&owner, &project));
        assert!(!can_manage_project(&caller(Role::Staff, "E2"), &project));
        assert!(can_manage_project(&caller(Role::Manager, "M1"), &project));
        assert!(!can_manage_project(&caller(Role::Hr, "H1"), &project));
    }

    #[test]
    fn detail_response_flattens_project_fields() {
        let project = project_owned_by(Uuid::new_v4(), &["E1"]);
        let detail = ProjectDetailResponse {
            project: project.clone(),
            member_details: vec![],
            tasks: vec![],
            progress: analytics::project_progress(&[], Utc::now().date_naive()),
        };
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["title"], "Migration");
        assert_eq!(value["progress"]["completion_percentage"], 0.0);
    }
}
