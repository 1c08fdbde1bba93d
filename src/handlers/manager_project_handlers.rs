use crate::analytics::{self, EmployeeWorkload, ProjectProgress};
use crate::auth_utils::AuthenticatedUser;
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::handlers::project_handlers::load_project;
use crate::models::{Project, Role, Task, User};
use crate::schema::{projects, tasks, users};
use actix_web::{get, web, HttpResponse};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

const MANAGER_ROLES: &[Role] = &[Role::Manager, Role::Director];

#[derive(Serialize, Debug)]
pub struct ManagedProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub department_members: Vec<String>,
    pub progress: ProjectProgress,
}

#[derive(Serialize, Debug)]
pub struct ManagedProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub progress: ProjectProgress,
    pub tasks: Vec<Task>,
    pub member_workloads: Vec<EmployeeWorkload>,
}

// Membres du projet issus du département, dans l'ordre du projet
pub fn members_from(project: &Project, department_emp_ids: &[String]) -> Vec<String> {
    project
        .members
        .iter()
        .filter(|m| department_emp_ids.contains(m))
        .cloned()
        .collect()
}

async fn department_emp_ids(
    conn: &mut AsyncPgConnection,
    department: &str,
) -> Result<Vec<String>, ServiceError> {
    Ok(users::table
        .filter(users::department.eq(department))
        .filter(users::is_active.eq(true))
        .select(users::emp_id)
        .load::<String>(conn)
        .await?)
}

#[get("")]
pub async fn list_managed_projects_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, ServiceError> {
    authenticated_user.require_role(MANAGER_ROLES)?;
    let mut conn = pool.get().await?;

    let team = department_emp_ids(&mut conn, &authenticated_user.department).await?;
    if team.is_empty() {
        return Ok(HttpResponse::Ok().json(Vec::<ManagedProjectSummary>::new()));
    }

    let project_list = projects::table
        .filter(projects::members.overlaps_with(team.clone()))
        .order(projects::created_at.desc())
        .select(Project::as_select())
        .load::<Project>(&mut conn)
        .await?;

    let project_ids: Vec<Uuid> = project_list.iter().map(|p| p.id).collect();
    let mut tasks_by_project: HashMap<Uuid, Vec<Task>> = HashMap::new();
    if !project_ids.is_empty() {
        let project_tasks = tasks::table
            .filter(tasks::project_id.eq_any(project_ids))
            .select(Task::as_select())
            .load::<Task>(&mut conn)
            .await?;
        for task in project_tasks {
            if let Some(project_id) = task.project_id {
                tasks_by_project.entry(project_id).or_default().push(task);
            }
        }
    }

    let today = Utc::now().date_naive();
    let summaries: Vec<ManagedProjectSummary> = project_list
        .into_iter()
        .map(|project| {
            let progress = analytics::project_progress(
                tasks_by_project.get(&project.id).map(Vec::as_slice).unwrap_or(&[]),
                today,
            );
            ManagedProjectSummary {
                department_members: members_from(&project, &team),
                project,
                progress,
            }
        })
        .collect();

    Ok(HttpResponse::Ok().json(summaries))
}

#[get("/{project_id_path}")]
pub async fn get_managed_project_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    project_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    authenticated_user.require_role(MANAGER_ROLES)?;
    let project_uuid = project_id_path.into_inner();
    let mut conn = pool.get().await?;

    let project = load_project(&mut conn, project_uuid).await?;
    if authenticated_user.role != Role::Director {
        let team = department_emp_ids(&mut conn, &authenticated_user.department).await?;
        if members_from(&project, &team).is_empty() {
            return Err(ServiceError::NotFound(format!(
                "Project with id {} not found or not accessible",
                project_uuid
            )));
        }
    }

    let member_users = users::table
        .filter(users::emp_id.eq_any(project.members.clone()))
        .select(User::as_select())
        .load::<User>(&mut conn)
        .await?;
    let member_ids: Vec<Uuid> = member_users.iter().map(|u| u.id).collect();

    // Charge globale des membres, pas seulement sur ce projet
    let member_tasks = tasks::table
        .filter(
            tasks::owner_id
                .eq_any(member_ids)
                .or(tasks::collaborators.overlaps_with(project.members.clone())),
        )
        .select(Task::as_select())
        .load::<Task>(&mut conn)
        .await?;

    let today = Utc::now().date_naive();
    let project_tasks: Vec<Task> = member_tasks
        .iter()
        .filter(|t| t.project_id == Some(project.id))
        .cloned()
        .collect();

    Ok(HttpResponse::Ok().json(ManagedProjectDetail {
        progress: analytics::project_progress(&project_tasks, today),
        member_workloads: analytics::employee_workloads(&member_users, &member_tasks, today),
        tasks: project_tasks,
        project,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_utils::tests::{bearer_for, test_config, token_accounts};
    use crate::db::unconnected_pool;
    use actix_web::http::StatusCode;
    use actix_web::{test as actix_test, App};

    #[test]
    fn department_members_keep_project_order() {
        let project = Project {
            id: Uuid::new_v4(),
            title: "Audit".to_string(),
            description: None,
            owner_id: Uuid::new_v4(),
            members: vec!["E3".to_string(), "E1".to_string(), "S9".to_string()],
            status: "active".to_string(),
            department: None,
            due_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let team = vec!["E1".to_string(), "E2".to_string(), "E3".to_string()];
        assert_eq!(members_from(&project, &team), vec!["E3", "E1"]);
        assert!(members_from(&project, &[]).is_empty());
    }

    #[actix_web::test]
    async fn staff_cannot_open_manager_views() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(test_config()))
                .app_data(token_accounts())
                .app_data(web::Data::new(unconnected_pool()))
                .service(
                    web::scope("/manager-projects")
                        .service(list_managed_projects_handler)
                        .service(get_managed_project_handler),
                ),
        )
        .await;

        let detail_uri = format!("/manager-projects/{}", Uuid::new_v4());
        for uri in ["/manager-projects", detail_uri.as_str()] {
            let req = actix_test::TestRequest::get()
                .uri(uri)
                .insert_header(("Authorization", bearer_for("E1", Role::Staff, "IT")))
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "uri {}", uri);
        }
    }
}
