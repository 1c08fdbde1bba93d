use crate::auth_utils::AuthenticatedUser;
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::handlers::user_handlers::ensure_employees_exist;
use crate::models::{
    CreateTaskPayload, DepartmentFilter, NewTask, PaginatedResponse, Project, Role, Subtask, Task,
    TaskApiResponse, TaskStatus, UpdateTaskChangeset, UpdateTaskPayload,
};
use crate::notifier;
use crate::recurrence::{self, RecurrenceRule};
use crate::schema::{projects, subtasks, tasks, users};
use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

// Paramètres de requête de filtrage des tâches
#[derive(Deserialize, Debug)]
pub struct TaskQueryParams {
    pub project_id: Option<Uuid>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub fn can_view_task(user: &AuthenticatedUser, task: &Task, owner_department: &str) -> bool {
    task.owner_id == user.id
        || task.collaborators.contains(&user.emp_id)
        || user.oversees_department(owner_department)
}

pub fn can_edit_task(user: &AuthenticatedUser, task: &Task, owner_department: &str) -> bool {
    task.owner_id == user.id
        || task.collaborators.contains(&user.emp_id)
        || user.role == Role::Director
        || (user.role == Role::Manager && user.department == owner_department)
}

pub fn can_delete_task(user: &AuthenticatedUser, task: &Task, owner_department: &str) -> bool {
    task.owner_id == user.id
        || user.role == Role::Director
        || (user.role == Role::Manager && user.department == owner_department)
}

pub fn completion_stamp(
    previous: &Task,
    next: TaskStatus,
    now: DateTime<Utc>,
) -> Option<Option<DateTime<Utc>>> {
    match (previous.is_completed(), next == TaskStatus::Completed) {
        (false, true) => Some(Some(now)),
        (true, false) => Some(None),
        _ => None,
    }
}

pub fn normalize_collaborators(collaborators: &[String], owner_emp_id: &str) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for emp in collaborators.iter().map(|c| c.trim()) {
        if !emp.is_empty() && emp != owner_emp_id && !normalized.iter().any(|n| n == emp) {
            normalized.push(emp.to_string());
        }
    }
    normalized
}

fn validate_priority(priority: i32) -> Result<i32, ServiceError> {
    if (1..=10).contains(&priority) {
        Ok(priority)
    } else {
        Err(ServiceError::BadRequest(
            "priority must be between 1 and 10".to_string(),
        ))
    }
}

fn parse_status(raw: &str) -> Result<TaskStatus, ServiceError> {
    raw.parse::<TaskStatus>().map_err(ServiceError::BadRequest)
}

// Une tâche naît `ongoing` ou `unassigned` ; la terminer passe par update/toggle
fn initial_status(raw: Option<&str>) -> Result<TaskStatus, ServiceError> {
    match raw.map(parse_status).transpose()? {
        None => Ok(TaskStatus::Ongoing),
        Some(status @ (TaskStatus::Ongoing | TaskStatus::Unassigned)) => Ok(status),
        Some(other) => Err(ServiceError::BadRequest(format!(
            "A new task cannot start as {}; use ongoing or unassigned",
            other.as_str()
        ))),
    }
}

// Tâche + département et emp_id du propriétaire
pub(crate) async fn load_task_with_owner(
    conn: &mut AsyncPgConnection,
    task_id: Uuid,
) -> Result<(Task, String, String), ServiceError> {
    let task = tasks::table
        .filter(tasks::id.eq(task_id))
        .select(Task::as_select())
        .first::<Task>(conn)
        .await
        .optional()?
        .ok_or_else(|| ServiceError::NotFound(format!("Task with id {} not found", task_id)))?;

    let (owner_emp_id, owner_department) = users::table
        .filter(users::id.eq(task.owner_id))
        .select((users::emp_id, users::department))
        .first::<(String, String)>(conn)
        .await?;

    Ok((task, owner_emp_id, owner_department))
}

// 404 plutôt que 403 : on ne révèle pas l'existence de la tâche
pub(crate) async fn load_visible_task(
    conn: &mut AsyncPgConnection,
    user: &AuthenticatedUser,
    task_id: Uuid,
) -> Result<(Task, String, String), ServiceError> {
    let (task, owner_emp_id, owner_department) = load_task_with_owner(conn, task_id).await?;
    if !can_view_task(user, &task, &owner_department) {
        return Err(ServiceError::NotFound(format!(
            "Task with id {} not found or not accessible",
            task_id
        )));
    }
    Ok((task, owner_emp_id, owner_department))
}

pub(crate) async fn load_editable_task(
    conn: &mut AsyncPgConnection,
    user: &AuthenticatedUser,
    task_id: Uuid,
) -> Result<(Task, String, String), ServiceError> {
    let (task, owner_emp_id, owner_department) = load_visible_task(conn, user, task_id).await?;
    if !can_edit_task(user, &task, &owner_department) {
        return Err(ServiceError::Forbidden(format!(
            "You are not allowed to modify task {}",
            task_id
        )));
    }
    Ok((task, owner_emp_id, owner_department))
}

pub(crate) async fn subtasks_by_task(
    conn: &mut AsyncPgConnection,
    task_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<Subtask>>, ServiceError> {
    if task_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = subtasks::table
        .filter(subtasks::task_id.eq_any(task_ids.to_vec()))
        .order(subtasks::created_at.asc())
        .select(Subtask::as_select())
        .load::<Subtask>(conn)
        .await?;

    let mut grouped: HashMap<Uuid, Vec<Subtask>> = HashMap::new();
    for subtask in rows {
        grouped.entry(subtask.task_id).or_default().push(subtask);
    }
    Ok(grouped)
}

pub(crate) async fn with_subtasks(
    conn: &mut AsyncPgConnection,
    task_list: Vec<Task>,
) -> Result<Vec<TaskApiResponse>, ServiceError> {
    let ids: Vec<Uuid> = task_list.iter().map(|t| t.id).collect();
    let mut grouped = subtasks_by_task(conn, &ids).await?;
    Ok(task_list
        .into_iter()
        .map(|task| {
            let subtask_list = grouped.remove(&task.id).unwrap_or_default();
            let mut response = TaskApiResponse::from(task);
            response.subtasks = subtask_list;
            response
        })
        .collect())
}

async fn single_response(
    conn: &mut AsyncPgConnection,
    task: Task,
) -> Result<TaskApiResponse, ServiceError> {
    let mut responses = with_subtasks(conn, vec![task]).await?;
    responses
        .pop()
        .ok_or_else(|| ServiceError::InternalServerError("Task vanished while loading".to_string()))
}

async fn ensure_project_access(
    conn: &mut AsyncPgConnection,
    user: &AuthenticatedUser,
    project_uuid: Uuid,
) -> Result<(), ServiceError> {
    let project = projects::table
        .filter(projects::id.eq(project_uuid))
        .select(Project::as_select())
        .first::<Project>(conn)
        .await
        .optional()?
        .ok_or_else(|| ServiceError::NotFound(format!("Project with id {} not found", project_uuid)))?;

    if project.owner_id == user.id
        || project.members.contains(&user.emp_id)
        || user.role != Role::Staff
    {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "You are not a member of project {}",
            project_uuid
        )))
    }
}

// None si la série est terminée ou si l'occurrence existe déjà
pub(crate) async fn spawn_next_instance(
    conn: &mut AsyncPgConnection,
    completed: &Task,
) -> Result<Option<Task>, ServiceError> {
    // Les pas mensuels et annuels restent calés sur le jour de la première échéance
    let series_start = match completed.parent_task_id {
        Some(root_id) => tasks::table
            .filter(tasks::id.eq(root_id))
            .select(tasks::due_date)
            .first::<Option<NaiveDate>>(conn)
            .await
            .optional()?
            .flatten(),
        None => completed.due_date,
    };
    let next = match recurrence::next_instance(completed, series_start) {
        Some(next) => next,
        None => return Ok(None),
    };

    // L'index unique (parent_task_id, due_date) empêche les doublons
    let created = diesel::insert_into(tasks::table)
        .values(&next)
        .on_conflict_do_nothing()
        .get_result::<Task>(conn)
        .await
        .optional()?;

    match &created {
        Some(task) => log::info!(
            "Created recurring instance {} of series {} due {:?}",
            task.id,
            completed.series_root(),
            task.due_date
        ),
        None => log::debug!(
            "Recurring instance of series {} already exists",
            completed.series_root()
        ),
    }
    Ok(created)
}

#[post("")]
pub async fn create_task_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    payload: web::Json<CreateTaskPayload>,
) -> Result<HttpResponse, ServiceError> {
    let payload = payload.into_inner();
    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(ServiceError::BadRequest("title cannot be empty".to_string()));
    }

    let task_status = initial_status(payload.status.as_deref())?;
    let priority = validate_priority(payload.priority.unwrap_or(5))?;
    let rule = RecurrenceRule::from_parts(
        payload.is_recurring,
        payload.recurrence_type.as_deref(),
        payload.recurrence_interval,
        payload.recurrence_end_date,
        payload.due_date,
    )
    .map_err(ServiceError::BadRequest)?;
    let collaborators = normalize_collaborators(&payload.collaborators, &authenticated_user.emp_id);

    let mut conn = pool.get().await?;

    ensure_employees_exist(&mut conn, &collaborators).await?;
    if let Some(project_uuid) = payload.project_id {
        ensure_project_access(&mut conn, &authenticated_user, project_uuid).await?;
    }

    let new_task_data = NewTask {
        title,
        description: payload.description,
        status: task_status.as_str().to_string(),
        priority,
        due_date: payload.due_date,
        owner_id: authenticated_user.id,
        collaborators: collaborators.clone(),
        project_id: payload.project_id,
        is_recurring: rule.is_some(),
        recurrence_type: rule.map(|r| r.kind.as_str().to_string()),
        recurrence_interval: rule.map(|r| r.interval as i32),
        recurrence_end_date: rule.and_then(|r| r.end_date),
        parent_task_id: None,
    };

    let task = diesel::insert_into(tasks::table)
        .values(&new_task_data)
        .get_result::<Task>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    let notifications = notifier::task_assigned(&task, &authenticated_user.emp_id, &collaborators);
    notifier::insert_notifications(&mut conn, &notifications).await?;

    log::info!("User {} created task {}", authenticated_user.emp_id, task.id);
    Ok(HttpResponse::Created().json(TaskApiResponse::from(task)))
}

#[get("")]
pub async fn list_tasks_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    query: web::Query<TaskQueryParams>,
) -> Result<HttpResponse, ServiceError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let mut conn = pool.get().await?;

    let mine = || {
        tasks::owner_id
            .eq(authenticated_user.id)
            .or(tasks::collaborators.contains(vec![authenticated_user.emp_id.clone()]))
    };
    let mut count_query = tasks::table.filter(mine()).into_boxed();
    let mut query_builder = tasks::table.filter(mine()).into_boxed();

    if let Some(project_uuid) = query.project_id {
        query_builder = query_builder.filter(tasks::project_id.eq(project_uuid));
        count_query = count_query.filter(tasks::project_id.eq(project_uuid));
    }

    if let Some(raw_status) = &query.status {
        let task_status = parse_status(raw_status)?.as_str();
        query_builder = query_builder.filter(tasks::status.eq(task_status));
        count_query = count_query.filter(tasks::status.eq(task_status));
    }

    let total_items = count_query
        .count()
        .get_result::<i64>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    let task_list = query_builder
        .order((tasks::due_date.asc(), tasks::created_at.desc()))
        .limit(per_page)
        .offset(offset)
        .select(Task::as_select())
        .load::<Task>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    let items = with_subtasks(&mut conn, task_list).await?;
    let total_pages = (total_items + per_page - 1) / per_page;

    Ok(HttpResponse::Ok().json(PaginatedResponse {
        items,
        total_items,
        total_pages,
        page,
        per_page,
    }))
}

#[get("/department")]
pub async fn list_department_tasks_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    query: web::Query<DepartmentFilter>,
) -> Result<HttpResponse, ServiceError> {
    authenticated_user.require_role(&[Role::Manager, Role::Hr, Role::Director])?;

    let department = match (&query.department, authenticated_user.is_org_wide()) {
        (Some(requested), true) => requested.clone(),
        (Some(requested), false) if *requested != authenticated_user.department => {
            return Err(ServiceError::Forbidden(
                "Managers can only view their own department".to_string(),
            ))
        }
        _ => authenticated_user.department.clone(),
    };

    let mut conn = pool.get().await?;

    let member_ids = users::table
        .filter(users::department.eq(&department))
        .select(users::id)
        .load::<Uuid>(&mut conn)
        .await?;

    let task_list = tasks::table
        .filter(tasks::owner_id.eq_any(member_ids))
        .order((tasks::due_date.asc(), tasks::priority.desc()))
        .select(Task::as_select())
        .load::<Task>(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(with_subtasks(&mut conn, task_list).await?))
}

#[get("/emp/{emp_id_path}")]
pub async fn list_tasks_for_employee_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    emp_id_path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let emp = emp_id_path.into_inner();
    if authenticated_user.role == Role::Staff && emp != authenticated_user.emp_id {
        return Err(ServiceError::Forbidden(
            "Staff can only view their own tasks".to_string(),
        ));
    }

    let mut conn = pool.get().await?;

    let target = users::table
        .filter(users::emp_id.eq(&emp))
        .select((users::id, users::department))
        .first::<(Uuid, String)>(&mut conn)
        .await
        .optional()?;

    // Un emp_id inconnu donne une liste vide, pas une 404
    let (target_id, target_department) = match target {
        Some(found) => found,
        None => {
            log::debug!("No employee with emp_id {}", emp);
            return Ok(HttpResponse::Ok().json(Vec::<TaskApiResponse>::new()));
        }
    };

    if emp != authenticated_user.emp_id && !authenticated_user.oversees_department(&target_department) {
        return Err(ServiceError::Forbidden(format!(
            "You cannot view tasks of employee {}",
            emp
        )));
    }

    let task_list = tasks::table
        .filter(
            tasks::owner_id
                .eq(target_id)
                .or(tasks::collaborators.contains(vec![emp.clone()])),
        )
        .order(tasks::created_at.desc())
        .select(Task::as_select())
        .load::<Task>(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(with_subtasks(&mut conn, task_list).await?))
}

#[get("/{task_id_path}")]
pub async fn get_task_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    task_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let (task, _, _) = load_visible_task(&mut conn, &authenticated_user, task_id_path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(single_response(&mut conn, task).await?))
}

#[get("/{task_id_path}/instances")]
pub async fn list_task_instances_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    task_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let (task, _, _) = load_visible_task(&mut conn, &authenticated_user, task_id_path.into_inner()).await?;
    let root = task.series_root();

    let series = tasks::table
        .filter(tasks::id.eq(root).or(tasks::parent_task_id.eq(root)))
        .order((tasks::due_date.asc(), tasks::created_at.asc()))
        .select(Task::as_select())
        .load::<Task>(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(with_subtasks(&mut conn, series).await?))
}

#[put("/{task_id_path}")]
pub async fn update_task_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    task_id_path: web::Path<Uuid>,
    payload: web::Json<UpdateTaskPayload>,
) -> Result<HttpResponse, ServiceError> {
    let task_to_update_id = task_id_path.into_inner();
    let payload = payload.into_inner();
    let now = Utc::now();

    let mut conn = pool.get().await?;
    let (current, owner_emp_id, _) =
        load_editable_task(&mut conn, &authenticated_user, task_to_update_id).await?;

    let mut task_changes = UpdateTaskChangeset {
        description: payload.description,
        due_date: payload.due_date,
        is_recurring: payload.is_recurring,
        recurrence_type: payload.recurrence_type,
        recurrence_interval: payload.recurrence_interval,
        recurrence_end_date: payload.recurrence_end_date,
        updated_at: Some(now),
        ..Default::default()
    };

    if let Some(raw_title) = payload.title {
        let trimmed = raw_title.trim().to_string();
        if trimmed.is_empty() {
            return Err(ServiceError::BadRequest("title cannot be empty".to_string()));
        }
        task_changes.title = Some(trimmed);
    }
    if let Some(priority) = payload.priority {
        task_changes.priority = Some(validate_priority(priority)?);
    }
    let next_status = match payload.status.as_deref() {
        Some(raw) => Some(parse_status(raw)?),
        None => None,
    };
    if let Some(next) = next_status {
        task_changes.status = Some(next.as_str().to_string());
        task_changes.completed_at = completion_stamp(&current, next, now);
    }

    // Valider la récurrence sur l'état fusionné
    RecurrenceRule::from_parts(
        task_changes.is_recurring.unwrap_or(current.is_recurring),
        match &task_changes.recurrence_type {
            Some(value) => value.as_deref(),
            None => current.recurrence_type.as_deref(),
        },
        task_changes.recurrence_interval.unwrap_or(current.recurrence_interval),
        task_changes.recurrence_end_date.unwrap_or(current.recurrence_end_date),
        task_changes.due_date.unwrap_or(current.due_date),
    )
    .map_err(ServiceError::BadRequest)?;

    let mut added_collaborators = Vec::new();
    if let Some(requested) = payload.collaborators {
        let collaborators = normalize_collaborators(&requested, &owner_emp_id);
        ensure_employees_exist(&mut conn, &collaborators).await?;
        added_collaborators = notifier::newly_added(&current.collaborators, &collaborators);
        task_changes.collaborators = Some(collaborators);
    }
    if let Some(Some(project_uuid)) = payload.project_id {
        ensure_project_access(&mut conn, &authenticated_user, project_uuid).await?;
    }
    task_changes.project_id = payload.project_id;

    let updated_task = diesel::update(tasks::table.filter(tasks::id.eq(task_to_update_id)))
        .set(&task_changes)
        .get_result::<Task>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    let notifications =
        notifier::task_assigned(&updated_task, &authenticated_user.emp_id, &added_collaborators);
    notifier::insert_notifications(&mut conn, &notifications).await?;

    if !current.is_completed() && updated_task.is_completed() {
        spawn_next_instance(&mut conn, &updated_task).await?;
    }

    Ok(HttpResponse::Ok().json(single_response(&mut conn, updated_task).await?))
}

#[delete("/{task_id_path}")]
pub async fn delete_task_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    task_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let task_to_delete_id = task_id_path.into_inner();

    let mut conn = pool.get().await?;
    let (task, _, owner_department) =
        load_visible_task(&mut conn, &authenticated_user, task_to_delete_id).await?;
    if !can_delete_task(&authenticated_user, &task, &owner_department) {
        return Err(ServiceError::Forbidden(format!(
            "You are not allowed to delete task {}",
            task_to_delete_id
        )));
    }

    // Les sous-tâches et notifications suivent par ON DELETE CASCADE
    let num_deleted = diesel::delete(tasks::table.filter(tasks::id.eq(task_to_delete_id)))
        .execute(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    if num_deleted > 0 {
        log::info!("User {} deleted task {}", authenticated_user.emp_id, task_to_delete_id);
        Ok(HttpResponse::Ok().json(json!({
            "status": "success",
            "message": format!("Task with id {} deleted successfully", task_to_delete_id)
        })))
    } else {
        Err(ServiceError::NotFound(format!(
            "Task with id {} not found",
            task_to_delete_id
        )))
    }
}

#[put("/{task_id_path}/toggle-completion")]
pub async fn toggle_task_completion_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    task_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let task_to_toggle_id = task_id_path.into_inner();
    let now = Utc::now();

    let mut conn = pool.get().await?;
    let (task, _, _) = load_editable_task(&mut conn, &authenticated_user, task_to_toggle_id).await?;

    // Déterminer le nouveau statut
    let new_status = if task.is_completed() {
        TaskStatus::Ongoing
    } else {
        TaskStatus::Completed
    };

    let task_changes = UpdateTaskChangeset {
        status: Some(new_status.as_str().to_string()),
        completed_at: completion_stamp(&task, new_status, now),
        updated_at: Some(now),
        ..Default::default()
    };

    let updated_task = diesel::update(tasks::table.filter(tasks::id.eq(task_to_toggle_id)))
        .set(&task_changes)
        .get_result::<Task>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    if updated_task.is_completed() {
        spawn_next_instance(&mut conn, &updated_task).await?;
    }

    Ok(HttpResponse::Ok().json(single_response(&mut conn, updated_task).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::tests::{task, user};
    use crate::auth_utils::tests::{bearer_for, test_config, token_accounts};
    use crate::auth_utils::{account_store, issue_token};
    use crate::db::tests::{migrated_test_pool, seed_user};
    use crate::db::unconnected_pool;
    use actix_web::http::StatusCode;
    use actix_web::{test as actix_test, App};

    fn caller(emp_id: &str, role: Role, department: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            id: Uuid::new_v4(),
            emp_id: emp_id.to_string(),
            role,
            department: department.to_string(),
        }
    }

    #[test]
    fn visibility_follows_ownership_collaboration_and_oversight() {
        let owner_user = user("E1", "Sales");
        let t = task(&owner_user, "ongoing", None, &["E2"]);
        let owner = AuthenticatedUser {
            id: owner_user.id,
            ..caller("E1", Role::Staff, "Sales")
        };

        assert!(can_view_task(&owner, &t, "Sales"));
        assert!(can_view_task(&caller("E2", Role::Staff, "Ops"), &t, "Sales"));
        assert!(!can_view_task(&caller("E3", Role::Staff, "Sales"), &t, "Sales"));
        assert!(can_view_task(&caller("M1", Role::Manager, "Sales"), &t, "Sales"));
        assert!(!can_view_task(&caller("M2", Role::Manager, "Ops"), &t, "Sales"));
        assert!(can_view_task(&caller("H1", Role::Hr, "People"), &t, "Sales"));

        assert!(can_edit_task(&caller("E2", Role::Staff, "Ops"), &t, "Sales"));
        assert!(!can_edit_task(&caller("H1", Role::Hr, "People"), &t, "Sales"));
        assert!(!can_delete_task(&caller("E2", Role::Staff, "Ops"), &t, "Sales"));
        assert!(can_delete_task(&caller("M1", Role::Manager, "Sales"), &t, "Sales"));
        assert!(can_delete_task(&owner, &t, "Sales"));
    }

    #[test]
    fn completion_stamp_tracks_transitions() {
        let owner = user("E1", "Sales");
        let open = task(&owner, "ongoing", None, &[]);
        let done = task(&owner, "completed", None, &[]);
        let now = Utc::now();

        assert_eq!(completion_stamp(&open, TaskStatus::Completed, now), Some(Some(now)));
        assert_eq!(completion_stamp(&done, TaskStatus::Ongoing, now), Some(None));
        assert_eq!(completion_stamp(&done, TaskStatus::Completed, now), None);
        assert_eq!(completion_stamp(&open, TaskStatus::UnderReview, now), None);
    }

    #[test]
    fn collaborators_are_trimmed_deduplicated_and_exclude_owner() {
        let requested = vec![
            " E2 ".to_string(),
            "E1".to_string(),
            "E2".to_string(),
            "".to_string(),
            "E3".to_string(),
        ];
        assert_eq!(normalize_collaborators(&requested, "E1"), vec!["E2", "E3"]);
    }

    #[test]
    fn new_tasks_start_open() {
        assert_eq!(initial_status(None).unwrap(), TaskStatus::Ongoing);
        assert_eq!(initial_status(Some("unassigned")).unwrap(), TaskStatus::Unassigned);
        assert!(matches!(
            initial_status(Some("completed")),
            Err(ServiceError::BadRequest(_))
        ));
        assert!(initial_status(Some("under_review")).is_err());
        assert!(initial_status(Some("archived")).is_err());
    }

    #[actix_web::test]
    async fn creating_a_completed_task_is_rejected() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(test_config()))
                .app_data(token_accounts())
                .app_data(web::Data::new(unconnected_pool()))
                .service(web::scope("/tasks").service(create_task_handler)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/tasks")
            .insert_header(("Authorization", bearer_for("E1", Role::Staff, "Sales")))
            .set_json(json!({"title": "Already done", "status": "completed"}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn task_routes_require_authentication() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(test_config()))
                .app_data(token_accounts())
                .app_data(web::Data::new(unconnected_pool()))
                .service(
                    web::scope("/tasks")
                        .service(list_department_tasks_handler)
                        .service(list_tasks_for_employee_handler)
                        .service(list_tasks_handler)
                        .service(get_task_handler),
                ),
        )
        .await;

        let single_task_uri = format!("/tasks/{}", Uuid::new_v4());
        for uri in ["/tasks", "/tasks/emp/E404", single_task_uri.as_str()] {
            let req = actix_test::TestRequest::get().uri(uri).to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "uri {}", uri);
        }
    }

    #[actix_web::test]
    async fn staff_cannot_read_department_or_foreign_employee_tasks() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(test_config()))
                .app_data(token_accounts())
                .app_data(web::Data::new(unconnected_pool()))
                .service(
                    web::scope("/tasks")
                        .service(list_department_tasks_handler)
                        .service(list_tasks_for_employee_handler),
                ),
        )
        .await;
        let token = bearer_for("E1", Role::Staff, "Sales");

        let req = actix_test::TestRequest::get()
            .uri("/tasks/department")
            .insert_header(("Authorization", token.clone()))
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = actix_test::TestRequest::get()
            .uri("/tasks/emp/E2")
            .insert_header(("Authorization", token))
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    }

    fn monthly_task(owner_id: Uuid, due: NaiveDate) -> NewTask {
        NewTask {
            title: "Month-end close".to_string(),
            description: None,
            status: TaskStatus::Completed.as_str().to_string(),
            priority: 5,
            due_date: Some(due),
            owner_id,
            collaborators: vec![],
            project_id: None,
            is_recurring: true,
            recurrence_type: Some("monthly".to_string()),
            recurrence_interval: Some(1),
            recurrence_end_date: None,
            parent_task_id: None,
        }
    }

    #[actix_web::test]
    async fn unknown_employee_lists_no_tasks() {
        let Some(pool) = migrated_test_pool().await else {
            return;
        };
        let manager = seed_user(&pool, "M1", Role::Manager, "Sales").await;
        let (token, _) = issue_token(&manager, &test_config()).unwrap();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(test_config()))
                .app_data(account_store(pool.clone()))
                .app_data(web::Data::new(pool.clone()))
                .service(web::scope("/tasks").service(list_tasks_for_employee_handler)),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/tasks/emp/E404")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: Vec<serde_json::Value> = actix_test::call_and_read_body_json(&app, req).await;
        assert!(body.is_empty());
    }

    #[actix_web::test]
    async fn next_instance_is_spawned_once_and_keeps_the_month_end() {
        let Some(pool) = migrated_test_pool().await else {
            return;
        };
        let owner = seed_user(&pool, "E1", Role::Staff, "Finance").await;
        let mut conn = pool.get().await.unwrap();

        let january = diesel::insert_into(tasks::table)
            .values(monthly_task(owner.id, NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()))
            .get_result::<Task>(&mut conn)
            .await
            .unwrap();

        let february = spawn_next_instance(&mut conn, &january).await.unwrap().unwrap();
        assert_eq!(february.due_date, NaiveDate::from_ymd_opt(2025, 2, 28));
        assert_eq!(february.parent_task_id, Some(january.id));
        assert!(spawn_next_instance(&mut conn, &january).await.unwrap().is_none());

        let instances: i64 = tasks::table
            .filter(tasks::parent_task_id.eq(january.id))
            .count()
            .get_result(&mut conn)
            .await
            .unwrap();
        assert_eq!(instances, 1);

        let march = spawn_next_instance(&mut conn, &february).await.unwrap().unwrap();
        assert_eq!(march.due_date, NaiveDate::from_ymd_opt(2025, 3, 31));
    }
}
