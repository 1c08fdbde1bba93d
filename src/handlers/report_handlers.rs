use crate::analytics;
use crate::auth_utils::AuthenticatedUser;
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::handlers::director_handlers::load_org_snapshot;
use crate::models::{AnalyticsQueryPeriod, Role, Task};
use crate::report::{self, ReportDocument};
use actix_web::http::header;
use actix_web::{get, web, HttpResponse};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use uuid::Uuid;

const REPORT_ROLES: &[Role] = &[Role::Manager, Role::Hr, Role::Director];

#[derive(Deserialize, Debug, Default)]
pub struct TaskReportParams {
    pub period: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub department: Option<String>,
}

// Un manager reste dans son département
pub fn report_scope(
    user: &AuthenticatedUser,
    requested: Option<&str>,
) -> Result<Option<String>, ServiceError> {
    match (user.role, requested) {
        (Role::Manager, Some(department)) if department != user.department => {
            Err(ServiceError::Forbidden(format!(
                "Managers can only report on their own department ({})",
                user.department
            )))
        }
        (Role::Manager, _) => Ok(Some(user.department.clone())),
        (_, requested) => Ok(requested.map(|d| d.to_string())),
    }
}

fn pdf_filename(prefix: &str, label: &str) -> String {
    let slug: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("{}-{}.pdf", prefix, slug.trim_matches('-'))
}

fn pdf_response(document: &ReportDocument, filename: &str) -> Result<HttpResponse, ServiceError> {
    let bytes = report::render_pdf(document)?;
    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(bytes))
}

#[get("/tasks")]
pub async fn task_report_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    query_params: web::Query<TaskReportParams>,
) -> Result<HttpResponse, ServiceError> {
    authenticated_user.require_role(REPORT_ROLES)?;
    let department = report_scope(&authenticated_user, query_params.department.as_deref())?;
    let today = Utc::now().date_naive();
    let (start_date, end_date) = analytics::calculate_date_range(
        &AnalyticsQueryPeriod {
            period: query_params.period.clone(),
            start_date: query_params.start_date,
            end_date: query_params.end_date,
        },
        today,
    )?;

    let mut conn = pool.get().await?;
    let snapshot = load_org_snapshot(&mut conn).await?;

    let owners: HashSet<Uuid> = snapshot
        .users_in(department.as_deref())
        .iter()
        .map(|u| u.id)
        .collect();
    let in_range: Vec<Task> = snapshot
        .tasks
        .iter()
        .filter(|t| owners.contains(&t.owner_id))
        .filter(|t| {
            let created = t.created_at.date_naive();
            created >= start_date && created <= end_date
        })
        .cloned()
        .collect();

    let document = report::task_report(
        &snapshot.users,
        &in_range,
        start_date,
        end_date,
        department.as_deref(),
        today,
    );
    log::info!(
        "{} generated a task report ({} tasks, {} to {})",
        authenticated_user.emp_id,
        in_range.len(),
        start_date,
        end_date
    );

    let label = format!(
        "{}-{}-{}",
        department.as_deref().unwrap_or("all"),
        start_date,
        end_date
    );
    pdf_response(&document, &pdf_filename("task-report", &label))
}

#[get("/department/{department_path}")]
pub async fn department_report_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    department_path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    authenticated_user.require_role(REPORT_ROLES)?;
    let requested = department_path.into_inner();
    let department = report_scope(&authenticated_user, Some(requested.as_str()))?.unwrap_or(requested);

    let mut conn = pool.get().await?;
    let snapshot = load_org_snapshot(&mut conn).await?;

    let department_users = snapshot.users_in(Some(department.as_str()));
    if department_users.is_empty() {
        return Err(ServiceError::NotFound(format!(
            "Department {} not found",
            department
        )));
    }
    let owners: HashSet<Uuid> = department_users.iter().map(|u| u.id).collect();
    let department_tasks: Vec<Task> = snapshot
        .tasks
        .iter()
        .filter(|t| owners.contains(&t.owner_id))
        .cloned()
        .collect();

    let document = report::department_report(
        &department,
        &department_users,
        &department_tasks,
        &snapshot.projects,
        Utc::now().date_naive(),
    );
    log::info!(
        "{} generated a department report for {}",
        authenticated_user.emp_id,
        department
    );
    pdf_response(&document, &pdf_filename("department-report", &department))
}
