use crate::analytics;
use crate::auth_utils::AuthenticatedUser;
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::{AnalyticsQueryPeriod, DepartmentFilter, Project, Role, Task, User};
use crate::schema::{projects, tasks, users};
use actix_web::{get, web, HttpResponse};
use chrono::{NaiveTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde_json::json;

// Chargé d'un coup pour les vues de pilotage
pub(crate) struct OrgSnapshot {
    pub users: Vec<User>,
    pub tasks: Vec<Task>,
    pub projects: Vec<Project>,
}

impl OrgSnapshot {
    pub fn users_in(&self, department: Option<&str>) -> Vec<User> {
        self.users
            .iter()
            .filter(|u| department.map(|d| u.department == d).unwrap_or(true))
            .cloned()
            .collect()
    }
}

pub(crate) async fn load_org_snapshot(conn: &mut AsyncPgConnection) -> Result<OrgSnapshot, ServiceError> {
    let all_users = users::table
        .order(users::emp_id.asc())
        .select(User::as_select())
        .load::<User>(conn)
        .await?;
    let all_tasks = tasks::table
        .order(tasks::created_at.asc())
        .select(Task::as_select())
        .load::<Task>(conn)
        .await?;
    let all_projects = projects::table
        .order(projects::created_at.asc())
        .select(Project::as_select())
        .load::<Project>(conn)
        .await?;

    log::debug!(
        "Loaded analytics snapshot: {} users, {} tasks, {} projects",
        all_users.len(),
        all_tasks.len(),
        all_projects.len()
    );
    Ok(OrgSnapshot {
        users: all_users,
        tasks: all_tasks,
        projects: all_projects,
    })
}

#[get("/overview")]
pub async fn company_overview_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, ServiceError> {
    authenticated_user.require_role(&[Role::Director, Role::Hr])?;
    let mut conn = pool.get().await?;
    let snapshot = load_org_snapshot(&mut conn).await?;

    let overview = analytics::company_overview(
        &snapshot.users,
        &snapshot.tasks,
        &snapshot.projects,
        Utc::now().date_naive(),
    );
    Ok(HttpResponse::Ok().json(overview))
}

#[get("/departments")]
pub async fn department_stats_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, ServiceError> {
    authenticated_user.require_role(&[Role::Director, Role::Hr])?;
    let mut conn = pool.get().await?;
    let snapshot = load_org_snapshot(&mut conn).await?;

    let stats = analytics::department_stats(
        &snapshot.users,
        &snapshot.tasks,
        &snapshot.projects,
        Utc::now().date_naive(),
    );
    Ok(HttpResponse::Ok().json(stats))
}

#[get("/workload")]
pub async fn workload_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    query_params: web::Query<DepartmentFilter>,
) -> Result<HttpResponse, ServiceError> {
    authenticated_user.require_role(&[Role::Director])?;
    let mut conn = pool.get().await?;
    let snapshot = load_org_snapshot(&mut conn).await?;

    let department = query_params.department.as_deref();
    let workloads = analytics::employee_workloads(
        &snapshot.users_in(department),
        &snapshot.tasks,
        Utc::now().date_naive(),
    );

    Ok(HttpResponse::Ok().json(json!({
        "department": department,
        "distribution": analytics::workload_distribution(&workloads),
        "employees": workloads,
    })))
}

#[get("/collaboration")]
pub async fn collaboration_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, ServiceError> {
    authenticated_user.require_role(&[Role::Director])?;
    let mut conn = pool.get().await?;
    let snapshot = load_org_snapshot(&mut conn).await?;

    let metrics =
        analytics::collaboration_metrics(&snapshot.users, &snapshot.tasks, &snapshot.projects);
    Ok(HttpResponse::Ok().json(metrics))
}

#[get("/trends")]
pub async fn task_trends_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    query_params: web::Query<AnalyticsQueryPeriod>,
) -> Result<HttpResponse, ServiceError> {
    authenticated_user.require_role(&[Role::Director])?;
    let (start_date, end_date) =
        analytics::calculate_date_range(&query_params, Utc::now().date_naive())?;

    // Seules les tâches créées ou terminées dans la période comptent
    let range_start = start_date.and_time(NaiveTime::MIN).and_utc();
    let range_end = end_date
        .succ_opt()
        .unwrap_or(end_date)
        .and_time(NaiveTime::MIN)
        .and_utc();

    let mut conn = pool.get().await?;
    let task_list = tasks::table
        .filter(
            tasks::created_at
                .ge(range_start)
                .and(tasks::created_at.lt(range_end))
                .or(tasks::completed_at
                    .ge(range_start)
                    .and(tasks::completed_at.lt(range_end))),
        )
        .select(Task::as_select())
        .load::<Task>(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "start_date": start_date,
        "end_date": end_date,
        "points": analytics::task_trend(&task_list, start_date, end_date),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::tests::user;
    use crate::auth_utils::tests::{bearer_for, test_config, token_accounts};
    use crate::db::unconnected_pool;
    use actix_web::http::StatusCode;
    use actix_web::{test as actix_test, App};

    #[test]
    fn snapshot_filters_users_by_department() {
        let snapshot = OrgSnapshot {
            users: vec![user("E1", "IT"), user("E2", "Sales"), user("E3", "IT")],
            tasks: vec![],
            projects: vec![],
        };
        let it: Vec<String> = snapshot
            .users_in(Some("IT"))
            .into_iter()
            .map(|u| u.emp_id)
            .collect();
        assert_eq!(it, vec!["E1", "E3"]);
        assert_eq!(snapshot.users_in(None).len(), 3);
        assert!(snapshot.users_in(Some("Legal")).is_empty());
    }

    #[actix_web::test]
    async fn dashboards_are_restricted_by_role() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(test_config()))
                .app_data(token_accounts())
                .app_data(web::Data::new(unconnected_pool()))
                .service(
                    web::scope("/director")
                        .service(company_overview_handler)
                        .service(department_stats_handler)
                        .service(workload_handler)
                        .service(collaboration_handler)
                        .service(task_trends_handler),
                ),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/director/overview").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let staff = bearer_for("E001", Role::Staff, "IT");
        for uri in ["/director/overview", "/director/departments", "/director/trends"] {
            let req = actix_test::TestRequest::get()
                .uri(uri)
                .insert_header(("Authorization", staff.clone()))
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "uri {}", uri);
        }

        // HR lit la vue d'ensemble mais pas la charge individuelle
        let hr = bearer_for("H001", Role::Hr, "HR");
        for uri in ["/director/workload", "/director/collaboration"] {
            let req = actix_test::TestRequest::get()
                .uri(uri)
                .insert_header(("Authorization", hr.clone()))
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "uri {}", uri);
        }
    }
}
