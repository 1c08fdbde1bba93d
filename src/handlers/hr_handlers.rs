use crate::analytics;
use crate::auth_utils::{hash_password, AuthenticatedUser};
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::handlers::auth_handlers::MIN_PASSWORD_LENGTH;
use crate::handlers::director_handlers::load_org_snapshot;
use crate::models::{
    CreateEmployeePayload, DepartmentFilter, NewUser, Role, UpdateEmployeePayload,
    UpdateUserChangeset, User, UserProfile,
};
use crate::schema::users;
use actix_web::{get, post, put, web, HttpResponse};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

const HR_ROLES: &[Role] = &[Role::Hr, Role::Director];

#[derive(Deserialize, Debug)]
pub struct EmployeeQueryParams {
    pub department: Option<String>,
    pub role: Option<String>,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct DepartmentHeadcount {
    pub department: String,
    pub headcount: usize,
    pub inactive: usize,
    pub roles: BTreeMap<String, usize>,
}

pub fn department_headcounts(all_users: &[User]) -> Vec<DepartmentHeadcount> {
    let mut by_department: BTreeMap<&str, DepartmentHeadcount> = BTreeMap::new();
    for user in all_users {
        let entry = by_department
            .entry(user.department.as_str())
            .or_insert_with(|| DepartmentHeadcount {
                department: user.department.clone(),
                headcount: 0,
                inactive: 0,
                roles: BTreeMap::new(),
            });
        if user.is_active {
            entry.headcount += 1;
            *entry.roles.entry(user.role.clone()).or_insert(0) += 1;
        } else {
            entry.inactive += 1;
        }
    }
    by_department.into_values().collect()
}

fn required(field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ServiceError::BadRequest(format!("{} cannot be empty", field)))
    } else {
        Ok(trimmed.to_string())
    }
}

// Seul un directeur peut nommer un autre directeur.
fn check_role_grant(granted_by: &AuthenticatedUser, role: Role) -> Result<(), ServiceError> {
    if role == Role::Director && granted_by.role != Role::Director {
        return Err(ServiceError::Forbidden(
            "Only a director can grant the director role".to_string(),
        ));
    }
    Ok(())
}

// Le compte d'un directeur n'est modifiable que par un directeur.
fn check_can_modify(editor: &AuthenticatedUser, target: &User) -> Result<(), ServiceError> {
    let target_role = target
        .role
        .parse::<Role>()
        .map_err(ServiceError::InternalServerError)?;
    if target_role == Role::Director && editor.role != Role::Director {
        log::warn!(
            "{} tried to modify director account {}",
            editor.emp_id,
            target.emp_id
        );
        return Err(ServiceError::Forbidden(
            "Only a director can modify a director account".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_new_employee(payload: &CreateEmployeePayload) -> Result<(NewUser, Role), ServiceError> {
    let email = required("email", &payload.email)?.to_lowercase();
    if !email.contains('@') {
        return Err(ServiceError::BadRequest(format!("Invalid email: {}", email)));
    }
    if payload.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::BadRequest(format!(
            "password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        )));
    }
    let role = match payload.role.as_deref() {
        Some(raw) => raw.parse::<Role>().map_err(ServiceError::BadRequest)?,
        None => Role::Staff,
    };

    Ok((
        NewUser {
            emp_id: required("emp_id", &payload.emp_id)?,
            name: required("name", &payload.name)?,
            email,
            // Haché par le handler, hors de la validation
            password_hash: String::new(),
            role: role.as_str().to_string(),
            department: required("department", &payload.department)?,
        },
        role,
    ))
}

#[get("/employees")]
pub async fn list_employees_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    query_params: web::Query<EmployeeQueryParams>,
) -> Result<HttpResponse, ServiceError> {
    authenticated_user.require_role(HR_ROLES)?;
    let role_filter = match query_params.role.as_deref() {
        Some(raw) => Some(raw.parse::<Role>().map_err(ServiceError::BadRequest)?),
        None => None,
    };

    let mut conn = pool.get().await?;
    let mut query = users::table.into_boxed();
    if let Some(department) = &query_params.department {
        query = query.filter(users::department.eq(department.clone()));
    }
    if let Some(role) = role_filter {
        query = query.filter(users::role.eq(role.as_str()));
    }

    let employees: Vec<UserProfile> = query
        .order((users::department.asc(), users::name.asc()))
        .select(User::as_select())
        .load::<User>(&mut conn)
        .await?
        .into_iter()
        .map(UserProfile::from)
        .collect();

    Ok(HttpResponse::Ok().json(employees))
}

#[post("/employees")]
pub async fn create_employee_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    payload: web::Json<CreateEmployeePayload>,
) -> Result<HttpResponse, ServiceError> {
    authenticated_user.require_role(HR_ROLES)?;
    let (mut new_user, role) = validate_new_employee(&payload)?;
    check_role_grant(&authenticated_user, role)?;
    new_user.password_hash = hash_password(&payload.password)?;

    let mut conn = pool.get().await?;
    // emp_id ou email déjà pris : 409 via la contrainte d'unicité
    let user = diesel::insert_into(users::table)
        .values(&new_user)
        .get_result::<User>(&mut conn)
        .await?;

    log::info!(
        "{} created employee {} ({}, {})",
        authenticated_user.emp_id,
        user.emp_id,
        user.role,
        user.department
    );
    Ok(HttpResponse::Created().json(UserProfile::from(user)))
}

#[put("/employees/{emp_id_path}")]
pub async fn update_employee_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    emp_id_path: web::Path<String>,
    payload: web::Json<UpdateEmployeePayload>,
) -> Result<HttpResponse, ServiceError> {
    authenticated_user.require_role(HR_ROLES)?;
    let emp = emp_id_path.into_inner();
    let payload = payload.into_inner();

    if emp == authenticated_user.emp_id && payload.is_active == Some(false) {
        return Err(ServiceError::BadRequest(
            "You cannot deactivate your own account".to_string(),
        ));
    }

    let role = match payload.role.as_deref() {
        Some(raw) => {
            let role = raw.parse::<Role>().map_err(ServiceError::BadRequest)?;
            check_role_grant(&authenticated_user, role)?;
            Some(role.as_str().to_string())
        }
        None => None,
    };
    let changes = UpdateUserChangeset {
        name: match &payload.name {
            Some(raw) => Some(required("name", raw)?),
            None => None,
        },
        role,
        department: match &payload.department {
            Some(raw) => Some(required("department", raw)?),
            None => None,
        },
        is_active: payload.is_active,
        password_hash: None,
        updated_at: Some(Utc::now()),
    };

    let mut conn = pool.get().await?;
    let target = users::table
        .filter(users::emp_id.eq(&emp))
        .select(User::as_select())
        .first::<User>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Employee with emp_id {} not found", emp))
        })?;
    check_can_modify(&authenticated_user, &target)?;

    let user = diesel::update(users::table.filter(users::id.eq(target.id)))
        .set(&changes)
        .get_result::<User>(&mut conn)
        .await?;

    log::info!("{} updated employee {}", authenticated_user.emp_id, user.emp_id);
    Ok(HttpResponse::Ok().json(UserProfile::from(user)))
}

#[get("/departments")]
pub async fn list_departments_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, ServiceError> {
    authenticated_user.require_role(HR_ROLES)?;
    let mut conn = pool.get().await?;

    let all_users = users::table
        .select(User::as_select())
        .load::<User>(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(department_headcounts(&all_users)))
}

#[get("/workload")]
pub async fn hr_workload_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    query_params: web::Query<DepartmentFilter>,
) -> Result<HttpResponse, ServiceError> {
    authenticated_user.require_role(HR_ROLES)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::tests::user;
    use crate::auth_utils::tests::{bearer_for, test_config, token_accounts};
    use crate::db::unconnected_pool;
    use actix_web::http::StatusCode;
    use actix_web::{test as actix_test, App};

    fn employee_payload(role: Option<&str>, password: &str) -> CreateEmployeePayload {
        CreateEmployeePayload {
            emp_id: " E100 ".to_string(),
            name: "Ada".to_string(),
            email: "Ada@Example.com".to_string(),
            password: password.to_string(),
            role: role.map(|r| r.to_string()),
            department: "IT".to_string(),
        }
    }

    #[test]
    fn headcounts_group_by_department() {
        let mut manager = user("M1", "IT");
        manager.role = "manager".to_string();
        let mut former = user("E9", "IT");
        former.is_active = false;
        let users = vec![user("E1", "IT"), manager, former, user("E2", "Sales")];

        let counts = department_headcounts(&users);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].department, "IT");
        assert_eq!(counts[0].headcount, 2);
        assert_eq!(counts[0].inactive, 1);
        assert_eq!(counts[0].roles.get("manager"), Some(&1));
        assert_eq!(counts[0].roles.get("staff"), Some(&1));
        assert_eq!(counts[1].headcount, 1);
    }

    #[test]
    fn new_employee_validation() {
        let (new_user, role) = validate_new_employee(&employee_payload(None, "long-enough")).unwrap();
        assert_eq!(role, Role::Staff);
        assert_eq!(new_user.emp_id, "E100");
        assert_eq!(new_user.email, "ada@example.com");

        assert!(validate_new_employee(&employee_payload(None, "short")).is_err());
        assert!(validate_new_employee(&employee_payload(Some("admin"), "long-enough")).is_err());
    }

    #[test]
    fn only_directors_grant_director_role() {
        let hr = AuthenticatedUser {
            id: uuid::Uuid::new_v4(),
            emp_id: "H1".to_string(),
            role: Role::Hr,
            department: "HR".to_string(),
        };
        assert!(check_role_grant(&hr, Role::Manager).is_ok());
        assert!(matches!(
            check_role_grant(&hr, Role::Director),
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[test]
    fn director_accounts_are_left_to_directors() {
        let hr = AuthenticatedUser {
            id: uuid::Uuid::new_v4(),
            emp_id: "H1".to_string(),
            role: Role::Hr,
            department: "HR".to_string(),
        };
        let mut director = user("D1", "Board");
        director.role = "director".to_string();

        assert!(matches!(
            check_can_modify(&hr, &director),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(check_can_modify(&hr, &user("E1", "IT")).is_ok());

        let other_director = AuthenticatedUser {
            role: Role::Director,
            ..hr
        };
        assert!(check_can_modify(&other_director, &director).is_ok());
    }

    #[actix_web::test]
    async fn staff_and_managers_are_forbidden() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(test_config()))
                .app_data(token_accounts())
                .app_data(web::Data::new(unconnected_pool()))
                .service(
                    web::scope("/hr")
                        .service(list_employees_handler)
                        .service(list_departments_handler)
                        .service(hr_workload_handler),
                ),
        )
        .await;

        for (emp, role) in [("E1", Role::Staff), ("M1", Role::Manager)] {
            let req = actix_test::TestRequest::get()
                .uri("/hr/departments")
                .insert_header(("Authorization", bearer_for(emp, role, "IT")))
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        }

        let req = actix_test::TestRequest::get().uri("/hr/employees").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
