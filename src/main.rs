// WorkSync/backend-api/src/main.rs
mod analytics;
mod auth_utils;
mod config;
mod db;
mod deadline;
mod error_handler;
mod handlers;
mod models;
mod notifier;
mod recurrence;
mod report;
pub mod schema;

use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpResponse, HttpServer};
use config::AppConfig;
use db::DbPool;
use deadline::DeadlineCooldown;
use handlers::*;
use std::io;

// Health check handler avec async
async fn health_check_handler(
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, error_handler::ServiceError> {
    // Test de connexion au pool
    match pool.get().await {
        Ok(_conn) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "message": "Backend is running and DB pool accessible"
        }))),
        Err(e) => {
            log::error!("Failed to get connection from pool: {:?}", e);
            Err(error_handler::ServiceError::InternalServerError(
                "Failed to check DB pool".to_string(),
            ))
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialiser le logger
    env_logger::init();

    // Charger les variables d'environnement
    if cfg!(debug_assertions) {
        match dotenvy::dotenv() {
            Ok(path) => log::info!(".env file loaded from path: {}", path.display()),
            Err(e) => log::warn!(
                "Could not load .env file: {}, using environment variables.",
                e
            ),
        }
    }

    let app_config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    // Créer le pool de connexions async
    let pool = db::create_pool(&app_config.database_url, app_config.db_pool_max_size)
        .await
        .map_err(|e| {
            log::error!("Failed to create database connection pool: {}", e);
            io::Error::new(io::ErrorKind::Other, e.to_string())
        })?;

    log::info!("🚀 WorkSync Backend Service starting...");

    deadline::spawn_deadline_sweeper(pool.clone(), app_config.deadline_sweep_interval_secs);

    let bind_address = app_config.bind_address();
    log::info!("Server will start at http://{}", bind_address);

    // Chaque requête authentifiée relit le compte en base
    let account_data = auth_utils::account_store(pool.clone());
    let pool_data = web::Data::new(pool);
    let config_data = web::Data::new(app_config);
    // Partagé entre les workers : la limite est par employé, pas par thread
    let cooldown_data = web::Data::new(DeadlineCooldown::new(
        config_data.deadline_check_cooldown_secs,
    ));

    // Démarrer le serveur HTTP
    HttpServer::new(move || {
        // Configuration CORS
        let cors = Cors::default()
            .allowed_origin(&config_data.frontend_url_prod)
            .allowed_origin(&config_data.frontend_url_dev)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
            ])
            .expose_headers(vec![header::CONTENT_DISPOSITION])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(pool_data.clone())
            .app_data(config_data.clone())
            .app_data(cooldown_data.clone())
            .app_data(account_data.clone())
            .service(web::resource("/health").route(web::get().to(health_check_handler)))
            .service(
                web::scope("/auth")
                    .service(auth_handlers::login_handler)
                    .service(auth_handlers::me_handler)
                    .service(auth_handlers::refresh_handler)
                    .service(auth_handlers::logout_handler)
                    .service(auth_handlers::change_password_handler),
            )
            // Les routes fixes avant /{id}
            .service(
                web::scope("/tasks")
                    .service(task_handlers::create_task_handler)
                    .service(task_handlers::list_tasks_handler)
                    .service(task_handlers::list_department_tasks_handler)
                    .service(task_handlers::list_tasks_for_employee_handler)
                    .service(task_handlers::list_task_instances_handler)
                    .service(task_handlers::toggle_task_completion_handler)
                    .service(task_handlers::get_task_handler)
                    .service(task_handlers::update_task_handler)
                    .service(task_handlers::delete_task_handler),
            )
            .service(
                web::scope("/subtasks")
                    .service(subtask_handlers::list_subtasks_for_task_handler)
                    .service(subtask_handlers::create_subtask_handler)
                    .service(subtask_handlers::toggle_subtask_handler)
                    .service(subtask_handlers::update_subtask_handler)
                    .service(subtask_handlers::delete_subtask_handler),
            )
            .service(
                web::scope("/projects")
                    .service(project_handlers::create_project_handler)
                    .service(project_handlers::list_projects_handler)
                    .service(project_handlers::add_project_members_handler)
                    .service(project_handlers::remove_project_member_handler)
                    .service(project_handlers::get_project_handler)
                    .service(project_handlers::update_project_handler)
                    .service(project_handlers::delete_project_handler),
            )
            .service(
                web::scope("/manager-projects")
                    .service(manager_project_handlers::list_managed_projects_handler)
                    .service(manager_project_handlers::get_managed_project_handler),
            )
            .service(
                web::scope("/hr")
                    .service(hr_handlers::list_employees_handler)
                    .service(hr_handlers::create_employee_handler)
                    .service(hr_handlers::update_employee_handler)
                    .service(hr_handlers::list_departments_handler)
                    .service(hr_handlers::hr_workload_handler),
            )
            .service(
                web::scope("/users")
                    .service(user_handlers::list_users_handler)
                    .service(user_handlers::list_department_users_handler)
                    .service(user_handlers::get_user_handler),
            )
            .service(
                web::scope("/notification")
                    .service(notification_handlers::list_notifications_handler)
                    .service(notification_handlers::unread_count_handler)
                    .service(notification_handlers::mark_all_read_handler)
                    .service(notification_handlers::check_deadlines_handler)
                    .service(notification_handlers::mark_read_handler)
                    .service(notification_handlers::delete_notification_handler),
            )
            .service(
                web::scope("/director")
                    .service(director_handlers::company_overview_handler)
                    .service(director_handlers::department_stats_handler)
                    .service(director_handlers::workload_handler)
                    .service(director_handlers::collaboration_handler)
                    .service(director_handlers::task_trends_handler),
            )
            .service(
                web::scope("/department-teams")
                    .service(department_team_handlers::list_department_teams_handler)
                    .service(department_team_handlers::create_department_team_handler)
                    .service(department_team_handlers::get_department_team_handler)
                    .service(department_team_handlers::update_department_team_handler)
                    .service(department_team_handlers::delete_department_team_handler),
            )
            .service(
                web::scope("/report")
                    .service(report_handlers::task_report_handler)
                    .service(report_handlers::department_report_handler),
            )
    })
    .bind(bind_address)?
    .run()
    .await
}
