pub mod auth_handlers;
pub mod department_team_handlers;
pub mod director_handlers;
pub mod hr_handlers;
pub mod manager_project_handlers;
pub mod notification_handlers;
pub mod project_handlers;
pub mod report_handlers;
pub mod subtask_handlers;
pub mod task_handlers;
pub mod user_handlers;
