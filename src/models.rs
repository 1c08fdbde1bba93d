use crate::schema::{department_teams, notifications, projects, subtasks, tasks, users};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Deserializer, Serialize}; // Deserializer est nécessaire pour deserialize_with
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// --- Fonctions Helper pour la Désérialisation des Champs Optionnels/Nullables ---
// Absent -> None, JSON null -> Some(None), valeur -> Some(Some(v))

fn deserialize_opt_opt_string<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer) {
        Ok(Some(s)) => Ok(Some(Some(s))),
        Ok(None) => Ok(Some(None)),
        Err(e) => Err(e),
    }
}

fn deserialize_opt_opt_uuid<'de, D>(deserializer: D) -> Result<Option<Option<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Uuid>::deserialize(deserializer) {
        Ok(Some(u)) => Ok(Some(Some(u))),
        Ok(None) => Ok(Some(None)),
        Err(e) => Err(e),
    }
}

fn deserialize_opt_opt_naivedate<'de, D>(
    deserializer: D,
) -> Result<Option<Option<NaiveDate>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NaiveDate>::deserialize(deserializer) {
        Ok(Some(d)) => Ok(Some(Some(d))),
        Ok(None) => Ok(Some(None)),
        Err(e) => Err(e),
    }
}

fn deserialize_opt_opt_i32<'de, D>(deserializer: D) -> Result<Option<Option<i32>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<i32>::deserialize(deserializer) {
        Ok(Some(i)) => Ok(Some(Some(i))),
        Ok(None) => Ok(Some(None)),
        Err(e) => Err(e),
    }
}

// --- Valeurs textuelles stockées en base ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Staff,
    Manager,
    Hr,
    Director,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Staff => "staff",
            Role::Manager => "manager",
            Role::Hr => "hr",
            Role::Director => "director",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "staff" => Ok(Role::Staff),
            "manager" => Ok(Role::Manager),
            "hr" => Ok(Role::Hr),
            "director" => Ok(Role::Director),
            other => Err(format!(
                "Invalid role: {}. Supported: staff, manager, hr, director",
                other
            )),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Unassigned,
    Ongoing,
    UnderReview,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Unassigned => "unassigned",
            TaskStatus::Ongoing => "ongoing",
            TaskStatus::UnderReview => "under_review",
            TaskStatus::Completed => "completed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "unassigned" => Ok(TaskStatus::Unassigned),
            "ongoing" => Ok(TaskStatus::Ongoing),
            "under_review" => Ok(TaskStatus::UnderReview),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!(
                "Invalid task status: {}. Supported: unassigned, ongoing, under_review, completed",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    Completed,
}

impl SubtaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubtaskStatus::Pending => "pending",
            SubtaskStatus::Completed => "completed",
        }
    }
}

impl FromStr for SubtaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(SubtaskStatus::Pending),
            "completed" => Ok(SubtaskStatus::Completed),
            other => Err(format!(
                "Invalid subtask status: {}. Supported: pending, completed",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Completed,
    OnHold,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Completed => "completed",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Archived => "archived",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "active" => Ok(ProjectStatus::Active),
            "completed" => Ok(ProjectStatus::Completed),
            "on_hold" => Ok(ProjectStatus::OnHold),
            "archived" => Ok(ProjectStatus::Archived),
            other => Err(format!(
                "Invalid project status: {}. Supported: active, completed, on_hold, archived",
                other
            )),
        }
    }
}

// --- User Model ---
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub emp_id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub department: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Ce que l'API renvoie pour un utilisateur, sans le hash du mot de passe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub emp_id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub department: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id,
            emp_id: user.emp_id,
            name: user.name,
            email: user.email,
            role: user.role,
            department: user.department,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

// Vue annuaire : suffisant pour choisir des collaborateurs.
#[derive(Queryable, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub emp_id: String,
    pub name: String,
    pub role: String,
    pub department: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub emp_id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub department: String,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = users)]
pub struct UpdateUserChangeset {
    pub name: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub is_active: Option<bool>,
    pub password_hash: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

// --- Project Model ---
#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = projects)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub members: Vec<String>,
    pub status: String,
    pub department: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = projects)]
pub struct NewProject {
    pub title: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub members: Vec<String>,
    pub status: String,
    pub department: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = projects)]
pub struct UpdateProjectChangeset {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub members: Option<Vec<String>>,
    pub status: Option<String>,
    pub department: Option<Option<String>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub updated_at: Option<DateTime<Utc>>,
}

// --- Task Model (Diesel Queryable) ---
// Cette struct est pour interagir avec la DB. Elle ne contient pas les sous-tâches.
#[derive(
    Queryable, Selectable, Identifiable, Associations, Serialize, Deserialize, Debug, Clone, PartialEq,
)]
#[diesel(table_name = tasks)]
#[diesel(belongs_to(Project, foreign_key = project_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: i32,
    pub due_date: Option<NaiveDate>,
    pub owner_id: Uuid,
    pub collaborators: Vec<String>,
    pub project_id: Option<Uuid>,
    pub is_recurring: bool,
    pub recurrence_type: Option<String>,
    pub recurrence_interval: Option<i32>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub parent_task_id: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed.as_str()
    }

    // Racine de la série de récurrence à laquelle appartient la tâche.
    pub fn series_root(&self) -> Uuid {
        self.parent_task_id.unwrap_or(self.id)
    }
}

// C'est ce que le frontend reçoit pour une tâche.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TaskApiResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: i32,
    pub due_date: Option<NaiveDate>,
    pub owner_id: Uuid,
    pub collaborators: Vec<String>,
    pub project_id: Option<Uuid>,
    pub is_recurring: bool,
    pub recurrence_type: Option<String>,
    pub recurrence_interval: Option<i32>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub parent_task_id: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub subtasks: Vec<Subtask>,
}

// Les sous-tâches sont ajoutées séparément par le handler.
impl From<Task> for TaskApiResponse {
    fn from(task_db: Task) -> Self {
        TaskApiResponse {
            id: task_db.id,
            title: task_db.title,
            description: task_db.description,
            status: task_db.status,
            priority: task_db.priority,
            due_date: task_db.due_date,
            owner_id: task_db.owner_id,
            collaborators: task_db.collaborators,
            project_id: task_db.project_id,
            is_recurring: task_db.is_recurring,
            recurrence_type: task_db.recurrence_type,
            recurrence_interval: task_db.recurrence_interval,
            recurrence_end_date: task_db.recurrence_end_date,
            parent_task_id: task_db.parent_task_id,
            completed_at: task_db.completed_at,
            created_at: task_db.created_at,
            updated_at: task_db.updated_at,
            subtasks: Vec::new(),
        }
    }
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = tasks)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: i32,
    pub due_date: Option<NaiveDate>,
    pub owner_id: Uuid,
    pub collaborators: Vec<String>,
    pub project_id: Option<Uuid>,
    pub is_recurring: bool,
    pub recurrence_type: Option<String>,
    pub recurrence_interval: Option<i32>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub parent_task_id: Option<Uuid>,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = tasks)]
pub struct UpdateTaskChangeset {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<String>,
    pub priority: Option<i32>,
    pub due_date: Option<Option<NaiveDate>>,
    pub collaborators: Option<Vec<String>>,
    pub project_id: Option<Option<Uuid>>,
    pub is_recurring: Option<bool>,
    pub recurrence_type: Option<Option<String>>,
    pub recurrence_interval: Option<Option<i32>>,
    pub recurrence_end_date: Option<Option<NaiveDate>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub updated_at: Option<DateTime<Utc>>,
}

// --- Subtask Model ---
#[derive(
    Queryable, Selectable, Identifiable, Associations, Serialize, Deserialize, Debug, Clone, PartialEq,
)]
#[diesel(table_name = subtasks)]
#[diesel(belongs_to(Task))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Subtask {
    pub id: Uuid,
    pub task_id: Uuid,
    pub title: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = subtasks)]
pub struct NewSubtask {
    pub task_id: Uuid,
    pub title: String,
    pub status: String,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = subtasks)]
pub struct UpdateSubtaskChangeset {
    pub title: Option<String>,
    pub status: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

// --- Notification Model ---
#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Notification {
    pub id: Uuid,
    pub emp_id: String,
    pub task_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub emp_id: String,
    pub task_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub type_: String,
}

// --- DepartmentTeam Model ---
#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = department_teams)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DepartmentTeam {
    pub id: Uuid,
    pub department: String,
    pub team_name: String,
    pub manager_emp_id: Option<String>,
    pub member_emp_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = department_teams)]
pub struct NewDepartmentTeam {
    pub department: String,
    pub team_name: String,
    pub manager_emp_id: Option<String>,
    pub member_emp_ids: Vec<String>,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = department_teams)]
pub struct UpdateDepartmentTeamChangeset {
    pub team_name: Option<String>,
    pub manager_emp_id: Option<Option<String>>,
    pub member_emp_ids: Option<Vec<String>>,
    pub updated_at: Option<DateTime<Utc>>,
}

// --- PAYLOAD DTOs ---

#[derive(Deserialize, Debug)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct ChangePasswordPayload {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize, Debug)]
pub struct CreateEmployeePayload {
    pub emp_id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub department: String,
}

#[derive(Deserialize, Debug)]
pub struct UpdateEmployeePayload {
    pub name: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Deserialize, Debug)]
pub struct CreateTaskPayload {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<i32>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub collaborators: Vec<String>,
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurrence_type: Option<String>,
    pub recurrence_interval: Option<i32>,
    pub recurrence_end_date: Option<NaiveDate>,
}

#[derive(Deserialize, Debug, Default)]
pub struct UpdateTaskPayload {
    pub title: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_opt_string", default)]
    pub description: Option<Option<String>>,
    pub status: Option<String>,
    pub priority: Option<i32>,
    #[serde(deserialize_with = "deserialize_opt_opt_naivedate", default)]
    pub due_date: Option<Option<NaiveDate>>,
    pub collaborators: Option<Vec<String>>,
    #[serde(deserialize_with = "deserialize_opt_opt_uuid", default)]
    pub project_id: Option<Option<Uuid>>,
    pub is_recurring: Option<bool>,
    #[serde(deserialize_with = "deserialize_opt_opt_string", default)]
    pub recurrence_type: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_opt_opt_i32", default)]
    pub recurrence_interval: Option<Option<i32>>,
    #[serde(deserialize_with = "deserialize_opt_opt_naivedate", default)]
    pub recurrence_end_date: Option<Option<NaiveDate>>,
}

#[derive(Deserialize, Debug)]
pub struct CreateSubtaskPayload {
    pub task_id: Uuid,
    pub title: String,
}

#[derive(Deserialize, Debug)]
pub struct UpdateSubtaskPayload {
    pub title: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CreateProjectPayload {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
    pub status: Option<String>,
    pub department: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateProjectPayload {
    pub title: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_opt_string", default)]
    pub description: Option<Option<String>>,
    pub status: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_opt_string", default)]
    pub department: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_opt_opt_naivedate", default)]
    pub due_date: Option<Option<NaiveDate>>,
}

#[derive(Deserialize, Debug)]
pub struct ProjectMembersPayload {
    pub emp_ids: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct CreateDepartmentTeamPayload {
    pub department: String,
    pub team_name: String,
    pub manager_emp_id: Option<String>,
    #[serde(default)]
    pub member_emp_ids: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateDepartmentTeamPayload {
    pub team_name: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_opt_string", default)]
    pub manager_emp_id: Option<Option<String>>,
    pub member_emp_ids: Option<Vec<String>>,
}

// --- Pagination DTOs ---
#[derive(Serialize, Debug)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total_items: i64,
    pub total_pages: i64,
    pub page: i64,
    pub per_page: i64,
}

// DTO pour les paramètres de requête des analytics et rapports
#[derive(Deserialize, Debug, Default)]
pub struct AnalyticsQueryPeriod {
    // Ex: "this_week", "last_7_days", "this_month", "last_30_days", ou des dates spécifiques
    pub period: Option<String>,
    pub start_date: Option<NaiveDate>, // YYYY-MM-DD
    pub end_date: Option<NaiveDate>,   // YYYY-MM-DD
}

#[derive(Deserialize, Debug, Default)]
pub struct DepartmentFilter {
    pub department: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_payload_distinguishes_null_from_absent() {
        let payload: UpdateTaskPayload =
            serde_json::from_str(r#"{"description": null, "title": "x"}"#).unwrap();
        assert_eq!(payload.description, Some(None));
        assert_eq!(payload.due_date, None);
        assert_eq!(payload.title.as_deref(), Some("x"));

        let payload: UpdateTaskPayload =
            serde_json::from_str(r#"{"due_date": "2025-03-01", "recurrence_interval": 2}"#)
                .unwrap();
        assert_eq!(
            payload.due_date,
            Some(Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()))
        );
        assert_eq!(payload.recurrence_interval, Some(Some(2)));
    }

    #[test]
    fn enums_parse_their_stored_form() {
        for role in [Role::Staff, Role::Manager, Role::Hr, Role::Director] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("Director".parse::<Role>().unwrap(), Role::Director);
        assert!("admin".parse::<Role>().is_err());
        assert_eq!(
            "under_review".parse::<TaskStatus>().unwrap(),
            TaskStatus::UnderReview
        );
        assert!("done".parse::<TaskStatus>().is_err());
        assert!("paused".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn notification_serializes_type_field() {
        let notification = Notification {
            id: Uuid::nil(),
            emp_id: "E001".to_string(),
            task_id: None,
            project_id: None,
            title: "Task due today".to_string(),
            description: "Report".to_string(),
            type_: "deadline".to_string(),
            read: false,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], "deadline");
        assert!(value.get("type_").is_none());
    }
}
