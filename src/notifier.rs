use crate::models::{NewNotification, Project, Task};
use crate::schema::notifications;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

pub const TYPE_DEADLINE: &str = "deadline";
pub const TYPE_TASK_ASSIGNED: &str = "task_assigned";
pub const TYPE_PROJECT_ADDED: &str = "project_added";

// 6 paramètres par ligne, PostgreSQL en accepte 65 535 par requête
pub const INSERT_CHUNK_ROWS: usize = 1000;

// Les doublons (task_id, emp_id, type, title) sont ignorés ; renvoie le nombre de lignes créées
pub async fn insert_notifications(
    conn: &mut AsyncPgConnection,
    rows: &[NewNotification],
) -> Result<usize, diesel::result::Error> {
    let mut created = 0;
    for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
        created += diesel::insert_into(notifications::table)
            .values(chunk)
            .on_conflict_do_nothing()
            .execute(conn)
            .await?;
    }
    Ok(created)
}

pub async fn unread_count(
    conn: &mut AsyncPgConnection,
    emp: &str,
) -> Result<i64, diesel::result::Error> {
    notifications::table
        .filter(notifications::emp_id.eq(emp))
        .filter(notifications::read.eq(false))
        .count()
        .get_result::<i64>(conn)
        .await
}

pub fn task_assigned(task: &Task, assigned_by: &str, recipients: &[String]) -> Vec<NewNotification> {
    recipients
        .iter()
        .filter(|emp| emp.as_str() != assigned_by)
        .map(|emp| NewNotification {
            emp_id: emp.clone(),
            task_id: Some(task.id),
            project_id: task.project_id,
            title: "New task assigned".to_string(),
            description: format!("{} added you to the task \"{}\"", assigned_by, task.title),
            type_: TYPE_TASK_ASSIGNED.to_string(),
        })
        .collect()
}

pub fn project_added(project: &Project, added_by: &str, recipients: &[String]) -> Vec<NewNotification> {
    recipients
        .iter()
        .filter(|emp| emp.as_str() != added_by)
        .map(|emp| NewNotification {
            emp_id: emp.clone(),
            task_id: None,
            project_id: Some(project.id),
            title: "Added to project".to_string(),
            description: format!("{} added you to the project \"{}\"", added_by, project.title),
            type_: TYPE_PROJECT_ADDED.to_string(),
        })
        .collect()
}

// Nouveaux venus de `next`, dans l'ordre et sans doublon
pub fn newly_added(previous: &[String], next: &[String]) -> Vec<String> {
    let mut added: Vec<String> = Vec::new();
    for emp in next {
        if !previous.contains(emp) && !added.contains(emp) {
            added.push(emp.clone());
        }
    }
    added
}
