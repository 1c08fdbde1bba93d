use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::{NewNotification, Task, TaskStatus};
use crate::notifier::{self, TYPE_DEADLINE};
use crate::schema::{tasks, users};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use std::collections::HashMap;
use std::time::Duration as StdDuration;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineStage {
    DueTomorrow,
    DueToday,
    Overdue,
}

impl DeadlineStage {
    pub fn classify(due: NaiveDate, today: NaiveDate) -> Option<Self> {
        if due < today {
            Some(DeadlineStage::Overdue)
        } else if due == today {
            Some(DeadlineStage::DueToday)
        } else if Some(due) == today.succ_opt() {
            Some(DeadlineStage::DueTomorrow)
        } else {
            None
        }
    }

    // Le titre fait partie de la contrainte d'unicité : une alerte par étape.
    pub fn title(&self) -> &'static str {
        match self {
            DeadlineStage::DueTomorrow => "Task due tomorrow",
            DeadlineStage::DueToday => "Task due today",
            DeadlineStage::Overdue => "Task overdue",
        }
    }

    fn describe(&self, task_title: &str, due: NaiveDate) -> String {
        match self {
            DeadlineStage::DueTomorrow => format!("\"{}\" is due tomorrow ({})", task_title, due),
            DeadlineStage::DueToday => format!("\"{}\" is due today", task_title),
            DeadlineStage::Overdue => format!("\"{}\" was due on {}", task_title, due),
        }
    }
}

// Propriétaire puis collaborateurs, une fois chacun
pub fn deadline_notifications(task: &Task, owner_emp_id: &str, today: NaiveDate) -> Vec<NewNotification> {
    if task.is_completed() {
        return Vec::new();
    }
    let due = match task.due_date {
        Some(due) => due,
        None => return Vec::new(),
    };
    let stage = match DeadlineStage::classify(due, today) {
        Some(stage) => stage,
        None => return Vec::new(),
    };

    let mut recipients: Vec<&str> = vec![owner_emp_id];
    for collaborator in &task.collaborators {
        if !recipients.contains(&collaborator.as_str()) {
            recipients.push(collaborator);
        }
    }

    recipients
        .into_iter()
        .map(|emp| NewNotification {
            emp_id: emp.to_string(),
            task_id: Some(task.id),
            project_id: task.project_id,
            title: stage.title().to_string(),
            description: stage.describe(&task.title, due),
            type_: TYPE_DEADLINE.to_string(),
        })
        .collect()
}

// Limite par employé des vérifications à la demande
pub struct DeadlineCooldown {
    period: Duration,
    last_checks: RwLock<HashMap<String, DateTime<Utc>>>,
}

// Créneau réservé par `try_begin`, à rendre avec `release` si la vérification échoue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckSlot {
    pub next_check_at: DateTime<Utc>,
    claimed_at: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
}

impl DeadlineCooldown {
    pub fn new(period_secs: i64) -> Self {
        DeadlineCooldown {
            period: Duration::seconds(period_secs.max(0)),
            last_checks: RwLock::new(HashMap::new()),
        }
    }

    // Err porte l'instant à partir duquel une nouvelle vérification est permise
    pub async fn try_begin(
        &self,
        emp_id: &str,
        now: DateTime<Utc>,
        force: bool,
    ) -> Result<CheckSlot, DateTime<Utc>> {
        let mut last_checks = self.last_checks.write().await;
        let previous = last_checks.get(emp_id).copied();
        if !force {
            if let Some(last) = previous {
                let next_allowed = last + self.period;
                if now < next_allowed {
                    return Err(next_allowed);
                }
            }
        }
        last_checks.insert(emp_id.to_string(), now);
        Ok(CheckSlot {
            next_check_at: now + self.period,
            claimed_at: now,
            previous,
        })
    }

    // Remet l'entrée précédente, sauf si une autre vérification a réservé entre-temps
    pub async fn release(&self, emp_id: &str, slot: CheckSlot) {
        let mut last_checks = self.last_checks.write().await;
        if last_checks.get(emp_id) != Some(&slot.claimed_at) {
            return;
        }
        match slot.previous {
            Some(previous) => {
                last_checks.insert(emp_id.to_string(), previous);
            }
            None => {
                last_checks.remove(emp_id);
            }
        }
    }
}

// Ne crée que les notifications de l'employé lui-même
pub async fn check_for_employee(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    emp: &str,
    today: NaiveDate,
) -> Result<usize, ServiceError> {
    let horizon = today.succ_opt().unwrap_or(today);
    let candidate_tasks = tasks::table
        .filter(
            tasks::owner_id
                .eq(user_id)
                .or(tasks::collaborators.contains(vec![emp.to_string()])),
        )
        .filter(tasks::status.ne(TaskStatus::Completed.as_str()))
        .filter(tasks::due_date.le(horizon))
        .select(Task::as_select())
        .load::<Task>(conn)
        .await?;

    let owners = owner_emp_ids(conn, &candidate_tasks).await?;
    let rows: Vec<NewNotification> = candidate_tasks
        .iter()
        .filter_map(|task| owners.get(&task.owner_id).map(|owner| (task, owner)))
        .flat_map(|(task, owner)| deadline_notifications(task, owner, today))
        .filter(|row| row.emp_id == emp)
        .collect();

    let created = notifier::insert_notifications(conn, &rows).await?;
    log::debug!(
        "Deadline check for {}: {} candidate tasks, {} new notifications",
        emp,
        candidate_tasks.len(),
        created
    );
    Ok(created)
}

pub async fn sweep_all(pool: &DbPool, today: NaiveDate) -> Result<usize, ServiceError> {
    let mut conn = pool.get().await?;
    let horizon = today.succ_opt().unwrap_or(today);

    let candidate_tasks = tasks::table
        .filter(tasks::status.ne(TaskStatus::Completed.as_str()))
        .filter(tasks::due_date.le(horizon))
        .select(Task::as_select())
        .load::<Task>(&mut conn)
        .await?;

    let owners = owner_emp_ids(&mut conn, &candidate_tasks).await?;
    let rows: Vec<NewNotification> = candidate_tasks
        .iter()
        .filter_map(|task| owners.get(&task.owner_id).map(|owner| (task, owner)))
        .flat_map(|(task, owner)| deadline_notifications(task, owner, today))
        .collect();

    Ok(notifier::insert_notifications(&mut conn, &rows).await?)
}

pub fn spawn_deadline_sweeper(pool: DbPool, interval_secs: u64) {
    if interval_secs == 0 {
        log::info!("Periodic deadline sweep disabled");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(StdDuration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            match sweep_all(&pool, Utc::now().date_naive()).await {
                Ok(0) => log::debug!("Deadline sweep found nothing new"),
                Ok(created) => log::info!("Deadline sweep created {} notifications", created),
                Err(e) => log::error!("Deadline sweep failed: {}", e),
            }
        }
    });
}

async fn owner_emp_ids(
    conn: &mut AsyncPgConnection,
    task_list: &[Task],
) -> Result<HashMap<Uuid, String>, diesel::result::Error> {
    let mut owner_ids: Vec<Uuid> = task_list.iter().map(|t| t.owner_id).collect();
    owner_ids.sort();
    owner_ids.dedup();
    if owner_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let pairs = users::table
        .filter(users::id.eq_any(owner_ids))
        .select((users::id, users::emp_id))
        .load::<(Uuid, String)>(conn)
        .await?;
    Ok(pairs.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn task_due(due: Option<NaiveDate>, status: &str, collaborators: &[&str]) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: "Prepare audit".to_string(),
            description: None,
            status: status.to_string(),
            priority: 5,
            due_date: due,
            owner_id: Uuid::new_v4(),
            collaborators: collaborators.iter().map(|c| c.to_string()).collect(),
            project_id: None,
            is_recurring: false,
            recurrence_type: None,
            recurrence_interval: None,
            recurrence_end_date: None,
            parent_task_id: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn classifies_relative_to_today() {
        let today = date(2025, 3, 31);
        assert_eq!(
            DeadlineStage::classify(date(2025, 4, 1), today),
            Some(DeadlineStage::DueTomorrow)
        );
        assert_eq!(
            DeadlineStage::classify(today, today),
            Some(DeadlineStage::DueToday)
        );
        assert_eq!(
            DeadlineStage::classify(date(2025, 1, 2), today),
            Some(DeadlineStage::Overdue)
        );
        assert_eq!(DeadlineStage::classify(date(2025, 4, 2), today), None);
    }

    #[test]
    fn notifies_owner_and_each_collaborator_once() {
        let today = date(2025, 3, 10);
        let task = task_due(Some(today), "ongoing", &["E2", "E3", "E2", "E1"]);
        let rows = deadline_notifications(&task, "E1", today);

        let recipients: Vec<&str> = rows.iter().map(|r| r.emp_id.as_str()).collect();
        assert_eq!(recipients, vec!["E1", "E2", "E3"]);
        assert!(rows.iter().all(|r| r.title == "Task due today"));
        assert!(rows.iter().all(|r| r.type_ == TYPE_DEADLINE));
        assert!(rows.iter().all(|r| r.task_id == Some(task.id)));
    }

    #[test]
    fn completed_undated_and_distant_tasks_are_skipped() {
        let today = date(2025, 3, 10);
        assert!(deadline_notifications(&task_due(Some(today), "completed", &[]), "E1", today)
            .is_empty());
        assert!(deadline_notifications(&task_due(None, "ongoing", &[]), "E1", today).is_empty());
        assert!(
            deadline_notifications(&task_due(Some(date(2025, 3, 20)), "ongoing", &[]), "E1", today)
                .is_empty()
        );
    }

    #[test]
    fn same_stage_produces_identical_dedup_keys() {
        let today = date(2025, 3, 10);
        let task = task_due(Some(date(2025, 3, 1)), "under_review", &[]);
        let first = deadline_notifications(&task, "E1", today);
        let second = deadline_notifications(&task, "E1", today.succ_opt().unwrap());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn cooldown_blocks_until_period_elapses_unless_forced() {
        let cooldown = DeadlineCooldown::new(300);
        let start = Utc::now();

        assert_eq!(
            cooldown
                .try_begin("E1", start, false)
                .await
                .map(|slot| slot.next_check_at),
            Ok(start + Duration::seconds(300))
        );
        let blocked = cooldown
            .try_begin("E1", start + Duration::seconds(60), false)
            .await;
        assert_eq!(blocked, Err(start + Duration::seconds(300)));

        // Les autres employés ne sont pas concernés
        assert!(cooldown.try_begin("E2", start, false).await.is_ok());

        let forced = start + Duration::seconds(61);
        assert!(cooldown.try_begin("E1", forced, true).await.is_ok());
        assert!(cooldown
            .try_begin("E1", forced + Duration::seconds(299), false)
            .await
            .is_err());
        assert!(cooldown
            .try_begin("E1", forced + Duration::seconds(300), false)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn released_slot_does_not_count_against_the_employee() {
        let cooldown = DeadlineCooldown::new(300);
        let start = Utc::now();

        let slot = cooldown.try_begin("E1", start, false).await.unwrap();
        cooldown.release("E1", slot).await;
        assert!(cooldown
            .try_begin("E1", start + Duration::seconds(1), false)
            .await
            .is_ok());

        // Un échec forcé ne fait que rendre la réservation précédente
        let forced = cooldown
            .try_begin("E1", start + Duration::seconds(10), true)
            .await
            .unwrap();
        cooldown.release("E1", forced).await;
        assert_eq!(
            cooldown
                .try_begin("E1", start + Duration::seconds(20), false)
                .await
                .map(|slot| slot.next_check_at),
            Err(start + Duration::seconds(301))
        );
    }
}
