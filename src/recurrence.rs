use crate::models::{NewTask, Task, TaskStatus};
use chrono::{Datelike, Duration, Months, NaiveDate};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurrenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceType::Daily => "daily",
            RecurrenceType::Weekly => "weekly",
            RecurrenceType::Monthly => "monthly",
            RecurrenceType::Yearly => "yearly",
        }
    }
}

impl FromStr for RecurrenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "daily" => Ok(RecurrenceType::Daily),
            "weekly" => Ok(RecurrenceType::Weekly),
            "monthly" => Ok(RecurrenceType::Monthly),
            "yearly" => Ok(RecurrenceType::Yearly),
            other => Err(format!(
                "Invalid recurrence type: {}. Supported: daily, weekly, monthly, yearly",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub kind: RecurrenceType,
    pub interval: u32,
    pub end_date: Option<NaiveDate>,
}

impl RecurrenceRule {
    // Ok(None) pour une tâche non récurrente ; sinon type, due_date, intervalle >= 1
    // et date de fin >= due_date sont exigés
    pub fn from_parts(
        is_recurring: bool,
        recurrence_type: Option<&str>,
        interval: Option<i32>,
        end_date: Option<NaiveDate>,
        due_date: Option<NaiveDate>,
    ) -> Result<Option<Self>, String> {
        if !is_recurring {
            return Ok(None);
        }

        let kind = recurrence_type
            .ok_or_else(|| "recurrence_type is required for a recurring task".to_string())?
            .parse::<RecurrenceType>()?;

        let interval = interval.unwrap_or(1);
        if interval < 1 {
            return Err("recurrence_interval must be at least 1".to_string());
        }

        let due = due_date.ok_or_else(|| "a recurring task needs a due_date".to_string())?;
        if let Some(end) = end_date {
            if end < due {
                return Err("recurrence_end_date cannot be before due_date".to_string());
            }
        }

        Ok(Some(RecurrenceRule {
            kind,
            interval: interval as u32,
            end_date,
        }))
    }

    pub fn of_task(task: &Task) -> Result<Option<Self>, String> {
        Self::from_parts(
            task.is_recurring,
            task.recurrence_type.as_deref(),
            task.recurrence_interval,
            task.recurrence_end_date,
            task.due_date,
        )
    }

    // `anchor_day` est le jour du mois de la première occurrence de la série :
    // 31 jan, 28 fév, 31 mar plutôt que 31 jan, 28 fév, 28 mar
    pub fn next_due_date(&self, due: NaiveDate, anchor_day: u32) -> Option<NaiveDate> {
        let next = match self.kind {
            RecurrenceType::Daily => due.checked_add_signed(Duration::days(self.interval as i64)),
            RecurrenceType::Weekly => {
                due.checked_add_signed(Duration::weeks(self.interval as i64))
            }
            RecurrenceType::Monthly => due
                .checked_add_months(Months::new(self.interval))
                .map(|d| on_anchor_day(d, anchor_day)),
            RecurrenceType::Yearly => due
                .checked_add_months(Months::new(self.interval.checked_mul(12)?))
                .map(|d| on_anchor_day(d, anchor_day)),
        }?;

        match self.end_date {
            Some(end) if next > end => None,
            _ => Some(next),
        }
    }
}

// Jour d'ancrage, ou le dernier jour du mois quand il n'existe pas (29-31)
fn on_anchor_day(date: NaiveDate, anchor_day: u32) -> NaiveDate {
    (1..=anchor_day)
        .rev()
        .find_map(|day| date.with_day(day))
        .unwrap_or(date)
}

// Copie de la tâche terminée, repartie en `ongoing` et rattachée à la racine de
// la série. `series_start` est l'échéance de la racine. Les sous-tâches ne suivent pas.
pub fn next_instance(task: &Task, series_start: Option<NaiveDate>) -> Option<NewTask> {
    let rule = match RecurrenceRule::of_task(task) {
        Ok(Some(rule)) => rule,
        Ok(None) => return None,
        Err(reason) => {
            log::warn!("Task {} has inconsistent recurrence: {}", task.id, reason);
            return None;
        }
    };

    let due = task.due_date?;
    let anchor_day = series_start.unwrap_or(due).day();
    let next_due = rule.next_due_date(due, anchor_day)?;

    Some(NewTask {
        title: task.title.clone(),
        description: task.description.clone(),
        status: TaskStatus::Ongoing.as_str().to_string(),
        priority: task.priority,
        due_date: Some(next_due),
        owner_id: task.owner_id,
        collaborators: task.collaborators.clone(),
        project_id: task.project_id,
        is_recurring: true,
        recurrence_type: Some(rule.kind.as_str().to_string()),
        recurrence_interval: Some(rule.interval as i32),
        recurrence_end_date: rule.end_date,
        parent_task_id: Some(task.series_root()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn recurring_task(kind: &str, interval: i32, due: NaiveDate, end: Option<NaiveDate>) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: "Weekly sync notes".to_string(),
            description: Some("Share with the team".to_string()),
            status: "completed".to_string(),
            priority: 3,
            due_date: Some(due),
            owner_id: Uuid::new_v4(),
            collaborators: vec!["E002".to_string()],
            project_id: None,
            is_recurring: true,
            recurrence_type: Some(kind.to_string()),
            recurrence_interval: Some(interval),
            recurrence_end_date: end,
            parent_task_id: None,
            completed_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn steps_by_each_recurrence_type() {
        let rule = |kind, interval| RecurrenceRule {
            kind,
            interval,
            end_date: None,
        };
        let due = date(2025, 1, 31);
        assert_eq!(
            rule(RecurrenceType::Daily, 3).next_due_date(due, 31),
            Some(date(2025, 2, 3))
        );
        assert_eq!(
            rule(RecurrenceType::Weekly, 2).next_due_date(due, 31),
            Some(date(2025, 2, 14))
        );
        assert_eq!(
            rule(RecurrenceType::Monthly, 1).next_due_date(due, 31),
            Some(date(2025, 2, 28))
        );
        assert_eq!(
            rule(RecurrenceType::Yearly, 1).next_due_date(date(2024, 2, 29), 29),
            Some(date(2025, 2, 28))
        );
    }

    #[test]
    fn month_end_series_keep_their_anchor_day() {
        let monthly = RecurrenceRule {
            kind: RecurrenceType::Monthly,
            interval: 1,
            end_date: None,
        };
        assert_eq!(
            monthly.next_due_date(date(2025, 2, 28), 31),
            Some(date(2025, 3, 31))
        );
        assert_eq!(
            monthly.next_due_date(date(2025, 3, 31), 31),
            Some(date(2025, 4, 30))
        );
        assert_eq!(
            monthly.next_due_date(date(2025, 4, 30), 30),
            Some(date(2025, 5, 30))
        );

        let yearly = RecurrenceRule {
            kind: RecurrenceType::Yearly,
            interval: 1,
            end_date: None,
        };
        assert_eq!(
            yearly.next_due_date(date(2027, 2, 28), 29),
            Some(date(2028, 2, 29))
        );

        // Le jour d'ancrage vient de la racine, pas de l'occurrence terminée
        let root = recurring_task("monthly", 1, date(2025, 1, 31), None);
        let february = Task {
            parent_task_id: Some(root.id),
            ..recurring_task("monthly", 1, date(2025, 2, 28), None)
        };
        let march = next_instance(&february, root.due_date).unwrap();
        assert_eq!(march.due_date, Some(date(2025, 3, 31)));
    }

    #[test]
    fn stops_after_end_date() {
        let rule = RecurrenceRule {
            kind: RecurrenceType::Weekly,
            interval: 1,
            end_date: Some(date(2025, 3, 10)),
        };
        assert_eq!(rule.next_due_date(date(2025, 3, 3), 3), Some(date(2025, 3, 10)));
        assert_eq!(rule.next_due_date(date(2025, 3, 10), 3), None);
    }

    #[test]
    fn validation_rejects_incomplete_rules() {
        let due = Some(date(2025, 5, 1));
        assert_eq!(RecurrenceRule::from_parts(false, None, None, None, None), Ok(None));
        assert!(RecurrenceRule::from_parts(true, None, None, None, due).is_err());
        assert!(RecurrenceRule::from_parts(true, Some("hourly"), None, None, due).is_err());
        assert!(RecurrenceRule::from_parts(true, Some("daily"), Some(0), None, due).is_err());
        assert!(RecurrenceRule::from_parts(true, Some("daily"), None, None, None).is_err());
        assert!(RecurrenceRule::from_parts(
            true,
            Some("daily"),
            None,
            Some(date(2025, 4, 1)),
            due
        )
        .is_err());

        let rule = RecurrenceRule::from_parts(true, Some("monthly"), None, None, due)
            .unwrap()
            .unwrap();
        assert_eq!(rule.interval, 1);
    }

    #[test]
    fn next_instance_points_to_series_root() {
        let first = recurring_task("weekly", 1, date(2025, 6, 2), None);
        let next = next_instance(&first, None).unwrap();
        assert_eq!(next.parent_task_id, Some(first.id));
        assert_eq!(next.due_date, Some(date(2025, 6, 9)));
        assert_eq!(next.status, "ongoing");
        assert_eq!(next.collaborators, first.collaborators);

        let root = Uuid::new_v4();
        let second = Task {
            parent_task_id: Some(root),
            ..recurring_task("weekly", 1, date(2025, 6, 9), None)
        };
        assert_eq!(next_instance(&second, None).unwrap().parent_task_id, Some(root));
    }

    #[test]
    fn no_instance_for_plain_or_finished_series() {
        let mut plain = recurring_task("daily", 1, date(2025, 6, 2), None);
        plain.is_recurring = false;
        assert!(next_instance(&plain, None).is_none());

        let last = recurring_task("daily", 1, date(2025, 6, 2), Some(date(2025, 6, 2)));
        assert!(next_instance(&last, None).is_none());
    }
}
