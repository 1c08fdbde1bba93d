//! Reporting arithmetic over users, tasks and projects already loaded from
//! the database. Everything here is pure so the director dashboards, HR
//! workload views and PDF reports share one set of definitions.

use crate::error_handler::ServiceError;
use crate::models::{AnalyticsQueryPeriod, Project, ProjectStatus, Task, TaskStatus, User};
use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

pub const OVERLOADED_THRESHOLD: usize = 8;
pub const OPTIMAL_THRESHOLD: usize = 3;
// Une année bissextile complète au plus
pub const MAX_RANGE_DAYS: i64 = 366;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadLevel {
    Overloaded,
    Optimal,
    Underutilized,
}

impl WorkloadLevel {
    pub fn from_active_count(active_tasks: usize) -> Self {
        if active_tasks >= OVERLOADED_THRESHOLD {
            WorkloadLevel::Overloaded
        } else if active_tasks >= OPTIMAL_THRESHOLD {
            WorkloadLevel::Optimal
        } else {
            WorkloadLevel::Underutilized
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadLevel::Overloaded => "overloaded",
            WorkloadLevel::Optimal => "optimal",
            WorkloadLevel::Underutilized => "underutilized",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmployeeWorkload {
    pub emp_id: String,
    pub name: String,
    pub role: String,
    pub department: String,
    pub active_tasks: usize,
    pub overdue_tasks: usize,
    pub completed_tasks: usize,
    pub workload_level: WorkloadLevel,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct WorkloadDistribution {
    pub overloaded: usize,
    pub optimal: usize,
    pub underutilized: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DepartmentStats {
    pub department: String,
    pub employee_count: usize,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub ongoing_tasks: usize,
    pub under_review_tasks: usize,
    pub overdue_tasks: usize,
    pub completion_rate: f64,
    pub on_time_rate: f64,
    pub productivity_score: f64,
    pub active_projects: usize,
    pub workload: WorkloadDistribution,
    pub average_active_tasks: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PriorityBreakdown {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompanyOverview {
    pub total_employees: usize,
    pub total_departments: usize,
    pub total_tasks: usize,
    pub status_breakdown: BTreeMap<String, usize>,
    pub priority_breakdown: PriorityBreakdown,
    pub overdue_tasks: usize,
    pub completion_rate: f64,
    pub total_projects: usize,
    pub active_projects: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DepartmentPair {
    pub from_department: String,
    pub to_department: String,
    pub tasks: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CollaboratorCount {
    pub emp_id: String,
    pub tasks: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CollaborationMetrics {
    pub total_tasks: usize,
    pub collaborative_tasks: usize,
    pub collaboration_rate: f64,
    pub average_collaborators: f64,
    pub cross_department_tasks: usize,
    pub department_pairs: Vec<DepartmentPair>,
    pub top_collaborators: Vec<CollaboratorCount>,
    pub average_project_members: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub created: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProjectProgress {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub overdue_tasks: usize,
    pub completion_percentage: f64,
}

// Pourcentage arrondi à une décimale, 0 quand le total est nul.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round1(part as f64 * 100.0 / whole as f64)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn is_overdue(task: &Task, today: NaiveDate) -> bool {
    !task.is_completed() && task.due_date.map(|due| due < today).unwrap_or(false)
}

fn is_on_time(task: &Task) -> Option<bool> {
    match (task.due_date, task.completed_at) {
        (Some(due), Some(done)) if task.is_completed() => Some(done.date_naive() <= due),
        _ => None,
    }
}

fn involves(task: &Task, user: &User) -> bool {
    task.owner_id == user.id || task.collaborators.iter().any(|c| c == &user.emp_id)
}

// Score sur 100 : 50% complétion, 30% dans les délais, 20% hors retard
pub fn productivity_score(total: usize, completed: usize, overdue: usize, on_time_rate: f64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let completion = completed as f64 * 100.0 / total as f64;
    let not_overdue = 100.0 - overdue as f64 * 100.0 / total as f64;
    round1(0.5 * completion + 0.3 * on_time_rate + 0.2 * not_overdue)
}

pub fn employee_workloads(users: &[User], tasks: &[Task], today: NaiveDate) -> Vec<EmployeeWorkload> {
    let mut workloads: Vec<EmployeeWorkload> = users
        .iter()
        .filter(|u| u.is_active)
        .map(|user| {
            let mut active = 0;
            let mut overdue = 0;
            let mut completed = 0;
            for task in tasks.iter().filter(|t| involves(t, user)) {
                if task.is_completed() {
                    completed += 1;
                } else {
                    active += 1;
                    if is_overdue(task, today) {
                        overdue += 1;
                    }
                }
            }
            EmployeeWorkload {
                emp_id: user.emp_id.clone(),
                name: user.name.clone(),
                role: user.role.clone(),
                department: user.department.clone(),
                active_tasks: active,
                overdue_tasks: overdue,
                completed_tasks: completed,
                workload_level: WorkloadLevel::from_active_count(active),
            }
        })
        .collect();

    workloads.sort_by(|a, b| {
        b.active_tasks
            .cmp(&a.active_tasks)
            .then_with(|| a.emp_id.cmp(&b.emp_id))
    });
    workloads
}

pub fn workload_distribution(workloads: &[EmployeeWorkload]) -> WorkloadDistribution {
    let mut distribution = WorkloadDistribution::default();
    for workload in workloads {
        match workload.workload_level {
            WorkloadLevel::Overloaded => distribution.overloaded += 1,
            WorkloadLevel::Optimal => distribution.optimal += 1,
            WorkloadLevel::Underutilized => distribution.underutilized += 1,
        }
    }
    distribution
}

fn project_touches_department(project: &Project, department: &str, members: &[&User]) -> bool {
    project.department.as_deref() == Some(department)
        || members.iter().any(|u| project.members.contains(&u.emp_id))
}

pub fn department_stats(
    users: &[User],
    tasks: &[Task],
    projects: &[Project],
    today: NaiveDate,
) -> Vec<DepartmentStats> {
    let department_of: HashMap<Uuid, &str> = users
        .iter()
        .map(|u| (u.id, u.department.as_str()))
        .collect();

    let mut by_department: BTreeMap<&str, Vec<&User>> = BTreeMap::new();
    for user in users.iter().filter(|u| u.is_active) {
        by_department.entry(user.department.as_str()).or_default().push(user);
    }

    by_department
        .into_iter()
        .map(|(department, members)| {
            let department_tasks: Vec<&Task> = tasks
                .iter()
                .filter(|t| department_of.get(&t.owner_id).copied() == Some(department))
                .collect();

            let total = department_tasks.len();
            let completed = department_tasks.iter().filter(|t| t.is_completed()).count();
            let ongoing = department_tasks
                .iter()
                .filter(|t| {
                    t.status == TaskStatus::Ongoing.as_str()
                        || t.status == TaskStatus::Unassigned.as_str()
                })
                .count();
            let under_review = department_tasks
                .iter()
                .filter(|t| t.status == TaskStatus::UnderReview.as_str())
                .count();
            let overdue = department_tasks.iter().filter(|t| is_overdue(t, today)).count();

            let timed: Vec<bool> = department_tasks.iter().filter_map(|t| is_on_time(t)).collect();
            let on_time_rate = percentage(timed.iter().filter(|ok| **ok).count(), timed.len());

            let member_users: Vec<User> = members.iter().map(|u| (*u).clone()).collect();
            let workloads = employee_workloads(&member_users, tasks, today);
            let active_sum: usize = workloads.iter().map(|w| w.active_tasks).sum();

            let active_projects = projects
                .iter()
                .filter(|p| p.status == ProjectStatus::Active.as_str())
                .filter(|p| project_touches_department(p, department, &members))
                .count();

            DepartmentStats {
                department: department.to_string(),
                employee_count: members.len(),
                total_tasks: total,
                completed_tasks: completed,
                ongoing_tasks: ongoing,
                under_review_tasks: under_review,
                overdue_tasks: overdue,
                completion_rate: percentage(completed, total),
                on_time_rate,
                productivity_score: productivity_score(total, completed, overdue, on_time_rate),
                active_projects,
                workload: workload_distribution(&workloads),
                average_active_tasks: if members.is_empty() {
                    0.0
                } else {
                    round1(active_sum as f64 / members.len() as f64)
                },
            }
        })
        .collect()
}

pub fn company_overview(
    users: &[User],
    tasks: &[Task],
    projects: &[Project],
    today: NaiveDate,
) -> CompanyOverview {
    let active_users: Vec<&User> = users.iter().filter(|u| u.is_active).collect();
    let mut departments: Vec<&str> = active_users.iter().map(|u| u.department.as_str()).collect();
    departments.sort_unstable();
    departments.dedup();

    let mut status_breakdown: BTreeMap<String, usize> = [
        TaskStatus::Unassigned,
        TaskStatus::Ongoing,
        TaskStatus::UnderReview,
        TaskStatus::Completed,
    ]
    .iter()
    .map(|s| (s.as_str().to_string(), 0))
    .collect();
    let mut priority_breakdown = PriorityBreakdown::default();
    for task in tasks {
        *status_breakdown.entry(task.status.clone()).or_insert(0) += 1;
        match task.priority {
            8..=i32::MAX => priority_breakdown.high += 1,
            4..=7 => priority_breakdown.medium += 1,
            _ => priority_breakdown.low += 1,
        }
    }

    let completed = tasks.iter().filter(|t| t.is_completed()).count();
    CompanyOverview {
        total_employees: active_users.len(),
        total_departments: departments.len(),
        total_tasks: tasks.len(),
        status_breakdown,
        priority_breakdown,
        overdue_tasks: tasks.iter().filter(|t| is_overdue(t, today)).count(),
        completion_rate: percentage(completed, tasks.len()),
        total_projects: projects.len(),
        active_projects: projects
            .iter()
            .filter(|p| p.status == ProjectStatus::Active.as_str())
            .count(),
    }
}

pub fn collaboration_metrics(users: &[User], tasks: &[Task], projects: &[Project]) -> CollaborationMetrics {
    let department_by_uuid: HashMap<Uuid, &str> = users
        .iter()
        .map(|u| (u.id, u.department.as_str()))
        .collect();
    let department_by_emp: HashMap<&str, &str> = users
        .iter()
        .map(|u| (u.emp_id.as_str(), u.department.as_str()))
        .collect();
    let emp_by_uuid: HashMap<Uuid, &str> = users.iter().map(|u| (u.id, u.emp_id.as_str())).collect();

    let mut collaborative = 0;
    let mut collaborator_total = 0;
    let mut cross_department = 0;
    let mut pairs: BTreeMap<(String, String), usize> = BTreeMap::new();
    let mut per_collaborator: HashMap<&str, usize> = HashMap::new();

    for task in tasks {
        let owner_emp = emp_by_uuid.get(&task.owner_id).copied();
        let mut others: Vec<&str> = task
            .collaborators
            .iter()
            .map(|c| c.as_str())
            .filter(|c| Some(*c) != owner_emp)
            .collect();
        others.sort_unstable();
        others.dedup();
        if others.is_empty() {
            continue;
        }

        collaborative += 1;
        collaborator_total += others.len();
        for emp in &others {
            *per_collaborator.entry(*emp).or_insert(0) += 1;
        }

        let owner_department = match department_by_uuid.get(&task.owner_id) {
            Some(department) => *department,
            None => continue,
        };
        let mut foreign: Vec<&str> = others
            .iter()
            .filter_map(|emp| department_by_emp.get(emp).copied())
            .filter(|department| *department != owner_department)
            .collect();
        foreign.sort_unstable();
        foreign.dedup();
        if !foreign.is_empty() {
            cross_department += 1;
        }
        for department in foreign {
            *pairs
                .entry((owner_department.to_string(), department.to_string()))
                .or_insert(0) += 1;
        }
    }

    let mut department_pairs: Vec<DepartmentPair> = pairs
        .into_iter()
        .map(|((from_department, to_department), count)| DepartmentPair {
            from_department,
            to_department,
            tasks: count,
        })
        .collect();
    department_pairs.sort_by(|a, b| b.tasks.cmp(&a.tasks));

    let mut top_collaborators: Vec<CollaboratorCount> = per_collaborator
        .into_iter()
        .map(|(emp_id, count)| CollaboratorCount {
            emp_id: emp_id.to_string(),
            tasks: count,
        })
        .collect();
    top_collaborators.sort_by(|a, b| b.tasks.cmp(&a.tasks).then_with(|| a.emp_id.cmp(&b.emp_id)));
    top_collaborators.truncate(5);

    let member_total: usize = projects.iter().map(|p| p.members.len()).sum();

    CollaborationMetrics {
        total_tasks: tasks.len(),
        collaborative_tasks: collaborative,
        collaboration_rate: percentage(collaborative, tasks.len()),
        average_collaborators: if collaborative == 0 {
            0.0
        } else {
            round1(collaborator_total as f64 / collaborative as f64)
        },
        cross_department_tasks: cross_department,
        department_pairs,
        top_collaborators,
        average_project_members: if projects.is_empty() {
            0.0
        } else {
            round1(member_total as f64 / projects.len() as f64)
        },
    }
}

pub fn task_trend(tasks: &[Task], start: NaiveDate, end: NaiveDate) -> Vec<TrendPoint> {
    let mut points = Vec::new();
    let mut day = start;
    while day <= end {
        points.push(TrendPoint {
            date: day,
            created: tasks.iter().filter(|t| t.created_at.date_naive() == day).count(),
            completed: tasks
                .iter()
                .filter(|t| t.is_completed())
                .filter(|t| t.completed_at.map(|c| c.date_naive()) == Some(day))
                .count(),
        });
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    points
}

pub fn project_progress(tasks: &[Task], today: NaiveDate) -> ProjectProgress {
    let completed = tasks.iter().filter(|t| t.is_completed()).count();
    ProjectProgress {
        total_tasks: tasks.len(),
        completed_tasks: completed,
        overdue_tasks: tasks.iter().filter(|t| is_overdue(t, today)).count(),
        completion_percentage: percentage(completed, tasks.len()),
    }
}

// Détermine les dates de début et de fin selon la période demandée
pub fn calculate_date_range(
    query_params: &AnalyticsQueryPeriod,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), ServiceError> {
    if let (Some(start), Some(end)) = (query_params.start_date, query_params.end_date) {
        if start > end {
            return Err(ServiceError::BadRequest(
                "start_date cannot be after end_date".to_string(),
            ));
        }
        if (end - start).num_days() >= MAX_RANGE_DAYS {
            return Err(ServiceError::BadRequest(format!(
                "Date range cannot exceed {} days",
                MAX_RANGE_DAYS
            )));
        }
        return Ok((start, end));
    }

    match query_params.period.as_deref() {
        Some("this_week") | None => {
            // La semaine commence le lundi
            let week = today.week(Weekday::Mon);
            Ok((week.first_day(), week.last_day()))
        }
        Some("last_7_days") => Ok((today - Duration::days(6), today)),
        Some("this_month") => {
            let start_of_month = today.with_day(1).ok_or_else(|| {
                ServiceError::InternalServerError("Could not compute start of month".to_string())
            })?;
            let end_of_month = start_of_month
                .checked_add_months(Months::new(1))
                .and_then(|d| d.pred_opt())
                .ok_or_else(|| {
                    ServiceError::InternalServerError("Could not compute end of month".to_string())
                })?;
            Ok((start_of_month, end_of_month))
        }
        Some("last_30_days") => Ok((today - Duration::days(29), today)),
        Some(other) => Err(ServiceError::BadRequest(format!(
            "Invalid period specified: {}. Supported: this_week, last_7_days, this_month, last_30_days or provide start_date & end_date.",
            other
        ))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn user(emp_id: &str, department: &str) -> User {
        User {
            id: Uuid::new_v4(),
            emp_id: emp_id.to_string(),
            name: format!("Name {}", emp_id),
            email: format!("{}@example.com", emp_id),
            password_hash: String::new(),
            role: "staff".to_string(),
            department: department.to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn task(owner: &User, status: &str, due: Option<NaiveDate>, collaborators: &[&str]) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: format!("{} task", owner.emp_id),
            description: None,
            status: status.to_string(),
            priority: 5,
            due_date: due,
            owner_id: owner.id,
            collaborators: collaborators.iter().map(|c| c.to_string()).collect(),
            project_id: None,
            is_recurring: false,
            recurrence_type: None,
            recurrence_interval: None,
            recurrence_end_date: None,
            parent_task_id: None,
            completed_at: None,
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
            updated_at: Utc::now(),
        }
    }

    fn completed_on(mut t: Task, y: i32, m: u32, d: u32) -> Task {
        t.status = "completed".to_string();
        t.completed_at = Some(Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap());
        t
    }

    fn project(members: &[&str], status: &str, department: Option<&str>) -> Project {
        Project {
            id: Uuid::new_v4(),
            title: "Launch".to_string(),
            description: None,
            owner_id: Uuid::new_v4(),
            members: members.iter().map(|m| m.to_string()).collect(),
            status: status.to_string(),
            department: department.map(|d| d.to_string()),
            due_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn workload_thresholds() {
        assert_eq!(WorkloadLevel::from_active_count(0), WorkloadLevel::Underutilized);
        assert_eq!(WorkloadLevel::from_active_count(2), WorkloadLevel::Underutilized);
        assert_eq!(WorkloadLevel::from_active_count(3), WorkloadLevel::Optimal);
        assert_eq!(WorkloadLevel::from_active_count(7), WorkloadLevel::Optimal);
        assert_eq!(WorkloadLevel::from_active_count(8), WorkloadLevel::Overloaded);
    }

    #[test]
    fn workloads_count_owned_and_shared_active_tasks() {
        let today = date(2025, 3, 10);
        let alice = user("A1", "Eng");
        let bob = user("B1", "Eng");
        let mut tasks: Vec<Task> = (0..8).map(|_| task(&alice, "ongoing", None, &[])).collect();
        tasks.push(task(&alice, "ongoing", Some(date(2025, 3, 1)), &["B1"]));
        tasks.push(completed_on(task(&bob, "ongoing", None, &[]), 2025, 3, 2));

        let workloads = employee_workloads(&[alice.clone(), bob.clone()], &tasks, today);
        assert_eq!(workloads[0].emp_id, "A1");
        assert_eq!(workloads[0].active_tasks, 9);
        assert_eq!(workloads[0].overdue_tasks, 1);
        assert_eq!(workloads[0].workload_level, WorkloadLevel::Overloaded);
        assert_eq!(workloads[1].active_tasks, 1);
        assert_eq!(workloads[1].completed_tasks, 1);
        assert_eq!(workloads[1].workload_level, WorkloadLevel::Underutilized);
    }

    #[test]
    fn department_stats_group_by_owner_department() {
        let today = date(2025, 3, 10);
        let eng = user("E1", "Engineering");
        let sales = user("S1", "Sales");
        let mut inactive = user("S2", "Sales");
        inactive.is_active = false;

        let tasks = vec![
            completed_on(task(&eng, "ongoing", Some(date(2025, 3, 5)), &[]), 2025, 3, 4),
            completed_on(task(&eng, "ongoing", Some(date(2025, 3, 5)), &[]), 2025, 3, 7),
            task(&eng, "under_review", Some(date(2025, 3, 1)), &[]),
            task(&eng, "ongoing", None, &[]),
            task(&sales, "ongoing", None, &[]),
        ];
        let projects = vec![
            project(&["E1"], "active", None),
            project(&[], "active", Some("Sales")),
            project(&["E1"], "archived", None),
        ];

        let stats = department_stats(&[eng, sales, inactive], &tasks, &projects, today);
        assert_eq!(stats.len(), 2);

        let engineering = &stats[0];
        assert_eq!(engineering.department, "Engineering");
        assert_eq!(engineering.total_tasks, 4);
        assert_eq!(engineering.completed_tasks, 2);
        assert_eq!(engineering.under_review_tasks, 1);
        assert_eq!(engineering.ongoing_tasks, 1);
        assert_eq!(engineering.overdue_tasks, 1);
        assert_eq!(engineering.completion_rate, 50.0);
        assert_eq!(engineering.on_time_rate, 50.0);
        // 0.5*50 + 0.3*50 + 0.2*75
        assert_eq!(engineering.productivity_score, 55.0);
        assert_eq!(engineering.active_projects, 1);
        assert_eq!(engineering.average_active_tasks, 2.0);

        let sales_stats = &stats[1];
        assert_eq!(sales_stats.employee_count, 1);
        assert_eq!(sales_stats.active_projects, 1);
        assert_eq!(sales_stats.workload.underutilized, 1);
    }

    #[test]
    fn empty_inputs_produce_zeroes() {
        assert_eq!(productivity_score(0, 0, 0, 0.0), 0.0);
        assert_eq!(percentage(1, 0), 0.0);
        let overview = company_overview(&[], &[], &[], date(2025, 1, 1));
        assert_eq!(overview.total_tasks, 0);
        assert_eq!(overview.completion_rate, 0.0);
        assert_eq!(overview.status_breakdown.get("ongoing"), Some(&0));
    }

    #[test]
    fn overview_breaks_down_status_and_priority() {
        let today = date(2025, 3, 10);
        let owner = user("E1", "Ops");
        let mut urgent = task(&owner, "ongoing", Some(date(2025, 3, 9)), &[]);
        urgent.priority = 9;
        let mut low = task(&owner, "unassigned", None, &[]);
        low.priority = 1;
        let done = completed_on(task(&owner, "ongoing", None, &[]), 2025, 3, 3);

        let overview = company_overview(
            &[owner],
            &[urgent, low, done],
            &[project(&[], "active", None), project(&[], "completed", None)],
            today,
        );
        assert_eq!(overview.total_departments, 1);
        assert_eq!(overview.status_breakdown["completed"], 1);
        assert_eq!(overview.status_breakdown["unassigned"], 1);
        assert_eq!(overview.priority_breakdown, PriorityBreakdown { high: 1, medium: 1, low: 1 });
        assert_eq!(overview.overdue_tasks, 1);
        assert_eq!(overview.completion_rate, 33.3);
        assert_eq!(overview.active_projects, 1);
    }

    #[test]
    fn collaboration_tracks_cross_department_pairs() {
        let eng = user("E1", "Engineering");
        let eng2 = user("E2", "Engineering");
        let sales = user("S1", "Sales");
        let tasks = vec![
            task(&eng, "ongoing", None, &["S1", "E2"]),
            task(&eng, "ongoing", None, &["E1"]),
            task(&sales, "ongoing", None, &["E1"]),
            task(&eng2, "ongoing", None, &[]),
        ];
        let metrics = collaboration_metrics(
            &[eng, eng2, sales],
            &tasks,
            &[project(&["E1", "S1"], "active", None), project(&["E2"], "active", None)],
        );

        assert_eq!(metrics.total_tasks, 4);
        assert_eq!(metrics.collaborative_tasks, 2);
        assert_eq!(metrics.collaboration_rate, 50.0);
        assert_eq!(metrics.average_collaborators, 1.5);
        assert_eq!(metrics.cross_department_tasks, 2);
        assert_eq!(metrics.department_pairs.len(), 2);
        assert!(metrics.department_pairs.iter().all(|p| p.tasks == 1));
        assert_eq!(metrics.top_collaborators[0].emp_id, "E1");
        assert_eq!(metrics.average_project_members, 1.5);
    }

    #[test]
    fn trend_covers_every_day_in_range() {
        let owner = user("E1", "Ops");
        let tasks = vec![
            task(&owner, "ongoing", None, &[]),
            completed_on(task(&owner, "ongoing", None, &[]), 2025, 3, 2),
        ];
        let trend = task_trend(&tasks, date(2025, 3, 1), date(2025, 3, 3));
        assert_eq!(trend.len(), 3);
        assert_eq!((trend[0].created, trend[0].completed), (2, 0));
        assert_eq!((trend[1].created, trend[1].completed), (0, 1));
        assert_eq!((trend[2].created, trend[2].completed), (0, 0));
    }

    #[test]
    fn date_ranges_follow_named_periods() {
        let today = date(2025, 2, 12); // mercredi
        let range = |period: &str| {
            calculate_date_range(
                &AnalyticsQueryPeriod {
                    period: Some(period.to_string()),
                    ..Default::default()
                },
                today,
            )
        };
        assert_eq!(range("this_week").unwrap(), (date(2025, 2, 10), date(2025, 2, 16)));
        assert_eq!(range("last_7_days").unwrap(), (date(2025, 2, 6), today));
        assert_eq!(range("this_month").unwrap(), (date(2025, 2, 1), date(2025, 2, 28)));
        assert!(range("fortnight").is_err());

        let inverted = AnalyticsQueryPeriod {
            period: None,
            start_date: Some(date(2025, 3, 1)),
            end_date: Some(date(2025, 2, 1)),
        };
        assert!(calculate_date_range(&inverted, today).is_err());

        let range_of = |start, end| AnalyticsQueryPeriod {
            period: None,
            start_date: Some(start),
            end_date: Some(end),
        };
        assert_eq!(
            calculate_date_range(&range_of(date(2024, 1, 1), date(2024, 12, 31)), today).unwrap(),
            (date(2024, 1, 1), date(2024, 12, 31))
        );
        assert!(matches!(
            calculate_date_range(&range_of(date(2024, 1, 1), date(2025, 1, 1)), today),
            Err(ServiceError::BadRequest(_))
        ));
        assert!(calculate_date_range(
            &range_of(NaiveDate::MIN, NaiveDate::MAX),
            today
        )
        .is_err());
    }
}
