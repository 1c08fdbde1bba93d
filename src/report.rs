use crate::analytics::{self, EmployeeWorkload};
use crate::error_handler::ServiceError;
use crate::models::{Project, Task, User};
use chrono::{DateTime, NaiveDate, Utc};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use std::collections::HashMap;
use uuid::Uuid;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 15.0;
const MARGIN_TOP: f32 = 280.0;
const MARGIN_BOTTOM: f32 = 18.0;
const LINE_HEIGHT: f32 = 6.0;
const TITLE_SIZE: f32 = 18.0;
const HEADING_SIZE: f32 = 13.0;
const BODY_SIZE: f32 = 9.5;
const MAX_CELL_CHARS: usize = 48;

#[derive(Debug, Clone, PartialEq)]
pub enum SectionBody {
    Lines(Vec<String>),
    Table {
        headers: Vec<String>,
        // largeur de chaque colonne, en mm
        widths: Vec<f32>,
        rows: Vec<Vec<String>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSection {
    pub heading: String,
    pub body: SectionBody,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportDocument {
    pub title: String,
    pub subtitle: String,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<ReportSection>,
}

fn workload_section(workloads: &[EmployeeWorkload]) -> ReportSection {
    ReportSection {
        heading: "Workload".to_string(),
        body: SectionBody::Table {
            headers: ["Employee", "Department", "Active", "Overdue", "Level"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            widths: vec![60.0, 45.0, 20.0, 20.0, 35.0],
            rows: workloads
                .iter()
                .map(|w| {
                    vec![
                        format!("{} ({})", w.name, w.emp_id),
                        w.department.clone(),
                        w.active_tasks.to_string(),
                        w.overdue_tasks.to_string(),
                        w.workload_level.as_str().to_string(),
                    ]
                })
                .collect(),
        },
    }
}

fn task_table_section(tasks: &[Task], users: &[User]) -> ReportSection {
    let owner_names: HashMap<Uuid, &str> = users.iter().map(|u| (u.id, u.emp_id.as_str())).collect();
    let mut ordered: Vec<&Task> = tasks.iter().collect();
    ordered.sort_by(|a, b| {
        a.due_date
            .is_none()
            .cmp(&b.due_date.is_none())
            .then_with(|| a.due_date.cmp(&b.due_date))
            .then_with(|| b.priority.cmp(&a.priority))
    });

    ReportSection {
        heading: format!("Tasks ({})", tasks.len()),
        body: SectionBody::Table {
            headers: ["Title", "Owner", "Status", "Priority", "Due"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            widths: vec![75.0, 25.0, 30.0, 20.0, 30.0],
            rows: ordered
                .into_iter()
                .map(|t| {
                    vec![
                        t.title.clone(),
                        owner_names.get(&t.owner_id).unwrap_or(&"-").to_string(),
                        t.status.replace('_', " "),
                        t.priority.to_string(),
                        t.due_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
                    ]
                })
                .collect(),
        },
    }
}

fn summary_section(tasks: &[Task], today: NaiveDate) -> ReportSection {
    let progress = analytics::project_progress(tasks, today);
    let mut lines = vec![
        format!("Total tasks: {}", progress.total_tasks),
        format!("Completed: {}", progress.completed_tasks),
        format!("Overdue: {}", progress.overdue_tasks),
        format!("Completion rate: {:.1}%", progress.completion_percentage),
    ];

    let mut by_status: Vec<(String, usize)> = Vec::new();
    for task in tasks {
        match by_status.iter_mut().find(|(status, _)| *status == task.status) {
            Some((_, count)) => *count += 1,
            None => by_status.push((task.status.clone(), 1)),
        }
    }
    by_status.sort();
    for (status, count) in by_status {
        lines.push(format!("  {}: {}", status.replace('_', " "), count));
    }

    ReportSection {
        heading: "Summary".to_string(),
        body: SectionBody::Lines(lines),
    }
}

pub fn task_report(
    users: &[User],
    tasks: &[Task],
    start: NaiveDate,
    end: NaiveDate,
    department: Option<&str>,
    today: NaiveDate,
) -> ReportDocument {
    let scope = department.unwrap_or("All departments");
    let scoped_users: Vec<User> = users
        .iter()
        .filter(|u| department.map(|d| u.department == d).unwrap_or(true))
        .cloned()
        .collect();

    ReportDocument {
        title: "Task Report".to_string(),
        subtitle: format!("{} | {} to {}", scope, start, end),
        generated_at: Utc::now(),
        sections: vec![
            summary_section(tasks, today),
            workload_section(&analytics::employee_workloads(&scoped_users, tasks, today)),
            task_table_section(tasks, users),
        ],
    }
}

pub fn department_report(
    department: &str,
    users: &[User],
    tasks: &[Task],
    projects: &[Project],
    today: NaiveDate,
) -> ReportDocument {
    let mut sections = vec![summary_section(tasks, today)];

    if let Some(stats) = analytics::department_stats(users, tasks, projects, today)
        .into_iter()
        .find(|s| s.department == department)
    {
        sections.push(ReportSection {
            heading: "Performance".to_string(),
            body: SectionBody::Lines(vec![
                format!("Employees: {}", stats.employee_count),
                format!("Productivity score: {:.1}", stats.productivity_score),
                format!("On-time rate: {:.1}%", stats.on_time_rate),
                format!("Active projects: {}", stats.active_projects),
                format!(
                    "Workload: {} overloaded, {} optimal, {} underutilized",
                    stats.workload.overloaded, stats.workload.optimal, stats.workload.underutilized
                ),
            ]),
        });
    }

    sections.push(workload_section(&analytics::employee_workloads(users, tasks, today)));
    sections.push(task_table_section(tasks, users));

    ReportDocument {
        title: "Department Report".to_string(),
        subtitle: department.to_string(),
        generated_at: Utc::now(),
        sections,
    }
}

// Les polices intégrées ne couvrent que WinAnsi.
fn printable(text: &str, max_chars: usize) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect();
    if cleaned.chars().count() > max_chars {
        let truncated: String = cleaned.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", truncated)
    } else {
        cleaned
    }
}

struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
    pages: usize,
}

impl PageWriter {
    fn ensure_room(&mut self, height: f32) {
        if self.y - height < MARGIN_BOTTOM {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = MARGIN_TOP;
            self.pages += 1;
        }
    }

    fn text(&mut self, text: &str, size: f32, x: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer
            .use_text(printable(text, 110), size, Mm(x), Mm(self.y), font);
    }

    fn line(&mut self, text: &str, size: f32, bold: bool) {
        self.ensure_room(LINE_HEIGHT);
        self.text(text, size, MARGIN_LEFT, bold);
        self.y -= LINE_HEIGHT;
    }

    fn row(&mut self, cells: &[String], widths: &[f32], bold: bool) {
        self.ensure_room(LINE_HEIGHT);
        let mut x = MARGIN_LEFT;
        for (cell, width) in cells.iter().zip(widths) {
            let max_chars = ((*width / 2.0) as usize).clamp(4, MAX_CELL_CHARS);
            let font = if bold { &self.bold } else { &self.regular };
            self.layer
                .use_text(printable(cell, max_chars), BODY_SIZE, Mm(x), Mm(self.y), font);
            x += width;
        }
        self.y -= LINE_HEIGHT;
    }
}

// Pages A4, l'en-tête des tableaux est répété à chaque nouvelle page
pub fn render_pdf(report: &ReportDocument) -> Result<Vec<u8>, ServiceError> {
    let pdf_error = |e: printpdf::Error| {
        log::error!("PDF generation failed: {:?}", e);
        ServiceError::InternalServerError("Failed to generate PDF report".to_string())
    };

    let (doc, page, layer) =
        PdfDocument::new(report.title.as_str(), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?;
    let layer = doc.get_page(page).get_layer(layer);

    let mut writer = PageWriter {
        doc,
        layer,
        regular,
        bold,
        y: MARGIN_TOP,
        pages: 1,
    };

    writer.line(&report.title, TITLE_SIZE, true);
    writer.y -= 2.0;
    writer.line(&report.subtitle, BODY_SIZE + 1.0, false);
    writer.line(
        &format!("Generated {}", report.generated_at.format("%Y-%m-%d %H:%M UTC")),
        BODY_SIZE,
        false,
    );

    for section in &report.sections {
        writer.y -= LINE_HEIGHT / 2.0;
        writer.ensure_room(LINE_HEIGHT * 3.0);
        writer.line(&section.heading, HEADING_SIZE, true);
        match &section.body {
            SectionBody::Lines(lines) => {
                for line in lines {
                    writer.line(line, BODY_SIZE, false);
                }
            }
            SectionBody::Table { headers, widths, rows } => {
                writer.row(headers, widths, true);
                if rows.is_empty() {
                    writer.line("No entries", BODY_SIZE, false);
                }
                for row in rows {
                    let page_before = writer.pages;
                    writer.ensure_room(LINE_HEIGHT);
                    if writer.pages != page_before {
                        writer.row(headers, widths, true);
                    }
                    writer.row(row, widths, false);
                }
            }
        }
    }

    log::debug!("Rendered '{}' on {} page(s)", report.title, writer.pages);
    writer.doc.save_to_bytes().map_err(pdf_error)
}
