//! Line-oriented terminal rendering of the view model.
//!
//! The renderer remembers what it already printed and only emits lines for
//! what changed, so a view can be rendered after every dirty update.

use std::collections::{HashMap, HashSet};

use importer_core::{
    AppViewModel, NoticeId, OperationPhase, PreviewView, ProgressView, Section, Ticket,
};
use importer_engine::HealthReport;

#[derive(Debug, Default)]
pub struct Renderer {
    section: Option<Section>,
    preview_shown: bool,
    progress_line: Option<String>,
    row_details: HashMap<u32, String>,
    summary_shown: bool,
    seen_notices: HashSet<NoticeId>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, view: &AppViewModel) -> Vec<String> {
        let mut lines = Vec::new();

        self.seen_notices
            .retain(|id| view.notices.iter().any(|notice| notice.id == *id));
        for notice in &view.notices {
            if self.seen_notices.insert(notice.id) {
                lines.push(format!("! {}", notice.message));
            }
        }

        if self.section != Some(view.section) {
            self.section = Some(view.section);
            match view.section {
                Section::Upload => {}
                Section::Parsing => lines.push("Uploading and parsing spreadsheet...".to_string()),
                Section::Preview => {}
                Section::Progress => lines.push("Creating tickets...".to_string()),
            }
        }

        match &view.preview {
            Some(preview) if !self.preview_shown => {
                self.preview_shown = true;
                lines.extend(preview_lines(preview));
            }
            Some(_) => {}
            None => self.preview_shown = false,
        }

        match &view.progress {
            Some(progress) => self.progress_lines(progress, &mut lines),
            None => {
                self.progress_line = None;
                self.row_details.clear();
                self.summary_shown = false;
            }
        }

        lines
    }

    fn progress_lines(&mut self, progress: &ProgressView, lines: &mut Vec<String>) {
        if progress.phase == OperationPhase::Starting {
            return;
        }

        let line = format!("[{:>3}%] {}", progress.percentage, progress.progress_text());
        if self.progress_line.as_deref() != Some(line.as_str()) {
            lines.push(line.clone());
            self.progress_line = Some(line);
        }

        if let Some(summary) = &progress.summary {
            if !self.summary_shown {
                self.summary_shown = true;
                lines.push(summary.clone());
            }
        }

        for row in &progress.rows {
            if self.row_details.get(&row.row) != Some(&row.detail) {
                lines.push(format!("  Row {}: {} - {}", row.row, row.summary, row.detail));
                self.row_details.insert(row.row, row.detail.clone());
            }
        }
    }
}

fn preview_lines(preview: &PreviewView) -> Vec<String> {
    let mut widths: Vec<usize> = preview.columns.iter().map(|c| c.chars().count()).collect();
    for row in &preview.rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_row = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![preview.caption.clone(), format_row(&preview.columns)];
    lines.push(
        widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    lines.extend(preview.rows.iter().map(|row| format_row(row)));
    lines
}

pub fn ticket_lines(ticket: &Ticket) -> Vec<String> {
    let mut lines = vec![
        format!("{}  {}", ticket.key, ticket.summary),
        format!("Type:        {}", ticket.issue_type),
        format!("Status:      {}", ticket.status),
        format!("Priority:    {}", ticket.priority_label()),
        format!("Assignee:    {}", ticket.assignee_label()),
        format!("Created:     {}", ticket.created),
        format!("Labels:      {}", ticket.labels_label()),
        "Description:".to_string(),
    ];
    lines.extend(
        ticket
            .description_label()
            .lines()
            .map(|line| format!("  {line}")),
    );
    if let Some(url) = &ticket.browse_url {
        lines.push(format!("Link:        {url}"));
    }
    lines
}

pub fn health_line(report: &HealthReport) -> String {
    format!("Server: {} ({})", report.status, report.jira_connection)
}
