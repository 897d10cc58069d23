use importer_logging::importer_debug;

use crate::ImporterError;

/// Read-only projection of a remote issue.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ticket {
    pub key: String,
    pub summary: String,
    pub issue_type: String,
    pub status: String,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub created: String,
    pub labels: Vec<String>,
    pub description: String,
    pub browse_url: Option<String>,
}

impl Ticket {
    pub fn priority_label(&self) -> &str {
        self.priority.as_deref().unwrap_or("Not set")
    }

    pub fn assignee_label(&self) -> &str {
        self.assignee.as_deref().unwrap_or("Unassigned")
    }

    pub fn labels_label(&self) -> String {
        if self.labels.is_empty() {
            "No labels".to_string()
        } else {
            self.labels.join(", ")
        }
    }

    pub fn description_label(&self) -> &str {
        if self.description.trim().is_empty() {
            "No description"
        } else {
            &self.description
        }
    }
}

/// Trims and upper-cases a ticket key, rejecting anything not shaped like
/// `PROJ-123`.
pub fn normalize_ticket_key(raw: &str) -> Result<String, ImporterError> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(ImporterError::EmptyTicketKey);
    }
    let key = key.to_ascii_uppercase();
    let valid = match key.split_once('-') {
        Some((project, number)) => {
            !project.is_empty()
                && project.chars().all(|c| c.is_ascii_uppercase())
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    };
    if valid {
        Ok(key)
    } else {
        Err(ImporterError::InvalidTicketKey { key })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct LookupState {
    last_seq: u64,
    in_flight: Option<u64>,
    ticket: Option<Ticket>,
}

impl LookupState {
    pub(crate) fn begin(&mut self) -> u64 {
        self.last_seq += 1;
        self.in_flight = Some(self.last_seq);
        self.last_seq
    }

    pub(crate) fn finish(&mut self, seq: u64) -> bool {
        if self.in_flight == Some(seq) {
            self.in_flight = None;
            true
        } else {
            importer_debug!("ignoring stale lookup response #{}", seq);
            false
        }
    }

    pub(crate) fn show(&mut self, ticket: Option<Ticket>) {
        self.ticket = ticket;
    }

    pub(crate) fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub(crate) fn ticket(&self) -> Option<&Ticket> {
        self.ticket.as_ref()
    }
}
