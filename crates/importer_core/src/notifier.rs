//! Transient notices with automatic expiry.
//!
//! The notifier keeps a logical clock that only moves when the host reports
//! elapsed time, so expiry is deterministic under test.

use std::time::Duration;

use importer_logging::importer_warn;

/// How long a notice stays up unless dismissed.
pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(5);

/// UI region a notice belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    /// Upload, preview and batch progress.
    #[default]
    Create,
    /// Read-only ticket lookup.
    View,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NoticeId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: NoticeId,
    pub message: String,
    pub region: Tab,
    expires_at: Duration,
}

impl Notice {
    /// Time left before the notice retracts itself.
    pub fn remaining(&self, now: Duration) -> Duration {
        self.expires_at.saturating_sub(now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notifier {
    notices: Vec<Notice>,
    next_id: u64,
    ttl: Duration,
    now: Duration,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_TTL)
    }
}

impl Notifier {
    pub fn new(ttl: Duration) -> Self {
        Self {
            notices: Vec::new(),
            next_id: 0,
            ttl,
            now: Duration::ZERO,
        }
    }

    /// Adds a notice. Existing notices are left untouched.
    pub fn notify(&mut self, message: impl Into<String>, region: Tab) -> NoticeId {
        self.next_id += 1;
        let id = NoticeId(self.next_id);
        let message = message.into();
        importer_warn!("notice {:?}: {}", region, message);
        self.notices.push(Notice {
            id,
            message,
            region,
            expires_at: self.now + self.ttl,
        });
        id
    }

    /// Removes a notice early. Dismissing an expired or unknown id is a no-op.
    pub fn dismiss(&mut self, id: NoticeId) -> bool {
        let before = self.notices.len();
        self.notices.retain(|notice| notice.id != id);
        self.notices.len() != before
    }

    /// Moves the clock forward and drops expired notices. Returns how many
    /// were removed.
    pub fn advance(&mut self, elapsed: Duration) -> usize {
        self.now += elapsed;
        let now = self.now;
        let before = self.notices.len();
        self.notices.retain(|notice| notice.expires_at > now);
        before - self.notices.len()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn active(&self, region: Tab) -> impl Iterator<Item = &Notice> {
        self.notices
            .iter()
            .filter(move |notice| notice.region == region)
    }

    pub fn len(&self) -> usize {
        self.notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}
