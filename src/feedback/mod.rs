use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NoticeId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NoticeKind {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient message shown outside any dialog, e.g. "Organization saved".
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notice {
    pub id: Option<NoticeId>,
    pub message: String,
    pub kind: NoticeKind,
    pub auto_close_ms: Option<u32>,
    pub closable: bool,
}

impl Notice {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            id: None,
            message: message.into(),
            kind: NoticeKind::Info,
            auto_close_ms: Some(4_000),
            closable: true,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(message).kind(NoticeKind::Success)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message).kind(NoticeKind::Error).auto_close_ms(None)
    }

    pub fn kind(mut self, value: NoticeKind) -> Self {
        self.kind = value;
        self
    }

    pub fn auto_close_ms(mut self, value: Option<u32>) -> Self {
        self.auto_close_ms = value;
        self
    }

    pub fn closable(mut self, value: bool) -> Self {
        self.closable = value;
        self
    }
}

struct NoticeState {
    queue: VecDeque<Notice>,
    max_visible: usize,
}

impl Default for NoticeState {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            max_visible: 5,
        }
    }
}

/// Bounded queue of notices; the oldest notice drops out when full.
#[derive(Clone, Default)]
pub struct NoticeCenter {
    next_id: Arc<AtomicU64>,
    state: Arc<RwLock<NoticeState>>,
}

impl NoticeCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_visible(max_visible: usize) -> Self {
        let center = Self::default();
        center.write_state().max_visible = max_visible.max(1);
        center
    }

    pub fn show(&self, mut notice: Notice) -> NoticeId {
        let id = NoticeId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        notice.id = Some(id);
        tracing::debug!(id = id.0, kind = ?notice.kind, "notice shown");

        let mut state = self.write_state();
        let limit = state.max_visible;
        state.queue.push_back(notice);
        while state.queue.len() > limit {
            state.queue.pop_front();
        }
        id
    }

    pub fn dismiss(&self, id: NoticeId) -> bool {
        let mut state = self.write_state();
        if let Some(index) = state.queue.iter().position(|notice| notice.id == Some(id)) {
            state.queue.remove(index);
            return true;
        }
        false
    }

    pub fn dismiss_all(&self) {
        self.write_state().queue.clear();
    }

    pub fn list(&self) -> Vec<Notice> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .iter()
            .cloned()
            .collect()
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, NoticeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
