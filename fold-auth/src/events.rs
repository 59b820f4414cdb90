use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use fold_core::TenantScope;
use parking_lot::RwLock;

use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static LISTENER_ID: AtomicU64 = AtomicU64::new(1);

fn next_listener_id() -> ListenerId {
    ListenerId(LISTENER_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    LoggedIn,
    Refreshed,
    TenantSwitched,
    LoggedOut,
}

/// A completed session transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// `previous` is the session this login replaced, if any.
    LoggedIn {
        session: Session,
        previous: Option<Session>,
    },
    Refreshed {
        session: Session,
    },
    TenantSwitched {
        session: Session,
        from: TenantScope,
        to: TenantScope,
    },
    LoggedOut {
        previous: Option<Session>,
    },
}

impl SessionEvent {
    pub fn kind(&self) -> SessionEventKind {
        match self {
            SessionEvent::LoggedIn { .. } => SessionEventKind::LoggedIn,
            SessionEvent::Refreshed { .. } => SessionEventKind::Refreshed,
            SessionEvent::TenantSwitched { .. } => SessionEventKind::TenantSwitched,
            SessionEvent::LoggedOut { .. } => SessionEventKind::LoggedOut,
        }
    }

    /// Session live after the transition.
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionEvent::LoggedIn { session, .. }
            | SessionEvent::Refreshed { session }
            | SessionEvent::TenantSwitched { session, .. } => Some(session),
            SessionEvent::LoggedOut { .. } => None,
        }
    }
}

/// Listener signature (sync; delivery completes before the transition returns).
pub type SessionListener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventPat {
    Any,
    Exact(SessionEventKind),
}

impl EventPat {
    pub fn matches(&self, kind: SessionEventKind) -> bool {
        match self {
            EventPat::Any => true,
            EventPat::Exact(k) => *k == kind,
        }
    }
}

impl From<SessionEventKind> for EventPat {
    fn from(kind: SessionEventKind) -> Self {
        EventPat::Exact(kind)
    }
}

#[derive(Clone)]
struct ListenerEntry {
    id: ListenerId,
    pattern: EventPat,
    listener: SessionListener,
    once: bool,
}

/// Listener hub for session transitions.
///
/// Emission is split into:
/// 1) snapshot under the read lock
/// 2) call listeners with no lock held
/// 3) drop fired once-listeners under the write lock
///
/// so a listener may register or remove listeners without deadlocking.
#[derive(Default)]
pub struct SessionEventHub {
    listeners: RwLock<Vec<ListenerEntry>>,
}

impl SessionEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, pattern: impl Into<EventPat>, listener: SessionListener) -> ListenerId {
        self.push(pattern.into(), listener, false)
    }

    pub fn on_any(&self, listener: SessionListener) -> ListenerId {
        self.push(EventPat::Any, listener, false)
    }

    pub fn once(&self, pattern: impl Into<EventPat>, listener: SessionListener) -> ListenerId {
        self.push(pattern.into(), listener, true)
    }

    /// removeListener/off
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|e| e.id != id);
        before != listeners.len()
    }

    pub fn remove_all(&self, pattern: Option<EventPat>) -> usize {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        match pattern {
            None => listeners.clear(),
            Some(p) => listeners.retain(|e| e.pattern != p),
        }
        before - listeners.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub fn emit(&self, event: &SessionEvent) {
        let kind = event.kind();
        let snapshot: Vec<ListenerEntry> = self
            .listeners
            .read()
            .iter()
            .filter(|e| e.pattern.matches(kind))
            .cloned()
            .collect();

        if snapshot.is_empty() {
            return;
        }

        let mut fired_once = Vec::new();
        for entry in &snapshot {
            (entry.listener)(event);
            if entry.once {
                fired_once.push(entry.id);
            }
        }

        if !fired_once.is_empty() {
            self.listeners.write().retain(|e| !fired_once.contains(&e.id));
        }
        tracing::trace!(?kind, delivered = snapshot.len(), "session event delivered");
    }

    fn push(&self, pattern: EventPat, listener: SessionListener, once: bool) -> ListenerId {
        let id = next_listener_id();
        self.listeners.write().push(ListenerEntry {
            id,
            pattern,
            listener,
            once,
        });
        id
    }
}
