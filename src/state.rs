use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::types::{
    AppState, ConnectionState, LiveDeviceState, Session, Todo, Toast, ToastKind,
};

/// Capacity of the change channel. Slow subscribers see `Lagged` and re-read.
const CHANGE_CAPACITY: usize = 64;

/// Which part of the store a mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Connection,
    Live,
    Toasts,
    Todos,
    Session,
}

#[derive(Default)]
struct Inner {
    state: AppState,
    next_toast_id: u64,
    next_todo_id: u64,
}

/// Observable application state shared between the connection manager and the UI.
///
/// Every setter takes the write lock once and publishes one [`StateChange`].
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<RwLock<Inner>>,
    changes: broadcast::Sender<StateChange>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: StateChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }

    pub fn snapshot(&self) -> AppState {
        self.inner.read().state.clone()
    }

    pub fn connection(&self) -> ConnectionState {
        self.inner.read().state.connection.clone()
    }

    pub fn live(&self) -> LiveDeviceState {
        self.inner.read().state.live.clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.read().state.session.clone()
    }

    pub fn set_connection(&self, connection: ConnectionState) {
        {
            let mut guard = self.inner.write();
            if guard.state.connection == connection {
                return;
            }
            guard.state.connection = connection;
        }
        self.notify(StateChange::Connection);
    }

    /// Apply one mutation to the live device state. `update` returns whether it
    /// changed anything; subscribers are only notified if it did.
    pub fn update_live<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut LiveDeviceState) -> bool,
    {
        let changed = {
            let mut guard = self.inner.write();
            update(&mut guard.state.live)
        };
        if changed {
            self.notify(StateChange::Live);
        }
        changed
    }

    pub fn set_volume_level(&self, level: u8) {
        self.update_live(|live| {
            live.volume_level = level;
            true
        });
    }

    pub fn set_muted(&self, muted: bool) {
        self.update_live(|live| {
            live.is_muted = muted;
            true
        });
    }

    pub fn set_brightness_level(&self, level: u8) {
        self.update_live(|live| {
            live.brightness_level = level;
            true
        });
    }

    pub fn set_session(&self, session: Option<Session>) {
        self.inner.write().state.session = session;
        self.notify(StateChange::Session);
    }

    /// Show a toast and return its id.
    pub fn push_toast(&self, kind: ToastKind, text: impl Into<String>) -> u64 {
        let id = {
            let mut guard = self.inner.write();
            guard.next_toast_id += 1;
            let id = guard.next_toast_id;
            guard.state.toasts.push(Toast {
                id,
                kind,
                text: text.into(),
            });
            id
        };
        self.notify(StateChange::Toasts);
        id
    }

    pub fn dismiss_toast(&self, id: u64) -> bool {
        let removed = {
            let mut guard = self.inner.write();
            let before = guard.state.toasts.len();
            guard.state.toasts.retain(|t| t.id != id);
            guard.state.toasts.len() != before
        };
        if removed {
            self.notify(StateChange::Toasts);
        }
        removed
    }

    pub fn add_todo(&self, text: impl Into<String>) -> u64 {
        let id = {
            let mut guard = self.inner.write();
            guard.next_todo_id += 1;
            let id = guard.next_todo_id;
            guard.state.todos.push(Todo {
                id,
                text: text.into(),
                done: false,
            });
            id
        };
        self.notify(StateChange::Todos);
        id
    }

    pub fn toggle_todo(&self, id: u64) -> bool {
        let toggled = {
            let mut guard = self.inner.write();
            match guard.state.todos.iter_mut().find(|t| t.id == id) {
                Some(todo) => {
                    todo.done = !todo.done;
                    true
                }
                None => false,
            }
        };
        if toggled {
            self.notify(StateChange::Todos);
        }
        toggled
    }

    pub fn remove_todo(&self, id: u64) -> bool {
        let removed = {
            let mut guard = self.inner.write();
            let before = guard.state.todos.len();
            guard.state.todos.retain(|t| t.id != id);
            guard.state.todos.len() != before
        };
        if removed {
            self.notify(StateChange::Todos);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionStatus;

    #[test]
    fn live_update_notifies_once() {
        let store = StateStore::new();
        let mut rx = store.subscribe();

        store.set_volume_level(30);

        assert_eq!(rx.try_recv().ok(), Some(StateChange::Live));
        assert!(rx.try_recv().is_err());
        assert_eq!(store.live().volume_level, 30);
    }

    #[test]
    fn unchanged_live_update_is_silent() {
        let store = StateStore::new();
        let mut rx = store.subscribe();

        assert!(!store.update_live(|_| false));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn identical_connection_state_is_not_republished() {
        let store = StateStore::new();
        let mut rx = store.subscribe();

        let connecting = ConnectionState {
            status: ConnectionStatus::Connecting,
            target_url: Some("ws://host/ws".to_string()),
            ..Default::default()
        };
        store.set_connection(connecting.clone());
        store.set_connection(connecting);

        assert_eq!(rx.try_recv().ok(), Some(StateChange::Connection));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn toasts_get_increasing_ids_and_dismiss_by_id() {
        let store = StateStore::new();
        let first = store.push_toast(ToastKind::Info, "hello");
        let second = store.push_toast(ToastKind::Error, "oops");
        assert!(second > first);

        assert!(store.dismiss_toast(first));
        assert!(!store.dismiss_toast(first));

        let toasts = store.snapshot().toasts;
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].text, "oops");
    }

    #[test]
    fn todo_lifecycle() {
        let store = StateStore::new();
        let id = store.add_todo("water plants");

        assert!(store.toggle_todo(id));
        assert!(store.snapshot().todos[0].done);

        assert!(!store.toggle_todo(id + 100));
        assert!(store.remove_todo(id));
        assert!(store.snapshot().todos.is_empty());
    }

    #[test]
    fn session_round_trip() {
        let store = StateStore::new();
        store.set_session(Some(Session {
            token: "abc".to_string(),
            username: "sam".to_string(),
        }));
        assert_eq!(store.session().map(|s| s.username), Some("sam".to_string()));

        store.set_session(None);
        assert!(store.session().is_none());
    }
}
