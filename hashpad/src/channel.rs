use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

const NAVIGATION_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Overwrites the current history entry.
    #[default]
    Replace,
    /// Pushes a new entry reachable with back/forward.
    Append,
}

impl std::str::FromStr for WriteMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "append" | "push" => Ok(Self::Append),
            other => Err(format!("unknown write mode `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationEvent {
    Back,
    Forward,
    /// The slot was changed by something other than the engine, e.g. a pasted link.
    External,
}

/// The navigable, size-bounded slot the document lives in.
pub trait Channel {
    fn read(&self) -> String;
    fn write(&mut self, value: &str, mode: WriteMode);
}

#[derive(Debug, Default)]
struct History {
    entries: Vec<String>,
    cursor: usize,
    writes: u64,
}

impl History {
    fn current(&self) -> String {
        self.entries.get(self.cursor).cloned().unwrap_or_default()
    }

    fn push(&mut self, value: &str) {
        if self.entries.is_empty() {
            self.entries.push(value.to_string());
            self.cursor = 0;
            return;
        }
        self.entries.truncate(self.cursor + 1);
        self.entries.push(value.to_string());
        self.cursor = self.entries.len() - 1;
    }

    fn replace(&mut self, value: &str) {
        match self.entries.get_mut(self.cursor) {
            Some(entry) => *entry = value.to_string(),
            None => self.push(value),
        }
    }
}

/// In-process history stack behaving like a browser's fragment history.
///
/// Clones share the same history, so a host can keep one for back/forward while the engine
/// owns another.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    history: Arc<Mutex<History>>,
    events: broadcast::Sender<NavigationEvent>,
}

impl MemoryChannel {
    pub fn new(initial: &str) -> Self {
        let (events, _) = broadcast::channel(NAVIGATION_EVENT_CAPACITY);
        let history = History {
            entries: vec![initial.to_string()],
            cursor: 0,
            writes: 0,
        };
        Self {
            history: Arc::new(Mutex::new(history)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NavigationEvent> {
        self.events.subscribe()
    }

    pub fn back(&self) -> bool {
        let moved = {
            let mut history = self.lock();
            if history.cursor == 0 {
                false
            } else {
                history.cursor -= 1;
                true
            }
        };
        if moved {
            self.publish(NavigationEvent::Back);
        }
        moved
    }

    pub fn forward(&self) -> bool {
        let moved = {
            let mut history = self.lock();
            if history.cursor + 1 >= history.entries.len() {
                false
            } else {
                history.cursor += 1;
                true
            }
        };
        if moved {
            self.publish(NavigationEvent::Forward);
        }
        moved
    }

    /// Simulates an out-of-band change, such as the user pasting a different link.
    pub fn set_external(&self, value: &str) {
        self.lock().push(value);
        self.publish(NavigationEvent::External);
    }

    pub fn write_count(&self) -> u64 {
        self.lock().writes
    }

    pub fn history_len(&self) -> usize {
        self.lock().entries.len()
    }

    fn publish(&self, event: NavigationEvent) {
        // No subscribers is fine; nobody is listening for navigation yet.
        if self.events.send(event).is_err() {
            debug!(?event, "navigation event had no subscribers");
        }
    }

    fn lock(&self) -> MutexGuard<'_, History> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new("")
    }
}

impl Channel for MemoryChannel {
    fn read(&self) -> String {
        self.lock().current()
    }

    fn write(&mut self, value: &str, mode: WriteMode) {
        let mut history = self.lock();
        match mode {
            WriteMode::Replace => history.replace(value),
            WriteMode::Append => history.push(value),
        }
        history.writes += 1;
    }
}

/// Extracts the fragment from a full link, or returns the input when it has no `#`.
pub fn fragment_from_link(link: &str) -> &str {
    match link.split_once('#') {
        Some((_, fragment)) => fragment,
        None => link,
    }
}

pub fn link_for(base: &str, fragment: &str) -> String {
    let base = base.split_once('#').map(|(base, _)| base).unwrap_or(base);
    if fragment.is_empty() {
        base.to_string()
    } else {
        format!("{base}#{fragment}")
    }
}
