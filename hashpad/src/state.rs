use serde::Serialize;

/// What the engine last found in the channel when it had to read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    #[default]
    Empty,
    Loaded,
    /// The channel held a value that did not decode; the link is corrupt or truncated.
    Unreadable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub current_text: String,
    pub last_persisted_text: String,
    pub dirty: bool,
}

impl SyncState {
    pub fn hydrated(text: String) -> Self {
        Self {
            last_persisted_text: text.clone(),
            current_text: text,
            dirty: false,
        }
    }

    /// Records a new document value. Returns `true` when a flush is now owed.
    pub fn apply(&mut self, text: String) -> bool {
        self.dirty = text != self.last_persisted_text;
        self.current_text = text;
        self.dirty
    }

    pub fn mark_persisted(&mut self, text: &str) {
        self.last_persisted_text = text.to_string();
        self.dirty = self.current_text != self.last_persisted_text;
    }

    pub fn reset(&mut self) {
        self.current_text.clear();
        self.last_persisted_text.clear();
        self.dirty = false;
    }
}
