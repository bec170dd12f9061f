//! Where the highlighted excerpt comes from. The widget only reads it.

use std::sync::{Arc, Mutex};

/// Reports the reader's current text selection.
pub trait SelectionSource: Send + Sync {
    /// Current selection text, if any.
    fn selected_text(&self) -> Option<String>;

    /// True when the selection has non-whitespace text.
    fn has_selection(&self) -> bool {
        self.selected_text()
            .is_some_and(|text| !text.trim().is_empty())
    }
}

/// Settable selection shared between the embedder and the widget.
#[derive(Debug, Clone, Default)]
pub struct SharedSelection {
    text: Arc<Mutex<Option<String>>>,
}

impl SharedSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, text: impl Into<String>) {
        if let Ok(mut guard) = self.text.lock() {
            *guard = Some(text.into());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.text.lock() {
            *guard = None;
        }
    }
}

impl SelectionSource for SharedSelection {
    fn selected_text(&self) -> Option<String> {
        self.text.lock().ok().and_then(|guard| guard.clone())
    }
}

/// No selection ever; for embedders without a document viewer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSelection;

impl SelectionSource for NoSelection {
    fn selected_text(&self) -> Option<String> {
        None
    }
}
