//! Headless chat widget: transcript, query mode, visibility, loading flag.
//!
//! `ChatWidget` is a cheap handle; clones share the same state. Front ends
//! render from `subscribe()` and drive the widget through `submit`,
//! `toggle_mode` and the visibility calls.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::{ChatClient, ClientError, StreamEvent};
use crate::config::Config;
use crate::messages::QueryRequest;
use crate::selection::SelectionSource;
use crate::transcript::{Message, MessageId, Mode, Transcript};

/// Assistant reply appended when a question could not be answered.
pub const ERROR_REPLY: &str = "Sorry, there was an error processing your request.";

/// Shown when excerpt mode is requested without highlighted text.
pub const SELECT_FIRST_NOTICE: &str = "Please select some text first to use selected-text mode.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    /// Only the activation button is shown.
    #[default]
    Collapsed,
    /// Transcript and input are shown.
    Expanded,
}

/// Outcome of one `submit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitStatus {
    /// Blank input; nothing happened.
    Ignored,
    /// Another submission is still streaming; nothing happened.
    Busy,
    /// The answer streamed to completion.
    Completed,
    /// The error reply was appended.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModeError {
    #[error("{}", SELECT_FIRST_NOTICE)]
    NoSelection,
}

#[derive(Debug, Default)]
struct WidgetState {
    mode: Mode,
    visibility: Visibility,
    loading: bool,
    notice: Option<String>,
}

/// Lock order: the transcript channel is never written while `state` is
/// held, so a renderer may read `state` while borrowing a snapshot.
#[derive(Clone)]
pub struct ChatWidget {
    client: ChatClient,
    document_id: Option<String>,
    selection: Arc<dyn SelectionSource>,
    state: Arc<Mutex<WidgetState>>,
    transcript: Arc<watch::Sender<Transcript>>,
}

impl ChatWidget {
    pub fn new(
        client: ChatClient,
        document_id: Option<String>,
        selection: Arc<dyn SelectionSource>,
    ) -> Self {
        let (transcript, _) = watch::channel(Transcript::new());
        Self {
            client,
            document_id,
            selection,
            state: Arc::new(Mutex::new(WidgetState::default())),
            transcript: Arc::new(transcript),
        }
    }

    pub fn from_config(
        config: &Config,
        selection: Arc<dyn SelectionSource>,
    ) -> Result<Self, ClientError> {
        let client = ChatClient::new(config.api.clone())?;
        Ok(Self::new(client, config.chat.document_id.clone(), selection))
    }

    /// Ask `input` in the current mode and stream the answer into the
    /// transcript. At most one submission runs at a time.
    pub async fn submit(&self, input: &str) -> SubmitStatus {
        if input.trim().is_empty() {
            return SubmitStatus::Ignored;
        }

        let mode = {
            let mut state = self.lock_state();
            if state.loading {
                debug!("submission rejected: previous answer still streaming");
                return SubmitStatus::Busy;
            }
            state.loading = true;
            state.mode
        };
        let _loading = LoadingGuard { state: &self.state };

        let placeholder = Message::placeholder(mode);
        let answer_id = placeholder.id;
        let question = Message::user(input, mode);
        self.transcript
            .send_modify(|t| *t = t.append(question).append(placeholder));

        let excerpt;
        let request = match mode {
            Mode::WholeDocument => QueryRequest::document(input, self.document_id.as_deref()),
            Mode::Excerpt => {
                excerpt = self.selection.selected_text().unwrap_or_default();
                QueryRequest::excerpt(input, &excerpt)
            }
        };

        match self.stream_answer(&request, answer_id).await {
            Ok(()) => SubmitStatus::Completed,
            Err(e) => {
                warn!(error = %e, %mode, "chat request failed");
                self.transcript
                    .send_modify(|t| *t = t.append(Message::assistant(ERROR_REPLY)));
                SubmitStatus::Failed(e.to_string())
            }
        }
    }

    /// Each fragment extends the running answer; the placeholder is replaced
    /// with the whole answer so far. A `done` frame ends the answer.
    async fn stream_answer(
        &self,
        request: &QueryRequest<'_>,
        answer_id: MessageId,
    ) -> Result<(), ClientError> {
        let mut stream = self.client.open(request).await?;
        let mut answer = String::new();
        while let Some(event) = stream.next_event().await {
            match event? {
                StreamEvent::Content(fragment) => {
                    answer.push_str(&fragment);
                    self.transcript
                        .send_modify(|t| *t = t.replace_last(answer_id, &answer));
                }
                StreamEvent::Done => {
                    debug!("backend marked answer done");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Switch between whole-document and excerpt mode. Excerpt mode needs a
    /// non-empty selection; otherwise the notice is set and mode is kept.
    pub fn toggle_mode(&self) -> Result<Mode, ModeError> {
        let mut state = self.lock_state();
        let next = match state.mode {
            Mode::WholeDocument => {
                if !self.selection.has_selection() {
                    state.notice = Some(SELECT_FIRST_NOTICE.to_owned());
                    return Err(ModeError::NoSelection);
                }
                Mode::Excerpt
            }
            Mode::Excerpt => Mode::WholeDocument,
        };
        state.mode = next;
        info!(mode = %state.mode, "chat mode changed");
        Ok(state.mode)
    }

    pub fn mode(&self) -> Mode {
        self.lock_state().mode
    }

    pub fn open(&self) {
        self.lock_state().visibility = Visibility::Expanded;
    }

    pub fn close(&self) {
        self.lock_state().visibility = Visibility::Collapsed;
    }

    pub fn toggle_visibility(&self) -> Visibility {
        let mut state = self.lock_state();
        state.visibility = match state.visibility {
            Visibility::Collapsed => Visibility::Expanded,
            Visibility::Expanded => Visibility::Collapsed,
        };
        state.visibility
    }

    pub fn visibility(&self) -> Visibility {
        self.lock_state().visibility
    }

    pub fn is_loading(&self) -> bool {
        self.lock_state().loading
    }

    pub fn notice(&self) -> Option<String> {
        self.lock_state().notice.clone()
    }

    /// Return and clear the pending notice.
    pub fn take_notice(&self) -> Option<String> {
        self.lock_state().notice.take()
    }

    pub fn transcript(&self) -> Transcript {
        self.transcript.borrow().clone()
    }

    /// Receiver that sees every transcript change.
    pub fn subscribe(&self) -> watch::Receiver<Transcript> {
        self.transcript.subscribe()
    }

    /// Clear transcript, mode and notice. Refused while an answer streams.
    pub fn reset(&self) -> bool {
        {
            let mut state = self.lock_state();
            if state.loading {
                return false;
            }
            // Held until the cleared transcript is published so a submit
            // cannot slip in between.
            state.loading = true;
            state.mode = Mode::WholeDocument;
            state.notice = None;
        }
        let _clearing = LoadingGuard { state: &self.state };
        self.transcript.send_replace(Transcript::new());
        true
    }

    fn lock_state(&self) -> MutexGuard<'_, WidgetState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<WidgetState>) -> MutexGuard<'_, WidgetState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the loading flag however `submit` exits, including when its
/// future is dropped mid-stream.
struct LoadingGuard<'a> {
    state: &'a Mutex<WidgetState>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).loading = false;
    }
}
