//! Streaming question-answering client for the course book chat widget.
//! Config, wire format, incremental frame decoding, and headless widget state
//! shared by the `book-chat` binary and any GUI embedding.

pub mod client;
pub mod config;
pub mod decoder;
pub mod messages;
pub mod selection;
pub mod transcript;
pub mod widget;

pub use client::{ChatClient, ClientError, ResponseStream, StreamEvent};
pub use config::{default_config_path, ApiSection, ChatSection, Config, ConfigError};
pub use messages::{QueryRequest, StreamFrame};
pub use selection::{NoSelection, SelectionSource, SharedSelection};
pub use transcript::{Message, MessageId, Mode, Role, Transcript};
pub use widget::{ChatWidget, ModeError, SubmitStatus, Visibility};
