//! HTTP client: POST a question, read the `data: `-framed answer stream.

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ApiSection;
use crate::decoder::FrameDecoder;
use crate::messages::{QueryRequest, StreamFrame};
use crate::transcript::Mode;

/// Events read from an answer stream, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One content fragment.
    Content(String),
    /// The backend marked the answer complete.
    Done,
}

/// Client transport error.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("backend returned status {status}")]
    Status { status: u16, body: String },
    #[error("stream read failed: {0}")]
    Stream(#[source] reqwest::Error),
    #[error("no data from backend for {0:?}")]
    IdleTimeout(Duration),
}

/// Client for the two chat endpoints.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api: ApiSection,
}

impl ChatClient {
    pub fn new(api: ApiSection) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(ClientError::HttpClientBuild)?;
        Ok(Self { http, api })
    }

    pub fn api(&self) -> &ApiSection {
        &self.api
    }

    /// Full URL of the endpoint serving `mode`.
    pub fn endpoint(&self, mode: Mode) -> String {
        let path = match mode {
            Mode::WholeDocument => self.api.query_path(),
            Mode::Excerpt => self.api.excerpt_path(),
        };
        format!("{}{}", self.api.base_url(), path)
    }

    /// POST `request` to its endpoint and return the answer stream.
    pub async fn open(&self, request: &QueryRequest<'_>) -> Result<ResponseStream, ClientError> {
        let url = self.endpoint(request.mode());
        debug!(%url, mode = %request.mode(), "sending question");

        let idle_timeout = self.api.idle_timeout();
        let response = within(idle_timeout, self.http.post(&url).json(request).send())
            .await?
            .map_err(ClientError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let body = within(idle_timeout, response.text())
                .await?
                .unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(ResponseStream {
            body: response.bytes_stream().boxed(),
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
            idle_timeout,
            finished: false,
        })
    }

    /// Send a question and collect the whole answer. Stops at the first
    /// `done` frame or at end of stream.
    pub async fn query(&self, request: &QueryRequest<'_>) -> Result<String, ClientError> {
        let mut stream = self.open(request).await?;
        let mut answer = String::new();
        while let Some(event) = stream.next_event().await {
            match event? {
                StreamEvent::Content(fragment) => answer.push_str(&fragment),
                StreamEvent::Done => break,
            }
        }
        Ok(answer)
    }
}

/// An open answer stream. Dropping it closes the connection.
pub struct ResponseStream {
    body: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    decoder: FrameDecoder,
    ready: VecDeque<StreamEvent>,
    idle_timeout: Option<Duration>,
    finished: bool,
}

impl ResponseStream {
    /// Next event, or `None` once the transport reports end of stream.
    /// Malformed frames are logged and skipped.
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent, ClientError>> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }

            match self.read_chunk().await {
                Ok(Some(chunk)) => {
                    for line in self.decoder.push(&chunk) {
                        self.accept_line(&line);
                    }
                }
                Ok(None) => {
                    self.finished = true;
                    if let Some(line) = self.decoder.finish() {
                        self.accept_line(&line);
                    }
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }

    async fn read_chunk(&mut self) -> Result<Option<bytes::Bytes>, ClientError> {
        within(self.idle_timeout, self.body.next())
            .await?
            .transpose()
            .map_err(ClientError::Stream)
    }

    fn accept_line(&mut self, line: &str) {
        let frame = match StreamFrame::parse_line(line) {
            None => return,
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!(error = %e, line, "skipping malformed frame");
                return;
            }
        };
        debug!(?frame, "frame");
        if let Some(fragment) = frame.fragment() {
            self.ready.push_back(StreamEvent::Content(fragment.to_owned()));
        }
        if frame.is_done() {
            self.ready.push_back(StreamEvent::Done);
        }
    }
}

/// Await `fut`, failing with `IdleTimeout` if it waits longer than `limit`.
async fn within<F: std::future::Future>(
    limit: Option<Duration>,
    fut: F,
) -> Result<F::Output, ClientError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ClientError::IdleTimeout(limit)),
        None => Ok(fut.await),
    }
}
