//! A chat backend that talks to the conversation HTTP API and decodes
//! streamed replies sent as server-sent events.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod reply;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use reqwest::{Client, Response, Url, header};
use streamchat_model::{
    BackendError, ChatBackend, Conversation, ConversationId, ErrorKind,
};

pub use config::{
    DEFAULT_BASE_URL, HttpBackendConfig, HttpBackendConfigBuilder,
};
use io::{Chunks, Sse};
use proto::ChatTurnRequest;
pub use reply::HttpReply;

/// Error type for [`HttpBackend`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    #[inline]
    fn network(err: reqwest::Error) -> Self {
        Self::new(format!("{err}"), ErrorKind::Network)
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for Error {}

impl BackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Chat backend reached over HTTP.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    config: Arc<HttpBackendConfig>,
}

impl HttpBackend {
    /// Creates a new `HttpBackend` with the given configuration.
    #[inline]
    pub fn new(config: HttpBackendConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url, Error> {
        self.config
            .api_url(segments)
            .map_err(|message| Error::new(message, ErrorKind::Network))
    }
}

impl ChatBackend for HttpBackend {
    type Error = Error;
    type Reply = HttpReply;

    fn create_conversation(
        &self,
    ) -> impl Future<Output = Result<Conversation, Self::Error>> + Send + 'static
    {
        let resp_fut = self
            .api_url(&["conversations"])
            .map(|url| self.client.post(url).send());

        async move {
            let resp = ensure_success(resp_fut?.await).await?;
            let conversation = resp
                .json::<Conversation>()
                .await
                .map_err(Error::network)?;
            debug!("created conversation {}", conversation.id);
            Ok(conversation)
        }
    }

    fn list_conversations(
        &self,
    ) -> impl Future<Output = Result<Vec<Conversation>, Self::Error>>
    + Send
    + 'static {
        let resp_fut = self
            .api_url(&["conversations"])
            .map(|url| self.client.get(url).send());

        async move {
            let resp = ensure_success(resp_fut?.await).await?;
            resp.json::<Vec<Conversation>>()
                .await
                .map_err(Error::network)
        }
    }

    fn remove_conversation(
        &self,
        id: &ConversationId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let resp_fut = self
            .api_url(&["conversations", id.as_str()])
            .map(|url| self.client.delete(url).send());

        async move {
            // The response body is ignored.
            ensure_success(resp_fut?.await).await?;
            Ok(())
        }
    }

    fn send_chat_turn(
        &self,
        id: &ConversationId,
        text: &str,
    ) -> impl Future<Output = Result<Self::Reply, Self::Error>> + Send + 'static
    {
        let resp_fut =
            self.api_url(&["conversations", id.as_str(), "chat"]).map(|url| {
                self.client
                    .post(url)
                    .header(header::ACCEPT, "text/event-stream")
                    .json(&ChatTurnRequest { message: text })
                    .send()
            });

        async move {
            let resp = ensure_success(resp_fut?.await).await?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            if let Some(content_type) = content_type {
                let is_event_stream = content_type
                    .parse::<Mime>()
                    .map(|m| {
                        m.type_() == mime::TEXT
                            && m.subtype().as_str() == "event-stream"
                    })
                    .unwrap_or(false);
                if !is_event_stream {
                    return Err(Error::new(
                        format!("unexpected content type: {content_type}"),
                        ErrorKind::Network,
                    ));
                }
            } else {
                warn!("reply has no content type, assuming an event stream");
            }

            // Here we got a successful handshake.
            let chunks = Chunks::from_response(resp);
            let sse = Sse::new(chunks);
            Ok(HttpReply::from_sse(sse))
        }
    }
}

/// Turns transport failures and unsuccessful statuses into errors.
async fn ensure_success(
    resp_or_err: Result<Response, reqwest::Error>,
) -> Result<Response, Error> {
    let resp = resp_or_err.map_err(Error::network)?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(Error::new(
        format!("backend answered {status}: {}", body.trim()),
        ErrorKind::Network,
    ))
}
