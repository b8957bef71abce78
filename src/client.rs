use std::env;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::Stream;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, header};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::process_sse;
use crate::types::{
    Chat, ChatCompletionChunk, ChatCompletionRequest, ChatList, ChatRequest, ChatResponse,
    CompletionOptions, Message,
};

/// Base URL of the hosted API.
pub const DEFAULT_API_URL: &str = "https://chat.inceptionlabs.ai";
/// Environment variable holding the bearer token.
pub const API_KEY_ENV: &str = "INCEPTION_API_KEY";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A lazy, finite stream of completion chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

/// The operations of the chat API.
///
/// [`Inception`] is the HTTP implementation; the CLI and the interactive
/// session are written against this trait.
#[async_trait::async_trait]
pub trait ChatApi: Send + Sync {
    /// Create a chat that opens with `initial_message`.
    async fn create_chat(&self, initial_message: &str, model: &str) -> Result<Chat>;

    /// List one page of chats; pages start at 1.
    async fn list_chats(&self, page: u32) -> Result<ChatList>;

    /// Delete a chat.
    async fn delete_chat(&self, chat_id: &str) -> Result<()>;

    /// Request a streamed completion of `messages`.
    async fn chat_completion(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<ChunkStream>;
}

/// Client for the Inception chat API.
#[derive(Clone)]
pub struct Inception {
    api_key: String,
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl Inception {
    /// Create a new Inception client.
    ///
    /// The API key can be provided directly or read from the INCEPTION_API_KEY
    /// environment variable.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => env::var(API_KEY_ENV).map_err(|_| {
                Error::authentication(
                    "API key not provided and INCEPTION_API_KEY environment variable not set",
                )
            })?,
        };
        if api_key.trim().is_empty() {
            return Err(Error::authentication("API key is empty"));
        }

        let base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
            logger: None,
        })
    }

    /// Attach a logger that observes every API interaction.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The bearer token this client authenticates with.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// The base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Timeout applied to connects and to non-streaming requests.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::authentication("API key contains invalid characters"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Build the URL for an API path below the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::url(format!("{} cannot be a base URL", self.base_url), None))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and map transport and status failures to errors.
    async fn execute(&self, request: RequestBuilder, chat_id: Option<&str>) -> Result<Response> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = request.send().await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        let response = result.map_err(|e| {
            CLIENT_REQUEST_ERRORS.click();
            if e.is_timeout() {
                Error::timeout(
                    format!("Request timed out: {e}"),
                    Some(self.timeout.as_secs_f64()),
                )
            } else if e.is_connect() {
                Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
            } else {
                Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
            }
        })?;

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response, chat_id).await);
        }
        Ok(response)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response, chat_id: Option<&str>) -> Error {
        let status = response.status();
        let status_code = status.as_u16();

        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let (error_type, error_message) = parse_error_body(&error_body);
        let error_message = error_message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });

        // Map HTTP status code to appropriate error type
        match status_code {
            400 => Error::bad_request(error_message),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            404 => Error::not_found(
                error_message,
                chat_id.map(|_| "chat".to_string()),
                chat_id.map(String::from),
            ),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message),
        }
    }

    /// Create a chat that opens with a user message.
    ///
    /// The returned chat carries the server-assigned id; only ids obtained
    /// this way are valid for the other operations.
    pub async fn create_chat(&self, initial_message: &str, model: &str) -> Result<Chat> {
        if initial_message.trim().is_empty() {
            return Err(Error::validation(
                "initial message must not be empty",
                Some("initial_message".to_string()),
            ));
        }
        if model.trim().is_empty() {
            return Err(Error::validation(
                "model must not be empty",
                Some("model".to_string()),
            ));
        }

        let body = ChatRequest {
            chat: Chat::new(Message::user(initial_message), model),
        };
        let url = self.endpoint(&["api", "v1", "chats", "new"])?;
        let request = self
            .client
            .post(url)
            .headers(self.default_headers()?)
            .timeout(self.timeout)
            .json(&body);
        let response = self.execute(request, None).await?;

        let created = response.json::<ChatResponse>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {e}"),
                Some(Box::new(e)),
            )
        })?;
        if created.chat.id.is_empty() {
            return Err(Error::serialization(
                "server returned a chat without an id",
                None,
            ));
        }
        if let Some(logger) = &self.logger {
            logger.log_chat_created(&created.chat);
        }
        Ok(created.chat)
    }

    /// List one page of chats.  Pages start at 1.
    pub async fn list_chats(&self, page: u32) -> Result<ChatList> {
        if page == 0 {
            return Err(Error::validation(
                "pages start at 1",
                Some("page".to_string()),
            ));
        }

        let mut url = self.endpoint(&["api", "v1", "chats", ""])?;
        url.query_pairs_mut().append_pair("page", &page.to_string());
        let request = self
            .client
            .get(url)
            .headers(self.default_headers()?)
            .timeout(self.timeout);
        let response = self.execute(request, None).await?;

        let chats = response.json::<ChatList>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {e}"),
                Some(Box::new(e)),
            )
        })?;
        if let Some(logger) = &self.logger {
            logger.log_chat_list(page, &chats);
        }
        Ok(chats)
    }

    /// Delete a chat.  Unknown ids fail with [`Error::NotFound`].
    pub async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        if chat_id.trim().is_empty() {
            return Err(Error::validation(
                "chat id must not be empty",
                Some("chat_id".to_string()),
            ));
        }

        let url = self.endpoint(&["api", "v1", "chats", chat_id])?;
        let request = self
            .client
            .delete(url)
            .headers(self.default_headers()?)
            .timeout(self.timeout);
        let response = self.execute(request, Some(chat_id)).await?;

        // Some deployments answer `false` instead of a 404.
        if let Ok(Value::Bool(false)) = response.json::<Value>().await {
            return Err(Error::not_found(
                "chat was not deleted",
                Some("chat".to_string()),
                Some(chat_id.to_string()),
            ));
        }
        if let Some(logger) = &self.logger {
            logger.log_chat_deleted(chat_id);
        }
        Ok(())
    }

    /// Request a completion and get a streaming response.
    ///
    /// Returns a stream of chunks that can be processed as they arrive.  The
    /// stream ends after the server's `[DONE]` marker; a connection lost
    /// before that yields [`Error::Streaming`].
    pub async fn chat_completion(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<ChunkStream> {
        if messages.is_empty() {
            return Err(Error::validation(
                "at least one message is required",
                Some("messages".to_string()),
            ));
        }
        if options.chat_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(Error::validation(
                "chat id must not be empty",
                Some("chat_id".to_string()),
            ));
        }

        let params = ChatCompletionRequest::new(messages, options);
        if let Some(logger) = &self.logger {
            logger.log_completion_request(&params);
        }

        let url = self.endpoint(&["api", "chat", "completions"])?;
        let mut headers = self.default_headers()?;
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );

        // No overall timeout: the stream lives as long as the completion.
        let request = self.client.post(url).headers(headers).json(&params);
        let response = self.execute(request, Some(&params.chat_id)).await?;

        let stream = process_sse(response.bytes_stream());
        match self.logger.clone() {
            Some(logger) => Ok(Box::pin(stream.inspect(move |item| {
                if let Ok(chunk) = item {
                    logger.log_stream_chunk(chunk);
                }
            }))),
            None => Ok(Box::pin(stream)),
        }
    }
}

impl fmt::Debug for Inception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inception")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ChatApi for Inception {
    async fn create_chat(&self, initial_message: &str, model: &str) -> Result<Chat> {
        Inception::create_chat(self, initial_message, model).await
    }

    async fn list_chats(&self, page: u32) -> Result<ChatList> {
        Inception::list_chats(self, page).await
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        Inception::delete_chat(self, chat_id).await
    }

    async fn chat_completion(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<ChunkStream> {
        Inception::chat_completion(self, messages, options).await
    }
}

/// Pull the error type and message out of an error body.
///
/// Understands `{"error": {"type", "message"}}`, `{"detail": ...}` and
/// `{"message": ...}`; anything else is used verbatim.
fn parse_error_body(body: &str) -> (Option<String>, Option<String>) {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<Value>,
        detail: Option<Value>,
        message: Option<String>,
    }

    let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) else {
        let body = body.trim();
        return (None, (!body.is_empty()).then(|| body.to_string()));
    };

    let error_type = parsed
        .error
        .as_ref()
        .and_then(|e| e.get("type"))
        .and_then(Value::as_str)
        .map(String::from);
    let message = parsed
        .error
        .as_ref()
        .and_then(|e| match e {
            Value::String(s) => Some(s.clone()),
            _ => e.get("message").and_then(Value::as_str).map(String::from),
        })
        .or_else(|| {
            parsed.detail.map(|d| match d {
                Value::String(s) => s,
                other => other.to_string(),
            })
        })
        .or(parsed.message);
    (error_type, message)
}
