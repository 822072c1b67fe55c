use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{
    classify::ErrorRecord,
    config::{ClientConfig, ConfigResolver},
    observer::{NoopObserver, Notifier, RequestObserver},
    types::ApiResponse,
    ApiError, Result,
};

/// Per-request presentation switches.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RequestOptions {
    /// Show the loading indicator while the request is in flight.
    pub show_loading: bool,
    /// Emit a notification when the request fails.
    pub notify_errors: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            show_loading: true,
            notify_errors: true,
        }
    }
}

impl RequestOptions {
    /// Background request: no loading indicator, errors still notified.
    pub fn background() -> Self {
        Self {
            show_loading: false,
            ..Self::default()
        }
    }

    /// Best-effort request: no loading indicator and no notification.
    pub fn quiet() -> Self {
        Self {
            show_loading: false,
            notify_errors: false,
        }
    }
}

/// Request payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(MultipartForm),
}

/// Owned multipart form, converted to a `reqwest` form at dispatch time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultipartForm {
    parts: Vec<FormPart>,
}

#[derive(Clone, PartialEq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

impl fmt::Debug for FormPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { name, value } => f
                .debug_struct("Text")
                .field("name", name)
                .field("value", value)
                .finish(),
            Self::File {
                name,
                file_name,
                mime,
                bytes,
            } => f
                .debug_struct("File")
                .field("name", name)
                .field("file_name", file_name)
                .field("mime", mime)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push(FormPart::File {
            name: name.into(),
            file_name: file_name.into(),
            mime,
            bytes,
        });
        self
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    fn to_reqwest(&self) -> Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for part in &self.parts {
            form = match part {
                FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
                FormPart::File {
                    name,
                    file_name,
                    mime,
                    bytes,
                } => {
                    let mut file =
                        reqwest::multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
                    if let Some(mime) = mime {
                        file = file.mime_str(mime).map_err(|err| {
                            ApiError::Config(format!("invalid mime type '{mime}': {err}"))
                        })?;
                    }
                    form.part(name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}

/// Everything needed to dispatch one request.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the API root, e.g. `/knowledge/search`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub options: RequestOptions,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            options: RequestOptions::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_query<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }

    /// Serializes `body` as the JSON payload.
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|err| ApiError::Config(format!("could not encode request body: {err}")))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    pub fn with_multipart(mut self, form: MultipartForm) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// Successful response together with the request that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseEnvelope {
    pub status: u16,
    /// Parsed JSON body. Empty bodies are `null`, non-JSON bodies a string.
    pub payload: serde_json::Value,
    pub request: RequestDescriptor,
}

impl ResponseEnvelope {
    /// Decodes the response data.
    ///
    /// A payload shaped like `{ "success": bool, "data": ... }` is unwrapped
    /// and its `data` decoded; any other payload is decoded as-is.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let data = match &self.payload {
            serde_json::Value::Object(map)
                if map.get("success").is_some_and(serde_json::Value::is_boolean)
                    && map.contains_key("data") =>
            {
                &map["data"]
            }
            other => other,
        };
        T::deserialize(data).map_err(|err| {
            ApiError::Decode(format!(
                "invalid response for {} {}: {err}",
                self.request.method, self.request.path
            ))
        })
    }

    /// Decodes the full standard envelope.
    pub fn decode_envelope<T: DeserializeOwned>(&self) -> Result<ApiResponse<T>> {
        ApiResponse::<T>::deserialize(&self.payload).map_err(|err| {
            ApiError::Decode(format!(
                "invalid envelope for {} {}: {err}",
                self.request.method, self.request.path
            ))
        })
    }
}

/// HTTP client for the knowledge-base API.
///
/// Each request runs through the observer hooks and is dispatched once. On
/// failure it is classified and notified before being returned to the
/// caller. Retrying is left to [`RetryPolicy`](crate::RetryPolicy).
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_root: String,
    authorization: Option<String>,
    config: ClientConfig,
    observer: Arc<dyn RequestObserver>,
    notifier: Arc<dyn Notifier>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_root", &self.api_root)
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "<redacted>"),
            )
            .field("timeout_ms", &self.config.timeout_ms)
            .field("debug", &self.config.debug)
            .finish()
    }
}

impl ApiClient {
    /// Creates a client from resolved configuration.
    ///
    /// Fails with [`ApiError::Config`] when the base URL is not a valid
    /// absolute URL or the API key cannot be sent as a header value.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let api_root = config.api_root();
        reqwest::Url::parse(&api_root)
            .map_err(|err| ApiError::Config(format!("invalid base URL '{api_root}': {err}")))?;
        let authorization = config
            .api_key
            .as_deref()
            .map(normalize_bearer_authorization);
        if let Some(authorization) = &authorization {
            header::HeaderValue::from_str(authorization).map_err(|_| {
                ApiError::Config("API key contains characters not allowed in a header".to_owned())
            })?;
        }

        Ok(Self {
            http: reqwest::Client::new(),
            api_root,
            authorization,
            config,
            observer: Arc::new(NoopObserver),
            notifier: Arc::new(NoopObserver),
        })
    }

    /// Creates a client from environment variables and persisted overrides.
    pub fn from_resolver(resolver: &ConfigResolver) -> Result<Self> {
        Self::new(resolver.resolve())
    }

    pub fn with_observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Recreates the client for new configuration, such as a changed base
    /// URL override, keeping the observer and notifier.
    pub fn rebuild(&self, config: ClientConfig) -> Result<Self> {
        Ok(Self::new(config)?
            .with_observer(self.observer.clone())
            .with_notifier(self.notifier.clone()))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.api_root, path.trim_start_matches('/'))
    }

    /// Dispatches a request once.
    pub async fn send(&self, request: RequestDescriptor) -> Result<ResponseEnvelope> {
        let show_loading = request.options.show_loading;
        if show_loading {
            self.observer.show_loading(&request);
        }

        if self.config.debug {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                method = %request.method,
                path = %request.path,
                query = ?request.query,
                payload = ?request.body,
                "api request"
            );
        }
        self.observer.on_start(&request);

        let outcome = self.dispatch(&request).await;

        if show_loading {
            self.observer.hide_loading(&request);
        }

        match outcome {
            Ok((status, payload)) => {
                if self.config.debug {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        method = %request.method,
                        path = %request.path,
                        status,
                        payload = %payload,
                        "api response"
                    );
                }
                let response = ResponseEnvelope {
                    status,
                    payload,
                    request,
                };
                self.observer.on_success(&response);
                Ok(response)
            }
            Err(err) => {
                if self.config.debug {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        method = %request.method,
                        path = %request.path,
                        error = %err,
                        "api request failed"
                    );
                }
                let record = ErrorRecord::from_error(&err);
                if request.options.notify_errors {
                    self.notifier.notify_error(&record.message);
                }
                self.observer.on_failure(&request, &record);
                Err(err)
            }
        }
    }

    async fn dispatch(&self, request: &RequestDescriptor) -> Result<(u16, serde_json::Value)> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.url_for(&request.path))
            .header(header::ACCEPT, "application/json")
            .timeout(Duration::from_millis(self.config.timeout_ms));

        if let Some(authorization) = &self.authorization {
            builder = builder.header(header::AUTHORIZATION, authorization);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(form) => builder.multipart(form.to_reqwest()?),
        };

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(ApiError::Transport)?;
        let payload = parse_payload(body);

        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: payload,
            });
        }
        Ok((status.as_u16(), payload))
    }
}

/// Builder failures happen before anything is sent, so they are client
/// faults rather than network failures.
fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_builder() {
        ApiError::Config(format!("could not build request: {err}"))
    } else {
        ApiError::Transport(err)
    }
}

fn parse_payload(body: String) -> serde_json::Value {
    if body.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body))
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
