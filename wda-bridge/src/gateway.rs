//! Request gateway to the WebDriverAgent HTTP backend.
//!
//! All backend traffic goes through [`Gateway`]. A transport failure is
//! never retried: the backend runs next to the unit, so a failed request
//! means the unit as a whole is unhealthy and the escalation policy takes
//! the process down for a supervisor restart.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{BridgeError, BridgeResult, TransportError};
use crate::escalation::SharedEscalation;
use crate::schema;

/// HTTP verbs used against WDA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// A request relative to the backend base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl BackendRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    /// POST without a body.
    pub fn post_empty(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: None,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }
}

/// A successful backend answer.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl BackendResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// Decode the body against an endpoint schema.
    pub fn decode<T: DeserializeOwned>(&self, endpoint: &str) -> BridgeResult<T> {
        schema::decode(endpoint, &self.body)
    }

    /// The body as untyped JSON, for payloads returned verbatim.
    pub fn json(&self, endpoint: &str) -> BridgeResult<Value> {
        schema::decode(endpoint, &self.body)
    }
}

/// Executes backend requests.
///
/// Non-success statuses must come back as `TransportError::Status`.
/// Trait exists so tests can script the backend without a server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &BackendRequest) -> Result<BackendResponse, TransportError>;
}

/// Production transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> BridgeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Io(std::io::Error::other(format!("http client: {e}"))))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &BackendRequest) -> Result<BackendResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(BackendResponse {
            status: status.as_u16(),
            body: body.to_vec(),
        })
    }
}

/// Single entry point for backend calls, with centralized escalation.
#[derive(Clone)]
pub struct Gateway {
    transport: Arc<dyn Transport>,
    escalation: SharedEscalation,
}

impl Gateway {
    pub fn new(transport: Arc<dyn Transport>, escalation: SharedEscalation) -> Self {
        Self {
            transport,
            escalation,
        }
    }

    pub fn escalation(&self) -> &SharedEscalation {
        &self.escalation
    }

    /// Send a request; any failure is fatal.
    pub async fn send(&self, request: BackendRequest) -> BridgeResult<BackendResponse> {
        match self.transport.execute(&request).await {
            Ok(resp) => {
                debug!(method = %request.method, path = %request.path, "Request has been sent to WDA");
                Ok(resp)
            }
            Err(err) => Err(self.escalate(&request, &err)),
        }
    }

    /// Send a request whose non-success answers are expected.
    ///
    /// A non-2xx status comes back as `BridgeError::Status`; an unreachable
    /// backend is still fatal.
    pub async fn send_tolerant(&self, request: BackendRequest) -> BridgeResult<BackendResponse> {
        match self.transport.execute(&request).await {
            Ok(resp) => {
                debug!(method = %request.method, path = %request.path, "Request has been sent to WDA");
                Ok(resp)
            }
            Err(TransportError::Status { status, .. }) => {
                debug!(method = %request.method, path = %request.path, status, "WDA answered with an error status");
                Err(BridgeError::Status {
                    method: request.method.to_string(),
                    path: request.path,
                    status,
                })
            }
            Err(err) => Err(self.escalate(&request, &err)),
        }
    }

    fn escalate(&self, request: &BackendRequest, err: &TransportError) -> BridgeError {
        error!(
            method = %request.method,
            path = %request.path,
            error = %err,
            "No valid response from WDA"
        );
        BridgeError::Fatal(self.escalation.request_failed(err))
    }
}
