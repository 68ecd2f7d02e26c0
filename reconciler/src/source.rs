use crate::instances::SourceInstance;
use crate::types::{HttpRouter, Middleware, Service, TcpRouter};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, HOST};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

const HTTP_ROUTERS_PATH: &str = "api/http/routers";
const TCP_ROUTERS_PATH: &str = "api/tcp/routers";
const MIDDLEWARES_PATH: &str = "api/http/middlewares";
const SERVICES_PATH: &str = "api/http/services";

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("invalid API address: {0}")]
    InvalidAddress(#[from] url::ParseError),
    #[error("could not build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error("API error (status {status}): {body}")]
    Status { status: StatusCode, body: String },
    #[error("could not decode response from {url}: {source}")]
    Decode { url: String, source: reqwest::Error },
}

/// Read-only view of a source instance's routing state.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn http_routers(&self) -> Result<Vec<HttpRouter>, SourceError>;
    async fn tcp_routers(&self) -> Result<Vec<TcpRouter>, SourceError>;
    async fn middlewares(&self) -> Result<Vec<Middleware>, SourceError>;
    async fn services(&self) -> Result<Vec<Service>, SourceError>;
}

#[derive(Debug, PartialEq)]
struct Credentials {
    username: String,
    password: Option<String>,
}

/// Client for a source instance's inspection API.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
    credentials: Option<Credentials>,
    host: Option<String>,
}

impl ApiClient {
    pub fn new(instance: &SourceInstance, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SourceError::Client)?;

        let (base_url, credentials) = split_credentials(instance.api_address.clone());

        Ok(ApiClient {
            client,
            base_url,
            credentials,
            host: instance.api_host.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let url = self.endpoint(path);

        let mut request = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json");

        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, credentials.password.as_deref());
        }

        if let Some(host) = &self.host {
            request = request.header(HOST, host);
        }

        let response = request.send().await.map_err(|source| SourceError::Request {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status { status, body });
        }

        response.json::<T>().await.map_err(|source| SourceError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl SourceAdapter for ApiClient {
    async fn http_routers(&self) -> Result<Vec<HttpRouter>, SourceError> {
        self.get(HTTP_ROUTERS_PATH).await
    }

    async fn tcp_routers(&self) -> Result<Vec<TcpRouter>, SourceError> {
        self.get(TCP_ROUTERS_PATH).await
    }

    async fn middlewares(&self) -> Result<Vec<Middleware>, SourceError> {
        self.get(MIDDLEWARES_PATH).await
    }

    async fn services(&self) -> Result<Vec<Service>, SourceError> {
        self.get(SERVICES_PATH).await
    }
}

/// Moves user-info out of the URL so it is sent as a header, never as part of the URL.
fn split_credentials(mut url: Url) -> (Url, Option<Credentials>) {
    if url.username().is_empty() {
        return (url, None);
    }

    let credentials = Credentials {
        username: url.username().to_string(),
        password: url.password().map(String::from),
    };
    // Only fails for URLs that cannot carry credentials, which never parsed with them.
    let _ = url.set_username("");
    let _ = url.set_password(None);

    (url, Some(credentials))
}
