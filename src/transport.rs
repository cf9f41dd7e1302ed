use crate::error::*;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::instrument;
use tracing::Level;

/// The raw outcome of one HTTP exchange with the authority.
#[derive(Debug, Clone)]
pub struct Response {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: Vec<u8>,
}

impl Response {
  fn header(&self, name: &str) -> Option<String> {
    self
      .headers
      .get(name)
      .and_then(|hv| hv.to_str().ok())
      .map(|s| s.to_string())
  }

  pub fn replay_nonce(&self) -> Option<String> {
    self.header("replay-nonce")
  }

  pub fn location(&self) -> Option<String> {
    self.header(reqwest::header::LOCATION.as_str())
  }

  /// Only the delta-seconds form is understood.
  pub fn retry_after(&self) -> Option<Duration> {
    self
      .header(reqwest::header::RETRY_AFTER.as_str())
      .and_then(|v| v.trim().parse::<u64>().ok())
      .map(Duration::from_secs)
  }

  pub fn is_success(&self) -> bool {
    self.status.is_success()
  }

  /// The problem document of a failed exchange. Authorities that answer
  /// with something else still produce a problem carrying the HTTP status.
  pub fn problem(&self) -> ServerError {
    serde_json::from_slice::<ServerError>(&self.body)
      .ok()
      .filter(|err| err.r#type.is_some() || err.detail.is_some())
      .unwrap_or_else(|| ServerError {
        r#type: None,
        title: self.status.canonical_reason().map(|s| s.to_string()),
        status: Some(self.status.as_u16()),
        detail: None,
      })
  }

  pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
    serde_json::from_slice(&self.body).map_err(|err| {
      Error::BadResponse(format!("unparseable response body: {}", err))
    })
  }

  /// Parses a successful body, or turns a failed exchange into
  /// [`Error::Server`].
  pub fn into_result<T: DeserializeOwned>(self) -> Result<T, Error> {
    if self.is_success() {
      self.json()
    } else {
      Err(self.problem().into())
    }
  }
}

/// The directory document plus the nonce that came with it.
#[derive(Debug, Clone)]
pub struct DirectoryResponse {
  pub nonce: Option<String>,
  pub endpoints: serde_json::Value,
}

/// HTTP exchange with the authority.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn fetch_directory(
    &self,
    api_root: &str,
  ) -> Result<DirectoryResponse, Error>;

  async fn get(&self, url: &str) -> Result<Response, Error>;

  /// POST a signed JWS body as `application/jose+json`.
  async fn post_jose(&self, url: &str, body: String)
    -> Result<Response, Error>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
  http_client: reqwest::Client,
}

impl HttpTransport {
  pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, Error> {
    let http_client = reqwest::Client::builder()
      .user_agent(user_agent)
      .timeout(timeout)
      .build()?;
    Ok(HttpTransport { http_client })
  }

  pub fn with_client(http_client: reqwest::Client) -> Self {
    HttpTransport { http_client }
  }

  async fn into_response(resp: reqwest::Response) -> Result<Response, Error> {
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.bytes().await?.to_vec();
    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

#[async_trait]
impl Transport for HttpTransport {
  #[instrument(level = Level::DEBUG, name = "acme2_manager::HttpTransport::fetch_directory", err, skip(self))]
  async fn fetch_directory(
    &self,
    api_root: &str,
  ) -> Result<DirectoryResponse, Error> {
    let resp =
      Self::into_response(self.http_client.get(api_root).send().await?)
        .await?;
    let nonce = resp.replay_nonce();
    let endpoints: serde_json::Value = resp.into_result()?;
    if !endpoints.is_object() {
      return Err(Error::BadResponse(
        "directory is not a JSON object".to_string(),
      ));
    }
    Ok(DirectoryResponse { nonce, endpoints })
  }

  #[instrument(level = Level::DEBUG, name = "acme2_manager::HttpTransport::get", err, skip(self))]
  async fn get(&self, url: &str) -> Result<Response, Error> {
    Self::into_response(self.http_client.get(url).send().await?).await
  }

  #[instrument(level = Level::DEBUG, name = "acme2_manager::HttpTransport::post_jose", err, skip(self, body))]
  async fn post_jose(
    &self,
    url: &str,
    body: String,
  ) -> Result<Response, Error> {
    let resp = self
      .http_client
      .post(url)
      .header(reqwest::header::CONTENT_TYPE, "application/jose+json")
      .body(body)
      .send()
      .await?;
    Self::into_response(resp).await
  }
}
