use crate::error::*;
use crate::signing::KeyPair;
use crate::signing::SigningProvider;
use crate::storage::Storage;
use crate::transport::Response;
use crate::transport::Transport;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::field;
use tracing::info;
use tracing::instrument;
use tracing::Level;
use tracing::Span;

/// Logical operations advertised by the authority's directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
  NewNonce,
  NewRegistration,
  NewAuthorization,
  NewCertificate,
  RevokeCertificate,
}

impl Endpoint {
  /// The `resource` member of request payloads, which is also the
  /// directory key.
  pub fn resource(&self) -> &'static str {
    self.keys()[0]
  }

  /// Directory keys, in order of preference.
  fn keys(&self) -> &'static [&'static str] {
    match self {
      Endpoint::NewNonce => &["new-nonce", "newNonce"],
      Endpoint::NewRegistration => &["new-reg", "newAccount"],
      Endpoint::NewAuthorization => &["new-authz", "newAuthz"],
      Endpoint::NewCertificate => &["new-cert"],
      Endpoint::RevokeCertificate => &["revoke-cert", "revokeCert"],
    }
  }
}

/// Where a signed request goes: a directory endpoint or a resource URL the
/// authority handed out earlier.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
  Endpoint(Endpoint),
  Url(&'a str),
}

impl From<Endpoint> for Target<'_> {
  fn from(endpoint: Endpoint) -> Self {
    Target::Endpoint(endpoint)
  }
}

impl<'a> From<&'a str> for Target<'a> {
  fn from(url: &'a str) -> Self {
    Target::Url(url)
  }
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryMeta {
  #[serde(alias = "terms-of-service")]
  pub terms_of_service: Option<String>,
  pub website: Option<String>,
  #[serde(alias = "caa-identities")]
  pub caa_identities: Option<Vec<String>>,
}

/// The authority's map of operation names to URLs, kept as the raw JSON
/// object so it can be persisted as is.
#[derive(Debug, Clone, PartialEq)]
pub struct Directory {
  endpoints: serde_json::Value,
}

impl Directory {
  pub fn from_value(endpoints: serde_json::Value) -> Result<Self, Error> {
    if !endpoints.is_object() {
      return Err(Error::BadResponse(
        "directory is not a JSON object".to_string(),
      ));
    }
    Ok(Directory { endpoints })
  }

  pub fn url(&self, endpoint: Endpoint) -> Result<String, Error> {
    self
      .try_url(endpoint)
      .ok_or_else(|| Error::MissingEndpoint(endpoint.resource().to_string()))
  }

  fn try_url(&self, endpoint: Endpoint) -> Option<String> {
    endpoint
      .keys()
      .iter()
      .find_map(|key| self.endpoints.get(*key).and_then(|v| v.as_str()))
      .map(|s| s.to_string())
  }

  pub fn meta(&self) -> Option<DirectoryMeta> {
    self
      .endpoints
      .get("meta")
      .and_then(|m| serde_json::from_value(m.clone()).ok())
  }

  pub fn as_value(&self) -> &serde_json::Value {
    &self.endpoints
  }
}

#[derive(Debug, Default)]
struct SessionState {
  directory: Option<Directory>,
  nonce: Option<String>,
}

/// The directory and replay-nonce shared by every signed call, together with
/// the collaborators those calls go through.
///
/// Signed requests hold the state lock for the whole exchange, so at most one
/// is in flight at a time and each one consumes the nonce its predecessor
/// received.
pub struct Session {
  api_root: String,
  transport: Arc<dyn Transport>,
  signer: Arc<dyn SigningProvider>,
  storage: Arc<dyn Storage>,
  state: Mutex<SessionState>,
}

impl std::fmt::Debug for Session {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Session")
      .field("api_root", &self.api_root)
      .finish()
  }
}

impl Session {
  pub fn new(
    api_root: String,
    transport: Arc<dyn Transport>,
    signer: Arc<dyn SigningProvider>,
    storage: Arc<dyn Storage>,
  ) -> Self {
    Session {
      api_root,
      transport,
      signer,
      storage,
      state: Mutex::new(SessionState::default()),
    }
  }

  pub fn signer(&self) -> &dyn SigningProvider {
    self.signer.as_ref()
  }

  pub fn storage(&self) -> &dyn Storage {
    self.storage.as_ref()
  }

  /// Loads the persisted status, fetching the directory again when there is
  /// none, it carries no nonce, or it is older than `max_age`. Returns
  /// whether the directory was fetched.
  #[instrument(level = Level::INFO, name = "acme2_manager::Session::refresh", err, skip(self), fields(api = %self.api_root, fetched = field::Empty))]
  pub async fn refresh(&self, max_age: Duration) -> Result<bool, Error> {
    let mut state = self.state.lock().await;

    let status = self.storage.load_status().await?;
    let fresh = status.filter(|status| {
      let age = (Utc::now() - status.timestamp).to_std().unwrap_or_default();
      status.nonce.is_some() && age <= max_age
    });

    let fetched = match fresh {
      Some(status) => {
        state.directory = Some(Directory::from_value(status.endpoints)?);
        state.nonce = status.nonce;
        false
      }
      None => {
        let resp = self.transport.fetch_directory(&self.api_root).await?;
        let directory = Directory::from_value(resp.endpoints)?;
        self
          .storage
          .update_status(resp.nonce.as_deref(), directory.as_value())
          .await?;
        info!("Fetched ACME directory");
        state.directory = Some(directory);
        state.nonce = resp.nonce;
        true
      }
    };

    Span::current().record("fetched", &fetched);
    Ok(fetched)
  }

  pub async fn directory(&self) -> Result<Directory, Error> {
    self
      .state
      .lock()
      .await
      .directory
      .clone()
      .ok_or_else(not_initialized)
  }

  async fn fetch_nonce(&self, directory: &Directory) -> Result<String, Error> {
    let nonce = match directory.try_url(Endpoint::NewNonce) {
      Some(url) => self.transport.get(&url).await?.replay_nonce(),
      None => self.transport.fetch_directory(&self.api_root).await?.nonce,
    };
    nonce.ok_or_else(|| transport_err("the authority did not return a nonce"))
  }

  /// Signs `payload` with `keys` and POSTs it. A `badNonce` rejection is
  /// retried with the replacement nonce up to three times; any other answer,
  /// successful or not, is returned as is.
  #[instrument(level = Level::DEBUG, name = "acme2_manager::Session::signed_request", err, skip(self, payload, keys), fields(url = field::Empty, status = field::Empty))]
  pub async fn signed_request(
    &self,
    target: Target<'_>,
    payload: &serde_json::Value,
    keys: &KeyPair,
  ) -> Result<Response, Error> {
    let payload = serde_json::to_string(payload)?;

    let mut state = self.state.lock().await;
    let directory = state.directory.clone().ok_or_else(not_initialized)?;
    let url = match target {
      Target::Endpoint(endpoint) => directory.url(endpoint)?,
      Target::Url(url) => url.to_string(),
    };
    Span::current().record("url", &field::display(&url));

    let mut attempt = 0;
    loop {
      attempt += 1;

      let nonce = match state.nonce.take() {
        Some(nonce) => nonce,
        None => self.fetch_nonce(&directory).await?,
      };
      let body = self.signer.sign_envelope(&payload, &nonce, &url, keys)?;
      let resp = self.transport.post_jose(&url, body).await?;

      if let Some(nonce) = resp.replay_nonce() {
        state.nonce = Some(nonce);
      }
      self
        .storage
        .update_status(state.nonce.as_deref(), directory.as_value())
        .await?;

      if !resp.is_success() && resp.problem().is_type("badNonce") && attempt <= 3
      {
        debug!({ attempt }, "Nonce rejected, retrying with a fresh one");
        continue;
      }

      Span::current().record("status", &resp.status.as_u16());
      return Ok(resp);
    }
  }

  /// Unauthenticated GET of a resource URL, e.g. while polling.
  pub async fn get(&self, url: &str) -> Result<Response, Error> {
    let resp = self.transport.get(url).await?;
    if let Some(nonce) = resp.replay_nonce() {
      self.state.lock().await.nonce = Some(nonce);
    }
    Ok(resp)
  }
}

fn not_initialized() -> Error {
  Error::Config("the session has not fetched a directory yet".to_string())
}
