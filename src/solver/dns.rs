use super::*;
use crate::helpers::b64;
use openssl::sha::sha256;
use serde_json::json;
use tracing::info;
use tracing::instrument;
use tracing::Level;

const TXT_TTL: u32 = 300;

/// Somewhere TXT records can be published, e.g. a DNS provider API.
#[async_trait]
pub trait TxtRecordPublisher: Send + Sync {
  async fn publish(&self, name: &str, value: &str, ttl: u32)
    -> Result<(), Error>;

  async fn remove(&self, name: &str, value: &str) -> Result<(), Error>;
}

/// Solves `dns-01`. Without a publisher `solve` fails; place the record out
/// of band and challenge with `do_solver_action` unset instead.
#[derive(Clone, Default)]
pub struct DnsSolver {
  publisher: Option<Arc<dyn TxtRecordPublisher>>,
}

impl fmt::Debug for DnsSolver {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DnsSolver")
      .field("publisher", &self.publisher.is_some())
      .finish()
  }
}

impl DnsSolver {
  pub fn new() -> Self {
    DnsSolver { publisher: None }
  }

  pub fn with_publisher(publisher: Arc<dyn TxtRecordPublisher>) -> Self {
    DnsSolver {
      publisher: Some(publisher),
    }
  }
}

fn txt_record(info: &ChallengeInfo) -> Option<(&str, &str, u32)> {
  match &info.proof {
    Proof::DnsTxt { name, value, ttl } => {
      Some((name.as_str(), value.as_str(), *ttl))
    }
    Proof::HttpFile { .. } => None,
  }
}

#[async_trait]
impl ChallengeSolver for DnsSolver {
  fn challenge_type(&self) -> ChallengeType {
    ChallengeType::Dns01
  }

  fn challenge_info(
    &self,
    fqdn: &str,
    token: &str,
    key_authorization: &str,
  ) -> ChallengeInfo {
    ChallengeInfo {
      challenge_type: ChallengeType::Dns01,
      fqdn: fqdn.to_string(),
      token: token.to_string(),
      key_authorization: key_authorization.to_string(),
      proof: Proof::DnsTxt {
        name: format!("_acme-challenge.{}.", fqdn.trim_end_matches('.')),
        value: b64(&sha256(key_authorization.as_bytes())),
        ttl: TXT_TTL,
      },
    }
  }

  #[instrument(level = Level::INFO, name = "acme2_manager::DnsSolver::solve", err, skip(self, info), fields(fqdn = %info.fqdn))]
  async fn solve(&self, info: &ChallengeInfo) -> Result<(), Error> {
    let (name, value, ttl) = txt_record(info).ok_or_else(|| {
      Error::UnsupportedChallengeType(info.challenge_type.to_string())
    })?;
    match &self.publisher {
      Some(publisher) => publisher.publish(name, value, ttl).await,
      None => {
        info!(record = %info.proof, "No DNS publisher configured, cannot publish record");
        Err(Error::Config("no DNS publisher configured".to_string()))
      }
    }
  }

  async fn cleanup(&self, info: &ChallengeInfo) -> Result<(), Error> {
    match (&self.publisher, txt_record(info)) {
      (Some(publisher), Some((name, value, _))) => {
        publisher.remove(name, value).await
      }
      _ => Ok(()),
    }
  }
}

/// Publishes records by calling an HTTP hook: `POST <url>` to add and
/// `DELETE <url>` to remove, both with a `{"name", "value", "ttl"}` body.
#[derive(Debug, Clone)]
pub struct WebhookPublisher {
  url: reqwest::Url,
  http_client: reqwest::Client,
}

impl WebhookPublisher {
  pub fn new(url: String, http_client: reqwest::Client) -> Result<Self, Error> {
    let url = reqwest::Url::parse(&url)
      .map_err(|err| Error::Config(format!("dns_webhook {}: {}", url, err)))?;
    Ok(WebhookPublisher { url, http_client })
  }

  async fn call(
    &self,
    method: reqwest::Method,
    name: &str,
    value: &str,
    ttl: u32,
  ) -> Result<(), Error> {
    let resp = self
      .http_client
      .request(method, self.url.clone())
      .json(&json!({ "name": name, "value": value, "ttl": ttl }))
      .send()
      .await?;
    resp.error_for_status()?;
    Ok(())
  }
}

#[async_trait]
impl TxtRecordPublisher for WebhookPublisher {
  async fn publish(
    &self,
    name: &str,
    value: &str,
    ttl: u32,
  ) -> Result<(), Error> {
    self.call(reqwest::Method::POST, name, value, ttl).await
  }

  async fn remove(&self, name: &str, value: &str) -> Result<(), Error> {
    self.call(reqwest::Method::DELETE, name, value, TXT_TTL).await
  }
}
