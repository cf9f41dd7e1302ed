use crate::error::Error;
use crate::poll::PollPolicy;
use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API: &str = "https://acme-v01.api.letsencrypt.org/directory";

/// Maximum age of a persisted nonce before the directory is fetched again.
pub const NONCE_MAX_AGE: Duration = Duration::from_secs(86_400);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
  /// The directory URL of the authority.
  pub api: String,
  /// Contact address of the account to load, or register when missing.
  pub account: Option<String>,
  pub phone: Option<String>,
  /// Accept the terms of service advertised in the directory `meta` when
  /// registering accounts.
  pub agree_terms: bool,
  /// RSA modulus size for generated account and certificate keys.
  pub key_bits: u32,
  #[serde(with = "humantime_serde")]
  pub nonce_max_age: Duration,
  #[serde(with = "humantime_serde")]
  pub request_timeout: Duration,
  pub user_agent: String,
  pub storage: StorageConfig,
  pub challenge: ChallengeConfig,
  pub poll: PollPolicy,
}

impl Default for ClientConfig {
  fn default() -> Self {
    ClientConfig {
      api: DEFAULT_API.to_string(),
      account: None,
      phone: None,
      agree_terms: false,
      key_bits: 4096,
      nonce_max_age: NONCE_MAX_AGE,
      request_timeout: Duration::from_secs(30),
      user_agent: format!("acme2-manager/{}", env!("CARGO_PKG_VERSION")),
      storage: StorageConfig::default(),
      challenge: ChallengeConfig::default(),
      poll: PollPolicy::default(),
    }
  }
}

impl ClientConfig {
  pub fn from_toml_str(raw: &str) -> Result<Self, Error> {
    Ok(toml::from_str(raw)?)
  }

  pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path).await.map_err(|err| {
      Error::Config(format!("reading {}: {}", path.display(), err))
    })?;
    Self::from_toml_str(&raw)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
  Filesystem,
  Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  pub r#type: StorageType,
  /// Root directory of the filesystem back end.
  pub path: PathBuf,
}

impl Default for StorageConfig {
  fn default() -> Self {
    StorageConfig {
      r#type: StorageType::Filesystem,
      path: PathBuf::from("var"),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
  /// Default solver, `http` or `dns` (wire names are accepted too).
  pub r#type: String,
  /// Web root the `http-01` solver writes below.
  pub doc_root: PathBuf,
  /// Hook used by the `dns-01` solver to publish TXT records.
  pub dns_webhook: Option<String>,
}

impl Default for ChallengeConfig {
  fn default() -> Self {
    ChallengeConfig {
      r#type: "http".to_string(),
      doc_root: PathBuf::new(),
      dns_webhook: None,
    }
  }
}
