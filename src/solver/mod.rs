//! Proof-of-control mechanics, one solver per challenge type.
//!
//! The authorization protocol in [`Ownership`](crate::Ownership) is the same
//! for every challenge type; what differs is the proof record handed to the
//! operator and how it gets placed. That part lives behind
//! [`ChallengeSolver`].

use crate::config::ChallengeConfig;
use crate::error::Error;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

mod dns;
mod http;

pub use dns::DnsSolver;
pub use dns::TxtRecordPublisher;
pub use dns::WebhookPublisher;
pub use http::HttpSolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeType {
  Http01,
  Dns01,
}

impl ChallengeType {
  /// The name used on the wire, e.g. `http-01`.
  pub fn as_str(&self) -> &'static str {
    match self {
      ChallengeType::Http01 => "http-01",
      ChallengeType::Dns01 => "dns-01",
    }
  }

  /// The short name used in configuration and API calls, e.g. `http`.
  pub fn short_name(&self) -> &'static str {
    match self {
      ChallengeType::Http01 => "http",
      ChallengeType::Dns01 => "dns",
    }
  }
}

impl fmt::Display for ChallengeType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ChallengeType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "http" | "http-01" => Ok(ChallengeType::Http01),
      "dns" | "dns-01" => Ok(ChallengeType::Dns01),
      _ => Err(Error::UnsupportedChallengeType(s.to_string())),
    }
  }
}

/// The actionable proof for one challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proof {
  /// Serve `content` at `url`, i.e. at `path` below the web root.
  HttpFile {
    path: String,
    url: String,
    content: String,
  },
  /// Publish a TXT record.
  DnsTxt { name: String, value: String, ttl: u32 },
}

impl fmt::Display for Proof {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Proof::HttpFile { url, content, .. } => {
        write!(f, "{} => {}", url, content)
      }
      Proof::DnsTxt { name, value, ttl } => {
        write!(f, "{} {} IN TXT \"{}\"", name, ttl, value)
      }
    }
  }
}

/// Everything needed to satisfy a challenge, manually or through
/// [`ChallengeSolver::solve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeInfo {
  pub challenge_type: ChallengeType,
  pub fqdn: String,
  pub token: String,
  pub key_authorization: String,
  pub proof: Proof,
}

#[async_trait]
pub trait ChallengeSolver: Send + Sync {
  fn challenge_type(&self) -> ChallengeType;

  fn challenge_info(
    &self,
    fqdn: &str,
    token: &str,
    key_authorization: &str,
  ) -> ChallengeInfo;

  /// Places the proof so the authority can find it.
  async fn solve(&self, info: &ChallengeInfo) -> Result<(), Error>;

  /// Removes the proof once validation is over.
  async fn cleanup(&self, _info: &ChallengeInfo) -> Result<(), Error> {
    Ok(())
  }
}

/// Solvers by challenge type, with the configured default.
#[derive(Clone)]
pub struct SolverRegistry {
  default_type: String,
  solvers: HashMap<ChallengeType, Arc<dyn ChallengeSolver>>,
}

impl fmt::Debug for SolverRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SolverRegistry")
      .field("default_type", &self.default_type)
      .field("solvers", &self.solvers.keys().collect::<Vec<_>>())
      .finish()
  }
}

impl SolverRegistry {
  pub fn new(default_type: &str) -> Self {
    SolverRegistry {
      default_type: default_type.to_string(),
      solvers: HashMap::new(),
    }
  }

  /// The built-in `http-01` and `dns-01` solvers set up from `config`.
  pub fn from_config(config: &ChallengeConfig) -> Result<Self, Error> {
    let mut registry = SolverRegistry::new(&config.r#type);
    registry.register(Arc::new(HttpSolver::new(&config.doc_root)));

    let dns = match &config.dns_webhook {
      Some(url) => DnsSolver::with_publisher(Arc::new(WebhookPublisher::new(
        url.clone(),
        reqwest::Client::new(),
      )?)),
      None => DnsSolver::new(),
    };
    registry.register(Arc::new(dns));
    Ok(registry)
  }

  /// Replaces any solver already registered for the same type.
  pub fn register(&mut self, solver: Arc<dyn ChallengeSolver>) -> &mut Self {
    self.solvers.insert(solver.challenge_type(), solver);
    self
  }

  /// The solver for `requested`, or for the default type when `None`.
  pub fn resolve(
    &self,
    requested: Option<&str>,
  ) -> Result<Arc<dyn ChallengeSolver>, Error> {
    let name = requested.unwrap_or(&self.default_type);
    ChallengeType::from_str(name)
      .ok()
      .and_then(|typ| self.solvers.get(&typ).cloned())
      .ok_or_else(|| Error::UnsupportedChallengeType(name.to_string()))
  }
}
