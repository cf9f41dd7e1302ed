use serde::Deserialize;
use std::time::Duration;

/// A boxed lower-layer failure (transport, storage or crypto back end).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Stable numeric codes for [`Error`], so callers can branch on a failure
/// category without matching on the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
  InvalidDomainName = 1,
  UnsupportedChallengeType = 2,
  AccountNotFound = 10,
  NoActiveAccount = 11,
  CertificateNotFound = 12,
  Server = 20,
  RegistrationRejected = 21,
  BadResponse = 22,
  ChallengeInvalid = 23,
  MissingEndpoint = 24,
  MaxAttemptsExceeded = 30,
  Timeout = 31,
  RenewalLeftRevoked = 40,
  Transport = 50,
  Storage = 51,
  Crypto = 52,
  Config = 53,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("invalid domain name: {0:?}")]
  InvalidDomainName(String),

  #[error("challenge solver type {0} is not supported")]
  UnsupportedChallengeType(String),

  #[error("no account found for contact {0}")]
  AccountNotFound(String),

  #[error("no account is loaded or registered")]
  NoActiveAccount,

  #[error("unable to find certificate matching {0} domain name")]
  CertificateNotFound(String),

  #[error(transparent)]
  Server(#[from] ServerError),

  #[error("registration rejected by the authority (HTTP {status})")]
  RegistrationRejected {
    status: u16,
    #[source]
    source: BoxError,
  },

  #[error("bad authority response: {0}")]
  BadResponse(String),

  #[error("challenge validation failed for {fqdn}: {reason}")]
  ChallengeInvalid { fqdn: String, reason: String },

  #[error("the directory does not advertise the {0} endpoint")]
  MissingEndpoint(String),

  #[error("gave up polling {resource} after {attempts} attempts")]
  MaxAttemptsExceeded { resource: String, attempts: usize },

  #[error("polling {resource} timed out after {after:?}")]
  Timeout { resource: String, after: Duration },

  #[error("renewal revoked the certificate for {fqdn} but re-signing failed")]
  RenewalLeftRevoked {
    fqdn: String,
    alt_names: Vec<String>,
    #[source]
    source: Box<Error>,
  },

  #[error("transport error: {0}")]
  Transport(#[source] BoxError),

  #[error("storage error: {0}")]
  Storage(#[source] BoxError),

  #[error("crypto error: {0}")]
  Crypto(#[source] BoxError),

  #[error("configuration error: {0}")]
  Config(String),
}

impl Error {
  pub fn code(&self) -> ErrorCode {
    match self {
      Error::InvalidDomainName(_) => ErrorCode::InvalidDomainName,
      Error::UnsupportedChallengeType(_) => ErrorCode::UnsupportedChallengeType,
      Error::AccountNotFound(_) => ErrorCode::AccountNotFound,
      Error::NoActiveAccount => ErrorCode::NoActiveAccount,
      Error::CertificateNotFound(_) => ErrorCode::CertificateNotFound,
      Error::Server(_) => ErrorCode::Server,
      Error::RegistrationRejected { .. } => ErrorCode::RegistrationRejected,
      Error::BadResponse(_) => ErrorCode::BadResponse,
      Error::ChallengeInvalid { .. } => ErrorCode::ChallengeInvalid,
      Error::MissingEndpoint(_) => ErrorCode::MissingEndpoint,
      Error::MaxAttemptsExceeded { .. } => ErrorCode::MaxAttemptsExceeded,
      Error::Timeout { .. } => ErrorCode::Timeout,
      Error::RenewalLeftRevoked { .. } => ErrorCode::RenewalLeftRevoked,
      Error::Transport(_) => ErrorCode::Transport,
      Error::Storage(_) => ErrorCode::Storage,
      Error::Crypto(_) => ErrorCode::Crypto,
      Error::Config(_) => ErrorCode::Config,
    }
  }

  /// Validation failures are never retried and never reach the authority.
  pub fn is_validation(&self) -> bool {
    matches!(
      self,
      Error::InvalidDomainName(_) | Error::UnsupportedChallengeType(_)
    )
  }

  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      Error::AccountNotFound(_)
        | Error::CertificateNotFound(_)
        | Error::NoActiveAccount
    )
  }
}

#[derive(Debug, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(&'static str);

pub fn transport_err(msg: &'static str) -> Error {
  Error::Transport(Box::new(TransportError(msg)))
}

impl From<reqwest::Error> for Error {
  fn from(err: reqwest::Error) -> Self {
    Self::Transport(Box::new(err))
  }
}

impl From<serde_json::Error> for Error {
  fn from(err: serde_json::Error) -> Self {
    Self::BadResponse(err.to_string())
  }
}

impl From<openssl::error::ErrorStack> for Error {
  fn from(err: openssl::error::ErrorStack) -> Self {
    Self::Crypto(Box::new(err))
  }
}

impl From<std::io::Error> for Error {
  fn from(err: std::io::Error) -> Self {
    Self::Storage(Box::new(err))
  }
}

impl From<toml::de::Error> for Error {
  fn from(err: toml::de::Error) -> Self {
    Self::Config(err.to_string())
  }
}

/// This is an error as returned by the ACME server.
#[derive(Deserialize, Debug, Clone, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("ServerError({}): {}: {}", r#type.clone().unwrap_or_default(), title.clone().unwrap_or_default(), detail.clone().unwrap_or_default())]
pub struct ServerError {
  /// The type of this error.
  pub r#type: Option<String>,
  /// The human readable title of this error.
  pub title: Option<String>,
  /// The status code of this error.
  pub status: Option<u16>,
  /// The human readable extra description for this error.
  pub detail: Option<String>,
}

impl ServerError {
  /// Both the `urn:acme:error:` and `urn:ietf:params:acme:error:` namespaces
  /// are accepted.
  pub fn is_type(&self, name: &str) -> bool {
    match &self.r#type {
      Some(typ) => typ.rsplit(':').next() == Some(name),
      None => false,
    }
  }

  /// The most specific human readable reason available.
  pub fn reason(&self) -> String {
    self
      .detail
      .clone()
      .or_else(|| self.title.clone())
      .or_else(|| self.r#type.clone())
      .unwrap_or_else(|| "no reason given".to_string())
  }
}
