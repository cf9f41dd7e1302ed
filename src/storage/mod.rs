//! Persistence of accounts, certificates and the directory/nonce status.

use crate::error::Error;
use crate::helpers::base64_bytes;
use crate::signing::KeyPair;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
  Account,
  Certificate,
}

impl EntityKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      EntityKind::Account => "account",
      EntityKind::Certificate => "certificate",
    }
  }
}

/// Snapshot of a registered [`Account`](crate::Account).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
  pub id: String,
  pub contact: String,
  pub phone: Option<String>,
  pub keys: KeyPair,
  pub registration_url: String,
}

/// Snapshot of an issued [`Certificate`](crate::Certificate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
  pub id: String,
  pub fqdn: String,
  pub alt_names: Vec<String>,
  pub expire_at: DateTime<Utc>,
  #[serde(with = "base64_bytes")]
  pub certificate: Vec<u8>,
  pub private_key: String,
  #[serde(default)]
  pub location: Option<String>,
}

/// The last known nonce and directory document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
  pub nonce: Option<String>,
  pub endpoints: serde_json::Value,
  pub timestamp: DateTime<Utc>,
}

/// A persistence back end.
///
/// `save_*` assigns a fresh id when the record's id is empty and returns
/// the id it stored the record under; saving an existing id overwrites it.
#[async_trait]
pub trait Storage: Send + Sync {
  async fn save_account(&self, record: &AccountRecord) -> Result<String, Error>;

  async fn find_account(&self, id: &str)
    -> Result<Option<AccountRecord>, Error>;

  async fn find_account_by_contact(
    &self,
    contact: &str,
  ) -> Result<Option<AccountRecord>, Error>;

  async fn save_certificate(
    &self,
    record: &CertificateRecord,
  ) -> Result<String, Error>;

  async fn find_certificate(
    &self,
    id: &str,
  ) -> Result<Option<CertificateRecord>, Error>;

  async fn find_certificate_by_domain(
    &self,
    fqdn: &str,
  ) -> Result<Option<CertificateRecord>, Error>;

  /// Deleting an absent record is not an error.
  async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), Error>;

  async fn load_status(&self) -> Result<Option<StatusRecord>, Error>;

  /// Stamps the record with the current time.
  async fn update_status(
    &self,
    nonce: Option<&str>,
    endpoints: &serde_json::Value,
  ) -> Result<(), Error>;
}

pub(crate) fn new_id() -> String {
  uuid::Uuid::new_v4().to_string()
}

pub(crate) fn same_domain(a: &str, b: &str) -> bool {
  a.trim_end_matches('.')
    .eq_ignore_ascii_case(b.trim_end_matches('.'))
}
