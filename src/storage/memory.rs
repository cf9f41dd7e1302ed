use super::*;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;

#[derive(Debug, Default)]
struct Tables {
  accounts: HashMap<String, AccountRecord>,
  certificates: HashMap<String, CertificateRecord>,
  status: Option<StatusRecord>,
}

/// Process-local storage. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  tables: Mutex<Tables>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Seeds the status record, e.g. to simulate an old nonce.
  pub fn set_status(&self, status: StatusRecord) {
    self.tables().status = Some(status);
  }

  fn tables(&self) -> MutexGuard<'_, Tables> {
    self.tables.lock().unwrap_or_else(|e| e.into_inner())
  }
}

#[async_trait]
impl Storage for MemoryStorage {
  async fn save_account(&self, record: &AccountRecord) -> Result<String, Error> {
    let mut record = record.clone();
    if record.id.is_empty() {
      record.id = new_id();
    }
    let id = record.id.clone();
    self.tables().accounts.insert(id.clone(), record);
    Ok(id)
  }

  async fn find_account(
    &self,
    id: &str,
  ) -> Result<Option<AccountRecord>, Error> {
    Ok(self.tables().accounts.get(id).cloned())
  }

  async fn find_account_by_contact(
    &self,
    contact: &str,
  ) -> Result<Option<AccountRecord>, Error> {
    Ok(
      self
        .tables()
        .accounts
        .values()
        .find(|a| a.contact == contact)
        .cloned(),
    )
  }

  async fn save_certificate(
    &self,
    record: &CertificateRecord,
  ) -> Result<String, Error> {
    let mut record = record.clone();
    if record.id.is_empty() {
      record.id = new_id();
    }
    let id = record.id.clone();
    self.tables().certificates.insert(id.clone(), record);
    Ok(id)
  }

  async fn find_certificate(
    &self,
    id: &str,
  ) -> Result<Option<CertificateRecord>, Error> {
    Ok(self.tables().certificates.get(id).cloned())
  }

  async fn find_certificate_by_domain(
    &self,
    fqdn: &str,
  ) -> Result<Option<CertificateRecord>, Error> {
    Ok(
      self
        .tables()
        .certificates
        .values()
        .find(|c| same_domain(&c.fqdn, fqdn))
        .cloned(),
    )
  }

  async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), Error> {
    let mut tables = self.tables();
    match kind {
      EntityKind::Account => {
        tables.accounts.remove(id);
      }
      EntityKind::Certificate => {
        tables.certificates.remove(id);
      }
    }
    Ok(())
  }

  async fn load_status(&self) -> Result<Option<StatusRecord>, Error> {
    Ok(self.tables().status.clone())
  }

  async fn update_status(
    &self,
    nonce: Option<&str>,
    endpoints: &serde_json::Value,
  ) -> Result<(), Error> {
    self.tables().status = Some(StatusRecord {
      nonce: nonce.map(|n| n.to_string()),
      endpoints: endpoints.clone(),
      timestamp: Utc::now(),
    });
    Ok(())
  }
}
