//! JSON files on disk.
//!
//! ```text
//! <root>/
//! ├── status.json
//! ├── accounts/<id>.json
//! └── certificates/<id>.json
//! ```

use super::*;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;
use tracing::info;
use tracing::warn;

const STATUS_FILE: &str = "status.json";

#[derive(Debug, Clone)]
pub struct FileStorage {
  base_path: PathBuf,
}

impl FileStorage {
  /// Creates the directory structure if needed. Directories get 0700 and
  /// files 0600 on Unix since account snapshots hold private keys.
  pub async fn open(base_path: impl AsRef<Path>) -> Result<Self, Error> {
    let base_path = base_path.as_ref().to_path_buf();
    for kind in [EntityKind::Account, EntityKind::Certificate] {
      fs::create_dir_all(base_path.join(dir_name(kind))).await?;
    }

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      let perms = std::fs::Permissions::from_mode(0o700);
      fs::set_permissions(&base_path, perms.clone()).await?;
      for kind in [EntityKind::Account, EntityKind::Certificate] {
        fs::set_permissions(base_path.join(dir_name(kind)), perms.clone())
          .await?;
      }
    }

    info!(storage_path = %base_path.display(), "Opened ACME file storage");
    Ok(FileStorage { base_path })
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  fn record_path(&self, kind: EntityKind, id: &str) -> Result<PathBuf, Error> {
    if id.is_empty()
      || !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
      return Err(Error::Storage(
        format!("invalid {} id {:?}", kind.as_str(), id).into(),
      ));
    }
    Ok(
      self
        .base_path
        .join(dir_name(kind))
        .join(format!("{}.json", id)),
    )
  }

  async fn write_json<T: Serialize>(
    &self,
    path: &Path,
    value: &T,
  ) -> Result<(), Error> {
    let content = serde_json::to_vec_pretty(value)
      .map_err(|err| Error::Storage(Box::new(err)))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).await?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
        .await?;
    }

    fs::rename(&tmp, path).await?;
    Ok(())
  }

  async fn read_json<T: DeserializeOwned>(
    &self,
    path: &Path,
  ) -> Result<Option<T>, Error> {
    let content = match fs::read(path).await {
      Ok(content) => content,
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
        return Ok(None)
      }
      Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&content)
      .map_err(|err| Error::Storage(Box::new(err)))?;
    Ok(Some(value))
  }

  async fn scan<T, F>(&self, kind: EntityKind, matches: F) -> Result<Option<T>, Error>
  where
    T: DeserializeOwned,
    F: Fn(&T) -> bool,
  {
    let mut entries = fs::read_dir(self.base_path.join(dir_name(kind))).await?;
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }
      match self.read_json::<T>(&path).await {
        Ok(Some(record)) if matches(&record) => return Ok(Some(record)),
        Ok(_) => {}
        Err(err) => {
          warn!(path = %path.display(), error = %err, "Skipping unreadable record")
        }
      }
    }
    Ok(None)
  }
}

fn dir_name(kind: EntityKind) -> &'static str {
  match kind {
    EntityKind::Account => "accounts",
    EntityKind::Certificate => "certificates",
  }
}

#[async_trait]
impl Storage for FileStorage {
  async fn save_account(&self, record: &AccountRecord) -> Result<String, Error> {
    let mut record = record.clone();
    if record.id.is_empty() {
      record.id = new_id();
    }
    let path = self.record_path(EntityKind::Account, &record.id)?;
    self.write_json(&path, &record).await?;
    debug!(id = %record.id, contact = %record.contact, "Saved account");
    Ok(record.id)
  }

  async fn find_account(
    &self,
    id: &str,
  ) -> Result<Option<AccountRecord>, Error> {
    let path = self.record_path(EntityKind::Account, id)?;
    self.read_json(&path).await
  }

  async fn find_account_by_contact(
    &self,
    contact: &str,
  ) -> Result<Option<AccountRecord>, Error> {
    self
      .scan(EntityKind::Account, |a: &AccountRecord| a.contact == contact)
      .await
  }

  async fn save_certificate(
    &self,
    record: &CertificateRecord,
  ) -> Result<String, Error> {
    let mut record = record.clone();
    if record.id.is_empty() {
      record.id = new_id();
    }
    let path = self.record_path(EntityKind::Certificate, &record.id)?;
    self.write_json(&path, &record).await?;
    debug!(id = %record.id, fqdn = %record.fqdn, "Saved certificate");
    Ok(record.id)
  }

  async fn find_certificate(
    &self,
    id: &str,
  ) -> Result<Option<CertificateRecord>, Error> {
    let path = self.record_path(EntityKind::Certificate, id)?;
    self.read_json(&path).await
  }

  async fn find_certificate_by_domain(
    &self,
    fqdn: &str,
  ) -> Result<Option<CertificateRecord>, Error> {
    self
      .scan(EntityKind::Certificate, |c: &CertificateRecord| {
        same_domain(&c.fqdn, fqdn)
      })
      .await
  }

  async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), Error> {
    let path = self.record_path(kind, id)?;
    match fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(err) => Err(err.into()),
    }
  }

  async fn load_status(&self) -> Result<Option<StatusRecord>, Error> {
    self.read_json(&self.base_path.join(STATUS_FILE)).await
  }

  async fn update_status(
    &self,
    nonce: Option<&str>,
    endpoints: &serde_json::Value,
  ) -> Result<(), Error> {
    let status = StatusRecord {
      nonce: nonce.map(|n| n.to_string()),
      endpoints: endpoints.clone(),
      timestamp: Utc::now(),
    };
    self
      .write_json(&self.base_path.join(STATUS_FILE), &status)
      .await
  }
}
