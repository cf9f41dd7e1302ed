use super::authority::FakeAuthority;
use acme2_manager::config::StorageType;
use acme2_manager::Client;
use acme2_manager::ClientBuilder;
use acme2_manager::ClientConfig;
use acme2_manager::PollPolicy;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// A scratch directory plus a fake authority, torn down on drop.
pub struct TestEnv {
  scratch_dir: TempDir,
  pub authority: FakeAuthority,
}

impl TestEnv {
  pub async fn new() -> Self {
    Self::with_authority(FakeAuthority::new_default().await)
  }

  pub fn with_authority(authority: FakeAuthority) -> Self {
    init_tracing();
    TestEnv {
      scratch_dir: tempfile::tempdir().unwrap(),
      authority,
    }
  }

  pub fn storage_dir(&self) -> PathBuf {
    self.scratch_dir.path().join("var")
  }

  pub fn doc_root(&self) -> PathBuf {
    self.scratch_dir.path().join("www")
  }

  /// Small keys and a fast, tightly bounded poll policy.
  pub fn config(&self) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.api = self.authority.directory_url();
    config.key_bits = 2048;
    config.request_timeout = Duration::from_secs(5);
    config.storage.r#type = StorageType::Filesystem;
    config.storage.path = self.storage_dir();
    config.challenge.doc_root = self.doc_root();
    config.poll = PollPolicy {
      interval: Duration::from_millis(5),
      max_interval: Duration::from_millis(20),
      max_attempts: 5,
      timeout: Some(Duration::from_secs(5)),
    };
    config
  }

  /// A client whose default account is `ops@example.com`.
  pub async fn client(&self) -> Client {
    let mut config = self.config();
    config.account = Some("ops@example.com".to_string());
    ClientBuilder::new(config).build().await.unwrap()
  }

  /// A client with no default account.
  pub async fn anonymous_client(&self) -> Client {
    Client::new(self.config()).await.unwrap()
  }
}

pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}
