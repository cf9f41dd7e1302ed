use crate::account::Account;
use crate::account::AccountBuilder;
use crate::certificate::validate_names;
use crate::certificate::Certificate;
use crate::certificate::IssuePolicy;
use crate::config::ClientConfig;
use crate::config::StorageType;
use crate::error::*;
use crate::ownership::Ownership;
use crate::session::Session;
use crate::signing::KeyPair;
use crate::signing::OpensslProvider;
use crate::signing::SigningProvider;
use crate::solver::ChallengeInfo;
use crate::solver::ChallengeSolver;
use crate::solver::SolverRegistry;
use crate::storage::FileStorage;
use crate::storage::MemoryStorage;
use crate::storage::Storage;
use crate::transport::HttpTransport;
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;
use tracing::instrument;
use tracing::Level;

/// Wires a [`Client`] from a [`ClientConfig`]. Any collaborator that is not
/// supplied is built from the configuration.
pub struct ClientBuilder {
  config: ClientConfig,
  transport: Option<Arc<dyn Transport>>,
  signer: Option<Arc<dyn SigningProvider>>,
  storage: Option<Arc<dyn Storage>>,
  solvers: Vec<Arc<dyn ChallengeSolver>>,
}

impl ClientBuilder {
  pub fn new(config: ClientConfig) -> Self {
    ClientBuilder {
      config,
      transport: None,
      signer: None,
      storage: None,
      solvers: vec![],
    }
  }

  pub fn transport(&mut self, transport: Arc<dyn Transport>) -> &mut Self {
    self.transport = Some(transport);
    self
  }

  pub fn signer(&mut self, signer: Arc<dyn SigningProvider>) -> &mut Self {
    self.signer = Some(signer);
    self
  }

  pub fn storage(&mut self, storage: Arc<dyn Storage>) -> &mut Self {
    self.storage = Some(storage);
    self
  }

  /// Registers a solver on top of the built-in ones, replacing the
  /// built-in solver of the same type.
  pub fn solver(&mut self, solver: Arc<dyn ChallengeSolver>) -> &mut Self {
    self.solvers.push(solver);
    self
  }

  pub async fn build(&self) -> Result<Client, Error> {
    let config = self.config.clone();

    let transport: Arc<dyn Transport> = match &self.transport {
      Some(transport) => transport.clone(),
      None => Arc::new(HttpTransport::new(
        &config.user_agent,
        config.request_timeout,
      )?),
    };
    let signer: Arc<dyn SigningProvider> = match &self.signer {
      Some(signer) => signer.clone(),
      None => Arc::new(OpensslProvider::new()),
    };
    let storage: Arc<dyn Storage> = match &self.storage {
      Some(storage) => storage.clone(),
      None => match config.storage.r#type {
        StorageType::Filesystem => {
          Arc::new(FileStorage::open(&config.storage.path).await?)
        }
        StorageType::Memory => Arc::new(MemoryStorage::new()),
      },
    };

    let mut solvers = SolverRegistry::from_config(&config.challenge)?;
    for solver in &self.solvers {
      solvers.register(solver.clone());
    }

    Ok(Client {
      session: Session::new(config.api.clone(), transport, signer, storage),
      solvers,
      initialized_at: Mutex::new(None),
      account: Mutex::new(None),
      config,
    })
  }
}

/// The single entry point: keeps the session initialized, holds the active
/// account and runs every workflow with that account's keys.
///
/// Calls may be made concurrently from several tasks; signed requests are
/// serialized by the session.
pub struct Client {
  config: ClientConfig,
  session: Session,
  solvers: SolverRegistry,
  initialized_at: Mutex<Option<Instant>>,
  account: Mutex<Option<Account>>,
}

impl std::fmt::Debug for Client {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Client")
      .field("api", &self.config.api)
      .field("solvers", &self.solvers)
      .finish()
  }
}

impl Client {
  pub async fn new(config: ClientConfig) -> Result<Client, Error> {
    ClientBuilder::new(config).build().await
  }

  pub fn config(&self) -> &ClientConfig {
    &self.config
  }

  /// For driving [`Ownership`] and [`Certificate`] directly.
  pub fn session(&self) -> &Session {
    &self.session
  }

  fn issue_policy(&self) -> IssuePolicy {
    IssuePolicy {
      key_bits: self.config.key_bits,
      poll: self.config.poll.clone(),
    }
  }

  /// Refreshes the directory and nonce when this process has not done so
  /// within `nonce_max_age`, then makes sure the configured default account
  /// is loaded, registering it if it does not exist yet.
  ///
  /// A failed provisioning is attempted again on the next call.
  async fn init(&self) -> Result<(), Error> {
    {
      let mut initialized_at = self.initialized_at.lock().await;
      let fresh = match *initialized_at {
        Some(at) => at.elapsed() <= self.config.nonce_max_age,
        None => false,
      };
      if !fresh {
        self.session.refresh(self.config.nonce_max_age).await?;
        *initialized_at = Some(Instant::now());
      }
    }

    let contact = match &self.config.account {
      Some(contact) => contact,
      None => return Ok(()),
    };
    let mut active = self.account.lock().await;
    if active.is_some() {
      return Ok(());
    }
    let account = match Account::load(self.session.storage(), contact).await {
      Ok(account) => account,
      Err(Error::AccountNotFound(_)) => {
        info!({ contact = %contact }, "Default account not found, registering it");
        self
          .register(contact, self.config.phone.as_deref(), None)
          .await?
      }
      Err(err) => return Err(err),
    };
    *active = Some(account);
    Ok(())
  }

  async fn register(
    &self,
    contact: &str,
    phone: Option<&str>,
    keys: Option<KeyPair>,
  ) -> Result<Account, Error> {
    let mut builder = AccountBuilder::new(contact);
    builder
      .key_bits(self.config.key_bits)
      .terms_of_service_agreed(self.config.agree_terms);
    if let Some(phone) = phone {
      builder.phone(phone);
    }
    if let Some(keys) = keys {
      builder.keys(keys);
    }
    builder.register(&self.session).await
  }

  async fn keys(&self) -> Result<KeyPair, Error> {
    self
      .account
      .lock()
      .await
      .as_ref()
      .map(|account| account.keys.clone())
      .ok_or(Error::NoActiveAccount)
  }

  /// The active account, if one was loaded or registered.
  pub async fn account(&self) -> Option<Account> {
    self.account.lock().await.clone()
  }

  /// Makes the stored account for `contact` the active one.
  pub async fn load_account(&self, contact: &str) -> Result<Account, Error> {
    let account = Account::load(self.session.storage(), contact).await?;
    *self.account.lock().await = Some(account.clone());
    Ok(account)
  }

  /// Registers and stores a new account, which becomes the active one. A
  /// key pair is generated unless `keys` is given.
  #[instrument(level = Level::INFO, name = "acme2_manager::Client::new_account", err, skip(self, keys))]
  pub async fn new_account(
    &self,
    contact: &str,
    phone: Option<&str>,
    keys: Option<KeyPair>,
  ) -> Result<Account, Error> {
    self.init().await?;
    let account = self.register(contact, phone, keys).await?;
    *self.account.lock().await = Some(account.clone());
    Ok(account)
  }

  /// Creates a new authorization for `value` under the active account.
  pub async fn new_ownership(&self, value: &str) -> Result<Ownership, Error> {
    self.init().await?;
    let keys = self.keys().await?;
    let mut ownership = Ownership::new(value);
    ownership.register(&self.session, &keys).await?;
    Ok(ownership)
  }

  /// The proof to place for `fqdn`, for solving the challenge by hand.
  /// `challenge_type` overrides the configured default solver.
  pub async fn get_challenge_data(
    &self,
    fqdn: &str,
    challenge_type: Option<&str>,
  ) -> Result<ChallengeInfo, Error> {
    let solver = self.solvers.resolve(challenge_type)?;
    self.init().await?;
    let keys = self.keys().await?;
    Ownership::new(fqdn)
      .challenge_data(&self.session, &keys, solver.as_ref())
      .await
  }

  /// Proves control of `fqdn`. With `do_solver_action` unset the proof is
  /// expected to be in place already, e.g. after [`Self::get_challenge_data`].
  #[instrument(level = Level::INFO, name = "acme2_manager::Client::challenge_ownership", err, skip(self))]
  pub async fn challenge_ownership(
    &self,
    fqdn: &str,
    challenge_type: Option<&str>,
    do_solver_action: bool,
  ) -> Result<Ownership, Error> {
    let solver = self.solvers.resolve(challenge_type)?;
    self.init().await?;
    let keys = self.keys().await?;
    let mut ownership = Ownership::new(fqdn);
    ownership
      .challenge(
        &self.session,
        &keys,
        solver.as_ref(),
        do_solver_action,
        &self.config.poll,
      )
      .await?;
    Ok(ownership)
  }

  /// Signs a certificate for names whose ownership was already proven.
  pub async fn sign_certificate(
    &self,
    fqdn: &str,
    alt_names: &[String],
  ) -> Result<Certificate, Error> {
    validate_names(fqdn, alt_names)?;
    self.init().await?;
    let keys = self.keys().await?;
    Certificate::sign(&self.session, &keys, fqdn, alt_names, &self.issue_policy())
      .await
  }

  /// Proves ownership of every name with the selected solver, then signs.
  #[instrument(level = Level::INFO, name = "acme2_manager::Client::obtain_certificate", err, skip(self))]
  pub async fn obtain_certificate(
    &self,
    fqdn: &str,
    alt_names: &[String],
    challenge_type: Option<&str>,
  ) -> Result<Certificate, Error> {
    validate_names(fqdn, alt_names)?;
    self.solvers.resolve(challenge_type)?;

    let mut names = vec![fqdn.to_string()];
    for name in alt_names {
      if !names.contains(name) {
        names.push(name.clone());
      }
    }
    for name in &names {
      self.challenge_ownership(name, challenge_type, true).await?;
    }

    self.sign_certificate(fqdn, alt_names).await
  }

  /// The stored certificate for `fqdn`. Never contacts the authority.
  pub async fn find_certificate(&self, fqdn: &str) -> Result<Certificate, Error> {
    Certificate::find_by_domain_name(self.session.storage(), fqdn).await
  }

  /// The raw bytes of the stored certificate for `fqdn`.
  pub async fn get_certificate(&self, fqdn: &str) -> Result<Vec<u8>, Error> {
    Ok(self.find_certificate(fqdn).await?.certificate)
  }

  pub async fn revoke_certificate(&self, fqdn: &str) -> Result<(), Error> {
    self.init().await?;
    let keys = self.keys().await?;
    Certificate::revoke(&self.session, &keys, fqdn).await?;
    Ok(())
  }

  pub async fn renew_certificate(
    &self,
    fqdn: &str,
  ) -> Result<Certificate, Error> {
    self.init().await?;
    let keys = self.keys().await?;
    Certificate::renew(&self.session, &keys, fqdn, &self.issue_policy()).await
  }
}
