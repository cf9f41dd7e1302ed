use crate::error::*;
use crate::session::Endpoint;
use crate::session::Session;
use crate::signing::KeyPair;
use crate::storage::AccountRecord;
use crate::storage::Storage;
use serde_json::json;
use tracing::field;
use tracing::instrument;
use tracing::Level;
use tracing::Span;

/// An account registered with the authority. This is the identity every
/// signed request is made under.
///
/// This resource should be created through an [`AccountBuilder`], or loaded
/// from storage with [`Account::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
  /// Local storage key.
  pub id: String,
  /// Owner email address.
  pub contact: String,
  pub phone: Option<String>,
  /// The key pair that signs requests for this account. It is never used
  /// as a certificate key.
  pub keys: KeyPair,
  /// The registration resource the authority created.
  pub registration_url: String,
}

impl Account {
  /// Loads the account registered for `contact`.
  pub async fn load(
    storage: &dyn Storage,
    contact: &str,
  ) -> Result<Account, Error> {
    storage
      .find_account_by_contact(contact)
      .await?
      .map(Account::from)
      .ok_or_else(|| Error::AccountNotFound(contact.to_string()))
  }

  /// The `contact` member of the registration payload.
  fn contact_uris(contact: &str, phone: Option<&str>) -> Vec<String> {
    let mut uris = vec![if contact.starts_with("mailto:") {
      contact.to_string()
    } else {
      format!("mailto:{}", contact)
    }];
    if let Some(phone) = phone {
      uris.push(if phone.starts_with("tel:") {
        phone.to_string()
      } else {
        format!("tel:{}", phone)
      });
    }
    uris
  }
}

impl From<AccountRecord> for Account {
  fn from(record: AccountRecord) -> Self {
    Account {
      id: record.id,
      contact: record.contact,
      phone: record.phone,
      keys: record.keys,
      registration_url: record.registration_url,
    }
  }
}

impl From<&Account> for AccountRecord {
  fn from(account: &Account) -> Self {
    AccountRecord {
      id: account.id.clone(),
      contact: account.contact.clone(),
      phone: account.phone.clone(),
      keys: account.keys.clone(),
      registration_url: account.registration_url.clone(),
    }
  }
}

/// A builder used to register an [`Account`] with the authority.
#[derive(Debug, Clone)]
pub struct AccountBuilder {
  contact: String,
  phone: Option<String>,
  keys: Option<KeyPair>,
  key_bits: u32,
  terms_of_service_agreed: bool,
}

impl AccountBuilder {
  pub fn new(contact: &str) -> Self {
    AccountBuilder {
      contact: contact.to_string(),
      phone: None,
      keys: None,
      key_bits: 4096,
      terms_of_service_agreed: false,
    }
  }

  pub fn phone(&mut self, phone: &str) -> &mut Self {
    self.phone = Some(phone.to_string());
    self
  }

  /// Register an existing key pair instead of generating one.
  pub fn keys(&mut self, keys: KeyPair) -> &mut Self {
    self.keys = Some(keys);
    self
  }

  /// RSA size of a generated key pair.
  pub fn key_bits(&mut self, key_bits: u32) -> &mut Self {
    self.key_bits = key_bits;
    self
  }

  /// If you agree to the terms of service the directory advertises.
  pub fn terms_of_service_agreed(
    &mut self,
    terms_of_service_agreed: bool,
  ) -> &mut Self {
    self.terms_of_service_agreed = terms_of_service_agreed;
    self
  }

  /// Registers the account and persists it. Registering a contact that is
  /// already stored replaces the stored record.
  #[instrument(level = Level::INFO, name = "acme2_manager::AccountBuilder::register", err, skip(self, session), fields(contact = %self.contact, account_id = field::Empty, registration_url = field::Empty))]
  pub async fn register(&self, session: &Session) -> Result<Account, Error> {
    let keys = match &self.keys {
      Some(keys) => keys.clone(),
      None => session.signer().generate_key_pair(self.key_bits)?,
    };

    let mut payload = json!({
      "resource": Endpoint::NewRegistration.resource(),
      "contact": Account::contact_uris(&self.contact, self.phone.as_deref()),
    });
    if self.terms_of_service_agreed {
      payload["termsOfServiceAgreed"] = json!(true);
      let terms = session.directory().await?.meta();
      if let Some(url) = terms.and_then(|meta| meta.terms_of_service) {
        payload["agreement"] = json!(url);
      }
    }

    let resp = session
      .signed_request(Endpoint::NewRegistration.into(), &payload, &keys)
      .await?;
    if !resp.is_success() {
      return Err(Error::RegistrationRejected {
        status: resp.status.as_u16(),
        source: Box::new(resp.problem()),
      });
    }

    let registration_url = resp.location().ok_or_else(|| {
      Error::BadResponse(
        "mandatory location header in new-reg not present".to_string(),
      )
    })?;
    Span::current()
      .record("registration_url", &field::display(&registration_url));

    let storage = session.storage();
    let existing = storage.find_account_by_contact(&self.contact).await?;
    let mut account = Account {
      id: existing.map(|record| record.id).unwrap_or_default(),
      contact: self.contact.clone(),
      phone: self.phone.clone(),
      keys,
      registration_url,
    };
    account.id = storage.save_account(&AccountRecord::from(&account)).await?;
    Span::current().record("account_id", &field::display(&account.id));

    Ok(account)
  }
}
