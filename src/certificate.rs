use crate::domain::validate_fqdn;
use crate::error::*;
use crate::helpers::b64;
use crate::poll::Poll;
use crate::poll::PollPolicy;
use crate::session::Endpoint;
use crate::session::Session;
use crate::signing::KeyPair;
use crate::storage::CertificateRecord;
use crate::storage::EntityKind;
use crate::storage::Storage;
use chrono::DateTime;
use chrono::Utc;
use openssl::x509::X509;
use reqwest::StatusCode;
use serde_json::json;
use tracing::field;
use tracing::info;
use tracing::instrument;
use tracing::warn;
use tracing::Level;
use tracing::Span;

/// How new certificates are requested.
#[derive(Debug, Clone)]
pub struct IssuePolicy {
  /// RSA size of the certificate key.
  pub key_bits: u32,
  /// Bound on waiting for a certificate the authority is still issuing.
  pub poll: PollPolicy,
}

impl Default for IssuePolicy {
  fn default() -> Self {
    IssuePolicy {
      key_bits: 4096,
      poll: PollPolicy::default(),
    }
  }
}

/// An issued certificate for `fqdn` and its alternate names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
  /// Local storage key.
  pub id: String,
  pub fqdn: String,
  /// Fixed at signing time and reused on renewal.
  pub alt_names: Vec<String>,
  pub expire_at: DateTime<Utc>,
  /// The certificate as returned by the authority, usually DER.
  pub certificate: Vec<u8>,
  /// PEM private key the certificate was requested for.
  pub private_key: String,
  /// Where the authority serves this certificate.
  pub location: Option<String>,
}

/// Checks `fqdn` and every alternate name, failing on the first invalid one.
pub(crate) fn validate_names(
  fqdn: &str,
  alt_names: &[String],
) -> Result<(), Error> {
  validate_fqdn(fqdn)?;
  for name in alt_names {
    validate_fqdn(name)?;
  }
  Ok(())
}

impl Certificate {
  /// The certificate in PEM form.
  pub fn to_pem(&self) -> Result<String, Error> {
    let pem = X509::from_der(&self.der()?)?.to_pem()?;
    String::from_utf8(pem).map_err(|err| Error::Crypto(Box::new(err)))
  }

  fn der(&self) -> Result<Vec<u8>, Error> {
    if self.certificate.starts_with(b"-----BEGIN") {
      Ok(X509::from_pem(&self.certificate)?.to_der()?)
    } else {
      Ok(self.certificate.clone())
    }
  }

  /// Requests a certificate for `fqdn` and `alt_names` under a freshly
  /// generated key, waiting for it when the authority issues it
  /// asynchronously. The result replaces any stored certificate for
  /// `fqdn`.
  #[instrument(level = Level::INFO, name = "acme2_manager::Certificate::sign", err, skip(session, keys, policy), fields(location = field::Empty))]
  pub async fn sign(
    session: &Session,
    keys: &KeyPair,
    fqdn: &str,
    alt_names: &[String],
    policy: &IssuePolicy,
  ) -> Result<Certificate, Error> {
    validate_names(fqdn, alt_names)?;

    let signer = session.signer();
    let cert_keys = signer.generate_key_pair(policy.key_bits)?;
    let csr = signer.generate_csr(fqdn, alt_names, &cert_keys)?;

    let payload = json!({
      "resource": Endpoint::NewCertificate.resource(),
      "csr": b64(&csr),
    });
    let resp = session
      .signed_request(Endpoint::NewCertificate.into(), &payload, keys)
      .await?;
    if !resp.is_success() {
      return Err(resp.problem().into());
    }

    let location = resp.location();
    if let Some(location) = &location {
      Span::current().record("location", &field::display(location));
    }

    let certificate =
      if resp.status == StatusCode::ACCEPTED || resp.body.is_empty() {
        let url = location.as_deref().ok_or_else(|| {
          Error::BadResponse(
            "certificate is not yet available and no location was given"
              .to_string(),
          )
        })?;
        wait_for_certificate(session, url, &policy.poll).await?
      } else {
        resp.body
      };

    let expire_at = signer.parse_certificate_expiration(&certificate)?;

    let storage = session.storage();
    let existing = storage.find_certificate_by_domain(fqdn).await?;
    let mut cert = Certificate {
      id: existing.map(|record| record.id).unwrap_or_default(),
      fqdn: fqdn.to_string(),
      alt_names: alt_names.to_vec(),
      expire_at,
      certificate,
      private_key: cert_keys.private_key_pem,
      location,
    };
    cert.id = storage.save_certificate(&CertificateRecord::from(&cert)).await?;
    info!({ id = %cert.id, expire_at = %cert.expire_at }, "Certificate issued");

    Ok(cert)
  }

  pub async fn find_by_domain_name(
    storage: &dyn Storage,
    fqdn: &str,
  ) -> Result<Certificate, Error> {
    validate_fqdn(fqdn)?;
    storage
      .find_certificate_by_domain(fqdn)
      .await?
      .map(Certificate::from)
      .ok_or_else(|| Error::CertificateNotFound(fqdn.to_string()))
  }

  /// Revokes the stored certificate for `fqdn` and forgets it.
  #[instrument(level = Level::INFO, name = "acme2_manager::Certificate::revoke", err, skip(session, keys))]
  pub async fn revoke(
    session: &Session,
    keys: &KeyPair,
    fqdn: &str,
  ) -> Result<Certificate, Error> {
    let cert = Self::find_by_domain_name(session.storage(), fqdn).await?;
    cert.revoke_remote(session, keys).await?;
    session
      .storage()
      .delete(EntityKind::Certificate, &cert.id)
      .await?;
    Ok(cert)
  }

  /// Revokes the stored certificate for `fqdn` and signs a new one for the
  /// same names. When signing fails after the revocation the stale record
  /// is dropped and [`Error::RenewalLeftRevoked`] is returned.
  #[instrument(level = Level::INFO, name = "acme2_manager::Certificate::renew", err, skip(session, keys, policy))]
  pub async fn renew(
    session: &Session,
    keys: &KeyPair,
    fqdn: &str,
    policy: &IssuePolicy,
  ) -> Result<Certificate, Error> {
    let old = Self::find_by_domain_name(session.storage(), fqdn).await?;
    old.revoke_remote(session, keys).await?;

    match Self::sign(session, keys, &old.fqdn, &old.alt_names, policy).await {
      Ok(cert) => Ok(cert),
      Err(err) => {
        warn!(error = %err, "Re-signing failed, {} is left without a certificate", old.fqdn);
        if let Err(err) = session
          .storage()
          .delete(EntityKind::Certificate, &old.id)
          .await
        {
          warn!(error = %err, "Failed to drop the revoked certificate");
        }
        Err(Error::RenewalLeftRevoked {
          fqdn: old.fqdn,
          alt_names: old.alt_names,
          source: Box::new(err),
        })
      }
    }
  }

  async fn revoke_remote(
    &self,
    session: &Session,
    keys: &KeyPair,
  ) -> Result<(), Error> {
    let payload = json!({
      "resource": Endpoint::RevokeCertificate.resource(),
      "certificate": b64(&self.der()?),
    });
    let resp = session
      .signed_request(Endpoint::RevokeCertificate.into(), &payload, keys)
      .await?;
    if !resp.is_success() {
      return Err(resp.problem().into());
    }
    info!({ id = %self.id, fqdn = %self.fqdn }, "Certificate revoked");
    Ok(())
  }
}

/// Polls `url` until the authority serves the certificate body.
async fn wait_for_certificate(
  session: &Session,
  url: &str,
  policy: &PollPolicy,
) -> Result<Vec<u8>, Error> {
  policy
    .run(url, move || async move {
      let resp = session.get(url).await?;
      if !resp.is_success() {
        return Err(resp.problem().into());
      }
      if resp.status == StatusCode::ACCEPTED || resp.body.is_empty() {
        Ok(Poll::Pending {
          retry_after: resp.retry_after(),
        })
      } else {
        Ok(Poll::Ready(resp.body))
      }
    })
    .await
}

impl From<CertificateRecord> for Certificate {
  fn from(record: CertificateRecord) -> Self {
    Certificate {
      id: record.id,
      fqdn: record.fqdn,
      alt_names: record.alt_names,
      expire_at: record.expire_at,
      certificate: record.certificate,
      private_key: record.private_key,
      location: record.location,
    }
  }
}

impl From<&Certificate> for CertificateRecord {
  fn from(cert: &Certificate) -> Self {
    CertificateRecord {
      id: cert.id.clone(),
      fqdn: cert.fqdn.clone(),
      alt_names: cert.alt_names.clone(),
      expire_at: cert.expire_at,
      certificate: cert.certificate.clone(),
      private_key: cert.private_key.clone(),
      location: cert.location.clone(),
    }
  }
}
