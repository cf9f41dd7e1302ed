use crate::error::*;
use crate::helpers::*;
use crate::jws::jws;
use crate::jws::Jwk;
use chrono::DateTime;
use chrono::Utc;
use openssl::asn1::Asn1Time;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::pkey::Private;
use openssl::stack::Stack;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::X509Name;
use openssl::x509::X509Req;
use openssl::x509::X509;
use serde::Deserialize;
use serde::Serialize;

/// An RSA key pair in PEM form. The private half is PKCS#8, the public
/// half is SubjectPublicKeyInfo.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
  pub private_key_pem: String,
  pub public_key_pem: String,
}

impl std::fmt::Debug for KeyPair {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("KeyPair")
      .field("private_key_pem", &"<redacted>")
      .field("public_key_pem", &self.public_key_pem)
      .finish()
  }
}

impl KeyPair {
  pub fn from_private_key(pkey: &PKey<Private>) -> Result<KeyPair, Error> {
    Ok(KeyPair {
      private_key_pem: String::from_utf8(pkey.private_key_to_pem_pkcs8()?)
        .map_err(|err| Error::Crypto(Box::new(err)))?,
      public_key_pem: String::from_utf8(pkey.public_key_to_pem()?)
        .map_err(|err| Error::Crypto(Box::new(err)))?,
    })
  }

  pub(crate) fn private_key(&self) -> Result<PKey<Private>, Error> {
    Ok(PKey::private_key_from_pem(self.private_key_pem.as_bytes())?)
  }
}

/// Key management and JOSE signing used by the protocol layer.
pub trait SigningProvider: Send + Sync {
  fn generate_key_pair(&self, bits: u32) -> Result<KeyPair, Error>;

  /// A DER encoded CSR whose subject is `fqdn` and whose SAN extension
  /// lists `fqdn` followed by `alt_names`.
  fn generate_csr(
    &self,
    fqdn: &str,
    alt_names: &[String],
    keys: &KeyPair,
  ) -> Result<Vec<u8>, Error>;

  fn public_key_thumbprint(&self, keys: &KeyPair) -> Result<String, Error>;

  /// A flattened JWS whose protected header carries `nonce`, `url` and the
  /// public key.
  fn sign_envelope(
    &self,
    payload: &str,
    nonce: &str,
    url: &str,
    keys: &KeyPair,
  ) -> Result<String, Error>;

  /// Accepts DER or PEM.
  fn parse_certificate_expiration(
    &self,
    certificate: &[u8],
  ) -> Result<DateTime<Utc>, Error>;
}

#[derive(Debug, Default, Clone)]
pub struct OpensslProvider;

impl OpensslProvider {
  pub fn new() -> Self {
    OpensslProvider
  }
}

impl SigningProvider for OpensslProvider {
  fn generate_key_pair(&self, bits: u32) -> Result<KeyPair, Error> {
    KeyPair::from_private_key(&gen_rsa_private_key(bits)?)
  }

  fn generate_csr(
    &self,
    fqdn: &str,
    alt_names: &[String],
    keys: &KeyPair,
  ) -> Result<Vec<u8>, Error> {
    let mut domains = vec![fqdn.to_string()];
    for name in alt_names {
      if !domains.contains(name) {
        domains.push(name.clone());
      }
    }
    let csr = gen_csr(&keys.private_key()?, &domains)?;
    Ok(csr.to_der()?)
  }

  fn public_key_thumbprint(&self, keys: &KeyPair) -> Result<String, Error> {
    let pkey = PKey::public_key_from_pem(keys.public_key_pem.as_bytes())?;
    Jwk::new(&pkey)?.thumbprint()
  }

  fn sign_envelope(
    &self,
    payload: &str,
    nonce: &str,
    url: &str,
    keys: &KeyPair,
  ) -> Result<String, Error> {
    let pkey = keys.private_key()?;
    jws(url, nonce, payload, &pkey)
  }

  fn parse_certificate_expiration(
    &self,
    certificate: &[u8],
  ) -> Result<DateTime<Utc>, Error> {
    let cert = if certificate.starts_with(b"-----BEGIN") {
      X509::from_pem(certificate)?
    } else {
      X509::from_der(certificate)?
    };

    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(cert.not_after())?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
      Error::BadResponse(format!("certificate notAfter out of range: {}", secs))
    })
  }
}

fn gen_csr(pkey: &PKey<Private>, domains: &[String]) -> Result<X509Req, Error> {
  if domains.is_empty() {
    return Err(Error::InvalidDomainName(String::new()));
  }

  let mut builder = X509Req::builder()?;
  let name = {
    let mut name = X509Name::builder()?;
    name.append_entry_by_text("CN", &domains[0])?;
    name.build()
  };
  builder.set_subject_name(&name)?;

  // Add all domains as SANs
  let san_extension = {
    let mut san = SubjectAlternativeName::new();
    for domain in domains.iter() {
      san.dns(domain);
    }
    san.build(&builder.x509v3_context(None))?
  };
  let mut stack = Stack::new()?;
  stack.push(san_extension)?;
  builder.add_extensions(&stack)?;

  builder.set_pubkey(pkey)?;
  builder.sign(pkey, MessageDigest::sha256())?;

  Ok(builder.build())
}
