use crate::error::*;
use crate::helpers::*;
use openssl::hash::hash;
use openssl::hash::MessageDigest;
use openssl::pkey::HasPublic;
use openssl::pkey::PKeyRef;
use openssl::sign::Signer;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;

#[derive(Serialize, Deserialize, Clone, Default)]
struct JwsHeader {
  nonce: String,
  alg: String,
  url: String,
  jwk: Jwk,
}

/// Members are declared in lexicographic order so the serialized form is
/// already the RFC 7638 thumbprint input.
#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq, Eq)]
pub(crate) struct Jwk {
  e: String,
  kty: String,
  n: String,
}

impl Jwk {
  pub fn new<T: HasPublic>(pkey: &PKeyRef<T>) -> Result<Jwk, Error> {
    let rsa = pkey.rsa()?;
    Ok(Jwk {
      e: b64(&rsa.e().to_vec()),
      kty: "RSA".to_string(),
      n: b64(&rsa.n().to_vec()),
    })
  }

  pub fn thumbprint(&self) -> Result<String, Error> {
    let digest =
      hash(MessageDigest::sha256(), &serde_json::to_vec(self)?)?;
    Ok(b64(&digest))
  }
}

pub(crate) fn jws(
  url: &str,
  nonce: &str,
  payload: &str,
  pkey: &PKeyRef<openssl::pkey::Private>,
) -> Result<String, Error> {
  let payload_b64 = b64(payload.as_bytes());

  let header = JwsHeader {
    nonce: nonce.to_string(),
    alg: "RS256".to_string(),
    url: url.to_string(),
    jwk: Jwk::new(pkey)?,
  };

  let protected_b64 = b64(&serde_json::to_vec(&header)?);

  let signature_b64 = {
    let mut signer = Signer::new(MessageDigest::sha256(), pkey)?;
    signer.update(format!("{}.{}", protected_b64, payload_b64).as_bytes())?;
    b64(&signer.sign_to_vec()?)
  };

  Ok(serde_json::to_string(&json!({
    "protected": protected_b64,
    "payload": payload_b64,
    "signature": signature_b64
  }))?)
}
