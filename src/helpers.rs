use crate::error::Error;
use data_encoding::BASE64;
use data_encoding::BASE64URL_NOPAD;
use openssl::pkey::PKey;
use openssl::pkey::Private;
use openssl::rsa::Rsa;
use serde::Deserialize;
use serde::Serialize;

/// This is a identifier for a resource that the ACME server
/// can provision certificates for (a domain).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
  /// The type of identifier.
  pub r#type: String,
  /// The identifier itself.
  pub value: String,
}

impl Identifier {
  pub fn dns(value: &str) -> Self {
    Identifier {
      r#type: "dns".to_string(),
      value: value.to_string(),
    }
  }
}

pub(crate) fn b64(data: &[u8]) -> String {
  BASE64URL_NOPAD.encode(data)
}

/// Generate a new RSA private key using the specified size,
/// using the system random.
pub fn gen_rsa_private_key(bits: u32) -> Result<PKey<Private>, Error> {
  let rsa = Rsa::generate(bits)?;
  let key = PKey::from_rsa(rsa)?;
  Ok(key)
}

/// Serde adapter storing raw bytes as standard base64 in JSON snapshots.
pub(crate) mod base64_bytes {
  use super::BASE64;
  use serde::de::Error as _;
  use serde::Deserialize;
  use serde::Deserializer;
  use serde::Serializer;

  pub fn serialize<S: Serializer>(
    bytes: &[u8],
    serializer: S,
  ) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
  ) -> Result<Vec<u8>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    BASE64.decode(raw.as_bytes()).map_err(D::Error::custom)
  }
}
