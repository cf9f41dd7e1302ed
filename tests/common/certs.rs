use openssl::asn1::Asn1Integer;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::X509Builder;
use openssl::x509::X509Name;

/// A DER certificate for `names`, valid for `days` from now, like the ones
/// the authority hands back from new-cert.
pub fn self_signed_der(names: &[&str], days: u32) -> Vec<u8> {
  let pkey = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

  let mut builder = X509Builder::new().unwrap();
  builder.set_version(2).unwrap();
  let mut name = X509Name::builder().unwrap();
  name.append_entry_by_text("CN", names[0]).unwrap();
  let name = name.build();
  builder.set_subject_name(&name).unwrap();
  builder.set_issuer_name(&name).unwrap();
  builder.set_pubkey(&pkey).unwrap();

  let serial = Asn1Integer::from_bn(&BigNum::from_u32(1).unwrap()).unwrap();
  builder.set_serial_number(&serial).unwrap();
  builder
    .set_not_before(&Asn1Time::days_from_now(0).unwrap())
    .unwrap();
  builder
    .set_not_after(&Asn1Time::days_from_now(days).unwrap())
    .unwrap();

  let mut san = SubjectAlternativeName::new();
  for name in names {
    san.dns(name);
  }
  let san = san.build(&builder.x509v3_context(None, None)).unwrap();
  builder.append_extension(san).unwrap();

  builder.sign(&pkey, MessageDigest::sha256()).unwrap();
  builder.build().to_der().unwrap()
}
