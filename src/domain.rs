use crate::error::Error;

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Checks `name` against hostname syntax: at least two dot separated
/// labels of 1 to 63 letters, digits or hyphens, no label starting or
/// ending with a hyphen, 253 octets at most. A single trailing dot is
/// allowed.
pub fn validate_fqdn(name: &str) -> Result<(), Error> {
  let invalid = || Err(Error::InvalidDomainName(name.to_string()));

  let trimmed = name.strip_suffix('.').unwrap_or(name);
  if trimmed.is_empty() || trimmed.len() > MAX_NAME_LEN {
    return invalid();
  }

  let labels: Vec<&str> = trimmed.split('.').collect();
  if labels.len() < 2 {
    return invalid();
  }

  for label in labels {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
      return invalid();
    }
    if label.starts_with('-') || label.ends_with('-') {
      return invalid();
    }
    if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
      return invalid();
    }
  }

  Ok(())
}
