use super::*;
use std::path::Path;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;
use tracing::instrument;
use tracing::Level;

/// HTTP-01 challenge path prefix, relative to the web root.
pub const ACME_CHALLENGE_PREFIX: &str = ".well-known/acme-challenge/";

/// Solves `http-01` by writing the key authorization below a web root that
/// the domain serves over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpSolver {
  doc_root: PathBuf,
}

impl HttpSolver {
  pub fn new(doc_root: impl AsRef<Path>) -> Self {
    HttpSolver {
      doc_root: doc_root.as_ref().to_path_buf(),
    }
  }

  fn file_path(&self, token: &str) -> Result<PathBuf, Error> {
    if self.doc_root.as_os_str().is_empty() {
      return Err(Error::Config(
        "http-01 solver has no doc_root configured".to_string(),
      ));
    }
    // Tokens are base64url; anything else could escape the web root.
    if token.is_empty()
      || !token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
      return Err(Error::BadResponse(format!(
        "challenge token {:?} is not base64url",
        token
      )));
    }
    Ok(self.doc_root.join(ACME_CHALLENGE_PREFIX).join(token))
  }
}

#[async_trait]
impl ChallengeSolver for HttpSolver {
  fn challenge_type(&self) -> ChallengeType {
    ChallengeType::Http01
  }

  fn challenge_info(
    &self,
    fqdn: &str,
    token: &str,
    key_authorization: &str,
  ) -> ChallengeInfo {
    let path = format!("{}{}", ACME_CHALLENGE_PREFIX, token);
    ChallengeInfo {
      challenge_type: ChallengeType::Http01,
      fqdn: fqdn.to_string(),
      token: token.to_string(),
      key_authorization: key_authorization.to_string(),
      proof: Proof::HttpFile {
        url: format!("http://{}/{}", fqdn.trim_end_matches('.'), path),
        path,
        content: key_authorization.to_string(),
      },
    }
  }

  #[instrument(level = Level::INFO, name = "acme2_manager::HttpSolver::solve", err, skip(self, info), fields(fqdn = %info.fqdn, token = %info.token))]
  async fn solve(&self, info: &ChallengeInfo) -> Result<(), Error> {
    let path = self.file_path(&info.token)?;
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }
    fs::write(&path, info.key_authorization.as_bytes()).await?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))
        .await?;
    }

    debug!(path = %path.display(), "Wrote challenge file");
    Ok(())
  }

  async fn cleanup(&self, info: &ChallengeInfo) -> Result<(), Error> {
    let path = self.file_path(&info.token)?;
    match fs::remove_file(&path).await {
      Ok(()) => {
        debug!(path = %path.display(), "Removed challenge file");
        Ok(())
      }
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(err) => Err(err.into()),
    }
  }
}
