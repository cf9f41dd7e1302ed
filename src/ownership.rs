use crate::domain::validate_fqdn;
use crate::error::*;
use crate::helpers::Identifier;
use crate::poll::Poll;
use crate::poll::PollPolicy;
use crate::session::Endpoint;
use crate::session::Session;
use crate::signing::KeyPair;
use crate::solver::ChallengeInfo;
use crate::solver::ChallengeSolver;
use serde::Deserialize;
use serde_json::json;
use tracing::field;
use tracing::info;
use tracing::instrument;
use tracing::warn;
use tracing::Level;
use tracing::Span;

/// The status of an authorization. Possible values are "pending",
/// "processing", "valid", "invalid", "deactivated", "expired", and
/// "revoked".
#[derive(Deserialize, Debug, Clone, Copy, Eq, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub enum AuthorizationStatus {
  #[default]
  Pending,
  Processing,
  Valid,
  Invalid,
  Deactivated,
  Expired,
  Revoked,
}

impl AuthorizationStatus {
  pub fn is_pending(&self) -> bool {
    matches!(
      self,
      AuthorizationStatus::Pending | AuthorizationStatus::Processing
    )
  }
}

/// The status of a challenge. Possible values are "pending",
/// "processing", "valid", and "invalid".
#[derive(Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ChallengeStatus {
  Pending,
  Processing,
  Valid,
  Invalid,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
  /// The type of challenge encoded in the object, e.g. `http-01`.
  #[serde(rename = "type")]
  pub typ: String,
  /// The URL to which a response can be posted.
  #[serde(alias = "url")]
  pub uri: String,
  /// A random value that uniquely identifies the challenge.
  pub token: Option<String>,
  pub status: Option<ChallengeStatus>,
  /// Error that occurred while the server was validating the
  /// challenge, if any.
  pub error: Option<ServerError>,
}

impl Challenge {
  fn is_usable(&self) -> bool {
    !self.uri.is_empty() && self.token.as_deref().is_some_and(|t| !t.is_empty())
  }
}

/// The authority's view of an authorization resource.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
  pub identifier: Identifier,
  #[serde(default)]
  pub status: AuthorizationStatus,
  pub expires: Option<String>,
  #[serde(default)]
  pub challenges: Vec<Challenge>,
}

impl Authorization {
  /// The most specific failure reason among the challenges, preferring the
  /// one of type `typ`.
  fn failure_reason(&self, typ: &str) -> String {
    let errors = self
      .challenges
      .iter()
      .filter(|c| c.typ == typ)
      .chain(self.challenges.iter().filter(|c| c.typ != typ));
    errors
      .filter_map(|c| c.error.as_ref())
      .map(|err| err.reason())
      .next()
      .unwrap_or_else(|| format!("authorization is {:?}", self.status))
  }
}

/// Proof of control over one domain, tied to an authorization resource.
///
/// `unregistered -> pending -> valid | invalid`. Terminal states never go
/// back to pending; a new `Ownership` has to be registered to retry.
#[derive(Debug, Clone)]
pub struct Ownership {
  value: String,
  url: Option<String>,
  authorization: Option<Authorization>,
}

impl Ownership {
  pub fn new(value: &str) -> Self {
    Ownership {
      value: value.to_string(),
      url: None,
      authorization: None,
    }
  }

  /// The domain this ownership is about.
  pub fn value(&self) -> &str {
    &self.value
  }

  /// The authorization resource, once registered.
  pub fn url(&self) -> Option<&str> {
    self.url.as_deref()
  }

  pub fn status(&self) -> Option<AuthorizationStatus> {
    self.authorization.as_ref().map(|authz| authz.status)
  }

  pub fn challenges(&self) -> &[Challenge] {
    self
      .authorization
      .as_ref()
      .map(|authz| authz.challenges.as_slice())
      .unwrap_or_default()
  }

  /// Asks the authority for a new authorization of `value`.
  #[instrument(level = Level::INFO, name = "acme2_manager::Ownership::register", err, skip(self, session, keys), fields(value = %self.value, url = field::Empty, status = field::Empty))]
  pub async fn register(
    &mut self,
    session: &Session,
    keys: &KeyPair,
  ) -> Result<(), Error> {
    validate_fqdn(&self.value)?;

    let payload = json!({
      "resource": Endpoint::NewAuthorization.resource(),
      "identifier": Identifier::dns(&self.value),
    });
    let resp = session
      .signed_request(Endpoint::NewAuthorization.into(), &payload, keys)
      .await?;
    if !resp.is_success() {
      return Err(resp.problem().into());
    }

    let url = resp.location().ok_or_else(|| {
      Error::BadResponse(
        "mandatory location header in new-authz not present".to_string(),
      )
    })?;
    let authorization: Authorization = resp.json()?;
    if !authorization.challenges.iter().any(Challenge::is_usable) {
      return Err(Error::BadResponse(format!(
        "authorization for {} offers no usable challenge",
        self.value
      )));
    }

    Span::current().record("url", &field::display(&url));
    Span::current().record("status", &field::debug(&authorization.status));
    self.url = Some(url);
    self.authorization = Some(authorization);
    Ok(())
  }

  async fn ensure_registered(
    &mut self,
    session: &Session,
    keys: &KeyPair,
  ) -> Result<(), Error> {
    if self.authorization.is_none() {
      self.register(session, keys).await?;
    }
    Ok(())
  }

  fn select(&self, solver: &dyn ChallengeSolver) -> Result<&Challenge, Error> {
    let typ = solver.challenge_type();
    self
      .challenges()
      .iter()
      .find(|c| c.typ == typ.as_str() && c.is_usable())
      .ok_or_else(|| {
        Error::BadResponse(format!(
          "the authority offers no {} challenge for {}",
          typ, self.value
        ))
      })
  }

  /// The proof `solver` would place for this domain, without submitting
  /// anything.
  pub async fn challenge_data(
    &mut self,
    session: &Session,
    keys: &KeyPair,
    solver: &dyn ChallengeSolver,
  ) -> Result<ChallengeInfo, Error> {
    self.ensure_registered(session, keys).await?;
    let challenge = self.select(solver)?;
    let token = challenge.token.clone().unwrap_or_default();
    let key_authorization = format!(
      "{}.{}",
      token,
      session.signer().public_key_thumbprint(keys)?
    );
    Ok(solver.challenge_info(&self.value, &token, &key_authorization))
  }

  /// Places the proof (when `do_solver_action`), submits it and waits for
  /// the authority to decide. An authorization that is already valid is
  /// left alone.
  #[instrument(level = Level::INFO, name = "acme2_manager::Ownership::challenge", err, skip(self, session, keys, solver, poll), fields(value = %self.value, typ = %solver.challenge_type(), status = field::Empty))]
  pub async fn challenge(
    &mut self,
    session: &Session,
    keys: &KeyPair,
    solver: &dyn ChallengeSolver,
    do_solver_action: bool,
    poll: &PollPolicy,
  ) -> Result<(), Error> {
    self.ensure_registered(session, keys).await?;

    match self.status() {
      Some(AuthorizationStatus::Valid) => {
        info!("Authorization is already valid");
        return Ok(());
      }
      Some(status) if !status.is_pending() => {
        return Err(self.invalid(solver));
      }
      _ => {}
    }

    let info = self.challenge_data(session, keys, solver).await?;
    let uri = self.select(solver)?.uri.clone();

    if do_solver_action {
      solver.solve(&info).await?;
    }
    let outcome = self.submit_and_wait(session, keys, &uri, &info, poll).await;
    if do_solver_action {
      if let Err(err) = solver.cleanup(&info).await {
        warn!(error = %err, "Failed to clean up challenge proof");
      }
    }
    outcome?;

    Span::current().record("status", &field::debug(&self.status()));
    match self.status() {
      Some(AuthorizationStatus::Valid) => Ok(()),
      _ => Err(self.invalid(solver)),
    }
  }

  async fn submit_and_wait(
    &mut self,
    session: &Session,
    keys: &KeyPair,
    uri: &str,
    info: &ChallengeInfo,
    poll: &PollPolicy,
  ) -> Result<(), Error> {
    let payload = json!({
      "resource": "challenge",
      "type": info.challenge_type.as_str(),
      "keyAuthorization": info.key_authorization,
    });
    let resp = session.signed_request(uri.into(), &payload, keys).await?;
    if !resp.is_success() {
      return Err(resp.problem().into());
    }

    let url = self.url.clone().unwrap_or_default();
    let authz_url = url.as_str();
    let authorization = poll
      .run(authz_url, move || async move {
        let resp = session.get(authz_url).await?;
        let retry_after = resp.retry_after();
        let authorization: Authorization = resp.into_result()?;
        if authorization.status.is_pending() {
          Ok(Poll::Pending { retry_after })
        } else {
          Ok(Poll::Ready(authorization))
        }
      })
      .await?;

    self.authorization = Some(authorization);
    Ok(())
  }

  fn invalid(&self, solver: &dyn ChallengeSolver) -> Error {
    let reason = match &self.authorization {
      Some(authz) => authz.failure_reason(solver.challenge_type().as_str()),
      None => "authorization was never registered".to_string(),
    };
    Error::ChallengeInvalid {
      fqdn: self.value.clone(),
      reason,
    }
  }
}
