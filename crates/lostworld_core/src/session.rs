use tracing::{info, warn};

use crate::client::{AuthCheck, ClientOptions, VrcClient};
use crate::credentials::CredentialStore;
use crate::errors::{SessionError, TrackerError};
use crate::login::InteractiveLogin;
use crate::models::{CredentialSet, CurrentUser};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NoCredentials,
    Valid(CurrentUser),
    RequiresSecondFactor,
    Invalid(String),
}

impl SessionState {
    pub fn into_error(self) -> Option<TrackerError> {
        match self {
            SessionState::Valid(_) => None,
            SessionState::NoCredentials => Some(TrackerError::CredentialUnavailable),
            SessionState::RequiresSecondFactor => Some(TrackerError::SecondFactorRequired),
            SessionState::Invalid(reason) => Some(TrackerError::SessionInvalid(reason)),
        }
    }
}

/// An authenticated client together with the account it belongs to.
pub struct Session {
    pub client: VrcClient,
    pub user: CurrentUser,
}

pub struct SessionValidator {
    options: ClientOptions,
}

impl SessionValidator {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }

    /// One "who am I" call. Only a 401 maps to [`SessionState::Invalid`];
    /// every other failure is returned as an error.
    pub async fn validate(
        &self,
        credentials: Option<&CredentialSet>,
    ) -> Result<SessionState, TrackerError> {
        let Some(credentials) = credentials.filter(|c| !c.is_empty()) else {
            return Ok(SessionState::NoCredentials);
        };
        let client = VrcClient::new(self.options.clone(), credentials)?;
        match client.check_auth().await {
            Ok(AuthCheck::Authenticated(user)) => Ok(SessionState::Valid(user)),
            Ok(AuthCheck::RequiresSecondFactor) => Ok(SessionState::RequiresSecondFactor),
            Err(TrackerError::Unauthorized { body, .. }) => {
                warn!(%body, "session rejected with 401");
                Ok(SessionState::Invalid(body))
            }
            Err(err) => Err(err),
        }
    }

    /// Validates the stored cookies and, if they are not usable, runs the
    /// login once, persists its cookies and validates again.
    pub async fn establish<L>(
        &self,
        store: &CredentialStore,
        login: &L,
    ) -> Result<Session, SessionError>
    where
        L: InteractiveLogin,
    {
        if let Some(session) = self.try_stored(store).await? {
            return Ok(session);
        }

        let outcome = login.request_login().await?;
        if outcome.has_auth_cookie {
            store.save(&outcome.cookies)?;
        } else {
            warn!("login finished without an auth cookie");
        }

        match self.try_stored(store).await? {
            Some(session) => Ok(session),
            None => Err(SessionError::LoginFailed(
                "the session is still not usable after logging in".into(),
            )),
        }
    }

    async fn try_stored(&self, store: &CredentialStore) -> Result<Option<Session>, TrackerError> {
        let credentials = store.load();
        let state = self.validate(credentials.as_ref()).await?;
        match (state, credentials) {
            (SessionState::Valid(user), Some(credentials)) => {
                info!(user = %user.display_name, "session is valid");
                let client = VrcClient::new(self.options.clone(), &credentials)?;
                Ok(Some(Session { client, user }))
            }
            (state, _) => {
                if let Some(err) = state.into_error() {
                    info!(reason = %err, "stored session not usable");
                }
                Ok(None)
            }
        }
    }
}

/// Logs the stored session out and forgets it. Returns `None` when there was
/// nothing stored.
pub async fn logout(
    options: &ClientOptions,
    store: &CredentialStore,
) -> Result<Option<String>, TrackerError> {
    let Some(credentials) = store.load() else {
        return Ok(None);
    };
    let client = VrcClient::new(options.clone(), &credentials)?;
    let response = client.logout().await?;
    store.clear()?;
    info!(status = response.success.status_code, "logged out");
    Ok(Some(response.success.message))
}
