use std::future::Future;

use tokio::sync::oneshot;
use tracing::debug;

use crate::errors::TrackerError;
use crate::models::CredentialSet;

pub const LOGIN_PAGE_URL: &str = "https://vrchat.com/home/login";
pub const HOME_PAGE_URL: &str = "https://vrchat.com/home";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub cookies: CredentialSet,
    pub has_auth_cookie: bool,
}

impl LoginOutcome {
    pub fn from_cookies(cookies: CredentialSet) -> Self {
        let has_auth_cookie = cookies.has_auth_cookie();
        Self {
            cookies,
            has_auth_cookie,
        }
    }
}

/// Anything that can put a human through the platform login and hand back
/// the resulting cookie jar: an embedded browser, headless automation, or a
/// pasted `Cookie` header.
pub trait InteractiveLogin {
    fn request_login(&self) -> impl Future<Output = Result<LoginOutcome, TrackerError>> + Send;
}

/// Runs a blocking login surface on its own thread and waits for its single
/// result.
pub async fn run_blocking_login<F>(surface: F) -> Result<LoginOutcome, TrackerError>
where
    F: FnOnce() -> Result<LoginOutcome, TrackerError> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        let _ = tx.send(surface());
    });
    let outcome = rx
        .await
        .map_err(|_| TrackerError::Other("login surface closed without a result".into()))?;
    debug!("login surface returned");
    outcome
}
