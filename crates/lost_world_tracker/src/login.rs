use console::style;
use lostworld_core::login::HOME_PAGE_URL;
use lostworld_core::models::AUTH_COOKIE;
use lostworld_core::{
    run_blocking_login, CredentialSet, InteractiveLogin, LoginOutcome, TrackerError,
    LOGIN_PAGE_URL,
};

use crate::prompts::prompt_input;

/// Login by pasting the `Cookie` header of a signed-in browser tab.
pub struct PasteCookieLogin;

impl InteractiveLogin for PasteCookieLogin {
    async fn request_login(&self) -> Result<LoginOutcome, TrackerError> {
        run_blocking_login(|| {
            println!("{}", style("Log in with your browser.").cyan().bold());
            println!("  1. Open {LOGIN_PAGE_URL} and sign in (complete two-factor if asked).");
            println!("  2. Once {HOME_PAGE_URL} is shown, copy the request `Cookie` header");
            println!("     from the browser's developer tools.");
            let raw = prompt_input("Cookie").map_err(|err| TrackerError::Other(err.to_string()))?;
            let outcome = LoginOutcome::from_cookies(CredentialSet::parse_header(&raw));
            if !outcome.has_auth_cookie {
                println!(
                    "{}",
                    style(format!("No `{AUTH_COOKIE}` cookie found in the pasted value.")).yellow()
                );
            }
            Ok(outcome)
        })
        .await
    }
}
