//! Login guard for authenticated operations.

use crate::error::{AuthError, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use trawl_browser::BrowserError;

/// Something that can tell whether it is logged in and log itself in.
#[async_trait]
pub trait Authenticator: Send {
    fn logged(&self) -> bool;

    async fn do_login(&mut self) -> Result<()>;
}

/// Log in unless already logged.
///
/// # Errors
/// Propagates login errors; [`AuthError::Assertion`] if the session is still
/// not logged after a login that reported success.
pub async fn ensure_logged_in<A>(authenticator: &mut A) -> Result<()>
where
    A: Authenticator + ?Sized,
{
    if authenticator.logged() {
        return Ok(());
    }

    tracing::debug!("not logged in, logging in");
    authenticator.do_login().await?;

    if authenticator.logged() {
        Ok(())
    } else {
        Err(AuthError::Assertion(
            "still not logged in after a successful login".to_string(),
        ))
    }
}

/// Run `op` logged in; if the site ended the session, log in again once and
/// retry.
pub async fn retry_on_logout<A, T, F>(authenticator: &mut A, mut op: F) -> Result<T>
where
    A: Authenticator + ?Sized,
    F: for<'a> FnMut(&'a mut A) -> BoxFuture<'a, Result<T>> + Send,
    T: Send,
{
    ensure_logged_in(authenticator).await?;
    match op(authenticator).await {
        Err(AuthError::LoggedOut) => {
            tracing::info!("session ended by the site, logging in again");
            authenticator.do_login().await?;
            op(authenticator).await
        }
        other => other,
    }
}

/// Turn an HTTP client error into a domain error.
///
/// `classify` receives the status and body of 4xx responses; when it declines,
/// the error becomes an assertion naming status and URL. Other browser errors
/// pass through.
pub fn translate_http_error<F>(error: BrowserError, classify: F) -> AuthError
where
    F: FnOnce(u16, &str) -> Option<AuthError>,
{
    match error {
        BrowserError::Http { status, url, body } if (400..500).contains(&status) => {
            classify(status, &body).unwrap_or_else(|| {
                AuthError::Assertion(format!("unexpected HTTP {status} on {url}"))
            })
        }
        other => AuthError::Browser(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[derive(Default)]
    struct Session {
        logged: bool,
        broken_login: bool,
        logins: u32,
        expire_once: bool,
    }

    #[async_trait]
    impl Authenticator for Session {
        fn logged(&self) -> bool {
            self.logged
        }

        async fn do_login(&mut self) -> Result<()> {
            self.logins += 1;
            self.logged = !self.broken_login;
            Ok(())
        }
    }

    impl Session {
        async fn accounts(&mut self) -> Result<Vec<&'static str>> {
            if self.expire_once {
                self.expire_once = false;
                self.logged = false;
                return Err(AuthError::LoggedOut);
            }
            Ok(vec!["checking"])
        }
    }

    #[tokio::test]
    async fn test_login_only_when_needed() {
        let mut session = Session::default();
        ensure_logged_in(&mut session).await.expect("login");
        ensure_logged_in(&mut session).await.expect("already logged");
        assert_eq!(session.logins, 1);
    }

    #[tokio::test]
    async fn test_login_that_does_not_stick_is_an_assertion() {
        let mut session = Session {
            broken_login: true,
            ..Session::default()
        };
        let err = ensure_logged_in(&mut session).await.expect_err("not logged");
        assert!(matches!(err, AuthError::Assertion(_)));
    }

    #[tokio::test]
    async fn test_retry_on_logout_relogs_once() {
        let mut session = Session {
            expire_once: true,
            ..Session::default()
        };
        let accounts = retry_on_logout(&mut session, |s| s.accounts().boxed())
            .await
            .expect("retried");
        assert_eq!(accounts, vec!["checking"]);
        assert_eq!(session.logins, 2);
    }

    #[test]
    fn test_translate_http_error() {
        let err = translate_http_error(
            BrowserError::Http {
                status: 401,
                url: "https://bank.example/login".to_string(),
                body: r#"{"code": "BAD_CREDENTIALS"}"#.to_string(),
            },
            |status, body| {
                (status == 401 && body.contains("BAD_CREDENTIALS"))
                    .then(|| AuthError::incorrect_password("bad credentials"))
            },
        );
        assert!(matches!(err, AuthError::IncorrectPassword { .. }));

        let err = translate_http_error(
            BrowserError::Http {
                status: 403,
                url: "https://bank.example/x".to_string(),
                body: String::new(),
            },
            |_, _| None,
        );
        assert!(matches!(err, AuthError::Assertion(ref m) if m.contains("403")));

        let err = translate_http_error(
            BrowserError::Http {
                status: 500,
                url: "https://bank.example/x".to_string(),
                body: String::new(),
            },
            |_, _| Some(AuthError::LoggedOut),
        );
        assert!(matches!(err, AuthError::Browser(_)));
    }
}
