//! Loopback HTTP listener that receives the OAuth2 authorization redirect.

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};
use url::Url;

use drivekit_common::{Error, Result};

const SUCCESS_PAGE: &str = "Authentication successful! Please return to the console.";
const FAILURE_PAGE: &str = "Authentication failed. See the console for details.";

/// Outcome of one request hitting the listener.
#[derive(Debug, PartialEq, Eq)]
enum Callback {
    /// Not the redirect (favicon, other paths, bare reloads).
    Ignored,
    /// Authorization code delivered with the expected state.
    Code(String),
    /// The provider or the request reported a failure.
    Rejected(String),
}

/// Shared between the router and [`CallbackServer::wait_for_code`].
#[derive(Clone)]
struct CallbackState {
    redirect_uri: Arc<Url>,
    expected_state: Arc<str>,
    outcome: Arc<Mutex<Option<oneshot::Sender<Result<String>>>>>,
}

impl CallbackState {
    /// Hand the first terminal outcome to the waiter; later ones are dropped.
    async fn finish(&self, outcome: Result<String>) {
        if let Some(tx) = self.outcome.lock().await.take() {
            let _ = tx.send(outcome);
        }
    }
}

/// Single-use callback server bound to a loopback address.
pub struct CallbackServer {
    listener: TcpListener,
    redirect_uri: Url,
}

impl CallbackServer {
    /// Bind the listener for `redirect`.
    ///
    /// A missing port binds an ephemeral one; the returned server's
    /// [`redirect_uri`](Self::redirect_uri) carries the actual port.
    pub async fn bind(redirect: &Url) -> Result<Self> {
        let port = redirect.port().unwrap_or(0);
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let local = listener.local_addr()?;

        let mut redirect_uri = redirect.clone();
        redirect_uri
            .set_port(Some(local.port()))
            .map_err(|_| Error::Configuration(format!("Cannot set port on {}", redirect)))?;

        debug!(addr = %local, "Callback server listening");

        Ok(Self {
            listener,
            redirect_uri,
        })
    }

    /// Redirect URI to register with the authorization request.
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve requests until the redirect arrives, then return its code.
    ///
    /// Requests for other paths, connections that never send a request and
    /// malformed requests are answered (or dropped) without ending the wait.
    ///
    /// # Errors
    /// - `Error::Authentication` if the redirect carries `error=`, a state
    ///   other than `expected_state`, or no code
    pub async fn wait_for_code(self, expected_state: &str) -> Result<String> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = CallbackState {
            redirect_uri: Arc::new(self.redirect_uri),
            expected_state: Arc::from(expected_state),
            outcome: Arc::new(Mutex::new(Some(outcome_tx))),
        };

        let app = Router::new().fallback(receive).with_state(state);

        // In-flight responses finish in the background after shutdown.
        tokio::spawn(async move {
            if let Err(e) = axum::serve(self.listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                warn!(error = %e, "Callback server stopped");
            }
        });

        let outcome = outcome_rx.await.map_err(|_| {
            Error::Authentication("Callback server stopped before the redirect arrived".to_string())
        });
        let _ = shutdown_tx.send(());

        outcome?
    }
}

async fn receive(State(state): State<CallbackState>, uri: Uri) -> (StatusCode, &'static str) {
    let target = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

    match classify(&state.redirect_uri, target, &state.expected_state) {
        Callback::Ignored => {
            debug!(path = uri.path(), "Ignoring request on callback server");
            (StatusCode::NOT_FOUND, "Not found")
        }
        Callback::Code(code) => {
            state.finish(Ok(code)).await;
            (StatusCode::OK, SUCCESS_PAGE)
        }
        Callback::Rejected(reason) => {
            state.finish(Err(Error::Authentication(reason))).await;
            (StatusCode::BAD_REQUEST, FAILURE_PAGE)
        }
    }
}

fn classify(redirect_uri: &Url, target: &str, expected_state: &str) -> Callback {
    let url = match redirect_uri.join(target) {
        Ok(url) => url,
        Err(_) => return Callback::Ignored,
    };

    if url.path() != redirect_uri.path() {
        return Callback::Ignored;
    }

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "error" => {
                return Callback::Rejected(format!("Authorization denied: {}", value));
            }
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    // A bare hit on the redirect path is not a redirect.
    if code.is_none() && state.is_none() {
        return Callback::Ignored;
    }

    if state.as_deref() != Some(expected_state) {
        return Callback::Rejected("OAuth state mismatch in redirect".to_string());
    }

    match code {
        Some(code) if !code.is_empty() => Callback::Code(code),
        _ => Callback::Rejected("Redirect did not include an authorization code".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    async fn get(addr: SocketAddr, target: &str) -> reqwest::Response {
        reqwest::get(format!("http://{}{}", addr, target)).await.unwrap()
    }

    async fn server(path: &str) -> CallbackServer {
        let redirect = Url::parse(&format!("http://localhost{}", path)).unwrap();
        CallbackServer::bind(&redirect).await.unwrap()
    }

    #[test]
    fn test_classify() {
        let redirect = Url::parse("http://localhost:8080/cb").unwrap();

        assert_eq!(classify(&redirect, "/favicon.ico", "s"), Callback::Ignored);
        assert_eq!(classify(&redirect, "/cb", "s"), Callback::Ignored);
        assert_eq!(
            classify(&redirect, "/cb?code=c&state=s", "s"),
            Callback::Code("c".to_string())
        );
        assert!(matches!(
            classify(&redirect, "/cb?code=c&state=t", "s"),
            Callback::Rejected(_)
        ));
        assert!(matches!(
            classify(&redirect, "/cb?state=s", "s"),
            Callback::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn test_bind_assigns_port() {
        let server = server("/").await;
        let port = server.local_addr().unwrap().port();
        assert_ne!(port, 0);
        assert_eq!(server.redirect_uri().port(), Some(port));
    }

    #[tokio::test]
    async fn test_receives_code() {
        let server = server("/oauth2callback").await;
        let addr = server.local_addr().unwrap();
        let waiter = tokio::spawn(async move { server.wait_for_code("xyz").await });

        let response = get(addr, "/oauth2callback?state=xyz&code=4%2Fabc&scope=drive").await;

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), SUCCESS_PAGE);
        assert_eq!(waiter.await.unwrap().unwrap(), "4/abc");
    }

    #[tokio::test]
    async fn test_ignores_other_paths() {
        let server = server("/oauth2callback").await;
        let addr = server.local_addr().unwrap();
        let waiter = tokio::spawn(async move { server.wait_for_code("s").await });

        let favicon = get(addr, "/favicon.ico").await;
        assert_eq!(favicon.status(), reqwest::StatusCode::NOT_FOUND);

        get(addr, "/oauth2callback?code=c&state=s").await;
        assert_eq!(waiter.await.unwrap().unwrap(), "c");
    }

    #[tokio::test]
    async fn test_empty_connection_does_not_end_wait() {
        let server = server("").await;
        let addr = server.local_addr().unwrap();
        let waiter = tokio::spawn(async move { server.wait_for_code("s").await });

        // Browsers open speculative sockets that never send a request.
        drop(TcpStream::connect(addr).await.unwrap());

        let mut garbage = TcpStream::connect(addr).await.unwrap();
        garbage.write_all(b"not http at all\r\n\r\n").await.unwrap();
        drop(garbage);

        let bare = get(addr, "/").await;
        assert_eq!(bare.status(), reqwest::StatusCode::NOT_FOUND);

        get(addr, "/?code=c&state=s").await;
        assert_eq!(waiter.await.unwrap().unwrap(), "c");
    }

    #[tokio::test]
    async fn test_state_mismatch_rejected() {
        let server = server("/").await;
        let addr = server.local_addr().unwrap();
        let waiter = tokio::spawn(async move { server.wait_for_code("expected").await });

        let response = get(addr, "/?code=c&state=forged").await;

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_provider_error_rejected() {
        let server = server("/").await;
        let addr = server.local_addr().unwrap();
        let waiter = tokio::spawn(async move { server.wait_for_code("s").await });

        get(addr, "/?error=access_denied&state=s").await;

        match waiter.await.unwrap() {
            Err(Error::Authentication(msg)) => assert!(msg.contains("access_denied")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
