//! Single-use loopback listener for the OAuth redirect
//!
//! Binds `127.0.0.1:0`, serves exactly one callback on
//! [`CALLBACK_PATH`](crate::constants::CALLBACK_PATH) and shuts itself down
//! as soon as that callback arrives. Any other path gets a 404 and the
//! listener keeps waiting.
//!
//! The listener is owned by a [`CallbackListener`] guard. Dropping the guard
//! (success, timeout, error, or the caller abandoning the future) closes the
//! socket, so a port is never left bound past its authorization attempt.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::Router;
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::constants::{CALLBACK_PATH, LOOPBACK_HOST};
use crate::error::{Error, Result};

/// How long a closed listener may keep draining in-flight responses before
/// its task is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const CONFIRMATION_PAGE: &str = "<!doctype html><meta charset=\"utf-8\">\
<title>Signed in</title>\
<p>You can close this window and return to the app.</p>";

/// State shared between the guard and the callback handler.
struct Shared {
    expected_state: String,
    outcome: Mutex<Option<oneshot::Sender<Result<String>>>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl Shared {
    fn take_outcome(&self) -> Option<oneshot::Sender<Result<String>>> {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Signal the server to stop accepting. Returns false if already closed.
    fn shut_down(&self) -> bool {
        let sender = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

/// Guard over a bound loopback listener.
pub struct CallbackListener {
    port: u16,
    redirect_uri: String,
    started: Instant,
    shared: Arc<Shared>,
    receiver: Option<oneshot::Receiver<Result<String>>>,
    server: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Bind an ephemeral loopback port and start serving callbacks that must
    /// echo `expected_state`.
    ///
    /// The authorization timeout is measured from here.
    pub async fn bind(expected_state: &str) -> Result<Self> {
        let listener = TcpListener::bind((LOOPBACK_HOST, 0))
            .await
            .map_err(|e| Error::Listener(format!("binding {LOOPBACK_HOST}:0: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::Listener(format!("reading bound address: {e}")))?
            .port();
        let redirect_uri = format!("http://{LOOPBACK_HOST}:{port}{CALLBACK_PATH}");

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let shared = Arc::new(Shared {
            expected_state: expected_state.to_string(),
            outcome: Mutex::new(Some(outcome_tx)),
            shutdown: Mutex::new(Some(shutdown_tx)),
        });

        let app = router(shared.clone());
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            match result {
                Ok(()) => debug!(port, "callback listener closed"),
                Err(e) => warn!(port, error = %e, "callback listener failed"),
            }
        });

        info!(port, "callback listener bound");
        Ok(Self {
            port,
            redirect_uri,
            started: Instant::now(),
            shared,
            receiver: Some(outcome_rx),
            server: Some(server),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The exact redirect URI for both the authorization URL and the code
    /// exchange.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Wait for the first callback, or until `timeout` after binding.
    ///
    /// The listener is closed on every exit path.
    pub async fn wait(mut self, timeout: Duration) -> Result<String> {
        let receiver = self
            .receiver
            .take()
            .ok_or_else(|| Error::Internal("callback already awaited".into()))?;

        let outcome = tokio::time::timeout_at(self.started + timeout, receiver).await;
        self.close();

        match outcome {
            Err(_) => {
                warn!(port = self.port, "no callback before timeout");
                Err(Error::AuthTimeout)
            }
            Ok(Err(_)) => Err(Error::Internal(
                "callback listener stopped before a callback arrived".into(),
            )),
            Ok(Ok(result)) => result,
        }
    }

    /// Stop accepting connections. Idempotent; teardown errors are ignored.
    pub fn close(&mut self) {
        if self.shared.shut_down() {
            debug!(port = self.port, "closing callback listener");
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.close();
        let Some(server) = self.server.take() else {
            return;
        };
        if server.is_finished() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let abort = server.abort_handle();
                runtime.spawn(async move {
                    if tokio::time::timeout(SHUTDOWN_GRACE, server).await.is_err() {
                        abort.abort();
                    }
                });
            }
            Err(_) => server.abort(),
        }
    }
}

fn router(shared: Arc<Shared>) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(handle_callback))
        .fallback(|| async { (StatusCode::NOT_FOUND, "Not found") })
        .with_state(shared)
}

async fn handle_callback(
    State(shared): State<Arc<Shared>>,
    RawQuery(query): RawQuery,
) -> Response {
    // Any hit on the callback path ends the attempt, valid or not.
    let Some(sender) = shared.take_outcome() else {
        debug!("ignoring late callback");
        return (StatusCode::BAD_REQUEST, "Invalid request").into_response();
    };
    shared.shut_down();

    let params: HashMap<String, String> = url::form_urlencoded::parse(
        query.as_deref().unwrap_or_default().as_bytes(),
    )
    .into_owned()
    .fold(HashMap::new(), |mut params, (key, value)| {
        params.entry(key).or_insert(value);
        params
    });

    let outcome = validate_callback(&params, &shared.expected_state);
    let response = match &outcome {
        Ok(_) => Html(CONFIRMATION_PAGE).into_response(),
        Err(e) => {
            warn!(error = %e, "rejected authorization callback");
            (StatusCode::BAD_REQUEST, "Invalid request").into_response()
        }
    };
    let _ = sender.send(outcome);
    response
}

fn validate_callback(params: &HashMap<String, String>, expected_state: &str) -> Result<String> {
    if let Some(error) = params.get("error") {
        return Err(Error::InvalidCallback(format!("provider returned {error}")));
    }
    let code = params
        .get("code")
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::InvalidCallback("missing authorization code".into()))?;
    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(Error::InvalidCallback("state mismatch".into()));
    }
    Ok(code.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_shared(state: &str) -> (Arc<Shared>, oneshot::Receiver<Result<String>>) {
        let (tx, rx) = oneshot::channel();
        let (shutdown_tx, _shutdown_rx) = oneshot::channel();
        let shared = Arc::new(Shared {
            expected_state: state.into(),
            outcome: Mutex::new(Some(tx)),
            shutdown: Mutex::new(Some(shutdown_tx)),
        });
        (shared, rx)
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn validate_accepts_matching_state() {
        let params = HashMap::from([
            ("code".to_string(), "4/0abc".to_string()),
            ("state".to_string(), "s1".to_string()),
        ]);
        assert_eq!(validate_callback(&params, "s1").unwrap(), "4/0abc");
    }

    #[test]
    fn validate_rejects_missing_code_and_bad_state() {
        let no_code = HashMap::from([("state".to_string(), "s1".to_string())]);
        assert!(matches!(
            validate_callback(&no_code, "s1"),
            Err(Error::InvalidCallback(_))
        ));

        let empty_code = HashMap::from([
            ("code".to_string(), String::new()),
            ("state".to_string(), "s1".to_string()),
        ]);
        assert!(validate_callback(&empty_code, "s1").is_err());

        let wrong_state = HashMap::from([
            ("code".to_string(), "c".to_string()),
            ("state".to_string(), "other".to_string()),
        ]);
        let err = validate_callback(&wrong_state, "s1").unwrap_err();
        assert!(err.to_string().contains("state mismatch"));

        let no_state = HashMap::from([("code".to_string(), "c".to_string())]);
        assert!(validate_callback(&no_state, "s1").is_err());
    }

    #[test]
    fn validate_surfaces_provider_denial() {
        let params = HashMap::from([
            ("error".to_string(), "access_denied".to_string()),
            ("state".to_string(), "s1".to_string()),
        ]);
        let err = validate_callback(&params, "s1").unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[tokio::test]
    async fn other_paths_are_404_and_keep_waiting() {
        let (shared, mut rx) = test_shared("s1");
        let response = router(shared.clone())
            .oneshot(get_request("/favicon.ico"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(rx.try_recv().is_err());
        assert!(shared.outcome.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn valid_callback_returns_confirmation_page() {
        let (shared, rx) = test_shared("s1");
        let response = router(shared.clone())
            .oneshot(get_request("/oauth2/callback?code=4%2F0abc&state=s1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("You can close this window"));
        assert_eq!(rx.await.unwrap().unwrap(), "4/0abc");
        assert!(shared.shutdown.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn mismatched_state_is_400_and_fails_attempt() {
        let (shared, rx) = test_shared("s1");
        let response = router(shared)
            .oneshot(get_request("/oauth2/callback?code=c&state=forged"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(matches!(rx.await.unwrap(), Err(Error::InvalidCallback(_))));
    }

    #[tokio::test]
    async fn late_duplicate_is_rejected() {
        let (shared, rx) = test_shared("s1");
        let app = router(shared);
        let first = app
            .clone()
            .oneshot(get_request("/oauth2/callback?code=c&state=s1"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(get_request("/oauth2/callback?code=c2&state=s1"))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
        assert_eq!(rx.await.unwrap().unwrap(), "c");
    }

    #[tokio::test]
    async fn bind_reports_loopback_redirect_uri() {
        let listener = CallbackListener::bind("s1").await.unwrap();
        assert_ne!(listener.port(), 0);
        assert_eq!(
            listener.redirect_uri(),
            format!("http://127.0.0.1:{}/oauth2/callback", listener.port())
        );
    }

    #[tokio::test]
    async fn wait_receives_code_over_http() {
        let listener = CallbackListener::bind("s1").await.unwrap();
        let url = format!("{}?code=abc&state=s1", listener.redirect_uri());
        let request = tokio::spawn(async move { reqwest::get(url).await.unwrap().status() });

        let code = listener.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(code, "abc");
        assert_eq!(request.await.unwrap(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn wait_times_out_and_releases_port() {
        let listener = CallbackListener::bind("s1").await.unwrap();
        let port = listener.port();

        let err = listener.wait(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, Error::AuthTimeout));

        let mut refused = false;
        for _ in 0..50 {
            if tokio::net::TcpStream::connect((LOOPBACK_HOST, port)).await.is_err() {
                refused = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(refused, "port {port} still accepting after timeout");
    }

    #[tokio::test]
    async fn dropping_guard_releases_port() {
        let listener = CallbackListener::bind("s1").await.unwrap();
        let port = listener.port();
        drop(listener);

        let mut refused = false;
        for _ in 0..50 {
            if tokio::net::TcpStream::connect((LOOPBACK_HOST, port)).await.is_err() {
                refused = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(refused, "port {port} still accepting after drop");
    }
}
