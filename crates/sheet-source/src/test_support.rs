//! In-process HTTP fixtures for unit tests

use tokio::net::TcpListener;

/// Serve `app` on an ephemeral loopback port and return its base URL.
pub(crate) async fn serve(app: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
