//! Test support: run a LinkDB service on an ephemeral port.

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::service::build_router;
use crate::store::LinkDb;

/// Serve `db` on 127.0.0.1:0 and return the base URL plus the server task.
///
/// The task runs until aborted or the runtime shuts down.
pub async fn spawn_service(db: LinkDb) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let router = build_router(db);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (format!("http://{addr}"), handle)
}
