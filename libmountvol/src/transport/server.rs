//! HTTP-over-Unix-socket server that dispatches Docker plugin requests to a
//! [`MountedVolumeDriver`].

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::UnixListener;
use tracing::{debug, info, warn};

use crate::callback::VolumeCallback;
use crate::engine::MountedVolumeDriver;
use crate::error::VolumeError;
use crate::message::*;
use crate::types::{CreateRequest, MountRequest};

type Driver<C> = State<Arc<MountedVolumeDriver<C>>>;

/// Serves one driver on one Unix socket.
pub struct PluginServer<C> {
    driver: Arc<MountedVolumeDriver<C>>,
}

impl<C> PluginServer<C>
where
    C: VolumeCallback + 'static,
{
    pub fn new(driver: Arc<MountedVolumeDriver<C>>) -> Self {
        Self { driver }
    }

    /// Routing table for the plugin protocol.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/Plugin.Activate", post(activate))
            .route("/VolumeDriver.Create", post(create::<C>))
            .route("/VolumeDriver.Remove", post(remove::<C>))
            .route("/VolumeDriver.Get", post(get::<C>))
            .route("/VolumeDriver.List", post(list::<C>))
            .route("/VolumeDriver.Path", post(path::<C>))
            .route("/VolumeDriver.Mount", post(mount::<C>))
            .route("/VolumeDriver.Unmount", post(unmount::<C>))
            .route("/VolumeDriver.Capabilities", post(capabilities::<C>))
            .with_state(Arc::clone(&self.driver))
    }

    /// Bind `socket_path` and serve until `shutdown` resolves.
    ///
    /// A socket file left over from a previous run is replaced, and the
    /// socket is removed again on a clean shutdown.
    pub async fn serve<F>(&self, socket_path: &Path, shutdown: F) -> Result<(), VolumeError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(dir) = socket_path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| VolumeError::Internal(format!("create {}: {e}", dir.display())))?;
        }
        match tokio::fs::remove_file(socket_path).await {
            Ok(()) => debug!(path = %socket_path.display(), "removed stale socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(VolumeError::Internal(format!(
                    "remove stale socket {}: {e}",
                    socket_path.display()
                )));
            }
        }

        let listener = UnixListener::bind(socket_path)
            .map_err(|e| VolumeError::Internal(format!("bind {}: {e}", socket_path.display())))?;
        info!(path = %socket_path.display(), "volume plugin listening");

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;

        if let Err(e) = tokio::fs::remove_file(socket_path).await {
            warn!(path = %socket_path.display(), error = %e, "failed to remove socket");
        }
        result.map_err(VolumeError::internal)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Decode a request body. Docker sends no body for some endpoints and does not
/// always set a JSON content type, so the body is parsed by hand.
fn decode<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, VolumeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| VolumeError::InvalidArgument(format!("malformed request: {e}")))
}

fn reply<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            (status, [(header::CONTENT_TYPE, PLUGIN_CONTENT_TYPE)], bytes).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn ok<T: Serialize>(body: &T) -> Response {
    reply(StatusCode::OK, body)
}

/// Run a state-changing driver call on its own task. Once started it runs to
/// completion even if the client disconnects and the handler is dropped, so
/// the stored record always matches what was done on the host.
async fn detached<C, T, F, Fut>(
    driver: Arc<MountedVolumeDriver<C>>,
    op: F,
) -> Result<T, VolumeError>
where
    C: VolumeCallback + 'static,
    F: FnOnce(Arc<MountedVolumeDriver<C>>) -> Fut,
    Fut: Future<Output = Result<T, VolumeError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(op(driver))
        .await
        .map_err(VolumeError::internal)?
}

fn failure(op: &str, e: VolumeError) -> Response {
    warn!(op, error = %e, "volume request failed");
    reply(StatusCode::INTERNAL_SERVER_ERROR, &ErrResponse::new(e.to_string()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn activate() -> Response {
    ok(&ActivateResponse::default())
}

async fn create<C: VolumeCallback + 'static>(State(driver): Driver<C>, body: Bytes) -> Response {
    let msg: CreateMessage = match decode(&body) {
        Ok(msg) => msg,
        Err(e) => return failure("create", e),
    };
    let req: CreateRequest = msg.into();
    match detached(driver, move |d| async move { d.create(&req).await }).await {
        Ok(()) => ok(&ErrResponse::default()),
        Err(e) => failure("create", e),
    }
}

async fn remove<C: VolumeCallback + 'static>(State(driver): Driver<C>, body: Bytes) -> Response {
    let msg: NameMessage = match decode(&body) {
        Ok(msg) => msg,
        Err(e) => return failure("remove", e),
    };
    match detached(driver, move |d| async move { d.remove(&msg.name).await }).await {
        Ok(()) => ok(&ErrResponse::default()),
        Err(e) => failure("remove", e),
    }
}

async fn get<C: VolumeCallback + 'static>(State(driver): Driver<C>, body: Bytes) -> Response {
    let msg: NameMessage = match decode(&body) {
        Ok(msg) => msg,
        Err(e) => return failure("get", e),
    };
    match driver.get(&msg.name).await {
        Ok(info) => ok(&GetResponse {
            volume: info.into(),
            err: String::new(),
        }),
        Err(e) => failure("get", e),
    }
}

async fn list<C: VolumeCallback + 'static>(State(driver): Driver<C>) -> Response {
    match driver.list().await {
        Ok(volumes) => ok(&ListResponse {
            volumes: volumes.into_iter().map(PluginVolume::from).collect(),
            err: String::new(),
        }),
        Err(e) => failure("list", e),
    }
}

async fn path<C: VolumeCallback + 'static>(State(driver): Driver<C>, body: Bytes) -> Response {
    let msg: NameMessage = match decode(&body) {
        Ok(msg) => msg,
        Err(e) => return failure("path", e),
    };
    match driver.path(&msg.name).await {
        Ok(mountpoint) => ok(&MountpointResponse {
            mountpoint,
            err: String::new(),
        }),
        Err(e) => failure("path", e),
    }
}

async fn mount<C: VolumeCallback + 'static>(State(driver): Driver<C>, body: Bytes) -> Response {
    let msg: MountMessage = match decode(&body) {
        Ok(msg) => msg,
        Err(e) => return failure("mount", e),
    };
    let req: MountRequest = msg.into();
    match detached(driver, move |d| async move { d.mount(&req).await }).await {
        Ok(mountpoint) => ok(&MountpointResponse {
            mountpoint,
            err: String::new(),
        }),
        Err(e) => failure("mount", e),
    }
}

async fn unmount<C: VolumeCallback + 'static>(State(driver): Driver<C>, body: Bytes) -> Response {
    let msg: MountMessage = match decode(&body) {
        Ok(msg) => msg,
        Err(e) => return failure("unmount", e),
    };
    let req: MountRequest = msg.into();
    match detached(driver, move |d| async move { d.unmount(&req).await }).await {
        Ok(()) => ok(&ErrResponse::default()),
        Err(e) => failure("unmount", e),
    }
}

async fn capabilities<C: VolumeCallback + 'static>(State(driver): Driver<C>) -> Response {
    ok(&CapabilitiesResponse {
        capabilities: Capability {
            scope: driver.capabilities(),
        },
    })
}
