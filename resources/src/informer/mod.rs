use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use futures_util::future::BoxFuture;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

mod reflector;

use reflector::Reflector;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A typed store of the last-known state of every object of kind `T`, keyed
/// by name. Guarded by an async `RwLock` rather than a lock-free map because
/// readers (the watch loop's policy pass) hold the lock across `.await`
/// points while folding a whole namespace's state together.
pub type Store<T> = Arc<RwLock<HashMap<String, T>>>;

pub type CLS<ARG, RES> = Box<dyn Fn(ARG) -> BoxFuture<'static, Result<RES>> + Send + Sync>;

/// How an informer fetches the initial state and then subscribes to
/// incremental changes for a kind.
pub struct ListerWatcher<T> {
    pub lister: CLS<(), Vec<(String, T)>>,
    pub watcher: CLS<(), WsStream>,
}

/// A single observed change to the tracked collection, emitted by a running
/// reflector in arrival order.
#[derive(Debug, Clone)]
pub enum WatchEvent<T> {
    Add(T),
    Update(T, T),
    Delete(T),
}

/// Runs a reflector for kind `T` to completion, populating `store` and
/// forwarding every observed change on `tx`. Returns when the watch stream
/// closes or errors; callers restart it to keep watching.
pub async fn run_reflector<T>(
    lw: ListerWatcher<T>,
    store: Store<T>,
    tx: mpsc::Sender<WatchEvent<T>>,
) -> Result<()>
where
    T: Clone + Send + Sync + serde::de::DeserializeOwned + 'static,
{
    Reflector { lw, store }.run(tx).await
}
