use anyhow::{anyhow, Result};
use futures_util::stream::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::{ListerWatcher, Store, WatchEvent};
use crate::models::etcd::WatchEvent as EtcdWatchEvent;

pub(super) struct Reflector<T> {
    pub(super) lw: ListerWatcher<T>,
    pub(super) store: Store<T>,
}

impl<T> Reflector<T>
where
    T: Clone + Send + Sync + serde::de::DeserializeOwned + 'static,
{
    pub(super) async fn run(&self, tx: mpsc::Sender<WatchEvent<T>>) -> Result<()> {
        let kvs = (self.lw.lister)(()).await?;
        {
            let mut store = self.store.write().await;
            for (k, v) in kvs {
                store.insert(k, v);
            }
        }
        let (_, mut receiver) = (self.lw.watcher)(()).await?.split();

        loop {
            let msg: Message = receiver
                .next()
                .await
                .ok_or_else(|| anyhow!("Failed to receive watch message from api-server"))??;

            if msg.is_close() {
                return Err(anyhow!("Api-server watch disconnect"));
            }

            let Message::Text(msg) = msg else {
                tracing::warn!("received non-text watch message from api-server");
                continue;
            };

            let event: EtcdWatchEvent = serde_json::from_str(msg.as_str())?;
            match event {
                EtcdWatchEvent::Put(e) => {
                    let new: T = serde_json::from_str(&e.object)?;
                    let mut store = self.store.write().await;
                    let old = store.insert(e.key, new.clone());
                    drop(store);
                    match old {
                        Some(old) => tx.send(WatchEvent::Update(old, new)).await?,
                        None => tx.send(WatchEvent::Add(new)).await?,
                    }
                },
                EtcdWatchEvent::Delete(e) => {
                    let mut store = self.store.write().await;
                    let removed = store.remove(&e.key);
                    drop(store);
                    match removed {
                        Some(old) => tx.send(WatchEvent::Delete(old)).await?,
                        None => tracing::warn!("watch inconsistent, key {} already deleted", e.key),
                    }
                },
            }
        }
    }
}
