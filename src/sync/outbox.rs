// Outbound remote writes, one queue and one worker per entity store.
//
// Mutations push here and return immediately. The worker applies writes in
// the order they were queued; a failure is logged and the next write goes
// ahead. Nothing is retried. Each write names the entity it belongs to, and
// the worker reports that key back once the write has been attempted.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::remote::{DocumentData, MirrorClient};

#[derive(Debug)]
pub enum Outbound {
    Write {
        key: String,
        path: String,
        data: DocumentData,
        merge: bool,
    },
    Delete {
        key: String,
        path: String,
    },
    Flush(oneshot::Sender<()>),
}

/// Called with an entity key after its write or delete was attempted.
pub type Settled = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
pub struct Outbox {
    label: &'static str,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Outbox {
    /// Starts the worker on the current Tokio runtime.
    pub fn spawn(label: &'static str, mirror: MirrorClient, settled: Settled) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain(label, mirror, settled, rx));
        Self { label, tx }
    }

    pub fn push(&self, op: Outbound) {
        if self.tx.send(op).is_err() {
            warn!(store = self.label, "outbound worker stopped, dropping remote write");
        }
    }

    /// Resolves once everything queued before this call has been attempted.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Outbound::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn drain(
    label: &'static str,
    mirror: MirrorClient,
    settled: Settled,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(op) = rx.recv().await {
        match op {
            Outbound::Write { key, path, data, merge } => {
                if let Err(e) = mirror.write(&path, data, merge).await {
                    warn!(store = label, path = %path, error = %e, "remote write failed");
                }
                settled(&key);
            }
            Outbound::Delete { key, path } => {
                if let Err(e) = mirror.delete(&path).await {
                    warn!(store = label, path = %path, error = %e, "remote delete failed");
                }
                settled(&key);
            }
            Outbound::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!(store = label, "outbound worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use crate::remote::memory::MemoryBackend;
    use serde_json::json;
    use std::sync::Mutex;

    fn write(id: &str, data: DocumentData) -> Outbound {
        Outbound::Write {
            key: id.into(),
            path: format!("a/{id}"),
            data,
            merge: true,
        }
    }

    #[tokio::test]
    async fn writes_apply_in_order_and_failures_do_not_block() {
        let backend = Arc::new(MemoryBackend::new());
        let mirror = MirrorClient::new(RemoteConfig::new("k", "d", "p"), backend.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let settled: Settled =
            Arc::new(move |key: &str| sink.lock().unwrap().push(key.to_string()));
        let outbox = Outbox::spawn("test", mirror, settled);

        let mut data = DocumentData::new();
        data.insert("n".into(), json!(1));
        outbox.push(write("1", data.clone()));
        outbox.push(Outbound::Delete {
            key: "1".into(),
            path: "a/1".into(),
        });
        outbox.push(write("2", data));
        outbox.flush().await;

        assert!(backend.document("a/1").is_none());
        assert!(backend.document("a/2").is_some());

        backend.set_fail_writes(true);
        outbox.push(write("3", DocumentData::new()));
        outbox.flush().await;
        backend.set_fail_writes(false);
        outbox.push(write("4", DocumentData::new()));
        outbox.flush().await;

        assert!(backend.document("a/3").is_none());
        assert!(backend.document("a/4").is_some());
        // Failed writes settle too.
        assert_eq!(*seen.lock().unwrap(), vec!["1", "1", "2", "3", "4"]);
    }
}
