//! Signal persistence.
//!
//! The engine only needs three things from storage: the list of signals
//! still waiting to ring, a way to replace that list, and a callback to
//! record that a signal has rung so it is not offered again after a
//! restart. [`JsonFileStore`] keeps them in a small JSON document;
//! [`MemoryStore`] keeps them in memory for embedding and tests.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::signal::{Signal, SignalIdentity};
use crate::tracing::prelude::*;

#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Signals that have not rung yet, in saved order.
    async fn signals(&self) -> Result<Vec<Signal>>;

    /// Replace the stored list wholesale.
    ///
    /// Signals that already rung keep their triggered mark if they are part
    /// of the new list.
    async fn save(&self, signals: Vec<Signal>) -> Result<()>;

    /// Record that `signal` rang.
    async fn mark_triggered(&self, signal: &Signal) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
struct StoredSignal {
    #[serde(flatten)]
    signal: Signal,
    #[serde(default)]
    triggered: bool,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Document {
    signals: Vec<StoredSignal>,
}

impl Document {
    fn pending(&self) -> Vec<Signal> {
        self.signals
            .iter()
            .filter(|s| !s.triggered)
            .map(|s| s.signal.clone())
            .collect()
    }

    fn replace(&mut self, signals: Vec<Signal>) {
        let triggered: HashSet<SignalIdentity> = self
            .signals
            .iter()
            .filter(|s| s.triggered)
            .map(|s| s.signal.identity())
            .collect();

        self.signals = signals
            .into_iter()
            .map(|signal| StoredSignal {
                triggered: triggered.contains(&signal.identity()),
                signal,
            })
            .collect();
    }

    fn mark_triggered(&mut self, signal: &Signal) -> bool {
        let identity = signal.identity();
        let mut changed = false;
        for stored in &mut self.signals {
            if !stored.triggered && stored.signal.identity() == identity {
                stored.triggered = true;
                changed = true;
            }
        }
        changed
    }
}

/// Signals kept in a JSON file.
///
/// A missing file is an empty list. Writes go to a temporary file that is
/// renamed over the original.
pub struct JsonFileStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn read(&self) -> Result<Document> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, document: &Document) -> Result<()> {
        let json = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SignalSource for JsonFileStore {
    async fn signals(&self) -> Result<Vec<Signal>> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.pending())
    }

    async fn save(&self, signals: Vec<Signal>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.read().await?;
        document.replace(signals);
        self.write(&document).await?;
        debug!(path = %self.path.display(), count = document.signals.len(), "Saved signals");
        Ok(())
    }

    async fn mark_triggered(&self, signal: &Signal) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.read().await?;
        if document.mark_triggered(signal) {
            self.write(&document).await?;
        }
        Ok(())
    }
}

/// Signals kept in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<Document>,
}

impl MemoryStore {
    pub fn new(signals: Vec<Signal>) -> Self {
        let mut document = Document::default();
        document.replace(signals);
        Self {
            document: Mutex::new(document),
        }
    }
}

#[async_trait]
impl SignalSource for MemoryStore {
    async fn signals(&self) -> Result<Vec<Signal>> {
        Ok(self.document.lock().pending())
    }

    async fn save(&self, signals: Vec<Signal>) -> Result<()> {
        self.document.lock().replace(signals);
        Ok(())
    }

    async fn mark_triggered(&self, signal: &Signal) -> Result<()> {
        self.document.lock().mark_triggered(signal);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::signal::Direction;

    fn eurusd() -> Signal {
        Signal::new("EURUSD", Direction::Up, datetime!(2024-03-01 12:00:00 UTC))
    }

    fn gbpjpy() -> Signal {
        Signal::new("GBPJPY", Direction::Down, datetime!(2024-03-01 12:05:00 UTC))
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("signal-alarm-{}-{name}.json", std::process::id()))
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let store = JsonFileStore::new(temp_path("missing"));
        assert!(store.signals().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn triggered_signal_is_not_offered_again() {
        let path = temp_path("triggered");
        let store = JsonFileStore::new(&path);
        store.save(vec![eurusd(), gbpjpy()]).await.unwrap();

        store.mark_triggered(&eurusd()).await.unwrap();

        // A fresh store simulates a restart.
        let reloaded = JsonFileStore::new(&path);
        assert_eq!(reloaded.signals().await.unwrap(), vec![gbpjpy()]);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn resave_keeps_triggered_mark() {
        let path = temp_path("resave");
        let store = JsonFileStore::new(&path);
        store.save(vec![eurusd()]).await.unwrap();
        store.mark_triggered(&eurusd()).await.unwrap();

        store.save(vec![eurusd(), gbpjpy()]).await.unwrap();

        assert_eq!(store.signals().await.unwrap(), vec![gbpjpy()]);
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn edited_signal_is_pending_again() {
        let store = MemoryStore::new(vec![eurusd()]);
        store.mark_triggered(&eurusd()).await.unwrap();

        let edited = Signal::new("EURUSD", Direction::Up, datetime!(2024-03-01 12:30:00 UTC));
        store.save(vec![edited.clone()]).await.unwrap();

        assert_eq!(store.signals().await.unwrap(), vec![edited]);
    }

    #[tokio::test]
    async fn file_format_is_flat() {
        let path = temp_path("format");
        let store = JsonFileStore::new(&path);
        store.save(vec![eurusd()]).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({
                "signals": [{
                    "asset": "EURUSD",
                    "direction": "up",
                    "timestamp": 1709294400,
                    "triggered": false,
                }]
            })
        );
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let path = temp_path("corrupt");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = JsonFileStore::new(&path);
        assert!(store.signals().await.is_err());
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
