//! Turns periodic asset listings into add/remove event streams.

use crate::asset::{AssetSource, WatchedAsset};
use std::{collections::HashMap, time::Duration};
use tokio::{sync::mpsc, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_BUFFER: usize = 64;

/// Receiving ends of the watcher. Both streams end when the watcher stops.
#[derive(Debug)]
pub struct AssetEvents {
    pub added: mpsc::Receiver<WatchedAsset>,
    /// Identifiers of assets no longer eligible.
    pub removed: mpsc::Receiver<String>,
}

/// Polls the assets owned by one account and reports changes.
///
/// An asset is identified by its id. Listing failures are logged and never
/// produce removals.
pub struct AssetWatcher<A> {
    source: A,
    owner: String,
    period: Duration,
    known: HashMap<String, WatchedAsset>,
    added: mpsc::Sender<WatchedAsset>,
    removed: mpsc::Sender<String>,
}

impl<A: AssetSource> AssetWatcher<A> {
    pub fn new(source: A, owner: impl Into<String>, period: Duration) -> (Self, AssetEvents) {
        let (added_tx, added_rx) = mpsc::channel(EVENT_BUFFER);
        let (removed_tx, removed_rx) = mpsc::channel(EVENT_BUFFER);

        let watcher = Self {
            source,
            owner: owner.into(),
            period,
            known: HashMap::new(),
            added: added_tx,
            removed: removed_tx,
        };
        let events = AssetEvents {
            added: added_rx,
            removed: removed_rx,
        };
        (watcher, events)
    }

    /// Poll until cancelled or until nobody listens anymore.
    pub async fn run(mut self, token: CancellationToken) {
        info!(owner = %self.owner, period = ?self.period, "Asset watcher started");

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let listing = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                listing = self.source.list_assets(&self.owner) => listing,
            };

            match listing {
                Ok(assets) => {
                    if !self.apply(assets).await {
                        break;
                    }
                }
                Err(err) => warn!(owner = %self.owner, error = %err, "Failed to list assets"),
            }
        }

        info!(owner = %self.owner, "Asset watcher stopped");
    }

    /// Publish the difference between the known set and `listing`. Returns
    /// false once a receiver is gone.
    async fn apply(&mut self, listing: Vec<WatchedAsset>) -> bool {
        let (added, removed) = diff(&self.known, listing);

        for id in removed {
            debug!(asset = %id, "Asset removed");
            self.known.remove(&id);
            if self.removed.send(id).await.is_err() {
                return false;
            }
        }

        for asset in added {
            debug!(asset = %asset.id, token = %asset.token, "Asset added");
            self.known.insert(asset.id.clone(), asset.clone());
            if self.added.send(asset).await.is_err() {
                return false;
            }
        }

        true
    }
}

/// Assets in `listing` not yet known, and ids of known assets missing from it.
pub fn diff(
    known: &HashMap<String, WatchedAsset>,
    listing: Vec<WatchedAsset>,
) -> (Vec<WatchedAsset>, Vec<String>) {
    let listed: HashMap<String, WatchedAsset> = listing
        .into_iter()
        .map(|asset| (asset.id.clone(), asset))
        .collect();

    let mut removed: Vec<String> = known
        .keys()
        .filter(|id| !listed.contains_key(*id))
        .cloned()
        .collect();
    removed.sort();

    let mut added: Vec<WatchedAsset> = listed
        .into_values()
        .filter(|asset| !known.contains_key(&asset.id))
        .collect();
    added.sort_by(|a, b| a.id.cmp(&b.id));

    (added, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::LedgerError;
    use alloy_primitives::Address;
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    fn asset(id: &str) -> WatchedAsset {
        WatchedAsset {
            id: id.to_string(),
            token: Address::repeat_byte(id.len() as u8),
            trailing_digits: 6,
            owner: "GOWNER".to_string(),
        }
    }

    #[derive(Clone, Default)]
    struct ScriptedSource {
        listings: Arc<Mutex<VecDeque<Result<Vec<WatchedAsset>, LedgerError>>>>,
    }

    impl ScriptedSource {
        fn push(&self, listing: Result<Vec<WatchedAsset>, LedgerError>) {
            self.listings.lock().unwrap().push_back(listing);
        }
    }

    impl AssetSource for ScriptedSource {
        async fn list_assets(&self, _owner: &str) -> Result<Vec<WatchedAsset>, LedgerError> {
            self.listings
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(vec![]))
        }
    }

    #[test]
    fn test_diff() {
        let known: HashMap<_, _> = [asset("BTC"), asset("USDT")]
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();

        let (added, removed) = diff(&known, vec![asset("USDT"), asset("DAI")]);
        assert_eq!(added, vec![asset("DAI")]);
        assert_eq!(removed, vec!["BTC".to_string()]);

        let (added, removed) = diff(&known, vec![asset("BTC"), asset("USDT")]);
        assert!(added.is_empty());
        assert!(removed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_emits_changes() {
        let source = ScriptedSource::default();
        source.push(Ok(vec![asset("USDT"), asset("DAI")]));
        source.push(Err(LedgerError::Status {
            status: 503,
            body: "unavailable".to_string(),
        }));
        source.push(Ok(vec![asset("DAI")]));

        let (watcher, mut events) =
            AssetWatcher::new(source.clone(), "GOWNER", Duration::from_secs(30));
        let token = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(token.clone()));

        assert_eq!(events.added.recv().await, Some(asset("DAI")));
        assert_eq!(events.added.recv().await, Some(asset("USDT")));

        // The failed listing in between must not be read as an empty one.
        assert_eq!(events.removed.recv().await, Some("USDT".to_string()));

        token.cancel();
        handle.await.unwrap();
        assert_eq!(events.added.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_stops_without_listeners() {
        let source = ScriptedSource::default();
        source.push(Ok(vec![asset("USDT")]));

        let (watcher, events) = AssetWatcher::new(source, "GOWNER", Duration::from_secs(30));
        drop(events);

        // Returns on its own; no cancellation needed.
        watcher.run(CancellationToken::new()).await;
    }
}
