//! Keeps one initiator/confirmer pair running per watched asset.

use crate::{
    confirmer::Confirmer,
    initiator::Initiator,
    runner, Metrics, WorkerSettings,
};
use client::ChainClient;
use dashmap::{mapref::entry::Entry, DashMap};
use ledger::{AssetEvents, RequestSource, WatchedAsset};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info};

/// Spawns and cancels worker pairs from asset add/remove events.
pub struct Dispatcher<S, C> {
    source: S,
    chain: C,
    settings: WorkerSettings,
    metrics: Metrics,
    assets: DashMap<String, CancellationToken>,
    tracker: TaskTracker,
}

impl<S, C> Dispatcher<S, C>
where
    S: RequestSource + Clone + 'static,
    C: ChainClient + Clone + 'static,
{
    pub fn new(source: S, chain: C, settings: WorkerSettings, metrics: Metrics) -> Self {
        Self {
            source,
            chain,
            settings,
            metrics,
            assets: DashMap::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Consume both event streams until they end or `token` is cancelled,
    /// then stop every worker and wait for it.
    pub async fn run(&self, events: AssetEvents, token: CancellationToken) {
        let AssetEvents { added, removed } = events;
        tokio::join!(
            self.consume_added(added, &token),
            self.consume_removed(removed, &token),
        );

        self.shutdown().await;
    }

    async fn consume_added(&self, mut added: mpsc::Receiver<WatchedAsset>, token: &CancellationToken) {
        loop {
            let asset = tokio::select! {
                _ = token.cancelled() => break,
                asset = added.recv() => match asset {
                    Some(asset) => asset,
                    None => break,
                },
            };
            self.add(asset, token);
        }
        debug!("Asset add stream closed");
    }

    async fn consume_removed(&self, mut removed: mpsc::Receiver<String>, token: &CancellationToken) {
        loop {
            let id = tokio::select! {
                _ = token.cancelled() => break,
                id = removed.recv() => match id {
                    Some(id) => id,
                    None => break,
                },
            };
            self.remove(&id);
        }
        debug!("Asset remove stream closed");
    }

    /// Start a worker pair for `asset` unless one is already running.
    ///
    /// The pair runs under a child of `parent`. Returns whether a pair was
    /// spawned.
    pub fn add(&self, asset: WatchedAsset, parent: &CancellationToken) -> bool {
        let token = match self.assets.entry(asset.id.clone()) {
            Entry::Occupied(_) => {
                debug!(asset = %asset.id, "Asset already has workers");
                return false;
            }
            Entry::Vacant(slot) => slot.insert(parent.child_token()).value().clone(),
        };

        info!(asset = %asset.id, token = %asset.token, "Spawning workers");
        self.spawn_pair(asset, token);
        self.metrics.set_active_assets(self.assets.len());
        true
    }

    /// Cancel the worker pair of asset `id`. Unknown ids are ignored.
    pub fn remove(&self, id: &str) -> bool {
        let Some((_, token)) = self.assets.remove(id) else {
            debug!(asset = %id, "Removed asset has no workers");
            return false;
        };

        token.cancel();
        info!(asset = %id, "Workers cancelled");
        self.metrics.set_active_assets(self.assets.len());
        true
    }

    /// Number of assets with a worker pair.
    pub fn active_assets(&self) -> usize {
        self.assets.len()
    }

    /// Number of worker tasks that have not finished yet.
    pub fn running_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel all pairs and wait until their tasks are gone.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.assets.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            self.remove(&id);
        }

        self.tracker.close();
        self.tracker.wait().await;
        info!("All workers stopped");
    }

    fn spawn_pair(&self, asset: WatchedAsset, token: CancellationToken) {
        let policy = self.settings.policy;

        let initiator = {
            let worker = Initiator::new(
                self.source.clone(),
                self.chain.clone(),
                asset.clone(),
                &self.settings,
                self.metrics.clone(),
            );
            runner::run(worker, policy, token.clone(), self.metrics.clone())
        };

        let confirmer = {
            let worker = Confirmer::new(
                self.source.clone(),
                self.chain.clone(),
                asset,
                &self.settings,
                self.metrics.clone(),
            );
            runner::run(worker, policy, token, self.metrics.clone())
        };

        self.tracker.spawn(initiator);
        self.tracker.spawn(confirmer);
    }
}
