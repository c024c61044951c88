//! Chaos injection wrapper for [`ReplicaTable`].
//!
//! [`ChaosReplicaTable`] wraps one replica's table and injects
//! configurable failures: an explicit down switch, random errors, and
//! latency. Integration tests wrap each mock replica with one of these to
//! script per-replica outages.

use crate::mutation::RowMutation;
use crate::reader::RowReader;
use crate::replica::{ReplicaTable, ScanStream};
use mirrortab_common::{ErrCode, ScanDescriptor, Status};
use rand::Rng;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;

/// Configuration for replica chaos injection.
#[derive(Debug, Clone)]
pub struct ChaosConfig {
    /// Probability of returning an error \[0.0, 1.0\].
    pub failure_rate: f64,
    /// Fixed latency injected before forwarding.
    pub latency: Duration,
    /// Random additional latency in \[0, jitter\].
    pub jitter: Duration,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            latency: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }
}

/// A [`ReplicaTable`] wrapper that injects chaos (failures, latency, an
/// explicit down switch).
pub struct ChaosReplicaTable<T: ReplicaTable> {
    inner: Arc<T>,
    config: Arc<RwLock<ChaosConfig>>,
    down: Arc<RwLock<bool>>,
}

impl<T: ReplicaTable> std::fmt::Debug for ChaosReplicaTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosReplicaTable").finish_non_exhaustive()
    }
}

impl<T: ReplicaTable> ChaosReplicaTable<T> {
    pub fn new(inner: Arc<T>, config: ChaosConfig) -> Self {
        Self {
            inner,
            config: Arc::new(RwLock::new(config)),
            down: Arc::new(RwLock::new(false)),
        }
    }

    /// Mark this replica as down (until recovered).
    pub async fn fail(&self) {
        *self.down.write().await = true;
    }

    /// Bring this replica back.
    pub async fn recover(&self) {
        *self.down.write().await = false;
    }

    /// Dynamically update the random failure rate.
    pub async fn set_failure_rate(&self, rate: f64) {
        self.config.write().await.failure_rate = rate;
    }

    /// Apply chaos checks: returns Err if the request should fail.
    async fn maybe_fail(&self) -> Result<(), Status> {
        if *self.down.read().await {
            return Err(Status::failed(ErrCode::IoError, "chaos: replica is down"));
        }

        let (delay, failure_rate) = {
            let config = self.config.read().await;
            let jitter_ms = if config.jitter.is_zero() {
                0
            } else {
                rand::thread_rng().gen_range(0..=config.jitter.as_millis() as u64)
            };
            (
                config.latency + Duration::from_millis(jitter_ms),
                config.failure_rate,
            )
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if failure_rate > 0.0 && rand::thread_rng().gen_bool(failure_rate.min(1.0)) {
            return Err(Status::failed(ErrCode::Timeout, "chaos: random failure"));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl<T: ReplicaTable> ReplicaTable for ChaosReplicaTable<T> {
    async fn apply_mutation(&self, mu: &mut RowMutation) {
        if let Err(e) = self.maybe_fail().await {
            mu.set_error(e);
            return;
        }
        self.inner.apply_mutation(mu).await;
    }

    async fn apply_mutations(&self, mus: &mut [RowMutation]) {
        if let Err(e) = self.maybe_fail().await {
            for mu in mus.iter_mut() {
                mu.set_error(e.clone());
            }
            return;
        }
        self.inner.apply_mutations(mus).await;
    }

    async fn put(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
    ) -> Result<(), Status> {
        self.maybe_fail().await?;
        self.inner.put(row_key, family, qualifier, value).await
    }

    async fn put_with_ttl(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
        ttl_secs: i32,
    ) -> Result<(), Status> {
        self.maybe_fail().await?;
        self.inner
            .put_with_ttl(row_key, family, qualifier, value, ttl_secs)
            .await
    }

    async fn put_with_timestamp(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
        timestamp: i64,
        ttl_secs: i32,
    ) -> Result<(), Status> {
        self.maybe_fail().await?;
        self.inner
            .put_with_timestamp(row_key, family, qualifier, value, timestamp, ttl_secs)
            .await
    }

    async fn add(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        delta: i64,
    ) -> Result<(), Status> {
        self.maybe_fail().await?;
        self.inner.add(row_key, family, qualifier, delta).await
    }

    async fn add_int64(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        delta: i64,
    ) -> Result<(), Status> {
        self.maybe_fail().await?;
        self.inner.add_int64(row_key, family, qualifier, delta).await
    }

    async fn put_if_absent(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
    ) -> Result<(), Status> {
        self.maybe_fail().await?;
        self.inner
            .put_if_absent(row_key, family, qualifier, value)
            .await
    }

    async fn append(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
    ) -> Result<(), Status> {
        self.maybe_fail().await?;
        self.inner.append(row_key, family, qualifier, value).await
    }

    async fn get(&self, reader: &mut RowReader) {
        if let Err(e) = self.maybe_fail().await {
            reader.set_error(e);
            return;
        }
        self.inner.get(reader).await;
    }

    async fn get_batch(&self, readers: &mut [RowReader]) {
        if let Err(e) = self.maybe_fail().await {
            for r in readers.iter_mut() {
                r.set_error(e.clone());
            }
            return;
        }
        self.inner.get_batch(readers).await;
    }

    async fn get_value(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        snapshot: u64,
    ) -> Result<Vec<u8>, Status> {
        self.maybe_fail().await?;
        self.inner
            .get_value(row_key, family, qualifier, snapshot)
            .await
    }

    async fn get_int64(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        snapshot: u64,
    ) -> Result<i64, Status> {
        self.maybe_fail().await?;
        self.inner
            .get_int64(row_key, family, qualifier, snapshot)
            .await
    }

    async fn scan(&self, desc: &ScanDescriptor) -> Result<ScanStream, Status> {
        self.maybe_fail().await?;
        self.inner.scan(desc).await
    }

    fn name(&self) -> String {
        self.inner.name()
    }

    async fn is_put_finished(&self) -> bool {
        self.inner.is_put_finished().await
    }

    async fn is_get_finished(&self) -> bool {
        self.inner.is_get_finished().await
    }

    async fn set_write_timeout(&self, timeout_ms: i64) {
        self.inner.set_write_timeout(timeout_ms).await;
    }

    async fn set_read_timeout(&self, timeout_ms: i64) {
        self.inner.set_read_timeout(timeout_ms).await;
    }

    async fn set_max_mutation_pending(&self, max_pending: u64) {
        self.inner.set_max_mutation_pending(max_pending).await;
    }

    async fn set_max_reader_pending(&self, max_pending: u64) {
        self.inner.set_max_reader_pending(max_pending).await;
    }
}

// ────────────────────────── Tests ──────────────────────────
