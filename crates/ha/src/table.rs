//! Data-plane fan-out over the replica tables of one logical table.
//!
//! [`HaTable`] holds the ordered list of per-cluster tables opened for a
//! single table name and routes every data operation across them: writes
//! go to every replica, reads stop at the first replica that answers, and
//! latest-get queries every replica and merges by timestamp. Generic over
//! `T: ReplicaTable` for testability; unit and integration tests use
//! in-memory mocks.

use crate::gate::{Decision, GetGate, LGetGate, PutGate};
use crate::merge::merge_results;
use crate::mutation::RowMutation;
use crate::reader::RowReader;
use crate::replica::{ReplicaTable, ScanStream};
use mirrortab_common::{ErrCode, RowResult, ScanDescriptor, Status, TableDescriptor, TabletInfo};
use mirrortab_config::HaOptions;
use mirrortab_metrics::{metrics, start_op_timer};
use rand::seq::SliceRandom;
use std::future::Future;
use std::sync::Arc;

fn no_replicas() -> Status {
    Status::failed(ErrCode::System, "no replicas")
}

/// HA facade over the replica tables of one logical table.
///
/// The replica list is fixed at construction; order is the configured
/// cluster order, and replica 0 is the primary target for asynchronous
/// writes and the default-first target for reads.
pub struct HaTable<T: ReplicaTable> {
    tables: Vec<Arc<T>>,
    options: HaOptions,
}

impl<T: ReplicaTable> std::fmt::Debug for HaTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HaTable")
            .field("replicas", &self.tables.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<T: ReplicaTable> HaTable<T> {
    /// Assemble a facade over already-opened replica tables.
    /// `HaClient::open_table` is the usual way to get one.
    pub fn new(tables: Vec<Arc<T>>, options: HaOptions) -> Self {
        Self { tables, options }
    }

    /// Number of replica tables behind this facade.
    pub fn replica_count(&self) -> usize {
        self.tables.len()
    }

    /// Direct handle to the i-th replica table.
    pub fn replica(&self, i: usize) -> Option<&Arc<T>> {
        self.tables.get(i)
    }

    /// Replica order for a read: configured order, or a fresh shuffle
    /// when `get_random_mode` is on.
    fn read_order(&self) -> Vec<Arc<T>> {
        let mut tables = self.tables.clone();
        if self.options.get_random_mode {
            tables.shuffle(&mut rand::thread_rng());
        }
        tables
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Fan one mutation across every replica.
    ///
    /// A mutation carrying a callback is dispatched asynchronously:
    /// ownership moves into the fallback chain, `None` is returned
    /// immediately, and the mutation comes back through its callback once
    /// the chain ends. A plain mutation is applied to each replica in
    /// turn and handed back with its error slot settled: `Ok` if at least
    /// one replica accepted it, the last failure otherwise.
    pub async fn apply_mutation(&self, mut mu: RowMutation) -> Option<RowMutation> {
        metrics().writes.inc();
        let _timer = start_op_timer("apply_mutation");
        if mu.is_async() {
            self.dispatch_mutation_chain(mu);
            return None;
        }
        self.apply_mutation_sync(&mut mu).await;
        Some(mu)
    }

    async fn apply_mutation_sync(&self, mu: &mut RowMutation) {
        if self.tables.is_empty() {
            mu.set_error(no_replicas());
            return;
        }
        let n = self.tables.len();
        let mut failed = 0usize;
        for (i, t) in self.tables.iter().enumerate() {
            t.apply_mutation(mu).await;
            if !mu.error().is_ok() {
                failed += 1;
                tracing::warn!(
                    row = mu.row_key(),
                    replica = i,
                    reason = mu.error().reason(),
                    "apply_mutation failed on replica"
                );
                metrics()
                    .replica_failures
                    .with_label_values(&["apply_mutation"])
                    .inc();
            }
            // Re-arm for the next replica; this also clears the slot after
            // the last attempt whenever at least one replica succeeded.
            if failed < n {
                mu.reset();
            }
        }
    }

    /// Sequential async fallback chain: replica i+1 is dispatched only
    /// after replica i's completion, and the user callback fires exactly
    /// once, gated by a `PutGate`.
    fn dispatch_mutation_chain(&self, mut mu: RowMutation) {
        let tables = self.tables.clone();
        if tables.is_empty() {
            mu.set_error(no_replicas());
            if let Some(cb) = mu.take_callback() {
                cb(mu);
            }
            return;
        }
        tokio::spawn(async move {
            let mut gate = PutGate::new(tables.len());
            let mut idx = 0usize;
            loop {
                tables[idx].apply_mutation(&mut mu).await;
                if !mu.error().is_ok() {
                    tracing::warn!(
                        row = mu.row_key(),
                        replica = idx,
                        reason = mu.error().reason(),
                        "async put failed on replica"
                    );
                    metrics()
                        .replica_failures
                        .with_label_values(&["apply_mutation"])
                        .inc();
                }
                match gate.on_completion(mu.error().code()) {
                    Decision::Retry { next } => {
                        mu.reset();
                        idx = next;
                    }
                    Decision::FireCleared => {
                        mu.reset();
                        break;
                    }
                    Decision::Fire | Decision::Suppress => break,
                }
            }
            if let Some(cb) = mu.take_callback() {
                cb(mu);
            }
        });
    }

    /// Fan a batch of mutations across every replica.
    ///
    /// Async members are dispatched individually through their own
    /// fallback chains. The sync subset is submitted to each replica in
    /// order with per-row failure counters; a row succeeds iff at least
    /// one replica accepted it. Returns the settled sync members.
    pub async fn apply_mutations(&self, mus: Vec<RowMutation>) -> Vec<RowMutation> {
        metrics().writes.inc();
        let _timer = start_op_timer("apply_mutations");

        let (async_mus, mut sync_mus): (Vec<_>, Vec<_>) =
            mus.into_iter().partition(|m| m.is_async());
        for mu in async_mus {
            self.dispatch_mutation_chain(mu);
        }
        if sync_mus.is_empty() {
            return sync_mus;
        }
        if self.tables.is_empty() {
            for mu in &mut sync_mus {
                mu.set_error(no_replicas());
            }
            return sync_mus;
        }

        let n = self.tables.len();
        let mut failed_counts = vec![0usize; sync_mus.len()];
        for (i, t) in self.tables.iter().enumerate() {
            t.apply_mutations(&mut sync_mus).await;
            for (j, mu) in sync_mus.iter_mut().enumerate() {
                if !mu.error().is_ok() {
                    failed_counts[j] += 1;
                    tracing::warn!(
                        row = mu.row_key(),
                        replica = i,
                        reason = mu.error().reason(),
                        "batched mutation failed on replica"
                    );
                    metrics()
                        .replica_failures
                        .with_label_values(&["apply_mutations"])
                        .inc();
                }
                if failed_counts[j] < n {
                    mu.reset();
                }
            }
        }
        sync_mus
    }

    // -----------------------------------------------------------------------
    // Scalar write helpers
    // -----------------------------------------------------------------------

    /// Apply a scalar write to every replica; `Ok` iff at least one
    /// replica accepted it, the last failure otherwise.
    async fn write_fan_out<'a, F, Fut>(&'a self, op: &'static str, call: F) -> Result<(), Status>
    where
        F: Fn(&'a T) -> Fut,
        Fut: Future<Output = Result<(), Status>>,
    {
        metrics().writes.inc();
        let _timer = start_op_timer(op);
        if self.tables.is_empty() {
            return Err(no_replicas());
        }
        let mut failed = 0usize;
        let mut last_err = Status::ok();
        for (i, t) in self.tables.iter().enumerate() {
            if let Err(e) = call(t.as_ref()).await {
                tracing::warn!(op, replica = i, reason = e.reason(), "write failed on replica");
                metrics().replica_failures.with_label_values(&[op]).inc();
                failed += 1;
                last_err = e;
            }
        }
        if failed >= self.tables.len() {
            Err(last_err)
        } else {
            Ok(())
        }
    }

    pub async fn put(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
    ) -> Result<(), Status> {
        self.write_fan_out("put", |t| t.put(row_key, family, qualifier, value))
            .await
    }

    pub async fn put_with_ttl(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
        ttl_secs: i32,
    ) -> Result<(), Status> {
        self.write_fan_out("put", |t| {
            t.put_with_ttl(row_key, family, qualifier, value, ttl_secs)
        })
        .await
    }

    pub async fn put_with_timestamp(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
        timestamp: i64,
        ttl_secs: i32,
    ) -> Result<(), Status> {
        self.write_fan_out("put", |t| {
            t.put_with_timestamp(row_key, family, qualifier, value, timestamp, ttl_secs)
        })
        .await
    }

    pub async fn add(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        delta: i64,
    ) -> Result<(), Status> {
        self.write_fan_out("add", |t| t.add(row_key, family, qualifier, delta))
            .await
    }

    pub async fn add_int64(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        delta: i64,
    ) -> Result<(), Status> {
        self.write_fan_out("add_int64", |t| t.add_int64(row_key, family, qualifier, delta))
            .await
    }

    pub async fn put_if_absent(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
    ) -> Result<(), Status> {
        self.write_fan_out("put_if_absent", |t| {
            t.put_if_absent(row_key, family, qualifier, value)
        })
        .await
    }

    pub async fn append(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
    ) -> Result<(), Status> {
        self.write_fan_out("append", |t| t.append(row_key, family, qualifier, value))
            .await
    }

    // -----------------------------------------------------------------------
    // First-success reads
    // -----------------------------------------------------------------------

    /// Resolve one reader against the first replica that answers.
    ///
    /// Same ownership contract as [`apply_mutation`](Self::apply_mutation):
    /// a callback-carrying reader is dispatched asynchronously and `None`
    /// is returned, otherwise the settled reader comes back directly.
    pub async fn get(&self, mut reader: RowReader) -> Option<RowReader> {
        metrics().reads.inc();
        let _timer = start_op_timer("get");
        let tables = self.read_order();
        if reader.is_async() {
            Self::dispatch_get_chain(tables, reader);
            return None;
        }
        Self::get_sync(&tables, &mut reader).await;
        Some(reader)
    }

    async fn get_sync(tables: &[Arc<T>], reader: &mut RowReader) {
        if tables.is_empty() {
            reader.set_error(no_replicas());
            return;
        }
        let n = tables.len();
        let mut failed = 0usize;
        for (i, t) in tables.iter().enumerate() {
            t.get(reader).await;
            if reader.error().is_ok() {
                break;
            }
            failed += 1;
            tracing::warn!(
                row = reader.row_key(),
                replica = i,
                reason = reader.error().reason(),
                "get failed on replica"
            );
            metrics().replica_failures.with_label_values(&["get"]).inc();
            // Re-arm only while another attempt remains.
            if failed < n {
                reader.reset();
            }
        }
    }

    fn dispatch_get_chain(tables: Vec<Arc<T>>, mut reader: RowReader) {
        if tables.is_empty() {
            reader.set_error(no_replicas());
            if let Some(cb) = reader.take_callback() {
                cb(reader);
            }
            return;
        }
        tokio::spawn(async move {
            let mut gate = GetGate::new(tables.len());
            let mut idx = 0usize;
            loop {
                tables[idx].get(&mut reader).await;
                if !reader.error().is_ok() {
                    tracing::warn!(
                        row = reader.row_key(),
                        replica = idx,
                        reason = reader.error().reason(),
                        "async get failed on replica"
                    );
                    metrics().replica_failures.with_label_values(&["get"]).inc();
                }
                match gate.on_completion(reader.error().code()) {
                    Decision::Retry { next } => {
                        reader.reset();
                        idx = next;
                    }
                    Decision::Fire | Decision::FireCleared | Decision::Suppress => break,
                }
            }
            if let Some(cb) = reader.take_callback() {
                cb(reader);
            }
        });
    }

    /// Resolve a batch of readers.
    ///
    /// Async members are dispatched individually. The sync subset is
    /// driven through a shrinking residual set: rows resolved by an
    /// earlier replica are not asked again, rows that failed retry on the
    /// next replica until every replica failed them. Returns the settled
    /// sync members in completion order.
    pub async fn get_batch(&self, readers: Vec<RowReader>) -> Vec<RowReader> {
        metrics().reads.inc();
        let _timer = start_op_timer("get_batch");
        let tables = self.read_order();

        let (async_rs, sync_rs): (Vec<_>, Vec<_>) =
            readers.into_iter().partition(|r| r.is_async());
        for r in async_rs {
            Self::dispatch_get_chain(tables.clone(), r);
        }
        if sync_rs.is_empty() {
            return sync_rs;
        }
        if tables.is_empty() {
            let mut out = sync_rs;
            for r in &mut out {
                r.set_error(no_replicas());
            }
            return out;
        }

        let n = tables.len();
        let mut residual = sync_rs;
        let mut fail_counts = vec![0usize; residual.len()];
        let mut done = Vec::with_capacity(residual.len());

        for (i, t) in tables.iter().enumerate() {
            if residual.is_empty() {
                break;
            }
            t.get_batch(&mut residual).await;

            let mut keep = Vec::with_capacity(residual.len());
            let mut keep_counts = Vec::with_capacity(fail_counts.len());
            for (mut r, mut fails) in residual.drain(..).zip(fail_counts.drain(..)) {
                if r.error().is_ok() {
                    done.push(r);
                    continue;
                }
                fails += 1;
                tracing::warn!(
                    row = r.row_key(),
                    replica = i,
                    reason = r.error().reason(),
                    "batched get failed on replica"
                );
                metrics()
                    .replica_failures
                    .with_label_values(&["get_batch"])
                    .inc();
                if fails < n {
                    r.reset();
                    keep.push(r);
                    keep_counts.push(fails);
                } else {
                    // Every replica failed this row; keep the last error.
                    done.push(r);
                }
            }
            residual = keep;
            fail_counts = keep_counts;
        }
        done.extend(residual);
        done
    }

    /// First-success scalar read of one cell's value.
    pub async fn get_value(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        snapshot: u64,
    ) -> Result<Vec<u8>, Status> {
        metrics().reads.inc();
        let _timer = start_op_timer("get_value");
        let tables = self.read_order();
        Self::first_success("get_value", &tables, |t| {
            t.get_value(row_key, family, qualifier, snapshot)
        })
        .await
    }

    /// First-success scalar read of one cell as a counter.
    pub async fn get_int64(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        snapshot: u64,
    ) -> Result<i64, Status> {
        metrics().reads.inc();
        let _timer = start_op_timer("get_int64");
        let tables = self.read_order();
        Self::first_success("get_int64", &tables, |t| {
            t.get_int64(row_key, family, qualifier, snapshot)
        })
        .await
    }

    async fn first_success<'a, F, Fut, R>(
        op: &'static str,
        tables: &'a [Arc<T>],
        call: F,
    ) -> Result<R, Status>
    where
        F: Fn(&'a T) -> Fut,
        Fut: Future<Output = Result<R, Status>>,
    {
        let mut last_err = no_replicas();
        for (i, t) in tables.iter().enumerate() {
            match call(t.as_ref()).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    tracing::warn!(op, replica = i, reason = e.reason(), "read failed on replica");
                    metrics().replica_failures.with_label_values(&[op]).inc();
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    // -----------------------------------------------------------------------
    // Latest-get
    // -----------------------------------------------------------------------

    /// Resolve one reader against every replica and merge the results by
    /// timestamp, masking per-cluster staleness. Succeeds when at least
    /// one replica answered; the merged result holds at most the reader's
    /// `max_versions` cells, newest first, with near-simultaneous
    /// duplicates collapsed per the configured window.
    pub async fn lget(&self, mut reader: RowReader) -> Option<RowReader> {
        metrics().lgets.inc();
        let _timer = start_op_timer("lget");
        if reader.is_async() {
            self.dispatch_lget_chain(reader);
            return None;
        }
        self.lget_sync(&mut reader).await;
        Some(reader)
    }

    async fn lget_sync(&self, reader: &mut RowReader) {
        if self.tables.is_empty() {
            reader.set_error(no_replicas());
            return;
        }
        let n = self.tables.len();
        let mut failed = 0usize;
        let mut results: Vec<RowResult> = Vec::new();
        for (i, t) in self.tables.iter().enumerate() {
            t.get(reader).await;
            if !reader.error().is_ok() {
                failed += 1;
                tracing::warn!(
                    row = reader.row_key(),
                    replica = i,
                    reason = reader.error().reason(),
                    "lget failed on replica"
                );
                metrics().replica_failures.with_label_values(&["lget"]).inc();
                if failed < n {
                    reader.reset();
                }
            } else {
                results.push(reader.take_result());
                reader.reset();
            }
        }
        if !results.is_empty() {
            let merged = merge_results(
                &results,
                reader.max_versions(),
                self.options.timestamp_diff_us,
            );
            reader.set_result(merged);
        }
    }

    fn dispatch_lget_chain(&self, mut reader: RowReader) {
        let tables = self.tables.clone();
        let timestamp_diff = self.options.timestamp_diff_us;
        if tables.is_empty() {
            reader.set_error(no_replicas());
            if let Some(cb) = reader.take_callback() {
                cb(reader);
            }
            return;
        }
        tokio::spawn(async move {
            let mut gate = LGetGate::new(tables.len(), timestamp_diff);
            let mut idx = 0usize;
            loop {
                tables[idx].get(&mut reader).await;
                if !reader.error().is_ok() {
                    tracing::warn!(
                        row = reader.row_key(),
                        replica = idx,
                        reason = reader.error().reason(),
                        "async lget failed on replica"
                    );
                    metrics().replica_failures.with_label_values(&["lget"]).inc();
                }
                match gate.on_completion(&mut reader) {
                    Decision::Retry { next } => {
                        reader.reset();
                        idx = next;
                    }
                    Decision::Fire | Decision::FireCleared | Decision::Suppress => break,
                }
            }
            if let Some(cb) = reader.take_callback() {
                cb(reader);
            }
        });
    }

    /// Latest-get over a batch of readers, each resolved independently.
    pub async fn lget_batch(&self, readers: Vec<RowReader>) -> Vec<RowReader> {
        let mut out = Vec::with_capacity(readers.len());
        for r in readers {
            if let Some(done) = self.lget(r).await {
                out.push(done);
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // Scan
    // -----------------------------------------------------------------------

    /// Open a scan stream on the first replica that produces one. No
    /// cross-replica merging; the caller is not told which replica
    /// answered.
    pub async fn scan(&self, desc: &ScanDescriptor) -> Result<ScanStream, Status> {
        metrics().scans.inc();
        let _timer = start_op_timer("scan");
        let mut last_err = no_replicas();
        for (i, t) in self.tables.iter().enumerate() {
            match t.scan(desc).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::warn!(replica = i, reason = e.reason(), "scan failed on replica");
                    metrics().replica_failures.with_label_values(&["scan"]).inc();
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    // -----------------------------------------------------------------------
    // Introspection and tuning
    // -----------------------------------------------------------------------

    /// Name of the logical table, as reported by replica 0.
    pub fn name(&self) -> String {
        self.tables.first().map(|t| t.name()).unwrap_or_default()
    }

    /// True when every replica has drained its pending mutations.
    pub async fn is_put_finished(&self) -> bool {
        for t in &self.tables {
            if !t.is_put_finished().await {
                return false;
            }
        }
        true
    }

    /// True when every replica has drained its pending reads.
    pub async fn is_get_finished(&self) -> bool {
        for t in &self.tables {
            if !t.is_get_finished().await {
                return false;
            }
        }
        true
    }

    pub async fn set_write_timeout(&self, timeout_ms: i64) {
        for t in &self.tables {
            t.set_write_timeout(timeout_ms).await;
        }
    }

    pub async fn set_read_timeout(&self, timeout_ms: i64) {
        for t in &self.tables {
            t.set_read_timeout(timeout_ms).await;
        }
    }

    pub async fn set_max_mutation_pending(&self, max_pending: u64) {
        for t in &self.tables {
            t.set_max_mutation_pending(max_pending).await;
        }
    }

    pub async fn set_max_reader_pending(&self, max_pending: u64) {
        for t in &self.tables {
            t.set_max_reader_pending(max_pending).await;
        }
    }

    // -----------------------------------------------------------------------
    // Deliberately unsupported operations
    // -----------------------------------------------------------------------

    // These would need a cross-cluster semantic the facade does not
    // define. They fail without consulting any replica.

    pub fn flush(&self) -> Result<(), Status> {
        Err(Status::not_implemented("Flush"))
    }

    pub fn check_and_apply(
        &self,
        _row_key: &str,
        _check_column: &str,
        _expected: &[u8],
        _mu: &RowMutation,
    ) -> Result<(), Status> {
        Err(Status::not_implemented("CheckAndApply"))
    }

    pub fn increment_column_value(
        &self,
        _row_key: &str,
        _family: &str,
        _qualifier: &str,
        _amount: i64,
    ) -> Result<i64, Status> {
        Err(Status::not_implemented("IncrementColumnValue"))
    }

    pub fn lock_row(&self, _row_key: &str) -> Result<(), Status> {
        Err(Status::not_implemented("LockRow"))
    }

    pub fn get_start_end_keys(&self) -> Result<(Vec<u8>, Vec<u8>), Status> {
        Err(Status::not_implemented("GetStartEndKeys"))
    }

    pub fn get_tablet_location(&self) -> Result<Vec<TabletInfo>, Status> {
        Err(Status::not_implemented("GetTabletLocation"))
    }

    pub fn get_descriptor(&self) -> Result<TableDescriptor, Status> {
        Err(Status::not_implemented("GetDescriptor"))
    }
}
