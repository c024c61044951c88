//! In-memory mock replicas shared by the integration tests.
//!
//! [`MockReplicaTable`] stores cells in a shared map and supports
//! scripted failures (whole-replica or per-row) plus call counting, so
//! tests can assert which replicas a fan-out touched.
//! [`MockReplicaClient`] does the same for the control plane.

use mirrortab_common::{
    Cell, ErrCode, ScanDescriptor, Status, TableDescriptor, TableInfo, TableStatus, TabletInfo,
};
use mirrortab_ha::replica::{CmdCtrlResult, ReplicaClient, ReplicaTable, ScanStream};
use mirrortab_ha::{MutationOp, RowMutation, RowReader};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// Shared event log recording which replica served which operation, in
/// order. Lets tests assert sequential async dispatch.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn new_event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

// ────────────────────────── MockReplicaTable ──────────────────────────

struct TableState {
    name: String,
    /// row key -> cells, newest-first.
    rows: RwLock<HashMap<String, Vec<Cell>>>,
    /// Fails every data op when set.
    fail_with: RwLock<Option<Status>>,
    /// Fails reads of specific rows.
    fail_rows: RwLock<HashSet<String>>,
    next_ts: AtomicI64,
    put_calls: AtomicUsize,
    get_calls: AtomicUsize,
    write_timeout_ms: AtomicI64,
    read_timeout_ms: AtomicI64,
    max_mutation_pending: AtomicU64,
    max_reader_pending: AtomicU64,
    events: Option<EventLog>,
}

/// An in-memory replica table. Cloning yields another handle onto the
/// same state, so a test can keep scripting a replica after handing it
/// to the facade.
#[derive(Clone)]
pub struct MockReplicaTable {
    state: Arc<TableState>,
}

impl MockReplicaTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_events(name, None)
    }

    pub fn with_events(name: impl Into<String>, events: Option<EventLog>) -> Self {
        Self {
            state: Arc::new(TableState {
                name: name.into(),
                rows: RwLock::new(HashMap::new()),
                fail_with: RwLock::new(None),
                fail_rows: RwLock::new(HashSet::new()),
                next_ts: AtomicI64::new(1),
                put_calls: AtomicUsize::new(0),
                get_calls: AtomicUsize::new(0),
                write_timeout_ms: AtomicI64::new(0),
                read_timeout_ms: AtomicI64::new(0),
                max_mutation_pending: AtomicU64::new(0),
                max_reader_pending: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// Script every subsequent data op to fail with `status`.
    pub async fn fail_with(&self, status: Status) {
        *self.state.fail_with.write().await = Some(status);
    }

    /// Script reads of one row to fail on this replica.
    pub async fn fail_row(&self, row_key: &str) {
        self.state.fail_rows.write().await.insert(row_key.to_string());
    }

    /// Seed a row with explicit cells (newest-first).
    pub async fn seed(&self, row_key: &str, cells: Vec<Cell>) {
        self.state.rows.write().await.insert(row_key.to_string(), cells);
    }

    pub async fn stored_value(&self, row_key: &str, family: &str, qualifier: &str) -> Option<Vec<u8>> {
        let rows = self.state.rows.read().await;
        rows.get(row_key)?
            .iter()
            .find(|c| c.family == family && c.qualifier == qualifier)
            .map(|c| c.value.clone())
    }

    pub fn put_calls(&self) -> usize {
        self.state.put_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.state.get_calls.load(Ordering::SeqCst)
    }

    pub fn write_timeout_ms(&self) -> i64 {
        self.state.write_timeout_ms.load(Ordering::SeqCst)
    }

    pub fn read_timeout_ms(&self) -> i64 {
        self.state.read_timeout_ms.load(Ordering::SeqCst)
    }

    pub fn max_mutation_pending(&self) -> u64 {
        self.state.max_mutation_pending.load(Ordering::SeqCst)
    }

    pub fn max_reader_pending(&self) -> u64 {
        self.state.max_reader_pending.load(Ordering::SeqCst)
    }

    fn record(&self, op: &str) {
        if let Some(events) = &self.state.events {
            events
                .lock()
                .unwrap()
                .push(format!("{}:{op}", self.state.name));
        }
    }

    async fn scripted_failure(&self) -> Option<Status> {
        self.state.fail_with.read().await.clone()
    }

    fn auto_ts(&self) -> i64 {
        self.state.next_ts.fetch_add(1, Ordering::SeqCst)
    }

    async fn store_cell(&self, row_key: &str, cell: Cell) {
        let mut rows = self.state.rows.write().await;
        let cells = rows.entry(row_key.to_string()).or_default();
        cells.push(cell);
        cells.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }

    async fn apply_ops(&self, row_key: &str, ops: &[MutationOp]) {
        for op in ops {
            match op {
                MutationOp::Put {
                    family,
                    qualifier,
                    timestamp,
                    value,
                    ..
                } => {
                    let ts = timestamp.unwrap_or_else(|| self.auto_ts());
                    self.store_cell(row_key, Cell::new(family.clone(), qualifier.clone(), ts, value.clone()))
                        .await;
                }
                MutationOp::Add {
                    family,
                    qualifier,
                    delta,
                } => {
                    let current = self
                        .stored_value(row_key, family, qualifier)
                        .await
                        .and_then(|v| v.try_into().ok())
                        .map(i64::from_le_bytes)
                        .unwrap_or(0);
                    let ts = self.auto_ts();
                    self.store_cell(
                        row_key,
                        Cell::new(
                            family.clone(),
                            qualifier.clone(),
                            ts,
                            (current + delta).to_le_bytes().to_vec(),
                        ),
                    )
                    .await;
                }
                MutationOp::PutIfAbsent {
                    family,
                    qualifier,
                    value,
                } => {
                    if self.stored_value(row_key, family, qualifier).await.is_none() {
                        let ts = self.auto_ts();
                        self.store_cell(
                            row_key,
                            Cell::new(family.clone(), qualifier.clone(), ts, value.clone()),
                        )
                        .await;
                    }
                }
                MutationOp::Append {
                    family,
                    qualifier,
                    value,
                } => {
                    let mut appended = self
                        .stored_value(row_key, family, qualifier)
                        .await
                        .unwrap_or_default();
                    appended.extend_from_slice(value);
                    let ts = self.auto_ts();
                    self.store_cell(
                        row_key,
                        Cell::new(family.clone(), qualifier.clone(), ts, appended),
                    )
                    .await;
                }
                MutationOp::DeleteRow { .. } => {
                    self.state.rows.write().await.remove(row_key);
                }
                MutationOp::DeleteFamily { family, .. } => {
                    if let Some(cells) = self.state.rows.write().await.get_mut(row_key) {
                        cells.retain(|c| &c.family != family);
                    }
                }
                MutationOp::DeleteColumns {
                    family, qualifier, ..
                } => {
                    if let Some(cells) = self.state.rows.write().await.get_mut(row_key) {
                        cells.retain(|c| !(&c.family == family && &c.qualifier == qualifier));
                    }
                }
            }
        }
    }

    async fn read_row(&self, reader: &mut RowReader) {
        self.state.get_calls.fetch_add(1, Ordering::SeqCst);
        self.record("get");
        if let Some(status) = self.scripted_failure().await {
            reader.set_error(status);
            return;
        }
        if self
            .state
            .fail_rows
            .read()
            .await
            .contains(reader.row_key())
        {
            reader.set_error(Status::failed(ErrCode::IoError, "scripted row failure"));
            return;
        }
        let rows = self.state.rows.read().await;
        match rows.get(reader.row_key()) {
            Some(cells) => {
                let take = reader.max_versions() as usize;
                reader.set_error(Status::ok());
                reader.set_result(cells.iter().take(take).cloned().collect());
            }
            None => {
                reader.set_error(Status::failed(ErrCode::NotFound, "row not found"));
            }
        }
    }

    async fn scalar_write(&self, row_key: &str, cell: Cell) -> Result<(), Status> {
        self.state.put_calls.fetch_add(1, Ordering::SeqCst);
        self.record("put");
        if let Some(status) = self.scripted_failure().await {
            return Err(status);
        }
        self.store_cell(row_key, cell).await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReplicaTable for MockReplicaTable {
    async fn apply_mutation(&self, mu: &mut RowMutation) {
        self.state.put_calls.fetch_add(1, Ordering::SeqCst);
        self.record("apply_mutation");
        if let Some(status) = self.scripted_failure().await {
            mu.set_error(status);
            return;
        }
        self.apply_ops(mu.row_key(), mu.ops()).await;
        mu.set_error(Status::ok());
    }

    async fn apply_mutations(&self, mus: &mut [RowMutation]) {
        for mu in mus.iter_mut() {
            self.apply_mutation(mu).await;
        }
    }

    async fn put(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
    ) -> Result<(), Status> {
        let ts = self.auto_ts();
        self.scalar_write(row_key, Cell::new(family, qualifier, ts, value.to_vec()))
            .await
    }

    async fn put_with_ttl(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
        _ttl_secs: i32,
    ) -> Result<(), Status> {
        self.put(row_key, family, qualifier, value).await
    }

    async fn put_with_timestamp(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
        timestamp: i64,
        _ttl_secs: i32,
    ) -> Result<(), Status> {
        self.scalar_write(row_key, Cell::new(family, qualifier, timestamp, value.to_vec()))
            .await
    }

    async fn add(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        delta: i64,
    ) -> Result<(), Status> {
        self.state.put_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.scripted_failure().await {
            return Err(status);
        }
        let mut mu = RowMutation::new(row_key);
        mu.add(family, qualifier, delta);
        self.apply_ops(row_key, mu.ops()).await;
        Ok(())
    }

    async fn add_int64(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        delta: i64,
    ) -> Result<(), Status> {
        self.add(row_key, family, qualifier, delta).await
    }

    async fn put_if_absent(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
    ) -> Result<(), Status> {
        self.state.put_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.scripted_failure().await {
            return Err(status);
        }
        if self.stored_value(row_key, family, qualifier).await.is_some() {
            return Err(Status::failed(ErrCode::BadParam, "cell already exists"));
        }
        let ts = self.auto_ts();
        self.store_cell(row_key, Cell::new(family, qualifier, ts, value.to_vec()))
            .await;
        Ok(())
    }

    async fn append(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
    ) -> Result<(), Status> {
        self.state.put_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.scripted_failure().await {
            return Err(status);
        }
        let mut mu = RowMutation::new(row_key);
        mu.append(family, qualifier, value.to_vec());
        self.apply_ops(row_key, mu.ops()).await;
        Ok(())
    }

    async fn get(&self, reader: &mut RowReader) {
        self.read_row(reader).await;
    }

    async fn get_batch(&self, readers: &mut [RowReader]) {
        for r in readers.iter_mut() {
            self.read_row(r).await;
        }
    }

    async fn get_value(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        _snapshot: u64,
    ) -> Result<Vec<u8>, Status> {
        self.state.get_calls.fetch_add(1, Ordering::SeqCst);
        self.record("get_value");
        if let Some(status) = self.scripted_failure().await {
            return Err(status);
        }
        self.stored_value(row_key, family, qualifier)
            .await
            .ok_or_else(|| Status::failed(ErrCode::NotFound, "cell not found"))
    }

    async fn get_int64(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        snapshot: u64,
    ) -> Result<i64, Status> {
        let value = self.get_value(row_key, family, qualifier, snapshot).await?;
        let bytes: [u8; 8] = value
            .try_into()
            .map_err(|_| Status::failed(ErrCode::BadParam, "cell is not an i64"))?;
        Ok(i64::from_le_bytes(bytes))
    }

    async fn scan(&self, desc: &ScanDescriptor) -> Result<ScanStream, Status> {
        self.state.get_calls.fetch_add(1, Ordering::SeqCst);
        self.record("scan");
        if let Some(status) = self.scripted_failure().await {
            return Err(status);
        }
        let rows = self.state.rows.read().await;
        let mut keys: Vec<&String> = rows
            .keys()
            .filter(|k| {
                k.as_bytes() >= desc.start_key.as_slice()
                    && (desc.end_key.is_empty() || k.as_bytes() < desc.end_key.as_slice())
            })
            .collect();
        keys.sort();
        let cells: Vec<Result<Cell, Status>> = keys
            .into_iter()
            .flat_map(|k| rows[k].iter().cloned().map(Ok))
            .collect();
        Ok(Box::pin(futures::stream::iter(cells)))
    }

    fn name(&self) -> String {
        self.state.name.clone()
    }

    async fn is_put_finished(&self) -> bool {
        self.scripted_failure().await.is_none()
    }

    async fn is_get_finished(&self) -> bool {
        self.scripted_failure().await.is_none()
    }

    async fn set_write_timeout(&self, timeout_ms: i64) {
        self.state.write_timeout_ms.store(timeout_ms, Ordering::SeqCst);
    }

    async fn set_read_timeout(&self, timeout_ms: i64) {
        self.state.read_timeout_ms.store(timeout_ms, Ordering::SeqCst);
    }

    async fn set_max_mutation_pending(&self, max_pending: u64) {
        self.state
            .max_mutation_pending
            .store(max_pending, Ordering::SeqCst);
    }

    async fn set_max_reader_pending(&self, max_pending: u64) {
        self.state
            .max_reader_pending
            .store(max_pending, Ordering::SeqCst);
    }
}

// ────────────────────────── MockReplicaClient ──────────────────────────

struct ClientState {
    table: MockReplicaTable,
    tables: RwLock<HashSet<String>>,
    fail_ddl: RwLock<Option<Status>>,
    fail_admin: RwLock<Option<Status>>,
    fail_open: RwLock<bool>,
    ddl_calls: AtomicUsize,
    admin_calls: AtomicUsize,
    cmd_calls: AtomicUsize,
}

/// An in-memory replica control plane. Cloning shares state, like
/// [`MockReplicaTable`].
#[derive(Clone)]
pub struct MockReplicaClient {
    state: Arc<ClientState>,
}

impl MockReplicaClient {
    pub fn new(cluster: impl Into<String>) -> Self {
        let cluster = cluster.into();
        Self {
            state: Arc::new(ClientState {
                table: MockReplicaTable::new(format!("events@{cluster}")),
                tables: RwLock::new(HashSet::new()),
                fail_ddl: RwLock::new(None),
                fail_admin: RwLock::new(None),
                fail_open: RwLock::new(false),
                ddl_calls: AtomicUsize::new(0),
                admin_calls: AtomicUsize::new(0),
                cmd_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// The table handle `open_table` hands out, for post-open scripting.
    pub fn table(&self) -> MockReplicaTable {
        self.state.table.clone()
    }

    pub async fn fail_ddl_with(&self, status: Status) {
        *self.state.fail_ddl.write().await = Some(status);
    }

    pub async fn fail_admin_with(&self, status: Status) {
        *self.state.fail_admin.write().await = Some(status);
    }

    pub async fn fail_open(&self) {
        *self.state.fail_open.write().await = true;
    }

    pub fn ddl_calls(&self) -> usize {
        self.state.ddl_calls.load(Ordering::SeqCst)
    }

    pub fn admin_calls(&self) -> usize {
        self.state.admin_calls.load(Ordering::SeqCst)
    }

    pub fn cmd_calls(&self) -> usize {
        self.state.cmd_calls.load(Ordering::SeqCst)
    }

    pub async fn has_table(&self, name: &str) -> bool {
        self.state.tables.read().await.contains(name)
    }

    async fn ddl(&self) -> Result<(), Status> {
        self.state.ddl_calls.fetch_add(1, Ordering::SeqCst);
        match self.state.fail_ddl.read().await.clone() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    async fn admin(&self) -> Result<(), Status> {
        self.state.admin_calls.fetch_add(1, Ordering::SeqCst);
        match self.state.fail_admin.read().await.clone() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn descriptor(name: &str) -> TableDescriptor {
        TableDescriptor::new(name)
    }
}

#[async_trait::async_trait]
impl ReplicaClient for MockReplicaClient {
    type Table = MockReplicaTable;

    async fn create_table(&self, desc: &TableDescriptor) -> Result<(), Status> {
        self.ddl().await?;
        self.state.tables.write().await.insert(desc.name.clone());
        Ok(())
    }

    async fn create_table_with_delimiters(
        &self,
        desc: &TableDescriptor,
        _tablet_delimiters: &[Vec<u8>],
    ) -> Result<(), Status> {
        self.create_table(desc).await
    }

    async fn update_table(&self, _desc: &TableDescriptor) -> Result<(), Status> {
        self.ddl().await
    }

    async fn delete_table(&self, name: &str) -> Result<(), Status> {
        self.ddl().await?;
        self.state.tables.write().await.remove(name);
        Ok(())
    }

    async fn enable_table(&self, _name: &str) -> Result<(), Status> {
        self.ddl().await
    }

    async fn disable_table(&self, _name: &str) -> Result<(), Status> {
        self.ddl().await
    }

    async fn rename_table(&self, old_name: &str, new_name: &str) -> Result<(), Status> {
        self.ddl().await?;
        let mut tables = self.state.tables.write().await;
        if tables.remove(old_name) {
            tables.insert(new_name.to_string());
        }
        Ok(())
    }

    async fn create_user(&self, _user: &str, _password: &str) -> Result<(), Status> {
        self.ddl().await
    }

    async fn delete_user(&self, _user: &str) -> Result<(), Status> {
        self.ddl().await
    }

    async fn change_password(&self, _user: &str, _password: &str) -> Result<(), Status> {
        self.ddl().await
    }

    async fn add_user_to_group(&self, _user: &str, _group: &str) -> Result<(), Status> {
        self.ddl().await
    }

    async fn delete_user_from_group(&self, _user: &str, _group: &str) -> Result<(), Status> {
        self.ddl().await
    }

    async fn show_user(&self, user: &str) -> Result<Vec<String>, Status> {
        self.admin().await?;
        Ok(vec![format!("{user}-group")])
    }

    async fn get_snapshot(&self, _table: &str) -> Result<u64, Status> {
        self.admin().await?;
        Ok(42)
    }

    async fn del_snapshot(&self, _table: &str, _snapshot: u64) -> Result<(), Status> {
        self.ddl().await
    }

    async fn rollback(
        &self,
        _table: &str,
        _snapshot: u64,
        _rollback_name: &str,
    ) -> Result<(), Status> {
        self.ddl().await
    }

    async fn open_table(&self, name: &str) -> Result<Self::Table, Status> {
        if *self.state.fail_open.read().await {
            return Err(Status::failed(ErrCode::IoError, "cluster unreachable"));
        }
        let _ = name;
        Ok(self.state.table.clone())
    }

    async fn cmd_ctrl(&self, command: &str, _args: &[String]) -> Result<CmdCtrlResult, Status> {
        self.state.cmd_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.state.fail_admin.read().await.clone() {
            return Err(status);
        }
        Ok(CmdCtrlResult {
            bool_result: true,
            str_result: format!("{command} done by {}", self.state.table.name()),
        })
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, Status> {
        self.admin().await?;
        let tables = self.state.tables.read().await;
        Ok(tables
            .iter()
            .map(|name| TableInfo {
                descriptor: Self::descriptor(name),
                status: TableStatus::Enabled,
            })
            .collect())
    }

    async fn list_table(&self, name: &str) -> Result<(TableInfo, Vec<TabletInfo>), Status> {
        self.admin().await?;
        Ok((
            TableInfo {
                descriptor: Self::descriptor(name),
                status: TableStatus::Enabled,
            },
            Vec::new(),
        ))
    }

    async fn is_table_exist(&self, name: &str) -> Result<bool, Status> {
        self.admin().await?;
        Ok(self.state.tables.read().await.contains(name))
    }

    async fn is_table_enabled(&self, _name: &str) -> Result<bool, Status> {
        self.admin().await?;
        Ok(true)
    }

    async fn is_table_empty(&self, _name: &str) -> Result<bool, Status> {
        self.admin().await?;
        Ok(false)
    }

    async fn get_table_descriptor(&self, name: &str) -> Result<TableDescriptor, Status> {
        self.admin().await?;
        Ok(Self::descriptor(name))
    }

    async fn get_tablet_location(&self, table: &str) -> Result<Vec<TabletInfo>, Status> {
        self.admin().await?;
        Ok(vec![TabletInfo {
            table_name: table.to_string(),
            path: format!("/{table}/tablet00000001"),
            start_key: Vec::new(),
            end_key: Vec::new(),
            server_addr: "ts0:2200".to_string(),
            size_bytes: 0,
        }])
    }
}
