//! Abstraction over one replica cluster.
//!
//! Two traits, one per plane: [`ReplicaTable`] for data operations on an
//! opened table, [`ReplicaClient`] for control-plane calls. The concrete
//! implementations live in the single-cluster SDK; unit and integration
//! tests use in-memory mocks. Same pattern as keeping the transport trait
//! in the domain crate with the wire implementation elsewhere.

use crate::mutation::RowMutation;
use crate::reader::RowReader;
use futures::stream::BoxStream;
use mirrortab_common::{
    Cell, ScanDescriptor, Status, TableDescriptor, TableInfo, TabletInfo,
};

/// Stream of cells produced by a scan. Errors are surfaced in-band.
pub type ScanStream = BoxStream<'static, Result<Cell, Status>>;

/// Scalar results of an administrative command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdCtrlResult {
    pub bool_result: bool,
    pub str_result: String,
}

/// Data-plane interface of one replica cluster's table.
///
/// Row-object methods complete when the underlying operation completes
/// and record the outcome in the object's error slot (and result buffer
/// for readers). Scalar helpers report through `Result` instead.
#[async_trait::async_trait]
pub trait ReplicaTable: Send + Sync + 'static {
    /// Apply one mutation; the outcome lands in `mu`'s error slot.
    async fn apply_mutation(&self, mu: &mut RowMutation);

    /// Apply a batch of mutations; per-row outcomes land in each slot.
    async fn apply_mutations(&self, mus: &mut [RowMutation]);

    async fn put(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
    ) -> Result<(), Status>;

    async fn put_with_ttl(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
        ttl_secs: i32,
    ) -> Result<(), Status>;

    async fn put_with_timestamp(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
        timestamp: i64,
        ttl_secs: i32,
    ) -> Result<(), Status>;

    /// Atomic counter increment.
    async fn add(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        delta: i64,
    ) -> Result<(), Status>;

    /// Counter increment over a little-endian i64 cell.
    async fn add_int64(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        delta: i64,
    ) -> Result<(), Status>;

    async fn put_if_absent(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
    ) -> Result<(), Status>;

    async fn append(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        value: &[u8],
    ) -> Result<(), Status>;

    /// Read one row; outcome and cells land in the reader.
    async fn get(&self, reader: &mut RowReader);

    /// Read a batch of rows; per-row outcomes land in each reader.
    async fn get_batch(&self, readers: &mut [RowReader]);

    async fn get_value(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        snapshot: u64,
    ) -> Result<Vec<u8>, Status>;

    async fn get_int64(
        &self,
        row_key: &str,
        family: &str,
        qualifier: &str,
        snapshot: u64,
    ) -> Result<i64, Status>;

    async fn scan(&self, desc: &ScanDescriptor) -> Result<ScanStream, Status>;

    fn name(&self) -> String;

    /// True when no mutation is pending inside this replica's client.
    async fn is_put_finished(&self) -> bool;

    /// True when no read is pending inside this replica's client.
    async fn is_get_finished(&self) -> bool;

    async fn set_write_timeout(&self, timeout_ms: i64);

    async fn set_read_timeout(&self, timeout_ms: i64);

    async fn set_max_mutation_pending(&self, max_pending: u64);

    async fn set_max_reader_pending(&self, max_pending: u64);
}

/// Control-plane interface of one replica cluster.
#[async_trait::async_trait]
pub trait ReplicaClient: Send + Sync + 'static {
    /// The table type this client opens. Open failure is an error, not a
    /// null to probe.
    type Table: ReplicaTable;

    async fn create_table(&self, desc: &TableDescriptor) -> Result<(), Status>;

    /// Create a pre-split table; `tablet_delimiters` are the split keys.
    async fn create_table_with_delimiters(
        &self,
        desc: &TableDescriptor,
        tablet_delimiters: &[Vec<u8>],
    ) -> Result<(), Status>;

    async fn update_table(&self, desc: &TableDescriptor) -> Result<(), Status>;

    async fn delete_table(&self, name: &str) -> Result<(), Status>;

    async fn enable_table(&self, name: &str) -> Result<(), Status>;

    async fn disable_table(&self, name: &str) -> Result<(), Status>;

    async fn rename_table(&self, old_name: &str, new_name: &str) -> Result<(), Status>;

    async fn create_user(&self, user: &str, password: &str) -> Result<(), Status>;

    async fn delete_user(&self, user: &str) -> Result<(), Status>;

    async fn change_password(&self, user: &str, password: &str) -> Result<(), Status>;

    async fn add_user_to_group(&self, user: &str, group: &str) -> Result<(), Status>;

    async fn delete_user_from_group(&self, user: &str, group: &str) -> Result<(), Status>;

    /// Groups the user belongs to.
    async fn show_user(&self, user: &str) -> Result<Vec<String>, Status>;

    async fn get_snapshot(&self, table: &str) -> Result<u64, Status>;

    async fn del_snapshot(&self, table: &str, snapshot: u64) -> Result<(), Status>;

    async fn rollback(
        &self,
        table: &str,
        snapshot: u64,
        rollback_name: &str,
    ) -> Result<(), Status>;

    async fn open_table(&self, name: &str) -> Result<Self::Table, Status>;

    /// Administrative command passthrough: safemode, tablet ops, meta
    /// backup, config reload.
    async fn cmd_ctrl(&self, command: &str, args: &[String]) -> Result<CmdCtrlResult, Status>;

    async fn list_tables(&self) -> Result<Vec<TableInfo>, Status>;

    async fn list_table(&self, name: &str) -> Result<(TableInfo, Vec<TabletInfo>), Status>;

    async fn is_table_exist(&self, name: &str) -> Result<bool, Status>;

    async fn is_table_enabled(&self, name: &str) -> Result<bool, Status>;

    async fn is_table_empty(&self, name: &str) -> Result<bool, Status>;

    async fn get_table_descriptor(&self, name: &str) -> Result<TableDescriptor, Status>;

    async fn get_tablet_location(&self, table: &str) -> Result<Vec<TabletInfo>, Status>;
}
