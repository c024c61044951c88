//! Control-plane fan-out over the replica clusters.
//!
//! [`HaClient`] owns one per-cluster client per configured replica and
//! routes admin traffic across them. Mutating DDL goes to every replica
//! (optionally fail-fast), read-style admin calls stop at the first
//! replica that answers, and `cmd_ctrl` always touches every replica.

use crate::replica::{CmdCtrlResult, ReplicaClient};
use crate::table::HaTable;
use mirrortab_common::{ErrCode, Status, TableDescriptor, TableInfo, TabletInfo};
use mirrortab_config::{ClientConfig, ClusterConfig, HaOptions};
use mirrortab_metrics::{metrics, start_op_timer};
use std::future::Future;
use std::sync::Arc;

fn no_replicas() -> Status {
    Status::failed(ErrCode::System, "no replicas")
}

/// HA facade over the control planes of N replica clusters.
pub struct HaClient<C: ReplicaClient> {
    clients: Vec<Arc<C>>,
    options: HaOptions,
}

impl<C: ReplicaClient> std::fmt::Debug for HaClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HaClient")
            .field("replicas", &self.clients.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<C: ReplicaClient> HaClient<C> {
    /// Assemble a facade over already-connected per-cluster clients, in
    /// fan-out order.
    pub fn new(clients: Vec<Arc<C>>, options: HaOptions) -> Self {
        Self { clients, options }
    }

    /// Connect one per-cluster client per configured cluster, in
    /// configuration order. `connect` is the single-cluster SDK's
    /// constructor; the first connection failure aborts.
    pub fn connect_with<F>(config: &ClientConfig, connect: F) -> Result<Self, Status>
    where
        F: Fn(&ClusterConfig) -> Result<C, Status>,
    {
        let mut clients = Vec::with_capacity(config.clusters.len());
        for cluster in &config.clusters {
            clients.push(Arc::new(connect(cluster)?));
        }
        Ok(Self::new(clients, config.ha))
    }

    /// Number of replica clusters behind this facade.
    pub fn replica_count(&self) -> usize {
        self.clients.len()
    }

    /// Direct handle to the i-th per-cluster client.
    pub fn cluster_client(&self, i: usize) -> Option<&Arc<C>> {
        self.clients.get(i)
    }

    pub fn options(&self) -> HaOptions {
        self.options
    }

    // -----------------------------------------------------------------------
    // Fan-out helpers
    // -----------------------------------------------------------------------

    /// Mutating DDL fan-out. With `ddl_fail_fast` on, the first replica
    /// failure aborts the remaining dispatches; otherwise best-effort
    /// with the writes' at-least-one-success law.
    async fn ddl_fan_out<'a, F, Fut>(&'a self, op: &'static str, call: F) -> Result<(), Status>
    where
        F: Fn(&'a C) -> Fut,
        Fut: Future<Output = Result<(), Status>>,
    {
        metrics().ddl_ops.with_label_values(&[op]).inc();
        let _timer = start_op_timer(op);
        if self.clients.is_empty() {
            return Err(no_replicas());
        }
        let mut failed = 0usize;
        let mut last_err = Status::ok();
        for (i, c) in self.clients.iter().enumerate() {
            if let Err(e) = call(c.as_ref()).await {
                metrics().replica_failures.with_label_values(&[op]).inc();
                if self.options.ddl_fail_fast {
                    // DDL divergence between replicas is usually
                    // unrecoverable; stop and surface it loudly.
                    tracing::error!(
                        op,
                        replica = i,
                        reason = e.reason(),
                        "DDL failed, aborting fan-out"
                    );
                    return Err(e);
                }
                tracing::warn!(op, replica = i, reason = e.reason(), "DDL failed on replica");
                failed += 1;
                last_err = e;
            }
        }
        if failed >= self.clients.len() {
            Err(last_err)
        } else {
            Ok(())
        }
    }

    /// Read-style admin call: first replica that answers wins.
    async fn first_success<'a, F, Fut, R>(&'a self, op: &'static str, call: F) -> Result<R, Status>
    where
        F: Fn(&'a C) -> Fut,
        Fut: Future<Output = Result<R, Status>>,
    {
        let _timer = start_op_timer(op);
        let mut last_err = no_replicas();
        for (i, c) in self.clients.iter().enumerate() {
            match call(c.as_ref()).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    tracing::warn!(
                        op,
                        replica = i,
                        reason = e.reason(),
                        "admin read failed on replica"
                    );
                    metrics().replica_failures.with_label_values(&[op]).inc();
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    // -----------------------------------------------------------------------
    // Table DDL
    // -----------------------------------------------------------------------

    pub async fn create_table(&self, desc: &TableDescriptor) -> Result<(), Status> {
        self.ddl_fan_out("create_table", |c| c.create_table(desc))
            .await
    }

    pub async fn create_table_with_delimiters(
        &self,
        desc: &TableDescriptor,
        tablet_delimiters: &[Vec<u8>],
    ) -> Result<(), Status> {
        self.ddl_fan_out("create_table", |c| {
            c.create_table_with_delimiters(desc, tablet_delimiters)
        })
        .await
    }

    pub async fn update_table(&self, desc: &TableDescriptor) -> Result<(), Status> {
        self.ddl_fan_out("update_table", |c| c.update_table(desc))
            .await
    }

    pub async fn delete_table(&self, name: &str) -> Result<(), Status> {
        self.ddl_fan_out("delete_table", |c| c.delete_table(name))
            .await
    }

    pub async fn enable_table(&self, name: &str) -> Result<(), Status> {
        self.ddl_fan_out("enable_table", |c| c.enable_table(name))
            .await
    }

    pub async fn disable_table(&self, name: &str) -> Result<(), Status> {
        self.ddl_fan_out("disable_table", |c| c.disable_table(name))
            .await
    }

    pub async fn rename_table(&self, old_name: &str, new_name: &str) -> Result<(), Status> {
        self.ddl_fan_out("rename_table", |c| c.rename_table(old_name, new_name))
            .await
    }

    // -----------------------------------------------------------------------
    // User management
    // -----------------------------------------------------------------------

    pub async fn create_user(&self, user: &str, password: &str) -> Result<(), Status> {
        self.ddl_fan_out("create_user", |c| c.create_user(user, password))
            .await
    }

    pub async fn delete_user(&self, user: &str) -> Result<(), Status> {
        self.ddl_fan_out("delete_user", |c| c.delete_user(user))
            .await
    }

    pub async fn change_password(&self, user: &str, password: &str) -> Result<(), Status> {
        self.ddl_fan_out("change_password", |c| c.change_password(user, password))
            .await
    }

    pub async fn add_user_to_group(&self, user: &str, group: &str) -> Result<(), Status> {
        self.ddl_fan_out("add_user_to_group", |c| c.add_user_to_group(user, group))
            .await
    }

    pub async fn delete_user_from_group(&self, user: &str, group: &str) -> Result<(), Status> {
        self.ddl_fan_out("delete_user_from_group", |c| {
            c.delete_user_from_group(user, group)
        })
        .await
    }

    /// Groups the user belongs to, from the first replica that answers.
    pub async fn show_user(&self, user: &str) -> Result<Vec<String>, Status> {
        self.first_success("show_user", |c| c.show_user(user)).await
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub async fn get_snapshot(&self, table: &str) -> Result<u64, Status> {
        self.first_success("get_snapshot", |c| c.get_snapshot(table))
            .await
    }

    pub async fn del_snapshot(&self, table: &str, snapshot: u64) -> Result<(), Status> {
        self.ddl_fan_out("del_snapshot", |c| c.del_snapshot(table, snapshot))
            .await
    }

    pub async fn rollback(
        &self,
        table: &str,
        snapshot: u64,
        rollback_name: &str,
    ) -> Result<(), Status> {
        self.ddl_fan_out("rollback", |c| c.rollback(table, snapshot, rollback_name))
            .await
    }

    // -----------------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------------

    /// Open the named table on every replica and assemble an [`HaTable`]
    /// over the subset that opened. Fails only when no replica opened it.
    pub async fn open_table(&self, name: &str) -> Result<HaTable<C::Table>, Status> {
        let _timer = start_op_timer("open_table");
        let mut tables = Vec::with_capacity(self.clients.len());
        let mut last_err = no_replicas();
        for (i, c) in self.clients.iter().enumerate() {
            match c.open_table(name).await {
                Ok(t) => tables.push(Arc::new(t)),
                Err(e) => {
                    tracing::warn!(
                        table = name,
                        replica = i,
                        reason = e.reason(),
                        "open_table failed on replica"
                    );
                    metrics()
                        .replica_failures
                        .with_label_values(&["open_table"])
                        .inc();
                    last_err = e;
                }
            }
        }
        if tables.is_empty() {
            Err(last_err)
        } else {
            Ok(HaTable::new(tables, self.options))
        }
    }

    pub async fn list_tables(&self) -> Result<Vec<TableInfo>, Status> {
        self.first_success("list_tables", |c| c.list_tables()).await
    }

    pub async fn list_table(&self, name: &str) -> Result<(TableInfo, Vec<TabletInfo>), Status> {
        self.first_success("list_table", |c| c.list_table(name))
            .await
    }

    pub async fn is_table_exist(&self, name: &str) -> Result<bool, Status> {
        self.first_success("is_table_exist", |c| c.is_table_exist(name))
            .await
    }

    pub async fn is_table_enabled(&self, name: &str) -> Result<bool, Status> {
        self.first_success("is_table_enabled", |c| c.is_table_enabled(name))
            .await
    }

    pub async fn is_table_empty(&self, name: &str) -> Result<bool, Status> {
        self.first_success("is_table_empty", |c| c.is_table_empty(name))
            .await
    }

    pub async fn get_table_descriptor(&self, name: &str) -> Result<TableDescriptor, Status> {
        self.first_success("get_table_descriptor", |c| c.get_table_descriptor(name))
            .await
    }

    pub async fn get_tablet_location(&self, table: &str) -> Result<Vec<TabletInfo>, Status> {
        self.first_success("get_tablet_location", |c| c.get_tablet_location(table))
            .await
    }

    // -----------------------------------------------------------------------
    // CmdCtrl
    // -----------------------------------------------------------------------

    /// Administrative command passthrough (safemode, tablet ops, meta
    /// backup, config reload). Every replica is asked unconditionally;
    /// the scalar results of the first successful replica are returned,
    /// and the call succeeds iff any replica succeeded.
    pub async fn cmd_ctrl(
        &self,
        command: &str,
        args: &[String],
    ) -> Result<CmdCtrlResult, Status> {
        metrics().ddl_ops.with_label_values(&["cmd_ctrl"]).inc();
        let _timer = start_op_timer("cmd_ctrl");
        if self.clients.is_empty() {
            return Err(no_replicas());
        }
        let mut first_ok: Option<CmdCtrlResult> = None;
        let mut last_err = Status::ok();
        for (i, c) in self.clients.iter().enumerate() {
            match c.cmd_ctrl(command, args).await {
                Ok(res) => {
                    if first_ok.is_none() {
                        first_ok = Some(res);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        command,
                        replica = i,
                        reason = e.reason(),
                        "cmd_ctrl failed on replica"
                    );
                    metrics()
                        .replica_failures
                        .with_label_values(&["cmd_ctrl"])
                        .inc();
                    last_err = e;
                }
            }
        }
        match first_ok {
            Some(res) => Ok(res),
            None => Err(last_err),
        }
    }
}
