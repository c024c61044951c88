//! Table, tablet and scan descriptors.
//!
//! Plain value types exchanged with the control plane. The facade never
//! interprets them; it only routes them to replica clusters.

use serde::{Deserialize, Serialize};

/// Schema of one column family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFamilySchema {
    pub name: String,
    /// Locality group this family is stored under.
    #[serde(default)]
    pub locality_group: String,
    /// Number of versions retained per cell.
    #[serde(default = "default_max_versions")]
    pub max_versions: u32,
    /// Cell time-to-live in seconds; 0 means never expire.
    #[serde(default)]
    pub ttl_secs: i64,
}

fn default_max_versions() -> u32 {
    1
}

impl ColumnFamilySchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locality_group: String::new(),
            max_versions: default_max_versions(),
            ttl_secs: 0,
        }
    }
}

/// Schema of a logical table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    #[serde(default)]
    pub column_families: Vec<ColumnFamilySchema>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_families: Vec::new(),
        }
    }

    pub fn add_column_family(&mut self, cf: ColumnFamilySchema) -> &mut Self {
        self.column_families.push(cf);
        self
    }
}

/// Administrative state of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableStatus {
    Enabled,
    Disabled,
}

/// A table's descriptor plus its state, as reported by `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub descriptor: TableDescriptor,
    pub status: TableStatus,
}

/// Location and extent of one tablet of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletInfo {
    pub table_name: String,
    pub path: String,
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub server_addr: String,
    pub size_bytes: u64,
}

/// Parameters of a range scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanDescriptor {
    pub start_key: Vec<u8>,
    /// Exclusive end key; empty means scan to the end of the table.
    pub end_key: Vec<u8>,
    /// Column filter as `family` or `family:qualifier` selectors.
    /// Empty selects everything.
    pub columns: Vec<String>,
    pub max_versions: u32,
    /// Half-open `[min, max)` timestamp window, microseconds.
    pub timestamp_range: Option<(i64, i64)>,
}

impl ScanDescriptor {
    pub fn new(start_key: impl Into<Vec<u8>>) -> Self {
        Self {
            start_key: start_key.into(),
            max_versions: 1,
            ..Default::default()
        }
    }

    pub fn with_end(mut self, end_key: impl Into<Vec<u8>>) -> Self {
        self.end_key = end_key.into();
        self
    }

    pub fn with_column(mut self, selector: impl Into<String>) -> Self {
        self.columns.push(selector.into());
        self
    }

    pub fn with_max_versions(mut self, n: u32) -> Self {
        self.max_versions = n;
        self
    }
}
