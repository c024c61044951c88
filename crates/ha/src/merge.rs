//! Timestamp merge for latest-get reads.
//!
//! Each replica returns its own view of a row, cells ordered
//! newest-first. The merge walks all views with one cursor per replica,
//! repeatedly emitting the globally-newest cursor cell. Replicas are
//! eventually consistent and the same logical write lands on each cluster
//! at a slightly different timestamp, so whenever a cell is emitted,
//! every other replica whose cursor cell sits within the configured
//! duplicate window is advanced past it.

use mirrortab_common::RowResult;

/// Merge per-replica results into a single newest-first result.
///
/// `timestamp_diff` is the duplicate window in microseconds: cells from
/// other replicas within `timestamp_diff` of an emitted cell are treated
/// as the same logical write and skipped. 0 disables collapsing. The
/// output holds at most `max_versions` cells.
///
/// Exact timestamp ties go to the lowest replica index; the later
/// duplicates are only dropped when the window says so.
pub fn merge_results(results: &[RowResult], max_versions: u32, timestamp_diff: i64) -> RowResult {
    let mut pos = vec![0usize; results.len()];
    let mut out = RowResult::new();
    let mut collapsed: u64 = 0;

    for _ in 0..max_versions {
        // Pick the replica whose cursor cell is newest.
        let mut candidate: Option<(usize, i64)> = None;
        for (j, r) in results.iter().enumerate() {
            if let Some(cell) = r.cells.get(pos[j]) {
                match candidate {
                    Some((_, best)) if cell.timestamp <= best => {}
                    _ => candidate = Some((j, cell.timestamp)),
                }
            }
        }
        let Some((c, timestamp)) = candidate else {
            break;
        };

        // Skip the same logical write as seen by the other replicas.
        for (j, r) in results.iter().enumerate() {
            if j == c {
                continue;
            }
            if let Some(cell) = r.cells.get(pos[j]) {
                if (timestamp - cell.timestamp).abs() < timestamp_diff {
                    pos[j] += 1;
                    collapsed += 1;
                }
            }
        }

        out.push(results[c].cells[pos[c]].clone());
        pos[c] += 1;
    }

    if collapsed > 0 {
        mirrortab_metrics::metrics()
            .merge_collapsed_cells
            .inc_by(collapsed);
    }
    out
}
