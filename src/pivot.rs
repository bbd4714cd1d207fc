//! 2-D views of a [`CpuTable`], with the user time as cell value.

use crate::error::Result;
use crate::table::{CpuTable, FlatRow};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// A table re-indexed by two of its dimensions.
/// `cells[i][j]` holds the value for `index[i]` and `columns[j]`,
/// None when the table has no row for that pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot<R, C> {
    pub index: Vec<R>,
    pub columns: Vec<C>,
    pub cells: Vec<Vec<Option<f64>>>,
}

/// Rows are timestamps, columns are cores; one line per column.
pub type TimeMajor = Pivot<DateTime<Utc>, i64>;

/// Rows are cores, columns are timestamps; the heatmap layout.
pub type CoreMajor = Pivot<i64, DateTime<Utc>>;

impl<R: Ord + Copy, C: Ord + Copy> Pivot<R, C> {
    fn from_rows<FR, FC>(rows: &[FlatRow], row_key: FR, col_key: FC) -> Pivot<R, C>
    where
        FR: Fn(&FlatRow) -> R,
        FC: Fn(&FlatRow) -> C,
    {
        let index: Vec<R> = rows
            .iter()
            .map(&row_key)
            .collect::<BTreeSet<R>>()
            .into_iter()
            .collect();
        let columns: Vec<C> = rows
            .iter()
            .map(&col_key)
            .collect::<BTreeSet<C>>()
            .into_iter()
            .collect();
        let mut cells = vec![vec![None; columns.len()]; index.len()];
        for r in rows {
            // both keys come from the same rows, the searches cannot miss
            if let (Ok(i), Ok(j)) = (
                index.binary_search(&row_key(r)),
                columns.binary_search(&col_key(r)),
            ) {
                cells[i][j] = Some(r.usr);
            }
        }
        Pivot {
            index,
            columns,
            cells,
        }
    }

    pub fn cell(&self, i: usize, j: usize) -> Option<f64> {
        self.cells.get(i).and_then(|row| row.get(j)).copied().flatten()
    }

    /// The values of column `j` paired with the row labels, in index order.
    pub fn column_series(&self, j: usize) -> Vec<(R, Option<f64>)> {
        self.index
            .iter()
            .enumerate()
            .map(|(i, &label)| (label, self.cell(i, j)))
            .collect()
    }

    /// Minimum and maximum over the present cells.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let values: Vec<f64> = self.cells.iter().flatten().filter_map(|v| *v).collect();
        crate::min_and_max(&values)
    }
}

impl CpuTable {
    /// Timestamps by cores, for the per-core line chart.
    pub fn pivot_time_major(&self) -> Result<TimeMajor> {
        self.ensure_unique_cells()?;
        Ok(Pivot::from_rows(self.rows(), |r| r.timestamp, |r| r.cpu))
    }

    /// Cores by timestamps, for the heatmap.
    pub fn pivot_core_major(&self) -> Result<CoreMajor> {
        self.ensure_unique_cells()?;
        Ok(Pivot::from_rows(self.rows(), |r| r.cpu, |r| r.timestamp))
    }
}
