//! Ribbon reducer: sort, per-row min/max, all-reduce, sanity gate, stats (§4.5)
//!
//! Grounded on the upstream driver's ribbon-width tail (`bmata.py`'s
//! post-build reduction): a stable sort by row groups each row's columns
//! together, local min/max per row seed two dense `G`-length vectors at
//! sentinel values, and a MIN/MAX all-reduce across ranks fills in the
//! global picture. The sanity gate and width statistics follow directly
//! from the numeric semantics the spec fixes in §4.5.

use crate::collective::Collective;
use crate::error::BmatrixError;
use crate::index::{ColIdx, RowIdx};
use crate::kernel::TripleBuffer;

/// Per-row ribbon-width statistics, computed only over rows with `width > 0`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WidthStats {
    pub max_width: i64,
    pub argmax_row: usize,
    pub avg_width: f64,
    pub std_width: f64,
    pub avg_width_trimmed: f64,
}

/// Result of one ribbon reduction: the full-length width vector and summary
/// statistics over its nonzero entries.
pub struct RibbonResult {
    pub width: Vec<i64>,
    pub stats: Option<WidthStats>,
}

/// Stable-sort `(b, i, j)` by row `i`, permuting `b` and `j` to match.
/// Returns the sorted `(i, j)` pairs; `b` is not needed downstream of this
/// reducer but is reordered identically for shard output by the caller.
pub fn sort_by_row(triples: &TripleBuffer) -> (Vec<RowIdx>, Vec<ColIdx>, Vec<usize>) {
    let (_, i, j) = triples.columns();
    let mut order: Vec<usize> = (0..i.len()).collect();
    order.sort_by_key(|&n| i[n].as_usize());
    let sorted_i: Vec<RowIdx> = order.iter().map(|&n| i[n]).collect();
    let sorted_j: Vec<ColIdx> = order.iter().map(|&n| j[n]).collect();
    (sorted_i, sorted_j, order)
}

/// Reduce one rank's sorted `(row, col)` triples into the global per-row
/// ribbon width vector, all-reducing with peers.
///
/// `g` is the total node count (§3); the sentinel for an absent row's min is
/// `g + 10`, an out-of-range upper bound (§4.5 step 2).
pub fn reduce_ribbon(
    collective: &dyn Collective,
    sorted_i: &[RowIdx],
    sorted_j: &[ColIdx],
    g: usize,
) -> Result<RibbonResult, BmatrixError> {
    let sentinel_min = (g as i64) + 10;
    let mut row_min = vec![sentinel_min; g];
    let mut row_max = vec![-1i64; g];

    let mut n = 0;
    while n < sorted_i.len() {
        let row = sorted_i[n].as_usize();
        let mut lo = sorted_j[n].as_usize() as i64;
        let mut hi = lo;
        let mut m = n + 1;
        while m < sorted_i.len() && sorted_i[m].as_usize() == row {
            let v = sorted_j[m].as_usize() as i64;
            lo = lo.min(v);
            hi = hi.max(v);
            m += 1;
        }
        row_min[row] = lo;
        row_max[row] = hi;
        n = m;
    }

    collective.all_reduce_min_i64(&mut row_min)?;
    collective.all_reduce_max_i64(&mut row_max)?;

    for r in 0..g {
        if row_max[r] >= g as i64 {
            return Err(BmatrixError::Sanity(format!(
                "row {r}: reduced max {} >= G ({g})",
                row_max[r]
            )));
        }
        if row_max[r] >= 0 && row_min[r] < 0 {
            return Err(BmatrixError::Sanity(format!(
                "row {r}: reduced min {} < 0 at a row with a valid max",
                row_min[r]
            )));
        }
    }

    let width: Vec<i64> = (0..g)
        .map(|r| {
            if row_max[r] < 0 {
                0
            } else {
                row_max[r] - row_min[r]
            }
        })
        .collect();

    let stats = compute_stats(&width);

    Ok(RibbonResult { width, stats })
}

fn compute_stats(width: &[i64]) -> Option<WidthStats> {
    let present: Vec<(usize, i64)> = width
        .iter()
        .enumerate()
        .filter(|&(_, &w)| w > 0)
        .map(|(r, &w)| (r, w))
        .collect();
    if present.is_empty() {
        return None;
    }

    let count = present.len() as f64;
    let (argmax_row, max_width) = present
        .iter()
        .fold((present[0].0, present[0].1), |(br, bw), &(r, w)| {
            if w > bw {
                (r, w)
            } else {
                (br, bw)
            }
        });

    let sum: f64 = present.iter().map(|&(_, w)| w as f64).sum();
    let avg_width = sum / count;

    let var: f64 = present
        .iter()
        .map(|&(_, w)| {
            let d = w as f64 - avg_width;
            d * d
        })
        .sum::<f64>()
        / count;
    let std_width = var.sqrt();

    let cutoff = avg_width + 2.0 * std_width;
    let trimmed: Vec<f64> = present
        .iter()
        .map(|&(_, w)| w as f64)
        .filter(|&w| w < cutoff)
        .collect();
    let avg_width_trimmed = if trimmed.is_empty() {
        avg_width
    } else {
        trimmed.iter().sum::<f64>() / trimmed.len() as f64
    };

    Some(WidthStats {
        max_width,
        argmax_row,
        avg_width,
        std_width,
        avg_width_trimmed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collective::local_ranks;
    use std::thread;

    #[test]
    fn single_rank_width_matches_local_span() {
        let ranks = local_ranks(1);
        let c = ranks.into_iter().next().unwrap();
        // row 0: cols {1, 3}; row 2: cols {2}
        let i = vec![RowIdx(0), RowIdx(0), RowIdx(2)];
        let j = vec![ColIdx(1), ColIdx(3), ColIdx(2)];
        let result = reduce_ribbon(&c, &i, &j, 5).unwrap();
        assert_eq!(result.width, vec![2, 0, 0, 0, 0], "P6: max_j >= min_j");
        let stats = result.stats.unwrap();
        assert_eq!(stats.max_width, 2);
        assert_eq!(stats.argmax_row, 0);
    }

    #[test]
    fn split_across_two_ranks_matches_single_rank_union() {
        let ranks = local_ranks(2);
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|c| {
                thread::spawn(move || {
                    // rank 0 owns row 0 -> cols {0, 4}; rank 1 owns row 0 -> cols {2}
                    let (i, j) = if c.rank().as_usize() == 0 {
                        (vec![RowIdx(0)], vec![ColIdx(0)])
                    } else {
                        (vec![RowIdx(0)], vec![ColIdx(4)])
                    };
                    reduce_ribbon(&c, &i, &j, 5).unwrap().width
                })
            })
            .collect();
        for h in handles {
            let width = h.join().unwrap();
            assert_eq!(width[0], 4, "P7: result independent of which rank saw which column");
        }
    }

    #[test]
    fn sanity_gate_rejects_out_of_range_max() {
        let ranks = local_ranks(1);
        let c = ranks.into_iter().next().unwrap();
        let i = vec![RowIdx(0)];
        let j = vec![ColIdx(10)]; // g = 5, so col 10 is out of range
        let err = reduce_ribbon(&c, &i, &j, 5).unwrap_err();
        assert!(err.is_sanity());
    }

    #[test]
    fn absent_rows_stay_at_zero_width() {
        let ranks = local_ranks(1);
        let c = ranks.into_iter().next().unwrap();
        let i = vec![RowIdx(1)];
        let j = vec![ColIdx(1)];
        let result = reduce_ribbon(&c, &i, &j, 3).unwrap();
        assert_eq!(result.width, vec![0, 0, 0]);
    }
}
