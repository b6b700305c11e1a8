// Display reordering for sortable histograms and heatmaps.
//
// Bins always keep their natural (value-order) index; sorting only changes
// the display position, recorded as a reversible permutation.

use crate::error::{EngineError, Result};
use crate::index::{Group, Key, Reducer, Tally};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::str::FromStr;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortCriterion {
    /// Ascending bin key
    #[default]
    Natural,
    /// Ascending count, ties by bin key
    Asc,
    /// Descending count, ties by bin key
    Desc,
}

impl FromStr for SortCriterion {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "natural" => Ok(SortCriterion::Natural),
            "asc" => Ok(SortCriterion::Asc),
            "desc" => Ok(SortCriterion::Desc),
            other => Err(EngineError::invalid(format!(
                "unsupported sort criterion '{}' (expected natural, asc or desc)",
                other
            ))),
        }
    }
}

/// A bijection between natural indices and display positions
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Permutation {
    natural_to_sort: Vec<usize>,
    sort_to_natural: Vec<usize>,
}

impl Permutation {
    pub fn identity(n: usize) -> Self {
        Self { natural_to_sort: (0..n).collect(), sort_to_natural: (0..n).collect() }
    }

    /// Build from the natural indices listed in display order
    pub fn from_display_order(order: Vec<usize>) -> Result<Self> {
        let mut natural_to_sort = vec![usize::MAX; order.len()];
        for (display, &natural) in order.iter().enumerate() {
            match natural_to_sort.get_mut(natural) {
                Some(slot) if *slot == usize::MAX => *slot = display,
                _ => {
                    return Err(EngineError::invalid(format!(
                        "display order is not a permutation (index {})",
                        natural
                    )))
                }
            }
        }
        Ok(Self { natural_to_sort, sort_to_natural: order })
    }

    pub fn len(&self) -> usize {
        self.natural_to_sort.len()
    }

    pub fn is_empty(&self) -> bool {
        self.natural_to_sort.is_empty()
    }

    /// Display position of a natural index
    pub fn apply(&self, natural: usize) -> Option<usize> {
        self.natural_to_sort.get(natural).copied()
    }

    /// Natural index shown at a display position
    pub fn invert(&self, display: usize) -> Option<usize> {
        self.sort_to_natural.get(display).copied()
    }

    pub fn inverse(&self) -> Permutation {
        Permutation {
            natural_to_sort: self.sort_to_natural.clone(),
            sort_to_natural: self.natural_to_sort.clone(),
        }
    }

    pub fn natural_to_sort(&self) -> &[usize] {
        &self.natural_to_sort
    }

    pub fn sort_to_natural(&self) -> &[usize] {
        &self.sort_to_natural
    }
}

/// Sort state of one axis
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SortSettings {
    pub criterion: SortCriterion,
    pub permutation: Permutation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortedBin<A> {
    /// Position in value order; renderers address bins by this index
    pub natural: usize,
    pub display: usize,
    /// Original bin key
    pub key: i64,
    pub value: A,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortedCell<A> {
    pub natural: (usize, usize),
    pub display: (usize, usize),
    pub key: (i64, i64),
    pub value: A,
}

fn order_by(counts: &[usize], criterion: SortCriterion) -> Vec<usize> {
    let mut order: Vec<usize> = (0..counts.len()).collect();
    match criterion {
        SortCriterion::Natural => {}
        SortCriterion::Asc => order.sort_by(|&a, &b| counts[a].cmp(&counts[b]).then(a.cmp(&b))),
        SortCriterion::Desc => order.sort_by(|&a, &b| counts[b].cmp(&counts[a]).then(a.cmp(&b))),
    }
    order
}

/// Most bins a single sort will materialize
pub const MAX_SORTED_BINS: usize = 1 << 20;

fn range_len(range: &Range<i64>) -> Result<usize> {
    if range.end <= range.start {
        return Ok(0);
    }
    let span = range
        .end
        .checked_sub(range.start)
        .and_then(|n| usize::try_from(n).ok())
        .filter(|&n| n <= MAX_SORTED_BINS)
        .ok_or_else(|| {
            EngineError::invalid(format!(
                "bin interval {}..{} spans more than {} bins",
                range.start, range.end, MAX_SORTED_BINS
            ))
        })?;
    Ok(span)
}

/// Reorder a histogram group for display.
///
/// Every integer bin in `interval` is materialized (gaps get a fresh
/// accumulator), sorted by `criterion`, and the resulting bijection is
/// stored in `settings`. Bins come back in display order.
pub fn sort_histogram_group<R: Reducer>(
    group: &Group<R>,
    settings: &mut SortSettings,
    criterion: SortCriterion,
    interval: Range<i64>,
) -> Result<Vec<SortedBin<R::Acc>>> {
    let n = range_len(&interval)?;
    let values: Vec<R::Acc> = interval
        .clone()
        .map(|k| group.get(&Key::num(k as f64)).cloned().unwrap_or_else(|| group.reducer().initial()))
        .collect();
    let counts: Vec<usize> = values.iter().map(Tally::count).collect();

    let permutation = Permutation::from_display_order(order_by(&counts, criterion))?;
    trace!(bins = n, ?criterion, "histogram sorted");

    let bins = (0..n)
        .filter_map(|display| {
            let natural = permutation.invert(display)?;
            Some(SortedBin {
                natural,
                display,
                key: interval.start + natural as i64,
                value: values[natural].clone(),
            })
        })
        .collect();

    settings.criterion = criterion;
    settings.permutation = permutation;
    Ok(bins)
}

/// Parse the criterion first so an unsupported string fails before any work
pub fn sort_histogram_group_str<R: Reducer>(
    group: &Group<R>,
    settings: &mut SortSettings,
    criterion: &str,
    interval: Range<i64>,
) -> Result<Vec<SortedBin<R::Acc>>> {
    let criterion = criterion.parse::<SortCriterion>()?;
    sort_histogram_group(group, settings, criterion, interval)
}

/// Reorder a heatmap group keyed by `[x, y]` pairs. Each axis is sorted
/// independently by its marginal counts; cells come back ordered by display
/// position (x first).
pub fn sort_heatmap_group<R: Reducer>(
    group: &Group<R>,
    settings: (&mut SortSettings, &mut SortSettings),
    criteria: (SortCriterion, SortCriterion),
    intervals: (Range<i64>, Range<i64>),
) -> Result<Vec<SortedCell<R::Acc>>> {
    let (x_range, y_range) = intervals;
    let (nx, ny) = (range_len(&x_range)?, range_len(&y_range)?);
    if nx.saturating_mul(ny) > MAX_SORTED_BINS {
        return Err(EngineError::invalid(format!(
            "heatmap of {} x {} cells exceeds {} cells",
            nx, ny, MAX_SORTED_BINS
        )));
    }

    let mut x_totals = vec![0usize; nx];
    let mut y_totals = vec![0usize; ny];
    let mut cells: BTreeMap<(usize, usize), R::Acc> = BTreeMap::new();
    for (key, acc) in group.all() {
        let Some((x, y)) = key.as_pair() else { continue };
        let (x, y) = (x.floor() as i64, y.floor() as i64);
        if !x_range.contains(&x) || !y_range.contains(&y) {
            continue;
        }
        let (xi, yi) = ((x - x_range.start) as usize, (y - y_range.start) as usize);
        x_totals[xi] += acc.count();
        y_totals[yi] += acc.count();
        cells.insert((xi, yi), acc);
    }

    let px = Permutation::from_display_order(order_by(&x_totals, criteria.0))?;
    let py = Permutation::from_display_order(order_by(&y_totals, criteria.1))?;

    let mut out = Vec::with_capacity(nx * ny);
    for dx in 0..nx {
        for dy in 0..ny {
            let (Some(xi), Some(yi)) = (px.invert(dx), py.invert(dy)) else { continue };
            let value = cells.remove(&(xi, yi)).unwrap_or_else(|| group.reducer().initial());
            out.push(SortedCell {
                natural: (xi, yi),
                display: (dx, dy),
                key: (x_range.start + xi as i64, y_range.start + yi as i64),
                value,
            });
        }
    }

    let (xs, ys) = settings;
    xs.criterion = criteria.0;
    xs.permutation = px;
    ys.criterion = criteria.1;
    ys.permutation = py;
    Ok(out)
}
