//! Paginated emission over one or two traversal results.
//!
//! Every operation streams the entries of its window through an [`Emitter`]
//! and reports how many matches exist in total. AND, NOT and FQV stop scanning
//! as soon as the window is full; the total is then extrapolated from the
//! fraction of the input scanned so far.

use crate::error::Result;
use crate::query::emit::Emitter;
use crate::query::request::Window;
use crate::query::tags::TagIndex;
use crate::traversal::ResultList;
use crate::types::ResultEntry;

/// Match count reported in the `OUTOF` line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Total {
    /// The scan completed.
    Exact(u64),
    /// The scan stopped at the end of the window.
    Estimated(u64),
}

impl Total {
    /// Number reported to clients.
    pub fn value(self) -> u64 {
        match self {
            Total::Exact(n) | Total::Estimated(n) => n,
        }
    }

    /// True for extrapolated totals.
    pub fn is_estimate(self) -> bool {
        matches!(self, Total::Estimated(_))
    }
}

/// Result of one emission pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Outcome {
    /// Entries sent.
    pub emitted: u64,
    /// Exact or estimated match count.
    pub total: Total,
}

/// Emits the window of `list` in discovery order; the total is always exact.
pub fn list(
    list: &ResultList,
    window: Window,
    tags: &TagIndex,
    out: &mut Emitter<'_>,
) -> Result<Outcome> {
    let entries = list.entries();
    let start = window.offset.min(entries.len());
    let end = window.end().min(entries.len());
    for &entry in &entries[start..end] {
        out.push(entry, tags.tag(entry.id()))?;
    }
    out.flush()?;
    Ok(Outcome {
        emitted: (end - start) as u64,
        total: Total::Exact(entries.len() as u64),
    })
}

/// Emits entries of `first` also present in `second`, with depth summed over
/// both sides.
pub fn intersect(
    first: &ResultList,
    second: &ResultList,
    window: Window,
    tags: &TagIndex,
    out: &mut Emitter<'_>,
) -> Result<Outcome> {
    filter_scan(first, window, out, |entry| match second.mask(entry.id()) {
        0 => None,
        m => Some((entry.deepen(u32::from(m) - 1), tags.tag(entry.id()))),
    })
}

/// Emits entries of `first` absent from `second`.
pub fn difference(
    first: &ResultList,
    second: &ResultList,
    window: Window,
    tags: &TagIndex,
    out: &mut Emitter<'_>,
) -> Result<Outcome> {
    filter_scan(first, window, out, |entry| {
        (!second.contains(entry.id())).then(|| (entry, tags.tag(entry.id())))
    })
}

/// Emits tagged entries of `list`, all of tag 1 first, then tag 2, and so
/// on up to the highest tag in `tags`.
pub fn fqv(
    list: &ResultList,
    window: Window,
    tags: &TagIndex,
    out: &mut Emitter<'_>,
) -> Result<Outcome> {
    let entries = list.entries();
    let buckets = tags.buckets();
    let end = window.end();
    let mut matched = 0usize;
    let mut emitted = 0u64;
    let mut stopped_after = None;

    'buckets: for bucket in 1..=buckets {
        for (i, &entry) in entries.iter().enumerate() {
            let id = entry.id();
            if tags.tag(id) != bucket {
                continue;
            }
            matched += 1;
            if matched <= window.offset {
                continue;
            }
            let depth_in_tag = u32::from(tags.mask(id).max(1)) - 1;
            out.push(entry.deepen(depth_in_tag), bucket)?;
            emitted += 1;
            if matched >= end {
                stopped_after = Some(usize::from(bucket - 1) * entries.len() + i + 1);
                break 'buckets;
            }
        }
    }
    out.flush()?;

    let scan_len = usize::from(buckets) * entries.len();
    Ok(Outcome {
        emitted,
        total: total(matched, window, stopped_after, scan_len),
    })
}

fn filter_scan(
    first: &ResultList,
    window: Window,
    out: &mut Emitter<'_>,
    mut keep: impl FnMut(ResultEntry) -> Option<(ResultEntry, u8)>,
) -> Result<Outcome> {
    let entries = first.entries();
    let end = window.end();
    let mut matched = 0usize;
    let mut emitted = 0u64;
    let mut stopped_after = None;

    for (i, &entry) in entries.iter().enumerate() {
        let Some((entry, tag)) = keep(entry) else {
            continue;
        };
        matched += 1;
        if matched <= window.offset {
            continue;
        }
        out.push(entry, tag)?;
        emitted += 1;
        if matched >= end {
            stopped_after = Some(i + 1);
            break;
        }
    }
    out.flush()?;
    Ok(Outcome {
        emitted,
        total: total(matched, window, stopped_after, entries.len()),
    })
}

/// Exact `matched - offset` when the whole input was scanned, otherwise
/// `end * scan_len / scanned`.
fn total(matched: usize, window: Window, stopped_after: Option<usize>, scan_len: usize) -> Total {
    match stopped_after {
        Some(scanned) if scanned < scan_len => {
            let estimate = window.end() as u128 * scan_len as u128 / scanned as u128;
            Total::Estimated(u64::try_from(estimate).unwrap_or(u64::MAX))
        }
        _ => Total::Exact(matched.saturating_sub(window.offset) as u64),
    }
}
