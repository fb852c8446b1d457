// Data set reduction - bounding, resampling and gap marking of chart series
//
// Every transform takes a data set by reference and returns a new one; the
// input is never modified. Unless stated otherwise the input is expected to be
// sorted by x (see `sort_entries`).
use crate::application::chart_adapter::XFormatter;
use crate::domain::period::TimeRangeLimits;
use crate::domain::telemetry::{DataSet, Entry, Partition, XKeys};
use chrono::{DateTime, Duration, Utc};

pub const MIN_MIDDLE_VALUE_COUNT: usize = 2;
pub const MIN_PARTITION_COUNT: usize = 3;

/// Sort by x, dropping points with non-finite coordinates.
pub fn sort_entries(data_set: &DataSet) -> DataSet {
    let mut entries: Vec<Entry> = data_set.entries.iter().copied().filter(Entry::is_valid).collect();
    let dropped = data_set.len() - entries.len();
    if dropped > 0 {
        tracing::debug!("Dropped {} malformed points from {}", dropped, data_set.name);
    }
    entries.sort_by(|a, b| a.x.total_cmp(&b.x));
    data_set.with_entries(entries)
}

/// Keep only the entries whose x lies inside `limits` (both ends inclusive).
pub fn filter_by_range(data_set: &DataSet, formatter: &dyn XFormatter, limits: &TimeRangeLimits) -> DataSet {
    let from_x = formatter.from_date(limits.from);
    let to_x = formatter.from_date(limits.to);
    let entries = data_set
        .entries
        .iter()
        .copied()
        .filter(|e| e.x >= from_x && e.x <= to_x)
        .collect();
    data_set.with_entries(entries)
}

/// Bound the data set to `max_count` representative points.
///
/// First and last entries are always kept. The remaining `max_count - 2`
/// points are the entries nearest to the middle of equal index slices of the
/// interior. No averaging happens.
pub fn reduce_middle_values(data_set: &DataSet, max_count: usize) -> DataSet {
    let max_count = max_count.max(MIN_MIDDLE_VALUE_COUNT);
    let len = data_set.len();
    if len <= max_count {
        return data_set.clone();
    }

    let entries = &data_set.entries;
    let interior = len - 2;
    let slices = max_count - 2;
    let mut reduced = Vec::with_capacity(max_count);
    reduced.push(entries[0]);
    for slice in 0..slices {
        let start = slice * interior / slices;
        let end = (slice + 1) * interior / slices;
        reduced.push(entries[1 + (start + end) / 2]);
    }
    reduced.push(entries[len - 1]);

    data_set.with_entries(reduced)
}

/// Resample onto exactly `max_count` points evenly spaced in time across
/// `limits`.
///
/// Each output point averages the input values closer to it than to any other
/// output point, i.e. its partition spans half a step on either side (the two
/// boundary partitions are half width). Partitions with no values yield 0.
/// Input outside `limits` is ignored. The result does not depend on how dense
/// the input is.
pub fn reduce_equals_partition(
    data_set: &DataSet,
    formatter: &dyn XFormatter,
    limits: &TimeRangeLimits,
    max_count: usize,
) -> DataSet {
    let max_count = max_count.max(MIN_PARTITION_COUNT);
    if data_set.is_empty() {
        return data_set.clone();
    }

    let from_x = formatter.from_date(limits.from);
    let to_x = formatter.from_date(limits.to);
    if to_x <= from_x {
        tracing::debug!("Empty time range, skipping partition reduction of {}", data_set.name);
        return data_set.clone();
    }

    let step = (to_x - from_x) / (max_count - 1) as f64;
    let mut partitions: Vec<Partition> = (0..max_count)
        .map(|i| Partition::new(from_x + step * i as f64))
        .collect();
    // Pin the last point to the range end to avoid float drift.
    partitions[max_count - 1].x = to_x;

    for entry in &data_set.entries {
        if entry.x < from_x || entry.x > to_x {
            continue;
        }
        let idx = (((entry.x - from_x) / step).round() as usize).min(max_count - 1);
        partitions[idx].values.push(entry.y);
    }

    let entries = partitions
        .into_iter()
        .filter_map(|p| p.into_entry(Some(0.0)))
        .collect();
    data_set.with_entries(entries)
}

/// Average-partition reduction anchored on the data itself.
///
/// Keeps the first and last entries, splits the time between them into
/// `max_count - 2` equal partitions and emits one averaged point at the middle
/// of each partition that received values. Empty partitions are skipped, so
/// the output has at most `max_count` points.
pub fn reduce_mid_partition(data_set: &DataSet, max_count: usize) -> DataSet {
    let max_count = max_count.max(MIN_PARTITION_COUNT);
    let len = data_set.len();
    if len <= max_count {
        return data_set.clone();
    }

    let first = data_set.entries[0];
    let last = data_set.entries[len - 1];
    let span = last.x - first.x;
    if span <= 0.0 {
        return data_set.clone();
    }

    let count = max_count - 2;
    let width = span / count as f64;
    let mut partitions: Vec<Partition> = (0..count)
        .map(|i| Partition::new(first.x + width * (i as f64 + 0.5)))
        .collect();

    for entry in &data_set.entries[1..len - 1] {
        let idx = (((entry.x - first.x) / width).floor().max(0.0) as usize).min(count - 1);
        partitions[idx].values.push(entry.y);
    }

    let mut entries = Vec::with_capacity(max_count);
    entries.push(first);
    entries.extend(partitions.into_iter().filter_map(|p| p.into_entry(None)));
    entries.push(last);
    data_set.with_entries(entries)
}

/// Time width of one `reduce_mid_partition` partition for this data set.
pub fn mid_partition_width(data_set: &DataSet, formatter: &dyn XFormatter, max_count: usize) -> Option<Duration> {
    let count = max_count.max(MIN_PARTITION_COUNT) - 2;
    let (first, last) = (data_set.first()?, data_set.last()?);
    let start = formatter.to_date(first.x);
    let end = formatter.to_date(last.x);
    let width = (end - start) / count as i32;
    (width > Duration::zero()).then_some(width)
}

/// Upsample to `min_count` evenly spaced points by linear interpolation
/// between the bracketing original entries.
///
/// Only date keyed data sets are interpolated; others are returned unchanged.
pub fn interpolate(data_set: &DataSet, min_count: usize) -> DataSet {
    if data_set.keys != XKeys::Date {
        tracing::warn!("Not interpolating {}: x values are not dates", data_set.name);
        return data_set.clone();
    }
    let min_count = min_count.max(2);
    let len = data_set.len();
    if len < 2 || len >= min_count {
        return data_set.clone();
    }

    let entries = &data_set.entries;
    let first = entries[0];
    let last = entries[len - 1];
    let step = (last.x - first.x) / (min_count - 1) as f64;

    let mut upper = 1;
    let mut interpolated = Vec::with_capacity(min_count);
    for i in 0..min_count {
        let x = if i == min_count - 1 { last.x } else { first.x + step * i as f64 };
        while upper < len - 1 && entries[upper].x < x {
            upper += 1;
        }
        let a = entries[upper - 1];
        let b = entries[upper];
        let y = if b.x > a.x {
            a.y + (b.y - a.y) * (x - a.x) / (b.x - a.x)
        } else {
            b.y
        };
        interpolated.push(Entry::new(x, y));
    }

    data_set.with_entries(interpolated)
}

pub fn scale(data_set: &DataSet, factor: f64) -> DataSet {
    let entries = data_set
        .entries
        .iter()
        .map(|e| Entry::new(e.x, e.y * factor))
        .collect();
    data_set.with_entries(entries)
}

/// Break the line wherever no data arrived for longer than `max_empty_range`.
///
/// A zero entry is inserted `delta` after the entry before a gap and `delta`
/// before the entry after it. Gaps to the window boundaries get a zero at the
/// boundary as well. An empty data set becomes a zero at each boundary.
pub fn zero_fill_gaps(
    data_set: &DataSet,
    formatter: &dyn XFormatter,
    limits: &TimeRangeLimits,
    max_empty_range: Duration,
    delta: Duration,
) -> DataSet {
    let zero_at = |date: DateTime<Utc>| Entry::new(formatter.from_date(date), 0.0);

    if data_set.is_empty() {
        return data_set.with_entries(vec![zero_at(limits.from), zero_at(limits.to)]);
    }

    let gap_delta = |gap: Duration| match delta.checked_mul(2) {
        Some(both_sides) if both_sides < gap => delta,
        _ => gap / 2,
    };
    let mut filled = Vec::with_capacity(data_set.len() + 4);

    let first = data_set.entries[0];
    let first_time = formatter.to_date(first.x);
    let leading = first_time - limits.from;
    if leading > max_empty_range {
        filled.push(zero_at(limits.from));
        filled.push(zero_at(first_time - gap_delta(leading)));
    }
    filled.push(first);

    let mut previous = (first, first_time);
    for &entry in &data_set.entries[1..] {
        let time = formatter.to_date(entry.x);
        let gap = time - previous.1;
        if gap > max_empty_range {
            let d = gap_delta(gap);
            filled.push(zero_at(previous.1 + d));
            filled.push(zero_at(time - d));
        }
        filled.push(entry);
        previous = (entry, time);
    }

    let trailing = limits.to - previous.1;
    if trailing > max_empty_range {
        filled.push(zero_at(previous.1 + gap_delta(trailing)));
        filled.push(zero_at(limits.to));
    }

    data_set.with_entries(filled)
}

/// Zero valued stand-in for a data set that never arrived.
pub fn zero_placeholder(
    name: &str,
    label: &str,
    formatter: &dyn XFormatter,
    limits: &TimeRangeLimits,
) -> DataSet {
    let entries = vec![
        Entry::new(formatter.from_date(limits.from), 0.0),
        Entry::new(formatter.from_date(limits.to), 0.0),
    ];
    DataSet::new(name, label, XKeys::Date, entries)
}
