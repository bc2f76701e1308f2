//! Interval normalization for seed rows
//!
//! Rows sharing a key form a timeline of `[effective_date, end_date]`
//! slices (both ends inclusive). A row without an end date is closed by
//! the next slice's effective date minus one day, or the open-end
//! sentinel when it is the last slice. Overlaps and inverted windows are
//! rejected with the offending line number. Running the pass twice over
//! already-normalized rows changes nothing.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use org_common::error::{Error, Result};
use org_common::time::{day_before, OPEN_END};

/// A row the normalizer can operate on.
pub trait SliceRow {
    fn line(&self) -> u64;
    fn effective_date(&self) -> NaiveDate;
    fn end_date(&self) -> NaiveDate;
    fn end_date_provided(&self) -> bool;
    fn set_end_date(&mut self, end: NaiveDate);
}

/// Normalize every per-key timeline in `rows`. `key_fn` yields the
/// grouping key; `what` names the key kind in error messages
/// (e.g. "code", "pernr").
pub fn normalize_slices<R, F>(rows: &mut [R], key_fn: F, what: &str) -> Result<()>
where
    R: SliceRow,
    F: Fn(&R) -> String,
{
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        groups.entry(key_fn(row)).or_default().push(i);
    }

    for (key, mut idxs) in groups {
        idxs.sort_by_key(|&i| rows[i].effective_date());

        for j in 0..idxs.len() {
            let i = idxs[j];
            if !rows[i].end_date_provided() {
                let end = match idxs.get(j + 1) {
                    Some(&next) => day_before(rows[next].effective_date()),
                    None => OPEN_END,
                };
                rows[i].set_end_date(end);
            }
            if rows[i].effective_date() > rows[i].end_date() {
                return Err(Error::at_line(
                    rows[i].line(),
                    "effective_date must be <= end_date",
                ));
            }
            if let Some(&next) = idxs.get(j + 1) {
                if rows[i].end_date() >= rows[next].effective_date() {
                    return Err(Error::at_line(
                        rows[i].line(),
                        format!("overlapping time windows for {what}={key}"),
                    ));
                }
            }
        }
    }
    Ok(())
}
