//! Hierarchy validation over normalized node rows
//!
//! The tree has exactly one root (empty parent_code). Every non-root slice
//! must name a known parent whose own slices cover the child's effective
//! date, and the parent chain at any probed instant must be acyclic.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use org_common::error::{Error, Result};
use org_common::time::covers;

use crate::ingest::NodeRow;

/// Finds the single root code and checks root slice consistency.
pub fn validate_roots(rows: &[NodeRow]) -> Result<String> {
    let mut root_code: Option<&str> = None;
    for row in rows {
        if row.parent_code_trimmed().is_none() {
            match root_code {
                None => root_code = Some(&row.code),
                Some(existing) if existing == row.code => {}
                Some(existing) => {
                    return Err(Error::validation(format!(
                        "multiple root nodes found: {existing} and {}",
                        row.code
                    )));
                }
            }
        }
    }
    let root = match root_code {
        Some(c) => c.to_string(),
        None => return Err(Error::validation("no root node found (empty parent_code)")),
    };

    // All slices of the root must stay parentless.
    for row in rows {
        if row.code == root && row.parent_code_trimmed().is_some() {
            return Err(Error::at_line(
                row.line,
                format!("root node {root} must not have a parent_code"),
            ));
        }
    }
    Ok(root)
}

/// Every non-root slice must reference a known node whose slices cover the
/// child slice's effective date.
pub fn validate_parent_references(rows: &[NodeRow], root: &str) -> Result<()> {
    let mut by_code: HashMap<&str, Vec<&NodeRow>> = HashMap::new();
    for row in rows {
        by_code.entry(&row.code).or_default().push(row);
    }

    for row in rows {
        if row.code == root {
            continue;
        }
        let parent = match row.parent_code_trimmed() {
            Some(p) => p,
            None => {
                return Err(Error::at_line(
                    row.line,
                    format!("node {} must have a parent_code (only {root} is root)", row.code),
                ));
            }
        };
        let parent_slices = by_code.get(parent).ok_or_else(|| {
            Error::at_line(row.line, format!("unknown parent_code: {parent}"))
        })?;
        let covered = parent_slices
            .iter()
            .any(|p| covers(p.effective_date, p.end_date, row.effective_date));
        if !covered {
            return Err(Error::at_line(
                row.line,
                format!(
                    "parent {parent} has no slice covering {} for node {}",
                    row.effective_date, row.code
                ),
            ));
        }
    }
    Ok(())
}

/// Checks the parent chain for cycles at a set of probe instants.
///
/// Default mode probes the earliest effective date only; strict mode probes
/// every distinct effective date in the input.
pub fn validate_cycles(rows: &[NodeRow], strict: bool) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut probes: BTreeSet<NaiveDate> = BTreeSet::new();
    if strict {
        probes.extend(rows.iter().map(|r| r.effective_date));
    } else {
        let earliest = rows
            .iter()
            .map(|r| r.effective_date)
            .min()
            .ok_or_else(|| Error::validation("no data rows found"))?;
        probes.insert(earliest);
    }

    for at in probes {
        check_cycle_at(rows, at)?;
    }
    Ok(())
}

fn parent_at(rows: &[NodeRow], code: &str, at: NaiveDate) -> Option<String> {
    rows.iter()
        .find(|r| r.code == code && covers(r.effective_date, r.end_date, at))
        .and_then(|r| r.parent_code_trimmed().map(str::to_string))
}

fn check_cycle_at(rows: &[NodeRow], at: NaiveDate) -> Result<()> {
    // 0 unvisited, 1 on the current path, 2 done.
    let mut color: HashMap<String, u8> = HashMap::new();
    let codes: BTreeSet<&str> = rows.iter().map(|r| r.code.as_str()).collect();

    for start in codes {
        if color.get(start).copied().unwrap_or(0) != 0 {
            continue;
        }
        let mut path: Vec<String> = Vec::new();
        let mut current = start.to_string();
        loop {
            match color.get(&current).copied().unwrap_or(0) {
                1 => {
                    return Err(Error::validation(format!(
                        "cycle detected at {current} (as-of {at})"
                    )));
                }
                2 => break,
                _ => {}
            }
            color.insert(current.clone(), 1);
            path.push(current.clone());
            match parent_at(rows, &current, at) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        for visited in path {
            color.insert(visited, 2);
        }
    }
    Ok(())
}
