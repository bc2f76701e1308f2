//! CSV readers for seed import input
//!
//! Each file has a strict header contract: every required column must be
//! present and no column outside the allowed set is accepted. A UTF-8 BOM
//! on the first line is tolerated. All row errors carry the 1-based line
//! number (header is line 1).

use std::path::Path;

use chrono::NaiveDate;
use org_common::error::{Error, Result};
use org_common::time::{parse_when, OPEN_END};
use serde_json::Value;
use uuid::Uuid;

use crate::normalize::SliceRow;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone)]
pub struct NodeRow {
    pub line: u64,
    pub code: String,
    pub node_type: String,
    pub name: String,
    pub i18n_names: Option<Value>,
    pub status: String,
    pub legal_entity_id: Option<Uuid>,
    pub company_code: Option<String>,
    pub location_id: Option<Uuid>,
    pub display_order: i64,
    pub parent_code: Option<String>,
    pub manager_user_id: Option<i64>,
    pub manager_email: Option<String>,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
    pub end_date_provided: bool,
}

impl NodeRow {
    pub fn parent_code_trimmed(&self) -> Option<&str> {
        match self.parent_code.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(p) => Some(p),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PositionRow {
    pub line: u64,
    pub code: String,
    pub org_node_code: String,
    pub title: Option<String>,
    pub status: String,
    pub is_auto_created: bool,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
    pub end_date_provided: bool,
}

#[derive(Debug, Clone)]
pub struct AssignmentRow {
    pub line: u64,
    pub position_code: String,
    pub assignment_type: String,
    pub pernr: String,
    pub subject_id: Option<Uuid>,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
    pub end_date_provided: bool,
}

macro_rules! impl_slice_row {
    ($ty:ty) => {
        impl SliceRow for $ty {
            fn line(&self) -> u64 {
                self.line
            }
            fn effective_date(&self) -> NaiveDate {
                self.effective_date
            }
            fn end_date(&self) -> NaiveDate {
                self.end_date
            }
            fn end_date_provided(&self) -> bool {
                self.end_date_provided
            }
            fn set_end_date(&mut self, end: NaiveDate) {
                self.end_date = end;
                self.end_date_provided = true;
            }
        }
    };
}

impl_slice_row!(NodeRow);
impl_slice_row!(PositionRow);
impl_slice_row!(AssignmentRow);

struct CsvTable {
    header: Vec<String>,
    records: Vec<(u64, csv::StringRecord)>,
}

impl CsvTable {
    fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut rows = rdr.records();
        let header = match rows.next() {
            Some(rec) => rec.map_err(|e| Error::validation(format!("{e}")))?,
            None => return Err(Error::validation("missing header")),
        };
        let header: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();

        let mut records = Vec::new();
        let mut line: u64 = 1;
        for rec in rows {
            line += 1;
            let rec = rec.map_err(|e| Error::at_line(line, format!("{e}")))?;
            if rec.is_empty() {
                continue;
            }
            records.push((line, rec));
        }
        Ok(Self { header, records })
    }

    fn require_header(&self, required: &[&str], allowed: &[&str]) -> Result<()> {
        for req in required {
            if !self.header.iter().any(|h| h == req) {
                return Err(Error::validation(format!(
                    "missing required header column: {req}"
                )));
            }
        }
        for h in &self.header {
            if !allowed.contains(&h.as_str()) {
                return Err(Error::validation(format!("unexpected header column: {h}")));
            }
        }
        Ok(())
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }
}

struct Record<'a> {
    table: &'a CsvTable,
    line: u64,
    rec: &'a csv::StringRecord,
}

impl Record<'_> {
    fn get(&self, name: &str) -> &str {
        self.table
            .index_of(name)
            .and_then(|i| self.rec.get(i))
            .unwrap_or("")
            .trim()
    }

    fn required(&self, name: &str) -> Result<String> {
        let v = self.get(name);
        if v.is_empty() {
            return Err(Error::at_line(self.line, format!("{name} is required")));
        }
        Ok(v.to_string())
    }

    fn optional(&self, name: &str) -> Option<String> {
        let v = self.get(name);
        (!v.is_empty()).then(|| v.to_string())
    }

    fn optional_uuid(&self, name: &str) -> Result<Option<Uuid>> {
        match self.optional(name) {
            None => Ok(None),
            Some(v) => Uuid::parse_str(&v)
                .map(Some)
                .map_err(|e| Error::at_line(self.line, format!("{name}: {e}"))),
        }
    }

    fn optional_i64(&self, name: &str) -> Result<Option<i64>> {
        match self.optional(name) {
            None => Ok(None),
            Some(v) => v
                .parse::<i64>()
                .map(Some)
                .map_err(|e| Error::at_line(self.line, format!("{name}: {e}"))),
        }
    }

    fn optional_bool(&self, name: &str) -> Result<Option<bool>> {
        match self.optional(name) {
            None => Ok(None),
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "1" | "t" | "true" => Ok(Some(true)),
                "0" | "f" | "false" => Ok(Some(false)),
                other => Err(Error::at_line(
                    self.line,
                    format!("{name}: invalid boolean: {other}"),
                )),
            },
        }
    }

    fn date(&self, name: &str) -> Result<NaiveDate> {
        parse_when(self.get(name)).map_err(|e| Error::at_line(self.line, format!("{name}: {e}")))
    }

    /// Missing end dates are left for the normalizer.
    fn optional_end_date(&self) -> Result<(NaiveDate, bool)> {
        match self.optional("end_date") {
            None => Ok((OPEN_END, false)),
            Some(v) => {
                let end = parse_when(&v)
                    .map_err(|e| Error::at_line(self.line, format!("end_date: {e}")))?;
                Ok((end, true))
            }
        }
    }

    fn optional_json_object(&self, name: &str) -> Result<Option<Value>> {
        match self.optional(name) {
            None => Ok(None),
            Some(v) => {
                let parsed: Value = serde_json::from_str(&v)
                    .map_err(|e| Error::at_line(self.line, format!("{name}: {e}")))?;
                if !parsed.is_object() {
                    return Err(Error::at_line(
                        self.line,
                        format!("{name}: must be a JSON object"),
                    ));
                }
                Ok(Some(parsed))
            }
        }
    }
}

pub fn parse_nodes_csv(path: &Path) -> Result<Vec<NodeRow>> {
    let table = CsvTable::open(path)?;
    table.require_header(
        &["code", "name", "effective_date"],
        &[
            "code",
            "type",
            "name",
            "i18n_names",
            "status",
            "legal_entity_id",
            "company_code",
            "location_id",
            "display_order",
            "parent_code",
            "manager_user_id",
            "manager_email",
            "effective_date",
            "end_date",
        ],
    )?;

    let mut rows = Vec::with_capacity(table.records.len());
    for (line, rec) in &table.records {
        let r = Record {
            table: &table,
            line: *line,
            rec,
        };

        let node_type = r.optional("type").unwrap_or_else(|| "OrgUnit".to_string());
        let status = r.optional("status").unwrap_or_else(|| "active".to_string());
        let (end_date, end_date_provided) = r.optional_end_date()?;

        rows.push(NodeRow {
            line: *line,
            code: r.required("code")?,
            node_type,
            name: r.required("name")?,
            i18n_names: r.optional_json_object("i18n_names")?,
            status,
            legal_entity_id: r.optional_uuid("legal_entity_id")?,
            company_code: r.optional("company_code"),
            location_id: r.optional_uuid("location_id")?,
            display_order: r.optional_i64("display_order")?.unwrap_or(0),
            parent_code: r.optional("parent_code"),
            manager_user_id: r.optional_i64("manager_user_id")?,
            manager_email: r.optional("manager_email"),
            effective_date: r.date("effective_date")?,
            end_date,
            end_date_provided,
        });
    }

    if rows.is_empty() {
        return Err(Error::validation("no data rows found"));
    }
    Ok(rows)
}

pub fn parse_positions_csv_if_exists(path: &Path) -> Result<Vec<PositionRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let table = CsvTable::open(path)?;
    table.require_header(
        &["code", "org_node_code", "effective_date"],
        &[
            "code",
            "org_node_code",
            "title",
            "status",
            "is_auto_created",
            "effective_date",
            "end_date",
        ],
    )?;

    let mut rows = Vec::with_capacity(table.records.len());
    for (line, rec) in &table.records {
        let r = Record {
            table: &table,
            line: *line,
            rec,
        };
        let status = r.optional("status").unwrap_or_else(|| "active".to_string());
        let (end_date, end_date_provided) = r.optional_end_date()?;

        rows.push(PositionRow {
            line: *line,
            code: r.required("code")?,
            org_node_code: r.required("org_node_code")?,
            title: r.optional("title"),
            status,
            is_auto_created: r.optional_bool("is_auto_created")?.unwrap_or(false),
            effective_date: r.date("effective_date")?,
            end_date,
            end_date_provided,
        });
    }
    Ok(rows)
}

pub fn parse_assignments_csv_if_exists(path: &Path) -> Result<Vec<AssignmentRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let table = CsvTable::open(path)?;
    table.require_header(
        &["position_code", "pernr", "effective_date"],
        &[
            "position_code",
            "assignment_type",
            "pernr",
            "subject_id",
            "effective_date",
            "end_date",
        ],
    )?;

    let mut rows = Vec::with_capacity(table.records.len());
    for (line, rec) in &table.records {
        let r = Record {
            table: &table,
            line: *line,
            rec,
        };
        let assignment_type = r
            .optional("assignment_type")
            .unwrap_or_else(|| "primary".to_string());
        let (end_date, end_date_provided) = r.optional_end_date()?;

        rows.push(AssignmentRow {
            line: *line,
            position_code: r.required("position_code")?,
            assignment_type,
            pernr: r.required("pernr")?,
            subject_id: r.optional_uuid("subject_id")?,
            effective_date: r.date("effective_date")?,
            end_date,
            end_date_provided,
        });
    }
    Ok(rows)
}
