//! Minimal tabular readers for published haircut files.
//!
//! The `.xlsx` reader understands just enough of SpreadsheetML to pull cell
//! text out of the first worksheet (shared strings, inline strings and raw
//! values). It backs both the shell preview and the content check of the
//! `v1.03` convention.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::error::{HaircutError, Result};

// Element patterns accept an optional namespace prefix (`<x:row>`).
static SI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(?:\w+:)?si\b[^>]*>(.*?)</(?:\w+:)?si>").unwrap());
static RPH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(?:\w+:)?rPh\b.*?</(?:\w+:)?rPh>").unwrap());
static T_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(?:\w+:)?t(?:\s[^>]*)?>(.*?)</(?:\w+:)?t>").unwrap());
static ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:\w+:)?row\b([^>]*?)(?:/>|>(.*?)</(?:\w+:)?row>)").unwrap()
});
static CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(?:\w+:)?c\b([^>]*?)(?:/>|>(.*?)</(?:\w+:)?c>)").unwrap());
static REF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\br="([A-Z]+)\d+""#).unwrap());
static TYPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bt="([^"]+)""#).unwrap());
static V_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(?:\w+:)?v(?:\s[^>]*)?>(.*?)</(?:\w+:)?v>").unwrap());
static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#x[0-9A-Fa-f]+|#[0-9]+|lt|gt|quot|apos|amp);").unwrap());
static SHEET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(?:\w+:)?sheet\b([^>]*)>").unwrap());
static SHEET_RID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\b\w+:id="([^"]+)""#).unwrap());
static REL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(?:\w+:)?Relationship\b([^>]*)>").unwrap());
static REL_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bId="([^"]+)""#).unwrap());
static REL_TARGET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bTarget="([^"]+)""#).unwrap());
static WORKSHEET_PART_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^xl/worksheets/([^/]+)\.xml$").unwrap());

/// Last column a SpreadsheetML workbook can address (`XFD`).
const MAX_COLUMNS: usize = 16_384;
pub const DEFAULT_PREVIEW_ROWS: usize = 50;
const MAX_CELL_WIDTH: usize = 28;

/// The first rows of a published file, as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Render as fixed-width text columns.
    pub fn render(&self) -> String {
        let width = self.width();
        let mut col_widths = vec![0usize; width];
        let clipped: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|c| clip(c)).collect())
            .collect();
        for row in &clipped {
            for (i, cell) in row.iter().enumerate() {
                col_widths[i] = col_widths[i].max(cell.chars().count());
            }
        }

        let mut out = String::new();
        for row in &clipped {
            let line: Vec<String> = (0..width)
                .map(|i| {
                    let cell = row.get(i).map(String::as_str).unwrap_or("");
                    format!("{:<w$}", cell, w = col_widths[i])
                })
                .collect();
            out.push_str(line.join(" | ").trim_end());
            out.push('\n');
        }
        out
    }
}

fn clip(cell: &str) -> String {
    let cell = cell.replace(['\n', '\r', '\t'], " ");
    if cell.chars().count() <= MAX_CELL_WIDTH {
        cell
    } else {
        let mut s: String = cell.chars().take(MAX_CELL_WIDTH - 1).collect();
        s.push('…');
        s
    }
}

/// Read up to `max_rows` rows from a file, dispatching on its extension.
pub fn preview(bytes: &[u8], extension: &str, max_rows: usize) -> Result<Table> {
    match extension.to_ascii_lowercase().as_str() {
        "xlsx" => read_xlsx(bytes, max_rows).map_err(HaircutError::Preview),
        "csv" => read_csv(bytes, max_rows).map_err(HaircutError::Preview),
        "xls" => Err(HaircutError::Preview(
            "legacy binary .xls workbooks cannot be previewed; export the file instead".into(),
        )),
        other => Err(HaircutError::Preview(format!(
            "unsupported file type `.{other}`"
        ))),
    }
}

pub(crate) fn read_xlsx(bytes: &[u8], max_rows: usize) -> Result<Table, String> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a zip archive: {e}"))?;

    let workbook = read_entry(&mut archive, "xl/workbook.xml")
        .map_err(|_| "archive has no xl/workbook.xml".to_string())?;
    let first_sheet = first_sheet_part(&mut archive, &workbook)?;

    let shared = match read_entry(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => shared_strings(&xml),
        Err(_) => Vec::new(),
    };
    let sheet_xml = read_entry(&mut archive, &first_sheet)?;

    Ok(Table {
        rows: sheet_rows(&sheet_xml, &shared, max_rows)?,
    })
}

/// Zip entry of the first sheet in workbook order, following its relationship.
/// Workbooks without relationships fall back to the lowest-numbered worksheet part.
fn first_sheet_part(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    workbook: &str,
) -> Result<String, String> {
    let rel_id = SHEET_RE
        .captures(workbook)
        .and_then(|sheet| SHEET_RID_RE.captures(&sheet[1]).map(|c| c[1].to_string()));
    if let Some(rel_id) = rel_id {
        if let Ok(rels) = read_entry(archive, "xl/_rels/workbook.xml.rels") {
            let target = REL_RE.captures_iter(&rels).find_map(|rel| {
                let attrs = &rel[1];
                let id = REL_ID_RE.captures(attrs)?;
                (id[1] == rel_id)
                    .then(|| REL_TARGET_RE.captures(attrs).map(|t| unescape(&t[1])))
                    .flatten()
            });
            if let Some(target) = target {
                let part = match target.strip_prefix('/') {
                    Some(absolute) => absolute.to_string(),
                    None => format!("xl/{target}"),
                };
                if archive.index_for_name(&part).is_some() {
                    return Ok(part);
                }
                return Err(format!("first sheet points at missing part {part}"));
            }
        }
    }

    let mut parts: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let stem = WORKSHEET_PART_RE.captures(name)?;
            let digits: String = stem[1].chars().filter(char::is_ascii_digit).collect();
            Some((digits.parse().unwrap_or(u32::MAX), name.to_string()))
        })
        .collect();
    parts.sort();
    parts
        .into_iter()
        .next()
        .map(|(_, name)| name)
        .ok_or_else(|| "workbook has no worksheets".to_string())
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<String, String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| format!("reading {name}: {e}"))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| format!("reading {name}: {e}"))?;
    Ok(xml)
}

fn shared_strings(xml: &str) -> Vec<String> {
    SI_RE
        .captures_iter(xml)
        .map(|si| {
            // phonetic runs are reading hints, not cell text
            let body = RPH_RE.replace_all(&si[1], "");
            T_RE.captures_iter(&body)
                .map(|t| unescape(&t[1]))
                .collect::<String>()
        })
        .collect()
}

fn sheet_rows(xml: &str, shared: &[String], max_rows: usize) -> Result<Vec<Vec<String>>, String> {
    let mut rows = Vec::new();
    for row in ROW_RE.captures_iter(xml) {
        if rows.len() >= max_rows {
            break;
        }
        let Some(body) = row.get(2) else {
            continue;
        };
        let mut cells: Vec<String> = Vec::new();
        for cell in CELL_RE.captures_iter(body.as_str()) {
            let attrs = &cell[1];
            let col = match REF_RE.captures(attrs) {
                Some(c) => column_index(&c[1])?,
                None => cells.len(),
            };
            if col >= MAX_COLUMNS {
                return Err("cell reference out of range".into());
            }
            let value = cell
                .get(2)
                .map(|inner| cell_text(attrs, inner.as_str(), shared))
                .unwrap_or_default();
            if cells.len() <= col {
                cells.resize(col + 1, String::new());
            }
            cells[col] = value;
        }
        if cells.iter().any(|c| !c.trim().is_empty()) {
            rows.push(cells);
        }
    }
    Ok(rows)
}

fn cell_text(attrs: &str, inner: &str, shared: &[String]) -> String {
    let ty = TYPE_RE.captures(attrs).map(|c| c[1].to_string());
    match ty.as_deref() {
        Some("s") => V_RE
            .captures(inner)
            .and_then(|v| v[1].trim().parse::<usize>().ok())
            .and_then(|idx| shared.get(idx).cloned())
            .unwrap_or_default(),
        Some("inlineStr") => T_RE
            .captures_iter(inner)
            .map(|t| unescape(&t[1]))
            .collect(),
        _ => V_RE
            .captures(inner)
            .map(|v| unescape(&v[1]))
            .unwrap_or_default(),
    }
}

/// `A` → 0, `Z` → 25, `AA` → 26. Anything past `XFD` is rejected.
fn column_index(letters: &str) -> Result<usize, String> {
    let out_of_range = || "cell reference out of range".to_string();
    let mut acc = 0usize;
    for b in letters.bytes() {
        if !b.is_ascii_uppercase() {
            return Err(out_of_range());
        }
        acc = acc
            .checked_mul(26)
            .and_then(|a| a.checked_add((b - b'A' + 1) as usize))
            .filter(|&a| a <= MAX_COLUMNS)
            .ok_or_else(out_of_range)?;
    }
    acc.checked_sub(1).ok_or_else(out_of_range)
}

fn unescape(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |caps: &regex::Captures| {
            let ent = &caps[1];
            let decoded = if let Some(hex) = ent.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = ent.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match ent {
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    _ => Some('&'),
                }
            };
            decoded.map(String::from).unwrap_or_default()
        })
        .into_owned()
}

pub(crate) fn read_csv(bytes: &[u8], max_rows: usize) -> Result<Table, String> {
    // Older publications were Latin-1; fall back byte-for-char when not UTF-8.
    let text = match std::str::from_utf8(bytes) {
        Ok(s) => s.trim_start_matches('\u{feff}').to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    };
    if text.contains('\0') {
        return Err("binary content where text was expected".into());
    }

    let first_line = text.lines().next().unwrap_or("");
    let delimiter = if first_line.matches(';').count() > first_line.matches(',').count() {
        b';'
    } else {
        b','
    };

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(Cursor::new(text.as_bytes()));

    let mut rows = Vec::new();
    for record in rdr.records().take(max_rows) {
        let record = record.map_err(|e| format!("parsing CSV: {e}"))?;
        rows.push(record.iter().map(|f| f.trim().to_string()).collect());
    }
    Ok(Table { rows })
}
