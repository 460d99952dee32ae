//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use std::{
    collections::HashMap,
    io::{Cursor, Write},
    path::Path,
    sync::Mutex,
};
use url::Url;
use zip::write::SimpleFileOptions;

use crate::error::{HaircutError, Result};
use crate::fetch::Publisher;

#[derive(Clone)]
enum Remote {
    Complete(Vec<u8>),
    /// Writes the bytes, then fails as if the connection dropped.
    DropsAfter(Vec<u8>),
}

/// In-memory publisher. Unknown URLs answer with a network error.
#[derive(Default)]
pub struct MockPublisher {
    pages: Mutex<HashMap<String, String>>,
    files: Mutex<HashMap<String, Remote>>,
    requests: Mutex<Vec<String>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self, url: &str, html: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), html.to_string());
    }

    pub fn file(&self, url: &str, bytes: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert(url.to_string(), Remote::Complete(bytes));
    }

    pub fn failing_file(&self, url: &str, partial: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert(url.to_string(), Remote::DropsAfter(partial));
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn record(&self, url: &Url) {
        self.requests.lock().unwrap().push(url.to_string());
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn get_text(&self, url: &Url) -> Result<String> {
        self.record(url);
        self.pages
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| HaircutError::network(url, "HTTP status client error (404 Not Found)"))
    }

    async fn download(&self, url: &Url, dest: &Path) -> Result<u64> {
        self.record(url);
        let remote = self.files.lock().unwrap().get(url.as_str()).cloned();
        match remote {
            Some(Remote::Complete(bytes)) => {
                std::fs::write(dest, &bytes).map_err(|e| HaircutError::cache(dest, e))?;
                Ok(bytes.len() as u64)
            }
            Some(Remote::DropsAfter(partial)) => {
                std::fs::write(dest, &partial).map_err(|e| HaircutError::cache(dest, e))?;
                Err(HaircutError::network(url, "mid-transfer: connection reset"))
            }
            None => Err(HaircutError::network(
                url,
                "HTTP status client error (404 Not Found)",
            )),
        }
    }
}

/// Listing page linking to the given detail slugs.
pub fn listing_html(slugs: &[&str]) -> String {
    let links: String = slugs
        .iter()
        .map(|s| format!(r#"<tr><td><a href="/es/sistemas-pago/dcv/{s}">{s}</a></td></tr>"#))
        .collect();
    format!("<html><body><table>{links}</table></body></html>")
}

/// Detail page with one attachment link.
pub fn detail_html(attachment_path: &str) -> String {
    format!(
        r#"<html><body><p>Haircuts</p><a href="{attachment_path}">Descargar</a></body></html>"#
    )
}

/// Build a minimal `.xlsx` workbook whose first sheet holds `rows`.
pub fn xlsx_fixture(rows: &[&[&str]]) -> Vec<u8> {
    let mut strings: Vec<&str> = Vec::new();
    let mut sheet_rows = String::new();
    for (r, row) in rows.iter().enumerate() {
        sheet_rows.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, cell) in row.iter().enumerate() {
            let col = (b'A' + c as u8) as char;
            sheet_rows.push_str(&format!(
                r#"<c r="{col}{}" t="s"><v>{}</v></c>"#,
                r + 1,
                strings.len()
            ));
            strings.push(*cell);
        }
        sheet_rows.push_str("</row>");
    }
    let shared: String = strings.iter().map(|s| format!("<si><t>{s}</t></si>")).collect();

    let files = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#.to_string(),
        ),
        (
            "xl/workbook.xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><workbook><sheets><sheet name="Haircuts" sheetId="1"/></sheets></workbook>"#.to_string(),
        ),
        (
            "xl/sharedStrings.xml",
            format!(r#"<?xml version="1.0" encoding="UTF-8"?><sst count="{0}" uniqueCount="{0}">{shared}</sst>"#, strings.len()),
        ),
        (
            "xl/worksheets/sheet1.xml",
            format!(r#"<?xml version="1.0" encoding="UTF-8"?><worksheet><sheetData>{sheet_rows}</sheetData></worksheet>"#),
        ),
    ];

    zip_fixture(&files)
}

/// Zip archive holding `files` as `(entry name, body)` pairs.
pub fn zip_fixture<S: AsRef<str>>(files: &[(&str, S)]) -> Vec<u8> {
    // fixed timestamp so identical rows give identical bytes
    let options = SimpleFileOptions::default().last_modified_time(zip::DateTime::default());
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(body.as_ref().as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}
