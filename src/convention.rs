//! Structural conventions the publisher has used for haircut attachments.
//!
//! The publisher changed its file format over time. Each format is a tagged
//! variant; [`Convention::ORDERED`] lists them newest first and validation
//! walks that list, so adding a new format means adding a variant and
//! putting it at the front.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::error::{HaircutError, Result};
use crate::preview;
use crate::types::{file_name_of, Period, RemoteFile, ValidatedFile};

/// Path prefix under which the publisher serves public attachments.
pub const FILES_PATH: &str = "/sites/default/files/";

const OLE2_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Convention {
    /// Spreadsheet `.xlsx` attachments, structure document v1.03.
    #[serde(rename = "v1.03")]
    V1_03,
    /// Pre-v1.03 publications served as `.xls` or `.csv`.
    #[serde(rename = "legacy")]
    Legacy,
}

impl Convention {
    /// Every known convention, most recent first.
    pub const ORDERED: [Convention; 2] = [Convention::V1_03, Convention::Legacy];

    pub fn version(&self) -> &'static str {
        match self {
            Convention::V1_03 => "v1.03",
            Convention::Legacy => "legacy",
        }
    }

    pub fn effective(&self) -> NaiveDate {
        match self {
            Convention::V1_03 => NaiveDate::from_ymd_opt(2024, 1, 9),
            Convention::Legacy => NaiveDate::from_ymd_opt(2019, 1, 1),
        }
        .unwrap_or(NaiveDate::MIN)
    }

    fn extensions(&self) -> &'static [&'static str] {
        match self {
            Convention::V1_03 => &["xlsx"],
            Convention::Legacy => &["xls", "csv"],
        }
    }

    /// Does an attachment path follow this convention's naming rule?
    pub fn matches_path(&self, path: &str) -> bool {
        if !path.contains(FILES_PATH) {
            return false;
        }
        match extension_of(path) {
            Some(ext) => self.extensions().contains(&ext.as_str()),
            None => false,
        }
    }

    /// Structural check of downloaded bytes.
    pub fn check_content(&self, file_name: &str, bytes: &[u8]) -> Result<(), String> {
        if bytes.is_empty() {
            return Err("file is empty".into());
        }
        match (self, extension_of(file_name).as_deref()) {
            (Convention::V1_03, _) => {
                let table = preview::read_xlsx(bytes, 1)?;
                if table.is_empty() {
                    return Err("first worksheet has no rows".into());
                }
                Ok(())
            }
            (Convention::Legacy, Some("xls")) => {
                if bytes.starts_with(&OLE2_SIGNATURE) {
                    Ok(())
                } else {
                    Err("missing OLE2 compound document signature".into())
                }
            }
            (Convention::Legacy, _) => {
                let table = preview::read_csv(bytes, 1)?;
                match table.rows.first() {
                    Some(row) if row.len() >= 2 => Ok(()),
                    Some(_) => Err("header row has fewer than two columns".into()),
                    None => Err("no records".into()),
                }
            }
        }
    }
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (effective {})", self.version(), self.effective())
    }
}

pub(crate) fn extension_of(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Match a remote record against `conventions`, tried in order.
pub fn validate(remote: &RemoteFile, conventions: &[Convention]) -> Result<ValidatedFile> {
    let mismatch = |reason: String| HaircutError::FormatMismatch {
        url: remote.display_url().to_string(),
        reason,
    };

    let file_url = remote
        .file_url
        .as_ref()
        .ok_or_else(|| mismatch("detail page has no downloadable attachment".into()))?;
    let file_name = file_name_of(file_url)
        .ok_or_else(|| mismatch("attachment URL has no file name".into()))?;

    let convention = conventions
        .iter()
        .copied()
        .find(|c| c.matches_path(file_url.path()))
        .ok_or_else(|| {
            let tried: Vec<&str> = conventions.iter().map(|c| c.version()).collect();
            mismatch(format!("`{}` matches none of [{}]", file_name, tried.join(", ")))
        })?;

    let effective = convention.effective();
    if Period::new(effective.year(), effective.month()).is_some_and(|start| remote.period < start) {
        warn!(
            category = %remote.category,
            period = %remote.period,
            convention = convention.version(),
            "record predates the convention it matches"
        );
    }
    debug!(file = file_name, convention = convention.version(), "validated");

    Ok(ValidatedFile {
        category: remote.category,
        period: remote.period,
        file_url: file_url.clone(),
        file_name: file_name.to_string(),
        convention,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{xlsx_fixture, zip_fixture};
    use crate::types::Category;
    use url::Url;

    fn remote(file: Option<&str>) -> RemoteFile {
        RemoteFile {
            category: Category::RepoBr,
            period: "2024-02".parse().unwrap(),
            detail_url: Url::parse(
                "https://www.banrep.gov.co/es/sistemas-pago/dcv/haircuts-repos-febrero-2024",
            )
            .unwrap(),
            file_url: file.map(|f| Url::parse(f).unwrap()),
        }
    }

    #[test]
    fn newest_convention_wins_for_xlsx() {
        let r = remote(Some(
            "https://www.banrep.gov.co/sites/default/files/haircuts-repos-feb-2024.xlsx",
        ));
        let v = validate(&r, &Convention::ORDERED).unwrap();
        assert_eq!(v.convention, Convention::V1_03);
        assert_eq!(v.file_name, "haircuts-repos-feb-2024.xlsx");
    }

    #[test]
    fn legacy_extensions_match_case_insensitively() {
        let r = remote(Some("https://www.banrep.gov.co/sites/default/files/HC_2020.XLS"));
        assert_eq!(
            validate(&r, &Convention::ORDERED).unwrap().convention,
            Convention::Legacy
        );
    }

    #[test]
    fn pdf_is_a_format_mismatch() {
        let r = remote(Some("https://www.banrep.gov.co/sites/default/files/haircuts.pdf"));
        let err = validate(&r, &Convention::ORDERED).unwrap_err();
        assert!(matches!(err, HaircutError::FormatMismatch { .. }), "{err}");
    }

    #[test]
    fn attachment_outside_files_path_is_a_mismatch() {
        let r = remote(Some("https://cdn.example.com/haircuts.xlsx"));
        assert!(matches!(
            validate(&r, &Convention::ORDERED),
            Err(HaircutError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn missing_attachment_is_a_mismatch() {
        assert!(matches!(
            validate(&remote(None), &Convention::ORDERED),
            Err(HaircutError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn restricted_convention_set_is_honoured() {
        let r = remote(Some("https://www.banrep.gov.co/sites/default/files/h.csv"));
        assert!(validate(&r, &[Convention::V1_03]).is_err());
        assert!(validate(&r, &[Convention::Legacy]).is_ok());
    }

    #[test]
    fn content_checks() {
        let xlsx = xlsx_fixture(&[&["Nemotecnico", "Haircut"]]);
        assert!(Convention::V1_03.check_content("a.xlsx", &xlsx).is_ok());
        assert!(Convention::V1_03
            .check_content("a.xlsx", b"<html>error</html>")
            .is_err());

        let mut xls = OLE2_SIGNATURE.to_vec();
        xls.extend_from_slice(&[0; 32]);
        assert!(Convention::Legacy.check_content("a.xls", &xls).is_ok());
        assert!(Convention::Legacy.check_content("a.xls", b"PK\x03\x04").is_err());

        assert!(Convention::Legacy
            .check_content("a.csv", b"Emisor,Haircut\nTES,0.05\n")
            .is_ok());
        assert!(Convention::Legacy.check_content("a.csv", b"just-one").is_err());
        assert!(Convention::Legacy.check_content("a.csv", b"").is_err());
    }

    #[test]
    fn oversized_cell_reference_fails_the_content_check() {
        let bytes = zip_fixture(&[
            ("xl/workbook.xml", "<workbook><sheets><sheet name=\"H\" sheetId=\"1\"/></sheets></workbook>"),
            (
                "xl/worksheets/sheet1.xml",
                r#"<worksheet><sheetData><row r="1"><c r="ZZZZZZZZZZZZZZ1"><v>1</v></c></row></sheetData></worksheet>"#,
            ),
        ]);
        let err = Convention::V1_03.check_content("a.xlsx", &bytes).unwrap_err();
        assert_eq!(err, "cell reference out of range");
    }
}
