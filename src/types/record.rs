use url::Url;

use super::{Category, Period};
use crate::convention::Convention;

/// A listing entry with its detail page resolved. Not yet validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFile {
    pub category: Category,
    pub period: Period,
    pub detail_url: Url,
    /// Attachment found on the detail page, if any.
    pub file_url: Option<Url>,
}

impl RemoteFile {
    /// URL used when reporting problems with this record.
    pub fn display_url(&self) -> &Url {
        self.file_url.as_ref().unwrap_or(&self.detail_url)
    }
}

/// A remote file whose attachment matched a known convention.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedFile {
    pub category: Category,
    pub period: Period,
    pub file_url: Url,
    pub file_name: String,
    pub convention: Convention,
}

pub(crate) fn file_name_of(url: &Url) -> Option<&str> {
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
}

/// Name offered to the user when exporting, e.g. `haircuts-repos-febrero-2024.xlsx`.
pub fn suggested_name(category: Category, period: Period, extension: &str) -> String {
    format!(
        "{}-{}-{}.{}",
        category.slug(),
        period.spanish_month(),
        period.year(),
        extension
    )
}
