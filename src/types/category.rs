use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::HaircutError;

/// Which haircut table a file belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "haircuts-repos")]
    RepoBr,
    #[serde(rename = "haircuts-deuda-externa")]
    ExternalDebt,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::RepoBr, Category::ExternalDebt];

    /// Human label shown in the shell.
    pub fn label(&self) -> &'static str {
        match self {
            Category::RepoBr => "Repos-BR",
            Category::ExternalDebt => "External-Debt",
        }
    }

    /// Path fragment the publisher uses for this category's detail pages.
    pub fn slug(&self) -> &'static str {
        match self {
            Category::RepoBr => "haircuts-repos",
            Category::ExternalDebt => "haircuts-deuda-externa",
        }
    }

    pub fn from_slug(s: &str) -> Option<Self> {
        Category::ALL.into_iter().find(|c| c.slug() == s)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = HaircutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_lowercase().replace('_', "-");
        let bare = norm.strip_prefix("haircuts-").unwrap_or(&norm);
        match bare {
            "repos-br" | "repos" | "repo-br" => Ok(Category::RepoBr),
            "external-debt" | "deuda-externa" => Ok(Category::ExternalDebt),
            _ => Err(HaircutError::InvalidCategory(s.to_string())),
        }
    }
}
