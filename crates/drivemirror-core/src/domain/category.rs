//! File categories and the per-account folder taxonomy
//!
//! Every account mirrors the same layout: one root folder directly under
//! "My Drive", and one subfolder per category beneath that root.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{errors::DomainError, newtypes::RemoteId};

/// Closed set of file categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Hotel,
    PcRoom,
    Manual,
    Diskless,
    Other,
}

impl Category {
    /// All categories, in folder creation order
    pub const ALL: [Category; 5] = [
        Category::Hotel,
        Category::PcRoom,
        Category::Manual,
        Category::Diskless,
        Category::Other,
    ];

    /// Stable identifier used in storage and the HTTP API
    pub fn slug(&self) -> &'static str {
        match self {
            Category::Hotel => "hotel",
            Category::PcRoom => "pcroom",
            Category::Manual => "manual",
            Category::Diskless => "diskless",
            Category::Other => "other",
        }
    }

    /// Name of the category's folder on Drive
    pub fn folder_name(&self) -> &'static str {
        match self {
            Category::Hotel => "Hotel IPTV",
            Category::PcRoom => "PC Room",
            Category::Manual => "Manual",
            Category::Diskless => "Diskless",
            Category::Other => "Other",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.slug() == lowered)
            .ok_or_else(|| DomainError::UnknownCategory(s.to_string()))
    }
}

/// Resolved folder IDs for one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderHierarchy {
    /// The application root folder
    pub root_id: RemoteId,
    /// One folder per category, all children of `root_id`
    pub categories: HashMap<Category, RemoteId>,
}

impl FolderHierarchy {
    /// Returns the folder ID for a category
    pub fn folder_for(&self, category: Category) -> Option<&RemoteId> {
        self.categories.get(&category)
    }

    /// Returns true if `folder_id` is one of the category folders
    pub fn is_category_folder(&self, folder_id: &RemoteId) -> bool {
        self.categories.values().any(|id| id == folder_id)
    }
}
