use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Rejected category name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unrecognized lesson category: {0:?}")]
pub struct CategoryParseError(pub String);

/// Lesson categories offered by the app.
///
/// Progress is grouped per category; anything outside this set is rejected
/// at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Smartphone,
    Internet,
    Communication,
    Safety,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Smartphone,
        Category::Internet,
        Category::Communication,
        Category::Safety,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Smartphone => "smartphone",
            Category::Internet => "internet",
            Category::Communication => "communication",
            Category::Safety => "safety",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CategoryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| CategoryParseError(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_categories_case_insensitively() {
        assert_eq!("safety".parse::<Category>().unwrap(), Category::Safety);
        assert_eq!(" Internet ".parse::<Category>().unwrap(), Category::Internet);
    }

    #[test]
    fn rejects_unknown_category() {
        let err = "cooking".parse::<Category>().unwrap_err();
        assert_eq!(err, CategoryParseError("cooking".into()));
    }

    #[test]
    fn display_matches_serde_name() {
        for category in Category::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{category}\""));
        }
    }
}
