//! Site-wide search

use common::validation::validate_not_blank;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{Brand, Category, CouponView};

/// Which record kinds a search covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    #[default]
    All,
    Coupons,
    Brands,
    Categories,
}

impl SearchScope {
    pub fn includes(self, other: SearchScope) -> bool {
        self == SearchScope::All || self == other
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SearchQuery {
    #[validate(
        length(min = 1, max = 100, message = "Query must be 1 to 100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub q: String,
    #[serde(rename = "type", default)]
    pub scope: SearchScope,
    #[validate(range(min = 1, max = 50, message = "Limit must be between 1 and 50"))]
    pub limit: Option<u32>,
}

impl SearchQuery {
    pub const DEFAULT_LIMIT: u32 = 10;

    pub fn limit(&self) -> i64 {
        i64::from(self.limit.unwrap_or(Self::DEFAULT_LIMIT))
    }
}

#[derive(Debug, Default, Serialize)]
pub struct SearchResults {
    pub coupons: Vec<CouponView>,
    pub brands: Vec<Brand>,
    pub categories: Vec<Category>,
}
