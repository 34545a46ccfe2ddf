//! Listing sources and the search plan each one drives the browser through.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;
use crate::region::prefecture_code;

const HELLOWORK_ENTRY_URL: &str =
    "https://www.hellowork.mhlw.go.jp/kensaku/GECA110010.do?action=initDisp&screenId=GECA110010";
const HELLOWORK_PREFECTURE_SELECT: &str = "ID_tDFK1CmbBox";
const HELLOWORK_FREE_WORD_INPUT: &str = "ID_freeWordInput";

const INDEED_SEARCH_URL: &str = "https://jp.indeed.com/jobs";

const HELLOWORK_NEXT_PAGE: &[ControlStrategy] = &[
    ControlStrategy::XPath("//input[@value='次へ']"),
    ControlStrategy::XPath("//button[contains(text(), '次へ')]"),
    ControlStrategy::XPath("//a[contains(text(), '次')]"),
    ControlStrategy::XPath("//input[contains(@value, '次')]"),
];

const INDEED_NEXT_PAGE: &[ControlStrategy] = &[
    ControlStrategy::Css("a[data-testid='pagination-page-next']"),
    ControlStrategy::Css("a[aria-label='Next Page']"),
    ControlStrategy::XPath("//nav//a[contains(@aria-label, '次')]"),
];

/// A site whose DOM shape needs its own extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingSource {
    /// Nested-table result layout.
    Hellowork,
    /// Card result layout.
    Indeed,
}

impl ListingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingSource::Hellowork => "hellowork",
            ListingSource::Indeed => "indeed",
        }
    }

    /// Whether drafts without a title are dropped before persistence.
    pub fn requires_title(&self) -> bool {
        matches!(self, ListingSource::Indeed)
    }

    /// Ordered strategies for locating the "next page" control.
    pub fn next_page_strategies(&self) -> &'static [ControlStrategy] {
        match self {
            ListingSource::Hellowork => HELLOWORK_NEXT_PAGE,
            ListingSource::Indeed => INDEED_NEXT_PAGE,
        }
    }

    /// Build the search plan for a query against this source.
    pub fn plan(&self, query: &SearchQuery) -> Result<SearchPlan, AppError> {
        match self {
            ListingSource::Hellowork => Ok(hellowork_plan(query)),
            ListingSource::Indeed => indeed_plan(query),
        }
    }
}

impl fmt::Display for ListingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ListingSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hellowork" => Ok(ListingSource::Hellowork),
            "indeed" => Ok(ListingSource::Indeed),
            _ => Err(format!("Unknown listing source: {}", s)),
        }
    }
}

/// Area and free-text keyword for one search. Both optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub area: Option<String>,
    pub keyword: Option<String>,
}

impl SearchQuery {
    pub fn new(area: Option<String>, keyword: Option<String>) -> Self {
        Self {
            area: area.filter(|s| !s.trim().is_empty()),
            keyword: keyword.filter(|s| !s.trim().is_empty()),
        }
    }

    /// Human-readable scope for status summaries.
    pub fn describe(&self) -> String {
        match (&self.area, &self.keyword) {
            (Some(area), Some(keyword)) => format!("{area} / {keyword}"),
            (Some(area), None) => area.clone(),
            (None, Some(keyword)) => keyword.clone(),
            (None, None) => "(unfiltered)".to_string(),
        }
    }
}

/// A form field to fill before submitting the search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub selector_id: String,
    pub value: String,
}

/// How to locate an interactive element on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStrategy {
    Css(&'static str),
    XPath(&'static str),
}

impl fmt::Display for ControlStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlStrategy::Css(s) => write!(f, "css:{s}"),
            ControlStrategy::XPath(s) => write!(f, "xpath:{s}"),
        }
    }
}

/// Everything the traversal needs to reach the first result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPlan {
    pub entry_url: String,
    pub constraints: Vec<Constraint>,
    /// Control that submits the search form. Failing to trigger it aborts the run.
    pub submit: Option<ControlStrategy>,
    pub next_page: &'static [ControlStrategy],
}

fn hellowork_plan(query: &SearchQuery) -> SearchPlan {
    let mut constraints = Vec::new();

    if let Some(area) = &query.area {
        match prefecture_code(area) {
            Some(code) => constraints.push(Constraint {
                selector_id: HELLOWORK_PREFECTURE_SELECT.to_string(),
                value: code.to_string(),
            }),
            None => tracing::warn!(%area, "Unknown prefecture, searching without area filter"),
        }
    }

    if let Some(keyword) = &query.keyword {
        constraints.push(Constraint {
            selector_id: HELLOWORK_FREE_WORD_INPUT.to_string(),
            value: keyword.clone(),
        });
    }

    SearchPlan {
        entry_url: HELLOWORK_ENTRY_URL.to_string(),
        constraints,
        submit: Some(ControlStrategy::Css("#ID_searchBtn")),
        next_page: ListingSource::Hellowork.next_page_strategies(),
    }
}

fn indeed_plan(query: &SearchQuery) -> Result<SearchPlan, AppError> {
    let url = Url::parse_with_params(
        INDEED_SEARCH_URL,
        &[
            ("q", query.keyword.as_deref().unwrap_or("")),
            ("l", query.area.as_deref().unwrap_or("")),
        ],
    )
    .map_err(|e| AppError::ConfigError(format!("Invalid search URL: {e}")))?;

    Ok(SearchPlan {
        entry_url: url.to_string(),
        constraints: Vec::new(),
        submit: None,
        next_page: ListingSource::Indeed.next_page_strategies(),
    })
}
