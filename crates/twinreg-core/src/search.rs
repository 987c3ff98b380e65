//! Backend-agnostic search requests and responses.
//!
//! A [`SearchRequest`] names a dot-addressed field path, a query type and a
//! value, plus optional sorting and paging. Backends compile it into their
//! native query form and answer with a [`SearchResponse`].

use serde::{Deserialize, Serialize};

use crate::descriptor::{ShellDescriptor, SUBMODELS_FIELD};

/// How the query value is compared against the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    /// All terms of the value must occur in the field.
    Match,
    /// The field must match the value as a regular expression.
    Regex,
}

/// A single filter condition on one field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    /// Dot-addressed field, e.g. `idShort` or `submodelDescriptors.idShort`.
    pub path: String,
    pub query_type: QueryType,
    pub value: String,
}

impl SearchQuery {
    /// Returns true if the path addresses a field inside the submodel array.
    pub fn targets_submodels(&self) -> bool {
        is_submodel_path(&self.path)
    }
}

/// Returns true if a dot-addressed path points below the submodel array,
/// e.g. `submodelDescriptors.idShort`. The array field itself does not count.
pub fn is_submodel_path(path: &str) -> bool {
    path.strip_prefix(SUBMODELS_FIELD)
        .is_some_and(|rest| rest.starts_with('.'))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One key of a multi-key sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    /// Ascending when unspecified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<SortDirection>,
}

impl SortKey {
    pub fn direction(&self) -> SortDirection {
        self.direction.unwrap_or_default()
    }
}

/// Zero-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub index: u32,
    pub size: u32,
}

impl Page {
    /// Offset of the first hit of this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.index) * u64::from(self.size)
    }
}

/// A structured search over shell descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Filter; everything matches when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<SearchQuery>,
    /// Sort keys in priority order; backend order when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<Page>,
}

impl SearchRequest {
    /// A request matching every shell.
    pub fn all() -> Self {
        SearchRequest::default()
    }

    pub fn matching(path: impl Into<String>, value: impl Into<String>) -> Self {
        SearchRequest {
            query: Some(SearchQuery {
                path: path.into(),
                query_type: QueryType::Match,
                value: value.into(),
            }),
            ..SearchRequest::default()
        }
    }

    pub fn regex(path: impl Into<String>, pattern: impl Into<String>) -> Self {
        SearchRequest {
            query: Some(SearchQuery {
                path: path.into(),
                query_type: QueryType::Regex,
                value: pattern.into(),
            }),
            ..SearchRequest::default()
        }
    }

    /// Appends a sort key.
    pub fn sorted_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            direction: Some(direction),
        });
        self
    }

    pub fn with_page(mut self, index: u32, size: u32) -> Self {
        self.page = Some(Page { index, size });
        self
    }

    /// Returns true if the filter addresses the nested submodel array.
    pub fn targets_submodels(&self) -> bool {
        self.query.as_ref().is_some_and(SearchQuery::targets_submodels)
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Number of matching shells across all pages.
    pub total: u64,
    /// The shells of the requested page. For submodel-scoped queries each
    /// shell only carries the submodels that matched.
    pub hits: Vec<ShellDescriptor>,
}
