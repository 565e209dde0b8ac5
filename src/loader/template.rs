// ABOUTME: Query templates with {{ name }} placeholders for paginated insert-from-select
// ABOUTME: offset and limit are supplied by the loader, other names by the caller

use crate::error::{LoaderError, LoaderResult};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

pub const OFFSET: &str = "offset";
pub const LIMIT: &str = "limit";

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// A SQL query with `{{ name }}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    source: String,
}

impl QueryTemplate {
    /// Trailing whitespace and semicolons are dropped so the rendered query
    /// can be nested as a subquery.
    pub fn new(source: &str) -> Self {
        let source = source
            .trim_end()
            .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
            .to_string();
        Self { source }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of all placeholders in the template.
    pub fn placeholders(&self) -> BTreeSet<String> {
        placeholder_regex()
            .captures_iter(&self.source)
            .map(|caps| caps[1].to_string())
            .collect()
    }

    /// True when the template references both `offset` and `limit`.
    pub fn is_paginated(&self) -> bool {
        let names = self.placeholders();
        names.contains(OFFSET) && names.contains(LIMIT)
    }

    /// Substitute every placeholder. Values are inserted verbatim.
    pub fn render(&self, params: &BTreeMap<String, String>) -> LoaderResult<String> {
        let mut missing = None;
        let rendered = placeholder_regex().replace_all(&self.source, |caps: &regex::Captures| {
            let name = &caps[1];
            match params.get(name) {
                Some(value) => value.clone(),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });
        match missing {
            Some(name) => Err(LoaderError::Template(format!(
                "no value for placeholder '{}'",
                name
            ))),
            None => Ok(rendered.into_owned()),
        }
    }

    /// Render one page: caller params plus `offset` and `limit`.
    pub fn render_page(
        &self,
        params: &BTreeMap<String, String>,
        offset: u64,
        limit: u64,
    ) -> LoaderResult<String> {
        let mut all = params.clone();
        all.insert(OFFSET.to_string(), offset.to_string());
        all.insert(LIMIT.to_string(), limit.to_string());
        self.render(&all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_page() {
        let template = QueryTemplate::new(
            "SELECT * FROM src WHERE day = '{{day}}' ORDER BY id OFFSET {{ offset }} LIMIT {{ limit }};\n",
        );
        let params = BTreeMap::from([("day".to_string(), "2025-09-01".to_string())]);
        assert_eq!(
            template.render_page(&params, 160, 80).unwrap(),
            "SELECT * FROM src WHERE day = '2025-09-01' ORDER BY id OFFSET 160 LIMIT 80"
        );
    }

    #[test]
    fn test_unknown_placeholder_fails() {
        let template = QueryTemplate::new("SELECT {{ missing }} FROM t");
        let err = template.render_page(&BTreeMap::new(), 0, 10).unwrap_err();
        assert!(matches!(err, LoaderError::Template(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_is_paginated() {
        assert!(QueryTemplate::new("SELECT 1 OFFSET {{offset}} LIMIT {{limit}}").is_paginated());
        assert!(!QueryTemplate::new("SELECT 1 LIMIT {{ limit }}").is_paginated());
        assert!(!QueryTemplate::new("SELECT 1").is_paginated());
    }

    #[test]
    fn test_trailing_semicolons_dropped() {
        assert_eq!(QueryTemplate::new("SELECT 1 ; ;  ").source(), "SELECT 1");
    }

    #[test]
    fn test_placeholders() {
        let template = QueryTemplate::new("{{a}} {{ b }} {{a}} {{ offset }}");
        let names: Vec<String> = template.placeholders().into_iter().collect();
        assert_eq!(names, vec!["a", "b", "offset"]);
    }
}
