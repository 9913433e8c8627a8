//! Queries and the structured query language of the document store.
//!
//! A [`Query`] is what the user asks for: some terms and an optional time
//! window. [`Query::build`] turns it into a [`StructuredQuery`], the small
//! boolean query language every [`DocumentStore`](crate::DocumentStore)
//! understands:
//!
//! ```text
//! Bool {
//!   must:   [ Nested(requests, Range(requests.date, from..=to)) ],
//!   should: [ Bool { should: [ Match(content, terms, And),
//!                              Match(title,   terms, And, boost 2.0) ] } ],
//! }
//! highlight: content
//! ```
//!
//! The time window is what a document must satisfy; the terms only decide
//! the ranking. Hits without any term in `content` end up without a
//! snippet and are dropped by the results fetcher.

use crate::error::{Result, WaspError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Path of the nested request objects of a document
pub const REQUESTS_PATH: &str = "requests";

/// Boost of title matches relative to content matches
pub const TITLE_BOOST: f32 = 2.0;

/// Searchable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Title,
    Content,
    /// `requests.date`, only meaningful inside a nested clause
    RequestDate,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Content => "content",
            Field::RequestDate => "requests.date",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the terms of a match clause combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchOperator {
    /// Every term must occur
    And,
    /// One term is enough
    Or,
}

/// A clause of the structured query language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    /// All `must` clauses match; `should` clauses add to the score.
    ///
    /// Without `must` clauses at least one `should` clause has to match.
    Bool { must: Vec<Clause>, should: Vec<Clause> },

    /// Full-text match of `query` against a field
    Match {
        field: Field,
        query: String,
        operator: MatchOperator,
        boost: f32,
    },

    /// Matches if `query` matches at least one element of the nested path
    Nested { path: String, query: Box<Clause> },

    /// Inclusive range on a date field; absent bounds are open
    Range {
        field: Field,
        gte: Option<DateTime<Utc>>,
        lte: Option<DateTime<Utc>>,
    },
}

impl Clause {
    pub fn match_field(field: Field, query: impl Into<String>, operator: MatchOperator) -> Self {
        Clause::Match {
            field,
            query: query.into(),
            operator,
            boost: 1.0,
        }
    }

    /// Set the boost of a match clause; other clauses are returned as is.
    pub fn with_boost(self, new_boost: f32) -> Self {
        match self {
            Clause::Match {
                field,
                query,
                operator,
                ..
            } => Clause::Match {
                field,
                query,
                operator,
                boost: new_boost,
            },
            other => other,
        }
    }

    /// The query texts of all match clauses on `field`.
    pub fn match_queries(&self, field: Field) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_match_queries(field, &mut out);
        out
    }

    fn collect_match_queries<'a>(&'a self, field: Field, out: &mut Vec<&'a str>) {
        match self {
            Clause::Bool { must, should } => {
                for clause in must.iter().chain(should) {
                    clause.collect_match_queries(field, out);
                }
            }
            Clause::Match {
                field: f, query, ..
            } if *f == field => out.push(query),
            Clause::Nested { query, .. } => query.collect_match_queries(field, out),
            _ => {}
        }
    }
}

/// Highlighting requested for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightSpec {
    pub field: Field,
    /// Target fragment length in bytes
    pub fragment_size: usize,
    pub max_fragments: usize,
    pub pre_tag: String,
    pub post_tag: String,
}

impl HighlightSpec {
    pub fn new(field: Field) -> Self {
        HighlightSpec {
            field,
            fragment_size: 100,
            max_fragments: 5,
            pre_tag: "<em>".to_string(),
            post_tag: "</em>".to_string(),
        }
    }

    pub fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size.max(1);
        self
    }

    pub fn with_max_fragments(mut self, count: usize) -> Self {
        self.max_fragments = count;
        self
    }
}

/// A query in the store's language, plus optional highlighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub query: Clause,
    pub highlight: Option<HighlightSpec>,
}

impl StructuredQuery {
    pub fn new(query: Clause) -> Self {
        StructuredQuery {
            query,
            highlight: None,
        }
    }

    pub fn with_highlight(mut self, highlight: HighlightSpec) -> Self {
        self.highlight = Some(highlight);
        self
    }
}

/// Which end of an interval a parsed date stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBound {
    /// A bare date means its first second
    Start,
    /// A bare date means its last second
    End,
}

/// Search terms and an optional time window.
///
/// Two queries are equal when terms and both bounds are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    terms: String,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

impl Query {
    pub fn new(
        terms: impl Into<String>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        Query {
            terms: terms.into(),
            from,
            to,
        }
    }

    pub fn terms(&self) -> &str {
        &self.terms
    }

    pub fn from(&self) -> Option<DateTime<Utc>> {
        self.from
    }

    pub fn to(&self) -> Option<DateTime<Utc>> {
        self.to
    }

    /// Build the store query with default highlighting of `content`.
    pub fn build(&self) -> StructuredQuery {
        self.build_with_highlight(HighlightSpec::new(Field::Content))
    }

    /// Build the store query with the given highlighting.
    pub fn build_with_highlight(&self, highlight: HighlightSpec) -> StructuredQuery {
        let in_window = Clause::Nested {
            path: REQUESTS_PATH.to_string(),
            query: Box::new(Clause::Range {
                field: Field::RequestDate,
                gte: self.from,
                lte: self.to,
            }),
        };
        let terms = Clause::Bool {
            must: Vec::new(),
            should: vec![
                Clause::match_field(Field::Content, &self.terms, MatchOperator::And),
                Clause::match_field(Field::Title, &self.terms, MatchOperator::And)
                    .with_boost(TITLE_BOOST),
            ],
        };

        StructuredQuery::new(Clause::Bool {
            must: vec![in_window],
            should: vec![terms],
        })
        .with_highlight(highlight)
    }

    /// Parse a time bound given on the command line.
    ///
    /// Accepts RFC 3339 (`2024-05-01T12:00:00+02:00`), a UTC date-time
    /// without offset (`2024-05-01T12:00:00`, a space works as separator
    /// too) and a bare date, which stands for the start or end of that day.
    pub fn parse_time(input: &str, bound: TimeBound) -> Result<DateTime<Utc>> {
        let input = input.trim();
        if let Ok(time) = DateTime::parse_from_rfc3339(input) {
            return Ok(time.with_timezone(&Utc));
        }
        for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
                return Ok(Utc.from_utc_datetime(&naive));
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
            let time = match bound {
                TimeBound::Start => date.and_hms_opt(0, 0, 0),
                TimeBound::End => date.and_hms_opt(23, 59, 59),
            };
            if let Some(naive) = time {
                return Ok(Utc.from_utc_datetime(&naive));
            }
        }
        Err(WaspError::InvalidTime {
            input: input.to_string(),
        })
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.terms)?;
        match (self.from, self.to) {
            (None, None) => Ok(()),
            (from, to) => write!(
                f,
                " [{} .. {}]",
                from.map(|t| t.to_rfc3339()).unwrap_or_else(|| "*".to_string()),
                to.map(|t| t.to_rfc3339()).unwrap_or_else(|| "*".to_string())
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_query_equality() {
        let a = Query::new("webis", Some(at(1)), None);
        let b = Query::new("webis", Some(at(1)), None);
        let c = Query::new("webis", None, None);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_build_shape() {
        let query = Query::new("web archive", Some(at(10)), Some(at(20))).build();

        let Clause::Bool { must, should } = &query.query else {
            panic!("expected bool query");
        };
        assert_eq!(must.len(), 1);
        match &must[0] {
            Clause::Nested { path, query } => {
                assert_eq!(path, REQUESTS_PATH);
                assert_eq!(
                    **query,
                    Clause::Range {
                        field: Field::RequestDate,
                        gte: Some(at(10)),
                        lte: Some(at(20)),
                    }
                );
            }
            other => panic!("unexpected must clause {:?}", other),
        }

        let Clause::Bool { should: terms, .. } = &should[0] else {
            panic!("expected bool of term matches");
        };
        assert!(terms.contains(&Clause::Match {
            field: Field::Title,
            query: "web archive".to_string(),
            operator: MatchOperator::And,
            boost: 2.0,
        }));
        assert!(terms.contains(&Clause::Match {
            field: Field::Content,
            query: "web archive".to_string(),
            operator: MatchOperator::And,
            boost: 1.0,
        }));

        let highlight = query.highlight.unwrap();
        assert_eq!(highlight.field, Field::Content);
        assert_eq!(highlight.pre_tag, "<em>");
    }

    #[test]
    fn test_match_queries() {
        let query = Query::new("webis", None, None).build();
        assert_eq!(query.query.match_queries(Field::Content), vec!["webis"]);
        assert!(query.query.match_queries(Field::RequestDate).is_empty());
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(
            Query::parse_time("1970-01-01T00:01:40Z", TimeBound::Start).unwrap(),
            at(100)
        );
        assert_eq!(
            Query::parse_time("1970-01-01T01:01:40+01:00", TimeBound::Start).unwrap(),
            at(100)
        );
        assert_eq!(
            Query::parse_time("1970-01-01T00:01:40", TimeBound::End).unwrap(),
            at(100)
        );
        assert_eq!(
            Query::parse_time("1970-01-02", TimeBound::Start).unwrap(),
            at(86_400)
        );
        assert_eq!(
            Query::parse_time("1970-01-02", TimeBound::End).unwrap(),
            at(2 * 86_400 - 1)
        );
        assert!(matches!(
            Query::parse_time("yesterday", TimeBound::Start),
            Err(WaspError::InvalidTime { .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Query::new("a b", None, None).to_string(), "\"a b\"");
        let q = Query::new("x", Some(at(0)), None);
        assert_eq!(q.to_string(), "\"x\" [1970-01-01T00:00:00+00:00 .. *]");
    }
}
