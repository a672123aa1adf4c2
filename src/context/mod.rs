// Context assembly
// Maps neighbour positions back to corpus records and renders the generation prompt


use serde::Serialize;
use tracing::{debug, error};

use crate::corpus::{Corpus, Record};
use crate::index::{DistanceMetric, Neighbors};
use crate::{Result, SupportError};

/// Resolve index positions to corpus records, keeping the nearest-first order.
///
/// A position past the end of the corpus means the corpus and index have drifted apart and is
/// always an error.
#[inline]
pub fn resolve<'a>(positions: &[usize], corpus: &'a Corpus) -> Result<Vec<&'a Record>> {
    positions
        .iter()
        .map(|&position| {
            corpus.get(position).ok_or_else(|| {
                error!(
                    "Index position {} has no corpus row ({} rows)",
                    position,
                    corpus.len()
                );
                SupportError::OutOfRange {
                    position,
                    corpus_len: corpus.len(),
                }
            })
        })
        .collect()
}

/// A retrieved record with its score under the index metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Example {
    pub distance: f32,
    pub record: Record,
}

/// Everything one query hands to the generation step
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
    query: String,
    metric: DistanceMetric,
    examples: Vec<Example>,
    history: String,
}

impl QueryContext {
    /// Resolve `neighbors` against `corpus` and bundle them with the query and the
    /// conversation transcript
    #[inline]
    pub fn assemble(
        query: impl Into<String>,
        neighbors: &Neighbors,
        corpus: &Corpus,
        history: impl Into<String>,
    ) -> Result<Self> {
        let records = resolve(neighbors.positions(), corpus)?;
        let examples = records
            .into_iter()
            .zip(neighbors.distances())
            .map(|(record, &distance)| Example {
                distance,
                record: record.clone(),
            })
            .collect::<Vec<_>>();

        debug!("Assembled context with {} examples", examples.len());
        Ok(Self {
            query: query.into(),
            metric: neighbors.metric(),
            examples,
            history: history.into(),
        })
    }

    #[inline]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    #[inline]
    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    #[inline]
    pub fn history(&self) -> &str {
        &self.history
    }

    /// True when retrieval found nothing, which is a legitimate result and not an error
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Example responses, nearest first
    #[inline]
    pub fn responses(&self) -> Vec<&str> {
        self.examples
            .iter()
            .map(|example| example.record.response.as_str())
            .collect()
    }

    /// Fill `{query}`, `{responses}`, `{chat_history}` and `{assistant_name}` in `template`.
    ///
    /// Substitution is a single pass, so braces inside the query or the examples are never
    /// expanded. Unknown placeholders are left as they are.
    #[inline]
    pub fn render_user_prompt(&self, template: &str, assistant_name: &str) -> String {
        let responses =
            serde_json::to_string(&self.responses()).unwrap_or_else(|_| "[]".to_string());

        render_template(template, |name| match name {
            "query" => Some(self.query.as_str()),
            "responses" => Some(responses.as_str()),
            "chat_history" => Some(self.history.as_str()),
            "assistant_name" => Some(assistant_name),
            _ => None,
        })
    }
}

fn render_template<'a, F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some((before, after)) = rest.split_once('{') {
        rendered.push_str(before);
        match after.split_once('}') {
            Some((name, tail)) if is_placeholder_name(name) => {
                if let Some(value) = lookup(name) {
                    rendered.push_str(value);
                } else {
                    rendered.push('{');
                    rendered.push_str(name);
                    rendered.push('}');
                }
                rest = tail;
            }
            _ => {
                rendered.push('{');
                rest = after;
            }
        }
    }

    rendered.push_str(rest);
    rendered
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
