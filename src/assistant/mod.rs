// Support assistant
// Runs one query through retrieve, resolve and generate against a long-lived index and corpus


use parking_lot::RwLock;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::{Config, GenerationConfig};
use crate::context::QueryContext;
use crate::corpus::{Corpus, CorpusColumns};
use crate::embeddings::Embedder;
use crate::generation::Generator;
use crate::history::ConversationHistory;
use crate::index::{IndexStore, SharedIndex};
use crate::indexer::ConsistencyReport;
use crate::retriever::Retriever;
use crate::Result;

/// A generated answer and the examples it was grounded on
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub context: QueryContext,
}

impl Reply {
    /// True when no similar examples were found; the reply was generated without grounding
    #[inline]
    pub fn is_ungrounded(&self) -> bool {
        self.context.is_empty()
    }
}

/// Where the corpus lives, so `reload_index` can re-read it alongside the index
#[derive(Debug, Clone)]
struct CorpusSource {
    path: PathBuf,
    columns: CorpusColumns,
}

pub struct SupportAssistant<E, G> {
    retriever: Retriever<E>,
    generator: G,
    index: SharedIndex,
    corpus: RwLock<Corpus>,
    corpus_source: Option<CorpusSource>,
    generation: GenerationConfig,
}

impl<E: Embedder, G: Generator> SupportAssistant<E, G> {
    /// Assemble an assistant from parts already in memory. `reload_index` then only re-reads the
    /// index file.
    #[inline]
    pub fn new(
        retriever: Retriever<E>,
        generator: G,
        index: SharedIndex,
        corpus: Corpus,
        generation: GenerationConfig,
    ) -> Self {
        warn_on_drift(corpus.len(), index.len());
        Self {
            retriever,
            generator,
            index,
            corpus: RwLock::new(corpus),
            corpus_source: None,
            generation,
        }
    }

    /// Open the configured index and load the configured corpus once, for the whole session
    #[inline]
    pub fn from_config(embedder: E, generator: G, config: &Config) -> Result<Self> {
        let retriever = Retriever::from_config(embedder, config)?;
        let index = SharedIndex::open(IndexStore::from_config(config))?;
        let source = CorpusSource {
            path: config.corpus_path(),
            columns: CorpusColumns::from_config(config),
        };
        let corpus = Corpus::load(&source.path, &source.columns)?;

        let mut assistant = Self::new(
            retriever,
            generator,
            index,
            corpus,
            config.generation.clone(),
        );
        assistant.corpus_source = Some(source);
        Ok(assistant)
    }

    #[inline]
    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    #[inline]
    pub fn corpus_len(&self) -> usize {
        self.corpus.read().len()
    }

    #[inline]
    pub fn assistant_name(&self) -> &str {
        &self.generation.assistant_name
    }

    /// A fresh conversation opened with the configured greeting
    #[inline]
    pub fn start_conversation(&self) -> ConversationHistory {
        ConversationHistory::with_greeting(
            self.generation.assistant_name.clone(),
            self.generation.render_greeting(),
        )
    }

    /// Retrieve and resolve the nearest examples for `query` without generating a reply
    #[inline]
    pub fn search(&self, query: &str, k: Option<usize>) -> Result<QueryContext> {
        let neighbors = self.retriever.retrieve(query, &self.index, k)?;
        let corpus = self.corpus.read();
        QueryContext::assemble(query, &neighbors, &corpus, "")
    }

    /// Answer one user turn.
    ///
    /// Both turns are appended to `history` only when the reply was generated; on any error the
    /// history is left as it was.
    #[inline]
    pub fn answer(&self, query: &str, history: &mut ConversationHistory) -> Result<Reply> {
        let neighbors = self.retriever.retrieve(query, &self.index, None)?;
        let context = {
            let corpus = self.corpus.read();
            QueryContext::assemble(
                query,
                &neighbors,
                &corpus,
                history.transcript_with_pending(query),
            )?
        };

        if context.is_empty() {
            info!("No similar examples found for the query");
        } else {
            debug!("Grounding reply on {} examples", context.examples().len());
        }

        let user_prompt =
            context.render_user_prompt(&self.generation.query_prompt, history.assistant_name());
        let text = self.generator.generate(
            &self.generation.system_prompt,
            &user_prompt,
            self.generation.temperature,
        )?;

        history.push_user(query);
        history.push_assistant(text.clone());
        Ok(Reply { text, context })
    }

    /// Re-read the corpus and the index after an ingestion run. Returns the vector count.
    ///
    /// The corpus is loaded first; if that fails nothing is replaced.
    #[inline]
    pub fn reload_index(&self) -> Result<usize> {
        let fresh_corpus = self
            .corpus_source
            .as_ref()
            .map(|source| Corpus::load(&source.path, &source.columns))
            .transpose()?;

        let mut corpus = self.corpus.write();
        let vectors = self.index.reload()?;
        if let Some(fresh) = fresh_corpus {
            *corpus = fresh;
        }
        warn_on_drift(corpus.len(), vectors);

        info!("Reloaded {} corpus rows and {} vectors", corpus.len(), vectors);
        Ok(vectors)
    }
}

fn warn_on_drift(corpus_rows: usize, index_vectors: usize) {
    let report = ConsistencyReport::compare(corpus_rows, index_vectors);
    if !report.is_consistent {
        warn!("Corpus and index disagree; run `verify` or rebuild the index");
        report.log_issues();
    }
}
