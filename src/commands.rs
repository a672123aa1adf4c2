use anyhow::{Context, Result, bail};
use console::style;
use dialoguer::Input;
use std::path::Path;
use tracing::{error, info};

use crate::assistant::{Reply, SupportAssistant};
use crate::config::Config;
use crate::context::QueryContext;
use crate::corpus::{Corpus, CorpusColumns};
use crate::embeddings::OpenAiEmbedder;
use crate::generation::OpenAiGenerator;
use crate::index::DistanceMetric;
use crate::indexer::{self, Indexer};

/// Embed the whole corpus and write a fresh index
#[inline]
pub fn build_index(config: &Config, force: bool) -> Result<()> {
    let embedder = OpenAiEmbedder::from_config(config).context("Failed to create embedding client")?;
    let indexer = Indexer::new(embedder, config).with_progress(true);

    println!(
        "Building index from {}",
        style(indexer.corpus_path().display()).cyan()
    );
    let stats = indexer.build(force)?;

    println!("{}", style("✓ Index built").green());
    println!("  Rows embedded: {}", stats.rows_embedded);
    println!("  Vectors: {}", stats.total_vectors);
    println!("  Index file: {}", indexer.store().path().display());
    Ok(())
}

/// Append the rows of `csv_path` to the corpus and their vectors to the index
#[inline]
pub fn append_rows(config: &Config, csv_path: &Path) -> Result<()> {
    let new_rows = Corpus::load(csv_path, &CorpusColumns::from_config(config))
        .with_context(|| format!("Failed to read new rows from {}", csv_path.display()))?;

    let embedder = OpenAiEmbedder::from_config(config).context("Failed to create embedding client")?;
    let indexer = Indexer::new(embedder, config).with_progress(true);
    let stats = indexer.append(&new_rows)?;

    if stats.rows_embedded == 0 {
        println!("No rows to append in {}", csv_path.display());
        return Ok(());
    }

    println!(
        "{}",
        style(format!("✓ Appended {} rows", stats.rows_embedded)).green()
    );
    println!(
        "  Positions: {}..{}",
        stats.positions.start, stats.positions.end
    );
    println!("  Vectors: {}", stats.total_vectors);
    Ok(())
}

/// Compare the corpus with the index. With `sample`, also re-embed that many rows and check
/// each one retrieves itself.
#[inline]
pub fn verify_index(config: &Config, sample: Option<usize>) -> Result<()> {
    let report = match sample {
        Some(sample) => {
            let embedder =
                OpenAiEmbedder::from_config(config).context("Failed to create embedding client")?;
            Indexer::new(embedder, config).verify_deep(sample)?
        }
        None => indexer::verify(config)?,
    };

    println!("Corpus rows:   {}", report.corpus_rows);
    println!("Index vectors: {}", report.index_vectors);
    if report.rows_sampled > 0 {
        println!("Rows sampled:  {}", report.rows_sampled);
    }

    if report.is_consistent {
        println!("{}", style("✓ Corpus and index are consistent").green());
        return Ok(());
    }

    if !report.missing_vectors.is_empty() {
        println!(
            "  Rows without vectors: {}..{}",
            report.missing_vectors.start, report.missing_vectors.end
        );
    }
    if !report.orphaned_vectors.is_empty() {
        println!(
            "  Vectors without rows: {}..{}",
            report.orphaned_vectors.start, report.orphaned_vectors.end
        );
    }
    if !report.misaligned_rows.is_empty() {
        println!("  Rows not retrieving themselves: {:?}", report.misaligned_rows);
    }
    println!("Rebuild with 'support-rag build --force'.");
    bail!("corpus and index are inconsistent")
}

/// Print the nearest corpus examples for `query`
#[inline]
pub fn search_examples(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let assistant = open_assistant(config)?;
    let context = assistant.search(query, k)?;
    print_examples(&context);
    Ok(())
}

/// Answer a single query without a conversation
#[inline]
pub fn ask(config: &Config, query: &str) -> Result<()> {
    let assistant = open_assistant(config)?;
    let mut history = assistant.start_conversation();
    let reply = assistant.answer(query, &mut history)?;
    print_reply(assistant.assistant_name(), &reply);
    Ok(())
}

/// Interactive support session. `/reload` re-reads the corpus and index, `/exit` ends the
/// session.
#[inline]
pub fn chat(config: &Config) -> Result<()> {
    let assistant = open_assistant(config)?;
    let mut history = assistant.start_conversation();

    if let Some(greeting) = history.last() {
        println!(
            "{} {}",
            style(format!("{}:", assistant.assistant_name())).bold().cyan(),
            greeting.text
        );
    }
    println!(
        "{}",
        style("Type /exit to leave, /reload after updating the corpus.").dim()
    );

    loop {
        let line: String = match Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => line,
            Err(e) => {
                info!("Input closed: {}", e);
                break;
            }
        };

        match line.trim() {
            "" => {}
            "/exit" | "/quit" => break,
            "/reload" => {
                match assistant.reload_index() {
                    Ok(vectors) => println!(
                        "{}",
                        style(format!("✓ Reloaded {} vectors", vectors)).green()
                    ),
                    Err(e) => print_error(&e),
                }
            }
            query => match assistant.answer(query, &mut history) {
                Ok(reply) => print_reply(assistant.assistant_name(), &reply),
                Err(e) => {
                    error!("Query failed: {}", e);
                    print_error(&e);
                }
            },
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn open_assistant(
    config: &Config,
) -> Result<SupportAssistant<OpenAiEmbedder, OpenAiGenerator>> {
    let embedder = OpenAiEmbedder::from_config(config).context("Failed to create embedding client")?;
    let generator =
        OpenAiGenerator::from_config(config).context("Failed to create generation client")?;
    SupportAssistant::from_config(embedder, generator, config).with_context(|| {
        format!(
            "Failed to open the index at {}; run 'support-rag build' first",
            config.index_path().display()
        )
    })
}

fn print_examples(context: &QueryContext) {
    if context.is_empty() {
        println!("{}", style("No similar examples found.").yellow());
        return;
    }

    let label = match context.metric() {
        DistanceMetric::Euclidean => "distance",
        DistanceMetric::Cosine => "similarity",
    };
    for (rank, example) in context.examples().iter().enumerate() {
        println!(
            "{} row {} ({} {:.4})",
            style(format!("#{}", rank + 1)).bold(),
            example.record.position,
            label,
            example.distance
        );
        println!("  Q: {}", example.record.query);
        println!("  A: {}", style(&example.record.response).dim());
    }
}

fn print_reply(assistant_name: &str, reply: &Reply) {
    println!(
        "{} {}",
        style(format!("{}:", assistant_name)).bold().cyan(),
        reply.text
    );
    if reply.is_ungrounded() {
        println!(
            "{}",
            style("(No similar examples found; this reply is not grounded on past tickets.)").dim()
        );
    }
}

fn print_error(error: &crate::SupportError) {
    eprintln!("{} {}", style("Error:").bold().red(), error);
    if error.is_retryable() {
        eprintln!("{}", style("This looks temporary; try again in a moment.").dim());
    }
}
