//! Built-in word count experiment
//!
//! Stage 0 splits the lines of the description's `input` file across pieces
//! and counts words; the merge sums the per-piece counts. Stage 1 splits the
//! merged vocabulary across pieces, each ranking its share; the merge
//! concatenates the shares in piece order and cleanup keeps the `top` words.
//!
//! Description keys beyond the required ones: `input` (required) and `top`
//! (default 10).

use anyhow::Context;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::experiment::{piece_range, Capability, Experiment, ExperimentType};
use crate::serialize::{FileFormat, FileType};

pub const NAME: &str = "word_count";
const DEFAULT_TOP: usize = 10;

pub fn word_count() -> Result<ExperimentType> {
    let words = Capability::new("word_count")
        .results_file("counts", FileFormat::json())
        .results_file("ranked", FileType::fast(FileFormat::json_lines()))
        .results_file("top_words", FileFormat::json())
        .outputs(0, &["counts"])
        .outputs(1, &["ranked"])
        .work(0, &["count_words"])
        .work(1, &["rank_words"])
        .cleanup(1, &["write_top_words"]);

    ExperimentType::builder(NAME, 2)
        .capability(words)
        .function("count_words", count_words)
        .function("rank_words", rank_words)
        .function("write_top_words", write_top_words)
        .build()
}

fn normalize(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

fn count_words(experiment: &mut Experiment) -> anyhow::Result<()> {
    let input = experiment.require_param("input")?.to_string();
    let content =
        std::fs::read_to_string(&input).with_context(|| format!("reading input {input}"))?;
    let lines: Vec<&str> = content.lines().collect();

    let which = experiment
        .piece()
        .index()
        .context("count_words runs on pieces only")?;
    let range = piece_range(lines.len(), experiment.num_pieces(), which);

    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut total = 0;
    for line in &lines[range.clone()] {
        for word in line.split_whitespace().map(normalize) {
            if word.is_empty() {
                continue;
            }
            *counts.entry(word).or_default() += 1;
            total += 1;
        }
    }

    experiment.write_file("counts", &json!(counts))?;
    experiment.summary.push(json!(format!(
        "piece {}: {} lines, {} words, {} distinct",
        which,
        range.len(),
        total,
        counts.len()
    )));
    Ok(())
}

/// `(word, count)` pairs, most frequent first, ties alphabetical
fn sorted_counts(counts: &Map<String, Value>) -> Vec<(String, u64)> {
    let mut pairs: Vec<(String, u64)> = counts
        .iter()
        .map(|(word, count)| (word.clone(), count.as_u64().unwrap_or_default()))
        .collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    pairs
}

fn rank_words(experiment: &mut Experiment) -> anyhow::Result<()> {
    let counts = experiment.read_file("counts", true)?;
    let counts = counts
        .as_object()
        .context("merged counts must be a JSON object")?;

    let which = experiment
        .piece()
        .index()
        .context("rank_words runs on pieces only")?;
    let ranked = sorted_counts(counts);
    let range = piece_range(ranked.len(), experiment.num_pieces(), which);

    let records: Vec<Value> = ranked[range.clone()]
        .iter()
        .enumerate()
        .map(|(offset, (word, count))| {
            json!({ "rank": range.start + offset + 1, "word": word, "count": count })
        })
        .collect();

    experiment.summary.push(json!(format!(
        "piece {}: ranked {} of {} words",
        which,
        records.len(),
        ranked.len()
    )));
    experiment.write_file("ranked", &Value::Array(records))?;
    Ok(())
}

fn write_top_words(experiment: &mut Experiment) -> anyhow::Result<()> {
    let top = match experiment.param("top") {
        Some(value) => value
            .parse::<usize>()
            .with_context(|| format!("top must be a number, got '{value}'"))?,
        None => DEFAULT_TOP,
    };

    let ranked = experiment.read_file("ranked", true)?;
    let top_words: Vec<Value> = ranked
        .as_array()
        .map(|records| records.iter().take(top).cloned().collect())
        .unwrap_or_default();

    experiment.write_file("top_words", &Value::Array(top_words))?;
    Ok(())
}
