//! Text chunking: turning source text into ordered, embeddable spans.
//!
//! The four text strategies here are pure functions over the input; the
//! structured (axiom-graph) strategies in [`structured`] are delegated to an
//! external collaborator and only dispatched from this module's
//! [`ChunkingStrategy`] enum.

pub mod structured;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Words per chunk for [`ChunkingStrategy::Word`].
pub const WORDS_PER_CHUNK: usize = 100;

/// Characters per chunk for [`ChunkingStrategy::FixedSize`].
pub const FIXED_CHUNK_CHARS: usize = 500;

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph break regex is valid"));

/// Closed set of chunking strategies.
///
/// The first four operate on raw text and are implemented by [`chunk`]. The
/// remaining six group an ontology's axioms and are produced by a
/// [`structured::StructuredChunker`] collaborator; the indexing pipeline
/// treats their rendered output identically to text chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkingStrategy {
    /// Fixed windows of 100 words (the default).
    Word,
    /// One sentence per chunk, split after `.`/`!`/`?` followed by whitespace.
    Sentence,
    /// Split on blank-line boundaries.
    Paragraph,
    /// Fixed windows of 500 characters.
    FixedSize,
    /// Group axioms by the class hierarchy.
    ClassBased,
    /// Group axioms by annotation prefix.
    AnnotationBased,
    /// Group axioms by namespace.
    NamespaceBased,
    /// Group axioms by hierarchy depth.
    DepthBased,
    /// Extract self-contained ontology modules.
    ModuleExtraction,
    /// Fixed axiom-count groups.
    SizeBased,
}

impl Default for ChunkingStrategy {
    fn default() -> Self {
        ChunkingStrategy::Word
    }
}

impl ChunkingStrategy {
    /// Canonical name, matching the configuration surface.
    pub fn name(&self) -> &'static str {
        match self {
            ChunkingStrategy::Word => "WordChunking",
            ChunkingStrategy::Sentence => "SentenceChunking",
            ChunkingStrategy::Paragraph => "ParagraphChunking",
            ChunkingStrategy::FixedSize => "FixedSizeChunking",
            ChunkingStrategy::ClassBased => "ClassBasedChunking",
            ChunkingStrategy::AnnotationBased => "AnnotationBasedChunking",
            ChunkingStrategy::NamespaceBased => "NamespaceBasedChunking",
            ChunkingStrategy::DepthBased => "DepthBasedChunking",
            ChunkingStrategy::ModuleExtraction => "ModuleExtractionChunking",
            ChunkingStrategy::SizeBased => "SizeBasedChunking",
        }
    }

    /// Looks a strategy up by name. Unrecognized names fall back to the
    /// default ([`ChunkingStrategy::Word`]) with a logged warning; a bad
    /// strategy name is never a hard failure.
    pub fn from_name(name: &str) -> Self {
        match name {
            "WordChunking" => ChunkingStrategy::Word,
            "SentenceChunking" => ChunkingStrategy::Sentence,
            "ParagraphChunking" => ChunkingStrategy::Paragraph,
            "FixedSizeChunking" => ChunkingStrategy::FixedSize,
            "ClassBasedChunking" => ChunkingStrategy::ClassBased,
            "AnnotationBasedChunking" => ChunkingStrategy::AnnotationBased,
            "NamespaceBasedChunking" => ChunkingStrategy::NamespaceBased,
            "DepthBasedChunking" => ChunkingStrategy::DepthBased,
            "ModuleExtractionChunking" => ChunkingStrategy::ModuleExtraction,
            "SizeBasedChunking" => ChunkingStrategy::SizeBased,
            other => {
                warn!(strategy = other, "unknown chunking strategy, falling back to WordChunking");
                ChunkingStrategy::Word
            }
        }
    }

    /// `true` for the six strategies that operate on an axiom graph rather
    /// than raw text.
    pub fn is_structured(&self) -> bool {
        matches!(
            self,
            ChunkingStrategy::ClassBased
                | ChunkingStrategy::AnnotationBased
                | ChunkingStrategy::NamespaceBased
                | ChunkingStrategy::DepthBased
                | ChunkingStrategy::ModuleExtraction
                | ChunkingStrategy::SizeBased
        )
    }
}

/// Splits `text` into ordered chunks per `strategy`.
///
/// Never returns an empty list for non-empty input: when strategy-specific
/// splitting yields nothing, the whole input becomes a single chunk.
/// Structured strategies passed here behave as [`ChunkingStrategy::Word`],
/// since only the rendered text is available at this point.
pub fn chunk(text: &str, strategy: ChunkingStrategy) -> Vec<String> {
    let chunks = match strategy {
        ChunkingStrategy::Sentence => split_sentences(text),
        ChunkingStrategy::Paragraph => PARAGRAPH_BREAK
            .split(text)
            .filter(|p| !p.trim().is_empty())
            .map(str::to_string)
            .collect(),
        ChunkingStrategy::FixedSize => split_fixed(text, FIXED_CHUNK_CHARS),
        _ => split_words(text, WORDS_PER_CHUNK),
    };

    if chunks.is_empty() && !text.is_empty() {
        vec![text.to_string()]
    } else {
        chunks
    }
}

fn split_words(text: &str, words_per_chunk: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(words_per_chunk)
        .map(|window| window.join(" "))
        .collect()
}

/// Sentence splitter: a terminator (`.`, `!`, `?`) followed by whitespace
/// ends a sentence. Hand-rolled because the `regex` crate has no lookbehind.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev_was_terminator = false;

    for (idx, ch) in text.char_indices() {
        if prev_was_terminator && ch.is_whitespace() {
            let sentence = text[start..idx].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = idx;
        }
        prev_was_terminator = matches!(ch, '.' | '!' | '?');
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

fn split_fixed(text: &str, chars_per_chunk: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::with_capacity(chars_per_chunk);
    let mut len = 0usize;
    for ch in text.chars() {
        current.push(ch);
        len += 1;
        if len == chars_per_chunk {
            chunks.push(std::mem::take(&mut current));
            len = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_chunking_produces_ceil_n_over_100_windows() {
        let words: Vec<String> = (0..250).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");
        let chunks = chunk(&text, ChunkingStrategy::Word);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].split_whitespace().count(), 100);
        assert_eq!(chunks[1].split_whitespace().count(), 100);
        assert_eq!(chunks[2].split_whitespace().count(), 50);
    }

    #[test]
    fn word_chunking_preserves_document_order() {
        let words: Vec<String> = (0..150).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");
        let chunks = chunk(&text, ChunkingStrategy::Word);
        let rejoined: Vec<&str> = chunks
            .iter()
            .flat_map(|c| c.split_whitespace())
            .collect();
        assert_eq!(rejoined, words.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn sentence_chunking_splits_on_terminators() {
        let text = "First sentence. Second one! Is this third? Yes.";
        let chunks = chunk(text, ChunkingStrategy::Sentence);
        assert_eq!(
            chunks,
            vec!["First sentence.", "Second one!", "Is this third?", "Yes."]
        );
    }

    #[test]
    fn sentence_chunking_keeps_inline_periods_together() {
        // A terminator not followed by whitespace is not a boundary.
        let text = "Version 1.2 shipped. Done.";
        let chunks = chunk(text, ChunkingStrategy::Sentence);
        assert_eq!(chunks, vec!["Version 1.2 shipped.", "Done."]);
    }

    #[test]
    fn paragraph_chunking_splits_on_blank_lines() {
        let text = "para one\nstill one\n\npara two\n\n\npara three";
        let chunks = chunk(text, ChunkingStrategy::Paragraph);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].contains("still one"));
        assert_eq!(chunks[2], "para three");
    }

    #[test]
    fn fixed_size_chunking_produces_ceil_l_over_500_windows() {
        let text = "a".repeat(1234);
        let chunks = chunk(&text, ChunkingStrategy::FixedSize);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 500));
        assert_eq!(chunks[2].chars().count(), 234);
    }

    #[test]
    fn non_empty_input_never_yields_empty_output() {
        for strategy in [
            ChunkingStrategy::Word,
            ChunkingStrategy::Sentence,
            ChunkingStrategy::Paragraph,
            ChunkingStrategy::FixedSize,
        ] {
            let chunks = chunk("x", strategy);
            assert!(!chunks.is_empty(), "{strategy:?} returned no chunks");
        }
    }

    #[test]
    fn unknown_name_falls_back_to_word() {
        assert_eq!(ChunkingStrategy::from_name("Bogus"), ChunkingStrategy::Word);
        assert_eq!(
            ChunkingStrategy::from_name("SizeBasedChunking"),
            ChunkingStrategy::SizeBased
        );
    }

    #[test]
    fn names_round_trip() {
        for strategy in [
            ChunkingStrategy::Word,
            ChunkingStrategy::Sentence,
            ChunkingStrategy::Paragraph,
            ChunkingStrategy::FixedSize,
            ChunkingStrategy::ClassBased,
            ChunkingStrategy::AnnotationBased,
            ChunkingStrategy::NamespaceBased,
            ChunkingStrategy::DepthBased,
            ChunkingStrategy::ModuleExtraction,
            ChunkingStrategy::SizeBased,
        ] {
            assert_eq!(ChunkingStrategy::from_name(strategy.name()), strategy);
        }
    }

    #[test]
    fn structured_flag_matches_family() {
        assert!(!ChunkingStrategy::Word.is_structured());
        assert!(ChunkingStrategy::ClassBased.is_structured());
        assert!(ChunkingStrategy::SizeBased.is_structured());
    }
}
