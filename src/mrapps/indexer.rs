//! Inverted index: for each word, the documents it appears in.

use std::collections::BTreeSet;

use super::split_to_words;
use crate::mr::KeyValue;

pub fn map(document: &str, contents: &str) -> Vec<KeyValue> {
    split_to_words(contents)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|word| KeyValue::new(word, document))
        .collect()
}

/// Formats as `<count> <doc>,<doc>,...` with documents sorted.
pub fn reduce(_key: &str, values: &[String]) -> String {
    let docs = values.iter().map(String::as_str).collect::<BTreeSet<_>>();
    format!(
        "{} {}",
        docs.len(),
        docs.into_iter().collect::<Vec<_>>().join(",")
    )
}
