//! Word count: how many times each word occurs across all inputs.

use super::split_to_words;
use crate::mr::KeyValue;

pub fn map(_filename: &str, contents: &str) -> Vec<KeyValue> {
    split_to_words(contents)
        .map(|word| KeyValue::new(word, "1"))
        .collect()
}

pub fn reduce(_key: &str, values: &[String]) -> String {
    values.len().to_string()
}
