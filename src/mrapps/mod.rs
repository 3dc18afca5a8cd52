//! Map/Reduce applications a worker can run.

use crate::mr::KeyValue;

pub mod indexer;
pub mod wc;

/// Turns one input file (name, contents) into intermediate records.
pub type MapFn = fn(&str, &str) -> Vec<KeyValue>;

/// Folds every value seen for one key into a single output value.
pub type ReduceFn = fn(&str, &[String]) -> String;

/// A map reduce application.
#[derive(Clone, Copy)]
pub struct App {
    pub map: MapFn,
    pub reduce: ReduceFn,
}

/// Looks an application up by the name given on the command line.
pub fn by_name(name: &str) -> Option<App> {
    match name {
        "wc" => Some(App {
            map: wc::map,
            reduce: wc::reduce,
        }),
        "indexer" => Some(App {
            map: indexer::map,
            reduce: indexer::reduce,
        }),
        _ => None,
    }
}

// split_to_words treats every non-alphabetic character as a delimiter.
pub(crate) fn split_to_words(contents: &str) -> impl Iterator<Item = &str> {
    contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
}
