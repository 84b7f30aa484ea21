use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"[\p{L}\p{N}]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

/// Turns raw text into index terms. The same normalizer must be used at build
/// time and at query time or lookups will miss.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, text: &str) -> Vec<String>;
}

/// Default analyzer: compatibility decomposition with accents stripped,
/// lowercase, alphanumeric runs, English Snowball stemming.
#[derive(Debug, Default, Clone, Copy)]
pub struct Analyzer;

impl Normalizer for Analyzer {
    fn normalize(&self, text: &str) -> Vec<String> { tokenize(text) }
}

/// Tokenize text into stemmed terms, in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    let folded: String = text
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    RE.find_iter(&folded)
        .map(|m| STEMMER.stem(m.as_str()).into_owned())
        .collect()
}
