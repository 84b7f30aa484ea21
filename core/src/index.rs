use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type DocId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
    /// Seen at least once in a title, heading or emphasis context.
    pub important: bool,
}

impl Posting {
    pub fn new(doc_id: DocId, important: bool) -> Self {
        Self { doc_id, tf: 1, important }
    }

    /// Fold another observation of the same document into this posting.
    pub fn absorb(&mut self, other: &Posting) {
        debug_assert_eq!(self.doc_id, other.doc_id);
        self.tf += other.tf;
        self.important |= other.important;
    }
}

/// Postings for one term, ascending by doc id with no duplicates.
pub type PostingList = Vec<Posting>;

pub fn is_strictly_ascending(list: &[Posting]) -> bool {
    list.windows(2).all(|w| w[0].doc_id < w[1].doc_id)
}

/// Sort by doc id and fold duplicate ids together.
pub fn normalize_postings(list: &mut PostingList) {
    if is_strictly_ascending(list) {
        return;
    }
    list.sort_by_key(|p| p.doc_id);
    let mut out: PostingList = Vec::with_capacity(list.len());
    for p in list.drain(..) {
        match out.last_mut() {
            Some(last) if last.doc_id == p.doc_id => last.absorb(&p),
            _ => out.push(p),
        }
    }
    *list = out;
}

/// Drop the fragment component of a URL.
pub fn canonical_url(url: &str) -> &str {
    match url.find('#') {
        Some(idx) => &url[..idx],
        None => url,
    }
}

/// DocId <-> canonical URL, assigned densely in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct DocMapping {
    urls: Vec<String>,
    ids: HashMap<String, DocId>,
}

impl DocMapping {
    pub fn new() -> Self { Self::default() }

    pub fn from_urls(urls: Vec<String>) -> Self {
        let ids = urls
            .iter()
            .enumerate()
            .map(|(i, u)| (u.clone(), i as DocId))
            .collect();
        Self { urls, ids }
    }

    /// Returns the id for `url`, assigning the next one if it has not been seen.
    pub fn assign(&mut self, url: &str) -> DocId {
        let url = canonical_url(url);
        if let Some(&id) = self.ids.get(url) {
            return id;
        }
        let id = self.urls.len() as DocId;
        self.urls.push(url.to_string());
        self.ids.insert(url.to_string(), id);
        id
    }

    pub fn id(&self, url: &str) -> Option<DocId> {
        self.ids.get(canonical_url(url)).copied()
    }

    pub fn url(&self, doc_id: DocId) -> Option<&str> {
        self.urls.get(doc_id as usize).map(String::as_str)
    }

    pub fn urls(&self) -> &[String] { &self.urls }

    pub fn len(&self) -> usize { self.urls.len() }

    pub fn is_empty(&self) -> bool { self.urls.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_map_to_same_document() {
        let mut m = DocMapping::new();
        let a = m.assign("https://ics.uci.edu/about#staff");
        let b = m.assign("https://ics.uci.edu/about");
        let c = m.assign("https://ics.uci.edu/courses");
        assert_eq!(a, 0);
        assert_eq!(b, 0);
        assert_eq!(c, 1);
        assert_eq!(m.url(0), Some("https://ics.uci.edu/about"));
        assert_eq!(m.id("https://ics.uci.edu/courses#top"), Some(1));
    }

    #[test]
    fn from_urls_restores_both_directions() {
        let m = DocMapping::from_urls(vec!["a".into(), "b".into()]);
        assert_eq!(m.id("b"), Some(1));
        assert_eq!(m.url(0), Some("a"));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn normalize_sorts_and_folds_duplicates() {
        let mut list = vec![
            Posting { doc_id: 4, tf: 1, important: false },
            Posting { doc_id: 1, tf: 2, important: false },
            Posting { doc_id: 4, tf: 3, important: true },
        ];
        normalize_postings(&mut list);
        assert_eq!(
            list,
            vec![
                Posting { doc_id: 1, tf: 2, important: false },
                Posting { doc_id: 4, tf: 4, important: true },
            ]
        );
    }
}
