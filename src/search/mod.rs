mod service;
mod trie;

pub use service::SearchService;
pub use trie::Trie;
