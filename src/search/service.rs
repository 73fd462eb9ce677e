use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::Result;
use tracing::{debug, info};

use super::trie::Trie;
use crate::library_store::{
    ChangeKind, ChangedEntity, LibraryEvent, LibraryEventListener, LibraryStore,
    SearchableContentType,
};

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

/// One trie per searchable kind, kept current through library events.
#[derive(Debug, Default)]
pub struct SearchService {
    artists: RwLock<Trie>,
    albums: RwLock<Trie>,
    tracks: RwLock<Trie>,
}

impl SearchService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every artist, album and track currently in `store`.
    pub fn build(store: &dyn LibraryStore) -> Result<Self> {
        let service = Self::new();
        for content_type in [
            SearchableContentType::Artist,
            SearchableContentType::Album,
            SearchableContentType::Track,
        ] {
            let items = store.get_searchable_content(content_type)?;
            let mut trie = service.trie(content_type).write().unwrap();
            for item in &items {
                Self::index(&mut trie, &item.id, &item.name);
            }
            info!("Indexed {} items of {:?}", items.len(), content_type);
        }
        Ok(service)
    }

    fn trie(&self, content_type: SearchableContentType) -> &RwLock<Trie> {
        match content_type {
            SearchableContentType::Artist => &self.artists,
            SearchableContentType::Album => &self.albums,
            SearchableContentType::Track => &self.tracks,
        }
    }

    fn index(trie: &mut Trie, id: &str, name: &str) {
        for token in tokens(name) {
            trie.add(token, id);
        }
    }

    /// Put `id` under the tokens of `name`, replacing whatever it was indexed under.
    pub fn upsert(&self, content_type: SearchableContentType, id: &str, name: &str) {
        let mut trie = self.trie(content_type).write().unwrap();
        trie.delete_value(id);
        Self::index(&mut trie, id, name);
    }

    pub fn remove(&self, content_type: SearchableContentType, id: &str) {
        self.trie(content_type).write().unwrap().delete_value(id);
    }

    /// Ids matching every whitespace-separated token of `query` by prefix,
    /// sorted. A query without tokens matches nothing.
    pub fn search(&self, content_type: SearchableContentType, query: &str) -> Vec<String> {
        let trie = self.trie(content_type).read().unwrap();
        let mut matches: Option<HashSet<String>> = None;
        for token in tokens(query) {
            let found = trie.lookup(token);
            let narrowed = match matches {
                None => found,
                Some(previous) => previous.intersection(&found).cloned().collect(),
            };
            if narrowed.is_empty() {
                return Vec::new();
            }
            matches = Some(narrowed);
        }

        let mut ids: Vec<String> = matches.unwrap_or_default().into_iter().collect();
        ids.sort();
        ids
    }

    pub fn search_artists(&self, query: &str) -> Vec<String> {
        self.search(SearchableContentType::Artist, query)
    }

    pub fn search_albums(&self, query: &str) -> Vec<String> {
        self.search(SearchableContentType::Album, query)
    }

    pub fn search_tracks(&self, query: &str) -> Vec<String> {
        self.search(SearchableContentType::Track, query)
    }
}

impl LibraryEventListener for SearchService {
    fn on_library_event(&self, event: &LibraryEvent) {
        let (content_type, id, name) = match &event.entity {
            ChangedEntity::Artist(artist) => (SearchableContentType::Artist, &artist.id, &artist.name),
            ChangedEntity::Album(album) => (SearchableContentType::Album, &album.id, &album.name),
            ChangedEntity::Track(track) => (SearchableContentType::Track, &track.id, &track.name),
            _ => return,
        };
        debug!("Reindexing {:?} {} after {:?}", content_type, id, event.kind);
        match event.kind {
            ChangeKind::Created | ChangeKind::Updated => self.upsert(content_type, id, name),
            ChangeKind::Deleted => self.remove(content_type, id),
        }
    }
}
