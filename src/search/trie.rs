//! Character trie mapping lower-cased keys to sets of ids.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct Trie {
    children: HashMap<char, Trie>,
    values: HashSet<String>,
}

fn normalized(key: &str) -> impl Iterator<Item = char> + '_ {
    key.chars().flat_map(char::to_lowercase)
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.children.is_empty()
    }

    pub fn add(&mut self, key: &str, value: &str) {
        let mut node = self;
        for c in normalized(key) {
            node = node.children.entry(c).or_default();
        }
        node.values.insert(value.to_string());
    }

    /// Every value stored under a key that starts with `prefix`.
    pub fn lookup(&self, prefix: &str) -> HashSet<String> {
        let mut node = self;
        for c in normalized(prefix) {
            match node.children.get(&c) {
                Some(child) => node = child,
                None => return HashSet::new(),
            }
        }
        let mut found = HashSet::new();
        node.gather(&mut found);
        found
    }

    fn gather(&self, found: &mut HashSet<String>) {
        found.extend(self.values.iter().cloned());
        for child in self.children.values() {
            child.gather(found);
        }
    }

    /// Remove `value` from every node, pruning branches left empty.
    pub fn delete_value(&mut self, value: &str) {
        self.values.remove(value);
        self.children.retain(|_, child| {
            child.delete_value(value);
            !child.is_empty()
        });
    }
}
