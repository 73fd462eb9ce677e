//! Change notifications delivered synchronously to registered listeners.

use std::sync::{Arc, RwLock};

use super::models::{Album, Artist, Disc, File, Image, Track};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChangedEntity {
    File(File),
    Image(Image),
    Artist(Artist),
    Album(Album),
    Disc(Disc),
    Track(Track),
}

#[derive(Clone, Debug, PartialEq)]
pub struct LibraryEvent {
    pub entity: ChangedEntity,
    pub kind: ChangeKind,
}

impl LibraryEvent {
    pub fn new(kind: ChangeKind, entity: ChangedEntity) -> Self {
        Self { entity, kind }
    }
}

pub trait LibraryEventListener: Send + Sync {
    fn on_library_event(&self, event: &LibraryEvent);
}

#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<Arc<dyn LibraryEventListener>>>,
}

impl EventDispatcher {
    pub fn register(&self, listener: Arc<dyn LibraryEventListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    pub fn dispatch(&self, events: Vec<LibraryEvent>) {
        if events.is_empty() {
            return;
        }
        // clone the list so a listener may register another one
        let listeners = self.listeners.read().unwrap().clone();
        for event in &events {
            for listener in &listeners {
                listener.on_library_event(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        kinds: Mutex<Vec<ChangeKind>>,
    }

    impl LibraryEventListener for Recorder {
        fn on_library_event(&self, event: &LibraryEvent) {
            self.kinds.lock().unwrap().push(event.kind);
        }
    }

    fn artist_event(kind: ChangeKind) -> LibraryEvent {
        LibraryEvent::new(
            kind,
            ChangedEntity::Artist(Artist {
                id: "a".to_string(),
                name: "A".to_string(),
            }),
        )
    }

    #[test]
    fn every_listener_sees_every_event_in_order() {
        let dispatcher = EventDispatcher::default();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        dispatcher.register(first.clone());
        dispatcher.register(second.clone());

        dispatcher.dispatch(vec![
            artist_event(ChangeKind::Created),
            artist_event(ChangeKind::Deleted),
        ]);

        let expected = vec![ChangeKind::Created, ChangeKind::Deleted];
        assert_eq!(*first.kinds.lock().unwrap(), expected);
        assert_eq!(*second.kinds.lock().unwrap(), expected);
    }
}
