mod common;

use chrono::{SubsecRound, Utc};
use common::{backends, current_name, img, names, options, FakeValidator};
use pmoslideshow::store::Change;
use pmoslideshow::{
    AdvanceOutcome, ChangeSet, Entry, Error, Image, ImageId, ManagerOptions, MemoryStore,
    PlayEvent, Playlist, PlaylistId, PlaylistManager, PlaylistSnapshot, Result, Ring,
    SlideshowStore,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Store instrumenté : commits ralentis, ou ajout concurrent d'une image
/// juste avant sa suppression
struct HookedStore {
    inner: MemoryStore,
    slow: AtomicBool,
    delay: Duration,
    append_into: Mutex<Option<PlaylistId>>,
    appends_left: AtomicUsize,
}

impl HookedStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            slow: AtomicBool::new(false),
            delay: Duration::from_millis(400),
            append_into: Mutex::new(None),
            appends_left: AtomicUsize::new(0),
        }
    }

    /// Les `times` prochaines suppressions d'image seront précédées d'un
    /// ajout de cette image en fin de `playlist_id`
    fn race_deletes(&self, playlist_id: PlaylistId, times: usize) {
        *self.append_into.lock().unwrap() = Some(playlist_id);
        self.appends_left.store(times, Ordering::SeqCst);
    }

    fn append_before_delete(&self, changes: &ChangeSet) -> Result<()> {
        let Some(image_id) = changes.changes().iter().find_map(|change| match change {
            Change::DeleteImage(id) => Some(*id),
            _ => None,
        }) else {
            return Ok(());
        };
        let Some(playlist_id) = *self.append_into.lock().unwrap() else {
            return Ok(());
        };
        let armed = self
            .appends_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !armed {
            return Ok(());
        }

        let mut ring = Ring::new(self.inner.entries(playlist_id)?);
        if ring.get(image_id).is_some() {
            return Ok(());
        }
        let entry = ring.insert_tail(playlist_id, image_id, Utc::now().trunc_subsecs(6));
        let mut append = ChangeSet::new();
        append.put_entry(entry);
        self.inner.commit(append)
    }
}

impl SlideshowStore for HookedStore {
    fn next_image_id(&self) -> Result<ImageId> {
        self.inner.next_image_id()
    }
    fn next_playlist_id(&self) -> Result<PlaylistId> {
        self.inner.next_playlist_id()
    }
    fn image(&self, id: ImageId) -> Result<Option<Image>> {
        self.inner.image(id)
    }
    fn playlist(&self, id: PlaylistId) -> Result<Option<Playlist>> {
        self.inner.playlist(id)
    }
    fn entries(&self, playlist_id: PlaylistId) -> Result<Vec<Entry>> {
        self.inner.entries(playlist_id)
    }
    fn snapshot(&self, playlist_id: PlaylistId) -> Result<Option<PlaylistSnapshot>> {
        self.inner.snapshot(playlist_id)
    }
    fn playlists_containing(&self, image_id: ImageId) -> Result<Vec<PlaylistId>> {
        self.inner.playlists_containing(image_id)
    }
    fn find_images_by_name(&self, name: &str) -> Result<Vec<Image>> {
        self.inner.find_images_by_name(name)
    }
    fn play_events(&self, playlist_id: PlaylistId) -> Result<Vec<PlayEvent>> {
        self.inner.play_events(playlist_id)
    }
    fn commit(&self, changes: ChangeSet) -> Result<()> {
        if self.slow.load(Ordering::SeqCst) {
            std::thread::sleep(self.delay);
        }
        self.append_before_delete(&changes)?;
        self.inner.commit(changes)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_advances_keep_single_current() {
    for backend in backends() {
        let manager =
            PlaylistManager::new(backend.store.clone(), Arc::new(FakeValidator::new()), options());
        let slideshow = manager
            .create_playlist((0..6).map(|i| img(&format!("p{}", i), 5)).collect())
            .await
            .unwrap();
        let ids = slideshow.image_ids();

        let mut tasks = Vec::new();
        for round in 0..40 {
            let manager = manager.clone();
            let played = ids[round % ids.len()];
            let id = slideshow.id();
            tasks.push(tokio::spawn(async move {
                manager.advance_on_play(id, played).await
            }));
        }

        for outcome in futures::future::join_all(tasks).await {
            let outcome = outcome.unwrap().unwrap();
            assert!(matches!(outcome, AdvanceOutcome::Advanced { .. }));
        }

        let snapshot = manager.get_ordered_playlist(slideshow.id()).await.unwrap();
        current_name(&snapshot);
        assert_eq!(snapshot.len(), 6, "{}", backend.name);
        assert_eq!(
            manager.play_events(slideshow.id()).await.unwrap().len(),
            40,
            "{}",
            backend.name
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshots_during_advances_are_consistent() {
    for backend in backends() {
        let manager =
            PlaylistManager::new(backend.store.clone(), Arc::new(FakeValidator::new()), options());
        let slideshow = manager
            .create_playlist(vec![img("x", 5), img("y", 5), img("z", 5)])
            .await
            .unwrap();
        let id = slideshow.id();

        let writer = {
            let manager = manager.clone();
            tokio::spawn(async move {
                for _ in 0..60 {
                    let snapshot = manager.get_ordered_playlist(id).await.unwrap();
                    let current = snapshot.current().unwrap().0.image_id;
                    manager.advance_on_play(id, current).await.unwrap();
                }
            })
        };

        for _ in 0..60 {
            let snapshot = manager.get_ordered_playlist(id).await.unwrap();
            current_name(&snapshot);
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lock_contention_surfaces_conflict() {
    let store = Arc::new(HookedStore::new());
    let manager = PlaylistManager::new(
        store.clone(),
        Arc::new(FakeValidator::new()),
        ManagerOptions {
            lock_timeout: Duration::from_millis(50),
            ..options()
        },
    );
    let slideshow = manager
        .create_playlist(vec![img("a", 5), img("b", 5)])
        .await
        .unwrap();
    let ids = slideshow.image_ids();
    let id = slideshow.id();

    store.slow.store(true, Ordering::SeqCst);
    let holder = {
        let manager = manager.clone();
        let played = ids[0];
        tokio::spawn(async move { manager.advance_on_play(id, played).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = manager.advance_on_play(id, ids[0]).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "unexpected: {:?}", err);
    assert_eq!(err.class(), pmoslideshow::ErrorClass::Retry);

    holder.await.unwrap().unwrap();
    store.slow.store(false, Ordering::SeqCst);

    // Une autre playlist reste utilisable
    let other = manager.create_playlist(vec![img("c", 5)]).await.unwrap();
    manager
        .advance_on_play(other.id(), other.image_ids()[0])
        .await
        .unwrap();

    let snapshot = manager.get_ordered_playlist(id).await.unwrap();
    assert_eq!(current_name(&snapshot), "b");
}

#[tokio::test]
async fn test_delete_image_retries_after_concurrent_append() {
    let store = Arc::new(HookedStore::new());
    let manager = PlaylistManager::new(store.clone(), Arc::new(FakeValidator::new()), options());

    let first = manager
        .create_playlist(vec![img("shared", 5), img("left", 5)])
        .await
        .unwrap();
    let second = manager
        .create_playlist(vec![img("right", 5), img("other", 5)])
        .await
        .unwrap();
    let shared = first.image_ids()[0];

    store.race_deletes(second.id(), 1);
    assert!(manager.delete_image(shared).await.unwrap());

    assert!(matches!(
        manager.get_image(shared).await,
        Err(Error::ImageNotFound(_))
    ));
    assert!(store.playlists_containing(shared).unwrap().is_empty());

    let first = manager.get_ordered_playlist(first.id()).await.unwrap();
    assert_eq!(names(&first), vec!["left"]);
    assert_eq!(current_name(&first), "left");

    let second = manager.get_ordered_playlist(second.id()).await.unwrap();
    assert_eq!(names(&second), vec!["right", "other"]);
    assert_eq!(current_name(&second), "right");
}

#[tokio::test]
async fn test_delete_image_gives_up_after_repeated_appends() {
    let store = Arc::new(HookedStore::new());
    let manager = PlaylistManager::new(store.clone(), Arc::new(FakeValidator::new()), options());

    let first = manager
        .create_playlist(vec![img("shared", 5), img("left", 5)])
        .await
        .unwrap();
    let second = manager.create_playlist(vec![img("right", 5)]).await.unwrap();
    let shared = first.image_ids()[0];

    store.race_deletes(second.id(), usize::MAX);
    let err = manager.delete_image(shared).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "unexpected: {:?}", err);

    // L'image reste entière, référencée par la dernière playlist où elle a été ajoutée
    assert!(manager.get_image(shared).await.is_ok());
    assert_eq!(store.playlists_containing(shared).unwrap(), vec![second.id()]);
    let second = manager.get_ordered_playlist(second.id()).await.unwrap();
    assert_eq!(names(&second), vec!["right", "shared"]);
    assert_eq!(current_name(&second), "right");
}
