//! Verrous exclusifs par playlist
//!
//! Toute mutation d'une playlist s'exécute sous son verrou. Les lectures
//! (snapshots) n'en prennent jamais. Un appelant ne détient jamais deux
//! verrous de playlist à la fois.

use crate::model::PlaylistId;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Garde détenue pendant une mutation (relâchée au drop)
pub type PlaylistGuard = OwnedMutexGuard<()>;

/// Table des verrous, créés à la demande
#[derive(Debug)]
pub struct PlaylistLocks {
    locks: Mutex<HashMap<PlaylistId, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

impl PlaylistLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn slot(&self, id: PlaylistId) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| Error::internal("playlist lock table poisoned"))?;
        Ok(locks.entry(id).or_default().clone())
    }

    /// Acquiert le verrou de `id`, ou échoue avec `Conflict` après le délai
    pub async fn acquire(&self, id: PlaylistId) -> Result<PlaylistGuard> {
        let slot = self.slot(id)?;
        match tokio::time::timeout(self.timeout, slot.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                debug!("Timed out waiting for lock on playlist {}", id);
                Err(Error::Conflict(format!(
                    "playlist {} is busy, retry later",
                    id
                )))
            }
        }
    }

    /// Oublie le verrou d'une playlist supprimée ou inconnue
    ///
    /// À appeler après avoir relâché sa garde : l'entrée n'est retirée que
    /// si personne ne la détient ni ne l'attend.
    pub fn forget(&self, id: PlaylistId) {
        if let Ok(mut locks) = self.locks.lock() {
            if let Some(slot) = locks.get(&id) {
                // Seule la table référence encore le verrou
                if Arc::strong_count(slot) == 1 {
                    locks.remove(&id);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_acquire_times_out_with_conflict() {
        let locks = PlaylistLocks::new(Duration::from_millis(50));
        let _guard = locks.acquire(PlaylistId(1)).await.unwrap();

        let err = locks.acquire(PlaylistId(1)).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // Une autre playlist n'est pas bloquée
        assert!(locks.acquire(PlaylistId(2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let locks = Arc::new(PlaylistLocks::new(Duration::from_secs(1)));
        let guard = locks.acquire(PlaylistId(1)).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(PlaylistId(1)).await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_forget_removes_idle_entry() {
        let locks = PlaylistLocks::new(Duration::from_millis(50));
        {
            let _guard = locks.acquire(PlaylistId(3)).await.unwrap();
            assert_eq!(locks.len(), 1);
        }
        locks.forget(PlaylistId(3));
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_forget_keeps_held_entry() {
        let locks = PlaylistLocks::new(Duration::from_millis(50));
        let guard = locks.acquire(PlaylistId(4)).await.unwrap();

        locks.forget(PlaylistId(4));
        assert_eq!(locks.len(), 1);

        drop(guard);
        locks.forget(PlaylistId(4));
        assert!(locks.is_empty());
    }
}
