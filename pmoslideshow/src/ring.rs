//! Ring : index ordonné et circulaire des entrées d'une playlist
//!
//! Le ring est reconstruit depuis le store à chaque opération, sous le verrou
//! de la playlist. Il maintient l'ordre d'ajout (séquence triée + table de
//! positions) et l'unicité de l'entrée courante.

use crate::model::{Entry, ImageId, PlaylistId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Anneau d'entrées triées par `(appended_at, position)`
#[derive(Debug, Clone, Default)]
pub struct Ring {
    entries: Vec<Entry>,
    index: HashMap<ImageId, usize>,
}

impl Ring {
    /// Construit le ring (l'ordre d'entrée des éléments est indifférent)
    pub fn new(mut entries: Vec<Entry>) -> Self {
        entries.sort_by_key(Entry::order_key);
        let mut ring = Self {
            entries,
            index: HashMap::new(),
        };
        ring.reindex();
        ring
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (entry.image_id, pos))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, image_id: ImageId) -> bool {
        self.index.contains_key(&image_id)
    }

    pub fn get(&self, image_id: ImageId) -> Option<&Entry> {
        self.index.get(&image_id).map(|&pos| &self.entries[pos])
    }

    /// Entrée courante
    pub fn current(&self) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.current)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Successeur circulaire d'une image
    ///
    /// Retourne la première entrée après la dernière, et l'entrée elle-même
    /// si elle est seule. `None` si l'image n'appartient pas au ring.
    pub fn successor(&self, image_id: ImageId) -> Option<&Entry> {
        let pos = *self.index.get(&image_id)?;
        Some(&self.entries[(pos + 1) % self.entries.len()])
    }

    /// Déplace le pointeur courant sur `target`
    ///
    /// Retourne les entrées modifiées dans l'ordre où elles doivent être
    /// persistées : d'abord l'ancienne courante, ensuite la nouvelle.
    /// `None` si `target` n'appartient pas au ring.
    pub fn designate_current(&mut self, target: ImageId) -> Option<Vec<Entry>> {
        let target_pos = *self.index.get(&target)?;
        let mut changed = Vec::new();

        for (pos, entry) in self.entries.iter_mut().enumerate() {
            if entry.current && pos != target_pos {
                entry.current = false;
                changed.push(entry.clone());
            }
        }

        let entry = &mut self.entries[target_pos];
        if !entry.current {
            entry.current = true;
            changed.push(entry.clone());
        }

        Some(changed)
    }

    /// Ajoute une image en fin de ring
    ///
    /// La clé d'ordre est strictement supérieure à toutes les clés existantes.
    /// L'entrée n'est courante que si le ring était vide. Si l'image est déjà
    /// présente, l'entrée existante est retournée sans modification.
    pub fn insert_tail(
        &mut self,
        playlist_id: PlaylistId,
        image_id: ImageId,
        now: DateTime<Utc>,
    ) -> Entry {
        if let Some(existing) = self.get(image_id) {
            return existing.clone();
        }

        let (appended_at, position) = match self.entries.last() {
            Some(last) => (now.max(last.appended_at), last.position + 1),
            None => (now, 0),
        };

        let entry = Entry {
            playlist_id,
            image_id,
            appended_at,
            position,
            current: self.entries.is_empty(),
        };

        self.index.insert(image_id, self.entries.len());
        self.entries.push(entry.clone());
        entry
    }

    /// Remplit un ring vide lors d'une création groupée
    ///
    /// Toutes les entrées partagent `now` ; la position est l'index dans la
    /// requête et la première entrée devient courante.
    pub fn insert_initial(
        &mut self,
        playlist_id: PlaylistId,
        image_ids: &[ImageId],
        now: DateTime<Utc>,
    ) -> Vec<Entry> {
        debug_assert!(self.is_empty(), "insert_initial on a non-empty ring");

        let created: Vec<Entry> = image_ids
            .iter()
            .enumerate()
            .map(|(position, &image_id)| Entry {
                playlist_id,
                image_id,
                appended_at: now,
                position: position as i64,
                current: position == 0,
            })
            .collect();

        self.entries.extend(created.iter().cloned());
        self.reindex();
        created
    }

    /// Retire une image du ring (sans toucher au pointeur courant)
    pub fn remove(&mut self, image_id: ImageId) -> Option<Entry> {
        let pos = self.index.get(&image_id).copied()?;
        let removed = self.entries.remove(pos);
        self.reindex();
        Some(removed)
    }

    /// Exactement une entrée courante si non vide, aucune sinon
    pub fn check_invariant(&self) -> bool {
        let current = self.entries.iter().filter(|entry| entry.current).count();
        if self.entries.is_empty() {
            current == 0
        } else {
            current == 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const PL: PlaylistId = PlaylistId(1);

    fn ring_of(ids: &[i64]) -> Ring {
        let mut ring = Ring::default();
        let ids: Vec<ImageId> = ids.iter().map(|&id| ImageId(id)).collect();
        ring.insert_initial(PL, &ids, Utc::now());
        ring
    }

    fn order(ring: &Ring) -> Vec<i64> {
        ring.iter().map(|entry| entry.image_id.0).collect()
    }

    #[test]
    fn test_successor_wraps_around() {
        let ring = ring_of(&[10, 20, 30]);
        assert_eq!(ring.successor(ImageId(10)).unwrap().image_id, ImageId(20));
        assert_eq!(ring.successor(ImageId(20)).unwrap().image_id, ImageId(30));
        assert_eq!(ring.successor(ImageId(30)).unwrap().image_id, ImageId(10));
        assert!(ring.successor(ImageId(99)).is_none());
    }

    #[test]
    fn test_single_entry_is_its_own_successor() {
        let ring = ring_of(&[7]);
        assert_eq!(ring.successor(ImageId(7)).unwrap().image_id, ImageId(7));
    }

    #[test]
    fn test_same_timestamp_breaks_ties_by_position() {
        let now = Utc::now();
        let entry = |image: i64, position: i64| Entry {
            playlist_id: PL,
            image_id: ImageId(image),
            appended_at: now,
            position,
            current: position == 0,
        };
        // Ordre d'arrivée volontairement mélangé
        let ring = Ring::new(vec![entry(3, 2), entry(1, 0), entry(2, 1)]);
        assert_eq!(order(&ring), vec![1, 2, 3]);
    }

    #[test]
    fn test_designate_current_moves_single_pointer() {
        let mut ring = ring_of(&[1, 2, 3]);
        assert_eq!(ring.current().unwrap().image_id, ImageId(1));

        let changed = ring.designate_current(ImageId(3)).unwrap();
        assert_eq!(changed.len(), 2);
        assert_eq!(changed[0].image_id, ImageId(1));
        assert!(!changed[0].current);
        assert_eq!(changed[1].image_id, ImageId(3));
        assert!(changed[1].current);
        assert!(ring.check_invariant());

        // Déjà courante : rien à persister
        assert!(ring.designate_current(ImageId(3)).unwrap().is_empty());
        assert!(ring.designate_current(ImageId(42)).is_none());
    }

    #[test]
    fn test_insert_tail_orders_after_existing() {
        let mut ring = ring_of(&[1, 2]);
        // Horloge en retard : la clé doit rester strictement croissante
        let past = Utc::now() - Duration::seconds(60);
        let entry = ring.insert_tail(PL, ImageId(3), past);
        assert!(!entry.current);
        assert_eq!(entry.position, 2);
        assert_eq!(order(&ring), vec![1, 2, 3]);
        assert_eq!(ring.successor(ImageId(3)).unwrap().image_id, ImageId(1));

        let again = ring.insert_tail(PL, ImageId(3), Utc::now());
        assert_eq!(again, entry);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_insert_tail_on_empty_ring_is_current() {
        let mut ring = Ring::default();
        let entry = ring.insert_tail(PL, ImageId(5), Utc::now());
        assert!(entry.current);
        assert!(ring.check_invariant());
    }

    #[test]
    fn test_remove_keeps_relative_order() {
        let mut ring = ring_of(&[1, 2, 3, 4]);
        let removed = ring.remove(ImageId(2)).unwrap();
        assert_eq!(removed.image_id, ImageId(2));
        assert_eq!(order(&ring), vec![1, 3, 4]);
        assert_eq!(ring.successor(ImageId(1)).unwrap().image_id, ImageId(3));
        assert!(ring.remove(ImageId(2)).is_none());
    }

    #[test]
    fn test_full_circle_visits_every_entry_once() {
        let mut ring = ring_of(&[1, 2, 3, 4, 5]);
        let mut visited = Vec::new();
        for _ in 0..ring.len() {
            let current = ring.current().unwrap().image_id;
            visited.push(current.0);
            let next = ring.successor(current).unwrap().image_id;
            ring.designate_current(next);
            assert!(ring.check_invariant());
        }
        assert_eq!(visited, vec![1, 2, 3, 4, 5]);
        assert_eq!(ring.current().unwrap().image_id, ImageId(1));
    }
}
