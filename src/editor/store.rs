/// In-memory annotation set for the currently loaded image
///
/// The store is the editor's single source of truth between loads and
/// saves. It hands out negative placeholder IDs for annotations the
/// persistence layer has not seen yet, and keeps just enough bookkeeping
/// (modified persisted IDs, buffered deletions) to build a batch save.
///
/// Single-threaded by design: every mutation happens on the UI event loop.

use std::collections::BTreeSet;

use crate::geometry::{Point, Rect};
use crate::state::data::Annotation;

/// Everything the persistence gateway needs for one atomic save
#[derive(Debug, Clone, Default)]
pub struct SaveBatch {
    /// Annotations with placeholder IDs, to be inserted
    pub creates: Vec<Annotation>,
    /// Persisted annotations whose geometry changed since the last save
    pub updates: Vec<Annotation>,
    /// Persisted IDs removed locally since the last save
    pub deletes: Vec<i64>,
}

impl SaveBatch {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Holds the rectangle set for exactly one image at a time
#[derive(Debug, Default)]
pub struct AnnotationStore {
    image_id: i64,
    annotations: Vec<Annotation>,
    /// Next placeholder ID for unsaved annotations (-1, -2, ...)
    next_placeholder: i64,
    /// Persisted IDs whose geometry changed since load/save
    modified: BTreeSet<i64>,
    /// Persisted IDs removed locally, applied on the next save
    pending_deletes: Vec<i64>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole in-memory set. Called once per image activation;
    /// all pending bookkeeping for the previous image is discarded.
    pub fn load(&mut self, image_id: i64, annotations: Vec<Annotation>) {
        self.image_id = image_id;
        self.annotations = annotations;
        self.next_placeholder = -1;
        self.modified.clear();
        self.pending_deletes.clear();
    }

    pub fn image_id(&self) -> i64 {
        self.image_id
    }

    /// Append a new unsaved annotation and return its placeholder ID
    pub fn add(&mut self, rect: Rect) -> i64 {
        let id = self.next_placeholder;
        self.next_placeholder -= 1;
        self.annotations.push(Annotation::new(id, self.image_id, rect));
        id
    }

    /// Replace the geometry of an existing entry in place.
    /// Returns false (a no-op) when the ID is absent.
    pub fn update(&mut self, id: i64, rect: Rect) -> bool {
        match self.annotations.iter_mut().find(|a| a.id == id) {
            Some(annotation) => {
                annotation.set_rect(rect);
                if id > 0 {
                    self.modified.insert(id);
                }
                true
            }
            None => {
                eprintln!("⚠️  update: annotation {} not found", id);
                false
            }
        }
    }

    /// Delete an entry. Returns false (a no-op) when the ID is absent.
    /// Persisted IDs are buffered for deletion on the next save.
    pub fn remove(&mut self, id: i64) -> bool {
        let before = self.annotations.len();
        self.annotations.retain(|a| a.id != id);
        if self.annotations.len() == before {
            eprintln!("⚠️  remove: annotation {} not found", id);
            return false;
        }
        if id > 0 {
            self.modified.remove(&id);
            self.pending_deletes.push(id);
        }
        true
    }

    pub fn get(&self, id: i64) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    /// Read-only snapshot for rendering and serialization
    pub fn all(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Does `rect` overlap any annotation other than `id`?
    pub fn collides_with_others(&self, id: i64, rect: &Rect) -> bool {
        self.annotations
            .iter()
            .filter(|a| a.id != id)
            .any(|a| a.rect().intersects(rect))
    }

    /// Topmost annotation under the point, if any. Later entries were
    /// added later and sit on top, so scan back to front.
    pub fn hit_test(&self, point: Point) -> Option<i64> {
        self.annotations
            .iter()
            .rev()
            .find(|a| a.rect().contains(point))
            .map(|a| a.id)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.save_batch().is_empty()
    }

    /// Build the create/update/delete batch for the persistence gateway
    pub fn save_batch(&self) -> SaveBatch {
        SaveBatch {
            creates: self
                .annotations
                .iter()
                .filter(|a| !a.is_persisted())
                .copied()
                .collect(),
            updates: self
                .annotations
                .iter()
                .filter(|a| self.modified.contains(&a.id))
                .copied()
                .collect(),
            deletes: self.pending_deletes.clone(),
        }
    }

    /// Reconcile after a successful save: swap placeholder IDs for the
    /// assigned ones and retire exactly the bookkeeping the saved batch
    /// covered. The UI loop stays live while a save runs, so edits made
    /// in flight must stay pending for the next batch. Must only be
    /// called when the whole batch committed.
    pub fn apply_saved(&mut self, batch: &SaveBatch, assigned: &[(i64, i64)]) {
        for &(placeholder, real_id) in assigned {
            match self.annotations.iter_mut().find(|a| a.id == placeholder) {
                Some(annotation) => {
                    annotation.id = real_id;
                    // Moved again while the save ran: the row just
                    // written already holds stale geometry.
                    let saved = batch.creates.iter().find(|c| c.id == placeholder);
                    if saved.is_some_and(|c| c.rect() != annotation.rect()) {
                        self.modified.insert(real_id);
                    }
                }
                // Deleted while the save ran; the committed row has to
                // go on the next save.
                None => self.pending_deletes.push(real_id),
            }
        }

        for saved in &batch.updates {
            let unchanged = self
                .annotations
                .iter()
                .find(|a| a.id == saved.id)
                .map_or(true, |a| a.rect() == saved.rect());
            if unchanged {
                self.modified.remove(&saved.id);
            }
        }

        self.pending_deletes.retain(|id| !batch.deletes.contains(id));
    }
}
