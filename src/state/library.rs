use rusqlite::{Connection, ErrorCode, Result as SqlResult};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::data::{Annotation, ImageRecord};
use crate::editor::store::SaveBatch;
use crate::geometry::Rect;

/// Errors surfaced by the annotation catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("image {0} does not exist")]
    ImageNotFound(i64),
    #[error("rectangle has no area: {0:?}")]
    InvalidRectangle(Rect),
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Outcome of a directory sync
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncReport {
    pub added: usize,
    pub skipped: usize,
}

/// The Library manages the SQLite annotation catalog.
/// It stores the known images (deduplicated by path) and the rectangle
/// annotations attached to each of them.
pub struct Library {
    conn: Connection,
    db_path: PathBuf,
}

impl Library {
    /// Create a new Library instance and initialize the database.
    ///
    /// The database file is created in the user's data directory:
    /// - Linux: ~/.local/share/snap-annotator/annotations.db
    /// - macOS: ~/Library/Application Support/snap-annotator/annotations.db
    /// - Windows: %APPDATA%\snap-annotator\annotations.db
    pub fn new() -> SqlResult<Self> {
        let db_path = Self::get_db_path();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .expect("Failed to create application data directory");
        }

        println!("📁 Database initialized at: {}", db_path.display());
        Self::open(&db_path)
    }

    /// Open (or create) the catalog at an explicit path
    pub fn open(db_path: &Path) -> SqlResult<Self> {
        let conn = Connection::open(db_path)?;
        let mut library = Library {
            conn,
            db_path: db_path.to_path_buf(),
        };
        library.init()?;
        Ok(library)
    }

    /// Get the path where the database should be stored
    fn get_db_path() -> PathBuf {
        let mut path = dirs::data_dir()
            .or_else(|| dirs::home_dir())
            .expect("Could not determine user data directory");

        path.push("snap-annotator");
        path.push("annotations.db");
        path
    }

    fn init(&mut self) -> SqlResult<()> {
        // Cascade from images to annotations relies on this pragma
        self.conn.execute_batch("PRAGMA foreign_keys = ON")?;
        self.init_schema()
    }

    /// Initialize the database schema.
    /// Creates all necessary tables and indexes if they don't exist.
    fn init_schema(&mut self) -> SqlResult<()> {
        // Images table: one row per discovered file, deduplicated by path
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS images (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                path            TEXT NOT NULL UNIQUE,
                filename        TEXT NOT NULL,
                imported_at     INTEGER NOT NULL
            )",
            [],
        )?;

        // Annotations table: rectangle per row, owned by exactly one image.
        // Deleting an image removes its annotations with it.
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS annotations (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                image_id        INTEGER NOT NULL,
                x               REAL NOT NULL,
                y               REAL NOT NULL,
                width           REAL NOT NULL,
                height          REAL NOT NULL,
                FOREIGN KEY(image_id) REFERENCES images(id) ON DELETE CASCADE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_annotations_image_id
             ON annotations(image_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_images_imported_at
             ON images(imported_at DESC)",
            [],
        )?;

        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Get a count of images in the catalog
    pub fn image_count(&self) -> SqlResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get all known images, newest first
    pub fn list_images(&self) -> SqlResult<Vec<ImageRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, filename, path FROM images ORDER BY imported_at DESC, id DESC")?;

        let image_iter = stmt.query_map([], |row| {
            Ok(ImageRecord {
                id: row.get(0)?,
                filename: row.get(1)?,
                path: row.get(2)?,
            })
        })?;

        let mut images = Vec::new();
        for image in image_iter {
            images.push(image?);
        }

        Ok(images)
    }

    /// Idempotent upsert-by-path: paths already in the catalog are left
    /// untouched, new paths get a freshly assigned image row.
    pub fn sync_image_paths(&self, paths: &[String]) -> SqlResult<SyncReport> {
        let mut report = SyncReport::default();

        for path in paths {
            let filename = Path::new(path)
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();

            let result = self.conn.execute(
                "INSERT INTO images (path, filename, imported_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![path, &filename, chrono::Utc::now().timestamp()],
            );

            match result {
                Ok(_) => report.added += 1,
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    // Already known by path
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    pub fn image_exists(&self, image_id: i64) -> SqlResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM images WHERE id = ?1",
            [image_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// All annotations stored for an image; empty if none
    pub fn get_annotations(&self, image_id: i64) -> SqlResult<Vec<Annotation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, image_id, x, y, width, height FROM annotations
             WHERE image_id = ?1 ORDER BY id",
        )?;

        let annotation_iter = stmt.query_map([image_id], |row| {
            Ok(Annotation {
                id: row.get(0)?,
                image_id: row.get(1)?,
                x: row.get(2)?,
                y: row.get(3)?,
                width: row.get(4)?,
                height: row.get(5)?,
            })
        })?;

        let mut annotations = Vec::new();
        for annotation in annotation_iter {
            annotations.push(annotation?);
        }

        Ok(annotations)
    }

    /// Insert a new annotation and return it with its assigned ID.
    /// Fails when the referenced image does not exist or the rectangle
    /// has no area.
    pub fn create_annotation(&self, annotation: &Annotation) -> CatalogResult<Annotation> {
        Self::validate_rect(&annotation.rect())?;
        if !self.image_exists(annotation.image_id)? {
            return Err(CatalogError::ImageNotFound(annotation.image_id));
        }

        self.conn.execute(
            "INSERT INTO annotations (image_id, x, y, width, height)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                annotation.image_id,
                annotation.x,
                annotation.y,
                annotation.width,
                annotation.height
            ],
        )?;

        let mut created = *annotation;
        created.id = self.conn.last_insert_rowid();
        Ok(created)
    }

    /// Replace an annotation's geometry. Unknown IDs are a benign no-op,
    /// consistent with idempotent retry.
    pub fn update_annotation(&self, id: i64, rect: Rect) -> CatalogResult<()> {
        Self::validate_rect(&rect)?;
        self.conn.execute(
            "UPDATE annotations SET x = ?1, y = ?2, width = ?3, height = ?4 WHERE id = ?5",
            rusqlite::params![rect.x, rect.y, rect.width, rect.height, id],
        )?;
        Ok(())
    }

    /// Delete an annotation. Unknown IDs are a benign no-op.
    pub fn delete_annotation(&self, id: i64) -> SqlResult<()> {
        self.conn
            .execute("DELETE FROM annotations WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Create or update based on ID presence
    pub fn save_annotation(&self, annotation: &Annotation) -> CatalogResult<Annotation> {
        if annotation.is_persisted() {
            self.update_annotation(annotation.id, annotation.rect())?;
            Ok(*annotation)
        } else {
            self.create_annotation(annotation)
        }
    }

    /// Apply a whole create/update/delete batch in one transaction, so a
    /// save-all is atomic: either every pending mutation for the image
    /// commits or none do. Returns (placeholder, assigned) ID pairs for
    /// the created annotations.
    pub fn save_batch(
        &mut self,
        image_id: i64,
        batch: &SaveBatch,
    ) -> CatalogResult<Vec<(i64, i64)>> {
        if !self.image_exists(image_id)? {
            return Err(CatalogError::ImageNotFound(image_id));
        }

        let tx = self.conn.transaction()?;
        let mut assigned = Vec::with_capacity(batch.creates.len());

        for annotation in &batch.creates {
            Self::validate_rect(&annotation.rect())?;
            tx.execute(
                "INSERT INTO annotations (image_id, x, y, width, height)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    image_id,
                    annotation.x,
                    annotation.y,
                    annotation.width,
                    annotation.height
                ],
            )?;
            assigned.push((annotation.id, tx.last_insert_rowid()));
        }

        for annotation in &batch.updates {
            Self::validate_rect(&annotation.rect())?;
            tx.execute(
                "UPDATE annotations SET x = ?1, y = ?2, width = ?3, height = ?4 WHERE id = ?5",
                rusqlite::params![
                    annotation.x,
                    annotation.y,
                    annotation.width,
                    annotation.height,
                    annotation.id
                ],
            )?;
        }

        for id in &batch.deletes {
            tx.execute("DELETE FROM annotations WHERE id = ?1", [id])?;
        }

        tx.commit()?;
        Ok(assigned)
    }

    /// Remove an image; its annotations cascade away with it
    pub fn delete_image(&self, image_id: i64) -> SqlResult<()> {
        self.conn
            .execute("DELETE FROM images WHERE id = ?1", [image_id])?;
        Ok(())
    }

    fn validate_rect(rect: &Rect) -> CatalogResult<()> {
        if rect.is_valid() {
            Ok(())
        } else {
            Err(CatalogError::InvalidRectangle(*rect))
        }
    }
}

#[cfg(test)]
impl Library {
    /// An in-memory catalog, used by tests
    fn open_in_memory() -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        let mut library = Library {
            conn,
            db_path: PathBuf::new(),
        };
        library.init()?;
        Ok(library)
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory catalog seeded with one image; returns the image's ID
    fn library_with_image() -> (Library, i64) {
        let library = Library::open_in_memory().unwrap();
        library
            .sync_image_paths(&["/images/photo_a.jpg".to_string()])
            .unwrap();
        let id = library.list_images().unwrap()[0].id;
        (library, id)
    }

    #[test]
    fn test_sync_is_idempotent_by_path() {
        let library = Library::open_in_memory().unwrap();
        let paths = vec![
            "/images/a.jpg".to_string(),
            "/images/b.jpg".to_string(),
        ];

        let first = library.sync_image_paths(&paths).unwrap();
        assert_eq!(first.added, 2);
        assert_eq!(first.skipped, 0);

        let second = library.sync_image_paths(&paths).unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.skipped, 2);

        assert_eq!(library.image_count().unwrap(), 2);
    }

    #[test]
    fn test_create_annotation_assigns_id() {
        let (library, image_id) = library_with_image();
        let unsaved = Annotation::new(-1, image_id, Rect::new(5.0, 5.0, 10.0, 10.0));

        let created = library.create_annotation(&unsaved).unwrap();
        assert!(created.is_persisted());
        assert_eq!(created.rect(), unsaved.rect());
    }

    #[test]
    fn test_create_for_unknown_image_fails() {
        let library = Library::open_in_memory().unwrap();
        let unsaved = Annotation::new(-1, 999, Rect::new(5.0, 5.0, 10.0, 10.0));

        let err = library.create_annotation(&unsaved).unwrap_err();
        assert!(matches!(err, CatalogError::ImageNotFound(999)));
    }

    #[test]
    fn test_degenerate_rectangle_is_rejected_before_persistence() {
        let (library, image_id) = library_with_image();
        let unsaved = Annotation::new(-1, image_id, Rect::new(5.0, 5.0, 0.0, 10.0));

        let err = library.create_annotation(&unsaved).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRectangle(_)));
    }

    #[test]
    fn test_load_delete_scenario() {
        let (library, image_id) = library_with_image();
        library
            .create_annotation(&Annotation::new(-1, image_id, Rect::new(5.0, 5.0, 10.0, 10.0)))
            .unwrap();

        let stored = library.get_annotations(image_id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].rect(), Rect::new(5.0, 5.0, 10.0, 10.0));

        library.delete_annotation(stored[0].id).unwrap();
        assert!(library.get_annotations(image_id).unwrap().is_empty());
    }

    #[test]
    fn test_update_and_delete_of_absent_id_are_noops() {
        let (library, image_id) = library_with_image();

        library
            .update_annotation(12345, Rect::new(1.0, 1.0, 2.0, 2.0))
            .unwrap();
        library.delete_annotation(12345).unwrap();

        assert!(library.get_annotations(image_id).unwrap().is_empty());
    }

    #[test]
    fn test_save_annotation_is_idempotent() {
        let (library, image_id) = library_with_image();
        let created = library
            .save_annotation(&Annotation::new(0, image_id, Rect::new(5.0, 5.0, 10.0, 10.0)))
            .unwrap();

        // Second save with the assigned ID and identical geometry
        let resaved = library.save_annotation(&created).unwrap();
        assert_eq!(resaved, created);

        let stored = library.get_annotations(image_id).unwrap();
        assert_eq!(stored, vec![created]);
    }

    #[test]
    fn test_save_batch_commits_all_mutations_at_once() {
        let (mut library, image_id) = library_with_image();
        let keep = library
            .create_annotation(&Annotation::new(-1, image_id, Rect::new(0.0, 0.0, 5.0, 5.0)))
            .unwrap();
        let doomed = library
            .create_annotation(&Annotation::new(-1, image_id, Rect::new(50.0, 50.0, 5.0, 5.0)))
            .unwrap();

        let batch = SaveBatch {
            creates: vec![Annotation::new(-1, image_id, Rect::new(20.0, 20.0, 5.0, 5.0))],
            updates: vec![Annotation::new(keep.id, image_id, Rect::new(1.0, 1.0, 5.0, 5.0))],
            deletes: vec![doomed.id],
        };

        let assigned = library.save_batch(image_id, &batch).unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].0, -1);

        let stored = library.get_annotations(image_id).unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().any(|a| a.rect() == Rect::new(1.0, 1.0, 5.0, 5.0)));
        assert!(stored.iter().any(|a| a.rect() == Rect::new(20.0, 20.0, 5.0, 5.0)));
        assert!(!stored.iter().any(|a| a.id == doomed.id));
    }

    #[test]
    fn test_save_batch_is_all_or_nothing() {
        let (mut library, image_id) = library_with_image();

        let batch = SaveBatch {
            creates: vec![
                Annotation::new(-1, image_id, Rect::new(0.0, 0.0, 5.0, 5.0)),
                // Second create is invalid, so the whole batch must fail
                Annotation::new(-2, image_id, Rect::new(0.0, 0.0, 0.0, 5.0)),
            ],
            updates: vec![],
            deletes: vec![],
        };

        assert!(library.save_batch(image_id, &batch).is_err());
        assert!(library.get_annotations(image_id).unwrap().is_empty());
    }

    #[test]
    fn test_save_batch_for_unknown_image_fails() {
        let mut library = Library::open_in_memory().unwrap();
        let batch = SaveBatch {
            creates: vec![Annotation::new(-1, 999, Rect::new(0.0, 0.0, 5.0, 5.0))],
            updates: vec![],
            deletes: vec![],
        };
        assert!(matches!(
            library.save_batch(999, &batch),
            Err(CatalogError::ImageNotFound(999))
        ));
    }

    #[test]
    fn test_deleting_an_image_cascades_to_annotations() {
        let (library, image_id) = library_with_image();
        library
            .create_annotation(&Annotation::new(-1, image_id, Rect::new(5.0, 5.0, 10.0, 10.0)))
            .unwrap();

        library.delete_image(image_id).unwrap();

        assert_eq!(library.image_count().unwrap(), 0);
        assert!(library.get_annotations(image_id).unwrap().is_empty());
    }
}
