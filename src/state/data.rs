/// Shared data structures for the application state
///
/// These structs represent the data model that flows between
/// the database layer, the editor, and the UI layer, plus the JSON
/// wire format used to exchange annotation sets.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// Represents a single image in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    /// Unique database ID
    pub id: i64,
    /// Filename only (e.g., "IMG_0001.jpg")
    pub filename: String,
    /// Full path to the image file
    pub path: String,
}

/// A rectangle annotation tied to one image.
///
/// `id` is the database ID once persisted. Unsaved annotations carry a
/// negative placeholder handed out by the store client; the wire format
/// writes those as `0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub image_id: i64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Annotation {
    pub fn new(id: i64, image_id: i64, rect: Rect) -> Self {
        Self {
            id,
            image_id,
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }
    }

    /// True once the persistence layer has assigned a real ID
    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }

    pub fn rect(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }

    pub fn set_rect(&mut self, rect: Rect) {
        self.x = rect.x;
        self.y = rect.y;
        self.width = rect.width;
        self.height = rect.height;
    }
}

/// Serialize an annotation set to the JSON wire format.
///
/// Entries with a degenerate or non-finite rectangle are logged and
/// skipped; one bad entry never aborts the whole serialization. Placeholder
/// IDs are written as `0` so the receiver knows the entry is unsaved.
pub fn annotations_to_json(annotations: &[Annotation]) -> Result<String, serde_json::Error> {
    let wire: Vec<Annotation> = annotations
        .iter()
        .filter(|a| {
            if a.rect().is_valid() {
                true
            } else {
                eprintln!("⚠️  Skipping invalid annotation during serialization: {:?}", a);
                false
            }
        })
        .map(|a| Annotation {
            id: a.id.max(0),
            ..*a
        })
        .collect();

    serde_json::to_string(&wire)
}

/// Parse an annotation set from the JSON wire format.
///
/// The input must be a JSON array; entries inside it that fail
/// required-field validation are skipped with a warning rather than
/// failing the whole load.
pub fn annotations_from_json(json: &str) -> Result<Vec<Annotation>, serde_json::Error> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(json)?;

    let mut annotations = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<Annotation>(entry.clone()) {
            Ok(annotation) => annotations.push(annotation),
            Err(e) => {
                eprintln!("⚠️  Skipping malformed annotation entry {}: {}", entry, e);
            }
        }
    }

    Ok(annotations)
}
