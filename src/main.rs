use iced::widget::{button, canvas, column, container, row, scrollable, text, Column};
use iced::{Alignment, Element, Length, Task, Theme};
use rfd::FileDialog;
use std::path::PathBuf;
use walkdir::WalkDir;

mod editor;
mod geometry;
mod state;
mod ui;

use editor::store::SaveBatch;
use editor::Editor;
use state::data::{annotations_from_json, annotations_to_json, ImageRecord};
use state::library::{Library, SyncReport};
use ui::canvas::{AnnotationCanvas, CanvasMessage};

/// The image currently open in the editor
struct CurrentImage {
    record: ImageRecord,
    background: Option<iced::widget::image::Handle>,
    /// Native pixel dimensions
    width: f64,
    height: f64,
}

/// Result of loading an image and its stored annotations
#[derive(Debug, Clone)]
struct LoadedImage {
    record: ImageRecord,
    /// Stored annotations in the JSON wire format
    annotations_json: String,
    width: u32,
    height: u32,
}

/// Main application state
struct SnapAnnotator {
    /// The annotation catalog database
    library: Library,
    /// All known images, newest first
    images: Vec<ImageRecord>,
    /// The annotation editor core
    editor: Editor,
    current: Option<CurrentImage>,
    /// Status message to display to the user
    status: String,
    /// Bumped on every image switch so stale async results are dropped
    session: u64,
    saves: SaveScheduler,
    /// Snapshot of the batch currently being written, reconciled into
    /// the store when its completion arrives
    pending_batch: Option<SaveBatch>,
}

/// Serializes batch saves: at most one in flight, one queued behind it
#[derive(Debug, Default)]
struct SaveScheduler {
    in_flight: bool,
    queued: bool,
}

impl SaveScheduler {
    /// Register a save request. Returns true when it should start now;
    /// false when it was queued behind the one in flight.
    fn request(&mut self) -> bool {
        if self.in_flight {
            self.queued = true;
            false
        } else {
            self.in_flight = true;
            true
        }
    }

    /// The in-flight save resolved (applied, failed, or dropped as
    /// stale). Returns true when a queued save should start now.
    fn complete(&mut self) -> bool {
        self.in_flight = false;
        std::mem::take(&mut self.queued)
    }

    /// Drop a queued save on image switch. The in-flight one still
    /// resolves on its own and is handled by the session check.
    fn cancel_queued(&mut self) {
        self.queued = false;
    }
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// User clicked the "Open Folder" button
    OpenFolder,
    /// Background folder scan completed
    ScanComplete(Result<SyncReport, String>),
    /// User picked an image from the sidebar
    SelectImage(i64),
    /// Stored annotations arrived for the selected image
    ImageLoaded(u64, Result<LoadedImage, String>),
    /// Pointer/keyboard event from the annotation canvas
    Canvas(CanvasMessage),
    /// User armed the rectangle tool
    ArmRectangleTool,
    /// User clicked the Delete button
    DeleteSelected,
    /// User clicked the Save button
    Save,
    /// A batch save resolved
    SaveComplete(u64, Result<Vec<(i64, i64)>, String>),
}

impl SnapAnnotator {
    /// Create a new instance of the application
    fn new() -> (Self, Task<Message>) {
        // If this fails, we panic because the app cannot function without its database
        let library = Library::new()
            .expect("Failed to initialize database. Check permissions and disk space.");

        let image_count = library.image_count().unwrap_or(0);
        println!("🖼️  Snap Annotator initialized with {} images", image_count);

        let images = library.list_images().unwrap_or_default();
        let status = format!("Ready. {} images in catalog.", image_count);

        (
            SnapAnnotator {
                library,
                images,
                editor: Editor::new(),
                current: None,
                status,
                session: 0,
                saves: SaveScheduler::default(),
                pending_batch: None,
            },
            Task::none(),
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::OpenFolder => {
                // Show the native folder picker dialog
                let folder = FileDialog::new()
                    .set_title("Select Folder with Images")
                    .pick_folder();

                if let Some(folder_path) = folder {
                    self.status = format!("Scanning {}...", folder_path.display());
                    let db_path = self.library.path().clone();

                    return Task::perform(
                        scan_folder_async(folder_path, db_path),
                        Message::ScanComplete,
                    );
                }

                Task::none()
            }

            Message::ScanComplete(Ok(report)) => {
                self.images = self.library.list_images().unwrap_or_default();
                self.status = format!(
                    "✅ Scan complete! Added {} images, skipped {} already known.",
                    report.added, report.skipped
                );
                Task::none()
            }

            Message::ScanComplete(Err(e)) => {
                self.status = format!("❌ Scan failed: {}", e);
                Task::none()
            }

            Message::SelectImage(image_id) => {
                let Some(record) = self.images.iter().find(|i| i.id == image_id).cloned()
                else {
                    return Task::none();
                };

                if self.current.is_some() && self.editor.store().has_unsaved_changes() {
                    println!("⚠️  Discarding unsaved annotations for the previous image");
                }

                // Any still-pending load/save belongs to the previous
                // image; its result must not touch the new state.
                self.session += 1;
                self.saves.cancel_queued();
                self.status = format!("Loading {}...", record.filename);

                let session = self.session;
                let db_path = self.library.path().clone();
                Task::perform(load_image_async(record, db_path), move |result| {
                    Message::ImageLoaded(session, result)
                })
            }

            Message::ImageLoaded(session, result) => {
                if session != self.session {
                    println!("🕰️  Dropping stale load result");
                    return Task::none();
                }

                match result {
                    Ok(loaded) => {
                        let annotations = match annotations_from_json(&loaded.annotations_json) {
                            Ok(annotations) => annotations,
                            Err(e) => {
                                self.status = format!("❌ Could not read annotations: {}", e);
                                return Task::none();
                            }
                        };

                        let count = annotations.len();
                        self.editor.load_image(loaded.record.id, annotations);
                        self.current = Some(CurrentImage {
                            background: Some(iced::widget::image::Handle::from_path(
                                &loaded.record.path,
                            )),
                            record: loaded.record,
                            width: loaded.width as f64,
                            height: loaded.height as f64,
                        });
                        self.status = format!("Loaded {} annotations.", count);
                    }
                    Err(e) => {
                        self.status = format!("❌ Failed to load image: {}", e);
                    }
                }
                Task::none()
            }

            Message::Canvas(event) => {
                if self.current.is_some() {
                    match event {
                        CanvasMessage::Pressed(p) => self.editor.pointer_down(p),
                        CanvasMessage::Moved(p) => self.editor.pointer_move(p),
                        CanvasMessage::Released(p) => self.editor.pointer_up(p),
                        CanvasMessage::DeletePressed => {
                            if self.editor.delete_selected() {
                                self.status = "Annotation deleted.".to_string();
                            }
                        }
                    }
                }
                Task::none()
            }

            Message::ArmRectangleTool => {
                self.editor.arm_rectangle_tool();
                self.status = "Rectangle tool armed: drag to draw one rectangle.".to_string();
                Task::none()
            }

            Message::DeleteSelected => {
                if self.editor.delete_selected() {
                    self.status = "Annotation deleted.".to_string();
                } else {
                    self.status = "No annotation selected.".to_string();
                }
                Task::none()
            }

            Message::Save => self.begin_save(),

            Message::SaveComplete(session, result) => {
                let run_queued = self.saves.complete();

                if session != self.session {
                    // The editor moved on to a different image while this
                    // save was in flight; let it complete but never apply
                    // its result to the current state. A save queued for
                    // the image now showing still has to run.
                    println!("🕰️  Dropping stale save result");
                    self.pending_batch = None;
                    if run_queued {
                        return self.begin_save();
                    }
                    return Task::none();
                }

                match result {
                    Ok(assigned) => {
                        if let Some(batch) = self.pending_batch.take() {
                            self.editor.apply_saved(&batch, &assigned);
                        }
                        self.status = "✅ Annotations saved.".to_string();
                    }
                    Err(e) => {
                        // In-memory state is untouched so nothing is lost;
                        // the user may retry the save.
                        self.pending_batch = None;
                        self.status = format!("❌ Save failed: {}", e);
                    }
                }

                if run_queued {
                    return self.begin_save();
                }
                Task::none()
            }
        }
    }

    /// Kick off a batch save, or queue one if a save is already in flight
    fn begin_save(&mut self) -> Task<Message> {
        if self.current.is_none() {
            self.status = "No image loaded.".to_string();
            return Task::none();
        }

        let batch = self.editor.store().save_batch();
        if batch.is_empty() {
            self.status = "Nothing to save.".to_string();
            return Task::none();
        }

        if !self.saves.request() {
            self.status = "Save queued...".to_string();
            return Task::none();
        }

        self.pending_batch = Some(batch.clone());
        self.status = "Saving...".to_string();

        let session = self.session;
        let image_id = self.editor.store().image_id();
        let db_path = self.library.path().clone();
        Task::perform(
            save_batch_async(db_path, image_id, batch),
            move |result| Message::SaveComplete(session, result),
        )
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let mut sidebar = Column::new().spacing(4).padding(8);
        for image in &self.images {
            sidebar = sidebar.push(
                button(text(&image.filename).size(14))
                    .on_press(Message::SelectImage(image.id))
                    .width(Length::Fill),
            );
        }

        let toolbar = row![
            button("Open Folder").on_press(Message::OpenFolder).padding(8),
            button("Rectangle")
                .on_press_maybe(self.current.is_some().then_some(Message::ArmRectangleTool))
                .padding(8),
            button("Delete")
                .on_press_maybe(self.editor.selection().map(|_| Message::DeleteSelected))
                .padding(8),
            button("Save")
                .on_press_maybe(self.current.is_some().then_some(Message::Save))
                .padding(8),
        ]
        .spacing(8)
        .align_y(Alignment::Center);

        let title: Element<Message> = match &self.current {
            Some(current) => text(&current.record.filename).size(16).into(),
            None => text("No image loaded").size(16).into(),
        };

        let surface: Element<Message> = match &self.current {
            Some(current) => canvas(AnnotationCanvas {
                editor: &self.editor,
                background: current.background.as_ref(),
                image_size: (current.width, current.height),
            })
            .width(Length::Fill)
            .height(Length::Fill)
            .into(),
            None => container(text("Open a folder and pick an image to annotate").size(18))
                .width(Length::Fill)
                .height(Length::Fill)
                .center_x(Length::Fill)
                .center_y(Length::Fill)
                .into(),
        };

        let main_panel = column![toolbar, title, surface, text(&self.status).size(14)]
            .spacing(8)
            .padding(8);

        row![
            scrollable(sidebar).width(Length::Fixed(220.0)),
            main_panel,
        ]
        .into()
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn main() -> iced::Result {
    iced::application(
        "Snap Annotator",
        SnapAnnotator::update,
        SnapAnnotator::view,
    )
    .theme(SnapAnnotator::theme)
    .centered()
    .run_with(SnapAnnotator::new)
}

/// Supported image file extensions
const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff"];

/// Async function to scan a folder and sync every image file into the
/// catalog. Runs off the UI loop; opens its own database connection
/// because rusqlite connections cannot be shared across threads.
async fn scan_folder_async(
    folder_path: PathBuf,
    db_path: PathBuf,
) -> Result<SyncReport, String> {
    println!("🔍 Scanning folder: {}", folder_path.display());

    let mut paths = Vec::new();
    for entry in WalkDir::new(&folder_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(extension) = path.extension() else {
            continue;
        };
        let ext = extension.to_string_lossy().to_lowercase();
        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }

        paths.push(path.to_string_lossy().to_string());
    }

    let library = Library::open(&db_path).map_err(|e| e.to_string())?;
    let report = library.sync_image_paths(&paths).map_err(|e| e.to_string())?;

    println!(
        "✅ Scan complete: {} new, {} skipped",
        report.added, report.skipped
    );
    Ok(report)
}

/// Async function to fetch an image's stored annotations (as the JSON
/// wire format) together with its native pixel dimensions.
async fn load_image_async(
    record: ImageRecord,
    db_path: PathBuf,
) -> Result<LoadedImage, String> {
    let (width, height) = image::image_dimensions(&record.path)
        .map_err(|e| format!("Cannot read {}: {}", record.path, e))?;

    let library = Library::open(&db_path).map_err(|e| e.to_string())?;
    let annotations = library
        .get_annotations(record.id)
        .map_err(|e| e.to_string())?;
    let annotations_json = annotations_to_json(&annotations).map_err(|e| e.to_string())?;

    println!(
        "📐 {} is {}x{} with {} annotations",
        record.filename,
        width,
        height,
        annotations.len()
    );

    Ok(LoadedImage {
        record,
        annotations_json,
        width,
        height,
    })
}

/// Async function to persist one save batch in a single transaction.
/// Returns the (placeholder, assigned) ID pairs for created annotations.
async fn save_batch_async(
    db_path: PathBuf,
    image_id: i64,
    batch: SaveBatch,
) -> Result<Vec<(i64, i64)>, String> {
    let mut library = Library::open(&db_path).map_err(|e| e.to_string())?;
    library
        .save_batch(image_id, &batch)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::SaveScheduler;

    #[test]
    fn test_save_scheduler_serializes_requests() {
        let mut saves = SaveScheduler::default();
        assert!(saves.request());
        assert!(!saves.request()); // queued behind the in-flight save
        assert!(!saves.request()); // the queue is one deep

        assert!(saves.complete()); // dispatch the queued save
        assert!(saves.request()); // the dispatched save registers again
        assert!(!saves.complete());
    }

    #[test]
    fn test_stale_completion_still_dispatches_queued_save() {
        let mut saves = SaveScheduler::default();
        assert!(saves.request()); // save for the previous image
        assert!(!saves.request()); // queued for the image now showing

        // The completion of the stale save must not swallow the save
        // queued after the image switch.
        assert!(saves.complete());
    }

    #[test]
    fn test_image_switch_cancels_only_the_queued_save() {
        let mut saves = SaveScheduler::default();
        assert!(saves.request());
        assert!(!saves.request());

        saves.cancel_queued();
        assert!(!saves.complete());
        assert!(saves.request());
    }
}
