/// Interactive annotation editor core
///
/// This module handles the editor state machine and its in-memory
/// annotation store:
/// - State machine driven by pointer/keyboard transitions (this file)
/// - Annotation Store Client with save bookkeeping (store.rs)
///
/// The editor is headless: it works entirely in image pixel space and
/// never touches the render surface, so every transition is testable
/// without a pointing device. The UI adapter converts display coordinates
/// (already clamped to the canvas) before calling in.

pub mod store;

use crate::geometry::{Point, Rect};
use crate::state::data::Annotation;
use store::{AnnotationStore, SaveBatch};

/// The editor's interaction state.
///
/// The rectangle tool is single-shot: arming it allows exactly one draw
/// gesture, after which the tool disarms again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditorState {
    /// Nothing selected, no tool armed
    Idle,
    /// Rectangle tool selected, waiting for a draw gesture
    ToolArmed,
    /// Active drag creating a new rectangle
    Drawing { anchor: Point, provisional: Rect },
    /// An existing rectangle is the active selection
    Selected { id: i64 },
}

/// An in-progress move gesture on the selected rectangle
#[derive(Debug, Clone, Copy)]
struct MoveDrag {
    id: i64,
    /// Pointer offset from the rectangle's top-left at grab time
    grab_dx: f64,
    grab_dy: f64,
    /// Last position that passed the collision check
    last_valid: Rect,
}

/// The editor state machine plus the store it mutates
#[derive(Debug)]
pub struct Editor {
    store: AnnotationStore,
    state: EditorState,
    drag: Option<MoveDrag>,
}

impl Editor {
    pub fn new() -> Self {
        Self {
            store: AnnotationStore::new(),
            state: EditorState::Idle,
            drag: None,
        }
    }

    /// Seed the editor with the stored annotation set for an image.
    /// Loaded rectangles are accepted as-is, even if they already overlap.
    pub fn load_image(&mut self, image_id: i64, annotations: Vec<Annotation>) {
        self.store.load(image_id, annotations);
        self.state = EditorState::Idle;
        self.drag = None;
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    /// The active selection, if any
    pub fn selection(&self) -> Option<i64> {
        match self.state {
            EditorState::Selected { id } => Some(id),
            _ => None,
        }
    }

    /// The in-progress rectangle during a draw gesture, if any
    pub fn provisional(&self) -> Option<Rect> {
        match self.state {
            EditorState::Drawing { provisional, .. } => Some(provisional),
            _ => None,
        }
    }

    pub fn is_tool_armed(&self) -> bool {
        self.state() == EditorState::ToolArmed
    }

    /// Arm the single-shot rectangle tool. Ignored mid-gesture.
    pub fn arm_rectangle_tool(&mut self) {
        match self.state {
            EditorState::Idle | EditorState::Selected { .. } | EditorState::ToolArmed => {
                self.state = EditorState::ToolArmed;
                self.drag = None;
            }
            EditorState::Drawing { .. } => {}
        }
    }

    /// Pointer pressed at an image-space position
    pub fn pointer_down(&mut self, p: Point) {
        match self.state {
            EditorState::ToolArmed => {
                // Landing on an existing shape suppresses drawing and
                // selects it instead, so overlapping a shape never starts
                // a new draw.
                if let Some(id) = self.store.hit_test(p) {
                    self.select_and_grab(id, p);
                } else {
                    self.state = EditorState::Drawing {
                        anchor: p,
                        provisional: Rect::from_corners(p, p),
                    };
                }
            }
            EditorState::Idle | EditorState::Selected { .. } => {
                match self.store.hit_test(p) {
                    Some(id) => self.select_and_grab(id, p),
                    None => {
                        self.state = EditorState::Idle;
                        self.drag = None;
                    }
                }
            }
            EditorState::Drawing { .. } => {}
        }
    }

    /// Pointer moved to an image-space position
    pub fn pointer_move(&mut self, p: Point) {
        match self.state {
            EditorState::Drawing { anchor, .. } => {
                self.state = EditorState::Drawing {
                    anchor,
                    provisional: Rect::from_corners(anchor, p),
                };
            }
            EditorState::Selected { .. } => {
                if let Some(drag) = self.drag {
                    self.move_selection(drag, p);
                }
            }
            _ => {}
        }
    }

    /// Pointer released at an image-space position
    pub fn pointer_up(&mut self, p: Point) {
        match self.state {
            EditorState::Drawing { anchor, .. } => {
                let finalized = Rect::from_corners(anchor, p);
                // A click with no drag yields a degenerate rectangle;
                // reject it instead of storing a zero-area annotation.
                if finalized.is_valid() {
                    let id = self.store.add(finalized);
                    self.state = EditorState::Selected { id };
                } else {
                    eprintln!("⚠️  Discarding zero-size rectangle at ({}, {})", p.x, p.y);
                    self.state = EditorState::Idle;
                }
            }
            EditorState::Selected { .. } => {
                self.drag = None;
            }
            _ => {}
        }
    }

    /// Delete the active selection (Delete key or toolbar action).
    /// Returns false when nothing is selected.
    pub fn delete_selected(&mut self) -> bool {
        match self.state {
            EditorState::Selected { id } => {
                self.store.remove(id);
                self.state = EditorState::Idle;
                self.drag = None;
                true
            }
            _ => false,
        }
    }

    /// Reconcile after a successful batch save: the store swaps
    /// placeholder IDs for assigned ones, and the selection follows.
    pub fn apply_saved(&mut self, batch: &SaveBatch, assigned: &[(i64, i64)]) {
        self.store.apply_saved(batch, assigned);
        if let EditorState::Selected { id } = self.state {
            if let Some(&(_, real_id)) = assigned.iter().find(|(placeholder, _)| *placeholder == id)
            {
                self.state = EditorState::Selected { id: real_id };
            }
        }
    }

    fn select_and_grab(&mut self, id: i64, p: Point) {
        if let Some(annotation) = self.store.get(id) {
            let rect = annotation.rect();
            self.drag = Some(MoveDrag {
                id,
                grab_dx: p.x - rect.x,
                grab_dy: p.y - rect.y,
                last_valid: rect,
            });
            self.state = EditorState::Selected { id };
        }
    }

    /// One incremental move step. Each step is validated independently:
    /// a candidate that overlaps any other rectangle is rejected and the
    /// shape stays at its last valid position.
    fn move_selection(&mut self, drag: MoveDrag, p: Point) {
        let candidate = drag
            .last_valid
            .at(Point::new(p.x - drag.grab_dx, p.y - drag.grab_dy));

        if self.store.collides_with_others(drag.id, &candidate) {
            return;
        }

        if self.store.update(drag.id, candidate) {
            self.drag = Some(MoveDrag {
                last_valid: candidate,
                ..drag
            });
        }
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor_with_two_rects() -> Editor {
        let mut editor = Editor::new();
        editor.load_image(
            7,
            vec![
                Annotation::new(1, 7, Rect::new(0.0, 0.0, 10.0, 10.0)),
                Annotation::new(2, 7, Rect::new(20.0, 20.0, 10.0, 10.0)),
            ],
        );
        editor
    }

    #[test]
    fn test_draw_gesture_creates_and_selects_rectangle() {
        let mut editor = Editor::new();
        editor.load_image(7, vec![]);

        editor.arm_rectangle_tool();
        editor.pointer_down(Point::new(10.0, 10.0));
        assert!(matches!(editor.state(), EditorState::Drawing { .. }));

        editor.pointer_move(Point::new(30.0, 25.0));
        assert_eq!(editor.provisional(), Some(Rect::new(10.0, 10.0, 20.0, 15.0)));

        editor.pointer_up(Point::new(30.0, 25.0));
        assert_eq!(editor.store().all().len(), 1);
        let id = editor.selection().expect("new rectangle should be selected");
        assert_eq!(editor.store().get(id).unwrap().rect(), Rect::new(10.0, 10.0, 20.0, 15.0));
    }

    #[test]
    fn test_draw_gesture_in_any_direction() {
        let mut editor = Editor::new();
        editor.load_image(7, vec![]);

        editor.arm_rectangle_tool();
        editor.pointer_down(Point::new(30.0, 25.0));
        editor.pointer_move(Point::new(10.0, 10.0)); // drag up-left
        editor.pointer_up(Point::new(10.0, 10.0));

        let id = editor.selection().unwrap();
        assert_eq!(editor.store().get(id).unwrap().rect(), Rect::new(10.0, 10.0, 20.0, 15.0));
    }

    #[test]
    fn test_zero_size_draw_is_rejected() {
        let mut editor = Editor::new();
        editor.load_image(7, vec![]);

        editor.arm_rectangle_tool();
        editor.pointer_down(Point::new(10.0, 10.0));
        editor.pointer_up(Point::new(10.0, 10.0));

        assert!(editor.store().all().is_empty());
        assert_eq!(editor.state(), EditorState::Idle);
    }

    #[test]
    fn test_tool_is_single_shot() {
        let mut editor = Editor::new();
        editor.load_image(7, vec![]);

        editor.arm_rectangle_tool();
        editor.pointer_down(Point::new(0.0, 0.0));
        editor.pointer_up(Point::new(10.0, 10.0));
        assert!(!editor.is_tool_armed());

        // Without re-arming, a press on empty canvas clears selection
        // instead of starting a new draw.
        editor.pointer_down(Point::new(50.0, 50.0));
        assert_eq!(editor.state(), EditorState::Idle);
        assert_eq!(editor.store().all().len(), 1);
    }

    #[test]
    fn test_pointer_down_on_existing_shape_suppresses_drawing() {
        let mut editor = editor_with_two_rects();

        editor.arm_rectangle_tool();
        editor.pointer_down(Point::new(5.0, 5.0));

        assert_eq!(editor.selection(), Some(1));
        assert_eq!(editor.store().all().len(), 2);
    }

    #[test]
    fn test_move_with_collision_is_rejected() {
        let mut editor = editor_with_two_rects();

        // Grab rectangle 1 at its center and drag it onto rectangle 2
        editor.pointer_down(Point::new(5.0, 5.0));
        assert_eq!(editor.selection(), Some(1));
        editor.pointer_move(Point::new(20.0, 20.0)); // candidate (15,15,10,10)
        editor.pointer_up(Point::new(20.0, 20.0));

        // Rejected: rectangle 1 stays at its pre-drag position
        assert_eq!(editor.store().get(1).unwrap().rect(), Rect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_move_without_collision_commits() {
        let mut editor = editor_with_two_rects();

        editor.pointer_down(Point::new(5.0, 5.0));
        editor.pointer_move(Point::new(30.0, 5.0)); // candidate (25,0,10,10)
        editor.pointer_up(Point::new(30.0, 5.0));

        assert_eq!(editor.store().get(1).unwrap().rect(), Rect::new(25.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_each_move_step_is_validated_independently() {
        let mut editor = editor_with_two_rects();

        editor.pointer_down(Point::new(5.0, 5.0));
        // First step collides and is rejected...
        editor.pointer_move(Point::new(25.0, 25.0));
        assert_eq!(editor.store().get(1).unwrap().rect(), Rect::new(0.0, 0.0, 10.0, 10.0));
        // ...the next step is clear and commits from the last valid spot.
        editor.pointer_move(Point::new(40.0, 5.0));
        editor.pointer_up(Point::new(40.0, 5.0));
        assert_eq!(editor.store().get(1).unwrap().rect(), Rect::new(35.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_delete_removes_selection_and_returns_to_idle() {
        let mut editor = editor_with_two_rects();

        editor.pointer_down(Point::new(5.0, 5.0));
        assert!(editor.delete_selected());

        assert_eq!(editor.state(), EditorState::Idle);
        assert!(editor.store().get(1).is_none());
        assert_eq!(editor.store().all().len(), 1);
    }

    #[test]
    fn test_delete_with_no_selection_is_a_noop() {
        let mut editor = editor_with_two_rects();
        assert!(!editor.delete_selected());
        assert_eq!(editor.store().all().len(), 2);
    }

    #[test]
    fn test_selection_retargets_and_clears() {
        let mut editor = editor_with_two_rects();

        editor.pointer_down(Point::new(5.0, 5.0));
        editor.pointer_up(Point::new(5.0, 5.0));
        assert_eq!(editor.selection(), Some(1));

        editor.pointer_down(Point::new(25.0, 25.0));
        editor.pointer_up(Point::new(25.0, 25.0));
        assert_eq!(editor.selection(), Some(2));

        editor.pointer_down(Point::new(90.0, 90.0));
        assert_eq!(editor.selection(), None);
        assert_eq!(editor.state(), EditorState::Idle);
    }

    #[test]
    fn test_apply_saved_keeps_selection_on_renamed_annotation() {
        let mut editor = Editor::new();
        editor.load_image(7, vec![]);

        editor.arm_rectangle_tool();
        editor.pointer_down(Point::new(0.0, 0.0));
        editor.pointer_up(Point::new(10.0, 10.0));
        let placeholder = editor.selection().unwrap();
        assert!(placeholder < 0);

        let batch = editor.store().save_batch();
        editor.apply_saved(&batch, &[(placeholder, 42)]);
        assert_eq!(editor.selection(), Some(42));
        assert!(editor.delete_selected());
    }

    #[test]
    fn test_load_accepts_already_overlapping_rectangles() {
        let mut editor = Editor::new();
        editor.load_image(
            7,
            vec![
                Annotation::new(1, 7, Rect::new(0.0, 0.0, 10.0, 10.0)),
                Annotation::new(2, 7, Rect::new(5.0, 5.0, 10.0, 10.0)),
            ],
        );
        // Legacy overlap is accepted as-is; only moves are checked.
        assert_eq!(editor.store().all().len(), 2);
    }

    #[test]
    fn test_draw_may_finish_over_existing_shape() {
        // The collision policy applies to moves only: a draw gesture that
        // starts on empty canvas may still end overlapping another shape.
        let mut editor = editor_with_two_rects();

        editor.arm_rectangle_tool();
        editor.pointer_down(Point::new(15.0, 15.0));
        editor.pointer_move(Point::new(25.0, 25.0));
        editor.pointer_up(Point::new(25.0, 25.0));

        assert_eq!(editor.store().all().len(), 3);
    }
}
