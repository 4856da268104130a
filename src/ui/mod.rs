/// UI widgets
///
/// - `canvas.rs` - the annotation surface (drawing + event adaptation)

pub mod canvas;
