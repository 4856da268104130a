/// Geometric primitives for the annotation editor
///
/// All rectangle math happens in the image's native pixel space.
/// Coordinates are quantized to 1/100 pixel on every commit so that
/// repeated drag edits cannot accumulate floating point error.

/// A point in image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Quantize a coordinate to 1/100 pixel
pub fn quantize(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// An axis-aligned rectangle: top-left corner plus positive extent
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Create a rectangle, quantizing every field
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x: quantize(x),
            y: quantize(y),
            width: quantize(width),
            height: quantize(height),
        }
    }

    /// Build the canonical rectangle spanned by two arbitrary corner points.
    ///
    /// A drag gesture can move in any direction, so the anchor may be any
    /// of the four corners. The result always has the componentwise minimum
    /// as its top-left and a non-negative extent.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self::new(
            a.x.min(b.x),
            a.y.min(b.y),
            (b.x - a.x).abs(),
            (b.y - a.y).abs(),
        )
    }

    /// Move the rectangle so its top-left sits at the given point
    pub fn at(&self, top_left: Point) -> Self {
        Self::new(top_left.x, top_left.y, self.width, self.height)
    }

    /// A rectangle is valid when it has strictly positive area and
    /// every field is finite. Invalid rectangles are rejected before
    /// they reach the store or the database.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Axis-aligned bounding box overlap test.
    ///
    /// True only when the projections overlap on both axes with strictly
    /// positive overlap: rectangles that merely share an edge or a corner
    /// do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }

    /// Hit test: is the point inside the rectangle (edges inclusive)?
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x
            && p.x <= self.x + self.width
            && p.y >= self.y
            && p.y <= self.y + self.height
    }
}

/// Mapping between the display surface and the image's native pixel space.
///
/// The image is scaled uniformly to fit the viewport and centered, so the
/// scale factor is `min(view_w/image_w, view_h/image_h)`. Stored
/// coordinates are always native pixels; the viewport converts both ways.
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub image_w: f64,
    pub image_h: f64,
    pub view_w: f64,
    pub view_h: f64,
}

impl Viewport {
    pub fn new(image_w: f64, image_h: f64, view_w: f64, view_h: f64) -> Self {
        Self {
            image_w,
            image_h,
            view_w,
            view_h,
        }
    }

    /// The uniform fit-to-viewport scale factor
    pub fn scale(&self) -> f64 {
        if self.image_w <= 0.0 || self.image_h <= 0.0 {
            return 1.0;
        }
        (self.view_w / self.image_w).min(self.view_h / self.image_h)
    }

    /// Offset of the scaled image's top-left corner inside the viewport
    pub fn offset(&self) -> (f64, f64) {
        let scale = self.scale();
        (
            (self.view_w - self.image_w * scale) / 2.0,
            (self.view_h - self.image_h * scale) / 2.0,
        )
    }

    /// Convert a display-space point to image pixel space, clamped to the
    /// image extents so gestures that leave the canvas stay well-formed.
    pub fn to_image(&self, display: Point) -> Point {
        let scale = self.scale();
        let (ox, oy) = self.offset();
        Point::new(
            ((display.x - ox) / scale).clamp(0.0, self.image_w),
            ((display.y - oy) / scale).clamp(0.0, self.image_h),
        )
    }

    /// Convert an image-space point back to display space
    pub fn to_display(&self, image: Point) -> Point {
        let scale = self.scale();
        let (ox, oy) = self.offset();
        Point::new(image.x * scale + ox, image.y * scale + oy)
    }

    /// Project a whole rectangle into display space for drawing
    pub fn rect_to_display(&self, rect: &Rect) -> Rect {
        let scale = self.scale();
        let top_left = self.to_display(Point::new(rect.x, rect.y));
        Rect {
            x: top_left.x,
            y: top_left.y,
            width: rect.width * scale,
            height: rect.height * scale,
        }
    }
}
