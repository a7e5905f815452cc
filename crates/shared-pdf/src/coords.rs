//! Coordinate conversion between browser placement and PDF page space.
//!
//! The browser records placements as percentages of the rendered page with
//! a top-left origin. PDF user space has a bottom-left origin and is offset
//! by the page's MediaBox.

/// Page MediaBox as origin plus size, in points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PageBox {
    /// US Letter, the fallback when a page declares no MediaBox
    pub const LETTER: PageBox = PageBox {
        x: 0.0,
        y: 0.0,
        width: 612.0,
        height: 792.0,
    };

    pub fn new(width: f64, height: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }

    /// From a PDF rectangle `[llx, lly, urx, ury]`; corners may be given in
    /// either order.
    pub fn from_corners(llx: f64, lly: f64, urx: f64, ury: f64) -> Self {
        Self {
            x: llx.min(urx),
            y: lly.min(ury),
            width: (urx - llx).abs(),
            height: (ury - lly).abs(),
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y + self.height
    }
}

/// Axis-aligned box in PDF user space; `(x, y)` is the bottom-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y + self.height
    }
}

/// Convert a top-left, percentage based placement into a PDF draw box.
///
/// Height follows from the image aspect ratio (`width / height` in pixels).
/// The returned `y` is the bottom edge of the image, i.e. the top edge
/// minus the height.
pub fn percent_to_pdf(
    page: &PageBox,
    x_percent: f64,
    y_percent: f64,
    width_percent: f64,
    aspect_ratio: f64,
) -> Rect {
    let x = page.x + (x_percent / 100.0) * page.width;
    let y_top = page.y + page.height - (y_percent / 100.0) * page.height;
    let width = (width_percent / 100.0) * page.width;
    let height = if aspect_ratio > 0.0 {
        width / aspect_ratio
    } else {
        0.0
    };

    Rect {
        x,
        y: y_top - height,
        width,
        height,
    }
}

/// True when `rect` lies entirely inside the page, allowing for float noise.
pub fn fits_within(rect: &Rect, page: &PageBox) -> bool {
    const EPSILON: f64 = 1e-6;
    rect.x >= page.x - EPSILON
        && rect.y >= page.y - EPSILON
        && rect.right() <= page.right() + EPSILON
        && rect.top() <= page.top() + EPSILON
}

/// Move `rect` inside the page, first shrinking it (keeping its aspect
/// ratio) if it is larger than the page.
pub fn clamp_to_page(rect: &Rect, page: &PageBox) -> Rect {
    let mut width = rect.width;
    let mut height = rect.height;

    let scale = (page.width / width.max(f64::MIN_POSITIVE))
        .min(page.height / height.max(f64::MIN_POSITIVE))
        .min(1.0);
    width *= scale;
    height *= scale;

    let x = rect.x.max(page.x).min(page.right() - width);
    let y = rect.y.max(page.y).min(page.top() - height);

    Rect {
        x,
        y,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.5
    }

    #[test]
    fn test_letter_placement() {
        let rect = percent_to_pdf(&PageBox::LETTER, 10.0, 20.0, 30.0, 2.0);
        assert!(approx(rect.x, 61.2), "x = {}", rect.x);
        assert!(approx(rect.width, 183.6), "width = {}", rect.width);
        assert!(approx(rect.height, 91.8), "height = {}", rect.height);
        assert!(approx(rect.y, 541.8), "y = {}", rect.y);
    }

    #[test]
    fn test_media_box_offset_is_respected() {
        let page = PageBox::from_corners(100.0, 50.0, 712.0, 842.0);
        let rect = percent_to_pdf(&page, 0.0, 0.0, 50.0, 1.0);
        assert!(approx(rect.x, 100.0));
        assert!(approx(rect.top(), 842.0));
        assert!(approx(rect.width, 306.0));
    }

    #[test]
    fn test_from_corners_normalizes() {
        let page = PageBox::from_corners(612.0, 792.0, 0.0, 0.0);
        assert_eq!(page, PageBox::LETTER);
    }

    #[test]
    fn test_overflowing_box_is_detected_and_clamped() {
        // Bottom-right corner, 50% wide: spills past both edges
        let rect = percent_to_pdf(&PageBox::LETTER, 80.0, 95.0, 50.0, 2.0);
        assert!(!fits_within(&rect, &PageBox::LETTER));

        let clamped = clamp_to_page(&rect, &PageBox::LETTER);
        assert!(fits_within(&clamped, &PageBox::LETTER));
        assert!(approx(clamped.width, rect.width));
        assert!(approx(clamped.right(), 612.0));
        assert!(approx(clamped.y, 0.0));
    }

    #[test]
    fn test_clamp_shrinks_oversized_box() {
        let rect = Rect {
            x: -10.0,
            y: -10.0,
            width: 1224.0,
            height: 612.0,
        };
        let clamped = clamp_to_page(&rect, &PageBox::LETTER);
        assert!(fits_within(&clamped, &PageBox::LETTER));
        assert!(approx(clamped.width / clamped.height, 2.0));
    }

    proptest! {
        #[test]
        fn prop_in_range_placements_keep_left_and_top_on_page(
            x in 0.0f64..100.0,
            y in 0.0f64..100.0,
            w in 0.1f64..100.0,
            ratio in 0.2f64..5.0,
        ) {
            let page = PageBox::LETTER;
            let rect = percent_to_pdf(&page, x, y, w, ratio);
            prop_assert!(rect.x >= page.x && rect.x <= page.right());
            prop_assert!(rect.top() >= page.y && rect.top() <= page.top() + 1e-9);
            prop_assert!((rect.width / rect.height - ratio).abs() < 1e-6);
        }

        #[test]
        fn prop_clamped_always_fits(
            x in -200.0f64..800.0,
            y in -200.0f64..1000.0,
            w in 1.0f64..2000.0,
            h in 1.0f64..2000.0,
        ) {
            let rect = Rect { x, y, width: w, height: h };
            let clamped = clamp_to_page(&rect, &PageBox::LETTER);
            prop_assert!(fits_within(&clamped, &PageBox::LETTER));
        }
    }
}
