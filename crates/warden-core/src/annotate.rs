//! Drawing detection results into a BGR frame.

use crate::types::{FaceRegion, IdentityResult};
use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::imgproc;

const BOX_THICKNESS: i32 = 2;
const FONT_SCALE: f64 = 0.9;
/// Caption baseline sits this far above the box.
const CAPTION_OFFSET: i32 = 10;
/// Lowest baseline that still leaves room for the glyphs above it.
const MIN_CAPTION_BASELINE: i32 = 20;

/// Green (BGR) for recognized faces.
fn known_color() -> Scalar {
    Scalar::new(0.0, 255.0, 0.0, 0.0)
}

/// Red (BGR) for unknown faces.
fn unknown_color() -> Scalar {
    Scalar::new(0.0, 0.0, 255.0, 0.0)
}

/// Text drawn above a face: `name (distance)` when known, `Intruder` otherwise.
pub fn caption(result: &IdentityResult) -> String {
    if result.is_known() {
        format!("{} ({:.2})", result.display_name(), result.confidence)
    } else {
        result.display_name().to_string()
    }
}

/// Outline `region` and write its caption just above it.
pub fn annotate(image: &mut Mat, region: &FaceRegion, result: &IdentityResult) -> opencv::Result<()> {
    let color = if result.is_known() { known_color() } else { unknown_color() };
    let (x, y) = (region.x as i32, region.y as i32);
    imgproc::rectangle(
        image,
        Rect::new(x, y, region.width as i32, region.height as i32),
        color,
        BOX_THICKNESS,
        imgproc::LINE_8,
        0,
    )?;
    imgproc::put_text(
        image,
        &caption(result),
        Point::new(x, (y - CAPTION_OFFSET).max(MIN_CAPTION_BASELINE)),
        imgproc::FONT_HERSHEY_SIMPLEX,
        FONT_SCALE,
        color,
        BOX_THICKNESS,
        imgproc::LINE_8,
        false,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;
    use opencv::core::{Vec3b, CV_8UC3};
    use opencv::prelude::*;

    fn black(width: i32, height: i32) -> Mat {
        Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    fn painted(image: &Mat, xs: std::ops::Range<i32>, ys: std::ops::Range<i32>) -> Vec<[u8; 3]> {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .map(|(x, y)| image.at_2d::<Vec3b>(y, x).unwrap().0)
            .filter(|px| *px != [0, 0, 0])
            .collect()
    }

    fn unknown() -> IdentityResult {
        IdentityResult { identity: Identity::Unknown, label: 3, confidence: 80.0 }
    }

    #[test]
    fn test_caption_text() {
        let known = IdentityResult {
            identity: Identity::Known { name: "alice".into() },
            label: 0,
            confidence: 12.5,
        };
        assert_eq!(caption(&known), "alice (12.50)");
        assert_eq!(caption(&unknown()), "Intruder");
    }

    #[test]
    fn test_unknown_face_outlined_in_red_with_caption() {
        let mut image = black(200, 120);
        let region = FaceRegion { x: 40, y: 50, width: 60, height: 60, index: 0 };
        annotate(&mut image, &region, &unknown()).unwrap();

        assert_eq!(image.at_2d::<Vec3b>(50, 70).unwrap().0, [0, 0, 255], "top edge");
        assert_eq!(image.at_2d::<Vec3b>(80, 70).unwrap().0, [0, 0, 0], "interior untouched");

        let caption = painted(&image, 40..200, 0..48);
        assert!(!caption.is_empty(), "caption drawn above the box");
        assert!(caption.iter().all(|px| px[2] > 0 && px[1] == 0), "caption is red");
    }

    #[test]
    fn test_known_face_in_green() {
        let mut image = black(200, 120);
        let region = FaceRegion { x: 40, y: 50, width: 60, height: 60, index: 0 };
        let known = IdentityResult {
            identity: Identity::Known { name: "bob".into() },
            label: 1,
            confidence: 20.0,
        };
        annotate(&mut image, &region, &known).unwrap();
        assert_eq!(image.at_2d::<Vec3b>(50, 70).unwrap().0, [0, 255, 0]);
    }

    #[test]
    fn test_caption_kept_on_screen_for_top_edge_face() {
        let mut image = black(200, 120);
        let region = FaceRegion { x: 10, y: 0, width: 60, height: 60, index: 0 };
        annotate(&mut image, &region, &unknown()).unwrap();
        // Right of the box and below its top edge, so only caption pixels count.
        assert!(!painted(&image, 75..200, 2..MIN_CAPTION_BASELINE).is_empty());
    }
}
