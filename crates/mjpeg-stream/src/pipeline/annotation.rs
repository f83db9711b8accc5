//! In-place frame annotation: the FPS badge and dark-region outlines.

use camera_ingest::Frame;
use image::{GrayImage, Luma, Rgb, RgbImage, imageops};
use imageproc::contours::{BorderType, Contour, find_contours};

use crate::pipeline::encoding::EncodeError;

pub(crate) const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Badge box corners, inclusive.
const BADGE_TOP_LEFT: (i32, i32) = (5, 5);
const BADGE_BOTTOM_RIGHT: (i32, i32) = (150, 45);
/// Text origin (top-left of the first glyph) and glyph scale.
const BADGE_TEXT_ORIGIN: (i32, i32) = (10, 14);
const BADGE_TEXT_SCALE: i32 = 3;
const OUTLINE_THICKNESS: i32 = 2;

/// Convert a captured BGR frame into an RGB buffer the annotators work on.
pub fn frame_to_image(frame: &Frame) -> Result<RgbImage, EncodeError> {
    let width = u32::try_from(frame.width).map_err(|_| EncodeError::Geometry {
        width: frame.width,
        height: frame.height,
        len: frame.data.len(),
    })?;
    let height = u32::try_from(frame.height).map_err(|_| EncodeError::Geometry {
        width: frame.width,
        height: frame.height,
        len: frame.data.len(),
    })?;
    let expected = width as usize * height as usize * 3;
    if frame.data.len() != expected || expected == 0 {
        return Err(EncodeError::Geometry {
            width: frame.width,
            height: frame.height,
            len: frame.data.len(),
        });
    }

    let rgb = bgr_to_rgb(&frame.data);
    RgbImage::from_vec(width, height, rgb).ok_or(EncodeError::Geometry {
        width: frame.width,
        height: frame.height,
        len: frame.data.len(),
    })
}

fn bgr_to_rgb(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks_exact(3) {
        output.push(chunk[2]);
        output.push(chunk[1]);
        output.push(chunk[0]);
    }
    output
}

/// Draw the opaque `FPS: n` badge in the top-left corner.
pub fn overlay_fps(image: &mut RgbImage, fps: i64) {
    let (left, top) = BADGE_TOP_LEFT;
    let (right, bottom) = BADGE_BOTTOM_RIGHT;
    fill_rect(image, left, top, right, bottom, BLACK);
    let (x, y) = BADGE_TEXT_ORIGIN;
    draw_label(image, x, y, &format!("FPS: {fps}"), GREEN, BADGE_TEXT_SCALE);
}

/// Foreground mask of pixels whose luma is at or below `threshold`.
pub fn dark_mask(image: &RgbImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000;
        if luma <= threshold as u32 {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Outer borders of every dark blob that is not nested inside another one.
///
/// Pixels beyond the frame count as background, so blobs touching an edge
/// (or covering the whole frame) still get a border.
pub fn find_dark_regions(image: &RgbImage, threshold: u8) -> Vec<Contour<i32>> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let mask = dark_mask(image, threshold);
    let mut padded = GrayImage::new(width + 2, height + 2);
    imageops::replace(&mut padded, &mask, 1, 1);

    let max_x = width as i32 - 1;
    let max_y = height as i32 - 1;
    find_contours::<i32>(&padded)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .map(|mut contour| {
            for point in &mut contour.points {
                point.x = (point.x - 1).clamp(0, max_x);
                point.y = (point.y - 1).clamp(0, max_y);
            }
            contour
        })
        .collect()
}

/// Outline every dark region in green. Returns the number of outlines drawn.
///
/// Every blob counts, however small; sensor noise is outlined the same as a
/// large shadow.
pub fn highlight_dark_regions(image: &mut RgbImage, threshold: u8) -> usize {
    let contours = find_dark_regions(image, threshold);
    for contour in &contours {
        draw_contour(image, contour, GREEN);
    }
    contours.len()
}

fn draw_contour(image: &mut RgbImage, contour: &Contour<i32>, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    // Centre the stroke on the border: offsets -1..=0 for a 2 px brush.
    let offsets = -(OUTLINE_THICKNESS / 2)..OUTLINE_THICKNESS - OUTLINE_THICKNESS / 2;
    for point in &contour.points {
        for dy in offsets.clone() {
            for dx in offsets.clone() {
                let px = point.x + dx;
                let py = point.y + dy;
                if px >= 0 && px < width && py >= 0 && py < height {
                    image.put_pixel(px as u32, py as u32, color);
                }
            }
        }
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if width == 0 || height == 0 {
        return;
    }
    let left = left.clamp(0, width - 1);
    let right = right.clamp(0, width - 1);
    let top = top.clamp(0, height - 1);
    let bottom = bottom.clamp(0, height - 1);

    for y in top..=bottom {
        for x in left..=right {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_label(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>, scale: i32) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 0 {
                        continue;
                    }
                    for sy in 0..scale {
                        for sx in 0..scale {
                            let px = x + col * scale + sx;
                            let py = y + row as i32 * scale + sy;
                            if px >= 0 && px < width && py >= 0 && py < height {
                                image.put_pixel(px as u32, py as u32, color);
                            }
                        }
                    }
                }
            }
        }
        x += 6 * scale;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    match ch {
        'F' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000,
        ]),
        'P' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000,
        ]),
        'S' => Some([
            0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        '0' => Some([
            0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110,
        ]),
        '1' => Some([
            0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
        ]),
        '2' => Some([
            0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111,
        ]),
        '3' => Some([
            0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110,
        ]),
        '4' => Some([
            0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010,
        ]),
        '5' => Some([
            0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        '6' => Some([
            0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110,
        ]),
        '7' => Some([
            0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000,
        ]),
        '8' => Some([
            0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110,
        ]),
        '9' => Some([
            0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100,
        ]),
        ':' => Some([0, 0b00110, 0b00110, 0, 0b00110, 0b00110, 0]),
        '-' => Some([0, 0, 0, 0b11111, 0, 0, 0]),
        ' ' => Some([0, 0, 0, 0, 0, 0, 0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use camera_ingest::FrameFormat;

    use super::*;

    fn solid(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    fn bounds(contour: &Contour<i32>) -> (i32, i32, i32, i32) {
        let xs = contour.points.iter().map(|p| p.x);
        let ys = contour.points.iter().map(|p| p.y);
        (
            xs.clone().min().unwrap(),
            ys.clone().min().unwrap(),
            xs.max().unwrap(),
            ys.max().unwrap(),
        )
    }

    #[test]
    fn dark_frame_is_one_region_framing_the_image() {
        let image = solid(64, 48, 0);
        let contours = find_dark_regions(&image, 40);
        assert_eq!(contours.len(), 1);
        let (min_x, min_y, max_x, max_y) = bounds(&contours[0]);
        assert!(max_x - min_x >= 60, "width span {}", max_x - min_x);
        assert!(max_y - min_y >= 44, "height span {}", max_y - min_y);
    }

    #[test]
    fn bright_frame_has_no_regions() {
        let mut image = solid(64, 48, 200);
        assert!(find_dark_regions(&image, 40).is_empty());
        assert_eq!(highlight_dark_regions(&mut image, 40), 0);
        assert!(image.pixels().all(|p| *p == Rgb([200, 200, 200])));
    }

    #[test]
    fn cutoff_is_inclusive() {
        assert_eq!(find_dark_regions(&solid(8, 8, 40), 40).len(), 1);
        assert!(find_dark_regions(&solid(8, 8, 41), 40).is_empty());
    }

    #[test]
    fn every_blob_is_outlined_regardless_of_size() {
        let mut image = solid(40, 40, 220);
        // A single dark pixel and a larger square.
        image.put_pixel(3, 3, Rgb([0, 0, 0]));
        for y in 20..30 {
            for x in 20..30 {
                image.put_pixel(x, y, Rgb([10, 10, 10]));
            }
        }
        assert_eq!(highlight_dark_regions(&mut image, 40), 2);
        assert_eq!(*image.get_pixel(20, 20), GREEN);
        assert_eq!(*image.get_pixel(3, 3), GREEN);
        // Interior of the square is left alone.
        assert_eq!(*image.get_pixel(25, 25), Rgb([10, 10, 10]));
    }

    #[test]
    fn nested_blobs_only_report_the_outer_border() {
        let mut image = solid(30, 30, 0);
        for y in 5..25 {
            for x in 5..25 {
                image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        for y in 12..18 {
            for x in 12..18 {
                image.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        assert_eq!(find_dark_regions(&image, 40).len(), 1);
    }

    #[test]
    fn dark_frame_border_hugs_the_image_edges() {
        let contours = find_dark_regions(&solid(64, 48, 0), 40);
        assert_eq!(bounds(&contours[0]), (0, 0, 63, 47));
    }

    #[test]
    fn blobs_touching_any_edge_are_outlined() {
        // (x range, y range, a pixel on the frame edge inside the blob)
        let cases = [
            ((0..10, 15..25), (0, 15)),
            ((15..25, 0..10), (15, 0)),
            ((30..40, 15..25), (39, 20)),
            ((15..25, 30..40), (20, 39)),
        ];
        for ((xs, ys), edge) in cases {
            let mut image = solid(40, 40, 220);
            for y in ys.clone() {
                for x in xs.clone() {
                    image.put_pixel(x, y, Rgb([5, 5, 5]));
                }
            }
            assert_eq!(find_dark_regions(&image, 40).len(), 1, "blob at {xs:?} x {ys:?}");
            assert_eq!(highlight_dark_regions(&mut image, 40), 1);
            assert_eq!(*image.get_pixel(edge.0, edge.1), GREEN, "edge pixel {edge:?}");
        }
    }

    #[test]
    fn outline_is_centred_on_the_border_pixels() {
        let mut image = solid(30, 30, 220);
        for y in 10..20 {
            for x in 10..20 {
                image.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        highlight_dark_regions(&mut image, 40);
        // Each border pixel plus its up-left neighbour: outside the blob on the
        // top and left sides, inside it on the bottom and right.
        for (x, y) in [(9, 15), (10, 15), (15, 9), (15, 10), (18, 15), (19, 15), (15, 18), (15, 19)] {
            assert_eq!(*image.get_pixel(x, y), GREEN, "({x}, {y})");
        }
        assert_eq!(*image.get_pixel(8, 15), Rgb([220, 220, 220]));
        assert_eq!(*image.get_pixel(20, 15), Rgb([220, 220, 220]));
        assert_eq!(*image.get_pixel(11, 15), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(17, 15), Rgb([0, 0, 0]));
    }

    #[test]
    fn badge_is_opaque_and_labelled() {
        let mut image = solid(200, 100, 255);
        overlay_fps(&mut image, 30);
        assert_eq!(*image.get_pixel(5, 5), BLACK);
        assert_eq!(*image.get_pixel(150, 45), BLACK);
        assert_eq!(*image.get_pixel(151, 46), Rgb([255, 255, 255]));
        // Top row of the `F` glyph.
        assert_eq!(*image.get_pixel(10, 14), GREEN);
        let green = image.pixels().filter(|p| **p == GREEN).count();
        assert!(green > 100);
    }

    #[test]
    fn badge_clips_on_tiny_frames() {
        let mut image = solid(8, 8, 255);
        overlay_fps(&mut image, 9);
        assert_eq!(*image.get_pixel(7, 7), BLACK);
    }

    #[test]
    fn frame_conversion_swaps_channels_and_checks_geometry() {
        let frame = Frame {
            data: vec![1, 2, 3, 4, 5, 6],
            width: 2,
            height: 1,
            timestamp_ms: 0,
            format: FrameFormat::Bgr8,
        };
        let image = frame_to_image(&frame).unwrap();
        assert_eq!(*image.get_pixel(0, 0), Rgb([3, 2, 1]));
        assert_eq!(*image.get_pixel(1, 0), Rgb([6, 5, 4]));

        let short = Frame {
            data: vec![0; 5],
            ..frame
        };
        assert!(matches!(
            frame_to_image(&short),
            Err(EncodeError::Geometry { len: 5, .. })
        ));
    }
}
