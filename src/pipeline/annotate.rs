//! Draws detection boxes on a copy of the image.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use super::types::RawDetection;

/// Stroke width of drawn boxes in pixels.
const LINE_THICKNESS: i32 = 3;

/// Per-class colours, cycled by class id.
const PALETTE: [[u8; 3]; 6] = [
    [255, 56, 56],
    [56, 56, 255],
    [0, 180, 60],
    [255, 157, 0],
    [180, 0, 220],
    [0, 190, 190],
];

pub fn class_colour(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Render every detection as a hollow rectangle, coloured by class.
pub fn draw_detections(image: &RgbImage, detections: &[RawDetection]) -> RgbImage {
    let mut canvas = image.clone();
    for detection in detections {
        let colour = class_colour(detection.class_id);
        let x = detection.bbox.x1.round() as i32;
        let y = detection.bbox.y1.round() as i32;
        let w = (detection.bbox.x2 - detection.bbox.x1).round() as i32;
        let h = (detection.bbox.y2 - detection.bbox.y1).round() as i32;

        for inset in 0..LINE_THICKNESS {
            let rw = w - 2 * inset;
            let rh = h - 2 * inset;
            if rw < 1 || rh < 1 {
                break;
            }
            let rect = Rect::at(x + inset, y + inset).of_size(rw as u32, rh as u32);
            draw_hollow_rect_mut(&mut canvas, rect, colour);
        }
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::BoundingBox;

    fn white(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))
    }

    fn det(class_id: usize, x1: f32, y1: f32, x2: f32, y2: f32) -> RawDetection {
        RawDetection {
            class_id,
            bbox: BoundingBox::new(x1, y1, x2, y2),
            confidence: 0.9,
        }
    }

    #[test]
    fn no_detections_leaves_image_untouched() {
        let img = white(20, 20);
        assert_eq!(draw_detections(&img, &[]), img);
    }

    #[test]
    fn draws_box_outline_in_class_colour() {
        let img = white(60, 60);
        let out = draw_detections(&img, &[det(0, 10.0, 10.0, 40.0, 50.0)]);
        assert_eq!(out.get_pixel(10, 10), &class_colour(0));
        assert_eq!(out.get_pixel(25, 10), &class_colour(0));
        // Interior beyond the stroke stays white
        assert_eq!(out.get_pixel(25, 30), &Rgb([255, 255, 255]));
        // Source image is not modified
        assert_eq!(img.get_pixel(10, 10), &Rgb([255, 255, 255]));
    }

    #[test]
    fn stroke_is_several_pixels_wide() {
        let out = draw_detections(&white(60, 60), &[det(1, 10.0, 10.0, 40.0, 40.0)]);
        for offset in 0..LINE_THICKNESS as u32 {
            assert_eq!(out.get_pixel(10 + offset, 25), &class_colour(1));
        }
        assert_eq!(out.get_pixel(10 + LINE_THICKNESS as u32, 25), &Rgb([255, 255, 255]));
    }

    #[test]
    fn degenerate_and_offscreen_boxes_do_not_panic() {
        let img = white(10, 10);
        let out = draw_detections(
            &img,
            &[
                det(0, 5.0, 5.0, 5.0, 5.0),
                det(0, -20.0, -20.0, 50.0, 50.0),
                det(0, 8.0, 8.0, 3.0, 3.0),
            ],
        );
        assert_eq!(out.dimensions(), (10, 10));
    }

    #[test]
    fn palette_cycles() {
        assert_eq!(class_colour(0), class_colour(PALETTE.len()));
        assert_ne!(class_colour(0), class_colour(1));
    }
}
