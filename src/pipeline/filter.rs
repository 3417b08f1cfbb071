//! Reduces raw detections to door boxes.

use tracing::warn;

use super::types::{ClassNames, DetectionBox, RawDetection, DOOR_CLASS_NAME};

/// Class id whose name equals "door" case-insensitively, lowest id first.
pub fn find_door_class(class_names: &ClassNames) -> Option<usize> {
    class_names
        .iter()
        .find(|(_, name)| name.eq_ignore_ascii_case("door"))
        .map(|(id, _)| *id)
}

/// Keep only detections of the door class, in detector order.
///
/// Returns `None` when the model has no door class. That is a warning, not
/// an error: the caller reports an empty result.
pub fn filter_doors(
    class_names: &ClassNames,
    detections: &[RawDetection],
) -> Option<Vec<RawDetection>> {
    let Some(door_id) = find_door_class(class_names) else {
        let available: Vec<&str> = class_names.values().map(String::as_str).collect();
        warn!(?available, "'door' class not found in model");
        return None;
    };

    Some(
        detections
            .iter()
            .filter(|d| d.class_id == door_id)
            .copied()
            .collect(),
    )
}

/// Convert a retained detection to its response shape.
///
/// Coordinates are truncated toward zero before the width and height are
/// taken, so `width == trunc(x2) - trunc(x1)`.
pub fn to_detection_box(detection: &RawDetection) -> DetectionBox {
    let x1 = detection.bbox.x1 as i32;
    let y1 = detection.bbox.y1 as i32;
    let x2 = detection.bbox.x2 as i32;
    let y2 = detection.bbox.y2 as i32;
    DetectionBox {
        x: x1,
        y: y1,
        width: (x2 - x1).max(0),
        height: (y2 - y1).max(0),
        class_name: DOOR_CLASS_NAME.to_string(),
        confidence: detection.confidence,
    }
}

pub fn to_detection_boxes(detections: &[RawDetection]) -> Vec<DetectionBox> {
    detections.iter().map(to_detection_box).collect()
}
