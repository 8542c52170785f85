//! Person bounding boxes and overlap suppression.

/// An axis-aligned box in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersonBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl PersonBox {
    #[must_use]
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    #[must_use]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with `other`; 0 when either box is empty.
    #[must_use]
    pub fn iou(&self, other: &PersonBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// Greedy non-max suppression.
///
/// Sorts `boxes` by confidence (highest first) and drops every box whose IoU
/// with an already-kept box exceeds `iou_threshold`.
pub fn non_max_suppression(boxes: &mut Vec<PersonBox>, iou_threshold: f32) {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..boxes.len() {
        let candidate = boxes[index];
        let overlaps = boxes[..kept]
            .iter()
            .any(|prev| prev.iou(&candidate) > iou_threshold);
        if !overlaps {
            boxes.swap(kept, index);
            kept += 1;
        }
    }
    boxes.truncate(kept);
}
