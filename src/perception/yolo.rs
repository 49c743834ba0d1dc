//! Backend-independent YOLO pre/post-processing.
//!
//! Every detector backend shares this codec: images are resampled into a
//! normalized planar tensor, and the raw `(4 + num_classes) x num_boxes`
//! output is decoded, filtered with per-class NMS and mapped back to the
//! source image.

use crate::perception::types::{BoundingBox, Detection, DetectionResult};
use std::cmp::Ordering;

/// A decoded candidate box before NMS, in model-input pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub score: f32,
    pub class_id: i32,
}

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Bilinearly resample an interleaved 8-bit image into a `[3, dst_h, dst_w]`
/// float tensor with values in `[0, 1]`.
///
/// Output planes are always R, G, B; pass `bgr = true` when the source is
/// BGR-ordered. Returns false (leaving `dst` untouched) when the source
/// buffer or destination slice is too small for the given dimensions.
#[allow(clippy::too_many_arguments)]
pub fn resize_image_to_float_nchw(
    pixels: &[u8],
    src_w: u32,
    src_h: u32,
    stride: u32,
    bgr: bool,
    dst: &mut [f32],
    dst_w: u32,
    dst_h: u32,
) -> bool {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return false;
    }
    let (src_w, src_h, stride) = (src_w as usize, src_h as usize, stride as usize);
    let (dst_w, dst_h) = (dst_w as usize, dst_h as usize);
    if stride < src_w * 3 || pixels.len() < stride * (src_h - 1) + src_w * 3 {
        return false;
    }
    let plane = dst_w * dst_h;
    if dst.len() < plane * 3 {
        return false;
    }

    let scale_x = if dst_w > 1 {
        (src_w - 1) as f32 / (dst_w - 1) as f32
    } else {
        0.0
    };
    let scale_y = if dst_h > 1 {
        (src_h - 1) as f32 / (dst_h - 1) as f32
    } else {
        0.0
    };

    for dy in 0..dst_h {
        let sy = dy as f32 * scale_y;
        let y0 = (sy.floor() as usize).min(src_h - 1);
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = sy - y0 as f32;
        let row0 = &pixels[y0 * stride..];
        let row1 = &pixels[y1 * stride..];

        for dx in 0..dst_w {
            let sx = dx as f32 * scale_x;
            let x0 = (sx.floor() as usize).min(src_w - 1);
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = sx - x0 as f32;

            for c in 0..3 {
                let ch = if bgr { 2 - c } else { c };
                let p00 = row0[x0 * 3 + ch] as f32;
                let p01 = row0[x1 * 3 + ch] as f32;
                let p10 = row1[x0 * 3 + ch] as f32;
                let p11 = row1[x1 * 3 + ch] as f32;
                let top = p00 + (p01 - p00) * fx;
                let bottom = p10 + (p11 - p10) * fx;
                let v = top + (bottom - top) * fy;
                dst[c * plane + dy * dst_w + dx] = v / 255.0;
            }
        }
    }
    true
}

/// Decode a channel-major YOLO output tensor (`raw[ch * num_boxes + j]`).
///
/// Channels 0..4 hold `(cx, cy, w, h)`, the next `num_classes` channels
/// hold class logits. A box is kept when its best class probability is at
/// least `score_threshold`. Boxes are returned in top-left form.
pub fn decode_yolo_output(
    raw: &[f32],
    num_channels: usize,
    num_boxes: usize,
    num_classes: usize,
    score_threshold: f32,
) -> Vec<RawDetection> {
    if num_boxes == 0 || num_classes == 0 || num_channels < 4 + num_classes {
        return Vec::new();
    }
    if raw.len() < num_channels * num_boxes {
        tracing::warn!(
            "YOLO output has {} values, expected at least {}x{}",
            raw.len(),
            num_channels,
            num_boxes
        );
        return Vec::new();
    }

    let at = |ch: usize, j: usize| raw[ch * num_boxes + j];
    let mut out = Vec::new();

    for j in 0..num_boxes {
        let mut best_score = 0.0f32;
        let mut best_class: Option<usize> = None;
        for c in 0..num_classes {
            let p = sigmoid(at(4 + c, j));
            if p > best_score {
                best_score = p;
                best_class = Some(c);
            }
        }

        let Some(class_id) = best_class else {
            continue;
        };
        if best_score < score_threshold {
            continue;
        }

        out.push(RawDetection {
            bbox: BoundingBox::from_center(at(0, j), at(1, j), at(2, j), at(3, j)),
            score: best_score,
            class_id: class_id as i32,
        });
    }
    out
}

/// Greedy per-class non-max suppression.
///
/// Returns one flag per input; `true` means suppressed. A box is suppressed
/// by a higher-scoring box of the same class with IoU at or above
/// `iou_threshold`. Boxes of different classes never suppress each other.
pub fn nms_yolo_detections(detections: &[RawDetection], iou_threshold: f32) -> Vec<bool> {
    let mut order: Vec<usize> = (0..detections.len()).collect();
    order.sort_by(|&a, &b| {
        detections[b]
            .score
            .partial_cmp(&detections[a].score)
            .unwrap_or(Ordering::Equal)
    });

    let mut suppressed = vec![false; detections.len()];
    for (pos, &i) in order.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        let keeper = &detections[i];
        for &j in &order[pos + 1..] {
            if suppressed[j] || detections[j].class_id != keeper.class_id {
                continue;
            }
            if keeper.bbox.iou(&detections[j].bbox) >= iou_threshold {
                suppressed[j] = true;
            }
        }
    }
    suppressed
}

/// Append every surviving detection to `result`, mapped to source pixels.
pub fn fill_detection_result(
    detections: &[RawDetection],
    suppressed: &[bool],
    scale_x: f32,
    scale_y: f32,
    result: &mut DetectionResult,
) {
    for (idx, raw) in detections.iter().enumerate() {
        if suppressed.get(idx).copied().unwrap_or(false) {
            continue;
        }
        result.detections.push(Detection::new(
            raw.bbox.scaled(scale_x, scale_y),
            raw.score,
            raw.class_id,
        ));
    }
}
