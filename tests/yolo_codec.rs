//! Integration tests for the YOLO codec
//!
//! These tests validate the decode → NMS → rescale path as a detector
//! backend runs it, plus properties that hold for arbitrary inputs.

mod common;

use common::assert_float_eq;
use falconflow::perception::runtimes::ReplayRuntime;
use falconflow::perception::yolo::{
    decode_yolo_output, fill_detection_result, nms_yolo_detections, resize_image_to_float_nchw,
    RawDetection,
};
use falconflow::perception::{
    BackendType, BoundingBox, DetectionResult, DetectorBackend, DetectorDescriptor, ImageView,
    PixelFormat, YoloDetector,
};
use proptest::prelude::*;

/// Channel-major tensor from per-box rows `[cx, cy, w, h, logits...]`.
fn channel_major(rows: &[Vec<f32>]) -> Vec<f32> {
    let n = rows.len();
    let ch = rows[0].len();
    let mut raw = vec![0.0; ch * n];
    for (j, row) in rows.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            raw[c * n + j] = *v;
        }
    }
    raw
}

#[test]
fn test_full_postprocess_path() {
    // Two overlapping class-0 boxes, one class-1 box on top of them, and one
    // box under the score threshold.
    let rows = vec![
        vec![50.0, 50.0, 40.0, 40.0, 4.0, -4.0],
        vec![52.0, 51.0, 40.0, 40.0, 2.0, -4.0],
        vec![50.0, 50.0, 40.0, 40.0, -4.0, 3.0],
        vec![200.0, 200.0, 10.0, 10.0, -3.0, -3.0],
    ];
    let raw = channel_major(&rows);

    let decoded = decode_yolo_output(&raw, 6, 4, 2, 0.25);
    assert_eq!(decoded.len(), 3);

    let suppressed = nms_yolo_detections(&decoded, 0.45);
    assert_eq!(suppressed, vec![false, true, false]);

    let mut result = DetectionResult::new("cam", 1, 0);
    fill_detection_result(&decoded, &suppressed, 2.0, 0.5, &mut result);
    assert_eq!(result.detections.len(), 2);
    assert_eq!(result.detections[0].class_id, 0);
    assert_eq!(result.detections[0].bbox, BoundingBox::new(60.0, 15.0, 80.0, 20.0));
    assert_eq!(result.detections[1].class_id, 1);
    assert!(result.detections.iter().all(|d| d.track_id.is_none()));
}

#[test]
fn test_detector_scales_boxes_back_to_source() {
    let desc = DetectorDescriptor::new("d", "none", BackendType::GenericCpu)
        .with_input_size(64, 64)
        .with_num_classes(1)
        .with_thresholds(0.5, 0.45);
    let runtime = ReplayRuntime::from_rows(&[
        vec![32.0, 32.0, 16.0, 16.0, 5.0],
        vec![33.0, 32.0, 16.0, 16.0, 4.0],
        vec![8.0, 8.0, 4.0, 4.0, -5.0],
    ]);
    let mut det = YoloDetector::new(desc, runtime);
    det.load().unwrap();

    let pixels = vec![128u8; 128 * 32 * 3];
    let image = ImageView::packed(&pixels, 128, 32, PixelFormat::Rgb8);
    let mut result = DetectionResult::new("cam", 4, 400);
    det.run(&image, &mut result).unwrap();

    assert_eq!(result.detections.len(), 1);
    let d = &result.detections[0];
    assert_eq!(d.bbox, BoundingBox::new(48.0, 12.0, 32.0, 8.0));
    assert!(d.score > 0.99);
    assert_eq!(det.runtime().calls(), 1);

    // Results are replaced, not appended.
    det.run(&image, &mut result).unwrap();
    assert_eq!(result.detections.len(), 1);
}

#[test]
fn test_resize_grey_image_is_uniform() {
    let pixels = vec![51u8; 7 * 5 * 3];
    let mut dst = vec![0.0f32; 4 * 4 * 3];
    assert!(resize_image_to_float_nchw(&pixels, 7, 5, 21, true, &mut dst, 4, 4));
    for v in dst {
        assert_float_eq(v as f64, 0.2, 1e-6);
    }
}

proptest! {
    #[test]
    fn prop_nms_survivors_do_not_overlap_within_class(
        boxes in prop::collection::vec((0f32..100.0, 0f32..100.0, 1f32..40.0, 1f32..40.0, 0.01f32..1.0, 0i32..2), 0..25),
        threshold in 0.1f32..0.9,
    ) {
        let dets: Vec<RawDetection> = boxes
            .iter()
            .map(|&(x, y, w, h, score, class_id)| RawDetection {
                bbox: BoundingBox::new(x, y, w, h),
                score,
                class_id,
            })
            .collect();
        let suppressed = nms_yolo_detections(&dets, threshold);
        prop_assert_eq!(suppressed.len(), dets.len());

        let kept: Vec<&RawDetection> = dets
            .iter()
            .zip(&suppressed)
            .filter(|(_, s)| !**s)
            .map(|(d, _)| d)
            .collect();
        for (i, a) in kept.iter().enumerate() {
            for b in &kept[i + 1..] {
                if a.class_id == b.class_id {
                    prop_assert!(a.bbox.iou(&b.bbox) < threshold);
                }
            }
        }
        if !dets.is_empty() {
            prop_assert!(!kept.is_empty());
        }
    }

    #[test]
    fn prop_resize_output_is_normalized(
        (w, h, pixels) in (1u32..12, 1u32..12).prop_flat_map(|(w, h)| {
            (Just(w), Just(h), prop::collection::vec(any::<u8>(), (w * h * 3) as usize))
        }),
        dst_w in 1u32..10,
        dst_h in 1u32..10,
    ) {
        let mut dst = vec![-1.0f32; (dst_w * dst_h * 3) as usize];
        prop_assert!(resize_image_to_float_nchw(&pixels, w, h, w * 3, false, &mut dst, dst_w, dst_h));
        prop_assert!(dst.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn prop_decode_preserves_box_geometry(
        cx in 0f32..640.0,
        cy in 0f32..640.0,
        w in 1f32..200.0,
        h in 1f32..200.0,
    ) {
        let raw = channel_major(&[vec![cx, cy, w, h, 8.0]]);
        let dets = decode_yolo_output(&raw, 5, 1, 1, 0.5);
        prop_assert_eq!(dets.len(), 1);
        let (dcx, dcy) = dets[0].bbox.center();
        prop_assert!((dcx - cx).abs() < 1e-2);
        prop_assert!((dcy - cy).abs() < 1e-2);
        prop_assert_eq!(dets[0].bbox.width, w);
        prop_assert_eq!(dets[0].bbox.height, h);
    }
}
