//! Frame annotation.
//!
//! Draws detection and violation boxes onto the working copy of a frame for
//! display surfaces. Vehicles get thin green boxes; violations get thicker
//! boxes in a per-kind color, with the rider region outlined when the
//! violation carries one. Labels are not burned into pixels; display layers
//! render them from the detections travelling alongside the frame.

use crate::detect::Detection;
use crate::frame::Frame;
use crate::{BBox, ViolationKind, ViolationSet};

pub const VEHICLE_COLOR: [u8; 3] = [0, 255, 0];
pub const RIDER_COLOR: [u8; 3] = [255, 255, 0];

const VEHICLE_STROKE: u32 = 2;
const VIOLATION_STROKE: u32 = 3;

pub fn violation_color(kind: ViolationKind) -> [u8; 3] {
    match kind {
        ViolationKind::NoHelmet => [255, 0, 0],
        ViolationKind::NoSeatbelt => [0, 0, 255],
        ViolationKind::TripleRiding => [255, 165, 0],
        ViolationKind::WrongWay => [255, 0, 255],
    }
}

/// Stroke a rectangle outline. The box is clamped to the frame; degenerate
/// boxes draw nothing.
pub fn draw_box(frame: &mut Frame, bbox: BBox, color: [u8; 3], stroke: u32) {
    let clamped = bbox.clamp_to(frame.width(), frame.height());
    if !clamped.is_valid() {
        return;
    }
    let (x1, y1) = (clamped.x1 as u32, clamped.y1 as u32);
    let (x2, y2) = (clamped.x2 as u32, clamped.y2 as u32);

    for ring in 0..stroke {
        for x in x1..x2 {
            frame.set_pixel(x, y1 + ring, color);
            frame.set_pixel(x, y2.saturating_sub(1 + ring), color);
        }
        for y in y1..y2 {
            frame.set_pixel(x1 + ring, y, color);
            frame.set_pixel(x2.saturating_sub(1 + ring), y, color);
        }
    }
}

/// Draw all detections and violations onto `frame`.
pub fn annotate(frame: &mut Frame, vehicles: &[Detection], violations: &ViolationSet) {
    for vehicle in vehicles {
        draw_box(frame, vehicle.bbox, VEHICLE_COLOR, VEHICLE_STROKE);
    }

    for violation in violations.iter() {
        let color = violation_color(violation.kind);
        // The vehicle region is the primary highlight when present.
        let highlight = violation.vehicle_bbox.unwrap_or(violation.bbox);
        draw_box(frame, highlight, color, VIOLATION_STROKE);
        if violation.vehicle_bbox.is_some() && violation.vehicle_bbox != Some(violation.bbox) {
            draw_box(frame, violation.bbox, RIDER_COLOR, VEHICLE_STROKE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::RawDetection;
    use crate::Violation;

    #[test]
    fn draw_box_paints_the_outline_only() {
        let mut frame = Frame::filled(20, 20, [0, 0, 0], 0, "test");
        draw_box(&mut frame, BBox::new(5, 5, 15, 15), [9, 9, 9], 1);

        assert_eq!(frame.pixel(5, 5), [9, 9, 9]);
        assert_eq!(frame.pixel(14, 5), [9, 9, 9]);
        assert_eq!(frame.pixel(5, 14), [9, 9, 9]);
        // Interior untouched.
        assert_eq!(frame.pixel(10, 10), [0, 0, 0]);
        // Outside untouched.
        assert_eq!(frame.pixel(4, 4), [0, 0, 0]);
    }

    #[test]
    fn draw_box_clamps_out_of_range_boxes() {
        let mut frame = Frame::filled(10, 10, [0, 0, 0], 0, "test");
        draw_box(&mut frame, BBox::new(-5, -5, 50, 50), [7, 7, 7], 1);
        assert_eq!(frame.pixel(0, 0), [7, 7, 7]);

        // Entirely outside: nothing painted.
        let mut frame = Frame::filled(10, 10, [0, 0, 0], 0, "test");
        draw_box(&mut frame, BBox::new(30, 30, 40, 40), [7, 7, 7], 1);
        for y in 0..10 {
            for x in 0..10 {
                assert_eq!(frame.pixel(x, y), [0, 0, 0]);
            }
        }
    }

    #[test]
    fn annotate_marks_vehicles_and_violations() {
        let mut frame = Frame::filled(64, 64, [0, 0, 0], 0, "test");
        let vehicles: Vec<Detection> = vec![RawDetection::new(
            2,
            0.9,
            BBox::new(2, 2, 20, 20),
        )
        .into()];
        let mut violations = ViolationSet::new();
        violations.push(Violation {
            kind: ViolationKind::NoHelmet,
            bbox: BBox::new(30, 30, 40, 50),
            confidence: 0.8,
            vehicle_bbox: Some(BBox::new(28, 35, 48, 60)),
            rider_count: None,
        });

        annotate(&mut frame, &vehicles, &violations);

        assert_eq!(frame.pixel(2, 2), VEHICLE_COLOR);
        assert_eq!(frame.pixel(28, 35), violation_color(ViolationKind::NoHelmet));
        assert_eq!(frame.pixel(30, 30), RIDER_COLOR);
    }
}
