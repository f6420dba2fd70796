use anyhow::Result;

use super::model::{
    ObjectModel, RawDetection, CAR_CLASS, MOTORCYCLE_CLASS, PERSON_CLASS, TRUCK_CLASS,
};
use crate::frame::Frame;
use crate::BBox;

/// Model stub that replays scripted detections. Tests drive the violation
/// rules with it; `fixed` returns the same scene on every pass, `sequence`
/// cycles through scenes one inference pass at a time.
pub struct ScriptedModel {
    scenes: Vec<Vec<RawDetection>>,
    cursor: usize,
    fixed: bool,
}

impl ScriptedModel {
    /// Same detections on every inference pass.
    pub fn fixed(detections: Vec<RawDetection>) -> Self {
        Self {
            scenes: vec![detections],
            cursor: 0,
            fixed: true,
        }
    }

    /// One scene per inference pass, cycling at the end.
    pub fn sequence(scenes: Vec<Vec<RawDetection>>) -> Self {
        Self {
            scenes,
            cursor: 0,
            fixed: false,
        }
    }

    pub fn empty() -> Self {
        Self::fixed(Vec::new())
    }
}

impl ObjectModel for ScriptedModel {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn infer(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        if self.scenes.is_empty() {
            return Ok(Vec::new());
        }
        if self.fixed {
            return Ok(self.scenes[0].clone());
        }
        let scene = self.scenes[self.cursor % self.scenes.len()].clone();
        self.cursor += 1;
        Ok(scene)
    }
}

/// Deterministic synthetic traffic for bring-up without model weights.
///
/// Emits a car and a truck drifting across the frame, plus a periodic
/// motorcycle with riders so the violation path gets exercised end to end.
pub struct SyntheticTrafficModel {
    tick: u64,
}

impl SyntheticTrafficModel {
    pub fn new() -> Self {
        Self { tick: 0 }
    }
}

impl Default for SyntheticTrafficModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectModel for SyntheticTrafficModel {
    fn name(&self) -> &'static str {
        "synthetic-traffic"
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        self.tick += 1;
        let w = frame.width() as i32;
        let h = frame.height() as i32;
        let drift = ((self.tick * 7) % w.max(1) as u64) as i32;

        let mut detections = vec![
            RawDetection::new(
                CAR_CLASS,
                0.91,
                BBox::new(drift % (w - 120).max(1), h / 2, drift % (w - 120).max(1) + 110, h / 2 + 60),
            ),
            RawDetection::new(
                TRUCK_CLASS,
                0.84,
                BBox::new(w / 4, h / 4, w / 4 + 160, h / 4 + 90),
            ),
        ];

        // Every tenth scene: a motorcycle carrying three riders.
        if self.tick % 10 == 0 {
            let bike = BBox::new(w / 2, h / 2, w / 2 + 60, h / 2 + 90);
            detections.push(RawDetection::new(MOTORCYCLE_CLASS, 0.88, bike));
            for i in 0..3i32 {
                detections.push(RawDetection::new(
                    PERSON_CLASS,
                    0.75,
                    bike.translate(i * 15 - 15, -40),
                ));
            }
        }

        Ok(detections)
    }
}
