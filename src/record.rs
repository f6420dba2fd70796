//! Evidence persistence.
//!
//! Every violation becomes an evidence pair under the output directory: a
//! JPEG crop of the offending region and a JSON sidecar with the structured
//! [`ViolationRecord`]. The two share an id built from the capture second,
//! the violation kind, and a process-wide monotonic sequence, so ids stay
//! unique across frames that land in the same second.
//!
//! Persistence is best-effort per record: an I/O failure on one violation is
//! logged and skipped, and never affects the rest of the frame or the
//! frames after it.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::events::{EventBus, EventPayload};
use crate::frame::Frame;
use crate::{BBox, LicensePlateInfo, Violation, ViolationRecord, ViolationSet};

/// Writes evidence records and emits `Violation` events.
pub struct ViolationRecorder {
    output_dir: PathBuf,
    sequence: AtomicU64,
}

impl ViolationRecorder {
    /// Create the recorder and its output directory. Directory creation
    /// failure is fatal: without durable storage there is no evidence trail.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).with_context(|| {
            format!("evidence directory {} unavailable", output_dir.display())
        })?;
        Ok(Self {
            output_dir,
            sequence: AtomicU64::new(1),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Persist every violation in the set and dispatch a `Violation` event
    /// per persisted record. Returns the number of records written.
    ///
    /// `plate_lookup` runs only for violations that carry a vehicle box;
    /// plate absence is expected and recorded as `null`.
    pub fn record_all(
        &self,
        frame: &Frame,
        violations: &ViolationSet,
        plate_lookup: &mut dyn FnMut(BBox) -> Option<LicensePlateInfo>,
        bus: &EventBus,
    ) -> usize {
        let mut written = 0;
        for violation in violations.iter() {
            match self.record_one(frame, violation, plate_lookup) {
                Ok(Some(record)) => {
                    written += 1;
                    bus.dispatch(&EventPayload::Violation(record));
                }
                Ok(None) => {
                    log::debug!(
                        "skipping {} evidence: degenerate crop {:?}",
                        violation.kind.slug(),
                        violation.bbox
                    );
                }
                Err(e) => {
                    log::warn!(
                        "evidence persistence failed for {}: {:#}; continuing",
                        violation.kind.slug(),
                        e
                    );
                }
            }
        }
        written
    }

    /// Persist one violation. `Ok(None)` means the crop was degenerate
    /// (bbox clipped outside the frame) and the violation is skipped.
    fn record_one(
        &self,
        frame: &Frame,
        violation: &Violation,
        plate_lookup: &mut dyn FnMut(BBox) -> Option<LicensePlateInfo>,
    ) -> Result<Option<ViolationRecord>> {
        // Prefer the vehicle region: evidence should show the vehicle, not
        // just a rider fragment.
        let evidence_bbox = violation.vehicle_bbox.unwrap_or(violation.bbox);
        let Some(crop) = frame.crop(evidence_bbox) else {
            return Ok(None);
        };

        let id = self.next_id(violation);
        let image_path = self.output_dir.join(format!("{}.jpg", id));

        let mut jpeg = Vec::new();
        crop.write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .with_context(|| format!("failed to encode evidence {}", id))?;
        let digest = hex::encode(Sha256::digest(&jpeg));

        std::fs::write(&image_path, &jpeg)
            .with_context(|| format!("failed to write {}", image_path.display()))?;

        let plate = violation.vehicle_bbox.and_then(&mut *plate_lookup);

        let record = ViolationRecord {
            id: id.clone(),
            kind: violation.kind,
            timestamp_ms: frame.timestamp_ms,
            image_path,
            image_sha256: digest,
            confidence: violation.confidence,
            bbox: violation.bbox,
            vehicle_bbox: violation.vehicle_bbox,
            rider_count: violation.rider_count,
            plate,
            source_id: frame.source_id.clone(),
        };

        let sidecar_path = self.output_dir.join(format!("{}.json", id));
        let json = serde_json::to_vec_pretty(&record)?;
        std::fs::write(&sidecar_path, json)
            .with_context(|| format!("failed to write {}", sidecar_path.display()))?;

        Ok(Some(record))
    }

    fn next_id(&self, violation: &Violation) -> String {
        let seconds = crate::now_epoch_s().unwrap_or(0);
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}-{:06}", seconds, violation.kind.slug(), seq)
    }
}
