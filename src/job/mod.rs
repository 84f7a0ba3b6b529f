//! One worker's pass over its slice of the index.
//!
//! The orchestrator wires the collaborators together: objects come from the
//! input store, PDFs go through the rasterizer and images through the codec,
//! each raster goes through detection and cropping, all crops of an object
//! are composed into one mosaic, and the mosaic is written to the output
//! store. Every object ends up as one [`ObjectRecord`] in the [`JobLedger`]
//! accumulator; a failing object never stops the loop.

mod report;

pub use report::{ledger_key, ledger_prefix, JobLedger, ObjectRecord, ObjectStatus};

use std::time::{Duration, Instant};

use image::RgbImage;

use crate::crop::{export_crops, CircleCrop};
use crate::detect::{AdaptiveCircleDetector, CircleTransform};
use crate::error::RowmarkError;
use crate::mosaic::{compose_mosaic, MosaicOptions};
use crate::raster::pdf::PdfRasterizer;
use crate::raster::{ImageCodec, ObjectKind};
use crate::storage::ObjectStore;

/// Storage key of the mosaic for `object` within a job.
pub fn mosaic_key(job_name: &str, object: &str, extension: &str) -> String {
    format!("{}/mosaics/{}.{}", job_name, object.trim_start_matches('/'), extension)
}

/// Formats an elapsed time as `1h 2m 3.45s`, dropping leading zero units.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let hours = (total / 3600.0).floor() as u64;
    let minutes = ((total % 3600.0) / 60.0).floor() as u64;
    let seconds = total % 60.0;
    match (hours, minutes) {
        (0, 0) => format!("{:.2}s", seconds),
        (0, m) => format!("{}m {:.2}s", m, seconds),
        (h, m) => format!("{}h {}m {:.2}s", h, m, seconds),
    }
}

/// Drives detection, cropping, and mosaic composition for a list of objects.
pub struct JobOrchestrator<'a, T: CircleTransform> {
    pub job_name: &'a str,
    pub task_index: usize,
    pub input: &'a dyn ObjectStore,
    pub output: &'a dyn ObjectStore,
    pub rasterizer: &'a dyn PdfRasterizer,
    pub codec: &'a dyn ImageCodec,
    pub detector: &'a AdaptiveCircleDetector<T>,
    pub mosaic: MosaicOptions,
}

impl<T: CircleTransform> JobOrchestrator<'_, T> {
    /// Processes `objects` in order, appending one record per non-blank name.
    pub fn run(&self, objects: &[String], mut ledger: JobLedger) -> JobLedger {
        let job_start = Instant::now();

        // Names are storage keys and are used verbatim; only blank lines are dropped
        for object in objects.iter().map(String::as_str).filter(|o| !o.trim().is_empty()) {
            let object_start = Instant::now();
            let kind = ObjectKind::from_name(object);
            let record = match self.process_object(object, kind) {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!("job {}: {} failed: {}", self.task_index, object, err);
                    ObjectRecord::new(object, kind, ObjectStatus::Failed).with_message(err.to_string())
                }
            };
            tracing::info!(
                "job {}: {} finished as {} in {}",
                self.task_index,
                object,
                record.status.as_str(),
                format_elapsed(object_start.elapsed())
            );
            ledger.push(record);
        }

        tracing::info!(
            "job {}: {} object(s) in {}",
            self.task_index,
            ledger.records.len(),
            format_elapsed(job_start.elapsed())
        );
        ledger
    }

    /// Processes one object end to end.
    ///
    /// Recoverable conditions (unsupported type, nothing found, oversized
    /// mosaic, empty PDF conversion) are returned as records; I/O and decode
    /// failures are returned as errors for the caller to record.
    pub fn process_object(&self, object: &str, kind: ObjectKind) -> Result<ObjectRecord, RowmarkError> {
        let rasters = match kind {
            ObjectKind::Other => {
                tracing::info!("not a valid document or image: {:?}", object);
                return Ok(ObjectRecord::new(object, kind, ObjectStatus::Skipped)
                    .with_message("unsupported extension"));
            }
            ObjectKind::Pdf => {
                let bytes = self.input.get(object)?;
                let conversion_start = Instant::now();
                let conversion = self.rasterizer.rasterize(&bytes);
                tracing::debug!(
                    "{} contained {} page(s), converted with message {:?}",
                    object,
                    conversion.page_count,
                    conversion.message
                );
                tracing::info!(
                    "job {}: conversion of {} took {}",
                    self.task_index,
                    object,
                    format_elapsed(conversion_start.elapsed())
                );
                if conversion.is_empty() {
                    return Ok(ObjectRecord::new(object, kind, ObjectStatus::Failed)
                        .with_message(conversion.message));
                }
                conversion.images
            }
            ObjectKind::Image => {
                let bytes = self.input.get(object)?;
                let image = self.codec.decode(&bytes).map_err(|err| match err {
                    RowmarkError::Decode { source, .. } => RowmarkError::Decode {
                        context: object.to_string(),
                        source,
                    },
                    other => other,
                })?;
                vec![image]
            }
        };

        let mut record = ObjectRecord::new(object, kind, ObjectStatus::NoCircles);
        record.pages = rasters.len();

        let detection_start = Instant::now();
        let crops = self.crops_for_rasters(object, &rasters);
        tracing::info!(
            "job {}: circle detection in {} took {}",
            self.task_index,
            object,
            format_elapsed(detection_start.elapsed())
        );
        record.circles = crops.len();
        if crops.is_empty() {
            return Ok(record);
        }

        let Some(mosaic) = compose_mosaic(&crops, &self.mosaic) else {
            record.status = ObjectStatus::Oversized;
            record.message = "mosaic exceeds pixel cap".to_string();
            return Ok(record);
        };

        let key = mosaic_key(self.job_name, object, self.codec.extension());
        self.output.put(&key, &self.codec.encode(&mosaic)?)?;
        record.status = ObjectStatus::Mosaic;
        record.output_key = Some(key);
        Ok(record)
    }

    /// Detects and crops every raster, concatenating crops in page order.
    fn crops_for_rasters(&self, object: &str, rasters: &[RgbImage]) -> Vec<CircleCrop> {
        let mut all = Vec::new();
        for (page, raster) in rasters.iter().enumerate() {
            let detection = self.detector.detect(raster);
            if !detection.is_usable(self.detector.config()) {
                tracing::debug!(
                    "{} page {}: no usable detection ({} circle(s))",
                    object,
                    page + 1,
                    detection.circles.len()
                );
                continue;
            }
            let offset = all.len();
            all.extend(export_crops(raster, &detection).into_iter().map(|mut crop| {
                crop.ordinal += offset;
                crop
            }));
        }
        all
    }
}
