//! Report Assembler: produces the canonical Report and
//! persists it, along with annotated-frame overlays, atomically.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use entityscan_models::{BoundingBox, EntitySummary, Frame, Report, Transcript, VideoId};
use image::RgbImage;

use crate::error::{WorkerError, WorkerResult};

/// Assembles and persists the Report for one job.
pub struct ReportAssembler {
    annotate_frames: bool,
}

impl ReportAssembler {
    pub fn new(annotate_frames: bool) -> Self {
        Self { annotate_frames }
    }

    /// Build the in-memory Report from aggregated entities and the
    /// frame/transcript evidence, without touching the filesystem.
    pub fn build_report(
        &self,
        video_id: VideoId,
        filename: String,
        duration_sec: f64,
        interval_sec: u32,
        frames: &[Frame],
        entities: BTreeMap<String, EntitySummary>,
        transcript: Option<Transcript>,
    ) -> Report {
        let mut report = Report {
            video_id,
            filename,
            duration_sec: entityscan_models::round_seconds(duration_sec),
            interval_sec,
            frames_analyzed: frames.len() as u32,
            unique_entities: 0,
            entities,
            transcript,
        };
        report.recount_unique_entities();
        report
    }

    /// Write `report.json` atomically via temp-file + rename.
    pub async fn persist(&self, reports_dir: &Path, report: &Report) -> WorkerResult<PathBuf> {
        tokio::fs::create_dir_all(reports_dir).await?;
        let final_path = reports_dir.join("report.json");
        let body = serde_json::to_vec_pretty(report)?;

        let reports_dir = reports_dir.to_path_buf();
        let final_path_for_blocking = final_path.clone();
        tokio::task::spawn_blocking(move || -> WorkerResult<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&reports_dir)?;
            use std::io::Write;
            tmp.write_all(&body)?;
            tmp.persist(&final_path_for_blocking)
                .map_err(|e| WorkerError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| WorkerError::Io(std::io::Error::other(e.to_string())))??;

        Ok(final_path)
    }

    /// Draw bounding-box overlays for every frame with at least one
    /// boxed detection, recording the overlay's path on the frame it
    /// belongs to. Frames with no drawable detection produce no
    /// annotated file and are left untouched; detections without a box
    /// (discovery, boxless OCR) are simply not drawn, but remain in the
    /// report untouched.
    pub async fn annotate_frames(&self, frames_dir: &Path, frames: &mut [Frame]) -> WorkerResult<()> {
        if !self.annotate_frames {
            return Ok(());
        }
        let annotated_dir = frames_dir.join("annotated");
        tokio::fs::create_dir_all(&annotated_dir).await?;

        for frame in frames.iter_mut() {
            if !frame.has_drawable_detections() {
                continue;
            }
            let source_path = frames_dir.join(&frame.path);
            let dest_path = annotated_dir.join(&frame.path);
            let boxes: Vec<BoundingBox> = frame.detections.iter().filter_map(|d| d.bbox).collect();

            tokio::task::spawn_blocking(move || draw_overlay(&source_path, &dest_path, &boxes))
                .await
                .map_err(|e| WorkerError::Io(std::io::Error::other(e.to_string())))??;
            frame.annotated_path = Some(format!("annotated/{}", frame.path));
        }
        Ok(())
    }
}

const OVERLAY_COLOR: [u8; 3] = [255, 64, 64];

fn draw_overlay(source_path: &Path, dest_path: &Path, boxes: &[BoundingBox]) -> WorkerResult<()> {
    let image = image::open(source_path)
        .map_err(|e| WorkerError::Media(entityscan_media::MediaError::internal(e.to_string())))?;
    let mut rgb: RgbImage = image.to_rgb8();
    let (width, height) = (rgb.width(), rgb.height());

    for bbox in boxes {
        let clipped = bbox.clip_to(width, height);
        if clipped.w < 1.0 || clipped.h < 1.0 {
            continue;
        }
        draw_hollow_rect(&mut rgb, clipped.x as u32, clipped.y as u32, clipped.w as u32, clipped.h as u32);
    }

    rgb.save(dest_path)
        .map_err(|e| WorkerError::Media(entityscan_media::MediaError::internal(e.to_string())))?;
    Ok(())
}

/// Draw a 2px unfilled rectangle border directly into an RGB buffer,
/// rather than pulling in a drawing crate for what is, at bottom, setting
/// a handful of border pixels.
fn draw_hollow_rect(image: &mut RgbImage, x: u32, y: u32, w: u32, h: u32) {
    let (width, height) = (image.width(), image.height());
    let x_end = (x + w).min(width.saturating_sub(1));
    let y_end = (y + h).min(height.saturating_sub(1));
    const THICKNESS: u32 = 2;

    for px in x..=x_end {
        for t in 0..THICKNESS {
            set_pixel(image, px, y.saturating_add(t).min(height - 1));
            set_pixel(image, px, y_end.saturating_sub(t));
        }
    }
    for py in y..=y_end {
        for t in 0..THICKNESS {
            set_pixel(image, x.saturating_add(t).min(width - 1), py);
            set_pixel(image, x_end.saturating_sub(t), py);
        }
    }
}

fn set_pixel(image: &mut RgbImage, x: u32, y: u32) {
    if x < image.width() && y < image.height() {
        image.put_pixel(x, y, image::Rgb(OVERLAY_COLOR));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entityscan_models::{Detection, Source};
    use tempfile::TempDir;

    #[tokio::test]
    async fn persist_writes_report_json_atomically() {
        let dir = TempDir::new().unwrap();
        let assembler = ReportAssembler::new(false);
        let report = assembler.build_report(
            VideoId::from("abcd1234"),
            "clip.mp4".to_string(),
            10.0,
            5,
            &[Frame::new(0, 0.0, "frame_000000.jpg")],
            BTreeMap::new(),
            None,
        );

        let path = assembler.persist(dir.path(), &report).await.unwrap();
        assert!(path.exists());
        let body = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(body.contains("\"video_id\": \"abcd1234\""));
    }

    #[test]
    fn build_report_recounts_unique_entities() {
        let assembler = ReportAssembler::new(false);
        let mut entities = BTreeMap::new();
        entities.insert(
            "aircraft".to_string(),
            EntitySummary {
                count: 1,
                appearances: 1,
                presence: 1.0,
                time_ranges: vec![],
                confidence_score: 0.5,
                sources: vec![Source::Yolo],
            },
        );
        let mut frame = Frame::new(0, 0.0, "frame_000000.jpg");
        frame.detections.push(Detection::new("aircraft", Source::Yolo, 0.9));

        let report = assembler.build_report(
            VideoId::from("abcd1234"),
            "clip.mp4".to_string(),
            10.0,
            5,
            &[frame],
            entities,
            None,
        );
        assert_eq!(report.unique_entities, 1);
    }
}
