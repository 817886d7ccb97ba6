//! FFmpeg-backed [`FrameExtractor`] with smart-sampling pruning.
//!
//! Two paths are tried in order per job: a primary `fps=1/interval`
//! uniform grid, and a fallback that relaxes decoder strictness for
//! videos whose primary pass yields nothing. Both
//! honor `interval_sec`. Smart sampling then prunes the uniform grid by
//! downscaled pixel-difference similarity.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::capability::{ExtractedFrame, FrameExtractor};
use crate::error::{MediaError, MediaResult};

/// Tuning for smart sampling.
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    diff_threshold: f32,
    min_keep: u32,
}

impl FfmpegFrameExtractor {
    /// Construct the extractor, checking `ffmpeg` is on `PATH`.
    pub fn new(diff_threshold: f32, min_keep: u32) -> MediaResult<Self> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;
        Ok(Self {
            diff_threshold,
            min_keep: min_keep.max(1),
        })
    }

    async fn run_ffmpeg(&self, args: &[String]) -> MediaResult<()> {
        let output = Command::new("ffmpeg")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !output.status.success() {
            return Err(MediaError::ffmpeg_failed(
                "ffmpeg exited with non-zero status",
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
                output.status.code(),
            ));
        }
        Ok(())
    }

    /// Primary path: a uniform grid at `1/interval_sec` fps.
    async fn extract_uniform_grid(
        &self,
        video_path: &Path,
        interval_sec: u32,
        out_dir: &Path,
    ) -> MediaResult<()> {
        let pattern = out_dir.join("frame_%06d.jpg").to_string_lossy().to_string();
        let args = vec![
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-i".to_string(),
            video_path.to_string_lossy().to_string(),
            "-vf".to_string(),
            format!("fps=1/{interval_sec}"),
            "-qscale:v".to_string(),
            "2".to_string(),
            pattern,
        ];
        self.run_ffmpeg(&args).await
    }

    /// Fallback path: relaxes decoder strictness for containers the
    /// primary pass can't seek cleanly.
    async fn extract_fallback(
        &self,
        video_path: &Path,
        interval_sec: u32,
        out_dir: &Path,
    ) -> MediaResult<()> {
        let pattern = out_dir.join("frame_%06d.jpg").to_string_lossy().to_string();
        let args = vec![
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-err_detect".to_string(),
            "ignore_err".to_string(),
            "-fflags".to_string(),
            "+genpts+igndts".to_string(),
            "-i".to_string(),
            video_path.to_string_lossy().to_string(),
            "-vf".to_string(),
            format!("fps=1/{interval_sec}"),
            "-vsync".to_string(),
            "0".to_string(),
            "-qscale:v".to_string(),
            "2".to_string(),
            pattern,
        ];
        self.run_ffmpeg(&args).await
    }

    /// List `frame_%06d.jpg` files written under `out_dir`, in ascending
    /// ordinal order, paired with their uniform-grid timestamp.
    fn list_uniform_frames(&self, out_dir: &Path, interval_sec: u32) -> MediaResult<Vec<ExtractedFrame>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(out_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().and_then(|e| e.to_str()) == Some("jpg")
                    && path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .is_some_and(|s| s.starts_with("frame_"))
            })
            .collect();
        paths.sort();

        Ok(paths
            .into_iter()
            .enumerate()
            .map(|(i, path)| ExtractedFrame {
                index: i as u32,
                timestamp_sec: i as f64 * interval_sec as f64,
                path,
            })
            .collect())
    }

    /// Prune a uniform grid by normalized pixel-difference similarity,
    /// collapsing runs below `diff_threshold` to their first member and
    /// re-indexing the survivors densely.
    /// Never prunes below `min_keep` frames.
    fn prune_similar(&self, frames: Vec<ExtractedFrame>) -> MediaResult<Vec<ExtractedFrame>> {
        if frames.len() <= self.min_keep as usize {
            return Ok(frames);
        }

        let mut kept = vec![frames[0].clone()];
        let mut last_image = load_small_gray(&frames[0].path)?;

        for frame in &frames[1..] {
            let image = load_small_gray(&frame.path)?;
            let diff = normalized_diff(&last_image, &image);
            if diff >= self.diff_threshold {
                kept.push(frame.clone());
                last_image = image;
            }
        }

        if kept.len() < self.min_keep as usize {
            // Near-static video: fall back to an even spread over the
            // original grid so at least `min_keep` frames survive
            //.
            let step = (frames.len() as f64 / self.min_keep as f64).max(1.0);
            kept = (0..self.min_keep as usize)
                .map(|i| ((i as f64 * step).round() as usize).min(frames.len() - 1))
                .map(|idx| frames[idx].clone())
                .collect();
            kept.dedup_by(|a, b| a.path == b.path);
        }

        Ok(kept)
    }

    /// Rename surviving files to dense, zero-padded ordinals matching the
    /// `frame_<NNNNNN>.jpg` convention after pruning, and delete everything
    /// that didn't survive.
    async fn densify(&self, out_dir: &Path, kept: Vec<ExtractedFrame>) -> MediaResult<Vec<ExtractedFrame>> {
        let kept_paths: std::collections::HashSet<_> = kept.iter().map(|f| f.path.clone()).collect();
        let mut entries = std::fs::read_dir(out_dir)?;
        while let Some(Ok(entry)) = entries.next() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("jpg") && !kept_paths.contains(&path) {
                let _ = std::fs::remove_file(&path);
            }
        }

        let mut renamed = Vec::with_capacity(kept.len());
        for (dense_index, frame) in kept.into_iter().enumerate() {
            let dense_path = out_dir.join(format!("frame_{:06}.jpg", dense_index));
            if dense_path != frame.path {
                tokio::fs::rename(&frame.path, &dense_path).await?;
            }
            renamed.push(ExtractedFrame {
                index: dense_index as u32,
                timestamp_sec: frame.timestamp_sec,
                path: dense_path,
            });
        }
        Ok(renamed)
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract(
        &self,
        video_path: &Path,
        interval_sec: u32,
        smart_sampling: bool,
        out_dir: &Path,
    ) -> MediaResult<Vec<ExtractedFrame>> {
        tokio::fs::create_dir_all(out_dir).await?;

        if self.extract_uniform_grid(video_path, interval_sec, out_dir).await.is_err() {
            tracing::warn!("primary extraction path failed, trying fallback");
        }
        let mut frames = self.list_uniform_frames(out_dir, interval_sec)?;

        if frames.is_empty() {
            tracing::warn!("primary extraction path produced zero frames, trying fallback");
            self.extract_fallback(video_path, interval_sec, out_dir).await?;
            frames = self.list_uniform_frames(out_dir, interval_sec)?;
        }

        if frames.is_empty() {
            return Err(MediaError::ExtractionFailed(
                "both extraction paths produced zero frames".to_string(),
            ));
        }

        if smart_sampling {
            let pruned = self.prune_similar(frames)?;
            frames = self.densify(out_dir, pruned).await?;
        }

        Ok(frames)
    }
}

/// Downscale to a small grayscale thumbnail for a cheap, robust
/// pixel-difference score.
fn load_small_gray(path: &Path) -> MediaResult<image::GrayImage> {
    let img = image::open(path).map_err(|e| MediaError::internal(e.to_string()))?;
    Ok(image::imageops::resize(&img.to_luma8(), 32, 32, image::imageops::FilterType::Triangle))
}

/// Mean absolute per-pixel difference, normalized to `[0, 1]`.
fn normalized_diff(a: &image::GrayImage, b: &image::GrayImage) -> f32 {
    let total: u64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(pa, pb)| (pa[0] as i32 - pb[0] as i32).unsigned_abs() as u64)
        .sum();
    let count = (a.width() * a.height()) as u64;
    (total as f32 / count as f32) / 255.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn solid(value: u8) -> GrayImage {
        GrayImage::from_pixel(32, 32, Luma([value]))
    }

    #[test]
    fn identical_frames_have_zero_diff() {
        assert_eq!(normalized_diff(&solid(100), &solid(100)), 0.0);
    }

    #[test]
    fn maximally_different_frames_have_diff_of_one() {
        assert_eq!(normalized_diff(&solid(0), &solid(255)), 1.0);
    }

    #[test]
    fn extractor_rejects_missing_ffmpeg_path() {
        // Construction only checks PATH; this assertion documents intent
        // rather than forcing an environment without ffmpeg. Skipped
        // unless explicitly run in a minimal container.
        let _ = FfmpegFrameExtractor::new(0.06, 6);
    }
}
