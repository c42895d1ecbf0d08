//! Filesystem layout for one run.
//!
//! ```text
//! <output_root>/
//!   result_<YYYYMMDD><NNNN>/
//!     data/<safe-stem>-result_<YYYYMMDD><NNNN>.png
//!   result_<YYYYMMDD><NNNN>.csv
//!   result_<YYYYMMDD><NNNN>.html
//! ```

use crate::{safe_file_stem, ImageFormat, SweepError};
use chrono::NaiveDate;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory (relative to the run directory) holding screenshots.
pub const DATA_DIR: &str = "data";

/// Pick the first `result_<date><NNNN>` name not already present under `root`.
pub fn allocate_batch_name(root: &Path, date: NaiveDate) -> String {
    let date = date.format("%Y%m%d");
    let mut counter: u32 = 1;
    loop {
        let name = format!("result_{date}{counter:04}");
        if !root.join(&name).exists() {
            return name;
        }
        counter += 1;
    }
}

#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
    batch_name: String,
    image_format: ImageFormat,
}

impl RunLayout {
    pub fn new(root: impl Into<PathBuf>, batch_name: impl Into<String>, image_format: ImageFormat) -> Self {
        Self {
            root: root.into(),
            batch_name: batch_name.into(),
            image_format,
        }
    }

    /// Layout for a new run today under `root`.
    pub fn for_today(root: impl Into<PathBuf>, image_format: ImageFormat) -> Self {
        let root = root.into();
        let batch_name = allocate_batch_name(&root, chrono::Local::now().date_naive());
        Self::new(root, batch_name, image_format)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn batch_name(&self) -> &str {
        &self.batch_name
    }

    pub fn batch_dir(&self) -> PathBuf {
        self.root.join(&self.batch_name)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.batch_dir().join(DATA_DIR)
    }

    pub fn csv_report_path(&self) -> PathBuf {
        self.root.join(format!("{}.csv", self.batch_name))
    }

    pub fn html_report_path(&self) -> PathBuf {
        self.root.join(format!("{}.html", self.batch_name))
    }

    /// Create root, run and data directories if absent.
    pub async fn prepare(&self) -> Result<(), SweepError> {
        let data_dir = self.data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| SweepError::io(&data_dir, e))?;
        debug!(path = %data_dir.display(), "run directories ready");
        Ok(())
    }

    /// Screenshot path relative to the run directory: `data/<stem>-<batch>.<ext>`.
    pub fn screenshot_ref(&self, url: &str) -> String {
        format!(
            "{}/{}-{}.{}",
            DATA_DIR,
            safe_file_stem(url),
            self.batch_name,
            self.image_format.extension()
        )
    }

    /// Encode `png` in the configured format and write it at `screenshot_ref`.
    pub async fn write_image(&self, screenshot_ref: &str, png: &[u8]) -> Result<PathBuf, SweepError> {
        let bytes = encode_image(png, self.image_format)?;
        let path = self.batch_dir().join(screenshot_ref);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| SweepError::io(&path, e))?;
        debug!(path = %path.display(), "screenshot saved");
        Ok(path)
    }
}

fn encode_image(png: &[u8], format: ImageFormat) -> Result<Vec<u8>, SweepError> {
    match format {
        ImageFormat::Png => Ok(png.to_vec()),
        ImageFormat::Jpeg => {
            let img = image::load_from_memory(png)
                .map_err(|e| SweepError::ImageEncoding(e.to_string()))?;
            // JPEG has no alpha channel.
            let rgb = image::DynamicImage::ImageRgb8(img.to_rgb8());

            let mut jpeg_data = Vec::new();
            rgb.write_to(&mut Cursor::new(&mut jpeg_data), image::ImageFormat::Jpeg)
                .map_err(|e| SweepError::ImageEncoding(e.to_string()))?;
            Ok(jpeg_data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn batch_name_skips_existing_runs() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        assert_eq!(allocate_batch_name(dir.path(), date), "result_202403090001");

        std::fs::create_dir(dir.path().join("result_202403090001")).unwrap();
        std::fs::create_dir(dir.path().join("result_202403090002")).unwrap();
        assert_eq!(allocate_batch_name(dir.path(), date), "result_202403090003");
    }

    #[test]
    fn paths_follow_layout() {
        let layout = RunLayout::new("/out", "result_202401010001", ImageFormat::Png);
        assert_eq!(layout.batch_dir(), PathBuf::from("/out/result_202401010001"));
        assert_eq!(layout.data_dir(), PathBuf::from("/out/result_202401010001/data"));
        assert_eq!(layout.csv_report_path(), PathBuf::from("/out/result_202401010001.csv"));
        assert_eq!(layout.html_report_path(), PathBuf::from("/out/result_202401010001.html"));
        assert_eq!(
            layout.screenshot_ref("https://example.com"),
            "data/example.com-result_202401010001.png"
        );
    }

    #[test]
    fn jpeg_layout_uses_jpg_extension() {
        let layout = RunLayout::new("/out", "b", ImageFormat::Jpeg);
        assert_eq!(layout.screenshot_ref("http://a.io:81"), "data/a.io_81-b.jpg");
    }

    #[tokio::test]
    async fn prepare_then_write_png() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::new(dir.path(), "result_x", ImageFormat::Png);
        layout.prepare().await.unwrap();

        let png = tiny_png();
        let reference = layout.screenshot_ref("https://example.com");
        let path = layout.write_image(&reference, &png).await.unwrap();

        assert_eq!(std::fs::read(path).unwrap(), png);
    }

    #[tokio::test]
    async fn jpeg_is_reencoded() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::new(dir.path(), "result_x", ImageFormat::Jpeg);
        layout.prepare().await.unwrap();

        let reference = layout.screenshot_ref("https://example.com");
        let path = layout.write_image(&reference, &tiny_png()).await.unwrap();

        let written = std::fs::read(path).unwrap();
        assert_eq!(&written[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn write_without_prepare_fails() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::new(dir.path(), "missing", ImageFormat::Png);
        let err = layout.write_image("data/x.png", &tiny_png()).await.unwrap_err();
        assert!(matches!(err, SweepError::Io { .. }));
    }
}
