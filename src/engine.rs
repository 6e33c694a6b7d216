use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ExtendedColorType, ImageEncoder, ImageReader};
use log::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::error::{ConvertError, ConvertResult};
use crate::types::{
    ConversionOutcome, ConversionRequest, FileStatus, OutputMode, ProgressMessage, RunStatus,
    RunSummary, TargetFormat,
};

const SUPPORTED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "webp", "tiff"];
const DEFAULT_JPEG_QUALITY: u8 = 95;

pub struct ConversionEngine {
    jpeg_quality: u8,
}

impl Default for ConversionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionEngine {
    pub fn new() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Matches on the file name suffix, so a bare `.png` counts too.
    pub fn is_supported_image(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy().to_lowercase();
        SUPPORTED_EXTENSIONS
            .iter()
            .any(|ext| name.strip_suffix(ext).is_some_and(|rest| rest.ends_with('.')))
    }

    /// Eligible images directly inside `dir`, sorted by file name.
    pub fn list_images(&self, dir: &Path) -> ConvertResult<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(ConvertError::NotADirectory(dir.to_path_buf()));
        }

        let mut result = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                // The folder itself could not be read
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if entry.file_type().is_file() && self.is_supported_image(entry.path()) {
                result.push(entry.into_path());
            }
        }

        Ok(result)
    }

    pub fn output_directory(&self, request: &ConversionRequest) -> PathBuf {
        match request.output_mode {
            OutputMode::NewFolder => request.source_directory.join(format!(
                "converted_to_{}",
                request.target_format.label().to_lowercase()
            )),
            OutputMode::ReplaceInPlace => request.source_directory.clone(),
        }
    }

    pub fn prepare_output_directory(&self, request: &ConversionRequest) -> ConvertResult<PathBuf> {
        let output_dir = self.output_directory(request);
        fs::create_dir_all(&output_dir)?;
        Ok(output_dir)
    }

    /// Runs a whole conversion, reporting through `emit`.
    ///
    /// `cancel_flag` is checked before each file, so the file in flight
    /// always finishes. A failing file is reported and skipped; only a
    /// missing or unreadable folder, or an output folder that cannot be
    /// created, ends the run early.
    pub fn convert_folder<F>(
        &self,
        request: &ConversionRequest,
        cancel_flag: &AtomicBool,
        mut emit: F,
    ) -> RunSummary
    where
        F: FnMut(ProgressMessage),
    {
        let image_files = match self.list_images(&request.source_directory) {
            Ok(files) if files.is_empty() => {
                warn!("No images in {}", request.source_directory.display());
                return RunSummary::failed(ConvertError::NoImages.to_string());
            }
            Ok(files) => files,
            Err(e) => {
                error!("Listing {} failed: {}", request.source_directory.display(), e);
                return RunSummary::failed(format!("Conversion failed: {}", e));
            }
        };

        let output_dir = match self.prepare_output_directory(request) {
            Ok(dir) => dir,
            Err(e) => {
                error!("Cannot prepare output directory: {}", e);
                return RunSummary::failed(format!("Conversion failed: {}", e));
            }
        };

        let total = image_files.len();
        info!(
            "Converting {} file(s) in {} to {} ({:?})",
            total,
            request.source_directory.display(),
            request.target_format,
            request.output_mode
        );
        emit(ProgressMessage::Started { total });

        let action = request.output_mode.action();
        let mut succeeded_count = 0;
        let mut failed_count = 0;
        let mut canceled = false;

        for (idx, input_file) in image_files.iter().enumerate() {
            if cancel_flag.load(Ordering::Relaxed) {
                canceled = true;
                break;
            }

            let source_filename = file_name_lossy(input_file);
            let (message, outcome) = match self.convert_file(input_file, &output_dir, request) {
                Ok(output) => {
                    succeeded_count += 1;
                    let destination = file_name_lossy(&output);
                    debug!("{} -> {}", input_file.display(), output.display());
                    (
                        format!("{}: {} → {}", action, source_filename, destination),
                        ConversionOutcome {
                            source_filename,
                            destination_filename: Some(destination),
                            status: FileStatus::Converted,
                            error_detail: None,
                        },
                    )
                }
                Err(e) => {
                    failed_count += 1;
                    warn!("Failed to convert {}: {}", input_file.display(), e);
                    (
                        format!("Error converting {}: {}", source_filename, e),
                        ConversionOutcome {
                            source_filename,
                            destination_filename: None,
                            status: FileStatus::Errored,
                            error_detail: Some(e.to_string()),
                        },
                    )
                }
            };

            emit(ProgressMessage::Progress {
                percent: percent(idx + 1, total),
                message,
                current: idx + 1,
                total,
                outcome,
            });
        }

        let (status, final_message) = if canceled {
            (RunStatus::Canceled, "Conversion canceled by user".to_string())
        } else if failed_count == 0 {
            (
                RunStatus::Completed,
                format!(
                    "Successfully {} {} images to {}!",
                    action.to_lowercase(),
                    succeeded_count,
                    request.target_format
                ),
            )
        } else {
            (
                RunStatus::Completed,
                format!(
                    "{} {} of {} images to {} ({} failed)",
                    action, succeeded_count, total, request.target_format, failed_count
                ),
            )
        };

        info!("{}", final_message);
        RunSummary {
            total_files: total,
            succeeded_count,
            failed_count,
            status,
            final_message,
        }
    }

    fn convert_file(
        &self,
        input_file: &Path,
        output_dir: &Path,
        request: &ConversionRequest,
    ) -> ConvertResult<PathBuf> {
        let output_path = resolve_output_path(input_file, output_dir, request.target_format)?;
        let overwrites_input = is_same_file(input_file, &output_path);

        if let Err(e) = self.convert_single(input_file, &output_path, request.target_format) {
            if !overwrites_input && output_path.exists() {
                if let Err(cleanup) = fs::remove_file(&output_path) {
                    warn!(
                        "Could not remove partial output {}: {}",
                        output_path.display(),
                        cleanup
                    );
                }
            }
            return Err(e);
        }

        if request.output_mode == OutputMode::ReplaceInPlace && !overwrites_input {
            fs::remove_file(input_file)?;
        }

        Ok(output_path)
    }

    /// Decodes `input_file` and writes it to `output_path` as `format`.
    pub fn convert_single(
        &self,
        input_file: &Path,
        output_path: &Path,
        format: TargetFormat,
    ) -> ConvertResult<()> {
        let img = ImageReader::open(input_file)?.with_guessed_format()?.decode()?;

        let mut writer = BufWriter::new(File::create(output_path)?);
        if format.is_jpeg() {
            let rgb = img.to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality);
            encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
        } else {
            let img = encodable_for(img, format);
            img.write_to(&mut writer, format.image_format())?;
        }
        writer.flush()?;

        Ok(())
    }
}

/// Starts `convert_folder` on a worker thread. Every event and the final
/// summary go through `progress_tx`.
pub fn spawn_conversion(
    request: ConversionRequest,
    progress_tx: Sender<ProgressMessage>,
    cancel_flag: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("image-converter".to_string())
        .spawn(move || {
            let engine = ConversionEngine::new();
            let summary = engine.convert_folder(&request, &cancel_flag, |msg| {
                let _ = progress_tx.send(msg);
            });
            let _ = progress_tx.send(ProgressMessage::Finished(summary));
        })
}

/// Picks the file `input_file` converts to inside `output_dir`.
///
/// An existing file at the plain name is only reused when it is the input
/// itself; otherwise ` (1)`, ` (2)`, ... is appended to the stem.
pub fn resolve_output_path(
    input_file: &Path,
    output_dir: &Path,
    format: TargetFormat,
) -> ConvertResult<PathBuf> {
    let stem = input_file
        .file_stem()
        .ok_or_else(|| ConvertError::InvalidFileName(input_file.to_path_buf()))?;

    let candidate = output_dir.join(output_file_name(stem.to_os_string(), None, format));
    if !candidate.exists() || is_same_file(input_file, &candidate) {
        return Ok(candidate);
    }

    let mut counter = 1;
    loop {
        let candidate =
            output_dir.join(output_file_name(stem.to_os_string(), Some(counter), format));
        if !candidate.exists() {
            return Ok(candidate);
        }
        counter += 1;
    }
}

fn output_file_name(mut name: OsString, counter: Option<u32>, format: TargetFormat) -> OsString {
    if let Some(counter) = counter {
        name.push(format!(" ({})", counter));
    }
    name.push(".");
    name.push(format.extension());
    name
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

// WebP and BMP encoders only take 8-bit data, TIFF has no gray+alpha
// layout and PNG has no float variant.
fn encodable_for(img: DynamicImage, format: TargetFormat) -> DynamicImage {
    let color = img.color();
    match format {
        TargetFormat::Webp => match color {
            ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => img,
            ColorType::L16 => DynamicImage::ImageLuma8(img.to_luma8()),
            ColorType::La16 => DynamicImage::ImageLumaA8(img.to_luma_alpha8()),
            c if c.has_alpha() => DynamicImage::ImageRgba8(img.to_rgba8()),
            _ => DynamicImage::ImageRgb8(img.to_rgb8()),
        },
        TargetFormat::Bmp => match color {
            ColorType::L8 | ColorType::Rgb8 | ColorType::Rgba8 => img,
            ColorType::L16 => DynamicImage::ImageLuma8(img.to_luma8()),
            c if c.has_alpha() => DynamicImage::ImageRgba8(img.to_rgba8()),
            _ => DynamicImage::ImageRgb8(img.to_rgb8()),
        },
        TargetFormat::Tiff => match color {
            ColorType::La8 => DynamicImage::ImageRgba8(img.to_rgba8()),
            ColorType::La16 | ColorType::Rgba32F => DynamicImage::ImageRgba16(img.to_rgba16()),
            ColorType::Rgb32F => DynamicImage::ImageRgb16(img.to_rgb16()),
            _ => img,
        },
        TargetFormat::Png => match color {
            ColorType::Rgba32F => DynamicImage::ImageRgba16(img.to_rgba16()),
            ColorType::Rgb32F => DynamicImage::ImageRgb16(img.to_rgb16()),
            _ => img,
        },
        TargetFormat::Jpg | TargetFormat::Jpeg => img,
    }
}

fn percent(current: usize, total: usize) -> u8 {
    (current * 100 / total.max(1)).min(100) as u8
}

fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::sync::mpsc::channel;
    use tempfile::tempdir;

    fn write_rgb(path: &Path) {
        RgbImage::from_pixel(4, 4, Rgb([200, 30, 30])).save(path).unwrap();
    }

    fn write_rgba(path: &Path) {
        RgbaImage::from_pixel(4, 4, Rgba([10, 200, 10, 128]))
            .save(path)
            .unwrap();
    }

    fn request(dir: &Path, format: TargetFormat, mode: OutputMode) -> ConversionRequest {
        ConversionRequest {
            source_directory: dir.to_path_buf(),
            target_format: format,
            output_mode: mode,
        }
    }

    fn run(req: &ConversionRequest) -> (RunSummary, Vec<ProgressMessage>) {
        let cancel = AtomicBool::new(false);
        let mut events = Vec::new();
        let summary = ConversionEngine::new().convert_folder(req, &cancel, |m| events.push(m));
        (summary, events)
    }

    fn progress_events(events: &[ProgressMessage]) -> Vec<&ConversionOutcome> {
        events
            .iter()
            .filter_map(|m| match m {
                ProgressMessage::Progress { outcome, .. } => Some(outcome),
                _ => None,
            })
            .collect()
    }

    fn names_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn lists_supported_files_only_and_ignores_case() {
        let dir = tempdir().unwrap();
        write_rgb(&dir.path().join("b.png"));
        fs::write(dir.path().join("a.JPEG"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("anim.gif"), b"x").unwrap();
        fs::create_dir(dir.path().join("folder.png")).unwrap();

        let files = ConversionEngine::new().list_images(dir.path()).unwrap();
        let names: Vec<String> = files.iter().map(|p| file_name_lossy(p)).collect();
        assert_eq!(names, vec!["a.JPEG", "b.png"]);
    }

    #[test]
    fn listing_is_not_recursive() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        write_rgb(&dir.path().join("nested").join("deep.png"));

        let files = ConversionEngine::new().list_images(dir.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn empty_folder_fails_without_side_effects() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("readme.md"), b"hello").unwrap();

        let (summary, events) = run(&request(dir.path(), TargetFormat::Png, OutputMode::NewFolder));

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.final_message, "No image files found in the selected folder!");
        assert!(events.is_empty());
        assert_eq!(names_in(dir.path()), vec!["readme.md"]);
    }

    #[test]
    fn missing_folder_aborts_the_run() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");

        let (summary, events) = run(&request(&missing, TargetFormat::Png, OutputMode::NewFolder));

        assert_eq!(summary.status, RunStatus::Failed);
        assert!(summary.final_message.starts_with("Conversion failed:"));
        assert!(events.is_empty());
    }

    #[test]
    fn new_folder_mode_keeps_sources_and_skips_ineligible_files() {
        let dir = tempdir().unwrap();
        for name in ["a.png", "b.bmp", "c.tiff"] {
            write_rgb(&dir.path().join(name));
        }
        fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();
        fs::write(dir.path().join("anim.gif"), b"not really a gif").unwrap();
        let before: Vec<Vec<u8>> = names_in(dir.path())
            .iter()
            .map(|n| fs::read(dir.path().join(n)).unwrap())
            .collect();

        let (summary, events) = run(&request(dir.path(), TargetFormat::Jpg, OutputMode::NewFolder));

        assert_eq!(progress_events(&events).len(), 3);
        assert!(summary.is_success());
        assert_eq!(summary.succeeded_count, 3);

        let out_dir = dir.path().join("converted_to_jpg");
        assert_eq!(names_in(&out_dir), vec!["a.jpg", "b.jpg", "c.jpg"]);

        let mut after_names = names_in(dir.path());
        after_names.retain(|n| n != "converted_to_jpg");
        let after: Vec<Vec<u8>> = after_names
            .iter()
            .map(|n| fs::read(dir.path().join(n)).unwrap())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn output_folder_follows_selected_label() {
        let dir = tempdir().unwrap();
        write_rgb(&dir.path().join("pic.png"));

        run(&request(dir.path(), TargetFormat::Jpeg, OutputMode::NewFolder));

        assert!(dir.path().join("converted_to_jpeg").join("pic.jpg").is_file());
    }

    #[test]
    fn replace_mode_removes_converted_originals() {
        let dir = tempdir().unwrap();
        write_rgb(&dir.path().join("one.png"));
        write_rgb(&dir.path().join("two.bmp"));

        let (summary, _) = run(&request(dir.path(), TargetFormat::Webp, OutputMode::ReplaceInPlace));

        assert!(summary.is_success());
        assert_eq!(names_in(dir.path()), vec!["one.webp", "two.webp"]);
        assert!(summary.final_message.starts_with("Successfully replaced 2 images"));
    }

    #[test]
    fn replace_mode_keeps_file_when_output_is_input() {
        let dir = tempdir().unwrap();
        write_rgba(&dir.path().join("same.png"));

        let (summary, events) =
            run(&request(dir.path(), TargetFormat::Png, OutputMode::ReplaceInPlace));

        assert!(summary.is_success());
        assert_eq!(progress_events(&events)[0].status, FileStatus::Converted);
        assert_eq!(names_in(dir.path()), vec!["same.png"]);
        assert!(image::open(dir.path().join("same.png")).is_ok());
    }

    #[test]
    fn collision_gets_numbered_suffix() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("a.png");
        write_rgb(&input);
        fs::write(dir.path().join("a.jpg"), b"unrelated").unwrap();

        let resolved = resolve_output_path(&input, dir.path(), TargetFormat::Jpg).unwrap();
        assert_eq!(resolved, dir.path().join("a (1).jpg"));

        fs::write(dir.path().join("a (1).jpg"), b"also unrelated").unwrap();
        let resolved = resolve_output_path(&input, dir.path(), TargetFormat::Jpg).unwrap();
        assert_eq!(resolved, dir.path().join("a (2).jpg"));
    }

    #[test]
    fn collision_reuses_name_when_it_is_the_input() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("a.png");
        write_rgb(&input);

        let resolved = resolve_output_path(&input, dir.path(), TargetFormat::Png).unwrap();
        assert_eq!(resolved, input);
    }

    #[test]
    fn conversion_never_overwrites_existing_output() {
        let dir = tempdir().unwrap();
        write_rgb(&dir.path().join("a.png"));
        let out_dir = dir.path().join("converted_to_jpg");
        fs::create_dir(&out_dir).unwrap();
        fs::write(out_dir.join("a.jpg"), b"unrelated").unwrap();

        let (summary, events) = run(&request(dir.path(), TargetFormat::Jpg, OutputMode::NewFolder));

        assert!(summary.is_success());
        let outcome = progress_events(&events)[0];
        assert_eq!(outcome.destination_filename.as_deref(), Some("a (1).jpg"));
        assert_eq!(fs::read(out_dir.join("a.jpg")).unwrap(), b"unrelated");
    }

    #[test]
    fn cancel_stops_at_file_boundary() {
        let dir = tempdir().unwrap();
        for name in ["1.png", "2.png", "3.png", "4.png"] {
            write_rgb(&dir.path().join(name));
        }
        let req = request(dir.path(), TargetFormat::Bmp, OutputMode::NewFolder);
        let cancel = AtomicBool::new(false);
        let mut processed = 0;

        let summary = ConversionEngine::new().convert_folder(&req, &cancel, |m| {
            if let ProgressMessage::Progress { .. } = m {
                processed += 1;
                if processed == 2 {
                    cancel.store(true, Ordering::Relaxed);
                }
            }
        });

        assert_eq!(processed, 2);
        assert_eq!(summary.status, RunStatus::Canceled);
        assert_eq!(summary.final_message, "Conversion canceled by user");
        assert_eq!(names_in(&dir.path().join("converted_to_bmp")).len(), 2);
    }

    #[test]
    fn broken_file_is_reported_and_run_continues() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a_broken.png"), b"definitely not a png").unwrap();
        write_rgb(&dir.path().join("b_good.png"));

        let (summary, events) = run(&request(dir.path(), TargetFormat::Tiff, OutputMode::ReplaceInPlace));

        let outcomes = progress_events(&events);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].status, FileStatus::Errored);
        assert!(outcomes[0].error_detail.is_some());
        assert_eq!(outcomes[1].status, FileStatus::Converted);

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.succeeded_count, 1);
        assert_eq!(summary.failed_count, 1);
        // The broken original stays where it was
        assert_eq!(names_in(dir.path()), vec!["a_broken.png", "b_good.tiff"]);
    }

    #[test]
    fn error_messages_name_the_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.jpg"), b"garbage").unwrap();

        let (_, events) = run(&request(dir.path(), TargetFormat::Png, OutputMode::NewFolder));

        match &events[1] {
            ProgressMessage::Progress { message, current, total, percent, .. } => {
                assert!(message.starts_with("Error converting bad.jpg:"));
                assert_eq!((*current, *total, *percent), (1, 1, 100));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn uppercase_extension_converts_to_webp() {
        let dir = tempdir().unwrap();
        write_rgb(&dir.path().join("source.png"));
        fs::rename(dir.path().join("source.png"), dir.path().join("photo.PNG")).unwrap();

        let (summary, _) = run(&request(dir.path(), TargetFormat::Webp, OutputMode::NewFolder));

        assert!(summary.is_success());
        let output = dir.path().join("converted_to_webp").join("photo.webp");
        let format = ImageReader::open(&output)
            .unwrap()
            .with_guessed_format()
            .unwrap()
            .format();
        assert_eq!(format, Some(image::ImageFormat::WebP));
    }

    #[test]
    fn jpeg_drops_alpha_but_other_formats_keep_it() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("alpha.png");
        write_rgba(&input);
        let engine = ConversionEngine::new();

        let jpg = dir.path().join("alpha.jpg");
        engine.convert_single(&input, &jpg, TargetFormat::Jpeg).unwrap();
        assert_eq!(image::open(&jpg).unwrap().color(), ColorType::Rgb8);

        let tiff = dir.path().join("alpha.tiff");
        engine.convert_single(&input, &tiff, TargetFormat::Tiff).unwrap();
        assert!(image::open(&tiff).unwrap().color().has_alpha());

        let webp = dir.path().join("alpha.webp");
        engine.convert_single(&input, &webp, TargetFormat::Webp).unwrap();
        assert!(image::open(&webp).unwrap().color().has_alpha());
    }

    #[test]
    fn sixteen_bit_source_still_encodes_to_bmp() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("deep.png");
        DynamicImage::ImageRgb16(image::ImageBuffer::from_pixel(3, 3, Rgb([60000u16, 0, 0])))
            .save(&input)
            .unwrap();

        let output = dir.path().join("deep.bmp");
        ConversionEngine::new()
            .convert_single(&input, &output, TargetFormat::Bmp)
            .unwrap();
        assert_eq!(image::open(&output).unwrap().color(), ColorType::Rgb8);
    }

    #[test]
    fn every_source_color_type_converts_to_every_format() {
        let dir = tempdir().unwrap();
        let base = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 200, 10, 128])));
        let sources = [
            ("l8", DynamicImage::ImageLuma8(base.to_luma8())),
            ("la8", DynamicImage::ImageLumaA8(base.to_luma_alpha8())),
            ("l16", DynamicImage::ImageLuma16(base.to_luma16())),
            ("la16", DynamicImage::ImageLumaA16(base.to_luma_alpha16())),
            ("rgb8", DynamicImage::ImageRgb8(base.to_rgb8())),
            ("rgba8", base.clone()),
            ("rgb16", DynamicImage::ImageRgb16(base.to_rgb16())),
            ("rgba16", DynamicImage::ImageRgba16(base.to_rgba16())),
        ];
        let engine = ConversionEngine::new();

        for (name, source) in &sources {
            let input = dir.path().join(format!("{}.png", name));
            source.save(&input).unwrap();
            let had_alpha = source.color().has_alpha();

            for format in TargetFormat::ALL {
                let output = dir.path().join(format!("{}_{}.{}", name, format.label(), format.extension()));
                if let Err(e) = engine.convert_single(&input, &output, format) {
                    panic!("{} -> {} failed: {}", name, format, e);
                }

                let converted = image::open(&output).unwrap();
                match format {
                    TargetFormat::Jpg | TargetFormat::Jpeg => {
                        assert!(!converted.color().has_alpha(), "{} -> {}", name, format)
                    }
                    TargetFormat::Png | TargetFormat::Tiff | TargetFormat::Webp => assert_eq!(
                        converted.color().has_alpha(),
                        had_alpha,
                        "{} -> {}",
                        name,
                        format
                    ),
                    TargetFormat::Bmp => {}
                }
            }
        }
    }

    #[test]
    fn gray_alpha_converts_to_tiff_in_place() {
        let dir = tempdir().unwrap();
        let base = RgbaImage::from_pixel(4, 4, Rgba([90, 90, 90, 40]));
        DynamicImage::ImageLumaA8(DynamicImage::ImageRgba8(base).to_luma_alpha8())
            .save(dir.path().join("mask.png"))
            .unwrap();

        let (summary, _) = run(&request(dir.path(), TargetFormat::Tiff, OutputMode::ReplaceInPlace));

        assert_eq!(summary.failed_count, 0);
        assert_eq!(names_in(dir.path()), vec!["mask.tiff"]);
        assert!(image::open(dir.path().join("mask.tiff")).unwrap().color().has_alpha());
    }

    #[test]
    fn bare_extension_name_is_eligible() {
        let dir = tempdir().unwrap();
        write_rgb(&dir.path().join("source.png"));
        fs::rename(dir.path().join("source.png"), dir.path().join(".png")).unwrap();
        fs::write(dir.path().join("png"), b"no dot").unwrap();
        fs::write(dir.path().join("archive.xpng"), b"wrong suffix").unwrap();

        let engine = ConversionEngine::new();
        let files = engine.list_images(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join(".png")]);

        let (summary, _) = run(&request(dir.path(), TargetFormat::Jpg, OutputMode::NewFolder));
        assert!(summary.is_success());
        assert!(dir.path().join("converted_to_jpg").join(".png.jpg").is_file());
    }

    #[test]
    fn progress_percent_is_floored() {
        let dir = tempdir().unwrap();
        for name in ["a.png", "b.png", "c.png"] {
            write_rgb(&dir.path().join(name));
        }

        let (_, events) = run(&request(dir.path(), TargetFormat::Bmp, OutputMode::NewFolder));
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|m| match m {
                ProgressMessage::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();

        assert!(matches!(events[0], ProgressMessage::Started { total: 3 }));
        assert_eq!(percents, vec![33, 66, 100]);
    }

    #[test]
    fn spawned_worker_reports_through_channel() {
        let dir = tempdir().unwrap();
        write_rgb(&dir.path().join("a.png"));
        write_rgb(&dir.path().join("b.png"));
        let (tx, rx) = channel();

        let handle = spawn_conversion(
            request(dir.path(), TargetFormat::Png, OutputMode::NewFolder),
            tx,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        handle.join().unwrap();

        let messages: Vec<ProgressMessage> = rx.iter().collect();
        assert_eq!(messages.len(), 4);
        match messages.last() {
            Some(ProgressMessage::Finished(summary)) => {
                assert!(summary.is_success());
                assert_eq!(summary.total_files, 2);
            }
            other => panic!("expected summary, got {:?}", other),
        }
    }
}
