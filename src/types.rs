use std::fmt;
use std::path::PathBuf;

/// Output formats offered by the format selector.
///
/// `Jpg` and `Jpeg` are separate entries so the output folder keeps the
/// name the user picked, but both encode JPEG and write `.jpg` files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetFormat {
    Png,
    Jpg,
    Jpeg,
    Webp,
    Bmp,
    Tiff,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 6] = [
        TargetFormat::Png,
        TargetFormat::Jpg,
        TargetFormat::Jpeg,
        TargetFormat::Webp,
        TargetFormat::Bmp,
        TargetFormat::Tiff,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TargetFormat::Png => "PNG",
            TargetFormat::Jpg => "JPG",
            TargetFormat::Jpeg => "JPEG",
            TargetFormat::Webp => "WEBP",
            TargetFormat::Bmp => "BMP",
            TargetFormat::Tiff => "TIFF",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Png => "png",
            TargetFormat::Jpg | TargetFormat::Jpeg => "jpg",
            TargetFormat::Webp => "webp",
            TargetFormat::Bmp => "bmp",
            TargetFormat::Tiff => "tiff",
        }
    }

    pub fn is_jpeg(&self) -> bool {
        matches!(self, TargetFormat::Jpg | TargetFormat::Jpeg)
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            TargetFormat::Png => image::ImageFormat::Png,
            TargetFormat::Jpg | TargetFormat::Jpeg => image::ImageFormat::Jpeg,
            TargetFormat::Webp => image::ImageFormat::WebP,
            TargetFormat::Bmp => image::ImageFormat::Bmp,
            TargetFormat::Tiff => image::ImageFormat::Tiff,
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    NewFolder,
    ReplaceInPlace,
}

impl OutputMode {
    pub const ALL: [OutputMode; 2] = [OutputMode::NewFolder, OutputMode::ReplaceInPlace];

    pub fn label(&self) -> &'static str {
        match self {
            OutputMode::NewFolder => "Create new folder for converted images",
            OutputMode::ReplaceInPlace => "Replace original images with converted",
        }
    }

    /// Verb used in per-file and summary messages.
    pub fn action(&self) -> &'static str {
        match self {
            OutputMode::NewFolder => "Converted",
            OutputMode::ReplaceInPlace => "Replaced",
        }
    }
}

/// Everything the worker needs for one run. Moved into the worker thread,
/// so it cannot change once the run starts.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversionRequest {
    pub source_directory: PathBuf,
    pub target_format: TargetFormat,
    pub output_mode: OutputMode,
}

/// Form state of the interface.
#[derive(Clone)]
pub struct ConversionSettings {
    pub folder: String,
    pub target_format: TargetFormat,
    pub output_mode: OutputMode,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            folder: String::new(),
            target_format: TargetFormat::Png,
            output_mode: OutputMode::NewFolder,
        }
    }
}

impl ConversionSettings {
    pub fn to_request(&self) -> ConversionRequest {
        ConversionRequest {
            source_directory: PathBuf::from(self.folder.trim()),
            target_format: self.target_format,
            output_mode: self.output_mode,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileStatus {
    Converted,
    Errored,
}

#[derive(Clone, Debug)]
pub struct ConversionOutcome {
    pub source_filename: String,
    pub destination_filename: Option<String>,
    pub status: FileStatus,
    pub error_detail: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Canceled,
    Failed,
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub total_files: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub status: RunStatus,
    pub final_message: String,
}

impl RunSummary {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            total_files: 0,
            succeeded_count: 0,
            failed_count: 0,
            status: RunStatus::Failed,
            final_message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

#[derive(Clone, Debug)]
pub enum ProgressMessage {
    Started { total: usize },
    Progress {
        percent: u8,
        message: String,
        current: usize,
        total: usize,
        outcome: ConversionOutcome,
    },
    Finished(RunSummary),
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogEntry {
    Info(String),
    Success(String),
    Error(String),
    Warning(String),
}
