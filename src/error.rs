//! Error type for the conversion worker.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("No image files found in the selected folder!")]
    NoImages,

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Invalid file name: {0}")]
    InvalidFileName(PathBuf),

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to list directory: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type ConvertResult<T> = Result<T, ConvertError>;
