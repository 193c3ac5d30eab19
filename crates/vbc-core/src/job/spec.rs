use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ValidationError;
use crate::formats::{OutputFormat, Resolution};

/// A conversion as submitted by a caller, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub input: PathBuf,
    /// Container name (`mp4`, `mkv`, ...).
    pub format: String,
    /// Preset name or `WxH`. None keeps the source size.
    #[serde(default)]
    pub resolution: Option<String>,
}

impl JobRequest {
    pub fn new(input: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            format: format.into(),
            resolution: None,
        }
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = Some(resolution.into());
        self
    }
}

/// A validated conversion. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    input: PathBuf,
    format: OutputFormat,
    resolution: Option<Resolution>,
    output: PathBuf,
}

impl JobSpec {
    /// Validate `request` and derive its destination inside `output_dir`.
    pub fn validate(request: &JobRequest, output_dir: &Path) -> Result<JobSpec, ValidationError> {
        let format: OutputFormat = request.format.parse()?;
        let resolution = request
            .resolution
            .as_deref()
            .map(str::parse::<Resolution>)
            .transpose()?;

        let input = request.input.clone();
        check_input(&input)?;

        let output = destination_path(&input, format, output_dir);
        if same_file(&input, &output) {
            return Err(ValidationError::OutputIsInput(output));
        }
        Ok(JobSpec {
            input,
            format,
            resolution,
            output,
        })
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    /// Destination file. Overwritten if it exists.
    pub fn output(&self) -> &Path {
        &self.output
    }
}

/// `<output_dir>/<input stem>.<format extension>`.
pub fn destination_path(input: &Path, format: OutputFormat, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "output".into());
    let mut name = stem;
    name.push(".");
    name.push(format.extension());
    let dir = if output_dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        output_dir
    };
    dir.join(name)
}

fn check_input(input: &Path) -> Result<(), ValidationError> {
    if input.as_os_str().is_empty() {
        return Err(ValidationError::EmptyInput);
    }
    let meta = match fs::metadata(input) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ValidationError::InputMissing(input.to_path_buf()))
        }
        Err(e) => {
            return Err(ValidationError::InputUnreadable {
                path: input.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };
    if !meta.is_file() {
        return Err(ValidationError::InputNotFile(input.to_path_buf()));
    }
    fs::File::open(input).map_err(|e| ValidationError::InputUnreadable {
        path: input.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
