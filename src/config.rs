//! Command-line configuration for the `bioxel-volume` binary.
//!
//! Every option can also be set through an environment variable with the
//! `BIOXEL_` prefix:
//!
//! - `BIOXEL_SERIES` - DICOM SeriesInstanceUID to load (default: first series)
//! - `BIOXEL_KIND` - layer kind: scalar, label or color (default: scalar)
//! - `BIOXEL_BIOXEL_SIZE` - target voxel size, one value or three comma-separated
//! - `BIOXEL_OUTPUT` - project archive to write
//! - `BIOXEL_CACHE_DIR` - directory receiving raw cache frames

use clap::Parser;
use std::path::PathBuf;

use crate::enums::Kind;
use crate::pipeline::PipelineConfig;

/// Bioxel volume - import a volume source and resample it.
///
/// Reads MRC, OME-TIFF, DICOM, NIfTI or numbered image sequences into a
/// canonical 5D layer, optionally resamples it to a target voxel size and
/// stores the result as a project archive and/or raw cache frames.
#[derive(Parser, Debug, Clone)]
#[command(name = "bioxel-volume")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// File or directory to import.
    pub input: PathBuf,

    /// DICOM SeriesInstanceUID to load; empty selects the first series.
    #[arg(long, default_value = "", env = "BIOXEL_SERIES")]
    pub series: String,

    /// Semantic kind of the imported layer.
    #[arg(long, default_value_t = Kind::Scalar, env = "BIOXEL_KIND")]
    pub kind: Kind,

    /// Target voxel size in world units, either one value or X,Y,Z.
    #[arg(long, env = "BIOXEL_BIOXEL_SIZE", value_delimiter = ',')]
    pub bioxel_size: Option<Vec<f64>>,

    /// Project archive (.zip) to write.
    #[arg(short, long, env = "BIOXEL_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Directory receiving one raw file per frame.
    #[arg(long, env = "BIOXEL_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Store one binary layer per label value instead of the label layer.
    #[arg(long, default_value_t = false)]
    pub split_labels: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(size) = &self.bioxel_size {
            if size.len() != 1 && size.len() != 3 {
                return Err(format!(
                    "--bioxel-size takes one value or three (X,Y,Z), got {}",
                    size.len()
                ));
            }
            if size.iter().any(|v| !v.is_finite() || *v <= 0.0) {
                return Err("--bioxel-size values must be positive".to_string());
            }
        }

        if self.split_labels && self.kind != Kind::Label {
            return Err("--split-labels needs --kind label".to_string());
        }

        if self.output.is_none() && self.cache_dir.is_none() {
            return Err("nothing to write: set --output and/or --cache-dir".to_string());
        }

        Ok(())
    }

    /// Requested voxel size expanded to three axes.
    pub fn target_bioxel_size(&self) -> Option<[f64; 3]> {
        match self.bioxel_size.as_deref()? {
            [v] => Some([*v; 3]),
            [x, y, z] => Some([*x, *y, *z]),
            _ => None,
        }
    }

    /// Project name: the output file stem, or the input name.
    pub fn project_name(&self) -> String {
        self.output
            .as_deref()
            .unwrap_or(&self.input)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    }

    /// Pipeline configuration without progress reporting.
    pub fn pipeline(&self) -> PipelineConfig {
        let config = PipelineConfig::new().series_id(self.series.clone());
        match &self.cache_dir {
            Some(dir) => config.cache_dir(dir.clone()),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("bioxel-volume").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn single_bioxel_size_is_isotropic() {
        let config = parse(&["scan.mrc", "--bioxel-size", "0.5", "-o", "out.zip"]);
        assert!(config.validate().is_ok());
        assert_eq!(config.target_bioxel_size(), Some([0.5, 0.5, 0.5]));
        assert_eq!(config.project_name(), "out");
    }

    #[test]
    fn three_bioxel_sizes_are_per_axis() {
        let config = parse(&["scan.mrc", "--bioxel-size", "1,2,3", "--cache-dir", "cache"]);
        assert_eq!(config.target_bioxel_size(), Some([1.0, 2.0, 3.0]));
        assert_eq!(config.pipeline().cache_dir.as_deref(), Some(std::path::Path::new("cache")));
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        assert!(parse(&["scan.mrc", "--bioxel-size", "1,2", "-o", "a.zip"]).validate().is_err());
        assert!(parse(&["scan.mrc", "--bioxel-size", "0", "-o", "a.zip"]).validate().is_err());
        assert!(parse(&["scan.mrc", "--split-labels", "-o", "a.zip"]).validate().is_err());
        assert!(parse(&["scan.mrc"]).validate().is_err());
    }

    #[test]
    fn kind_parses_case_insensitively() {
        let config = parse(&["seg.nii", "--kind", "Label", "--split-labels", "-o", "seg.zip"]);
        assert_eq!(config.kind, Kind::Label);
        assert!(config.validate().is_ok());
    }
}
