use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Global configuration loaded from `~/.config/vbc/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VbcConfig {
    /// Explicit path to the ffmpeg binary. When absent, the bundled location,
    /// `PATH`, and common install locations are searched.
    pub engine_path: Option<PathBuf>,
    /// Maximum number of conversions running at once (None = whole batch at once).
    pub max_concurrent_jobs: Option<usize>,
    /// Upper bound for the `ffmpeg -version` availability probe.
    pub probe_timeout_secs: u64,
    /// Time a cancelled process gets to exit after SIGTERM before it is killed.
    pub grace_period_secs: f64,
    /// Time to wait for exit after a kill (or after output EOF) before giving up on the process.
    pub kill_wait_secs: f64,
    /// Directory converted files are written to (None = current directory).
    pub output_dir: Option<PathBuf>,
    /// Number of engine output lines retained per job for diagnostics.
    pub log_tail_lines: usize,
    /// Container used when the CLI is not given `--format`.
    pub default_format: String,
    /// Resolution used when the CLI is not given `--resolution` ("source" = keep source size).
    pub default_resolution: Option<String>,
}

impl Default for VbcConfig {
    fn default() -> Self {
        Self {
            engine_path: None,
            max_concurrent_jobs: None,
            probe_timeout_secs: 5,
            grace_period_secs: 5.0,
            kill_wait_secs: 2.0,
            output_dir: None,
            log_tail_lines: 40,
            default_format: "mp4".to_string(),
            default_resolution: Some("vga".to_string()),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("vbc")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<VbcConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = VbcConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: VbcConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = VbcConfig::default();
        assert!(cfg.engine_path.is_none());
        assert!(cfg.max_concurrent_jobs.is_none());
        assert_eq!(cfg.probe_timeout_secs, 5);
        assert_eq!(cfg.log_tail_lines, 40);
        assert_eq!(cfg.default_format, "mp4");
        assert_eq!(cfg.default_resolution.as_deref(), Some("vga"));
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = VbcConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: VbcConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.probe_timeout_secs, cfg.probe_timeout_secs);
        assert_eq!(parsed.log_tail_lines, cfg.log_tail_lines);
        assert_eq!(parsed.default_format, cfg.default_format);
        assert_eq!(parsed.default_resolution, cfg.default_resolution);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            engine_path = "/opt/ffmpeg/bin/ffmpeg"
            max_concurrent_jobs = 2
            probe_timeout_secs = 10
            grace_period_secs = 1.5
            kill_wait_secs = 0.5
            output_dir = "/tmp/out"
            log_tail_lines = 8
            default_format = "mkv"
        "#;
        let cfg: VbcConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            cfg.engine_path.as_deref(),
            Some(std::path::Path::new("/opt/ffmpeg/bin/ffmpeg"))
        );
        assert_eq!(cfg.max_concurrent_jobs, Some(2));
        assert_eq!(cfg.probe_timeout_secs, 10);
        assert!((cfg.grace_period_secs - 1.5).abs() < 1e-9);
        assert!((cfg.kill_wait_secs - 0.5).abs() < 1e-9);
        assert_eq!(cfg.output_dir.as_deref(), Some(std::path::Path::new("/tmp/out")));
        assert_eq!(cfg.log_tail_lines, 8);
        assert_eq!(cfg.default_format, "mkv");
        assert_eq!(cfg.default_resolution.as_deref(), Some("vga"));
    }

    #[test]
    fn config_missing_fields_use_defaults() {
        let cfg: VbcConfig = toml::from_str("max_concurrent_jobs = 3\n").unwrap();
        assert_eq!(cfg.max_concurrent_jobs, Some(3));
        assert_eq!(cfg.probe_timeout_secs, 5);
        assert!((cfg.grace_period_secs - 5.0).abs() < 1e-9);
        assert_eq!(cfg.log_tail_lines, 40);
        assert_eq!(cfg.default_format, "mp4");
        assert_eq!(cfg.default_resolution.as_deref(), Some("vga"));
    }
}
