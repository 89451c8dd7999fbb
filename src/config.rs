//! Configuration: built-in defaults, an optional TOML file, then CLI flags

use clap::Args;
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tiny_skia::ColorU8;

use crate::geometry::BarStyle;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid color '{0}': expected #RRGGBB or #AARRGGBB")]
    Color(String),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Accent color used for every bar
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub struct Accent(ColorU8);

impl Accent {
    pub fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self(ColorU8::from_rgba(red, green, blue, alpha))
    }

    /// Premultiplied ARGB8888 pixel value, as wl_shm expects it
    pub fn argb(&self) -> u32 {
        let color = self.0.premultiply();
        (color.alpha() as u32) << 24
            | (color.red() as u32) << 16
            | (color.green() as u32) << 8
            | color.blue() as u32
    }
}

impl Default for Accent {
    fn default() -> Self {
        Self::new(0xff, 0xff, 0xff, 0xc0)
    }
}

impl FromStr for Accent {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::Color(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let value = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
        let value = match hex.len() {
            6 => value | 0xff00_0000,
            8 => value,
            _ => return Err(invalid()),
        };
        let [alpha, red, green, blue] = value.to_be_bytes();
        Ok(Self::new(red, green, blue, alpha))
    }
}

impl TryFrom<String> for Accent {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Settings as they appear in the TOML file; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    frequency_step: Option<u32>,
    bar_height: Option<u32>,
    bar_width: Option<u32>,
    bar_margin: Option<u32>,
    roundness: Option<u32>,
    diminish_rate: Option<f32>,
    noise_threshold: Option<f32>,
    color: Option<Accent>,
    #[serde(default)]
    outputs: Vec<String>,
    device: Option<String>,
}

/// Command-line overrides, flattened into the top-level CLI
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// Frequency resolution of the analysis in Hz
    #[arg(short = 'f', long)]
    pub frequency_step: Option<u32>,

    /// Maximum bar height in pixels
    #[arg(short = 'H', long = "height")]
    pub bar_height: Option<u32>,

    /// Bar width in pixels
    #[arg(short = 'w', long = "width")]
    pub bar_width: Option<u32>,

    /// Margin on each side of a bar in pixels
    #[arg(short = 'm', long = "margin")]
    pub bar_margin: Option<u32>,

    /// Corner radius as a multiple of the bar height
    #[arg(short = 'r', long)]
    pub roundness: Option<u32>,

    /// Bar color as #RRGGBB or #AARRGGBB
    #[arg(short = 'c', long)]
    pub color: Option<Accent>,

    /// How fast bars fall, in amplitude per second
    #[arg(short = 'd', long)]
    pub diminish_rate: Option<f32>,

    /// Fraction of the display scale below which bars are hidden
    #[arg(short = 'n', long)]
    pub noise_threshold: Option<f32>,

    /// Only draw on outputs with this name (repeatable)
    #[arg(short = 'o', long = "output")]
    pub outputs: Vec<String>,

    /// Audio input device name
    #[arg(long)]
    pub device: Option<String>,

    /// Play a WAV file instead of capturing from an input device
    #[arg(long)]
    pub wav: Option<PathBuf>,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Resolved configuration; never mutated after startup
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub frequency_step: u32,
    pub bar_height: u32,
    pub bar_width: u32,
    pub bar_margin: u32,
    pub roundness: u32,
    pub diminish_rate: f32,
    pub noise_threshold: f32,
    pub color: Accent,
    pub outputs: Vec<String>,
    pub device: Option<String>,
    pub wav: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frequency_step: 10,
            bar_height: 16,
            bar_width: 8,
            bar_margin: 1,
            roundness: 2,
            diminish_rate: 0.5,
            noise_threshold: 0.5,
            color: Accent::default(),
            outputs: Vec::new(),
            device: None,
            wav: None,
        }
    }
}

impl Config {
    /// Resolve defaults, the config file and the CLI overrides, in that order
    pub fn load(args: &ConfigArgs) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let file = match &args.config {
            Some(path) => Some(read_file(path)?),
            None => match default_path() {
                Some(path) if path.exists() => Some(read_file(&path)?),
                _ => None,
            },
        };
        if let Some(file) = file {
            config.merge_file(file);
        }

        config.merge_args(args);
        config.validate()?;
        Ok(config)
    }

    fn merge_file(&mut self, file: FileConfig) {
        if let Some(v) = file.frequency_step {
            self.frequency_step = v;
        }
        if let Some(v) = file.bar_height {
            self.bar_height = v;
        }
        if let Some(v) = file.bar_width {
            self.bar_width = v;
        }
        if let Some(v) = file.bar_margin {
            self.bar_margin = v;
        }
        if let Some(v) = file.roundness {
            self.roundness = v;
        }
        if let Some(v) = file.diminish_rate {
            self.diminish_rate = v;
        }
        if let Some(v) = file.noise_threshold {
            self.noise_threshold = v;
        }
        if let Some(v) = file.color {
            self.color = v;
        }
        if !file.outputs.is_empty() {
            self.outputs = file.outputs;
        }
        if file.device.is_some() {
            self.device = file.device;
        }
    }

    fn merge_args(&mut self, args: &ConfigArgs) {
        if let Some(v) = args.frequency_step {
            self.frequency_step = v;
        }
        if let Some(v) = args.bar_height {
            self.bar_height = v;
        }
        if let Some(v) = args.bar_width {
            self.bar_width = v;
        }
        if let Some(v) = args.bar_margin {
            self.bar_margin = v;
        }
        if let Some(v) = args.roundness {
            self.roundness = v;
        }
        if let Some(v) = args.diminish_rate {
            self.diminish_rate = v;
        }
        if let Some(v) = args.noise_threshold {
            self.noise_threshold = v;
        }
        if let Some(v) = args.color {
            self.color = v;
        }
        if !args.outputs.is_empty() {
            self.outputs = args.outputs.clone();
        }
        if args.device.is_some() {
            self.device = args.device.clone();
        }
        if args.wav.is_some() {
            self.wav = args.wav.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name, reason: &str| ConfigError::Invalid {
            name,
            reason: reason.to_string(),
        };
        if self.frequency_step == 0 {
            return Err(invalid("frequency_step", "must be greater than zero"));
        }
        if self.bar_width == 0 {
            return Err(invalid("bar_width", "must be greater than zero"));
        }
        if self.bar_height == 0 {
            return Err(invalid("bar_height", "must be greater than zero"));
        }
        if !self.diminish_rate.is_finite() || self.diminish_rate < 0.0 {
            return Err(invalid("diminish_rate", "must be a non-negative number"));
        }
        if !(0.0..1.0).contains(&self.noise_threshold) {
            return Err(invalid("noise_threshold", "must be in [0, 1)"));
        }
        Ok(())
    }

    pub fn bar_style(&self) -> BarStyle {
        BarStyle {
            bar_width: self.bar_width as i32,
            bar_margin: self.bar_margin as i32,
            bar_height: self.bar_height as i32,
            roundness: self.roundness as i32,
        }
    }

    /// Whether a surface should be created for an output with this name
    pub fn wants_output(&self, name: Option<&str>) -> bool {
        if self.outputs.is_empty() {
            return true;
        }
        name.is_some_and(|name| self.outputs.iter().any(|wanted| wanted == name))
    }
}

/// `<config dir>/wav/config.toml`
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "wav").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
