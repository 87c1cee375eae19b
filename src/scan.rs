//! Audio file discovery and probing.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use chardetng::EncodingDetector;
use walkdir::WalkDir;

use crate::error::ScanError;

pub const AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "m4a", "m4b", "aac"];

/// One input file, in chapter order.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFile {
    pub path: PathBuf,
    /// Embedded title tag, or the cleaned file stem.
    pub title: String,
    pub duration_secs: f64,
}

/// Source of per-file facts. Real use goes through ffprobe.
pub trait Probe {
    fn duration_secs(&self, path: &Path) -> Result<f64, ScanError>;
    fn title_tag(&self, path: &Path) -> Option<String>;
    fn codec(&self, path: &Path) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FfprobeProbe;

impl FfprobeProbe {
    fn query(&self, path: &Path, args: &[&str]) -> Result<Vec<u8>, ScanError> {
        let output = Command::new("ffprobe")
            .arg("-i")
            .arg(path)
            .args(args)
            .args(["-v", "quiet", "-of", "csv=p=0"])
            .output()
            .map_err(|e| ScanError::Probe {
                path: path.to_path_buf(),
                message: format!("failed to run ffprobe: {}", e),
            })?;
        if !output.status.success() {
            return Err(ScanError::Probe {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    fn query_text(&self, path: &Path, args: &[&str]) -> Result<String, ScanError> {
        self.query(path, args)
            .map(|bytes| decode_text(&bytes).trim().to_string())
    }
}

impl Probe for FfprobeProbe {
    fn duration_secs(&self, path: &Path) -> Result<f64, ScanError> {
        let stream = self.query_text(
            path,
            &["-show_entries", "stream=duration", "-select_streams", "a:0"],
        )?;
        let duration = match stream.parse::<f64>() {
            Ok(secs) if secs > 0.0 => secs,
            _ => {
                let container = self.query_text(path, &["-show_entries", "format=duration"])?;
                container.parse::<f64>().map_err(|_| ScanError::Probe {
                    path: path.to_path_buf(),
                    message: format!("unreadable duration `{}`", container),
                })?
            }
        };
        if duration <= 0.0 {
            return Err(ScanError::InvalidDuration {
                path: path.to_path_buf(),
                duration,
            });
        }
        tracing::info!(
            "Duration for {}: {} seconds",
            path.file_name().unwrap_or_default().to_string_lossy(),
            duration
        );
        Ok(duration)
    }

    fn title_tag(&self, path: &Path) -> Option<String> {
        match self.query_text(path, &["-show_entries", "format_tags=title"]) {
            Ok(title) if !title.is_empty() => Some(title),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!("{}, using filename", err);
                None
            }
        }
    }

    fn codec(&self, path: &Path) -> Option<String> {
        match self.query_text(
            path,
            &["-show_entries", "stream=codec_name", "-select_streams", "a:0"],
        ) {
            Ok(codec) if !codec.is_empty() => Some(codec.to_lowercase()),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!("failed to get codec info: {}", err);
                None
            }
        }
    }
}

/// Decodes tool output, guessing the charset when it is not UTF-8.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

/// Strips wrapping quotes and collapses whitespace runs.
pub fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Absolute paths of the audio files under `dir`, sorted.
pub fn list_audio_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, ScanError> {
    if !dir.is_dir() {
        return Err(ScanError::NotADirectory(dir.to_path_buf()));
    }
    let root = std::path::absolute(dir)?;

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 });

    let mut found = BTreeSet::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Error walking directory: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() && is_audio(path) {
            tracing::debug!("Found audio file: {}", path.display());
            found.insert(path.to_path_buf());
        }
    }

    if found.is_empty() {
        return Err(ScanError::NoAudioFiles(dir.to_path_buf()));
    }
    tracing::info!("Found {} audio files", found.len());
    Ok(found.into_iter().collect())
}

pub fn default_title(path: &Path, probe: &impl Probe) -> String {
    let raw = probe.title_tag(path).unwrap_or_else(|| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    clean_title(&raw)
}

pub fn scan_directory(
    dir: &Path,
    recursive: bool,
    probe: &impl Probe,
) -> Result<Vec<AudioFile>, ScanError> {
    list_audio_files(dir, recursive)?
        .into_iter()
        .map(|path| {
            let duration_secs = probe.duration_secs(&path)?;
            let title = default_title(&path, probe);
            Ok(AudioFile {
                path,
                title,
                duration_secs,
            })
        })
        .collect()
}
