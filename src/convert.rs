//! Chaptered `.m4b` assembly through ffmpeg.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::ValueEnum;

use crate::chapter::{build_timeline, render_concat_list, render_ffmetadata};
use crate::error::ConvertError;
use crate::scan::{AudioFile, Probe};

const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Codec {
    /// Copy the audio stream when every input is already AAC.
    Auto,
    #[default]
    Aac,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionSettings {
    pub codec: Codec,
    /// `None` lets the encoder choose.
    pub bitrate: Option<String>,
    pub sample_rate: Option<u32>,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            codec: Codec::Aac,
            bitrate: Some("128k".to_string()),
            sample_rate: None,
        }
    }
}

/// Book level tags stamped onto the container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub narrator: Option<String>,
    pub series: Option<String>,
    pub genre: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub cover: Option<PathBuf>,
}

impl BookMetadata {
    /// Container tag names paired with their non-empty values.
    pub fn tags(&self) -> Vec<(&'static str, &str)> {
        let fields: [(&'static str, &Option<String>); 8] = [
            ("title", &self.title),
            ("artist", &self.author),
            ("album_artist", &self.author),
            ("composer", &self.narrator),
            ("album", &self.series),
            ("genre", &self.genre),
            ("date", &self.date),
            ("comment", &self.description),
        ];
        fields
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_deref()
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| (key, v))
            })
            .collect()
    }
}

/// Everything needed to spell out one ffmpeg invocation.
#[derive(Debug, Clone)]
pub struct FfmpegPlan<'a> {
    pub concat_list: &'a Path,
    pub chapters_file: &'a Path,
    pub output: &'a Path,
    pub settings: &'a ConversionSettings,
    pub metadata: &'a BookMetadata,
    pub copy_audio: bool,
}

pub fn build_ffmpeg_args(plan: &FfmpegPlan<'_>) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let mut push = |arg: &str| args.push(arg.into());
    for arg in ["-y", "-f", "concat", "-safe", "0", "-i"] {
        push(arg);
    }
    args.push(plan.concat_list.into());
    args.push("-i".into());
    args.push(plan.chapters_file.into());
    if let Some(cover) = &plan.metadata.cover {
        args.push("-i".into());
        args.push(cover.into());
    }

    let mut push_all = |items: &[&str]| args.extend(items.iter().map(OsString::from));
    push_all(&["-map", "0:a", "-map_metadata", "1", "-map_chapters", "1"]);
    if plan.metadata.cover.is_some() {
        push_all(&["-map", "2:v", "-c:v", "copy", "-disposition:v:0", "attached_pic"]);
    }

    if plan.copy_audio {
        push_all(&["-c:a", "copy"]);
    } else {
        push_all(&["-c:a", "aac"]);
        if let Some(bitrate) = &plan.settings.bitrate {
            push_all(&["-b:a", bitrate.as_str()]);
        }
        if let Some(rate) = plan.settings.sample_rate {
            push_all(&["-ar", rate.to_string().as_str()]);
        }
    }

    for (key, value) in plan.metadata.tags() {
        push_all(&["-metadata", format!("{}={}", key, value).as_str()]);
    }
    args.push(plan.output.into());
    args
}

fn find_executable(name: &str) -> bool {
    Command::new(name)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

pub fn check_dependencies() -> Result<(), ConvertError> {
    for tool in ["ffmpeg", "ffprobe"] {
        if !find_executable(tool) {
            tracing::error!("{} not found. Please install ffmpeg.", tool);
            return Err(ConvertError::MissingTool(tool));
        }
    }
    Ok(())
}

pub struct Converter {
    pub settings: ConversionSettings,
    pub metadata: BookMetadata,
    stop: Arc<AtomicBool>,
}

impl Converter {
    pub fn new(settings: ConversionSettings, metadata: BookMetadata) -> Self {
        Self {
            settings,
            metadata,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the returned flag kills a running conversion.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Whether the audio can be stream-copied instead of re-encoded.
    pub fn can_copy(&self, files: &[AudioFile], probe: &impl Probe) -> bool {
        if self.settings.codec != Codec::Auto {
            return false;
        }
        let all_aac = files.iter().all(|file| {
            probe
                .codec(&file.path)
                .is_some_and(|codec| codec == "aac" || codec == "mp4a")
        });
        if !all_aac {
            tracing::info!("Some files are not AAC, will convert to AAC instead of copying");
        }
        all_aac
    }

    pub fn run(
        &self,
        files: &[AudioFile],
        titles: &[String],
        output: &Path,
        probe: &impl Probe,
    ) -> Result<(), ConvertError> {
        if titles.len() != files.len() {
            return Err(ConvertError::TitleCount {
                expected: files.len(),
                actual: titles.len(),
            });
        }
        check_dependencies()?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let copy_audio = self.can_copy(files, probe);

        // control files live until the temp dir drops
        let workdir = tempfile::tempdir()?;
        let concat_list = workdir.path().join("concat.txt");
        let chapters_file = workdir.path().join("chapters.txt");
        let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
        for path in &paths {
            tracing::info!(
                "Adding file: {}",
                path.file_name().unwrap_or_default().to_string_lossy()
            );
        }
        fs::write(&concat_list, render_concat_list(&paths))?;
        fs::write(
            &chapters_file,
            render_ffmetadata(&build_timeline(files, titles)),
        )?;

        let args = build_ffmpeg_args(&FfmpegPlan {
            concat_list: &concat_list,
            chapters_file: &chapters_file,
            output,
            settings: &self.settings,
            metadata: &self.metadata,
            copy_audio,
        });
        self.run_ffmpeg(&args)?;
        tracing::info!("Conversion completed successfully!");
        Ok(())
    }

    fn run_ffmpeg(&self, args: &[OsString]) -> Result<(), ConvertError> {
        tracing::debug!("ffmpeg {:?}", args);
        let mut child = Command::new("ffmpeg")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let reader = child.stderr.take().map(|stderr| {
            let tail = Arc::clone(&tail);
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    tracing::info!("{}", line);
                    if let Ok(mut tail) = tail.lock() {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
            })
        });

        let status = loop {
            if self.stop.load(Ordering::SeqCst) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ConvertError::Cancelled);
            }
            match child.try_wait()? {
                Some(status) => break status,
                None => thread::sleep(Duration::from_millis(100)),
            }
        };
        if let Some(reader) = reader {
            let _ = reader.join();
        }

        if status.success() {
            return Ok(());
        }
        let stderr = tail
            .lock()
            .map(|tail| tail.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();
        Err(ConvertError::Ffmpeg {
            code: status.code().unwrap_or(-1),
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::tests::FixedProbe;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn plan<'a>(
        settings: &'a ConversionSettings,
        metadata: &'a BookMetadata,
        copy_audio: bool,
    ) -> FfmpegPlan<'a> {
        FfmpegPlan {
            concat_list: Path::new("/tmp/concat.txt"),
            chapters_file: Path::new("/tmp/chapters.txt"),
            output: Path::new("/out/book.m4b"),
            settings,
            metadata,
            copy_audio,
        }
    }

    #[test]
    fn encodes_with_default_settings() {
        let settings = ConversionSettings::default();
        let metadata = BookMetadata::default();
        let args = strings(&build_ffmpeg_args(&plan(&settings, &metadata, false)));
        assert_eq!(
            args.join(" "),
            "-y -f concat -safe 0 -i /tmp/concat.txt -i /tmp/chapters.txt \
             -map 0:a -map_metadata 1 -map_chapters 1 -c:a aac -b:a 128k /out/book.m4b"
        );
    }

    #[test]
    fn copy_mode_ignores_encoder_settings() {
        let settings = ConversionSettings {
            codec: Codec::Auto,
            bitrate: Some("64k".into()),
            sample_rate: Some(44100),
        };
        let metadata = BookMetadata::default();
        let args = strings(&build_ffmpeg_args(&plan(&settings, &metadata, true)));
        assert!(args.windows(2).any(|w| w == ["-c:a", "copy"]));
        assert!(!args.contains(&"-b:a".to_string()));
        assert!(!args.contains(&"-ar".to_string()));
    }

    #[test]
    fn sample_rate_and_tags_are_passed() {
        let settings = ConversionSettings {
            codec: Codec::Aac,
            bitrate: None,
            sample_rate: Some(22050),
        };
        let metadata = BookMetadata {
            title: Some("Dune".into()),
            author: Some("Frank Herbert".into()),
            narrator: Some("  ".into()),
            cover: Some(PathBuf::from("/covers/dune.jpg")),
            ..Default::default()
        };
        let args = strings(&build_ffmpeg_args(&plan(&settings, &metadata, false)));
        assert!(args.windows(2).any(|w| w == ["-ar", "22050"]));
        assert!(args.windows(2).any(|w| w == ["-i", "/covers/dune.jpg"]));
        assert!(args.windows(2).any(|w| w == ["-disposition:v:0", "attached_pic"]));
        assert!(args.windows(2).any(|w| w == ["-metadata", "title=Dune"]));
        assert!(args.windows(2).any(|w| w == ["-metadata", "album_artist=Frank Herbert"]));
        assert!(!args.iter().any(|a| a.starts_with("composer=")));
        assert_eq!(args.last().unwrap(), "/out/book.m4b");
    }

    #[test]
    fn copies_only_when_every_input_is_aac() {
        let files: Vec<AudioFile> = ["a.m4a", "b.m4a"]
            .iter()
            .map(|name| AudioFile {
                path: PathBuf::from(name),
                title: name.to_string(),
                duration_secs: 1.0,
            })
            .collect();
        let mut probe = FixedProbe::default();
        probe.codecs.insert("a.m4a".into(), "aac".into());
        probe.codecs.insert("b.m4a".into(), "mp3".into());

        let auto = Converter::new(
            ConversionSettings {
                codec: Codec::Auto,
                ..Default::default()
            },
            BookMetadata::default(),
        );
        assert!(!auto.can_copy(&files, &probe));
        probe.codecs.insert("b.m4a".into(), "mp4a".into());
        assert!(auto.can_copy(&files, &probe));

        let aac = Converter::new(ConversionSettings::default(), BookMetadata::default());
        assert!(!aac.can_copy(&files, &probe));
    }

    #[test]
    fn mismatched_titles_are_rejected_before_running() {
        let converter = Converter::new(ConversionSettings::default(), BookMetadata::default());
        let err = converter
            .run(&[], &["extra".to_string()], Path::new("out.m4b"), &FixedProbe::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::TitleCount {
                expected: 0,
                actual: 1
            }
        ));
    }
}
