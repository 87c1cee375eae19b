use clap::Parser;
use std::path::PathBuf;

use crate::convert::{BookMetadata, Codec, ConversionSettings};
use crate::rewrite::PatternRule;
use crate::rules_file::parse_rule_arg;

/// Assemble a directory of audio files into a chaptered m4b audiobook.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Options {
    /// Directory holding the audio files, one chapter per file
    pub input_dir: PathBuf,

    /// Output m4b file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Include files in subdirectories
    #[arg(short = 'R', long)]
    pub recursive: bool,

    /// TOML file with title rewrite rules, saved back from the editor
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Extra rewrite rule as PATTERN=>REPLACEMENT, applied after the rules file
    #[arg(short = 'r', long = "rule", value_name = "PATTERN=>REPLACEMENT", value_parser = parse_rule_arg)]
    pub extra_rules: Vec<PatternRule>,

    #[arg(long, value_enum, default_value_t = Codec::Aac)]
    pub codec: Codec,

    /// Audio bitrate, or `auto` to let the encoder choose
    #[arg(long, default_value = "128k")]
    pub bitrate: String,

    /// Sample rate in Hz, or `auto` to keep the source rate
    #[arg(long, default_value = "auto")]
    pub sample_rate: String,

    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub author: Option<String>,
    #[arg(long)]
    pub narrator: Option<String>,
    #[arg(long)]
    pub series: Option<String>,
    #[arg(long)]
    pub genre: Option<String>,
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Cover image embedded as attached picture
    #[arg(long)]
    pub cover: Option<PathBuf>,

    /// Print the resolved chapter titles instead of opening the editor
    #[arg(long)]
    pub no_tui: bool,

    /// Stop before running ffmpeg
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, default_value = "info")]
    pub log_level: String,
}

fn auto_or<T>(value: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    if value.eq_ignore_ascii_case("auto") {
        None
    } else {
        parse(value)
    }
}

impl Options {
    pub fn settings(&self) -> ConversionSettings {
        ConversionSettings {
            codec: self.codec,
            bitrate: auto_or(&self.bitrate, |v| Some(v.to_string())),
            sample_rate: auto_or(&self.sample_rate, |v| {
                let rate = v.parse::<u32>().ok();
                if rate.is_none() {
                    tracing::warn!("ignoring sample rate `{}`", v);
                }
                rate
            }),
        }
    }

    pub fn metadata(&self) -> BookMetadata {
        BookMetadata {
            title: self.title.clone(),
            author: self.author.clone(),
            narrator: self.narrator.clone(),
            series: self.series.clone(),
            genre: self.genre.clone(),
            date: self.date.clone(),
            description: self.description.clone(),
            cover: self.cover.as_ref().map(|p| std::path::absolute(p).unwrap_or_else(|_| p.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rules_and_settings() {
        let options = Options::try_parse_from([
            "m4btui",
            "books/dune",
            "-r",
            "^Track =>",
            "--rule",
            "(\\d+)=>Part {nn}",
            "--codec",
            "auto",
            "--bitrate",
            "auto",
            "--sample-rate",
            "44100",
        ])
        .unwrap();
        assert_eq!(
            options.extra_rules,
            [
                PatternRule::new("^Track ", ""),
                PatternRule::new("(\\d+)", "Part {nn}")
            ]
        );
        assert_eq!(
            options.settings(),
            ConversionSettings {
                codec: Codec::Auto,
                bitrate: None,
                sample_rate: Some(44100),
            }
        );
    }

    #[test]
    fn defaults_match_plain_aac() {
        let options = Options::try_parse_from(["m4btui", "in"]).unwrap();
        assert_eq!(options.settings(), ConversionSettings::default());
        assert_eq!(options.metadata(), BookMetadata::default());
    }

    #[test]
    fn rejects_rules_without_separator() {
        assert!(Options::try_parse_from(["m4btui", "in", "--rule", "oops"]).is_err());
    }
}
