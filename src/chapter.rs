//! Chapter timeline and the ffmpeg control files built from it.

use std::path::PathBuf;

use crate::scan::AudioFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub number: usize,
    pub title: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Lays the files end to end. Title `i` names file `i`; files past the end
/// of `titles` keep their scanned title.
pub fn build_timeline(files: &[AudioFile], titles: &[String]) -> Vec<Chapter> {
    let mut elapsed_ms = 0.0_f64;
    files
        .iter()
        .enumerate()
        .map(|(i, file)| {
            let duration_ms = file.duration_secs * 1000.0;
            let title = titles.get(i).unwrap_or(&file.title).clone();
            let chapter = Chapter {
                number: i + 1,
                title,
                start_ms: elapsed_ms as u64,
                end_ms: (elapsed_ms + duration_ms) as u64,
            };
            tracing::info!(
                "Chapter {}: {} (Duration: {:.2} seconds)",
                chapter.number,
                chapter.title,
                file.duration_secs
            );
            elapsed_ms += duration_ms;
            chapter
        })
        .collect()
}

/// Escapes a value for an FFMETADATA file.
pub fn escape_metadata(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '=' | ';' | '#' | '\n') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn render_ffmetadata(chapters: &[Chapter]) -> String {
    let mut out = String::from(";FFMETADATA1\n");
    for chapter in chapters {
        out.push_str(&format!(
            "\n[CHAPTER]\nTIMEBASE=1/1000\nSTART={}\nEND={}\ntitle={}\n",
            chapter.start_ms,
            chapter.end_ms,
            escape_metadata(&chapter.title)
        ));
    }
    out
}

/// Input list for ffmpeg's concat demuxer.
pub fn render_concat_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| {
            let quoted = path.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", quoted)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(title: &str, duration_secs: f64) -> AudioFile {
        AudioFile {
            path: PathBuf::from(format!("/books/{}.mp3", title)),
            title: title.to_string(),
            duration_secs,
        }
    }

    #[test]
    fn timeline_accumulates_durations() {
        let files = [file("a", 1.5), file("b", 2.25), file("c", 0.25)];
        let chapters = build_timeline(&files, &["Intro".into(), "Middle".into()]);
        assert_eq!(
            chapters,
            vec![
                Chapter {
                    number: 1,
                    title: "Intro".into(),
                    start_ms: 0,
                    end_ms: 1500
                },
                Chapter {
                    number: 2,
                    title: "Middle".into(),
                    start_ms: 1500,
                    end_ms: 3750
                },
                Chapter {
                    number: 3,
                    title: "c".into(),
                    start_ms: 3750,
                    end_ms: 4000
                },
            ]
        );
    }

    #[test]
    fn escapes_special_characters_once() {
        assert_eq!(escape_metadata(r"a=b;c#d\e"), r"a\=b\;c\#d\\e");
        assert_eq!(escape_metadata("plain"), "plain");
    }

    #[test]
    fn renders_ffmetadata() {
        let chapters = [Chapter {
            number: 1,
            title: "Part 1; Start".into(),
            start_ms: 0,
            end_ms: 1000,
        }];
        assert_eq!(
            render_ffmetadata(&chapters),
            ";FFMETADATA1\n\n[CHAPTER]\nTIMEBASE=1/1000\nSTART=0\nEND=1000\ntitle=Part 1\\; Start\n"
        );
    }

    #[test]
    fn quotes_concat_paths() {
        let paths = [PathBuf::from("/a/it's.mp3"), PathBuf::from("/a/b.mp3")];
        assert_eq!(
            render_concat_list(&paths),
            "file '/a/it'\\''s.mp3'\nfile '/a/b.mp3'\n"
        );
    }
}
