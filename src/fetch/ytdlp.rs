use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use super::{FetchError, FetchedMedia, MediaFetcher};
use crate::library::AUDIO_EXT;

/// Downloads audio by running yt-dlp (which needs ffmpeg for extraction).
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary: PathBuf,
    /// Passed to `--audio-quality`, e.g. `192K`
    bitrate: String,
}

impl YtDlpFetcher {
    pub fn new(binary: impl Into<PathBuf>, bitrate: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            bitrate: bitrate.into(),
        }
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, query: &str, output_stem: &Path) -> Result<FetchedMedia, FetchError> {
        let target = query_target(query);
        let template = format!("{}.%(ext)s", output_stem.display());

        info!("Fetching {} into {}", target, template);

        let output = Command::new(&self.binary)
            .args(["--no-playlist", "--no-progress", "--no-simulate"])
            .args(["-f", "bestaudio/best", "-x"])
            .args(["--audio-format", AUDIO_EXT])
            .args(["--audio-quality", self.bitrate.as_str()])
            .args(["--print", "after_move:title"])
            .args(["--print", "after_move:filepath"])
            .arg("-o")
            .arg(&template)
            .arg("--")
            .arg(&target)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Failed {
                status: output.status.to_string(),
                stderr: last_error_line(&stderr),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("yt-dlp output: {}", stdout);
        let (title, path) = parse_print_output(&stdout)?;

        Ok(FetchedMedia { path, title })
    }
}

/// URLs go through untouched, anything else becomes a single-result search.
fn query_target(query: &str) -> String {
    let query = query.trim();
    if query.starts_with("http://") || query.starts_with("https://") {
        query.to_string()
    } else {
        format!("ytsearch1:{}", query)
    }
}

/// The two `--print after_move:` lines are the last two lines of stdout.
fn parse_print_output(stdout: &str) -> Result<(String, PathBuf), FetchError> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    match lines.as_slice() {
        [.., title, path] => Ok((title.to_string(), PathBuf::from(path))),
        _ => Err(FetchError::Output(stdout.trim().to_string())),
    }
}

fn last_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no error output")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_pass_through_and_terms_are_searched() {
        assert_eq!(query_target("https://example/a"), "https://example/a");
        assert_eq!(query_target("  http://x.y/z "), "http://x.y/z");
        assert_eq!(query_target("never gonna give"), "ytsearch1:never gonna give");
    }

    #[test]
    fn parses_title_and_path() {
        let out = "[info] stray line\nSong A\n/tmp/stage/abc.mp3\n\n";
        let (title, path) = parse_print_output(out).unwrap();
        assert_eq!(title, "Song A");
        assert_eq!(path, PathBuf::from("/tmp/stage/abc.mp3"));
    }

    #[test]
    fn rejects_short_output() {
        assert!(matches!(
            parse_print_output("only-one-line\n"),
            Err(FetchError::Output(_))
        ));
        assert!(parse_print_output("").is_err());
    }

    #[test]
    fn keeps_last_stderr_line() {
        let stderr = "WARNING: something\nERROR: Unsupported URL: x\n";
        assert_eq!(last_error_line(stderr), "ERROR: Unsupported URL: x");
        assert_eq!(last_error_line(""), "no error output");
    }
}
