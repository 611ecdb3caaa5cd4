//! Media resolver backed by the `yt-dlp` command line tool.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    resolver::{MediaResolver, ResolvedMedia},
};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Default format selector. AAC in an MP4 container plays natively on iOS Safari.
pub const DEFAULT_FORMAT: &str = "bestaudio[ext=m4a]/best";

/// Resolves (artist, title) by taking the first YouTube search hit.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    executable: PathBuf,
    format: String,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            format: DEFAULT_FORMAT.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `ytsearch1:` limits the search to the single best hit.
    fn search_query(artist: &str, title: &str) -> String {
        format!("ytsearch1:{} - {} audio", artist.trim(), title.trim())
    }

    fn build_args(&self, artist: &str, title: &str) -> Vec<String> {
        vec![
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--geo-bypass".to_string(),
            // IPv6 routes to the media CDN time out on some networks.
            "--force-ipv4".to_string(),
            "-f".to_string(),
            self.format.clone(),
            "-g".to_string(),
            Self::search_query(artist, title),
        ]
    }

    /// First line of stdout that looks like a URL.
    fn parse_url(stdout: &str) -> Option<String> {
        stdout
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with("http://") || line.starts_with("https://"))
            .map(str::to_string)
    }

    fn format_hint(&self) -> Option<&str> {
        self.format
            .split('/')
            .next()
            .and_then(|first| first.split("[ext=").nth(1))
            .and_then(|rest| rest.strip_suffix(']'))
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    #[instrument(skip(self))]
    async fn resolve(&self, artist: &str, title: &str) -> Result<ResolvedMedia> {
        let args = self.build_args(artist, title);
        debug!(executable = %self.executable.display(), "Running yt-dlp");

        let mut command = Command::new(&self.executable);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                BridgeError::Timeout(format!("yt-dlp ran longer than {}s", self.timeout.as_secs()))
            })?
            .map_err(|e| {
                BridgeError::NotAvailable(format!(
                    "Failed to run {}: {}",
                    self.executable.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "yt-dlp exited with failure");
            return Err(BridgeError::OperationFailed(format!(
                "yt-dlp exit {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let url = Self::parse_url(&stdout).ok_or_else(|| {
            BridgeError::NotAvailable(format!("No stream URL found for {} - {}", artist, title))
        })?;

        let media = ResolvedMedia::new(url);
        Ok(match self.format_hint() {
            Some(ext) => media.with_format(ext),
            None => media,
        })
    }
}
