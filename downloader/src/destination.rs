/// Where a resolved download gets saved.
///
/// Choosing a path and confirming overwrites belongs to the caller; the
/// orchestrator only asks a [`DestinationResolver`] once the media URL is known.
use std::path::PathBuf;

use cobalt_shared::DownloadOptions;
use tracing::warn;

pub trait DestinationResolver: Send + Sync {
    /// Path to save `media_url` to, or `None` if the user declined.
    fn destination(&self, options: &DownloadOptions, media_url: &str) -> Option<PathBuf>;
}

impl<F> DestinationResolver for F
where
    F: Fn(&DownloadOptions, &str) -> Option<PathBuf> + Send + Sync,
{
    fn destination(&self, options: &DownloadOptions, media_url: &str) -> Option<PathBuf> {
        self(options, media_url)
    }
}

/// Saves into a fixed directory under a name derived from the media URL.
#[derive(Debug, Clone)]
pub struct DirectoryDestination {
    dir: PathBuf,
    overwrite: bool,
}

impl DirectoryDestination {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            overwrite: false,
        }
    }

    /// Replace files that already exist instead of declining.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

impl DestinationResolver for DirectoryDestination {
    fn destination(&self, options: &DownloadOptions, media_url: &str) -> Option<PathBuf> {
        let path = self.dir.join(file_name_for(options, media_url));
        if path.exists() && !self.overwrite {
            warn!("{} already exists and overwrite is disabled", path.display());
            return None;
        }
        Some(path)
    }
}

/// File name for `media_url`: its last path segment, made safe for the local
/// filesystem, with an extension added when it has none.
pub fn file_name_for(options: &DownloadOptions, media_url: &str) -> String {
    let segment = url::Url::parse(media_url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(String::from))
        })
        .unwrap_or_default();

    let mut name = sanitize(&segment);
    if name.is_empty() {
        name = "media".to_string();
    }

    let has_extension = std::path::Path::new(&name).extension().is_some();
    if !has_extension {
        let ext = if options.audio_only {
            options.audio_format.extension()
        } else {
            "mp4"
        };
        name.push('.');
        name.push_str(ext);
    }
    name
}

fn sanitize(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    replaced.trim_start_matches('.').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cobalt_shared::{AudioFormat, VideoCodec, VideoQuality};

    #[test]
    fn test_name_from_last_segment() {
        let opts = DownloadOptions::new("https://youtu.be/x");
        assert_eq!(file_name_for(&opts, "https://cdn.example.com/a/b/video.webm"), "video.webm");
        assert_eq!(file_name_for(&opts, "https://cdn.example.com/a/b/clip.mp4/"), "clip.mp4");
    }

    #[test]
    fn test_extension_added_from_options() {
        let audio = DownloadOptions::new("https://youtu.be/x").audio_only(AudioFormat::Opus);
        assert_eq!(file_name_for(&audio, "https://co.example/api/stream?t=abc"), "stream.opus");

        let video = DownloadOptions::new("https://youtu.be/x")
            .with_video(VideoCodec::H264, VideoQuality::P720);
        assert_eq!(file_name_for(&video, "https://co.example/api/stream?t=abc"), "stream.mp4");
    }

    #[test]
    fn test_fallback_and_sanitizing() {
        let audio = DownloadOptions::new("https://youtu.be/x").audio_only(AudioFormat::Wav);
        assert_eq!(file_name_for(&audio, "https://co.example/"), "media.wav");
        assert_eq!(file_name_for(&audio, "not a url"), "media.wav");
        assert_eq!(file_name_for(&audio, "https://co.example/..hidden.wav"), "hidden.wav");
        assert_eq!(file_name_for(&audio, "https://co.example/a%3Ab:c.wav"), "a%3Ab_c.wav");
    }

    #[test]
    fn test_existing_file_declined_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("song.mp3"), b"x").unwrap();
        let opts = DownloadOptions::new("https://youtu.be/x").audio_only(AudioFormat::Mp3);

        let resolver = DirectoryDestination::new(dir.path());
        assert_eq!(resolver.destination(&opts, "https://cdn/song.mp3"), None);
        assert_eq!(
            resolver.destination(&opts, "https://cdn/other.mp3"),
            Some(dir.path().join("other.mp3"))
        );

        let resolver = resolver.with_overwrite(true);
        assert_eq!(
            resolver.destination(&opts, "https://cdn/song.mp3"),
            Some(dir.path().join("song.mp3"))
        );
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |_: &DownloadOptions, _: &str| Some(PathBuf::from("fixed.bin"));
        let opts = DownloadOptions::new("https://youtu.be/x");
        assert_eq!(resolver.destination(&opts, "u"), Some(PathBuf::from("fixed.bin")));
    }
}
