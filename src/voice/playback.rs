//! Audio output: encoded-audio players and the shared audio-focus resource.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::TtsError;

/// Plays encoded audio (mp3, wav, ...) returned by a remote synthesizer.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play `audio` and resolve when playback ends (or was stopped).
    async fn play(&self, audio: Bytes, format: &str) -> Result<(), TtsError>;

    /// Interrupt playback, if any.
    fn stop(&self);
}

/// Exclusive device audio output.
///
/// Not reentrant: a holder must release before anyone else acquires.
/// `release` must be safe to call when nothing is held.
pub trait AudioFocus: Send + Sync {
    fn acquire(&self) -> Result<(), TtsError>;
    fn release(&self);
}

/// [`AudioFocus`] for platforms without a focus concept; only tracks state.
#[derive(Debug, Default)]
pub struct NoopAudioFocus {
    held: AtomicBool,
}

impl NoopAudioFocus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

impl AudioFocus for NoopAudioFocus {
    fn acquire(&self) -> Result<(), TtsError> {
        if self.held.swap(true, Ordering::SeqCst) {
            return Err(TtsError::AudioFocus("audio output already held".into()));
        }
        tracing::trace!("audio focus acquired");
        Ok(())
    }

    fn release(&self) {
        if self.held.swap(false, Ordering::SeqCst) {
            tracing::trace!("audio focus released");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayerKind {
    Ffplay,
    Mpv,
}

/// [`AudioPlayer`] that pipes audio into `ffplay` or `mpv` on stdin.
pub struct CommandPlayer {
    program: PathBuf,
    kind: PlayerKind,
    current: Mutex<Option<CancellationToken>>,
}

impl CommandPlayer {
    /// Use `explicit` if given, otherwise the first player found on `PATH`.
    pub fn detect(explicit: Option<&Path>) -> Result<Self, TtsError> {
        if let Some(path) = explicit {
            return Ok(Self::with_program(path.to_path_buf()));
        }
        ["ffplay", "mpv"]
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(Self::with_program)
            .ok_or_else(|| TtsError::NotConfigured("no ffplay or mpv found on PATH".into()))
    }

    pub fn with_program(program: PathBuf) -> Self {
        let kind = match program.file_stem().and_then(|s| s.to_str()) {
            Some("mpv") => PlayerKind::Mpv,
            _ => PlayerKind::Ffplay,
        };
        Self {
            program,
            kind,
            current: Mutex::new(None),
        }
    }

    fn args(&self) -> &'static [&'static str] {
        match self.kind {
            PlayerKind::Ffplay => &["-nodisp", "-autoexit", "-loglevel", "quiet", "-i", "pipe:0"],
            PlayerKind::Mpv => &["--no-video", "--really-quiet", "-"],
        }
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    async fn play(&self, audio: Bytes, format: &str) -> Result<(), TtsError> {
        let token = CancellationToken::new();
        {
            let mut current = self
                .current
                .lock()
                .map_err(|e| TtsError::Playback(format!("lock poisoned: {e}")))?;
            if let Some(previous) = current.replace(token.clone()) {
                previous.cancel();
            }
        }

        tracing::debug!(bytes = audio.len(), format, program = %self.program.display(), "playing audio");

        let mut child = tokio::process::Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TtsError::Playback(format!("failed to start {}: {e}", self.program.display()))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&audio)
                .await
                .map_err(|e| TtsError::Playback(format!("failed to feed player: {e}")))?;
            // Dropping stdin signals end of stream.
        }

        let finished = tokio::select! {
            status = child.wait() => Some(status),
            _ = token.cancelled() => None,
        };
        let Some(status) = finished else {
            let _ = child.kill().await;
            return Ok(());
        };
        let status = status.map_err(|e| TtsError::Playback(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(TtsError::Playback(format!(
                "{} exited with {status}",
                self.program.display()
            )))
        }
    }

    fn stop(&self) {
        let token = match self.current.lock() {
            Ok(mut current) => current.take(),
            Err(_) => None,
        };
        if let Some(token) = token {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn focus_is_exclusive_and_release_is_idempotent() {
        let focus = NoopAudioFocus::new();
        focus.release();
        focus.acquire().unwrap();
        assert!(focus.is_held());
        assert!(matches!(focus.acquire(), Err(TtsError::AudioFocus(_))));
        focus.release();
        focus.release();
        assert!(!focus.is_held());
        focus.acquire().unwrap();
    }

    #[test]
    fn player_kind_follows_program_name() {
        let mpv = CommandPlayer::with_program(PathBuf::from("/opt/bin/mpv"));
        assert_eq!(mpv.args().last(), Some(&"-"));
        let ffplay = CommandPlayer::with_program(PathBuf::from("ffplay"));
        assert!(ffplay.args().contains(&"-autoexit"));
    }

    #[tokio::test]
    async fn missing_program_is_a_playback_error() {
        let player = CommandPlayer::with_program(PathBuf::from("/nonexistent/hype-player"));
        let err = player
            .play(Bytes::from_static(b"ID3"), "mp3")
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Playback(_)));
        player.stop();
    }
}
