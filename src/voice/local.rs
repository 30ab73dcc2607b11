//! On-device speech synthesis.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::TtsError;
use crate::persona::VoiceGender;

/// Synthesizer voice tiers, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum VoiceQuality {
    #[default]
    Default,
    Enhanced,
    Premium,
}

/// One voice offered by a local synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    /// Identifier passed back to the synthesizer.
    pub id: String,
    pub name: String,
    /// BCP-47-ish tag, e.g. `en-US` or `en_US`.
    pub locale: String,
    pub gender: Option<VoiceGender>,
    pub quality: VoiceQuality,
}

/// A single request to speak.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<VoiceInfo>,
    /// Rate multiplier, 1.0 = engine default.
    pub rate: f32,
    /// Pitch multiplier, 1.0 = engine default.
    pub pitch: f32,
    /// 0.0..=1.0
    pub volume: f32,
}

/// Platform speech synthesizer.
#[async_trait]
pub trait LocalSynthesizer: Send + Sync {
    /// Voices currently installed.
    fn voices(&self) -> Vec<VoiceInfo>;

    /// Speak and resolve when the utterance has finished (or was stopped).
    async fn speak(&self, utterance: &Utterance) -> Result<(), TtsError>;

    /// Interrupt the current utterance, if any.
    fn stop(&self);
}

/// Pick a voice for `gender` in `locale`.
///
/// Order of preference: matching gender at the best quality tier, then any
/// voice in `locale`, then any voice in `default_locale`. Ties keep the
/// voice listed first.
pub fn select_voice(
    voices: &[VoiceInfo],
    gender: VoiceGender,
    locale: &str,
    default_locale: &str,
) -> Option<VoiceInfo> {
    let in_locale = |v: &&VoiceInfo| locale_matches(&v.locale, locale);

    let mut best: Option<&VoiceInfo> = None;
    for voice in voices
        .iter()
        .filter(in_locale)
        .filter(|v| v.gender == Some(gender))
    {
        if best.is_none_or(|b| voice.quality > b.quality) {
            best = Some(voice);
        }
    }

    best.or_else(|| voices.iter().find(in_locale))
        .or_else(|| {
            voices
                .iter()
                .find(|v| locale_matches(&v.locale, default_locale))
        })
        .cloned()
}

fn locale_matches(a: &str, b: &str) -> bool {
    let norm = |s: &str| s.trim().replace('_', "-").to_ascii_lowercase();
    norm(a) == norm(b)
}

// ── Command-line synthesizer ────────────────────────────────────

/// Words per minute both espeak and `say` treat as normal speed.
const BASE_WPM: f32 = 175.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SynthKind {
    Espeak,
    Say,
}

/// [`LocalSynthesizer`] backed by `espeak-ng`, `espeak`, or macOS `say`.
pub struct CommandSynthesizer {
    program: PathBuf,
    kind: SynthKind,
    voices: Vec<VoiceInfo>,
    current: Mutex<Option<CancellationToken>>,
}

impl CommandSynthesizer {
    /// Use `explicit` if given, otherwise the first synthesizer found on `PATH`.
    pub fn detect(explicit: Option<&Path>) -> Result<Self, TtsError> {
        if let Some(path) = explicit {
            return Ok(Self::with_program(path.to_path_buf()));
        }
        ["espeak-ng", "espeak", "say"]
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(Self::with_program)
            .ok_or_else(|| {
                TtsError::NotConfigured("no espeak-ng, espeak or say found on PATH".into())
            })
    }

    /// Wrap `program`, listing its voices once up front.
    pub fn with_program(program: PathBuf) -> Self {
        let kind = match program.file_stem().and_then(|s| s.to_str()) {
            Some("say") => SynthKind::Say,
            _ => SynthKind::Espeak,
        };
        let voices = list_voices(&program, kind);
        debug!(program = %program.display(), voices = voices.len(), "local synthesizer ready");
        Self {
            program,
            kind,
            voices,
            current: Mutex::new(None),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn args(&self, u: &Utterance) -> Vec<String> {
        let wpm = (BASE_WPM * u.rate).round().max(80.0) as u32;
        let mut args = Vec::new();
        match self.kind {
            SynthKind::Espeak => {
                if let Some(voice) = &u.voice {
                    args.extend(["-v".to_owned(), voice.id.clone()]);
                }
                let pitch = (50.0 * u.pitch).round().clamp(0.0, 99.0) as u32;
                let amplitude = (100.0 * u.volume).round().clamp(0.0, 200.0) as u32;
                args.extend([
                    "-s".to_owned(),
                    wpm.to_string(),
                    "-p".to_owned(),
                    pitch.to_string(),
                    "-a".to_owned(),
                    amplitude.to_string(),
                    "--".to_owned(),
                ]);
            }
            SynthKind::Say => {
                if let Some(voice) = &u.voice {
                    args.extend(["-v".to_owned(), voice.id.clone()]);
                }
                args.extend(["-r".to_owned(), wpm.to_string()]);
            }
        }
        args.push(u.text.clone());
        args
    }
}

#[async_trait]
impl LocalSynthesizer for CommandSynthesizer {
    fn voices(&self) -> Vec<VoiceInfo> {
        self.voices.clone()
    }

    async fn speak(&self, utterance: &Utterance) -> Result<(), TtsError> {
        let token = CancellationToken::new();
        {
            let mut current = self
                .current
                .lock()
                .map_err(|e| TtsError::Synthesis(format!("lock poisoned: {e}")))?;
            if let Some(previous) = current.replace(token.clone()) {
                previous.cancel();
            }
        }

        let mut child = tokio::process::Command::new(&self.program)
            .args(self.args(utterance))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TtsError::Synthesis(format!("failed to start {}: {e}", self.program.display()))
            })?;

        let finished = tokio::select! {
            status = child.wait() => Some(status),
            _ = token.cancelled() => None,
        };
        let Some(status) = finished else {
            let _ = child.kill().await;
            return Ok(());
        };
        let status = status.map_err(|e| TtsError::Synthesis(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(TtsError::Synthesis(format!(
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

fn list_voices(program: &Path, kind: SynthKind) -> Vec<VoiceInfo> {
    let arg: &[&str] = match kind {
        SynthKind::Espeak => &["--voices"],
        SynthKind::Say => &["-v", "?"],
    };
    match std::process::Command::new(program).args(arg).output() {
        Ok(output) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout);
            match kind {
                SynthKind::Espeak => parse_espeak_voices(&text),
                SynthKind::Say => parse_say_voices(&text),
            }
        }
        Ok(output) => {
            warn!(program = %program.display(), status = %output.status, "voice listing failed");
            Vec::new()
        }
        Err(e) => {
            warn!(program = %program.display(), error = %e, "voice listing failed");
            Vec::new()
        }
    }
}

/// Parse `espeak-ng --voices` output.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File          Other Languages
///  5  en-us           --/M      English_(America)  gmw/en-US
/// ```
fn parse_espeak_voices(text: &str) -> Vec<VoiceInfo> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                return None;
            }
            let gender = match cols[2].rsplit('/').next() {
                Some("M") => Some(VoiceGender::Male),
                Some("F") => Some(VoiceGender::Female),
                _ => None,
            };
            Some(VoiceInfo {
                id: cols[1].to_owned(),
                name: cols[3].replace('_', " "),
                locale: cols[1].to_owned(),
                gender,
                quality: VoiceQuality::Default,
            })
        })
        .collect()
}

/// Parse `say -v ?` output.
///
/// ```text
/// Samantha (Enhanced) en_US    # Hello! My name is Samantha.
/// ```
fn parse_say_voices(text: &str) -> Vec<VoiceInfo> {
    text.lines()
        .filter_map(|line| {
            let head = line.split('#').next()?.trim_end();
            let (name, locale) = head.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() || locale.is_empty() {
                return None;
            }
            let quality = if name.contains("(Premium)") {
                VoiceQuality::Premium
            } else if name.contains("(Enhanced)") {
                VoiceQuality::Enhanced
            } else {
                VoiceQuality::Default
            };
            Some(VoiceInfo {
                id: name.to_owned(),
                name: name.to_owned(),
                locale: locale.to_owned(),
                gender: None,
                quality,
            })
        })
        .collect()
}
