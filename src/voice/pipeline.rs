//! Voice delivery pipeline.
//!
//! `speak` sanitizes the text, tries the remote endpoint when one is
//! configured, and falls back to on-device synthesis on any remote failure.
//! Exactly one playback is active at a time: a new `speak` tears down the
//! previous one first, and `stop` tears down whatever is active and releases
//! audio focus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::local::{CommandSynthesizer, LocalSynthesizer, Utterance, select_voice};
use super::playback::{AudioFocus, AudioPlayer, CommandPlayer, NoopAudioFocus};
use super::remote::RemoteTts;
use super::sanitize::strip_emoji;
use super::TtsError;
use crate::config::TtsConfig;
use crate::persona::Persona;

/// Observable playback state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceStatus {
    pub speaking: bool,
    /// The last `speak` fell back from remote to local synthesis.
    pub using_fallback: bool,
}

/// Which backend produced audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Remote,
    Local,
}

/// How a `speak` call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed { backend: Backend },
    /// Interrupted by `stop` or a newer `speak`.
    Stopped,
    /// Every available backend failed.
    Failed(String),
    /// Nothing left to say after sanitizing.
    Skipped,
}

/// Completion handle returned by [`VoiceDelivery::speak`].
#[derive(Debug)]
pub struct PlaybackHandle {
    id: Option<u64>,
    inner: HandleInner,
}

#[derive(Debug)]
enum HandleInner {
    Ready(PlaybackOutcome),
    Task(JoinHandle<PlaybackOutcome>),
}

impl PlaybackHandle {
    fn ready(outcome: PlaybackOutcome) -> Self {
        Self {
            id: None,
            inner: HandleInner::Ready(outcome),
        }
    }

    /// Playback id for [`VoiceDelivery::stop_playback`]; `None` when nothing
    /// was started.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Resolve once playback has finished, failed, or been stopped.
    pub async fn finished(self) -> PlaybackOutcome {
        match self.inner {
            HandleInner::Ready(outcome) => outcome,
            HandleInner::Task(task) => task.await.unwrap_or(PlaybackOutcome::Stopped),
        }
    }
}

struct RemoteBackend {
    tts: RemoteTts,
    player: Arc<dyn AudioPlayer>,
}

struct ActivePlayback {
    id: u64,
    cancel: CancellationToken,
}

/// Remote-first speech output with on-device fallback.
pub struct VoiceDelivery {
    remote: Option<RemoteBackend>,
    local: Arc<dyn LocalSynthesizer>,
    focus: Arc<dyn AudioFocus>,
    locale: String,
    default_locale: String,
    persona: Mutex<Persona>,
    status: watch::Sender<VoiceStatus>,
    active: Mutex<Option<ActivePlayback>>,
    next_id: AtomicU64,
}

impl VoiceDelivery {
    /// Local-only pipeline. Attach a remote endpoint with [`with_remote`](Self::with_remote).
    pub fn new(
        local: Arc<dyn LocalSynthesizer>,
        focus: Arc<dyn AudioFocus>,
        config: &TtsConfig,
    ) -> Self {
        let (status, _) = watch::channel(VoiceStatus::default());
        Self {
            remote: None,
            local,
            focus,
            locale: config.locale.clone(),
            default_locale: config.default_locale.clone(),
            persona: Mutex::new(Persona::default()),
            status,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_remote(mut self, tts: RemoteTts, player: Arc<dyn AudioPlayer>) -> Self {
        self.remote = Some(RemoteBackend { tts, player });
        self
    }

    /// Wire command-line backends found on this machine.
    ///
    /// The remote path is enabled only when an endpoint is configured and a
    /// player program exists.
    ///
    /// # Errors
    ///
    /// Returns [`TtsError::NotConfigured`] if no local synthesizer is found.
    pub fn from_config(config: &TtsConfig) -> Result<Self, TtsError> {
        let local = CommandSynthesizer::detect(config.synth_program.as_deref())?;
        let mut delivery = Self::new(Arc::new(local), Arc::new(NoopAudioFocus::new()), config);

        if let Some(tts) = RemoteTts::from_config(config) {
            match CommandPlayer::detect(config.player_program.as_deref()) {
                Ok(player) => delivery = delivery.with_remote(tts, Arc::new(player)),
                Err(e) => warn!(error = %e, "remote TTS configured but no player; local only"),
            }
        }
        info!(remote = delivery.is_remote_configured(), "voice delivery ready");
        Ok(delivery)
    }

    pub fn is_remote_configured(&self) -> bool {
        self.remote.is_some()
    }

    /// Persona whose voice parameters subsequent `speak` calls use.
    pub fn set_persona(&self, persona: Persona) {
        if let Ok(mut current) = self.persona.lock() {
            *current = persona;
        }
    }

    pub fn status(&self) -> VoiceStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<VoiceStatus> {
        self.status.subscribe()
    }

    /// Start speaking `text`, replacing any playback in progress.
    pub fn speak(self: &Arc<Self>, text: &str) -> PlaybackHandle {
        self.stop();

        let text = strip_emoji(text);
        if text.is_empty() {
            debug!("nothing to speak after sanitizing");
            return PlaybackHandle::ready(PlaybackOutcome::Skipped);
        }

        if let Err(e) = self.focus.acquire() {
            warn!(error = %e, "could not acquire audio focus; speaking anyway");
        }

        let persona = self.persona.lock().map(|p| *p).unwrap_or_default();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        if let Ok(mut active) = self.active.lock() {
            *active = Some(ActivePlayback {
                id,
                cancel: cancel.clone(),
            });
        }
        self.status.send_replace(VoiceStatus {
            speaking: true,
            using_fallback: false,
        });

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => PlaybackOutcome::Stopped,
                outcome = this.deliver(&text, persona) => outcome,
            };
            this.finish(id);
            debug!(id, ?outcome, "playback ended");
            outcome
        });

        PlaybackHandle {
            id: Some(id),
            inner: HandleInner::Task(task),
        }
    }

    /// Halt active playback and release audio focus. Safe to call anytime.
    pub fn stop(&self) {
        let active = match self.active.lock() {
            Ok(mut active) => active.take(),
            Err(_) => None,
        };
        if let Some(active) = active {
            self.halt(&active);
        }
        self.focus.release();
        self.status.send_modify(|s| s.speaking = false);
    }

    /// Halt playback `id` if it is still the active one. A newer playback
    /// started by someone else is left alone. Returns whether anything stopped.
    pub fn stop_playback(&self, id: u64) -> bool {
        let active = match self.active.lock() {
            Ok(mut active) if active.as_ref().is_some_and(|a| a.id == id) => active.take(),
            _ => None,
        };
        let Some(active) = active else {
            return false;
        };
        self.halt(&active);
        self.focus.release();
        self.status.send_modify(|s| s.speaking = false);
        true
    }

    fn halt(&self, active: &ActivePlayback) {
        debug!(id = active.id, "stopping playback");
        active.cancel.cancel();
        self.local.stop();
        if let Some(remote) = &self.remote {
            remote.player.stop();
        }
    }

    async fn deliver(&self, text: &str, persona: Persona) -> PlaybackOutcome {
        if let Some(remote) = &self.remote {
            match self.speak_remote(remote, text, persona).await {
                Ok(()) => {
                    return PlaybackOutcome::Completed {
                        backend: Backend::Remote,
                    };
                }
                Err(e) => {
                    warn!(error = %e, "remote TTS failed; falling back to local synthesis");
                    self.status.send_modify(|s| s.using_fallback = true);
                }
            }
        }

        match self.speak_local(text, persona).await {
            Ok(()) => PlaybackOutcome::Completed {
                backend: Backend::Local,
            },
            Err(e) => {
                warn!(error = %e, "local synthesis failed");
                PlaybackOutcome::Failed(e.to_string())
            }
        }
    }

    async fn speak_remote(
        &self,
        remote: &RemoteBackend,
        text: &str,
        persona: Persona,
    ) -> Result<(), TtsError> {
        let profile = persona.profile();
        let audio = remote
            .tts
            .synthesize(text, profile.remote_voice, profile.speech_rate)
            .await?;
        remote
            .player
            .play(audio, remote.tts.response_format())
            .await
    }

    async fn speak_local(&self, text: &str, persona: Persona) -> Result<(), TtsError> {
        let profile = persona.profile();
        let voices = self.local.voices();
        let voice = select_voice(
            &voices,
            profile.voice_gender,
            &self.locale,
            &self.default_locale,
        );
        let utterance = Utterance {
            text: text.to_owned(),
            voice,
            rate: profile.speech_rate,
            pitch: profile.pitch,
            volume: 1.0,
        };
        self.local.speak(&utterance).await
    }

    /// Clean up after playback `id`, unless `stop` or a newer `speak` already did.
    fn finish(&self, id: u64) {
        let owned = match self.active.lock() {
            Ok(mut active) if active.as_ref().is_some_and(|a| a.id == id) => {
                active.take();
                true
            }
            _ => false,
        };
        if owned {
            self.focus.release();
            self.status.send_modify(|s| s.speaking = false);
        }
    }
}

impl Drop for VoiceDelivery {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::persona::VoiceGender;
    use crate::voice::local::{VoiceInfo, VoiceQuality};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::sync::Notify;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingSynth {
        spoken: Mutex<Vec<Utterance>>,
        stops: AtomicU64,
        hold: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl LocalSynthesizer for RecordingSynth {
        fn voices(&self) -> Vec<VoiceInfo> {
            vec![
                VoiceInfo {
                    id: "m".into(),
                    name: "Male".into(),
                    locale: "en-US".into(),
                    gender: Some(VoiceGender::Male),
                    quality: VoiceQuality::Default,
                },
                VoiceInfo {
                    id: "f".into(),
                    name: "Female".into(),
                    locale: "en-US".into(),
                    gender: Some(VoiceGender::Female),
                    quality: VoiceQuality::Enhanced,
                },
            ]
        }

        async fn speak(&self, utterance: &Utterance) -> Result<(), TtsError> {
            self.spoken.lock().unwrap().push(utterance.clone());
            if let Some(hold) = &self.hold {
                hold.notified().await;
            }
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingPlayer {
        played: Mutex<Vec<Bytes>>,
    }

    #[async_trait]
    impl AudioPlayer for RecordingPlayer {
        async fn play(&self, audio: Bytes, _format: &str) -> Result<(), TtsError> {
            self.played.lock().unwrap().push(audio);
            Ok(())
        }

        fn stop(&self) {}
    }

    fn delivery(synth: Arc<RecordingSynth>, focus: Arc<NoopAudioFocus>) -> VoiceDelivery {
        VoiceDelivery::new(synth, focus, &TtsConfig::default())
    }

    fn remote_for(server: &MockServer) -> RemoteTts {
        RemoteTts::new(server.uri(), "key", &TtsConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn local_only_uses_persona_voice_parameters() {
        let synth = Arc::new(RecordingSynth::default());
        let focus = Arc::new(NoopAudioFocus::new());
        let voice = Arc::new(delivery(synth.clone(), focus.clone()));
        voice.set_persona(Persona::Pep);

        let outcome = voice.speak("You're ready! 🎉").finished().await;
        assert_eq!(
            outcome,
            PlaybackOutcome::Completed {
                backend: Backend::Local
            }
        );

        let spoken = synth.spoken.lock().unwrap();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].text, "You're ready!");
        assert_eq!(spoken[0].voice.as_ref().unwrap().id, "f");
        assert_eq!(spoken[0].rate, Persona::Pep.profile().speech_rate);
        assert_eq!(spoken[0].pitch, Persona::Pep.profile().pitch);
        assert!(!focus.is_held());
        assert!(!voice.status().speaking);
        assert!(!voice.status().using_fallback);
    }

    #[tokio::test]
    async fn remote_failure_falls_back_to_local_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let synth = Arc::new(RecordingSynth::default());
        let player = Arc::new(RecordingPlayer::default());
        let voice = Arc::new(
            delivery(synth.clone(), Arc::new(NoopAudioFocus::new()))
                .with_remote(remote_for(&server), player.clone()),
        );
        let mut status = voice.subscribe();

        let outcome = voice.speak("CRUSH IT! 🔥💪").finished().await;
        assert_eq!(
            outcome,
            PlaybackOutcome::Completed {
                backend: Backend::Local
            }
        );

        let spoken = synth.spoken.lock().unwrap();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].text, "CRUSH IT!");
        assert!(player.played.lock().unwrap().is_empty());
        assert!(status.borrow_and_update().using_fallback);
        assert!(voice.status().using_fallback);
    }

    #[tokio::test]
    async fn remote_success_skips_local() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3".to_vec()))
            .mount(&server)
            .await;

        let synth = Arc::new(RecordingSynth::default());
        let player = Arc::new(RecordingPlayer::default());
        let voice = Arc::new(
            delivery(synth.clone(), Arc::new(NoopAudioFocus::new()))
                .with_remote(remote_for(&server), player.clone()),
        );

        let outcome = voice.speak("Sky's the limit!").finished().await;
        assert_eq!(
            outcome,
            PlaybackOutcome::Completed {
                backend: Backend::Remote
            }
        );
        assert!(synth.spoken.lock().unwrap().is_empty());
        assert_eq!(player.played.lock().unwrap().len(), 1);
        assert!(!voice.status().using_fallback);
    }

    #[tokio::test]
    async fn emoji_only_text_is_skipped() {
        let synth = Arc::new(RecordingSynth::default());
        let focus = Arc::new(NoopAudioFocus::new());
        let voice = Arc::new(delivery(synth.clone(), focus.clone()));
        assert_eq!(voice.speak("🔥🔥").finished().await, PlaybackOutcome::Skipped);
        assert!(synth.spoken.lock().unwrap().is_empty());
        assert!(!focus.is_held());
    }

    #[tokio::test]
    async fn stop_interrupts_and_releases_focus() {
        let hold = Arc::new(Notify::new());
        let synth = Arc::new(RecordingSynth {
            hold: Some(hold),
            ..RecordingSynth::default()
        });
        let focus = Arc::new(NoopAudioFocus::new());
        let voice = Arc::new(delivery(synth.clone(), focus.clone()));

        let handle = voice.speak("Let's GO!");
        while synth.spoken.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(focus.is_held());
        assert!(voice.status().speaking);

        voice.stop();
        assert_eq!(handle.finished().await, PlaybackOutcome::Stopped);
        assert!(!focus.is_held());
        assert!(!voice.status().speaking);
        assert!(synth.stops.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn new_speak_replaces_the_previous_one() {
        let hold = Arc::new(Notify::new());
        let synth = Arc::new(RecordingSynth {
            hold: Some(hold.clone()),
            ..RecordingSynth::default()
        });
        let focus = Arc::new(NoopAudioFocus::new());
        let voice = Arc::new(delivery(synth.clone(), focus.clone()));

        let first = voice.speak("first");
        while synth.spoken.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let second = voice.speak("second");
        assert_eq!(first.finished().await, PlaybackOutcome::Stopped);

        while synth.spoken.lock().unwrap().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(focus.is_held());
        hold.notify_one();
        assert_eq!(
            second.finished().await,
            PlaybackOutcome::Completed {
                backend: Backend::Local
            }
        );
        assert!(!focus.is_held());
    }

    #[tokio::test]
    async fn stopping_an_old_playback_leaves_the_current_one_alone() {
        let hold = Arc::new(Notify::new());
        let synth = Arc::new(RecordingSynth {
            hold: Some(hold.clone()),
            ..RecordingSynth::default()
        });
        let focus = Arc::new(NoopAudioFocus::new());
        let voice = Arc::new(delivery(synth, focus.clone()));

        let old = voice.speak("old");
        let old_id = old.id().unwrap();
        let current = voice.speak("current");
        assert_eq!(old.finished().await, PlaybackOutcome::Stopped);
        assert_ne!(current.id(), Some(old_id));

        assert!(!voice.stop_playback(old_id));
        assert!(voice.status().speaking);
        assert!(focus.is_held());

        hold.notify_one();
        assert_eq!(
            current.finished().await,
            PlaybackOutcome::Completed {
                backend: Backend::Local
            }
        );
    }

    #[tokio::test]
    async fn stop_playback_halts_the_matching_playback() {
        let hold = Arc::new(Notify::new());
        let synth = Arc::new(RecordingSynth {
            hold: Some(hold),
            ..RecordingSynth::default()
        });
        let focus = Arc::new(NoopAudioFocus::new());
        let voice = Arc::new(delivery(synth, focus.clone()));

        let handle = voice.speak("Let's GO!");
        let id = handle.id().unwrap();
        assert!(voice.stop_playback(id));
        assert_eq!(handle.finished().await, PlaybackOutcome::Stopped);
        assert!(!focus.is_held());
        assert!(!voice.status().speaking);
        assert!(!voice.stop_playback(id));
    }

    #[tokio::test]
    async fn skipped_playback_has_no_id() {
        let voice = Arc::new(delivery(
            Arc::new(RecordingSynth::default()),
            Arc::new(NoopAudioFocus::new()),
        ));
        assert_eq!(voice.speak("🔥").id(), None);
    }

    #[tokio::test]
    async fn stop_when_idle_is_a_no_op() {
        let focus = Arc::new(NoopAudioFocus::new());
        let voice = delivery(Arc::new(RecordingSynth::default()), focus.clone());
        voice.stop();
        voice.stop();
        assert!(!focus.is_held());
        assert_eq!(voice.status(), VoiceStatus::default());
    }
}
