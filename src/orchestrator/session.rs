//! Chat session driver.
//!
//! [`ChatSession::spawn`] starts one task that owns a [`Conversation`] and
//! executes the effects it emits. Slow work (recognition, generation,
//! playback) runs in child tasks that report back as events, so the loop
//! stays responsive and a cancel is handled as soon as it arrives.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::{
    CaptureId, ChatEffect, ChatEvent, ChatState, Conversation, Modality, RequestId,
};
use crate::capture::SpeechRecognizer;
use crate::config::MemoryConfig;
use crate::entitlement::Entitlements;
use crate::generation::HypeGenerator;
use crate::memory::MemoryProvider;
use crate::persona::Persona;
use crate::prompt::build_conversation_prompt;
use crate::session::Turn;
use crate::voice::VoiceDelivery;

const NO_RECOGNIZER_MESSAGE: &str = "Speech recognition isn't available here";

/// Collaborators a chat session needs. Injected, never global.
#[derive(Clone)]
pub struct ChatDeps {
    pub generator: Arc<dyn HypeGenerator>,
    pub memory: MemoryProvider,
    pub entitlements: Arc<dyn Entitlements>,
    /// Required for [`Modality::Voice`] capture.
    pub recognizer: Option<Arc<dyn SpeechRecognizer>>,
    /// Speech output; `None` disables voice output regardless of options.
    pub voice: Option<Arc<VoiceDelivery>>,
}

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub persona: Persona,
    pub modality: Modality,
    pub voice_output: bool,
    /// Requested memory size for the first prompt; free tier is capped lower.
    pub memory_limit: usize,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            persona: Persona::default(),
            modality: Modality::default(),
            voice_output: true,
            memory_limit: MemoryConfig::default().recent_wins_limit,
        }
    }
}

/// Published view of a session, replaced after every handled event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSnapshot {
    pub state: ChatState,
    /// Committed turns, oldest first.
    pub transcript: Vec<Turn>,
    /// Live partial transcript while capturing by voice.
    pub partial: String,
    pub memory_injected: bool,
    /// Incremented on every publish.
    pub revision: u64,
}

/// The session task has exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("chat session has ended")]
pub struct ChatClosed;

#[derive(Debug)]
enum Command {
    Event(ChatEvent),
    FinishCapture,
    Shutdown,
}

/// Entry point for conversational sessions.
pub struct ChatSession;

impl ChatSession {
    /// Spawn the session task. Must be called inside a tokio runtime.
    pub fn spawn(deps: ChatDeps, options: ChatOptions) -> ChatHandle {
        let voice_output = options.voice_output && deps.voice.is_some();
        if let Some(voice) = &deps.voice {
            voice.set_persona(options.persona);
        }

        let conversation = Conversation::new(options.modality, voice_output);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(ChatSnapshot::default());

        info!(
            persona = %options.persona,
            modality = ?options.modality,
            voice_output,
            "chat session started"
        );

        let driver = Driver {
            deps,
            options,
            conversation,
            event_tx,
            snapshot_tx,
            revision: 0,
            generation: None,
            capture: None,
            finishing: None,
            playback: None,
        };
        let task = tokio::spawn(driver.run(command_rx, event_rx));

        ChatHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
            task: Some(task),
        }
    }
}

/// Control surface for a running chat session.
///
/// Dropping the handle ends the session: pending work is aborted and the
/// session's own playback is stopped.
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<ChatSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl ChatHandle {
    pub fn start_capture(&self) -> Result<(), ChatClosed> {
        self.send(Command::Event(ChatEvent::StartCapture))
    }

    /// Ask the recognizer for its final transcript.
    pub fn finish_capture(&self) -> Result<(), ChatClosed> {
        self.send(Command::FinishCapture)
    }

    /// Submit typed input.
    pub fn submit_text(&self, text: impl Into<String>) -> Result<(), ChatClosed> {
        self.send(Command::Event(ChatEvent::TextSubmitted(text.into())))
    }

    pub fn cancel(&self) -> Result<(), ChatClosed> {
        self.send(Command::Event(ChatEvent::Cancel))
    }

    /// Clear an error and return to idle.
    pub fn dismiss(&self) -> Result<(), ChatClosed> {
        self.send(Command::Event(ChatEvent::Dismiss))
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot.clone()
    }

    /// Wait for the first snapshot (current one included) matching `pred`.
    pub async fn wait_until(
        &self,
        mut pred: impl FnMut(&ChatSnapshot) -> bool,
    ) -> Result<ChatSnapshot, ChatClosed> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx.wait_for(|s| pred(s)).await.map_err(|_| ChatClosed)?;
        Ok(snapshot.clone())
    }

    /// Wait until something newer than `revision` has been published and the
    /// session is no longer generating or responding.
    pub async fn wait_settled(&self, revision: u64) -> Result<ChatSnapshot, ChatClosed> {
        self.wait_until(|s| s.revision > revision && !s.state.is_busy())
            .await
    }

    /// Stop the session and wait for its task to exit.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "chat session task failed");
            }
        }
    }

    fn send(&self, command: Command) -> Result<(), ChatClosed> {
        self.commands.send(command).map_err(|_| ChatClosed)
    }
}

impl Drop for ChatHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

struct Driver {
    deps: ChatDeps,
    options: ChatOptions,
    conversation: Conversation,
    event_tx: mpsc::UnboundedSender<ChatEvent>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
    revision: u64,
    generation: Option<(RequestId, JoinHandle<()>)>,
    /// Recognizer start-up plus partial-transcript forwarding.
    capture: Option<JoinHandle<()>>,
    /// Waiting on the recognizer's final transcript.
    finishing: Option<JoinHandle<()>>,
    playback: Option<ReplyPlayback>,
}

/// Reply being spoken. `voice_id` scopes stops to this session's audio.
struct ReplyPlayback {
    voice_id: Option<u64>,
    waiter: JoinHandle<()>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<ChatEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Event(event)) => self.handle(event),
                    Some(Command::FinishCapture) => self.finish_capture(),
                    Some(Command::Shutdown) | None => break,
                },
                Some(event) = events.recv() => self.handle(event),
            }
        }
        self.teardown();
        debug!("chat session ended");
    }

    fn handle(&mut self, event: ChatEvent) {
        let effects = self.conversation.apply(event);
        for effect in effects {
            self.execute(effect);
        }
        let capturing = self.conversation.state().is_capturing();
        let responding = matches!(self.conversation.state(), ChatState::Responding { .. });
        if !capturing {
            self.abort_capture_tasks();
        }
        if !responding {
            // Finished or already stopped; nothing left to stop at teardown.
            self.playback = None;
        }
        self.publish();
    }

    fn execute(&mut self, effect: ChatEffect) {
        match effect {
            ChatEffect::BeginCapture { capture } => self.begin_capture(capture),
            ChatEffect::StopCapture => {
                self.abort_capture_tasks();
                if let Some(recognizer) = &self.deps.recognizer {
                    recognizer.cancel();
                }
            }
            ChatEffect::Generate {
                request,
                message,
                history,
                include_memory,
            } => self.generate(request, message, history, include_memory),
            ChatEffect::AbortGeneration { request } => {
                if let Some((pending, task)) = self.generation.take() {
                    if pending == request {
                        debug!(request, "aborting generation");
                        task.abort();
                    } else {
                        self.generation = Some((pending, task));
                    }
                }
            }
            ChatEffect::Speak { request, text } => self.speak(request, &text),
            ChatEffect::StopPlayback => self.stop_playback(),
        }
    }

    fn begin_capture(&mut self, capture: CaptureId) {
        let Some(recognizer) = self.deps.recognizer.clone() else {
            warn!("voice capture requested without a recognizer");
            self.emit(ChatEvent::CaptureFailed {
                capture,
                message: NO_RECOGNIZER_MESSAGE.to_owned(),
            });
            return;
        };
        let events = self.event_tx.clone();
        self.capture = Some(tokio::spawn(async move {
            let mut partials = match recognizer.start().await {
                Ok(partials) => partials,
                Err(e) => {
                    warn!(capture, error = %e, "speech recognition failed to start");
                    let _ = events.send(ChatEvent::CaptureFailed {
                        capture,
                        message: e.user_message(),
                    });
                    return;
                }
            };
            while partials.changed().await.is_ok() {
                let text = partials.borrow_and_update().clone();
                if events.send(ChatEvent::PartialTranscript { capture, text }).is_err() {
                    break;
                }
            }
        }));
    }

    fn finish_capture(&mut self) {
        let &ChatState::Capturing { capture } = self.conversation.state() else {
            return;
        };
        if self.options.modality != Modality::Voice || self.finishing.is_some() {
            return;
        }
        let Some(recognizer) = self.deps.recognizer.clone() else {
            return;
        };
        let events = self.event_tx.clone();
        self.finishing = Some(tokio::spawn(async move {
            let event = match recognizer.finish().await {
                Ok(text) => ChatEvent::InputFinalized { capture, text },
                Err(e) => {
                    warn!(capture, error = %e, "speech recognition failed");
                    ChatEvent::CaptureFailed {
                        capture,
                        message: e.user_message(),
                    }
                }
            };
            let _ = events.send(event);
        }));
    }

    fn abort_capture_tasks(&mut self) {
        for task in [self.capture.take(), self.finishing.take()].into_iter().flatten() {
            task.abort();
        }
    }

    fn generate(&mut self, request: RequestId, message: String, history: Vec<Turn>, include_memory: bool) {
        let persona = self.options.persona;
        let memory_limit = self.options.memory_limit;
        let premium = include_memory && self.deps.entitlements.is_premium();
        let provider = self.deps.memory.clone();
        let generator = Arc::clone(&self.deps.generator);
        let events = self.event_tx.clone();

        let task = tokio::spawn(async move {
            // SQLite reads stay off the async workers.
            let memory = if include_memory {
                tokio::task::spawn_blocking(move || provider.recent_wins(memory_limit, premium))
                    .await
                    .unwrap_or_else(|e| {
                        warn!(request, error = %e, "memory lookup task failed");
                        Vec::new()
                    })
            } else {
                Vec::new()
            };
            let prompt = build_conversation_prompt(persona, &history, &message, &memory);
            debug!(
                request,
                memory = memory.len(),
                history = history.len(),
                "requesting chat reply"
            );

            let event = match generator.generate(&prompt).await {
                Ok(text) => ChatEvent::GenerationSucceeded { request, text },
                Err(e) => {
                    warn!(request, error = %e, "chat generation failed");
                    ChatEvent::GenerationFailed {
                        request,
                        message: e.user_message(),
                    }
                }
            };
            let _ = events.send(event);
        });
        self.generation = Some((request, task));
    }

    fn speak(&mut self, request: RequestId, text: &str) {
        self.generation = None;
        let Some(voice) = &self.deps.voice else {
            self.emit(ChatEvent::PlaybackFinished { request });
            return;
        };
        let handle = voice.speak(text);
        let voice_id = handle.id();
        let events = self.event_tx.clone();
        let waiter = tokio::spawn(async move {
            let outcome = handle.finished().await;
            debug!(request, ?outcome, "reply playback finished");
            let _ = events.send(ChatEvent::PlaybackFinished { request });
        });
        self.playback = Some(ReplyPlayback { voice_id, waiter });
    }

    /// Stop this session's reply, never someone else's playback.
    fn stop_playback(&mut self) {
        let Some(playback) = self.playback.take() else {
            return;
        };
        playback.waiter.abort();
        if let (Some(voice), Some(id)) = (&self.deps.voice, playback.voice_id) {
            voice.stop_playback(id);
        }
    }

    /// Queue an event for the next loop iteration.
    fn emit(&self, event: ChatEvent) {
        let _ = self.event_tx.send(event);
    }

    fn publish(&mut self) {
        self.revision += 1;
        let snapshot = ChatSnapshot {
            state: self.conversation.state().clone(),
            transcript: self.conversation.history().to_vec(),
            partial: self.conversation.partial_transcript().to_owned(),
            memory_injected: self.conversation.memory_injected(),
            revision: self.revision,
        };
        self.snapshot_tx.send_replace(snapshot);
    }

    fn teardown(&mut self) {
        if let Some((_, task)) = self.generation.take() {
            task.abort();
        }
        self.abort_capture_tasks();
        if self.conversation.state().is_capturing() {
            if let Some(recognizer) = &self.deps.recognizer {
                recognizer.cancel();
            }
        }
        self.stop_playback();
    }
}
