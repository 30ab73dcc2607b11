//! Conversation state machine.
//!
//! [`Conversation::apply`] is a pure reducer: it updates the state and the
//! turn history and returns the side effects a driver must execute. It
//! performs no I/O and never blocks, so every transition is testable
//! without a runtime.

use crate::session::Turn;

/// Identifies one generation round-trip. Results carrying any other id are
/// stale and dropped.
pub type RequestId = u64;

/// Identifies one capture. Recognizer events from an earlier capture are
/// dropped.
pub type CaptureId = u64;

/// How the user provides input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modality {
    /// Spoken input with a live partial transcript.
    #[default]
    Voice,
    /// Typed input.
    Text,
}

/// Where a conversation is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChatState {
    #[default]
    Idle,
    Capturing {
        capture: CaptureId,
    },
    Generating {
        request: RequestId,
    },
    Responding {
        request: RequestId,
    },
    /// Holds a user-facing message. Left only by `Dismiss` or `Cancel`.
    Error(String),
}

impl ChatState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Waiting on generation or playback; input is not accepted.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Generating { .. } | Self::Responding { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Inputs to the reducer, from the user or from completed effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    StartCapture,
    PartialTranscript {
        capture: CaptureId,
        text: String,
    },
    /// Final transcript from capture.
    InputFinalized {
        capture: CaptureId,
        text: String,
    },
    /// Typed input, accepted while idle or capturing.
    TextSubmitted(String),
    /// Capture could not start or finish; carries a user-facing message.
    CaptureFailed {
        capture: CaptureId,
        message: String,
    },
    GenerationSucceeded {
        request: RequestId,
        text: String,
    },
    GenerationFailed {
        request: RequestId,
        message: String,
    },
    PlaybackFinished {
        request: RequestId,
    },
    Cancel,
    Dismiss,
}

/// Work the driver must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEffect {
    /// Start the speech recognizer.
    BeginCapture { capture: CaptureId },
    /// Stop the speech recognizer and drop its partial transcript.
    StopCapture,
    /// Build a prompt and call the generator.
    Generate {
        request: RequestId,
        message: String,
        /// Committed turns, oldest first, excluding `message`.
        history: Vec<Turn>,
        /// Attach personalization memory to this prompt.
        include_memory: bool,
    },
    /// Best-effort abort of an in-flight generation.
    AbortGeneration { request: RequestId },
    Speak { request: RequestId, text: String },
    StopPlayback,
}

/// One chat session: state, history, and the memory-injection flag.
///
/// History is append-only. A user turn is committed as soon as its
/// generation is requested and stays even if no reply follows.
#[derive(Debug, Clone)]
pub struct Conversation {
    modality: Modality,
    voice_output: bool,
    state: ChatState,
    history: Vec<Turn>,
    partial: String,
    memory_injected: bool,
    next_request: RequestId,
    next_capture: CaptureId,
}

impl Conversation {
    pub fn new(modality: Modality, voice_output: bool) -> Self {
        Self {
            modality,
            voice_output,
            state: ChatState::Idle,
            history: Vec::new(),
            partial: String::new(),
            memory_injected: false,
            next_request: 1,
            next_capture: 1,
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    /// Committed turns, oldest first.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Live partial transcript while capturing by voice.
    pub fn partial_transcript(&self) -> &str {
        &self.partial
    }

    /// Whether a prompt with memory has already been requested.
    pub fn memory_injected(&self) -> bool {
        self.memory_injected
    }

    /// Advance the state machine. Events that do not apply to the current
    /// state are ignored and yield no effects.
    pub fn apply(&mut self, event: ChatEvent) -> Vec<ChatEffect> {
        match event {
            ChatEvent::StartCapture => {
                if !self.state.is_idle() {
                    return Vec::new();
                }
                let capture = self.next_capture;
                self.next_capture += 1;
                self.state = ChatState::Capturing { capture };
                self.partial.clear();
                match self.modality {
                    Modality::Voice => vec![ChatEffect::BeginCapture { capture }],
                    Modality::Text => Vec::new(),
                }
            }

            ChatEvent::PartialTranscript { capture, text } => {
                if self.state == (ChatState::Capturing { capture }) {
                    self.partial = text;
                }
                Vec::new()
            }

            ChatEvent::InputFinalized { capture, text } => {
                if self.state != (ChatState::Capturing { capture }) {
                    return Vec::new();
                }
                self.partial.clear();
                self.submit(text)
            }

            ChatEvent::TextSubmitted(text) => {
                let mut effects = match &self.state {
                    ChatState::Idle => Vec::new(),
                    ChatState::Capturing { .. } if self.modality == Modality::Voice => {
                        vec![ChatEffect::StopCapture]
                    }
                    ChatState::Capturing { .. } => Vec::new(),
                    _ => return Vec::new(),
                };
                self.partial.clear();
                effects.extend(self.submit(text));
                effects
            }

            ChatEvent::CaptureFailed { capture, message } => {
                if self.state != (ChatState::Capturing { capture }) {
                    return Vec::new();
                }
                self.partial.clear();
                self.state = ChatState::Error(message);
                Vec::new()
            }

            ChatEvent::GenerationSucceeded { request, text } => {
                if self.state != (ChatState::Generating { request }) {
                    return Vec::new();
                }
                self.history.push(Turn::assistant(text.clone()));
                if self.voice_output {
                    self.state = ChatState::Responding { request };
                    vec![ChatEffect::Speak { request, text }]
                } else {
                    self.state = ChatState::Idle;
                    Vec::new()
                }
            }

            ChatEvent::GenerationFailed { request, message } => {
                if self.state != (ChatState::Generating { request }) {
                    return Vec::new();
                }
                let message = if message.trim().is_empty() {
                    "Something went wrong. Try again!".to_owned()
                } else {
                    message
                };
                self.state = ChatState::Error(message);
                Vec::new()
            }

            ChatEvent::PlaybackFinished { request } => {
                if self.state == (ChatState::Responding { request }) {
                    self.state = ChatState::Idle;
                }
                Vec::new()
            }

            ChatEvent::Cancel => {
                let effects = match &self.state {
                    ChatState::Idle | ChatState::Error(_) => Vec::new(),
                    ChatState::Capturing { .. } => match self.modality {
                        Modality::Voice => vec![ChatEffect::StopCapture],
                        Modality::Text => Vec::new(),
                    },
                    ChatState::Generating { request } => {
                        vec![ChatEffect::AbortGeneration { request: *request }]
                    }
                    ChatState::Responding { .. } => vec![ChatEffect::StopPlayback],
                };
                self.partial.clear();
                self.state = ChatState::Idle;
                effects
            }

            ChatEvent::Dismiss => {
                if self.state.is_error() {
                    self.state = ChatState::Idle;
                }
                Vec::new()
            }
        }
    }

    /// Common path for finalized input: empty input returns to idle,
    /// anything else starts a generation.
    fn submit(&mut self, text: String) -> Vec<ChatEffect> {
        let message = text.trim().to_owned();
        if message.is_empty() {
            self.state = ChatState::Idle;
            return Vec::new();
        }

        let request = self.next_request;
        self.next_request += 1;
        let include_memory = !self.memory_injected;
        self.memory_injected = true;

        let history = self.history.clone();
        self.history.push(Turn::user(message.clone()));
        self.state = ChatState::Generating { request };
        vec![ChatEffect::Generate {
            request,
            message,
            history,
            include_memory,
        }]
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::session::Role;

    fn generate_effect(effects: &[ChatEffect]) -> (RequestId, &str, &[Turn], bool) {
        match effects {
            [
                ChatEffect::Generate {
                    request,
                    message,
                    history,
                    include_memory,
                },
            ] => (*request, message.as_str(), history.as_slice(), *include_memory),
            other => panic!("expected a single Generate effect, got {other:?}"),
        }
    }

    fn begin_capture(conv: &mut Conversation) -> CaptureId {
        match conv.apply(ChatEvent::StartCapture).as_slice() {
            [ChatEffect::BeginCapture { capture }] => *capture,
            other => panic!("expected BeginCapture, got {other:?}"),
        }
    }

    /// Drive one full text turn and return its request id.
    fn text_turn(conv: &mut Conversation, message: &str, reply: &str) -> RequestId {
        let effects = conv.apply(ChatEvent::TextSubmitted(message.to_owned()));
        let (request, ..) = generate_effect(&effects);
        conv.apply(ChatEvent::GenerationSucceeded {
            request,
            text: reply.to_owned(),
        });
        request
    }

    fn texts(conv: &Conversation) -> Vec<&str> {
        conv.history().iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn voice_turn_walks_the_full_cycle() {
        let mut conv = Conversation::new(Modality::Voice, true);

        let capture = begin_capture(&mut conv);
        assert_eq!(conv.state(), &ChatState::Capturing { capture });

        conv.apply(ChatEvent::PartialTranscript {
            capture,
            text: "I'm ner".into(),
        });
        assert_eq!(conv.partial_transcript(), "I'm ner");

        let effects = conv.apply(ChatEvent::InputFinalized {
            capture,
            text: "I'm nervous".into(),
        });
        let (request, message, history, include_memory) = generate_effect(&effects);
        assert_eq!(message, "I'm nervous");
        assert!(history.is_empty());
        assert!(include_memory);
        assert_eq!(conv.state(), &ChatState::Generating { request });
        assert!(conv.partial_transcript().is_empty());
        // The user turn is committed before the reply arrives.
        assert_eq!(texts(&conv), ["I'm nervous"]);

        let effects = conv.apply(ChatEvent::GenerationSucceeded {
            request,
            text: "You've GOT this!".into(),
        });
        assert_eq!(
            effects,
            vec![ChatEffect::Speak {
                request,
                text: "You've GOT this!".into()
            }]
        );
        assert_eq!(conv.state(), &ChatState::Responding { request });
        let roles: Vec<Role> = conv.history().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);

        conv.apply(ChatEvent::PlaybackFinished { request });
        assert!(conv.state().is_idle());
    }

    #[test]
    fn empty_input_returns_to_idle() {
        let mut conv = Conversation::new(Modality::Voice, true);
        let capture = begin_capture(&mut conv);
        assert!(
            conv.apply(ChatEvent::InputFinalized {
                capture,
                text: "   ".into()
            })
            .is_empty()
        );
        assert!(conv.state().is_idle());
        assert!(conv.history().is_empty());
        assert!(!conv.memory_injected());
    }

    #[test]
    fn events_from_an_earlier_capture_are_dropped() {
        let mut conv = Conversation::new(Modality::Voice, true);
        let first = begin_capture(&mut conv);
        assert_eq!(conv.apply(ChatEvent::Cancel), vec![ChatEffect::StopCapture]);

        let second = begin_capture(&mut conv);
        assert_ne!(first, second);

        conv.apply(ChatEvent::PartialTranscript {
            capture: first,
            text: "old partial".into(),
        });
        assert!(conv.partial_transcript().is_empty());
        assert!(
            conv.apply(ChatEvent::InputFinalized {
                capture: first,
                text: "old utterance".into()
            })
            .is_empty()
        );
        conv.apply(ChatEvent::CaptureFailed {
            capture: first,
            message: "old failure".into(),
        });
        assert_eq!(conv.state(), &ChatState::Capturing { capture: second });
        assert!(conv.history().is_empty());

        let effects = conv.apply(ChatEvent::InputFinalized {
            capture: second,
            text: "new utterance".into(),
        });
        let (_, message, ..) = generate_effect(&effects);
        assert_eq!(message, "new utterance");
    }

    #[test]
    fn memory_is_requested_only_for_the_first_generation() {
        let mut conv = Conversation::new(Modality::Text, false);

        let effects = conv.apply(ChatEvent::TextSubmitted("first".into()));
        let (request, _, _, include_memory) = generate_effect(&effects);
        assert!(include_memory);
        conv.apply(ChatEvent::GenerationFailed {
            request,
            message: "Came up empty".into(),
        });
        conv.apply(ChatEvent::Dismiss);

        // The retry after a failure still gets no memory.
        let effects = conv.apply(ChatEvent::TextSubmitted("again".into()));
        let (request, _, history, include_memory) = generate_effect(&effects);
        assert!(!include_memory);
        assert_eq!(history.len(), 1);
        conv.apply(ChatEvent::GenerationSucceeded {
            request,
            text: "ok".into(),
        });

        let effects = conv.apply(ChatEvent::TextSubmitted("third".into()));
        let (_, _, history, include_memory) = generate_effect(&effects);
        assert!(!include_memory);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn later_turns_carry_full_history() {
        let mut conv = Conversation::new(Modality::Text, false);
        text_turn(&mut conv, "I'm nervous", "You've got this!");
        let effects = conv.apply(ChatEvent::TextSubmitted("What if I freeze?".into()));
        let (_, message, history, _) = generate_effect(&effects);
        assert_eq!(message, "What if I freeze?");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "I'm nervous");
        assert_eq!(history[1].text, "You've got this!");
    }

    #[test]
    fn failure_keeps_the_user_turn_and_adds_no_reply() {
        let mut conv = Conversation::new(Modality::Text, true);
        let effects = conv.apply(ChatEvent::TextSubmitted("hype me".into()));
        let (request, ..) = generate_effect(&effects);

        conv.apply(ChatEvent::GenerationFailed {
            request,
            message: "Couldn't reach the hype engine.".into(),
        });
        assert_eq!(
            conv.state().error_message(),
            Some("Couldn't reach the hype engine.")
        );
        assert_eq!(texts(&conv), ["hype me"]);
        assert_eq!(conv.history()[0].role, Role::User);

        // Error is sticky until dismissed.
        assert!(conv.apply(ChatEvent::StartCapture).is_empty());
        assert!(conv.apply(ChatEvent::TextSubmitted("x".into())).is_empty());
        assert!(conv.state().is_error());

        conv.apply(ChatEvent::Dismiss);
        assert!(conv.state().is_idle());
        assert_eq!(conv.history().len(), 1);
    }

    #[test]
    fn blank_failure_message_gets_a_default() {
        let mut conv = Conversation::new(Modality::Text, true);
        let (request, ..) = generate_effect(&conv.apply(ChatEvent::TextSubmitted("x".into())));
        conv.apply(ChatEvent::GenerationFailed {
            request,
            message: " ".into(),
        });
        assert!(!conv.state().error_message().unwrap().trim().is_empty());
    }

    #[test]
    fn stale_results_are_discarded() {
        let mut conv = Conversation::new(Modality::Text, true);
        let (stale, ..) = generate_effect(&conv.apply(ChatEvent::TextSubmitted("one".into())));
        assert_eq!(
            conv.apply(ChatEvent::Cancel),
            vec![ChatEffect::AbortGeneration { request: stale }]
        );
        assert!(conv.state().is_idle());

        let (current, ..) = generate_effect(&conv.apply(ChatEvent::TextSubmitted("two".into())));
        assert_ne!(stale, current);

        assert!(
            conv.apply(ChatEvent::GenerationSucceeded {
                request: stale,
                text: "late".into()
            })
            .is_empty()
        );
        conv.apply(ChatEvent::GenerationFailed {
            request: stale,
            message: "late failure".into(),
        });
        assert_eq!(conv.state(), &ChatState::Generating { request: current });
        assert_eq!(texts(&conv), ["one", "two"]);
    }

    #[test]
    fn cancel_while_responding_stops_playback() {
        let mut conv = Conversation::new(Modality::Text, true);
        let request = text_turn(&mut conv, "go", "GO!");
        assert_eq!(conv.state(), &ChatState::Responding { request });

        assert_eq!(conv.apply(ChatEvent::Cancel), vec![ChatEffect::StopPlayback]);
        assert!(conv.state().is_idle());
        // The completed exchange stays in history.
        assert_eq!(conv.history().len(), 2);

        // Late completion from the stopped playback is ignored.
        conv.apply(ChatEvent::PlaybackFinished { request });
        assert!(conv.state().is_idle());
    }

    #[test]
    fn cancel_while_capturing_discards_partial() {
        let mut conv = Conversation::new(Modality::Voice, true);
        let capture = begin_capture(&mut conv);
        conv.apply(ChatEvent::PartialTranscript {
            capture,
            text: "half a sen".into(),
        });
        assert_eq!(conv.apply(ChatEvent::Cancel), vec![ChatEffect::StopCapture]);
        assert!(conv.partial_transcript().is_empty());
        assert!(conv.history().is_empty());
    }

    #[test]
    fn capture_failure_is_an_error_state() {
        let mut conv = Conversation::new(Modality::Voice, true);
        let capture = begin_capture(&mut conv);
        conv.apply(ChatEvent::CaptureFailed {
            capture,
            message: "Microphone permission denied".into(),
        });
        assert_eq!(
            conv.state().error_message(),
            Some("Microphone permission denied")
        );
        conv.apply(ChatEvent::Cancel);
        assert!(conv.state().is_idle());
    }

    #[test]
    fn without_voice_output_success_goes_straight_to_idle() {
        let mut conv = Conversation::new(Modality::Text, false);
        text_turn(&mut conv, "go", "GO!");
        assert!(conv.state().is_idle());
    }

    #[test]
    fn typed_input_during_voice_capture_stops_the_recognizer() {
        let mut conv = Conversation::new(Modality::Voice, true);
        begin_capture(&mut conv);
        let effects = conv.apply(ChatEvent::TextSubmitted("typed".into()));
        assert_eq!(effects[0], ChatEffect::StopCapture);
        assert!(matches!(effects[1], ChatEffect::Generate { .. }));
    }

    #[test]
    fn busy_states_reject_new_input() {
        let mut conv = Conversation::new(Modality::Text, true);
        conv.apply(ChatEvent::TextSubmitted("one".into()));
        assert!(conv.state().is_busy());
        assert!(conv.apply(ChatEvent::TextSubmitted("two".into())).is_empty());
        assert!(conv.apply(ChatEvent::StartCapture).is_empty());
        assert_eq!(conv.history().len(), 1);
    }
}
