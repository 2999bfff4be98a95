//! The protocol state machine for one coaching session.
//!
//! The receive loop feeds inbound events in arrival order; the machine
//! updates its state and emits [`Command`]s for the runtime to execute. It
//! never touches the transport or the speaker itself, which is what makes
//! the whole protocol testable without a network or an audio device.

use pitwall_realtime_types::{ServerEvent, Session};
use tokio::sync::mpsc::Sender;

use crate::dispatcher::ToolDispatcher;
use crate::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoachState {
    /// Waiting for the service to acknowledge the connection.
    AwaitingCreated,
    /// Configuration sent, waiting for the service to confirm it.
    AwaitingUpdated,
    /// Ready; the driver can talk.
    Listening,
    /// A tool call is being answered.
    ToolPending,
    /// The coach's audio is playing.
    Speaking,
    /// Terminal. Events arriving after this are ignored.
    Closed,
}

pub struct CoachSession {
    state: CoachState,
    /// Prepared `session.update` payload, sent once after `session.created`.
    config: Session,
    session_id: Option<String>,
    configured: bool,
    playback_open: bool,
}

impl CoachSession {
    pub fn new(config: Session) -> Self {
        Self {
            state: CoachState::AwaitingCreated,
            config,
            session_id: None,
            configured: false,
            playback_open: false,
        }
    }

    pub fn state(&self) -> CoachState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn playback_open(&self) -> bool {
        self.playback_open
    }

    /// Process one inbound event. Events are handled strictly in arrival
    /// order; a tool call is dispatched inline, so a second call cannot
    /// start until the previous result has been submitted.
    pub async fn process_event(
        &mut self,
        event: ServerEvent,
        dispatcher: &ToolDispatcher,
        commands: &Sender<Command>,
    ) {
        if self.state == CoachState::Closed {
            tracing::debug!("session closed, dropping late event");
            return;
        }

        match event {
            ServerEvent::SessionCreated(data) => {
                tracing::info!("session created: {}", data.session().id());
                self.session_id = Some(data.session().id().to_string());
                if self.state == CoachState::AwaitingCreated {
                    self.state = CoachState::AwaitingUpdated;
                }
                if !self.configured {
                    self.configured = true;
                    Self::send(commands, Command::Configure(self.config.clone())).await;
                }
            }
            ServerEvent::SessionUpdated(_) => {
                tracing::info!("session configured, coach is listening");
                self.state = CoachState::Listening;
            }
            ServerEvent::InputAudioBufferSpeechStarted(data) => {
                // The service runs its own VAD; these are status only and
                // never gate the outbound audio flow.
                tracing::debug!("driver speech started at {}ms", data.audio_start_ms());
            }
            ServerEvent::InputAudioBufferSpeechStopped(data) => {
                tracing::debug!("driver speech stopped at {}ms", data.audio_end_ms());
            }
            ServerEvent::ConversationItemCreated(data) => {
                tracing::debug!(
                    "conversation item created: {:?} ({:?})",
                    data.item().id(),
                    data.item().item_type()
                );
            }
            ServerEvent::ConversationItemInputAudioTranscriptionCompleted(data) => {
                tracing::info!("Driver: {:?}", data.transcript().trim());
            }
            ServerEvent::ResponseCreated(data) => {
                tracing::debug!("response created: {}", data.response().id());
            }
            ServerEvent::ResponseAudioDelta(data) => {
                if !self.playback_open {
                    self.playback_open = true;
                    self.state = CoachState::Speaking;
                    Self::send(commands, Command::OpenPlayback).await;
                }
                Self::send(commands, Command::PlayAudio(data.delta().to_string())).await;
            }
            ServerEvent::ResponseAudioDone(_) => {
                if self.playback_open {
                    self.playback_open = false;
                    Self::send(commands, Command::ClosePlayback).await;
                }
                if self.state == CoachState::Speaking {
                    self.state = CoachState::Listening;
                }
            }
            ServerEvent::ResponseAudioTranscriptDone(data) => {
                tracing::info!("Coach: {:?}", data.transcript());
            }
            ServerEvent::ResponseDone(data) => {
                tracing::debug!("response done, usage: {:?}", data.response().usage());
            }
            ServerEvent::ResponseFunctionCallArgumentsDone(data) => {
                tracing::info!("tool call {}: {}", data.call_id(), data.name());
                self.state = CoachState::ToolPending;
                let output = dispatcher.dispatch(data.name()).await;
                Self::send(
                    commands,
                    Command::SubmitToolResult {
                        call_id: data.call_id().to_string(),
                        output: output.to_string(),
                    },
                )
                .await;
                self.state = CoachState::Listening;
            }
            ServerEvent::Error(data) => {
                let error = data.error();
                if error.is_session_fatal() {
                    tracing::error!(
                        "fatal session error: {} ({})",
                        error.message(),
                        error.error_type()
                    );
                    self.state = CoachState::Closed;
                    Self::send(
                        commands,
                        Command::Shutdown {
                            reason: error.message().to_string(),
                        },
                    )
                    .await;
                } else {
                    tracing::warn!(
                        "service error: {} ({})",
                        error.message(),
                        error.error_type()
                    );
                }
            }
            ServerEvent::Close { reason } => {
                tracing::info!("connection closed: {:?}", reason);
                self.state = CoachState::Closed;
                Self::send(
                    commands,
                    Command::Shutdown {
                        reason: reason.unwrap_or_else(|| "connection closed".to_string()),
                    },
                )
                .await;
            }
        }
    }

    async fn send(commands: &Sender<Command>, command: Command) {
        if let Err(e) = commands.send(command).await {
            tracing::error!("command receiver dropped: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MockTelemetryProvider;
    use serde_json::json;

    fn ev(value: serde_json::Value) -> ServerEvent {
        serde_json::from_value(value).unwrap()
    }

    fn created() -> ServerEvent {
        ev(json!({
            "type": "session.created",
            "event_id": "event_1",
            "session": {"id": "sess_1", "model": "gpt-4o-realtime-preview-2024-12-17"}
        }))
    }

    fn updated() -> ServerEvent {
        ev(json!({
            "type": "session.updated",
            "event_id": "event_2",
            "session": {"id": "sess_1", "model": "gpt-4o-realtime-preview-2024-12-17"}
        }))
    }

    fn audio_delta(delta: &str) -> ServerEvent {
        ev(json!({
            "type": "response.audio.delta",
            "event_id": "event_3",
            "response_id": "resp_1",
            "item_id": "item_1",
            "output_index": 0,
            "content_index": 0,
            "delta": delta
        }))
    }

    fn audio_done() -> ServerEvent {
        ev(json!({
            "type": "response.audio.done",
            "event_id": "event_4",
            "response_id": "resp_1",
            "item_id": "item_1",
            "output_index": 0,
            "content_index": 0
        }))
    }

    fn tool_call(call_id: &str, name: &str) -> ServerEvent {
        ev(json!({
            "type": "response.function_call_arguments.done",
            "event_id": "event_5",
            "response_id": "resp_2",
            "item_id": "item_2",
            "output_index": 0,
            "call_id": call_id,
            "name": name,
            "arguments": "{}"
        }))
    }

    fn error_event(error: serde_json::Value) -> ServerEvent {
        ev(json!({"type": "error", "event_id": "event_6", "error": error}))
    }

    fn speech_started() -> ServerEvent {
        ev(json!({
            "type": "input_audio_buffer.speech_started",
            "event_id": "event_7",
            "audio_start_ms": 120,
            "item_id": "item_3"
        }))
    }

    fn test_config() -> Session {
        Session::new().build()
    }

    fn dispatcher_with(provider: MockTelemetryProvider) -> ToolDispatcher {
        ToolDispatcher::new(Box::new(provider))
    }

    fn channel() -> (Sender<Command>, tokio::sync::mpsc::Receiver<Command>) {
        tokio::sync::mpsc::channel(64)
    }

    fn drain(rx: &mut tokio::sync::mpsc::Receiver<Command>) -> Vec<Command> {
        let mut commands = Vec::new();
        while let Ok(command) = rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    #[tokio::test]
    async fn test_end_to_end_session_flow() {
        let mut provider = MockTelemetryProvider::new();
        provider
            .expect_get_telemetry()
            .returning(|| {
                match json!({"rpm": 6000}) {
                    serde_json::Value::Object(map) => Ok(map),
                    _ => unreachable!(),
                }
            })
            .once();
        let dispatcher = dispatcher_with(provider);
        let (tx, mut rx) = channel();
        let mut session = CoachSession::new(test_config());

        // Handshake: created -> configure, updated -> listening.
        session.process_event(created(), &dispatcher, &tx).await;
        assert_eq!(session.state(), CoachState::AwaitingUpdated);
        assert_eq!(session.session_id(), Some("sess_1"));
        let commands = drain(&mut rx);
        assert_eq!(commands.len(), 1);
        assert!(matches!(commands[0], Command::Configure(_)));

        session.process_event(updated(), &dispatcher, &tx).await;
        assert_eq!(session.state(), CoachState::Listening);
        assert!(drain(&mut rx).is_empty());

        // One audio run: open, the delta bytes, close.
        session.process_event(audio_delta("QUJD"), &dispatcher, &tx).await;
        assert_eq!(session.state(), CoachState::Speaking);
        session.process_event(audio_done(), &dispatcher, &tx).await;
        assert_eq!(session.state(), CoachState::Listening);
        let commands = drain(&mut rx);
        assert!(matches!(commands[0], Command::OpenPlayback));
        assert!(matches!(&commands[1], Command::PlayAudio(delta) if delta.as_str() == "QUJD"));
        assert!(matches!(commands[2], Command::ClosePlayback));
        assert_eq!(commands.len(), 3);

        // Tool call: result correlated to the call id, back to listening.
        session
            .process_event(tool_call("abc", "get_telemetry"), &dispatcher, &tx)
            .await;
        assert_eq!(session.state(), CoachState::Listening);
        let commands = drain(&mut rx);
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            Command::SubmitToolResult { call_id, output } => {
                assert_eq!(call_id, "abc");
                assert_eq!(
                    serde_json::from_str::<serde_json::Value>(output).unwrap(),
                    json!({"rpm": 6000})
                );
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_configuration_is_sent_exactly_once() {
        let dispatcher = dispatcher_with(MockTelemetryProvider::new());
        let (tx, mut rx) = channel();
        let mut session = CoachSession::new(test_config());

        session.process_event(created(), &dispatcher, &tx).await;
        session.process_event(created(), &dispatcher, &tx).await;
        let configures = drain(&mut rx)
            .into_iter()
            .filter(|c| matches!(c, Command::Configure(_)))
            .count();
        assert_eq!(configures, 1);
    }

    #[tokio::test]
    async fn test_playback_runs_never_interleave() {
        let dispatcher = dispatcher_with(MockTelemetryProvider::new());
        let (tx, mut rx) = channel();
        let mut session = CoachSession::new(test_config());

        session.process_event(created(), &dispatcher, &tx).await;
        session.process_event(updated(), &dispatcher, &tx).await;
        drain(&mut rx);

        // Consecutive deltas share one run.
        session.process_event(audio_delta("AA=="), &dispatcher, &tx).await;
        session.process_event(audio_delta("BB=="), &dispatcher, &tx).await;
        session.process_event(audio_delta("CC=="), &dispatcher, &tx).await;
        session.process_event(audio_done(), &dispatcher, &tx).await;
        // A delta after done starts a fresh run.
        session.process_event(audio_delta("DD=="), &dispatcher, &tx).await;
        session.process_event(audio_done(), &dispatcher, &tx).await;

        let mut open = 0i32;
        let mut max_open = 0i32;
        let mut opens = 0;
        for command in drain(&mut rx) {
            match command {
                Command::OpenPlayback => {
                    open += 1;
                    opens += 1;
                    max_open = max_open.max(open);
                }
                Command::ClosePlayback => open -= 1,
                _ => {}
            }
        }
        assert_eq!(opens, 2);
        assert_eq!(open, 0);
        assert_eq!(max_open, 1);
    }

    #[tokio::test]
    async fn test_stray_audio_done_is_harmless() {
        let dispatcher = dispatcher_with(MockTelemetryProvider::new());
        let (tx, mut rx) = channel();
        let mut session = CoachSession::new(test_config());

        session.process_event(created(), &dispatcher, &tx).await;
        session.process_event(updated(), &dispatcher, &tx).await;
        drain(&mut rx);

        session.process_event(audio_done(), &dispatcher, &tx).await;
        assert_eq!(session.state(), CoachState::Listening);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_keeps_the_session_listening() {
        let dispatcher = dispatcher_with(MockTelemetryProvider::new());
        let (tx, mut rx) = channel();
        let mut session = CoachSession::new(test_config());

        session.process_event(created(), &dispatcher, &tx).await;
        session.process_event(updated(), &dispatcher, &tx).await;
        drain(&mut rx);

        session
            .process_event(tool_call("xyz", "unknown_tool"), &dispatcher, &tx)
            .await;
        assert_eq!(session.state(), CoachState::Listening);
        let commands = drain(&mut rx);
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            Command::SubmitToolResult { call_id, output } => {
                assert_eq!(call_id, "xyz");
                assert_eq!(
                    serde_json::from_str::<serde_json::Value>(output).unwrap(),
                    json!({"error": "Unknown function"})
                );
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_turn_scoped_error_does_not_change_state() {
        let dispatcher = dispatcher_with(MockTelemetryProvider::new());
        let (tx, mut rx) = channel();
        let mut session = CoachSession::new(test_config());

        session.process_event(created(), &dispatcher, &tx).await;
        session.process_event(updated(), &dispatcher, &tx).await;
        drain(&mut rx);

        session
            .process_event(
                error_event(json!({
                    "type": "invalid_request_error",
                    "code": "input_audio_buffer_commit_empty",
                    "message": "buffer too small",
                    "param": null,
                    "event_id": null
                })),
                &dispatcher,
                &tx,
            )
            .await;
        assert_eq!(session.state(), CoachState::Listening);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_fatal_error_closes_the_session() {
        let dispatcher = dispatcher_with(MockTelemetryProvider::new());
        let (tx, mut rx) = channel();
        let mut session = CoachSession::new(test_config());

        session.process_event(created(), &dispatcher, &tx).await;
        session
            .process_event(
                error_event(json!({
                    "type": "invalid_request_error",
                    "code": "invalid_api_key",
                    "message": "bad key",
                    "param": null,
                    "event_id": null
                })),
                &dispatcher,
                &tx,
            )
            .await;
        assert_eq!(session.state(), CoachState::Closed);
        let commands = drain(&mut rx);
        assert!(matches!(commands.last(), Some(Command::Shutdown { .. })));

        // Late events after close are dropped on the floor.
        session.process_event(audio_delta("EE=="), &dispatcher, &tx).await;
        assert_eq!(session.state(), CoachState::Closed);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_speech_markers_are_informational() {
        let dispatcher = dispatcher_with(MockTelemetryProvider::new());
        let (tx, mut rx) = channel();
        let mut session = CoachSession::new(test_config());

        session.process_event(created(), &dispatcher, &tx).await;
        session.process_event(updated(), &dispatcher, &tx).await;
        drain(&mut rx);

        session.process_event(speech_started(), &dispatcher, &tx).await;
        assert_eq!(session.state(), CoachState::Listening);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_socket_close_shuts_the_session_down() {
        let dispatcher = dispatcher_with(MockTelemetryProvider::new());
        let (tx, mut rx) = channel();
        let mut session = CoachSession::new(test_config());

        session.process_event(created(), &dispatcher, &tx).await;
        session
            .process_event(ServerEvent::Close { reason: None }, &dispatcher, &tx)
            .await;
        assert_eq!(session.state(), CoachState::Closed);
        let commands = drain(&mut rx);
        assert!(matches!(commands.last(), Some(Command::Shutdown { .. })));
    }
}
