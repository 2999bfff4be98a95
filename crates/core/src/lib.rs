pub mod briefing;
pub mod dispatcher;
pub mod error;
pub mod session_state;
pub mod telemetry;

pub use error::ToolError;

use pitwall_realtime_types::audio::Base64EncodedAudioBytes;
use pitwall_realtime_types::Session;

/// Commands the protocol state machine issues to the runtime.
///
/// This enum is the primary API for decoupling the session's decision-making
/// from the runtime's execution of side effects (sending wire messages,
/// touching the speaker). The receive loop feeds events in, commands come
/// out, and the controller executes them in order.
#[derive(Debug, Clone)]
pub enum Command {
    /// Send the session configuration (`session.update`) to the service.
    Configure(Session),
    /// Begin a playback run for a new response.
    OpenPlayback,
    /// Append a base64 PCM16 fragment to the open playback run.
    PlayAudio(Base64EncodedAudioBytes),
    /// End the current playback run.
    ClosePlayback,
    /// Insert a tool result into the conversation and ask the service to
    /// continue the turn.
    SubmitToolResult { call_id: String, output: String },
    /// The session is over; tear everything down.
    Shutdown { reason: String },
}

/// Controller-owned session lifecycle, from process start to teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Configuring,
    Active,
    Closing,
    Closed,
}
