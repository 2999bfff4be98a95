//! Builds the coach persona and the `session.update` payload from the
//! telemetry snapshots taken at startup.

use pitwall_realtime_types::audio::{AudioFormat, ServerVadTurnDetection, TurnDetection, Voice};
use pitwall_realtime_types::session::{MaxResponseOutputTokens, Session};
use pitwall_realtime_types::tools::ToolChoice;

use crate::dispatcher;
use crate::telemetry::TelemetryMap;

pub const DEFAULT_COACH_VOICE: Voice = Voice::Echo;

/// Response cap keeps the coach terse; nobody wants a lecture at 180 mph.
const MAX_RESPONSE_TOKENS: i32 = 150;

fn str_field<'a>(map: &'a TelemetryMap, key: &str) -> &'a str {
    map.get(key).and_then(|v| v.as_str()).unwrap_or("Unknown")
}

fn speed_mph(telemetry: &TelemetryMap) -> f64 {
    telemetry
        .get("speed_mph")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
}

pub fn coach_instructions(
    situation: &TelemetryMap,
    telemetry: &TelemetryMap,
    track: &TelemetryMap,
) -> String {
    format!(
        "You are an energetic racing coach providing real-time advice during a live sim-racing session.\n\
         \n\
         Current session:\n\
         - Track: {}\n\
         - Position: {}\n\
         - Speed: {:.1} mph\n\
         \n\
         You have access to live telemetry through function calls. When asked about racing data, call the appropriate function.\n\
         \n\
         Keep responses very brief (1-2 sentences), energetic, and actionable. You're coaching during an active race.",
        str_field(track, "name"),
        str_field(situation, "position"),
        speed_mph(telemetry),
    )
}

/// The full session configuration sent once after `session.created`.
pub fn coach_session(instructions: &str, voice: Voice) -> Session {
    Session::new()
        .with_modalities_enable_audio()
        .with_instructions(instructions)
        .with_voice(voice)
        .with_input_audio_format(AudioFormat::Pcm16)
        .with_output_audio_format(AudioFormat::Pcm16)
        .with_turn_detection_enable(TurnDetection::ServerVad(
            ServerVadTurnDetection::default()
                .with_threshold(0.3)
                .with_prefix_padding_ms(200)
                .with_silence_duration_ms(400),
        ))
        .with_tools(dispatcher::declarations())
        .with_tool_choice(ToolChoice::Auto)
        .with_temperature(0.8)
        .with_max_response_output_tokens(MaxResponseOutputTokens::Number(MAX_RESPONSE_TOKENS))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::defaults;

    #[test]
    fn test_instructions_carry_snapshot_values() {
        let mut track = defaults::track_info();
        track.insert("name".to_string(), "Spa-Francorchamps".into());
        let mut situation = defaults::racing_situation();
        situation.insert("position".to_string(), "P4".into());
        let mut telemetry = defaults::telemetry();
        telemetry.insert("speed_mph".to_string(), 142.35_f64.into());

        let instructions = coach_instructions(&situation, &telemetry, &track);
        assert!(instructions.contains("Track: Spa-Francorchamps"));
        assert!(instructions.contains("Position: P4"));
        assert!(instructions.contains("Speed: 142.3 mph"));
    }

    #[test]
    fn test_instructions_survive_default_snapshots() {
        let instructions = coach_instructions(
            &defaults::racing_situation(),
            &defaults::telemetry(),
            &defaults::track_info(),
        );
        assert!(instructions.contains("Track: unknown"));
        assert!(instructions.contains("Speed: 0.0 mph"));
    }

    #[test]
    fn test_session_config_advertises_all_tools() {
        let session = coach_session("be brief", DEFAULT_COACH_VOICE);
        assert_eq!(session.tools().len(), 3);
        assert_eq!(session.instructions(), Some("be brief"));

        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["voice"], "echo");
        assert_eq!(json["turn_detection"]["type"], "server_vad");
        assert_eq!(json["max_response_output_tokens"], 150);
    }
}
