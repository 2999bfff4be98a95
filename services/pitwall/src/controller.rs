//! Top-level session coordination: owns the transport, the audio pipeline
//! and the telemetry provider, runs the send and receive loops, and makes
//! sure everything is released on the way out.

use std::collections::VecDeque;

use anyhow::{Context, Result};
use rubato::{FastFixedIn, Resampler};
use tokio::sync::{mpsc, watch};

use pitwall_core::dispatcher::ToolDispatcher;
use pitwall_core::session_state::{CoachSession, CoachState};
use pitwall_core::telemetry::{defaults, TelemetryMap, TelemetryProvider};
use pitwall_core::{briefing, Command, SessionPhase};
use pitwall_native_utils::audio;
use pitwall_native_utils::capture::{capture_queue, CaptureSource};
use pitwall_realtime_types::audio::Voice;

use crate::audio_io::{self, PlaybackStream};
use crate::config::{Config, CAPTURE_QUEUE_FRAMES, CAPTURE_RECV_TIMEOUT, INPUT_CHUNK_SIZE};

pub struct SessionController {
    config: Config,
    voice: Voice,
    input_device: Option<String>,
    output_device: Option<String>,
    phase: SessionPhase,
}

impl SessionController {
    pub fn new(
        config: Config,
        voice: Voice,
        input_device: Option<String>,
        output_device: Option<String>,
    ) -> Self {
        Self {
            config,
            voice,
            input_device,
            output_device,
            phase: SessionPhase::Idle,
        }
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        tracing::info!("session phase: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Run one session to completion. Returns once the session has closed,
    /// cleanly or otherwise; transport failure at startup is the only error
    /// path out of here.
    pub async fn run(mut self, provider: Box<dyn TelemetryProvider>) -> Result<()> {
        self.set_phase(SessionPhase::Connecting);

        // Telemetry first. A dead simulator link is not fatal; the coach
        // runs on default data until the box comes back.
        let mut dispatcher = ToolDispatcher::new(provider);
        if dispatcher.connect().await {
            tracing::info!("telemetry source connected");
        } else {
            tracing::warn!("telemetry source unavailable, coaching with default data");
        }
        tracing::info!(
            "telemetry tools: {:?}",
            dispatcher.provider().list_available_tools()
        );

        let situation = snapshot(
            dispatcher.provider().get_racing_situation().await,
            defaults::racing_situation,
        );
        let telemetry = snapshot(
            dispatcher.provider().get_telemetry().await,
            defaults::telemetry,
        );
        let track = snapshot(
            dispatcher.provider().get_track_info().await,
            defaults::track_info,
        );
        tracing::info!(
            "track: {}",
            track.get("name").and_then(|v| v.as_str()).unwrap_or("unknown")
        );

        let instructions = briefing::coach_instructions(&situation, &telemetry, &track);
        let session_config = briefing::coach_session(&instructions, self.voice.clone());

        // Audio hardware. Failure here is a startup failure.
        let (queue, source) = capture_queue(CAPTURE_QUEUE_FRAMES);
        let input = audio_io::start_capture(self.input_device.clone(), queue)?;
        let output = audio_io::start_playback(self.output_device.clone())?;
        let mut playback = PlaybackStream::new(output.producer, output.sample_rate)?;
        let in_resampler = audio::create_resampler(
            input.sample_rate as f64,
            audio::REALTIME_API_PCM16_SAMPLE_RATE,
            INPUT_CHUNK_SIZE,
        )
        .context("Failed to create resampler for capture")?;

        // Transport.
        let client_config = pitwall_realtime::Config::builder()
            .with_api_key(&self.config.openai_api_key)
            .with_model(&self.config.realtime_model)
            .build();
        let mut client = pitwall_realtime::connect(client_config)
            .await
            .context("Failed to connect to the realtime service")?;
        let server_events = client.server_events()?;
        self.set_phase(SessionPhase::Configuring);

        let session = CoachSession::new(session_config);
        let (command_tx, mut command_rx) = mpsc::channel::<Command>(64);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(64);
        let (shutdown_tx, _) = watch::channel(false);

        let send_handle = tokio::spawn(send_loop(
            source,
            outbound_tx,
            in_resampler,
            shutdown_tx.subscribe(),
        ));
        let recv_handle = tokio::spawn(receive_loop(
            server_events,
            dispatcher,
            session,
            command_tx,
            shutdown_tx.subscribe(),
        ));

        // The controller itself is the command executor: it owns the client
        // and the playback run, so wire messages and speaker writes stay
        // strictly ordered.
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut configured = false;
        loop {
            tokio::select! {
                maybe_command = command_rx.recv() => {
                    let Some(command) = maybe_command else {
                        tracing::warn!("receive loop ended without a shutdown command");
                        break;
                    };
                    match command {
                        Command::Configure(config) => {
                            tracing::info!("Initializing session...");
                            tracing::debug!(
                                "Session config: {}",
                                serde_json::to_string(&config).unwrap_or_default()
                            );
                            if let Err(e) = client.update_session(config).await {
                                tracing::error!("failed to send session config: {}", e);
                                break;
                            }
                            configured = true;
                            if self.phase == SessionPhase::Configuring {
                                self.set_phase(SessionPhase::Active);
                            }
                        }
                        Command::OpenPlayback => playback.open(),
                        Command::PlayAudio(delta) => playback.write(&delta),
                        Command::ClosePlayback => playback.close(),
                        Command::SubmitToolResult { call_id, output } => {
                            let item = pitwall_realtime::types::Item::FunctionCallOutput(
                                pitwall_realtime::types::FunctionCallOutputItem::new(
                                    &call_id, &output,
                                ),
                            );
                            if let Err(e) = client.create_conversation_item(item).await {
                                tracing::error!("failed to submit tool result: {}", e);
                                break;
                            }
                            if let Err(e) = client.create_response().await {
                                tracing::error!("failed to request a response: {}", e);
                                break;
                            }
                        }
                        Command::Shutdown { reason } => {
                            tracing::info!("session over: {}", reason);
                            break;
                        }
                    }
                }
                maybe_audio = outbound_rx.recv() => {
                    let Some(encoded) = maybe_audio else {
                        tracing::warn!("send loop ended unexpectedly");
                        break;
                    };
                    // Nothing goes out before the session configuration.
                    if !configured {
                        continue;
                    }
                    if let Err(e) = client.append_input_audio_buffer(encoded).await {
                        tracing::error!("failed to send audio buffer: {}", e);
                        break;
                    }
                }
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl-C, shutting down...");
                    break;
                }
            }
        }

        // Teardown. Every release step runs; failures are collected, not
        // allowed to abort the sequence.
        self.set_phase(SessionPhase::Closing);
        let mut failures: Vec<String> = Vec::new();

        if playback.is_open() {
            tracing::warn!("playback run still open at teardown");
        }
        playback.close();
        drop(input.stream);
        drop(output.stream);

        if shutdown_tx.send(true).is_err() {
            // Both loops already finished; nothing left to signal.
            tracing::debug!("shutdown signal had no receivers");
        }
        client.close();
        // Unblock any loop mid-send into a full channel.
        drop(command_rx);
        drop(outbound_rx);

        match recv_handle.await {
            Ok(mut dispatcher) => dispatcher.shutdown().await,
            Err(e) => failures.push(format!("receive loop panicked: {}", e)),
        }
        if let Err(e) = send_handle.await {
            failures.push(format!("send loop panicked: {}", e));
        }

        let stats = client.stats();
        tracing::info!(
            "session token usage: total={} input={} output={}",
            stats.total_tokens(),
            stats.input_tokens(),
            stats.output_tokens()
        );

        for failure in &failures {
            tracing::error!("cleanup failure: {}", failure);
        }
        self.set_phase(SessionPhase::Closed);
        tracing::info!("Disconnected");
        Ok(())
    }
}

fn snapshot(
    result: std::result::Result<TelemetryMap, pitwall_core::ToolError>,
    fallback: fn() -> TelemetryMap,
) -> TelemetryMap {
    match result {
        Ok(map) => map,
        Err(e) => {
            tracing::warn!("telemetry snapshot failed: {}", e);
            fallback()
        }
    }
}

/// Drain the capture queue, resample to the wire rate, and hand base64 PCM16
/// to the executor. The short receive timeout keeps the loop responsive to
/// shutdown even when the microphone goes quiet.
async fn send_loop(
    mut source: CaptureSource,
    outbound: mpsc::Sender<String>,
    mut resampler: FastFixedIn<f32>,
    shutdown: watch::Receiver<bool>,
) {
    let mut buffer: VecDeque<f32> = VecDeque::with_capacity(INPUT_CHUNK_SIZE * 2);

    loop {
        if *shutdown.borrow() {
            break;
        }
        match source.recv_timeout(CAPTURE_RECV_TIMEOUT).await {
            Ok(Some(frame)) => {
                buffer.extend(frame.into_samples());
                let mut resampled: Vec<f32> = vec![];
                while buffer.len() >= INPUT_CHUNK_SIZE {
                    let chunk: Vec<f32> = buffer.drain(..INPUT_CHUNK_SIZE).collect();
                    if let Ok(resamples) = resampler.process(&[chunk.as_slice()], None) {
                        if let Some(resamples) = resamples.first() {
                            resampled.extend(resamples.iter().copied());
                        }
                    }
                }
                if resampled.is_empty() {
                    continue;
                }
                if outbound.send(audio::encode(&resampled)).await.is_err() {
                    break;
                }
            }
            // Every producer handle dropped; capture is over.
            Ok(None) => break,
            // Liveness tick; go around and check for shutdown.
            Err(_) => continue,
        }
    }
    tracing::debug!("send loop finished");
}

/// Feed inbound events through the state machine, strictly in arrival
/// order. Returns the dispatcher so the controller can release the provider.
async fn receive_loop(
    mut events: pitwall_realtime::ServerRx,
    dispatcher: ToolDispatcher,
    mut session: CoachSession,
    commands: mpsc::Sender<Command>,
    mut shutdown: watch::Receiver<bool>,
) -> ToolDispatcher {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        session.process_event(event, &dispatcher, &commands).await;
                        if session.state() == CoachState::Closed {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::error!("receive loop lagged, {} events lost", n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        }
    }
    tracing::debug!("receive loop finished");
    dispatcher
}
