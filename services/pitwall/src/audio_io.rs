//! Hardware side of the audio pipeline: cpal stream setup for capture and
//! playback, and the per-response playback run over the output ring buffer.

use anyhow::Context;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapProd;
use rubato::{FastFixedIn, Resampler};

use pitwall_native_utils::audio;
use pitwall_native_utils::capture::{AudioFrame, CaptureQueue};
use pitwall_native_utils::device;

use crate::config::{INPUT_CHUNK_SIZE, OUTPUT_CHUNK_SIZE, OUTPUT_LATENCY_MS};

/// Resampler chunk for the 24 kHz -> device rate direction.
const PLAYBACK_RESAMPLE_CHUNK: usize = 100;

pub struct AudioInput {
    /// Keeps the capture stream alive; dropping it stops the microphone.
    pub stream: cpal::Stream,
    pub sample_rate: f32,
}

/// Open the capture device and start feeding the bounded queue. The callback
/// runs on the device's thread: downmix, enqueue, return. Overflow drops the
/// frame inside the queue rather than ever blocking here.
pub fn start_capture(device_name: Option<String>, queue: CaptureQueue) -> anyhow::Result<AudioInput> {
    let input =
        device::get_or_default_input(device_name).context("Failed to get audio input device")?;

    tracing::info!("Using input device: {:?}", input.name()?);
    for config in input.supported_input_configs()? {
        tracing::debug!("Supported input config: {:?}", config);
    }

    let input_config = input
        .default_input_config()
        .context("Failed to get default input config")?;
    let input_config = StreamConfig {
        channels: input_config.channels(),
        sample_rate: input_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
    };
    let channel_count = input_config.channels as usize;
    let sample_rate = input_config.sample_rate.0 as f32;
    tracing::info!("Input stream config: {:?}", &input_config);

    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        let mono = audio::downmix_to_mono(data, channel_count);
        queue.push(AudioFrame::capture(mono));
    };

    let stream = input.build_input_stream(
        &input_config,
        input_data_fn,
        move |err| tracing::error!("An error occurred on the input stream: {}", err),
        None,
    )?;
    stream.play()?;

    Ok(AudioInput {
        stream,
        sample_rate,
    })
}

pub struct AudioOutput {
    /// Keeps the playback stream alive; dropping it silences the speaker.
    pub stream: cpal::Stream,
    pub sample_rate: f32,
    pub producer: HeapProd<f32>,
}

/// Open the output device. The device stream runs for the whole session and
/// pulls from a ring buffer, playing silence whenever the buffer is dry.
pub fn start_playback(device_name: Option<String>) -> anyhow::Result<AudioOutput> {
    let output =
        device::get_or_default_output(device_name).context("Failed to get audio output device")?;

    tracing::info!("Using output device: {:?}", output.name()?);
    for config in output.supported_output_configs()? {
        tracing::debug!("Supported output config: {:?}", config);
    }

    let output_config = output
        .default_output_config()
        .context("Failed to get default output config")?;
    let output_config = StreamConfig {
        channels: output_config.channels(),
        sample_rate: output_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
    };
    let channel_count = output_config.channels as usize;
    let sample_rate = output_config.sample_rate.0 as f32;
    tracing::info!("Output stream config: {:?}", &output_config);

    let buffer = audio::shared_buffer(sample_rate as usize * OUTPUT_LATENCY_MS / 1000);
    let (producer, mut consumer) = buffer.split();

    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let mut sample_index = 0;
        while sample_index < data.len() {
            let sample = consumer.try_pop().unwrap_or(0.0);

            // L channel (ch:0)
            data[sample_index] = sample;
            sample_index += 1;
            // R channel (ch:1)
            if channel_count > 1 && sample_index < data.len() {
                data[sample_index] = sample;
                sample_index += 1;
            }
            // ignore other channels
            sample_index += channel_count.saturating_sub(2);
        }
    };

    let stream = output.build_output_stream(
        &output_config,
        output_data_fn,
        move |err| tracing::error!("An error occurred on the output stream: {}", err),
        None,
    )?;
    stream.play()?;

    Ok(AudioOutput {
        stream,
        sample_rate,
        producer,
    })
}

/// One response's worth of coach audio. Writes decode, resample and push
/// into the ring buffer, sequentially and in arrival order; the open/close
/// lifecycle guarantees two responses never interleave.
pub struct PlaybackStream {
    producer: HeapProd<f32>,
    resampler: FastFixedIn<f32>,
    open: bool,
}

impl PlaybackStream {
    pub fn new(producer: HeapProd<f32>, output_sample_rate: f32) -> anyhow::Result<Self> {
        let resampler = audio::create_resampler(
            audio::REALTIME_API_PCM16_SAMPLE_RATE,
            output_sample_rate as f64,
            PLAYBACK_RESAMPLE_CHUNK,
        )
        .context("Failed to create resampler for playback")?;
        Ok(Self {
            producer,
            resampler,
            open: false,
        })
    }

    pub fn open(&mut self) {
        if !self.open {
            self.open = true;
            tracing::info!("coach speaking...");
        }
    }

    pub fn write(&mut self, delta: &str) {
        let frame = AudioFrame::playback(audio::decode(delta));
        let chunk_size = self.resampler.input_frames_next();
        for samples in audio::split_for_chunks(frame.samples(), chunk_size) {
            if let Ok(resamples) = self.resampler.process(&[samples.as_slice()], None) {
                if let Some(resamples) = resamples.first() {
                    for resample in resamples {
                        if self.producer.try_push(*resample).is_err() {
                            tracing::warn!("playback buffer full, dropping samples");
                            break;
                        }
                    }
                }
            }
        }
    }

    pub fn close(&mut self) {
        if self.open {
            self.open = false;
            tracing::info!("response complete");
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}
