//! cpal implementation of the audio graph: one output stream for the life of
//! the process, one input stream per acquired device.

use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SampleRate, Stream, SupportedStreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::{unbounded, Receiver, Sender};
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use log::{debug, error, info};

use crate::core::analyzer::{LevelTap, SampleRing};
use crate::core::session::{AudioBackend, DeviceError, Route};
use crate::core::synth::MonoVoice;

// About a quarter second of monitored input at 48 kHz
const MONITOR_CAPACITY: usize = 12_000;

fn route_to_u8(route: Route) -> u8 {
    match route {
        Route::Silent => 0,
        Route::Passthrough => 1,
        Route::Synth => 2,
    }
}

fn route_from_u8(value: u8) -> Route {
    match value {
        1 => Route::Passthrough,
        2 => Route::Synth,
        _ => Route::Silent,
    }
}

/// State shared between the controller thread and the stream callbacks
struct SharedGraph {
    route: AtomicU8,
    level: LevelTap,
    ring: SampleRing,
    voice: Arc<RwLock<MonoVoice>>,
}

impl SharedGraph {
    fn route(&self) -> Route {
        route_from_u8(self.route.load(Ordering::Acquire))
    }
}

/// Owned by one input callback: mixes down to mono and feeds the taps
struct InputPath {
    shared: Arc<SharedGraph>,
    monitor: Producer<f32>,
    scratch: Vec<f32>,
    channels: usize,
}

impl InputPath {
    fn new(shared: Arc<SharedGraph>, monitor: Producer<f32>, channels: usize) -> Self {
        Self {
            shared,
            monitor,
            scratch: Vec::with_capacity(4096),
            channels: channels.max(1),
        }
    }

    fn process<T>(&mut self, data: &[T])
    where
        T: Sample,
        f32: cpal::FromSample<T>,
    {
        let channels = self.channels;
        self.scratch.clear();
        self.scratch.extend(
            data.chunks(channels)
                .map(|frame| frame.iter().map(|s| s.to_sample::<f32>()).sum::<f32>() / channels as f32),
        );

        self.shared.level.process(&self.scratch);
        self.shared.ring.push(&self.scratch);

        if self.shared.route() == Route::Passthrough {
            for &sample in &self.scratch {
                // output has fallen behind, drop the rest of the block
                if self.monitor.push(sample).is_err() {
                    break;
                }
            }
        }
    }
}

/// Output callback's end of the passthrough monitor. A new consumer
/// arrives each time an input stream opens.
struct MonitorFeed {
    incoming: Receiver<Consumer<f32>>,
    current: Option<Consumer<f32>>,
}

impl MonitorFeed {
    fn new(incoming: Receiver<Consumer<f32>>) -> Self {
        Self { incoming, current: None }
    }

    fn refresh(&mut self) {
        while let Ok(consumer) = self.incoming.try_recv() {
            self.current = Some(consumer);
        }
    }

    fn next_sample(&mut self) -> f32 {
        self.current.as_mut().and_then(|c| c.pop().ok()).unwrap_or(0.0)
    }

    /// Throw away whatever is queued
    fn discard(&mut self) {
        if let Some(consumer) = self.current.as_mut() {
            let queued = consumer.slots();
            if let Ok(chunk) = consumer.read_chunk(queued) {
                chunk.commit_all();
            }
        }
    }
}

pub struct CpalBackend {
    host: cpal::Host,
    shared: Arc<SharedGraph>,
    monitor_tx: Sender<Consumer<f32>>,
    output_rate: u32,
    input: Option<Stream>,
    output: Stream,
    running: bool,
}

impl CpalBackend {
    /// Open the default output device. Input is opened later by the session.
    pub fn new(level: LevelTap, ring: SampleRing, voice: Arc<RwLock<MonoVoice>>) -> Result<Self> {
        let host = cpal::default_host();
        info!("Using audio host: {}", host.id().name());

        let device = host.default_output_device()
            .ok_or_else(|| anyhow::anyhow!("No output device available"))?;
        info!("Using output device: {:?}", device.name());

        let config = device.default_output_config()?;
        let sample_format = config.sample_format();
        let config = cpal::StreamConfig::from(config);
        let output_rate = config.sample_rate.0;

        if let Ok(mut voice) = voice.write() {
            voice.sample_rate = output_rate as f32;
        }

        let shared = Arc::new(SharedGraph {
            route: AtomicU8::new(route_to_u8(Route::Silent)),
            level,
            ring,
            voice,
        });
        let (monitor_tx, monitor_rx) = unbounded();
        let feed = MonitorFeed::new(monitor_rx);

        let output = match sample_format {
            SampleFormat::F32 => create_output_stream::<f32>(&device, &config, Arc::clone(&shared), feed),
            SampleFormat::I16 => create_output_stream::<i16>(&device, &config, Arc::clone(&shared), feed),
            SampleFormat::U16 => create_output_stream::<u16>(&device, &config, Arc::clone(&shared), feed),
            _ => anyhow::bail!("Unsupported sample format"),
        }?;
        // stays quiet until the session resumes
        let _ = output.pause();

        Ok(Self {
            host,
            shared,
            monitor_tx,
            output_rate,
            input: None,
            output,
            running: false,
        })
    }

    fn find_input_device(&self, device_id: Option<&str>) -> Result<cpal::Device, DeviceError> {
        match device_id {
            None => self.host.default_input_device()
                .ok_or_else(|| DeviceError::NoDevice("default".to_string())),
            Some(id) => {
                let mut devices = self.host.input_devices()
                    .map_err(|e| DeviceError::Stream(e.to_string()))?;
                devices
                    .find(|device| device.name().map(|name| name == id).unwrap_or(false))
                    .ok_or_else(|| DeviceError::NoDevice(id.to_string()))
            },
        }
    }

    fn input_config(&self, device: &cpal::Device, device_id: Option<&str>) -> Result<SupportedStreamConfig, DeviceError> {
        let unavailable = || DeviceError::NoDevice(device_id.unwrap_or("default").to_string());

        let default = match device.default_input_config() {
            Ok(config) => Some(config),
            Err(cpal::DefaultStreamConfigError::DeviceNotAvailable) => return Err(unavailable()),
            Err(err) => {
                debug!("no default input config: {}", err);
                None
            },
        };
        let ranges = device.supported_input_configs().map_err(|err| match err {
            cpal::SupportedStreamConfigsError::DeviceNotAvailable => unavailable(),
            other => DeviceError::Stream(other.to_string()),
        })?;

        select_input_config(default, ranges, self.output_rate)
    }
}

/// Names of the input devices the host can see
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let names = host
        .input_devices()?
        .filter_map(|device| device.name().ok())
        .collect();
    Ok(names)
}

fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::F32 => Some(0),
        SampleFormat::I16 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

/// Pick an input config that runs at the output's rate, so passthrough
/// plays 1:1. The device default wins when it already matches.
fn select_input_config<I>(
    default: Option<SupportedStreamConfig>,
    ranges: I,
    rate: u32,
) -> Result<SupportedStreamConfig, DeviceError>
where
    I: IntoIterator<Item = SupportedStreamConfigRange>,
{
    if let Some(default) = default {
        if default.sample_rate().0 == rate && format_rank(default.sample_format()).is_some() {
            return Ok(default);
        }
    }

    ranges
        .into_iter()
        .filter(|range| range.min_sample_rate().0 <= rate && rate <= range.max_sample_rate().0)
        .filter_map(|range| format_rank(range.sample_format()).map(|rank| (rank, range)))
        .min_by_key(|(rank, range)| (*rank, range.channels()))
        .map(|(_, range)| range.with_sample_rate(SampleRate(rate)))
        .ok_or_else(|| DeviceError::UnsupportedFormat(format!("input cannot run at the output rate of {} Hz", rate)))
}

fn classify_build_error(err: cpal::BuildStreamError) -> DeviceError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => DeviceError::NoDevice("device vanished".to_string()),
        cpal::BuildStreamError::StreamConfigNotSupported => {
            DeviceError::UnsupportedFormat("stream config not supported".to_string())
        },
        other => {
            let message = other.to_string();
            let lower = message.to_lowercase();
            if lower.contains("permission") || lower.contains("denied") {
                DeviceError::Permission(message)
            } else {
                DeviceError::Stream(message)
            }
        },
    }
}

impl AudioBackend for CpalBackend {
    fn open_input(&mut self, device_id: Option<&str>) -> Result<(), DeviceError> {
        self.close_input();

        let device = self.find_input_device(device_id)?;
        let config = self.input_config(&device, device_id)?;

        let sample_format = config.sample_format();
        let config = cpal::StreamConfig::from(config);
        self.shared.ring.clear();
        self.shared.ring.set_sample_rate(config.sample_rate.0);

        let (producer, consumer) = RingBuffer::<f32>::new(MONITOR_CAPACITY);
        let path = InputPath::new(Arc::clone(&self.shared), producer, config.channels as usize);
        let stream = match sample_format {
            SampleFormat::F32 => create_input_stream::<f32>(&device, &config, path),
            SampleFormat::I16 => create_input_stream::<i16>(&device, &config, path),
            SampleFormat::U16 => create_input_stream::<u16>(&device, &config, path),
            other => return Err(DeviceError::UnsupportedFormat(format!("{:?}", other))),
        }
        .map_err(classify_build_error)?;

        if self.running {
            stream.play().map_err(|e| DeviceError::Stream(e.to_string()))?;
        } else {
            let _ = stream.pause();
        }
        // the output callback swaps to this consumer on its next block
        let _ = self.monitor_tx.send(consumer);

        info!("Input stream open at {} Hz", config.sample_rate.0);
        self.input = Some(stream);
        Ok(())
    }

    fn close_input(&mut self) {
        if self.input.take().is_some() {
            self.shared.level.reset();
        }
    }

    fn set_running(&mut self, running: bool) -> Result<(), DeviceError> {
        let streams = std::iter::once(&self.output).chain(self.input.as_ref());
        for stream in streams {
            let result = if running {
                stream.play().map_err(|e| e.to_string())
            } else {
                stream.pause().map_err(|e| e.to_string())
            };
            result.map_err(DeviceError::Stream)?;
        }
        if !running {
            self.shared.level.reset();
        }
        self.running = running;
        Ok(())
    }

    fn set_route(&mut self, route: Route) {
        self.shared.route.store(route_to_u8(route), Ordering::Release);
    }
}

fn create_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut path: InputPath,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: Sample + Send + 'static + cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let err_fn = |err| error!("Input stream error: {}", err);

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| path.process(data),
        err_fn,
        None,
    )
}

fn create_output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<SharedGraph>,
    mut feed: MonitorFeed,
) -> Result<Stream>
where
    T: Sample + Send + 'static + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let err_fn = |err| error!("Output stream error: {}", err);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            feed.refresh();
            match shared.route() {
                Route::Silent => {
                    feed.discard();
                    fill(data, channels, || 0.0);
                },
                Route::Passthrough => fill(data, channels, || feed.next_sample()),
                Route::Synth => {
                    feed.discard();
                    match shared.voice.write() {
                        Ok(mut voice) => fill(data, channels, || voice.next_sample()),
                        Err(_) => fill(data, channels, || 0.0),
                    }
                },
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Write one mono value per frame to every channel
fn fill<T, F>(data: &mut [T], channels: usize, mut next: F)
where
    T: Sample + cpal::FromSample<f32>,
    F: FnMut() -> f32,
{
    for frame in data.chunks_mut(channels) {
        let value = T::from_sample(next());
        for sample in frame.iter_mut() {
            *sample = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::SupportedBufferSize;

    fn shared(route: Route) -> Arc<SharedGraph> {
        let (_meter, level) = crate::core::analyzer::LevelMeter::with_tap(0.9);
        Arc::new(SharedGraph {
            route: AtomicU8::new(route_to_u8(route)),
            level,
            ring: SampleRing::new(16),
            voice: Arc::new(RwLock::new(MonoVoice::new(48000.0))),
        })
    }

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    fn config(channels: u16, rate: u32, format: SampleFormat) -> SupportedStreamConfig {
        SupportedStreamConfig::new(channels, SampleRate(rate), SupportedBufferSize::Unknown, format)
    }

    #[test]
    fn route_encoding_round_trips() {
        for route in [Route::Silent, Route::Passthrough, Route::Synth] {
            assert_eq!(route_from_u8(route_to_u8(route)), route);
        }
    }

    #[test]
    fn fill_duplicates_mono_to_all_channels() {
        let mut data = [0.0f32; 6];
        let mut values = [0.1f32, 0.2, 0.3].into_iter();
        fill(&mut data, 2, || values.next().unwrap_or(0.0));
        assert_eq!(data, [0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn input_mixes_down_and_only_monitors_in_passthrough() {
        let graph = shared(Route::Synth);
        let (producer, mut consumer) = RingBuffer::<f32>::new(8);
        let mut path = InputPath::new(Arc::clone(&graph), producer, 2);

        path.process(&[0.5f32, 0.5, 1.0, 0.0]);
        assert_eq!(graph.ring.total_written(), 2);
        assert!(consumer.pop().is_err());

        graph.route.store(route_to_u8(Route::Passthrough), Ordering::Release);
        path.process(&[0.2f32, 0.4, 1.0, 0.0]);
        assert!((consumer.pop().unwrap() - 0.3).abs() < 1e-6);
        assert!((consumer.pop().unwrap() - 0.5).abs() < 1e-6);
        assert!(consumer.pop().is_err());
    }

    #[test]
    fn full_monitor_drops_input_instead_of_blocking() {
        let graph = shared(Route::Passthrough);
        let (producer, consumer) = RingBuffer::<f32>::new(4);
        let mut path = InputPath::new(Arc::clone(&graph), producer, 1);

        path.process(&[0.25f32; 10]);
        assert_eq!(consumer.slots(), 4);
        // the pitch ring still sees every sample
        assert_eq!(graph.ring.total_written(), 10);
    }

    #[test]
    fn scratch_buffer_is_reused_between_blocks() {
        let graph = shared(Route::Silent);
        let (producer, _consumer) = RingBuffer::<f32>::new(4);
        let mut path = InputPath::new(graph, producer, 1);

        path.process(&[0.1f32; 256]);
        let capacity = path.scratch.capacity();
        let pointer = path.scratch.as_ptr();
        path.process(&[0.1f32; 128]);
        assert_eq!(path.scratch.capacity(), capacity);
        assert_eq!(path.scratch.as_ptr(), pointer);
    }

    #[test]
    fn monitor_feed_follows_the_newest_input() {
        let (tx, rx) = unbounded();
        let mut feed = MonitorFeed::new(rx);
        feed.refresh();
        assert_eq!(feed.next_sample(), 0.0);

        let (mut old_producer, old_consumer) = RingBuffer::<f32>::new(4);
        old_producer.push(0.9).unwrap();
        tx.send(old_consumer).unwrap();
        feed.refresh();

        let (mut producer, consumer) = RingBuffer::<f32>::new(4);
        producer.push(0.5).unwrap();
        producer.push(0.25).unwrap();
        tx.send(consumer).unwrap();
        feed.refresh();

        assert_eq!(feed.next_sample(), 0.5);
        feed.discard();
        assert_eq!(feed.next_sample(), 0.0);
    }

    #[test]
    fn default_input_config_is_kept_at_output_rate() {
        let default = config(1, 48000, SampleFormat::I16);
        let chosen = select_input_config(
            Some(default.clone()),
            vec![range(2, 8000, 96000, SampleFormat::F32)],
            48000,
        )
        .unwrap();
        assert_eq!(chosen, default);
    }

    #[test]
    fn input_is_reopened_at_output_rate_when_default_differs() {
        let chosen = select_input_config(
            Some(config(2, 44100, SampleFormat::F32)),
            vec![
                range(2, 44100, 44100, SampleFormat::F32),
                range(2, 8000, 96000, SampleFormat::I16),
                range(1, 8000, 96000, SampleFormat::F32),
                range(2, 8000, 96000, SampleFormat::F32),
            ],
            48000,
        )
        .unwrap();
        assert_eq!(chosen.sample_rate(), SampleRate(48000));
        assert_eq!(chosen.sample_format(), SampleFormat::F32);
        assert_eq!(chosen.channels(), 1);
    }

    #[test]
    fn input_that_cannot_match_output_rate_is_refused() {
        let result = select_input_config(
            Some(config(1, 44100, SampleFormat::F32)),
            vec![range(1, 44100, 44100, SampleFormat::F32), range(1, 8000, 96000, SampleFormat::U8)],
            48000,
        );
        assert!(matches!(result, Err(DeviceError::UnsupportedFormat(_))));
    }
}
