use anyhow::Result;
use std::io::BufRead;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use log::{info, warn};

use crate::audio::{list_input_devices, CpalBackend};
use crate::config::Settings;
use crate::core::analyzer::{LevelMeter, SampleRing};
use crate::core::gate::TriggerGate;
use crate::core::midi::{MidiMirror, MidiOutputHandler};
use crate::core::pitch::{McLeodModel, ModelFactory, PitchEstimator, PitchModel, ThreadedDriver};
use crate::core::session::AudioSession;
use crate::core::synth::{MonoVoice, ToneSynth};
use crate::core::ModeController;
use crate::messaging::{ControlMessage, MessageBus};

const IDLE_WAIT: Duration = Duration::from_millis(100);
const MAX_MESSAGES_PER_TURN: usize = 64;

type Controller = ModeController<CpalBackend, ThreadedDriver, ToneSynth>;

// Main app state
pub struct PitchApp {
    controller: Controller,
    message_bus: MessageBus,
    should_exit: bool,
}

impl PitchApp {
    pub fn new(settings: Settings) -> Result<Self> {
        let message_bus = MessageBus::new();

        let (meter, level_tap) = LevelMeter::with_tap(settings.level_smoothing);
        let ring = SampleRing::new(settings.window_size);

        let mut voice = MonoVoice::new(44100.0);
        voice.volume = settings.volume;
        voice.waveform = settings.waveform.clone();
        voice.envelope = settings.envelope.clone();
        let voice = Arc::new(RwLock::new(voice));

        let backend = CpalBackend::new(level_tap, ring.clone(), Arc::clone(&voice))?;
        let session = AudioSession::new(backend, settings.input_device.as_deref());

        let (window_size, power, clarity) =
            (settings.window_size, settings.power_threshold, settings.clarity_threshold);
        let factory: ModelFactory = Arc::new(move || {
            Box::new(McLeodModel::new(window_size, power, clarity)) as Box<dyn PitchModel>
        });
        let driver = ThreadedDriver::new(
            ring,
            message_bus.sender(),
            factory,
            settings.window_size,
            settings.hop_size,
        );

        let mut synth = ToneSynth::new(voice);
        if let Some(port) = &settings.midi_output_port {
            match MidiMirror::connect(port) {
                Ok(mirror) => synth = synth.with_mirror(mirror),
                Err(err) => warn!("{}", err),
            }
        }

        let controller = ModeController::new(
            session,
            meter,
            PitchEstimator::new(driver),
            TriggerGate::new(settings.gate_threshold),
            synth,
        );

        Ok(Self {
            controller,
            message_bus,
            should_exit: false,
        })
    }

    /// Forward stdin lines to the bus from a reader thread
    pub fn spawn_command_reader(&self) -> Result<()> {
        let sender = self.message_bus.sender();
        thread::Builder::new()
            .name("command-reader".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if let Some(msg) = ControlMessage::parse_command(&line) {
                        if sender.send(msg).is_err() {
                            return;
                        }
                    }
                }
                let _ = sender.send(ControlMessage::Quit);
            })?;
        Ok(())
    }

    pub fn run(&mut self) -> Result<()> {
        info!("Commands: audio | midi | mute | device <name> | devices | ports | status | quit");
        while !self.should_exit {
            if let Some(msg) = self.message_bus.recv_timeout(IDLE_WAIT) {
                self.handle_message(msg);
            }
            let mut pending = Vec::new();
            self.message_bus.process_messages(MAX_MESSAGES_PER_TURN, |msg| pending.push(msg));
            for msg in pending {
                self.handle_message(msg);
            }
        }
        self.controller.select_mode(crate::core::OperatingMode::Mute);
        Ok(())
    }

    fn handle_message(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::SelectMode(mode) => self.controller.select_mode(mode),
            ControlMessage::SelectDevice(id) => self.controller.select_device(&id),
            ControlMessage::Estimate { generation, result } => {
                self.controller.on_estimate(generation, &result);
            },
            ControlMessage::ListDevices => match list_input_devices() {
                Ok(devices) if devices.is_empty() => info!("No audio input devices"),
                Ok(devices) => {
                    for (i, name) in devices.iter().enumerate() {
                        info!("Audio Input {}: {}", i, name);
                    }
                },
                Err(err) => warn!("Error enumerating audio devices: {}", err),
            },
            ControlMessage::ListMidiPorts => {
                for (i, name) in MidiOutputHandler::list_ports().iter().enumerate() {
                    info!("MIDI Output {}: {}", i, name);
                }
            },
            ControlMessage::Status => info!("{}", self.controller.status()),
            ControlMessage::Quit => self.should_exit = true,
        }
    }
}
