use std::fmt;

use log::{info, warn};

/// Device id meaning "whatever the host picks"
pub const DEFAULT_DEVICE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    NoDevice(String),
    Permission(String),
    Stream(String),
    UnsupportedFormat(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NoDevice(id) => write!(f, "audio device '{}' not found", id),
            DeviceError::Permission(msg) => write!(f, "audio device access denied: {}", msg),
            DeviceError::Stream(msg) => write!(f, "audio stream error: {}", msg),
            DeviceError::UnsupportedFormat(msg) => write!(f, "unsupported sample format: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}

/// What the output stream is currently fed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Silent,
    Passthrough,
    Synth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Suspended,
    Running,
}

/// The platform audio graph the session drives
pub trait AudioBackend {
    /// Open the input stream, `None` for the host default
    fn open_input(&mut self, device_id: Option<&str>) -> Result<(), DeviceError>;
    fn close_input(&mut self);
    fn set_running(&mut self, running: bool) -> Result<(), DeviceError>;
    fn set_route(&mut self, route: Route);
}

/// Owns the single input stream and processing context
pub struct AudioSession<B: AudioBackend> {
    backend: B,
    state: SessionState,
    device_id: Option<String>,
    acquired: bool,
    route: Route,
}

fn normalize_device(device_id: Option<&str>) -> Option<String> {
    match device_id.map(str::trim) {
        None | Some("") | Some(DEFAULT_DEVICE) => None,
        Some(id) => Some(id.to_string()),
    }
}

impl<B: AudioBackend> AudioSession<B> {
    pub fn new(backend: B, device_id: Option<&str>) -> Self {
        Self {
            backend,
            state: SessionState::Suspended,
            device_id: normalize_device(device_id),
            acquired: false,
            route: Route::Silent,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    pub fn device_id(&self) -> &str {
        self.device_id.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Open a (new) input stream, releasing the previous one and its routing first
    pub fn acquire(&mut self, device_id: Option<&str>) -> Result<(), DeviceError> {
        self.teardown();
        self.device_id = normalize_device(device_id);

        if let Err(err) = self.backend.open_input(self.device_id.as_deref()) {
            self.suspend();
            return Err(err);
        }
        self.acquired = true;
        info!("Acquired input device '{}'", self.device_id());

        if self.state == SessionState::Running {
            if let Err(err) = self.backend.set_running(true) {
                self.state = SessionState::Suspended;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Close the input stream and drop all routing
    pub fn teardown(&mut self) {
        self.set_route(Route::Silent);
        if self.acquired {
            self.backend.close_input();
            self.acquired = false;
        }
    }

    /// Acquire the configured device if needed, then resume
    pub fn ensure_running(&mut self) -> Result<(), DeviceError> {
        if !self.acquired {
            let device_id = self.device_id.clone();
            self.acquire(device_id.as_deref())?;
        }
        self.resume()
    }

    /// Start processing. Does nothing unless suspended.
    pub fn resume(&mut self) -> Result<(), DeviceError> {
        if self.state != SessionState::Suspended {
            return Ok(());
        }
        self.backend.set_running(true)?;
        self.state = SessionState::Running;
        info!("Resume");
        Ok(())
    }

    pub fn suspend(&mut self) {
        if self.state == SessionState::Suspended {
            return;
        }
        if let Err(err) = self.backend.set_running(false) {
            warn!("failed to pause audio streams: {}", err);
        }
        self.state = SessionState::Suspended;
    }

    pub fn set_route(&mut self, route: Route) {
        if self.route != route {
            self.backend.set_route(route);
            self.route = route;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum BackendCall {
        Open(Option<String>),
        Close,
        Running(bool),
        Route(Route),
    }

    /// Backend that records calls and can be told to refuse devices
    #[derive(Default)]
    pub struct FakeBackend {
        pub calls: Vec<BackendCall>,
        pub refuse: Option<DeviceError>,
        pub input_open: bool,
        pub route: Option<Route>,
    }

    impl FakeBackend {
        pub fn routes(&self) -> Vec<Route> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    BackendCall::Route(r) => Some(*r),
                    _ => None,
                })
                .collect()
        }
    }

    impl AudioBackend for FakeBackend {
        fn open_input(&mut self, device_id: Option<&str>) -> Result<(), DeviceError> {
            self.calls.push(BackendCall::Open(device_id.map(str::to_string)));
            if let Some(err) = &self.refuse {
                return Err(err.clone());
            }
            self.input_open = true;
            Ok(())
        }

        fn close_input(&mut self) {
            self.calls.push(BackendCall::Close);
            self.input_open = false;
        }

        fn set_running(&mut self, running: bool) -> Result<(), DeviceError> {
            self.calls.push(BackendCall::Running(running));
            Ok(())
        }

        fn set_route(&mut self, route: Route) {
            // two live paths at once would mean a route was set without passing through Silent
            if let (Some(current), true) = (self.route, route != Route::Silent) {
                assert_eq!(current, Route::Silent, "route {:?} set over {:?}", route, current);
            }
            self.calls.push(BackendCall::Route(route));
            self.route = Some(route);
        }
    }
}
