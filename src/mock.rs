//! Scripted in-memory controller for tests.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use serde_json::json;

use crate::errors::TransportError;
use crate::transport::{EventSink, PushEvent, RawRunState, Transport, TransportResult};
use crate::types::{Brightness, Color};

/// A device-facing call as the controller saw it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Connect,
    Disconnect,
    GetName,
    GetHostname,
    GetFirmwareVersion,
    ListZones,
    ListPatterns,
    GetRunState(Vec<String>),
    TurnOn(Vec<String>),
    TurnOff(Vec<String>),
    ApplyPattern(String, Vec<String>),
    ApplyColor(Color, Brightness, Vec<String>),
}

impl Call {
    fn name(&self) -> &'static str {
        match self {
            Call::Connect => "connect",
            Call::Disconnect => "disconnect",
            Call::GetName => "get_name",
            Call::GetHostname => "get_hostname",
            Call::GetFirmwareVersion => "get_firmware_version",
            Call::ListZones => "list_zones",
            Call::ListPatterns => "list_patterns",
            Call::GetRunState(_) => "get_run_state",
            Call::TurnOn(_) => "turn_on",
            Call::TurnOff(_) => "turn_off",
            Call::ApplyPattern(..) => "apply_pattern",
            Call::ApplyColor(..) => "apply_color",
        }
    }

    pub(crate) fn is_io(&self) -> bool {
        !matches!(self, Call::Connect | Call::Disconnect)
    }
}

struct Device {
    calls: Vec<(&'static str, Call)>,
    name: String,
    hostname: String,
    firmware: String,
    zones: Vec<String>,
    patterns: Vec<String>,
    run_states: HashMap<String, RawRunState>,
    failures: HashMap<&'static str, usize>,
    connect_delay: Option<Duration>,
    call_delay: Option<Duration>,
    sinks: Vec<EventSink>,
}

/// Shared state of one simulated controller; every transport it hands out
/// records into the same call log.
#[derive(Clone)]
pub(crate) struct MockController(Arc<Mutex<Device>>);

impl MockController {
    pub(crate) fn new() -> Self {
        let run_states = HashMap::from([
            (
                "Front".to_string(),
                RawRunState::from_value(json!({"isOn": 1, "runFileName": "Sunset.json"}))
                    .unwrap(),
            ),
            (
                "Back".to_string(),
                RawRunState::from_value(json!({
                    "isOn": 1,
                    "runFileName": "",
                    "effectDescriptor": {"layout": "Color", "channels": [10, 20, 30], "brightness": 50}
                }))
                .unwrap(),
            ),
        ]);
        MockController(Arc::new(Mutex::new(Device {
            calls: Vec::new(),
            name: "Porch".to_string(),
            hostname: "JellyFish-0A1B.local".to_string(),
            firmware: "1.2.3".to_string(),
            zones: vec!["Front".to_string(), "Back".to_string()],
            patterns: ["Sunset.json", "Christmas.json", "Sunset.json", "Aurora.json"]
                .into_iter()
                .map(String::from)
                .collect(),
            run_states,
            failures: HashMap::new(),
            connect_delay: None,
            call_delay: None,
            sinks: Vec::new(),
        })))
    }

    fn device(&self) -> std::sync::MutexGuard<'_, Device> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn transport(&self, session: &'static str) -> Box<dyn Transport> {
        Box::new(MockTransport {
            session,
            device: self.clone(),
            connected: false,
        })
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.device().calls.iter().map(|(_, c)| c.clone()).collect()
    }

    pub(crate) fn calls_on(&self, session: &str) -> Vec<Call> {
        self.device()
            .calls
            .iter()
            .filter(|(s, _)| *s == session)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub(crate) fn clear_calls(&self) {
        self.device().calls.clear();
    }

    /// Fail the next `times` calls of the named operation.
    pub(crate) fn fail_next(&self, operation: &'static str, times: usize) {
        self.device().failures.insert(operation, times);
    }

    /// Make every connect block for `delay`, ignoring its timeout.
    pub(crate) fn stall_connect(&self, delay: Duration) {
        self.device().connect_delay = Some(delay);
    }

    /// Make every non-connect call block for `delay`.
    pub(crate) fn slow_calls(&self, delay: Duration) {
        self.device().call_delay = Some(delay);
    }

    pub(crate) fn set_run_state(&self, zone: &str, raw: RawRunState) {
        self.device().run_states.insert(zone.to_string(), raw);
    }

    pub(crate) fn set_zones(&self, zones: &[&str]) {
        self.device().zones = zones.iter().map(|z| z.to_string()).collect();
    }

    /// Deliver a push event from a foreign thread, like a real transport would.
    pub(crate) fn push(&self, event: PushEvent) {
        let sinks = self.device().sinks.clone();
        thread::spawn(move || {
            for sink in sinks {
                sink.send(event.clone());
            }
        })
        .join()
        .unwrap();
    }

    fn record(&self, session: &'static str, call: Call) -> TransportResult<()> {
        let (delay, fail) = {
            let mut device = self.device();
            let name = call.name();
            let delay = match call {
                Call::Connect => device.connect_delay,
                Call::Disconnect => None,
                _ => device.call_delay,
            };
            device.calls.push((session, call));
            let fail = match device.failures.get_mut(name) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            (delay, fail)
        };
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        if fail {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by controller",
            )));
        }
        Ok(())
    }
}

struct MockTransport {
    session: &'static str,
    device: MockController,
    connected: bool,
}

impl MockTransport {
    fn call(&mut self, call: Call) -> TransportResult<()> {
        if call.is_io() && !self.connected {
            self.device.record(self.session, call)?;
            return Err(TransportError::NotConnected);
        }
        self.device.record(self.session, call)
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, _timeout: Duration) -> TransportResult<()> {
        self.call(Call::Connect)?;
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self, _timeout: Duration) -> TransportResult<()> {
        self.connected = false;
        self.call(Call::Disconnect)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn get_name(&mut self) -> TransportResult<String> {
        self.call(Call::GetName)?;
        Ok(self.device.device().name.clone())
    }

    fn get_hostname(&mut self) -> TransportResult<String> {
        self.call(Call::GetHostname)?;
        Ok(self.device.device().hostname.clone())
    }

    fn get_firmware_version(&mut self) -> TransportResult<String> {
        self.call(Call::GetFirmwareVersion)?;
        Ok(self.device.device().firmware.clone())
    }

    fn list_zone_names(&mut self) -> TransportResult<Vec<String>> {
        self.call(Call::ListZones)?;
        Ok(self.device.device().zones.clone())
    }

    fn list_pattern_names(&mut self) -> TransportResult<Vec<String>> {
        self.call(Call::ListPatterns)?;
        Ok(self.device.device().patterns.clone())
    }

    fn get_run_state(&mut self, zones: &[String]) -> TransportResult<HashMap<String, RawRunState>> {
        self.call(Call::GetRunState(zones.to_vec()))?;
        let device = self.device.device();
        Ok(zones
            .iter()
            .filter_map(|z| device.run_states.get(z).map(|s| (z.clone(), s.clone())))
            .collect())
    }

    fn turn_on(&mut self, zones: &[String]) -> TransportResult<()> {
        self.call(Call::TurnOn(zones.to_vec()))
    }

    fn turn_off(&mut self, zones: &[String]) -> TransportResult<()> {
        self.call(Call::TurnOff(zones.to_vec()))
    }

    fn apply_pattern(&mut self, pattern: &str, zones: &[String]) -> TransportResult<()> {
        self.call(Call::ApplyPattern(pattern.to_string(), zones.to_vec()))
    }

    fn apply_color(
        &mut self,
        color: Color,
        brightness: Brightness,
        zones: &[String],
    ) -> TransportResult<()> {
        self.call(Call::ApplyColor(color, brightness, zones.to_vec()))
    }

    fn subscribe(&mut self, sink: EventSink) {
        self.device.device().sinks.push(sink);
    }
}
