//! Drive a JellyFish client against an in-memory controller.
//!
//! The simulated controller keeps zones, a pattern library and per-zone run
//! state in memory, can be made flaky to watch the client heal itself, and
//! pushes a state change now and then while `watch` runs.
//!
//! Run with: cargo run --example simulated_controller -- --help

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use jellyfish_lighting_rs::{
    Brightness, Client, ClientConfig, Color, EventSink, PushEvent, RawRunState, Transport,
    TransportError, TransportResult, Zones, runtime,
};
use serde_json::json;

#[derive(Parser)]
#[command(name = "jellyfish-sim")]
#[command(about = "Exercise the JellyFish client against a simulated controller", long_about = None)]
struct Cli {
    /// Zones to target; every known zone when omitted
    #[arg(short, long, global = true)]
    zone: Vec<String>,

    /// Fail every Nth device call to exercise reconnects
    #[arg(long, global = true)]
    fail_every: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh and print the cached state
    Status,

    /// List the pattern library
    Patterns,

    /// Turn zones on
    On,

    /// Turn zones off
    Off,

    /// Run a pattern file
    Pattern {
        /// Pattern name, e.g. "Christmas/Candy Cane.json"
        name: String,
    },

    /// Show a solid color
    Color {
        red: u8,
        green: u8,
        blue: u8,
        /// Brightness (0-100)
        #[arg(short, long, default_value = "100", value_parser = clap::value_parser!(u8).range(0..=100))]
        brightness: u8,
    },

    /// Print push notifications as they arrive
    Watch {
        /// How long to watch, in seconds
        #[arg(short, long, default_value = "5")]
        seconds: u64,
    },

    /// Print client diagnostics
    Diagnostics,
}

struct Device {
    zones: Vec<String>,
    patterns: Vec<String>,
    run_states: HashMap<String, RawRunState>,
    calls: usize,
    fail_every: Option<usize>,
    sink: Option<EventSink>,
}

/// A controller living entirely in this process.
#[derive(Clone)]
struct SimulatedController(Arc<Mutex<Device>>);

impl SimulatedController {
    fn new(fail_every: Option<usize>) -> Self {
        let run_states = ["Front", "Back", "Garage"]
            .into_iter()
            .map(|zone| (zone.to_string(), RawRunState::default()))
            .collect();
        SimulatedController(Arc::new(Mutex::new(Device {
            zones: vec!["Front".into(), "Back".into(), "Garage".into()],
            patterns: vec![
                "Christmas/Candy Cane.json".into(),
                "Accent/Sunset.json".into(),
                "Christmas/Candy Cane.json".into(),
                "Halloween/Pumpkin.json".into(),
            ],
            run_states,
            calls: 0,
            fail_every,
            sink: None,
        })))
    }

    fn device(&self) -> std::sync::MutexGuard<'_, Device> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Push a pattern change on a background thread, like real firmware would.
    fn start_pushing(&self, every: Duration) {
        let controller = self.clone();
        thread::spawn(move || {
            let patterns = controller.device().patterns.clone();
            for pattern in patterns.iter().cycle() {
                thread::sleep(every);
                let (sink, zone) = {
                    let mut device = controller.device();
                    let zone = device.zones[0].clone();
                    let raw = pattern_state(pattern);
                    device.run_states.insert(zone.clone(), raw);
                    (device.sink.clone(), zone)
                };
                let Some(sink) = sink else { return };
                // No payload: the client reads the zone back itself.
                let sent = sink.send(PushEvent::ZoneStatesChanged(HashMap::from([(zone, None)])));
                if !sent {
                    return;
                }
            }
        });
    }
}

fn pattern_state(pattern: &str) -> RawRunState {
    RawRunState::from_value(json!({"isOn": 1, "runFileName": pattern}))
        .unwrap_or_default()
}

fn color_state(color: Color, brightness: Brightness) -> RawRunState {
    RawRunState::from_value(json!({
        "isOn": 1,
        "runFileName": "",
        "effectDescriptor": {
            "layout": "Color",
            "channels": color.channels(),
            "brightness": brightness.value(),
        }
    }))
    .unwrap_or_default()
}

struct SimulatedTransport {
    controller: SimulatedController,
    connected: bool,
}

impl SimulatedTransport {
    fn call<T>(&mut self, f: impl FnOnce(&mut Device) -> T) -> TransportResult<T> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let mut device = self.controller.device();
        device.calls += 1;
        if let Some(n) = device.fail_every {
            if n > 0 && device.calls % n == 0 {
                self.connected = false;
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "simulated link drop",
                )));
            }
        }
        Ok(f(&mut device))
    }

    fn set_states(&mut self, zones: &[String], raw: RawRunState) -> TransportResult<()> {
        self.call(|device| {
            for zone in zones {
                device.run_states.insert(zone.clone(), raw.clone());
            }
        })
    }
}

impl Transport for SimulatedTransport {
    fn connect(&mut self, _timeout: Duration) -> TransportResult<()> {
        thread::sleep(Duration::from_millis(20));
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self, _timeout: Duration) -> TransportResult<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn get_name(&mut self) -> TransportResult<String> {
        self.call(|_| "Simulated".to_string())
    }

    fn get_hostname(&mut self) -> TransportResult<String> {
        self.call(|_| "JellyFish-SIM.local".to_string())
    }

    fn get_firmware_version(&mut self) -> TransportResult<String> {
        self.call(|_| "0.0.1-sim".to_string())
    }

    fn list_zone_names(&mut self) -> TransportResult<Vec<String>> {
        self.call(|device| device.zones.clone())
    }

    fn list_pattern_names(&mut self) -> TransportResult<Vec<String>> {
        self.call(|device| device.patterns.clone())
    }

    fn get_run_state(&mut self, zones: &[String]) -> TransportResult<HashMap<String, RawRunState>> {
        self.call(|device| {
            zones
                .iter()
                .filter_map(|z| device.run_states.get(z).map(|s| (z.clone(), s.clone())))
                .collect()
        })
    }

    fn turn_on(&mut self, zones: &[String]) -> TransportResult<()> {
        self.call(|device| {
            for zone in zones {
                if let Some(state) = device.run_states.get_mut(zone) {
                    state.is_on = true.into();
                }
            }
        })
    }

    fn turn_off(&mut self, zones: &[String]) -> TransportResult<()> {
        self.set_states(zones, RawRunState::default())
    }

    fn apply_pattern(&mut self, pattern: &str, zones: &[String]) -> TransportResult<()> {
        let known = self.call(|device| device.patterns.iter().any(|p| p == pattern))?;
        if !known {
            return Err(TransportError::protocol(&format!("no pattern named {}", pattern)));
        }
        self.set_states(zones, pattern_state(pattern))
    }

    fn apply_color(
        &mut self,
        color: Color,
        brightness: Brightness,
        zones: &[String],
    ) -> TransportResult<()> {
        self.set_states(zones, color_state(color, brightness))
    }

    fn subscribe(&mut self, sink: EventSink) {
        self.controller.device().sink = Some(sink);
    }
}

fn print_state(client: &Client) {
    let state = client.get_cached_state();
    println!("\n{} (firmware {})", state.info.title(), state.info.firmware_version);
    for (zone, zone_state) in &state.states {
        let what = match (zone_state.effect(), zone_state.color()) {
            (Some(effect), _) => format!("pattern {}", effect),
            (None, Some(color)) => format!("color {}", color),
            (None, None) => "nothing".to_string(),
        };
        let brightness = zone_state
            .brightness()
            .map(|b| format!(" at {}%", b.value()))
            .unwrap_or_default();
        println!(
            "  {:8} {:3}  {}{}",
            zone,
            if zone_state.is_on() { "ON" } else { "OFF" },
            what,
            brightness
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let controller = SimulatedController::new(cli.fail_every);
    let transport = Box::new(SimulatedTransport {
        controller: controller.clone(),
        connected: false,
    });
    let client = Client::new("simulated.local", transport, ClientConfig::default());
    let zones = if cli.zone.is_empty() {
        Zones::All
    } else {
        Zones::from(cli.zone)
    };

    // Like a scheduled poller: one failed cycle is retried on the next.
    if let Err(e) = client.refresh_all().await {
        eprintln!("Refresh failed, retrying once: {}", e);
        client.refresh_all().await?;
    }

    let result = match cli.command {
        Commands::Status => Ok(()),
        Commands::Patterns => {
            for pattern in client.get_cached_state().patterns {
                println!("{}", pattern);
            }
            Ok(())
        }
        Commands::On => client.turn_on(zones).await,
        Commands::Off => client.turn_off(zones).await,
        Commands::Pattern { name } => client.apply_pattern(&name, zones).await,
        Commands::Color {
            red,
            green,
            blue,
            brightness,
        } => {
            let brightness = Brightness::create_or(brightness);
            client
                .apply_color(Color::rgb(red, green, blue), brightness, zones)
                .await
        }
        Commands::Watch { seconds } => {
            client.register_listener(|notification| {
                println!(
                    "[{}] zones {:?}",
                    notification.kind, notification.zones
                );
            });
            controller.start_pushing(Duration::from_millis(700));
            runtime::sleep(Duration::from_secs(seconds)).await;
            Ok(())
        }
        Commands::Diagnostics => {
            println!("{}", serde_json::to_string_pretty(&client.diagnostics())?);
            Ok(())
        }
    };

    match result {
        Ok(()) => print_state(&client),
        Err(e) => eprintln!("Error: {}", e),
    }
    client.shutdown().await?;
    Ok(())
}
