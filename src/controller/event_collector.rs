use super::HostEvent;
use crate::device::InputId;
use gilrs::{Event, EventType, Gamepad, GamepadId, Gilrs};
use statum::{machine, state};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

// Collector settings
#[derive(Clone, Debug)]
pub struct CollectorSettings {
    /// Axis moves smaller than this are dropped
    pub axis_epsilon: f32,
    pub idle_sleep: std::time::Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            axis_epsilon: 0.002,
            idle_sleep: std::time::Duration::from_millis(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("Failed to send event: {0}")]
    EventSendError(String),

    #[error("Input channel closed")]
    ChannelClosed,
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
pub struct EventCollector<S: CollectionState> {
    gilrs: Gilrs,
    settings: CollectorSettings,
    event_sender: mpsc::Sender<HostEvent>,
    filter: AxisFilter,
    // Trimmed gamepad names, looked up once per device
    names: HashMap<GamepadId, String>,
}

impl<S: CollectionState> EventCollector<S> {
    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }
}

impl EventCollector<Initializing> {
    pub fn create(
        settings: CollectorSettings,
        event_sender: mpsc::Sender<HostEvent>,
    ) -> Result<Self, CollectorError> {
        debug!("Creating Event Collector with settings: {:?}", settings);

        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => g,
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(CollectorError::InitializationError(e.to_string()));
            }
        };

        let filter = AxisFilter::new(settings.axis_epsilon);
        Ok(Self::new(gilrs, settings, event_sender, filter, HashMap::new()))
    }

    /// Lists attached devices, reports their current switch positions and
    /// starts collecting from all of them
    pub fn initialize(mut self) -> EventCollector<Collecting> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if gamepads.is_empty() {
            warn!("No input devices connected, waiting for hotplug");
        } else {
            info!("Found {} input devices:", gamepads.len());
            for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
                info!(
                    "  [{}] ID: {}, Name: {}, UUID: {:?}",
                    idx,
                    id,
                    gamepad.name(),
                    gamepad.uuid()
                );
            }
        }

        let names: Vec<(GamepadId, String)> = gamepads
            .iter()
            .map(|(id, gamepad)| (*id, gamepad.name().trim().to_string()))
            .collect();

        // gilrs only reports changes; latched switches need their position up front
        let seeds: Vec<HostEvent> = gamepads
            .iter()
            .flat_map(|(_, gamepad)| {
                let buttons = gamepad
                    .state()
                    .buttons()
                    .map(|(code, data)| (code.into_u32(), data.is_pressed()));
                seed_events(gamepad.name(), buttons)
            })
            .collect();
        drop(gamepads);

        debug!("Seeding {} button positions", seeds.len());
        for event in seeds {
            if let Err(e) = self.event_sender.try_send(event) {
                warn!("Could not seed button position: {}", e);
            }
        }

        self.names.extend(names);

        info!("Event Collector initialized, transitioning to Collecting state");
        self.transition()
    }
}

impl EventCollector<Collecting> {
    /// Forwards at most one pending device event. `Ok(false)` when idle.
    pub fn collect_next_event(&mut self) -> Result<bool, CollectorError> {
        let Some(Event { id, event, .. }) = self.gilrs.next_event() else {
            return Ok(false);
        };

        let Some(host_event) = self.convert_gilrs_event(id, event) else {
            return Ok(true);
        };

        match self.event_sender.try_send(host_event) {
            Ok(_) => Ok(true),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(CollectorError::ChannelClosed),
            Err(e) => Err(CollectorError::EventSendError(e.to_string())),
        }
    }

    /// Blocks the calling thread until the receiving side goes away
    pub fn run_collection_loop(&mut self) {
        info!("Starting Event Collector loop");

        loop {
            match self.collect_next_event() {
                Ok(true) => {}
                Ok(false) => std::thread::sleep(self.settings.idle_sleep),
                Err(CollectorError::ChannelClosed) => {
                    info!("Input channel closed, stopping Event Collector");
                    return;
                }
                Err(e) => warn!("Dropped input event: {}", e),
            }
        }
    }

    fn device_name(&mut self, id: GamepadId) -> String {
        let gilrs = &self.gilrs;
        self.names
            .entry(id)
            .or_insert_with(|| gilrs.gamepad(id).name().trim().to_string())
            .clone()
    }

    fn convert_gilrs_event(&mut self, id: GamepadId, event: EventType) -> Option<HostEvent> {
        match event {
            EventType::AxisChanged(_, value, code) => {
                let input = InputId::for_device(&self.device_name(id), code.into_u32());
                if !self.filter.accept(&input, value) {
                    return None;
                }
                Some(HostEvent::Axis {
                    input,
                    value: f64::from(value),
                })
            }
            EventType::ButtonPressed(_, code) => {
                let input = InputId::for_device(&self.device_name(id), code.into_u32());
                info!("Button pressed: {}", input);
                Some(HostEvent::Button {
                    input,
                    pressed: true,
                })
            }
            EventType::ButtonReleased(_, code) => {
                let input = InputId::for_device(&self.device_name(id), code.into_u32());
                info!("Button released: {}", input);
                Some(HostEvent::Button {
                    input,
                    pressed: false,
                })
            }
            EventType::Connected => {
                let name = self.gilrs.gamepad(id).name().trim().to_string();
                info!("Device connected: {}", name);
                self.names.insert(id, name);
                None
            }
            EventType::Disconnected => {
                warn!("Device disconnected: {:?}", self.names.get(&id));
                None
            }
            _ => {
                debug!("Unhandled event type: {:?}", event);
                None
            }
        }
    }
}

/// One button event per known button, carrying its current position
pub fn seed_events(
    device: &str,
    buttons: impl IntoIterator<Item = (u32, bool)>,
) -> Vec<HostEvent> {
    buttons
        .into_iter()
        .map(|(code, pressed)| HostEvent::Button {
            input: InputId::for_device(device, code),
            pressed,
        })
        .collect()
}

/// Drops axis reports that moved less than `epsilon` since the last one sent
#[derive(Debug, Clone)]
pub struct AxisFilter {
    epsilon: f32,
    last: HashMap<InputId, f32>,
}

impl AxisFilter {
    pub fn new(epsilon: f32) -> Self {
        Self {
            epsilon,
            last: HashMap::new(),
        }
    }

    pub fn accept(&mut self, input: &InputId, value: f32) -> bool {
        match self.last.get(input) {
            // End stops always pass so full deflection is never lost
            Some(previous)
                if (value - previous).abs() < self.epsilon && value.abs() < 1.0 =>
            {
                false
            }
            _ => {
                self.last.insert(input.clone(), value);
                true
            }
        }
    }
}

/// Runs the collector on its own OS thread
pub struct CollectorHandle {
    // The thread ends by itself once the event receiver is dropped
    _thread: std::thread::JoinHandle<()>,
}

impl CollectorHandle {
    /// Starts the collector thread once gilrs came up
    pub async fn spawn(
        settings: CollectorSettings,
        event_sender: mpsc::Sender<HostEvent>,
    ) -> Result<Self, CollectorError> {
        info!("Spawning Event Collector with settings: {:?}", settings);
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name("input-collector".to_string())
            .spawn(move || {
                // gilrs stays on this thread for its whole life
                let collector = match EventCollector::create(settings, event_sender) {
                    Ok(collector) => {
                        let _ = ready_tx.send(Ok(()));
                        collector
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                collector.initialize().run_collection_loop();
            })
            .map_err(|e| CollectorError::InitializationError(e.to_string()))?;

        ready_rx.await.map_err(|_| {
            CollectorError::InitializationError("collector thread exited early".to_string())
        })??;

        info!("Event Collector successfully started");
        Ok(Self { _thread: thread })
    }
}
