//! In-memory Velbus bus

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ha_components::velbus::{
    ScanCallback, StatusListener, VelbusConnector, VelbusController, VelbusError, VelbusModule,
};

struct MockChannel {
    name: String,
    categories: Vec<String>,
    on: bool,
    closed: bool,
    sensor: Option<(f64, String)>,
    position: Option<u8>,
    temperatures: (Option<f64>, Option<f64>),
}

/// A module whose channel values are set by the test
pub struct MockModule {
    address: u8,
    serial: u32,
    module_name: String,
    channels: Mutex<HashMap<u8, MockChannel>>,
    listeners: Mutex<HashMap<u8, Vec<StatusListener>>>,
}

impl MockModule {
    pub fn new(address: u8, serial: u32, module_name: &str) -> Self {
        Self {
            address,
            serial,
            module_name: module_name.to_string(),
            channels: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Declare a channel exposed on the given categories
    pub fn channel(self, channel: u8, name: &str, categories: &[&str]) -> Self {
        self.channels.lock().unwrap().insert(
            channel,
            MockChannel {
                name: name.to_string(),
                categories: categories.iter().map(|c| c.to_string()).collect(),
                on: false,
                closed: false,
                sensor: None,
                position: None,
                temperatures: (None, None),
            },
        );
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn with_channel<R>(&self, channel: u8, f: impl FnOnce(&mut MockChannel) -> R) -> Option<R> {
        self.channels.lock().unwrap().get_mut(&channel).map(f)
    }

    pub fn set_on(&self, channel: u8, on: bool) {
        self.with_channel(channel, |c| c.on = on);
    }

    pub fn set_closed(&self, channel: u8, closed: bool) {
        self.with_channel(channel, |c| c.closed = closed);
    }

    pub fn set_sensor(&self, channel: u8, value: f64, unit: &str) {
        self.with_channel(channel, |c| c.sensor = Some((value, unit.to_string())));
    }

    pub fn set_position(&self, channel: u8, position: u8) {
        self.with_channel(channel, |c| c.position = Some(position));
    }

    pub fn set_temperatures(&self, channel: u8, current: f64, target: f64) {
        self.with_channel(channel, |c| c.temperatures = (Some(current), Some(target)));
    }

    pub fn rename(&self, channel: u8, name: &str) {
        self.with_channel(channel, |c| c.name = name.to_string());
    }

    /// Report a status change of `channel` to its listeners
    pub fn notify(&self, channel: u8) {
        let listeners = self.listeners.lock().unwrap();
        for listener in listeners.get(&channel).into_iter().flatten() {
            listener();
        }
    }

    pub fn listener_count(&self, channel: u8) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .get(&channel)
            .map_or(0, Vec::len)
    }
}

impl VelbusModule for MockModule {
    fn address(&self) -> u8 {
        self.address
    }

    fn serial(&self) -> u32 {
        self.serial
    }

    fn number_of_channels(&self) -> u8 {
        self.channels
            .lock()
            .unwrap()
            .keys()
            .copied()
            .max()
            .unwrap_or(0)
    }

    fn categories(&self, channel: u8) -> Vec<String> {
        self.with_channel(channel, |c| c.categories.clone())
            .unwrap_or_default()
    }

    fn name(&self, channel: u8) -> String {
        self.with_channel(channel, |c| c.name.clone())
            .unwrap_or_default()
    }

    fn module_name(&self) -> String {
        self.module_name.clone()
    }

    fn memory_map_version(&self) -> u32 {
        1
    }

    fn build_year(&self) -> u32 {
        19
    }

    fn build_week(&self) -> u32 {
        42
    }

    fn on_status_update(&self, channel: u8, listener: StatusListener) {
        self.listeners
            .lock()
            .unwrap()
            .entry(channel)
            .or_default()
            .push(listener);
    }

    fn is_on(&self, channel: u8) -> bool {
        self.with_channel(channel, |c| c.on).unwrap_or(false)
    }

    fn is_closed(&self, channel: u8) -> bool {
        self.with_channel(channel, |c| c.closed).unwrap_or(false)
    }

    fn sensor_value(&self, channel: u8) -> Option<f64> {
        self.with_channel(channel, |c| c.sensor.as_ref().map(|s| s.0))
            .flatten()
    }

    fn sensor_unit(&self, channel: u8) -> Option<String> {
        self.with_channel(channel, |c| c.sensor.as_ref().map(|s| s.1.clone()))
            .flatten()
    }

    fn cover_position(&self, channel: u8) -> Option<u8> {
        self.with_channel(channel, |c| c.position).flatten()
    }

    fn current_temperature(&self, channel: u8) -> Option<f64> {
        self.with_channel(channel, |c| c.temperatures.0).flatten()
    }

    fn target_temperature(&self, channel: u8) -> Option<f64> {
        self.with_channel(channel, |c| c.temperatures.1).flatten()
    }
}

type StopHook = Box<dyn Fn() + Send + Sync>;

/// A bus connection serving a fixed set of modules
pub struct MockController {
    modules: Vec<Arc<dyn VelbusModule>>,
    scan_error: Mutex<Option<VelbusError>>,
    sync_error: Mutex<Option<VelbusError>>,
    defer_scan: AtomicBool,
    pending_scan: Mutex<Option<ScanCallback>>,
    sync_calls: AtomicUsize,
    stopped: AtomicBool,
    stop_hook: Mutex<Option<StopHook>>,
}

impl MockController {
    pub fn new(modules: Vec<Arc<dyn VelbusModule>>) -> Arc<Self> {
        Arc::new(Self {
            modules,
            scan_error: Mutex::new(None),
            sync_error: Mutex::new(None),
            defer_scan: AtomicBool::new(false),
            pending_scan: Mutex::new(None),
            sync_calls: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            stop_hook: Mutex::new(None),
        })
    }

    pub fn fail_scan(&self, error: VelbusError) {
        *self.scan_error.lock().unwrap() = Some(error);
    }

    pub fn fail_sync_clock(&self, error: VelbusError) {
        *self.sync_error.lock().unwrap() = Some(error);
    }

    /// Hold scan callbacks until [`complete_scan`](Self::complete_scan)
    pub fn defer_scan(&self) {
        self.defer_scan.store(true, Ordering::SeqCst);
    }

    /// Run the held scan callback, returning false if there was none
    pub fn complete_scan(&self) -> bool {
        let callback = self.pending_scan.lock().unwrap().take();
        match callback {
            Some(callback) => {
                callback(self.modules.clone());
                true
            }
            None => false,
        }
    }

    pub fn on_stop(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.stop_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VelbusController for MockController {
    fn scan(&self, callback: ScanCallback) -> Result<(), VelbusError> {
        if let Some(error) = self.scan_error.lock().unwrap().clone() {
            return Err(error);
        }
        if self.defer_scan.load(Ordering::SeqCst) {
            *self.pending_scan.lock().unwrap() = Some(callback);
        } else {
            callback(self.modules.clone());
        }
        Ok(())
    }

    async fn sync_clock(&self) -> Result<(), VelbusError> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        let error = self.sync_error.lock().unwrap().clone();
        match error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn stop(&self) {
        if let Some(hook) = self.stop_hook.lock().unwrap().as_ref() {
            hook();
        }
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Connects every port to the same controller
pub struct MockConnector {
    controller: Arc<MockController>,
    fail: AtomicBool,
    ports: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(controller: Arc<MockController>) -> Arc<Self> {
        Arc::new(Self {
            controller,
            fail: AtomicBool::new(false),
            ports: Mutex::new(Vec::new()),
        })
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Ports connection attempts were made to
    pub fn ports(&self) -> Vec<String> {
        self.ports.lock().unwrap().clone()
    }
}

#[async_trait]
impl VelbusConnector for MockConnector {
    async fn connect(&self, port: &str) -> Result<Arc<dyn VelbusController>, VelbusError> {
        self.ports.lock().unwrap().push(port.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(VelbusError::Connection(format!("cannot open {}", port)));
        }
        Ok(self.controller.clone())
    }
}
