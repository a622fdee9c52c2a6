//! In-memory daemon used by unit tests
//!
//! `FakeBus` answers every request from a shared `FakeState` that tests poke at
//! directly. Scripted inquiry signals are delivered from a separate thread, like a
//! real bus dispatch thread would.

use crate::bus::{
    AdapterPath, AdapterSignal, Bus, BusError, HandlerId, SessionHandle, SignalHandler,
    SignalKind,
};
use crate::sdp::ServiceRecordHandle;
use crate::{AdapterSession, HostOptions};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

pub(crate) const HCI0: &str = "/org/bluez/hci0";
pub(crate) const HCI0_ADDRESS: &str = "00:11:22:33:44:55";

/// Called on each remote record fetch, outside the state lock
pub(crate) type FetchHook = Arc<dyn Fn(ServiceRecordHandle) + Send + Sync>;

/// Services one remote device publishes
#[derive(Default)]
pub(crate) struct RemoteServices {
    pub handles: Vec<ServiceRecordHandle>,
    pub records: HashMap<ServiceRecordHandle, Vec<u8>>,
}

pub(crate) struct FakeState {
    pub adapters: Vec<(AdapterPath, String)>,
    pub default_adapter: Option<usize>,
    pub disconnected: bool,
    pub disconnect_calls: usize,

    pub name: Result<String, BusError>,
    pub major_class: String,
    pub minor_class: String,
    pub service_classes: Vec<String>,
    pub mode: String,
    pub reject_mode: bool,
    pub mode_changes: Vec<String>,
    pub discoverable: bool,
    pub discoverable_timeout: u32,
    pub version: String,
    pub revision: String,
    pub manufacturer: String,

    pub bondings: Vec<String>,
    pub trusts: Vec<String>,
    pub connected: Vec<String>,
    pub fail_bonding: bool,
    pub bonding_requests: Vec<String>,

    pub handlers: Vec<(HandlerId, SignalKind, SignalHandler)>,
    pub fail_subscribe: Option<SignalKind>,
    pub fail_discover: bool,
    pub inquiry_script: Vec<AdapterSignal>,
    pub complete_on_cancel: bool,
    pub discover_calls: usize,
    pub cancel_calls: usize,

    pub remotes: HashMap<String, RemoteServices>,
    pub handles_error: Option<BusError>,
    pub failing_records: Vec<ServiceRecordHandle>,
    pub handle_patterns: Vec<String>,
    pub record_fetches: usize,
    pub on_record_fetch: Option<FetchHook>,

    pub open_sessions: usize,
    pub open_calls: usize,
    pub close_calls: usize,
    pub next_session: SessionHandle,
    pub next_record: ServiceRecordHandle,
    pub published: BTreeMap<ServiceRecordHandle, Vec<u8>>,
    pub fail_open: bool,
    pub fail_register: bool,
    pub fail_update: bool,
    pub fail_unregister: bool,
    pub fail_close: bool,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            adapters: vec![(AdapterPath::new(HCI0), HCI0_ADDRESS.to_owned())],
            default_adapter: Some(0),
            disconnected: false,
            disconnect_calls: 0,
            name: Ok("bondybus".to_owned()),
            major_class: "computer".to_owned(),
            minor_class: "laptop".to_owned(),
            service_classes: Vec::new(),
            mode: "connectable".to_owned(),
            reject_mode: false,
            mode_changes: Vec::new(),
            discoverable: false,
            discoverable_timeout: 0,
            version: "Bluetooth 2.0".to_owned(),
            revision: "HCI 0x1f".to_owned(),
            manufacturer: "Cambridge Silicon Radio".to_owned(),
            bondings: Vec::new(),
            trusts: Vec::new(),
            connected: Vec::new(),
            fail_bonding: false,
            bonding_requests: Vec::new(),
            handlers: Vec::new(),
            fail_subscribe: None,
            fail_discover: false,
            inquiry_script: Vec::new(),
            complete_on_cancel: true,
            discover_calls: 0,
            cancel_calls: 0,
            remotes: HashMap::new(),
            handles_error: None,
            failing_records: Vec::new(),
            handle_patterns: Vec::new(),
            record_fetches: 0,
            on_record_fetch: None,
            open_sessions: 0,
            open_calls: 0,
            close_calls: 0,
            next_session: 1,
            next_record: 0x0001_0000,
            published: BTreeMap::new(),
            fail_open: false,
            fail_register: false,
            fail_update: false,
            fail_unregister: false,
            fail_close: false,
        }
    }
}

struct Inner {
    state: Mutex<FakeState>,
    next_handler: AtomicU64,
}

#[derive(Clone)]
pub(crate) struct FakeBus {
    inner: Arc<Inner>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(FakeState::default()),
                next_handler: AtomicU64::new(1),
            }),
        }
    }

    pub fn into_bus(self) -> Arc<dyn Bus> {
        Arc::new(self)
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Open an adapter session on the default adapter
    pub fn open_session(&self) -> Arc<AdapterSession> {
        Arc::new(
            AdapterSession::open(self.clone().into_bus(), HostOptions::default())
                .expect("fake default adapter opens"),
        )
    }

    pub fn default_path(&self) -> AdapterPath {
        AdapterPath::new(HCI0)
    }

    pub fn handler_count(&self) -> usize {
        self.state().handlers.len()
    }

    pub fn fail_subscribe_on(&self, kind: SignalKind) {
        self.state().fail_subscribe = Some(kind);
    }

    pub fn script_inquiry(&self, signals: Vec<AdapterSignal>) {
        self.state().inquiry_script = signals;
    }

    pub fn add_remote_record(&self, address: &str, handle: ServiceRecordHandle, bytes: Vec<u8>) {
        let mut state = self.state();
        let remote = state.remotes.entry(address.to_owned()).or_default();
        remote.handles.push(handle);
        remote.records.insert(handle, bytes);
    }

    /// Deliver a signal to every matching handler on the calling thread
    pub fn emit(&self, signal: &AdapterSignal) {
        let handlers: Vec<SignalHandler> = self
            .state()
            .handlers
            .iter()
            .filter(|(_, kind, _)| *kind == signal.kind())
            .map(|(_, _, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(signal);
        }
    }

    fn check_connected(&self) -> Result<(), BusError> {
        if self.state().disconnected {
            Err(BusError::Disconnected("fake bus is down".into()))
        } else {
            Ok(())
        }
    }
}

impl Bus for FakeBus {
    fn find_adapter(&self, pattern: &str) -> Result<AdapterPath, BusError> {
        self.check_connected()?;
        let state = self.state();
        state
            .adapters
            .iter()
            .find(|(path, address)| {
                path.device_id() == Some(pattern) || address.eq_ignore_ascii_case(pattern)
            })
            .map(|(path, _)| path.clone())
            .ok_or_else(|| BusError::NoSuchAdapter(pattern.to_owned()))
    }

    fn list_adapters(&self) -> Result<Vec<AdapterPath>, BusError> {
        self.check_connected()?;
        Ok(self.state().adapters.iter().map(|(p, _)| p.clone()).collect())
    }

    fn default_adapter(&self) -> Result<AdapterPath, BusError> {
        self.check_connected()?;
        let state = self.state();
        state
            .default_adapter
            .and_then(|index| state.adapters.get(index))
            .map(|(path, _)| path.clone())
            .ok_or_else(|| BusError::NoSuchAdapter("default".into()))
    }

    fn address(&self, adapter: &AdapterPath) -> Result<String, BusError> {
        self.check_connected()?;
        self.state()
            .adapters
            .iter()
            .find(|(path, _)| path == adapter)
            .map(|(_, address)| address.clone())
            .ok_or_else(|| BusError::NoSuchAdapter(adapter.to_string()))
    }

    fn name(&self, _adapter: &AdapterPath) -> Result<String, BusError> {
        self.state().name.clone()
    }

    fn major_class(&self, _adapter: &AdapterPath) -> Result<String, BusError> {
        Ok(self.state().major_class.clone())
    }

    fn minor_class(&self, _adapter: &AdapterPath) -> Result<String, BusError> {
        Ok(self.state().minor_class.clone())
    }

    fn service_classes(&self, _adapter: &AdapterPath) -> Result<Vec<String>, BusError> {
        Ok(self.state().service_classes.clone())
    }

    fn mode(&self, _adapter: &AdapterPath) -> Result<String, BusError> {
        Ok(self.state().mode.clone())
    }

    fn set_mode(&self, _adapter: &AdapterPath, mode: &str) -> Result<(), BusError> {
        let mut state = self.state();
        if state.reject_mode {
            return Err(BusError::Failed("mode change rejected".into()));
        }
        state.mode = mode.to_owned();
        state.mode_changes.push(mode.to_owned());
        Ok(())
    }

    fn is_discoverable(&self, _adapter: &AdapterPath) -> Result<bool, BusError> {
        Ok(self.state().discoverable)
    }

    fn discoverable_timeout(&self, _adapter: &AdapterPath) -> Result<u32, BusError> {
        Ok(self.state().discoverable_timeout)
    }

    fn version(&self, _adapter: &AdapterPath) -> Result<String, BusError> {
        Ok(self.state().version.clone())
    }

    fn revision(&self, _adapter: &AdapterPath) -> Result<String, BusError> {
        Ok(self.state().revision.clone())
    }

    fn manufacturer(&self, _adapter: &AdapterPath) -> Result<String, BusError> {
        Ok(self.state().manufacturer.clone())
    }

    fn create_bonding(&self, _adapter: &AdapterPath, address: &str) -> Result<(), BusError> {
        let mut state = self.state();
        state.bonding_requests.push(address.to_owned());
        if state.fail_bonding {
            return Err(BusError::Failed("authentication failed".into()));
        }
        state.bondings.push(address.to_owned());
        Ok(())
    }

    fn remove_bonding(&self, _adapter: &AdapterPath, address: &str) -> Result<(), BusError> {
        let mut state = self.state();
        let before = state.bondings.len();
        state.bondings.retain(|bonded| bonded != address);
        if state.fail_bonding || state.bondings.len() == before {
            return Err(BusError::Failed("bonding does not exist".into()));
        }
        Ok(())
    }

    fn has_bonding(&self, _adapter: &AdapterPath, address: &str) -> Result<bool, BusError> {
        Ok(self.state().bondings.iter().any(|bonded| bonded == address))
    }

    fn is_connected(&self, _adapter: &AdapterPath, address: &str) -> Result<bool, BusError> {
        Ok(self.state().connected.iter().any(|peer| peer == address))
    }

    fn list_bondings(&self, _adapter: &AdapterPath) -> Result<Vec<String>, BusError> {
        Ok(self.state().bondings.clone())
    }

    fn list_trusts(&self, _adapter: &AdapterPath) -> Result<Vec<String>, BusError> {
        Ok(self.state().trusts.clone())
    }

    fn discover_devices(&self, _adapter: &AdapterPath) -> Result<(), BusError> {
        let script = {
            let mut state = self.state();
            state.discover_calls += 1;
            if state.fail_discover {
                return Err(BusError::NotReady);
            }
            state.inquiry_script.clone()
        };
        if !script.is_empty() {
            let dispatcher = self.clone();
            thread::spawn(move || {
                for signal in &script {
                    dispatcher.emit(signal);
                }
            });
        }
        Ok(())
    }

    fn cancel_discovery(&self, _adapter: &AdapterPath) -> Result<(), BusError> {
        let complete = {
            let mut state = self.state();
            state.cancel_calls += 1;
            state.complete_on_cancel
        };
        if complete {
            self.emit(&AdapterSignal::DiscoveryCompleted);
        }
        Ok(())
    }

    fn remote_service_handles(
        &self,
        _adapter: &AdapterPath,
        address: &str,
        pattern: &str,
    ) -> Result<Vec<ServiceRecordHandle>, BusError> {
        let mut state = self.state();
        state.handle_patterns.push(pattern.to_owned());
        if let Some(err) = state.handles_error.clone() {
            return Err(err);
        }
        Ok(state
            .remotes
            .get(address)
            .map(|remote| remote.handles.clone())
            .unwrap_or_default())
    }

    fn remote_service_record(
        &self,
        _adapter: &AdapterPath,
        address: &str,
        handle: ServiceRecordHandle,
    ) -> Result<Vec<u8>, BusError> {
        let hook = {
            let mut state = self.state();
            state.record_fetches += 1;
            state.on_record_fetch.clone()
        };
        if let Some(hook) = hook {
            hook(handle);
        }

        let state = self.state();
        if state.failing_records.contains(&handle) {
            return Err(BusError::Failed(format!("record {handle:#x} unavailable")));
        }
        state
            .remotes
            .get(address)
            .and_then(|remote| remote.records.get(&handle))
            .cloned()
            .ok_or_else(|| BusError::Failed(format!("unknown handle {handle:#x}")))
    }

    fn open_service_session(&self, _adapter: &AdapterPath) -> Result<SessionHandle, BusError> {
        let mut state = self.state();
        state.open_calls += 1;
        if state.fail_open {
            return Err(BusError::Failed("no sdp server".into()));
        }
        state.open_sessions += 1;
        let session = state.next_session;
        state.next_session += 1;
        Ok(session)
    }

    fn close_service_session(&self, _session: SessionHandle) -> Result<(), BusError> {
        let mut state = self.state();
        state.close_calls += 1;
        state.open_sessions = state.open_sessions.saturating_sub(1);
        if state.fail_close {
            return Err(BusError::Failed("close failed".into()));
        }
        Ok(())
    }

    fn register_service(
        &self,
        _session: SessionHandle,
        record: &[u8],
    ) -> Result<ServiceRecordHandle, BusError> {
        let mut state = self.state();
        if state.fail_register {
            return Err(BusError::Failed("record rejected".into()));
        }
        let handle = state.next_record;
        state.next_record += 1;
        state.published.insert(handle, record.to_vec());
        Ok(handle)
    }

    fn update_service(
        &self,
        _session: SessionHandle,
        handle: ServiceRecordHandle,
        record: &[u8],
    ) -> Result<(), BusError> {
        let mut state = self.state();
        if state.fail_update || !state.published.contains_key(&handle) {
            return Err(BusError::Failed("update rejected".into()));
        }
        state.published.insert(handle, record.to_vec());
        Ok(())
    }

    fn unregister_service(
        &self,
        _session: SessionHandle,
        handle: ServiceRecordHandle,
    ) -> Result<(), BusError> {
        let mut state = self.state();
        let removed = state.published.remove(&handle);
        if state.fail_unregister || removed.is_none() {
            return Err(BusError::Failed("unregister rejected".into()));
        }
        Ok(())
    }

    fn add_signal_handler(
        &self,
        _adapter: &AdapterPath,
        kind: SignalKind,
        handler: SignalHandler,
    ) -> Result<HandlerId, BusError> {
        let mut state = self.state();
        if state.fail_subscribe == Some(kind) {
            return Err(BusError::Failed(format!("cannot add match for {kind:?}")));
        }
        let id = HandlerId(self.inner.next_handler.fetch_add(1, Ordering::SeqCst));
        state.handlers.push((id, kind, handler));
        Ok(id)
    }

    fn remove_signal_handler(&self, id: HandlerId) -> Result<(), BusError> {
        let mut state = self.state();
        let before = state.handlers.len();
        state.handlers.retain(|(handler, _, _)| *handler != id);
        if state.handlers.len() == before {
            return Err(BusError::Failed(format!("unknown handler {id:?}")));
        }
        Ok(())
    }

    fn disconnect(&self) {
        let mut state = self.state();
        state.disconnected = true;
        state.disconnect_calls += 1;
    }
}

/// Route `tracing` output through the test harness
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
