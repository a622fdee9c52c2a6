//! Device inquiry
//!
//! A [`DiscoveryEngine`] turns one daemon inquiry into a blocking call. Device-found
//! and name-updated signals arrive in any order on the bus dispatch thread and are
//! merged into per-address fragments; when the daemon reports completion the caller's
//! thread wakes and reports every fragment to its [`DiscoveryListener`].
//!
//! The adapter runs one inquiry at a time. The slot is shared with
//! [`crate::NameResolver`], which drives the same inquiry procedure.

use crate::bus::{AdapterSignal, BusError, SignalKind};
use crate::subscription::SignalSubscription;
use crate::{AdapterSession, BluetoothError, ClassOfDevice, DeviceAddress, RemoteDevice, Result};
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures::executor::block_on;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Which operation holds the adapter's inquiry slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InquiryOwner {
    Discovery,
    NameResolution,
}

/// Cancellation flags and completion signal of one live inquiry
pub(crate) struct InquiryControl {
    owner: InquiryOwner,
    cancelled: AtomicBool,
    interrupted: AtomicBool,
    completion: Signal<CriticalSectionRawMutex, ()>,
}

impl InquiryControl {
    fn new(owner: InquiryOwner) -> Self {
        Self {
            owner,
            cancelled: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            completion: Signal::new(),
        }
    }

    /// Wake the waiting thread
    pub(crate) fn complete(&self) {
        self.completion.signal(());
    }

    /// Park the calling thread until [`Self::complete`] is called
    pub(crate) fn wait(&self) {
        block_on(self.completion.wait());
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Mark the inquiry interrupted and wake the waiting thread
    pub(crate) fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.complete();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

/// The adapter's single inquiry slot
pub(crate) struct InquirySlot {
    live: BlockingMutex<CriticalSectionRawMutex, RefCell<Option<Arc<InquiryControl>>>>,
}

impl InquirySlot {
    pub(crate) const fn new() -> Self {
        Self {
            live: BlockingMutex::new(RefCell::new(None)),
        }
    }

    /// Claim the slot for `owner`
    ///
    /// # Errors
    /// `BluetoothError::AlreadyRunning` if another inquiry holds the slot.
    pub(crate) fn claim(&self, owner: InquiryOwner) -> Result<InquiryClaim<'_>> {
        self.live.lock(|cell| {
            let mut live = cell.borrow_mut();
            if live.is_some() {
                return Err(BluetoothError::AlreadyRunning);
            }
            let control = Arc::new(InquiryControl::new(owner));
            *live = Some(Arc::clone(&control));
            Ok(InquiryClaim {
                slot: self,
                control,
            })
        })
    }

    /// The live inquiry, if `owner` holds the slot
    pub(crate) fn live(&self, owner: InquiryOwner) -> Option<Arc<InquiryControl>> {
        self.live.lock(|cell| {
            cell.borrow()
                .as_ref()
                .filter(|control| control.owner == owner)
                .map(Arc::clone)
        })
    }
}

/// Holds the inquiry slot until dropped
pub(crate) struct InquiryClaim<'a> {
    slot: &'a InquirySlot,
    control: Arc<InquiryControl>,
}

impl InquiryClaim<'_> {
    pub(crate) fn control(&self) -> &Arc<InquiryControl> {
        &self.control
    }
}

impl Drop for InquiryClaim<'_> {
    fn drop(&mut self) {
        self.slot.live.lock(|cell| cell.borrow_mut().take());
    }
}

/// Parse an address carried by a signal, logging and dropping malformed ones
pub(crate) fn signal_address(wire: &str) -> Option<DeviceAddress> {
    match DeviceAddress::from_hex(wire) {
        Ok(address) => Some(address),
        Err(err) => {
            warn!("[SIGNAL] Ignoring signal: {}", err);
            None
        }
    }
}

/// Receives the results of one inquiry
pub trait DiscoveryListener {
    /// The daemon accepted the inquiry request
    fn inquiry_started(&mut self) {}

    /// One device found during a completed inquiry
    fn device_discovered(&mut self, device: RemoteDevice);
}

impl<F> DiscoveryListener for F
where
    F: FnMut(RemoteDevice),
{
    fn device_discovered(&mut self, device: RemoteDevice) {
        self(device);
    }
}

/// How an inquiry ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InquiryOutcome {
    /// The daemon completed the inquiry and every device was reported
    Completed,
    /// The inquiry was cancelled or interrupted; no devices were reported
    Terminated,
}

#[derive(Debug, Default)]
struct Fragment {
    class: Option<ClassOfDevice>,
    name: Option<String>,
}

/// Fragments keyed by address, reported in first-seen order
#[derive(Debug, Default)]
struct FragmentTable {
    order: Vec<DeviceAddress>,
    fragments: HashMap<DeviceAddress, Fragment>,
}

impl FragmentTable {
    fn entry(&mut self, address: DeviceAddress) -> &mut Fragment {
        self.fragments.entry(address).or_insert_with(|| {
            self.order.push(address);
            Fragment::default()
        })
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn into_devices(mut self) -> impl Iterator<Item = (DeviceAddress, Fragment)> {
        self.order
            .into_iter()
            .filter_map(move |address| Some((address, self.fragments.remove(&address)?)))
    }
}

/// State shared between the waiting thread and the signal handlers
struct DeviceInquiry {
    control: Arc<InquiryControl>,
    fragments: BlockingMutex<CriticalSectionRawMutex, RefCell<FragmentTable>>,
}

impl DeviceInquiry {
    fn new(control: Arc<InquiryControl>) -> Self {
        Self {
            control,
            fragments: BlockingMutex::new(RefCell::new(FragmentTable::default())),
        }
    }

    fn device_found(&self, wire: &str, class: u32) {
        let Some(address) = signal_address(wire) else {
            return;
        };
        trace!("[DISCOVERY] Found {} class {:#08x}", address, class);
        self.update(address, |fragment| {
            if fragment.class.is_none() {
                fragment.class = Some(ClassOfDevice::from_raw(class));
            }
        });
    }

    fn name_updated(&self, wire: &str, name: &str) {
        let Some(address) = signal_address(wire) else {
            return;
        };
        trace!("[DISCOVERY] Name of {} is {:?}", address, name);
        self.update(address, |fragment| fragment.name = Some(name.to_owned()));
    }

    fn update(&self, address: DeviceAddress, apply: impl FnOnce(&mut Fragment)) {
        self.fragments
            .lock(|cell| apply(cell.borrow_mut().entry(address)));
    }

    fn take_fragments(&self) -> FragmentTable {
        self.fragments.lock(|cell| core::mem::take(&mut *cell.borrow_mut()))
    }
}

/// Runs device inquiries on one adapter
#[derive(Debug)]
pub struct DiscoveryEngine {
    session: Arc<AdapterSession>,
}

impl DiscoveryEngine {
    /// Create an engine for the session's adapter
    #[must_use]
    pub fn new(session: Arc<AdapterSession>) -> Self {
        Self { session }
    }

    /// Run one inquiry with the session's configured access code
    ///
    /// # Errors
    /// See [`Self::start`].
    pub fn discover<L>(&self, listener: &mut L) -> Result<InquiryOutcome>
    where
        L: DiscoveryListener + ?Sized,
    {
        self.start(self.session.options().inquiry_access_code, listener)
    }

    /// Run one inquiry, blocking until the daemon reports completion
    ///
    /// The daemon always runs its own inquiry procedure; `access_code` is only logged.
    /// Devices are reported after completion, each with its bonding state. A
    /// cancelled or interrupted inquiry reports nothing and returns
    /// [`InquiryOutcome::Terminated`].
    ///
    /// There is no timeout: the call blocks until the daemon signals completion or
    /// the inquiry is cancelled or interrupted.
    ///
    /// # Errors
    /// - `BluetoothError::AlreadyRunning` if an inquiry is already live on the adapter
    /// - `BluetoothError::DiscoveryFailed` if the signals cannot be subscribed or the
    ///   daemon rejects the request
    pub fn start<L>(&self, access_code: u32, listener: &mut L) -> Result<InquiryOutcome>
    where
        L: DiscoveryListener + ?Sized,
    {
        let claim = self.session.inquiry().claim(InquiryOwner::Discovery)?;
        let inquiry = Arc::new(DeviceInquiry::new(Arc::clone(claim.control())));

        let subscriptions = self
            .subscribe(&inquiry)
            .map_err(BluetoothError::DiscoveryFailed)?;
        self.session
            .bus()
            .discover_devices(self.session.path())
            .map_err(|err| {
                warn!("[DISCOVERY] Inquiry request rejected: {}", err);
                BluetoothError::DiscoveryFailed(err)
            })?;

        info!("[DISCOVERY] Inquiry started (access code {:#08x})", access_code);
        listener.inquiry_started();
        inquiry.control.wait();
        drop(subscriptions);

        if inquiry.control.is_cancelled() || inquiry.control.is_interrupted() {
            info!("[DISCOVERY] Inquiry terminated");
            return Ok(InquiryOutcome::Terminated);
        }

        let fragments = inquiry.take_fragments();
        info!("[DISCOVERY] Inquiry completed, {} device(s) found", fragments.len());
        for (address, fragment) in fragments.into_devices() {
            listener.device_discovered(self.describe(address, &fragment));
        }
        Ok(InquiryOutcome::Completed)
    }

    /// Ask the daemon to stop the running inquiry
    ///
    /// The waiting thread wakes when the daemon reports completion. Returns `false` if
    /// no inquiry started by a discovery engine is running.
    pub fn cancel(&self) -> bool {
        let Some(control) = self.session.inquiry().live(InquiryOwner::Discovery) else {
            return false;
        };
        control.cancel();
        if let Err(err) = self.session.bus().cancel_discovery(self.session.path()) {
            warn!("[DISCOVERY] Cancel request failed: {}", err);
        }
        debug!("[DISCOVERY] Inquiry cancel requested");
        true
    }

    /// Wake the waiting thread at once without contacting the daemon
    ///
    /// Returns `false` if no inquiry started by a discovery engine is running.
    pub fn interrupt(&self) -> bool {
        let Some(control) = self.session.inquiry().live(InquiryOwner::Discovery) else {
            return false;
        };
        control.interrupt();
        debug!("[DISCOVERY] Inquiry interrupted");
        true
    }

    fn subscribe(
        &self,
        inquiry: &Arc<DeviceInquiry>,
    ) -> core::result::Result<[SignalSubscription; 3], BusError> {
        let bus = self.session.bus();
        let adapter = self.session.path();

        let handler = Arc::clone(inquiry);
        let completed =
            SignalSubscription::subscribe(bus, adapter, SignalKind::DiscoveryCompleted, move |_| {
                handler.control.complete();
            })?;

        let handler = Arc::clone(inquiry);
        let found = SignalSubscription::subscribe(
            bus,
            adapter,
            SignalKind::RemoteDeviceFound,
            move |signal| {
                if let AdapterSignal::RemoteDeviceFound { address, class, .. } = signal {
                    handler.device_found(address, *class);
                }
            },
        )?;

        let handler = Arc::clone(inquiry);
        let named = SignalSubscription::subscribe(
            bus,
            adapter,
            SignalKind::RemoteNameUpdated,
            move |signal| {
                if let AdapterSignal::RemoteNameUpdated { address, name } = signal {
                    handler.name_updated(address, name);
                }
            },
        )?;

        Ok([completed, found, named])
    }

    fn describe(&self, address: DeviceAddress, fragment: &Fragment) -> RemoteDevice {
        let paired = self
            .session
            .bus()
            .has_bonding(self.session.path(), &address.format_hex())
            .unwrap_or_else(|err| {
                warn!("[DISCOVERY] Bonding query for {} failed: {}", address, err);
                false
            });

        let mut device = RemoteDevice::new(address).with_paired(paired);
        device.class_of_device = fragment.class;
        device.name.clone_from(&fragment.name);
        device
    }
}
