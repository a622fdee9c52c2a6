//! Remote name resolution
//!
//! The daemon only reports friendly names as a side effect of an inquiry, so a
//! [`NameResolver`] runs an inquiry of its own and returns as soon as the target
//! device reports a name.

use crate::bus::{AdapterSignal, BusError, SignalKind};
use crate::discovery::{InquiryControl, InquiryOwner, signal_address};
use crate::subscription::SignalSubscription;
use crate::{AdapterSession, BluetoothError, DeviceAddress, Result};
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

struct NameLookup {
    target: DeviceAddress,
    control: Arc<InquiryControl>,
    name: BlockingMutex<CriticalSectionRawMutex, RefCell<Option<String>>>,
    finished: AtomicBool,
}

impl NameLookup {
    fn inquiry_completed(&self) {
        self.finished.store(true, Ordering::SeqCst);
        self.control.complete();
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn name_updated(&self, wire: &str, name: &str) {
        match signal_address(wire) {
            Some(address) if address == self.target => {
                self.name.lock(|cell| *cell.borrow_mut() = Some(name.to_owned()));
                self.control.complete();
            }
            Some(address) => trace!("[NAME] Ignoring name of {}", address),
            None => {}
        }
    }
}

/// Fetches the friendly name of one remote device
#[derive(Debug)]
pub struct NameResolver {
    session: Arc<AdapterSession>,
}

impl NameResolver {
    /// Create a resolver for the session's adapter
    #[must_use]
    pub fn new(session: Arc<AdapterSession>) -> Self {
        Self { session }
    }

    /// Run an inquiry until `target` reports its name
    ///
    /// Returns the first name reported for the target. The rest of the inquiry is
    /// cancelled and the call returns once the daemon reports it stopped, so the
    /// adapter is idle again. Blocks until the name arrives, the inquiry completes, or
    /// the call is interrupted.
    ///
    /// # Errors
    /// - `BluetoothError::AlreadyRunning` if an inquiry is already live on the adapter
    /// - `BluetoothError::NameNotAvailable` if the inquiry completed without a name
    /// - `BluetoothError::Interrupted` if [`Self::interrupt`] woke the call
    /// - `BluetoothError::DiscoveryFailed` if the inquiry could not be started
    pub fn resolve(&self, target: DeviceAddress) -> Result<String> {
        let claim = self
            .session
            .inquiry()
            .claim(InquiryOwner::NameResolution)?;
        let lookup = Arc::new(NameLookup {
            target,
            control: Arc::clone(claim.control()),
            name: BlockingMutex::new(RefCell::new(None)),
            finished: AtomicBool::new(false),
        });

        let subscriptions = self
            .subscribe(&lookup)
            .map_err(BluetoothError::DiscoveryFailed)?;
        self.session
            .bus()
            .discover_devices(self.session.path())
            .map_err(BluetoothError::DiscoveryFailed)?;
        debug!("[NAME] Waiting for name of {}", target);

        lookup.control.wait();

        if lookup.control.is_interrupted() {
            info!("[NAME] Lookup of {} interrupted", target);
            return Err(BluetoothError::Interrupted);
        }

        let name = lookup.name.lock(|cell| cell.borrow_mut().take());
        match name {
            Some(name) => {
                self.stop_inquiry(&lookup);
                drop(subscriptions);
                info!("[NAME] {} is {:?}", target, name);
                Ok(name)
            }
            None => {
                debug!("[NAME] Inquiry completed without a name for {}", target);
                Err(BluetoothError::NameNotAvailable)
            }
        }
    }

    /// Cancel the rest of the inquiry and wait for the daemon to report completion
    ///
    /// The slot stays claimed until then, so the next inquiry on the adapter never
    /// receives this one's completion.
    fn stop_inquiry(&self, lookup: &NameLookup) {
        if lookup.is_finished() {
            return;
        }
        if let Err(err) = self.session.bus().cancel_discovery(self.session.path()) {
            warn!("[NAME] Failed to stop inquiry: {}", err);
            return;
        }
        while !lookup.is_finished() && !lookup.control.is_interrupted() {
            lookup.control.wait();
        }
    }

    /// Wake a blocked [`Self::resolve`] call, which then fails with
    /// `BluetoothError::Interrupted`
    ///
    /// A call that already has its name and is waiting for the cancelled inquiry to
    /// complete returns the name at once.
    ///
    /// Returns `false` if no name lookup is running.
    pub fn interrupt(&self) -> bool {
        match self.session.inquiry().live(InquiryOwner::NameResolution) {
            Some(control) => {
                control.interrupt();
                true
            }
            None => false,
        }
    }

    fn subscribe(
        &self,
        lookup: &Arc<NameLookup>,
    ) -> core::result::Result<[SignalSubscription; 2], BusError> {
        let bus = self.session.bus();
        let adapter = self.session.path();

        let handler = Arc::clone(lookup);
        let completed =
            SignalSubscription::subscribe(bus, adapter, SignalKind::DiscoveryCompleted, move |_| {
                handler.inquiry_completed();
            })?;

        let handler = Arc::clone(lookup);
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

        Ok([completed, named])
    }
}
