//! Remote service search
//!
//! The daemon matches at most one pattern per query, so a search asks for every
//! handle the remote device publishes and filters the decoded records locally.

use super::{ServiceRecord, ServiceUuid, TransactionId};
use crate::bus::BusError;
use crate::{AdapterSession, DeviceAddress};
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result code of a service search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// At least one record matched
    Completed,
    /// The device publishes no matching record
    NoRecords,
    /// The handle query failed
    SearchError,
    /// The transaction was terminated
    Terminated,
    /// The device could not be reached
    DeviceNotReachable,
}

/// Outcome of a search and the records it kept
///
/// Only [`SearchOutcome::Completed`] carries records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSearchResult {
    /// How the search ended
    pub outcome: SearchOutcome,
    /// Matching records, each holding its remote handle
    pub records: Vec<ServiceRecord>,
}

impl ServiceSearchResult {
    fn ended(outcome: SearchOutcome) -> Self {
        Self {
            outcome,
            records: Vec::new(),
        }
    }
}

/// One search transaction, terminated cooperatively
#[derive(Debug)]
pub struct SearchTransaction {
    id: TransactionId,
    terminated: AtomicBool,
}

impl SearchTransaction {
    /// Transaction id
    #[must_use]
    pub const fn id(&self) -> TransactionId {
        self.id
    }

    /// Ask the search to stop at its next checkpoint
    ///
    /// Returns `false` if the transaction was already terminated.
    pub fn terminate(&self) -> bool {
        !self.terminated.swap(true, Ordering::SeqCst)
    }

    /// Whether [`Self::terminate`] was called
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

type RunningSearches =
    BlockingMutex<CriticalSectionRawMutex, RefCell<Vec<Arc<SearchTransaction>>>>;

/// Keeps a transaction listed as running until dropped
struct Running<'a> {
    searches: &'a RunningSearches,
    id: TransactionId,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.searches.lock(|cell| {
            cell.borrow_mut().retain(|txn| txn.id != self.id);
        });
    }
}

/// Searches the services published by remote devices
pub struct ServiceSearchEngine {
    session: Arc<AdapterSession>,
    next_transaction: AtomicU16,
    running: RunningSearches,
}

impl core::fmt::Debug for ServiceSearchEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServiceSearchEngine")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl ServiceSearchEngine {
    /// Create an engine for the session's adapter
    #[must_use]
    pub fn new(session: Arc<AdapterSession>) -> Self {
        Self {
            session,
            next_transaction: AtomicU16::new(1),
            running: BlockingMutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Start a new transaction for [`Self::search`]
    #[must_use]
    pub fn begin(&self) -> Arc<SearchTransaction> {
        Arc::new(SearchTransaction {
            id: self.next_transaction.fetch_add(1, Ordering::Relaxed),
            terminated: AtomicBool::new(false),
        })
    }

    /// Terminate the running search with transaction id `id`
    ///
    /// Returns `false` if no such search is running or it was already terminated.
    pub fn cancel(&self, id: TransactionId) -> bool {
        let txn = self.running.lock(|cell| {
            cell.borrow()
                .iter()
                .find(|txn| txn.id == id)
                .map(Arc::clone)
        });
        txn.is_some_and(|txn| txn.terminate())
    }

    /// Find the records of `target` that advertise every UUID in `required`
    ///
    /// A UUID matches if the record lists it as a service class or as a protocol. An
    /// empty `required` set keeps every record. Records that cannot be fetched or
    /// decoded are logged and skipped.
    pub fn search(
        &self,
        txn: &Arc<SearchTransaction>,
        required: &[ServiceUuid],
        target: DeviceAddress,
    ) -> ServiceSearchResult {
        let _running = self.track(txn);
        let result = self.run(txn, required, target);
        info!(
            "[SDP] Search {} on {}: {:?}, {} record(s)",
            txn.id,
            target,
            result.outcome,
            result.records.len()
        );
        result
    }

    fn track(&self, txn: &Arc<SearchTransaction>) -> Running<'_> {
        self.running
            .lock(|cell| cell.borrow_mut().push(Arc::clone(txn)));
        Running {
            searches: &self.running,
            id: txn.id,
        }
    }

    fn run(
        &self,
        txn: &SearchTransaction,
        required: &[ServiceUuid],
        target: DeviceAddress,
    ) -> ServiceSearchResult {
        let bus = self.session.bus();
        let adapter = self.session.path();
        let wire = target.format_hex();

        let handles = match bus.remote_service_handles(adapter, &wire, "") {
            Ok(handles) => handles,
            Err(BusError::HostUnreachable(reason)) => {
                debug!("[SDP] {} not reachable: {}", target, reason);
                return ServiceSearchResult::ended(SearchOutcome::DeviceNotReachable);
            }
            Err(err) => {
                debug!("[SDP] Handle query on {} failed: {}", target, err);
                return ServiceSearchResult::ended(SearchOutcome::SearchError);
            }
        };
        debug!("[SDP] {} publishes {} handle(s)", target, handles.len());

        let mut records = Vec::new();
        for handle in handles {
            if txn.is_terminated() {
                return ServiceSearchResult::ended(SearchOutcome::Terminated);
            }
            let fetched = bus.remote_service_record(adapter, &wire, handle);
            if txn.is_terminated() {
                return ServiceSearchResult::ended(SearchOutcome::Terminated);
            }

            let bytes = match fetched {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!("[SDP] Skipping record {:#010x}: {}", handle, err);
                    continue;
                }
            };
            let record = match ServiceRecord::from_bytes(handle, &bytes) {
                Ok(record) => record,
                Err(err) => {
                    warn!("[SDP] Skipping undecodable record {:#010x}: {}", handle, err);
                    continue;
                }
            };

            if record.matches_all(required) {
                debug!("[SDP] Record {:#010x} matches", handle);
                records.push(record);
            }
        }

        if txn.is_terminated() {
            ServiceSearchResult::ended(SearchOutcome::Terminated)
        } else if records.is_empty() {
            ServiceSearchResult::ended(SearchOutcome::NoRecords)
        } else {
            ServiceSearchResult {
                outcome: SearchOutcome::Completed,
                records,
            }
        }
    }
}
