// ==============================================================================
// Diagnostics supervisor: one background analysis per document
// ==============================================================================
//
// Each document change spawns a task that runs the analysis under a timeout.
// The registration table remembers, per document, the version and abort
// handle of the task that currently owns the slot. A newer version retires
// the registered task; an older one is aborted on arrival. Aborting only
// saves work: stale results are kept out by the cache's own write rule.
//
// A document with no registration does not get one unless
// `register_vacant` is set, so by default its first task runs unsupervised.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tower_lsp::lsp_types::MessageType;

use crate::analysis::AnalysisError;
use crate::state::{outdated, DocumentId, Version};
use crate::transport::Outbound;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

#[derive(Debug)]
struct Registration {
    version: Version,
    task: TaskId,
    handle: AbortHandle,
}

type Registrations = Arc<Mutex<HashMap<DocumentId, Registration>>>;

pub struct DiagnosticsSupervisor {
    registrations: Registrations,
    next_task: AtomicU64,
    register_vacant: bool,
    timeout: Duration,
    outbound: Outbound,
}

impl DiagnosticsSupervisor {
    pub fn new(outbound: Outbound, timeout: Duration, register_vacant: bool) -> Self {
        DiagnosticsSupervisor {
            registrations: Arc::default(),
            next_task: AtomicU64::new(0),
            register_vacant,
            timeout,
            outbound,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn set_register_vacant(&mut self, register_vacant: bool) {
        self.register_vacant = register_vacant;
    }

    /// Spawn `work` for `doc` at `version` and settle the registration.
    pub fn start_or_supersede<F>(&self, doc: DocumentId, version: Version, work: F) -> TaskId
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = TaskId(self.next_task.fetch_add(1, Ordering::Relaxed));
        let timeout = self.timeout;

        // Spawn while holding the table so the task's own cleanup cannot run
        // before its registration is installed.
        let mut table = self.registrations.lock();
        let handle = tokio::spawn({
            let registrations = self.registrations.clone();
            let outbound = self.outbound.clone();
            let doc = doc.clone();
            async move {
                if tokio::time::timeout(timeout, work).await.is_err() {
                    let err = AnalysisError::Timeout(timeout);
                    log::error!("{doc} v{version:?}: {err}");
                    outbound.log_message(MessageType::ERROR, format!("{doc}: {err}"));
                }
                let mut table = registrations.lock();
                if table.get(&doc).is_some_and(|reg| reg.task == task) {
                    table.remove(&doc);
                }
            }
        })
        .abort_handle();

        match table.get_mut(&doc) {
            Some(existing) if outdated(existing.version, version) => {
                log::debug!(
                    "{doc}: v{version:?} arrived after v{:?}, aborting it",
                    existing.version
                );
                handle.abort();
            }
            Some(existing) => {
                let old = std::mem::replace(
                    existing,
                    Registration {
                        version,
                        task,
                        handle,
                    },
                );
                log::debug!("{doc}: v{version:?} supersedes v{:?}", old.version);
                old.handle.abort();
            }
            None if self.register_vacant => {
                table.insert(
                    doc,
                    Registration {
                        version,
                        task,
                        handle,
                    },
                );
            }
            None => {
                log::debug!("{doc}: no registration to supersede, v{version:?} runs unsupervised");
            }
        }
        task
    }

    pub fn registered_version(&self, doc: &DocumentId) -> Option<Version> {
        self.registrations.lock().get(doc).map(|reg| reg.version)
    }

    pub fn active_count(&self) -> usize {
        self.registrations.lock().len()
    }
}

/// Raises the engine's cancellation flag when the owning task is dropped,
/// which is what aborting it does.
pub struct CancelOnDrop(pub Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;
    use tower_lsp::lsp_types::Url;

    use super::*;
    use crate::transport::OutboundMessage;

    fn doc() -> DocumentId {
        DocumentId::new(&Url::parse("file:///test/sup.mm1").unwrap())
    }

    fn supervisor(register_vacant: bool) -> (DiagnosticsSupervisor, tokio::sync::mpsc::UnboundedReceiver<OutboundMessage>) {
        let (outbound, rx) = Outbound::channel();
        (
            DiagnosticsSupervisor::new(outbound, Duration::from_secs(10), register_vacant),
            rx,
        )
    }

    /// A task that never finishes and reports when it is dropped.
    fn parked() -> (impl Future<Output = ()> + Send + 'static, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = CancelOnDrop(dropped.clone());
        let work = async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        };
        (work, dropped)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_task_stays_unregistered() {
        let (sup, _rx) = supervisor(false);
        let (work, first_dropped) = parked();
        sup.start_or_supersede(doc(), Some(1), work);
        assert_eq!(sup.registered_version(&doc()), None);

        // Nothing to supersede, so the first task keeps running.
        let (work, _) = parked();
        sup.start_or_supersede(doc(), Some(2), work);
        settle().await;
        assert!(!first_dropped.load(Ordering::Relaxed));
        assert_eq!(sup.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_version_supersedes_registered_task() {
        let (sup, _rx) = supervisor(true);
        let (work, first_dropped) = parked();
        sup.start_or_supersede(doc(), Some(1), work);
        assert_eq!(sup.registered_version(&doc()), Some(Some(1)));

        let (work, second_dropped) = parked();
        sup.start_or_supersede(doc(), Some(2), work);
        settle().await;
        assert!(first_dropped.load(Ordering::Relaxed));
        assert!(!second_dropped.load(Ordering::Relaxed));
        assert_eq!(sup.registered_version(&doc()), Some(Some(2)));
        assert_eq!(sup.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn outdated_task_is_aborted_on_arrival() {
        let (sup, _rx) = supervisor(true);
        let (work, newer_dropped) = parked();
        sup.start_or_supersede(doc(), Some(5), work);

        let (work, older_dropped) = parked();
        sup.start_or_supersede(doc(), Some(3), work);
        settle().await;
        assert!(older_dropped.load(Ordering::Relaxed));
        assert!(!newer_dropped.load(Ordering::Relaxed));
        assert_eq!(sup.registered_version(&doc()), Some(Some(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_logs_and_clears_registration() {
        let (outbound, mut rx) = Outbound::channel();
        let sup = DiagnosticsSupervisor::new(outbound, Duration::from_millis(100), true);
        let (work, dropped) = parked();
        sup.start_or_supersede(doc(), Some(1), work);
        assert_eq!(sup.active_count(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        settle().await;
        assert!(dropped.load(Ordering::Relaxed));
        assert_eq!(sup.active_count(), 0);
        match rx.try_recv().unwrap() {
            OutboundMessage::LogMessage { typ, message } => {
                assert_eq!(typ, MessageType::ERROR);
                assert!(message.contains("timed out"), "{message}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn finished_task_clears_only_its_own_registration() {
        let (sup, _rx) = supervisor(true);
        let (tx, rx) = oneshot::channel::<()>();
        sup.start_or_supersede(doc(), Some(1), async move {
            let _ = rx.await;
        });
        assert_eq!(sup.active_count(), 1);
        tx.send(()).unwrap();
        settle().await;
        assert_eq!(sup.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unversioned_changes_always_supersede() {
        let (sup, _rx) = supervisor(true);
        let (work, first_dropped) = parked();
        sup.start_or_supersede(doc(), Some(4), work);
        let (work, _) = parked();
        sup.start_or_supersede(doc(), None, work);
        settle().await;
        assert!(first_dropped.load(Ordering::Relaxed));
        assert_eq!(sup.registered_version(&doc()), Some(None));
    }
}
