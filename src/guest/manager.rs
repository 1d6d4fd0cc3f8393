use super::{groups, GuestChannel, GuestControl, GuestRequest};
use crate::collectors::CollectContext;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Owns every guest channel and the single worker that applies their
/// configuration requests.
pub struct GuestManager {
    sender: UnboundedSender<GuestRequest>,
    guests: Mutex<Vec<Arc<GuestChannel>>>,
    provider: Mutex<Option<Arc<GuestChannel>>>,
    busy: Arc<Mutex<Option<String>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl GuestManager {
    /// Spawn the request worker. Must be called inside a Tokio runtime.
    pub fn start() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let busy = Arc::new(Mutex::new(None));
        let worker = tokio::spawn(run_worker(receiver, Arc::clone(&busy)));
        Self {
            sender,
            guests: Mutex::new(Vec::new()),
            provider: Mutex::new(None),
            busy,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn register_guest(
        &self,
        name: impl Into<String>,
        control: Arc<dyn GuestControl>,
    ) -> Arc<GuestChannel> {
        let channel = Arc::new(GuestChannel::new(name.into(), control, self.sender.clone()));
        lock(&self.guests).push(Arc::clone(&channel));
        let mut provider = lock(&self.provider);
        if provider.is_none() {
            debug!(guest = %channel.name(), "elected VMM stats provider");
            *provider = Some(Arc::clone(&channel));
        }
        info!(guest = %channel.name(), "guest registered");
        channel
    }

    /// Flag a channel for destruction at the next collect phase and, if it
    /// was providing VMM statistics, elect a replacement.
    pub fn unregister_guest(&self, channel: &Arc<GuestChannel>) {
        channel.set_unregistered();
        info!(guest = %channel.name(), "guest unregistered");

        let mut provider = lock(&self.provider);
        if !provider.as_ref().is_some_and(|p| Arc::ptr_eq(p, channel)) {
            return;
        }
        let carried_vmm = channel.enabled_mask() & groups::VMM_RAM != 0;
        let guests = lock(&self.guests);
        let live = || guests.iter().filter(|g| !g.is_unregistered());

        let mut elected = None;
        for candidate in live().filter(|g| g.is_enabled()) {
            if !carried_vmm || candidate.enable(groups::VMM_RAM).is_ok() {
                elected = Some(Arc::clone(candidate));
                break;
            }
        }
        if elected.is_none() {
            elected = live().next().cloned();
            if let (true, Some(candidate)) = (carried_vmm, elected.as_ref()) {
                if let Err(e) = candidate.enable(groups::VMM_RAM) {
                    warn!(guest = %candidate.name(), error = %e, "could not hand over VMM stats");
                }
            }
        }
        match &elected {
            Some(g) => debug!(guest = %g.name(), "re-elected VMM stats provider"),
            None => debug!("no guest left to provide VMM stats"),
        }
        *provider = elected;
    }

    pub fn vmm_stats_provider(&self) -> Option<Arc<GuestChannel>> {
        lock(&self.provider).clone()
    }

    /// Name of the guest whose request the worker is currently blocked in.
    pub fn busy_guest(&self) -> Option<String> {
        lock(&self.busy).clone()
    }

    pub fn find(&self, name: &str) -> Option<Arc<GuestChannel>> {
        lock(&self.guests)
            .iter()
            .find(|g| g.name() == name && !g.is_unregistered())
            .cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.guests).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop unregistered channels. The context proves the caller holds the
    /// engine's exclusive lock and has already purged the base metrics that
    /// could still reach these channels.
    pub(crate) fn destroy_unregistered(&self, _ctx: &CollectContext<'_>) -> usize {
        let mut guests = lock(&self.guests);
        let before = guests.len();
        guests.retain(|g| !g.is_unregistered());
        let removed = before - guests.len();
        if removed > 0 {
            debug!(removed, "destroyed unregistered guest channels");
        }
        removed
    }

    /// Stop the worker after the requests already queued.
    pub async fn shutdown(&self) {
        let handle = lock(&self.worker).take();
        let Some(handle) = handle else {
            return;
        };
        if self.sender.send(GuestRequest::Abort).is_err() {
            debug!("guest worker already gone");
        }
        if let Err(e) = handle.await {
            error!(error = %e, "guest request worker terminated abnormally");
        }
    }
}

async fn run_worker(mut receiver: UnboundedReceiver<GuestRequest>, busy: Arc<Mutex<Option<String>>>) {
    debug!("guest request worker started");
    while let Some(request) = receiver.recv().await {
        let (channel, mask, enabling) = match request {
            GuestRequest::Abort => break,
            GuestRequest::Enable { channel, mask } => (channel, mask, true),
            GuestRequest::Disable { channel, mask } => (channel, mask, false),
        };

        *lock(&busy) = Some(channel.name().to_string());
        let result = if enabling {
            channel.enable_internal(mask).await
        } else {
            channel.disable_internal(mask).await
        };
        *lock(&busy) = None;

        if let Err(e) = result {
            warn!(
                guest = %channel.name(),
                mask,
                enabling,
                error = %e,
                "guest statistics request failed"
            );
            channel.invalidate(mask);
        }
    }
    info!("guest request worker stopped");
}
