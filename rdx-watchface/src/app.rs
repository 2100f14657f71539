//! The public facade: [`WatchApp`] runs the loop, [`AppHandle`] talks to it.
//!
//! Everything that changes application state happens on the task that awaits
//! [`WatchApp::run`]. Other tasks and threads hold an [`AppHandle`] and post
//! stimuli into the loop's mailbox; the async methods resolve once the loop
//! has processed the stimulus.

use crate::callbacks::LifecycleCallbacks;
use crate::common::{AlarmId, AppIdentity, HandlerId, TimerId};
use crate::components::lifecycle::{LifecycleEvent, LifecycleState};
use crate::components::subscriptions::EventCallback;
use crate::config::WatchConfig;
use crate::engine::{Envelope, Reply, WatchCore};
use crate::error::{HostError, WatchError};
use crate::events::{AppEvent, EventValue, LaunchBundle, LifecycleNotice, SystemEventKind};
use crate::host::{HostServices, SurfaceHandle};
use crate::time::TimeSnapshot;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// A watch application: configuration, callbacks, user data and the host
/// collaborators it runs against.
pub struct WatchApp<D> {
    config: WatchConfig,
    core: WatchCore<D>,
    handle: AppHandle,
    mailbox: mpsc::UnboundedReceiver<Envelope>,
}

impl<D> WatchApp<D> {
    /// Creates an app backed by the tokio host collaborators.
    pub fn new(
        config: WatchConfig,
        callbacks: LifecycleCallbacks<D>,
        data: D,
    ) -> Result<Self, WatchError> {
        let host_config = config.clone();
        Self::with_host(config, callbacks, data, move |handle| {
            HostServices::tokio(&host_config, handle)
        })
    }

    /// Creates an app against custom host collaborators. `host` receives the
    /// handle its timers and registries report back through.
    pub fn with_host(
        config: WatchConfig,
        callbacks: LifecycleCallbacks<D>,
        data: D,
        host: impl FnOnce(&AppHandle) -> HostServices,
    ) -> Result<Self, WatchError> {
        let identity = AppIdentity::from_app_id(&config.app_id)?;
        let (mailbox_tx, mailbox) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(config.notice_capacity.max(1));
        let handle = AppHandle {
            mailbox: mailbox_tx,
            notices: notices.clone(),
        };
        let services = host(&handle);
        let core = WatchCore::new(
            identity,
            callbacks,
            data,
            services,
            config.handler_capacity,
            notices,
        );
        Ok(Self {
            config,
            core,
            handle,
            mailbox,
        })
    }

    /// Runs the application until it is asked to exit.
    ///
    /// Creates the surface, runs `create`, delivers `launch` to
    /// `app_control`, then serves stimuli until `exit` or a host terminate.
    /// Afterwards a still-running app is paused, ticking stops, `terminate`
    /// runs and every host resource is released. An app runs at most once.
    pub async fn run(&mut self, launch: LaunchBundle) -> Result<(), WatchError> {
        if self.core.lifecycle() != LifecycleState::None {
            return Err(WatchError::AlreadyRunning);
        }
        if self.core.callbacks().create.is_none() {
            return Err(WatchError::MissingCreateHook);
        }
        if self.core.callbacks().ambient_tick.is_some() && !self.config.alarm_privilege {
            return Err(WatchError::PermissionDenied {
                capability: "wake-capable alarms for ambient ticks".to_string(),
            });
        }

        if let Err(e) = self.core.start(self.config.width, self.config.height) {
            error!("Startup aborted: {}", e);
            if matches!(e, WatchError::CreateFailed) {
                self.core.shutdown();
            } else {
                self.core.release();
            }
            self.close_mailbox();
            return Err(e);
        }
        if let Err(e) = self.core.deliver_launch(&launch) {
            warn!("Launch request not delivered: {}", e);
        }

        info!("'{}' is running", self.core.identity().name());
        while !self.core.exit_requested() {
            match self.mailbox.recv().await {
                Some(envelope) => self.core.dispatch(envelope),
                None => break,
            }
        }

        info!("Loop exited; shutting down '{}'", self.core.identity().name());
        self.core.shutdown();
        self.close_mailbox();
        Ok(())
    }

    /// Registers a system event handler before or between runs.
    pub fn add_event_handler(
        &mut self,
        kind: SystemEventKind,
        handler: EventCallback,
    ) -> Result<HandlerId, WatchError> {
        self.core.add_event_handler(kind, handler)
    }

    pub fn remove_event_handler(&mut self, id: HandlerId) -> Result<(), WatchError> {
        self.core.remove_event_handler(id)
    }

    /// A handle for posting stimuli into the loop.
    pub fn handle(&self) -> AppHandle {
        self.handle.clone()
    }

    /// Subscribes to the `LifecycleNotice` stream.
    pub fn subscribe_lifecycle_events(&self) -> broadcast::Receiver<LifecycleNotice> {
        self.core.subscribe_lifecycle_events()
    }

    pub fn identity(&self) -> &AppIdentity {
        self.core.identity()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.core.lifecycle()
    }

    /// The drawable surface. `None` before `run` creates it and after
    /// shutdown destroys it; hooks and other tasks ask an [`AppHandle`].
    pub fn surface(&self) -> Option<SurfaceHandle> {
        self.core.surface()
    }

    /// Reads the clock the ticks are computed from.
    pub fn current_time(&self) -> TimeSnapshot {
        self.core.current_time()
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn data(&self) -> &D {
        self.core.data()
    }

    pub fn data_mut(&mut self) -> &mut D {
        self.core.data_mut()
    }

    /// Refuses further stimuli. Callers still waiting on an acknowledgement
    /// see the loop as closed.
    fn close_mailbox(&mut self) {
        self.mailbox.close();
        let mut dropped = 0usize;
        while self.mailbox.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Discarded {} stimuli posted after exit", dropped);
        }
        self.handle.notices.send(LifecycleNotice::Exited).ok();
    }
}

/// A cloneable, `Send` handle for driving a running [`WatchApp`].
#[derive(Clone)]
pub struct AppHandle {
    mailbox: mpsc::UnboundedSender<Envelope>,
    notices: broadcast::Sender<LifecycleNotice>,
}

impl AppHandle {
    /// Asks the loop to exit. Callable from any thread, any number of times.
    ///
    /// Unlike [`AppHandle::terminate`] this does not wait for the loop to
    /// take the request: it returns once the request is queued, and the loop
    /// stops after the stimuli already queued ahead of it.
    pub fn exit(&self) {
        if self.mailbox.send(Envelope::Exit).is_err() {
            debug!("Exit requested after the loop closed");
        }
    }

    /// The app was obscured.
    pub async fn pause(&self) -> Result<(), WatchError> {
        self.lifecycle(LifecycleEvent::Pause).await
    }

    /// The app became visible.
    pub async fn resume(&self) -> Result<(), WatchError> {
        self.lifecycle(LifecycleEvent::Resume).await
    }

    /// The device entered or left its low-power ambient mode.
    pub async fn ambient(&self, ambient: bool) -> Result<(), WatchError> {
        self.lifecycle(LifecycleEvent::AmbientChanged(ambient)).await
    }

    /// The host asked the app to terminate.
    pub async fn terminate(&self) -> Result<(), WatchError> {
        self.lifecycle(LifecycleEvent::Terminate).await
    }

    /// Delivers a launch request to a running app.
    pub async fn app_control(&self, bundle: LaunchBundle) -> Result<(), WatchError> {
        self.request(|reply| Envelope::Launch { bundle, reply }).await
    }

    /// Delivers a system notification.
    pub async fn system_event(
        &self,
        kind: SystemEventKind,
        value: EventValue,
    ) -> Result<(), WatchError> {
        let event = AppEvent { kind, value };
        self.request(|reply| Envelope::System { event, reply }).await
    }

    /// The wall clock jumped.
    pub async fn wall_clock_changed(&self) -> Result<(), WatchError> {
        self.system_event(SystemEventKind::WallClockChanged, EventValue::None)
            .await
    }

    pub async fn add_event_handler(
        &self,
        kind: SystemEventKind,
        handler: EventCallback,
    ) -> Result<HandlerId, WatchError> {
        self.request(|reply| Envelope::AddHandler {
            kind,
            callback: handler,
            reply,
        })
        .await
    }

    pub async fn remove_event_handler(&self, id: HandlerId) -> Result<(), WatchError> {
        self.request(|reply| Envelope::RemoveHandler { id, reply })
            .await
    }

    /// The surface the running app draws on.
    pub async fn surface(&self) -> Result<SurfaceHandle, WatchError> {
        self.request(|reply| Envelope::Surface { reply }).await
    }

    /// Reads the app's clock on the loop.
    pub async fn current_time(&self) -> Result<TimeSnapshot, WatchError> {
        self.request(|reply| Envelope::CurrentTime { reply }).await
    }

    /// Reports that the foreground timer `id` elapsed.
    pub fn notify_timer_fired(&self, id: TimerId) -> Result<(), HostError> {
        self.mailbox
            .send(Envelope::TimerFired(id))
            .map_err(|_| HostError::LoopClosed)
    }

    /// Reports that the ambient alarm `id` went off.
    pub fn notify_alarm_fired(&self, id: AlarmId) -> Result<(), HostError> {
        self.mailbox
            .send(Envelope::AlarmFired(id))
            .map_err(|_| HostError::LoopClosed)
    }

    /// Subscribes to the `LifecycleNotice` stream.
    pub fn subscribe_lifecycle_events(&self) -> broadcast::Receiver<LifecycleNotice> {
        self.notices.subscribe()
    }

    async fn lifecycle(&self, event: LifecycleEvent) -> Result<(), WatchError> {
        self.request(|reply| Envelope::Lifecycle { event, reply })
            .await
    }

    async fn request<T>(
        &self,
        envelope: impl FnOnce(Reply<T>) -> Envelope,
    ) -> Result<T, WatchError> {
        let (reply, ack) = oneshot::channel();
        self.mailbox
            .send(envelope(reply))
            .map_err(|_| loop_closed())?;
        ack.await.map_err(|_| loop_closed())?
    }
}

fn loop_closed() -> WatchError {
    WatchError::invalid_context("the application loop is not running")
}
