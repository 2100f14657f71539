//! The engine core: applies lifecycle transitions to the live application.
//!
//! [`WatchCore`] owns everything that changes while the app runs: the state
//! record, the user callbacks and data, the tick scheduler, the subscription
//! tables and the host collaborators. It is driven one stimulus at a time from
//! the loop in [`crate::app`], so it needs no locking of its own.

use crate::callbacks::LifecycleCallbacks;
use crate::common::{AlarmId, AppIdentity, HandlerId, TimerId};
use crate::components::lifecycle::{
    transition, AppState, Effect, Hook, LifecycleEvent, LifecycleState, Rejection,
};
use crate::components::scheduler::{TickScheduler, AMBIENT_PERIOD};
use crate::components::subscriptions::{EventCallback, EventHandlers, Route, SubscriptionTable};
use crate::error::WatchError;
use crate::events::{AppControl, AppEvent, LaunchBundle, LifecycleNotice, SystemEventKind};
use crate::host::{AmbientPeer, EventRegistry, HostServices, SurfaceHandle, SurfaceProvider};
use crate::time::{ClockSource, TimeSnapshot};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, trace, warn};

/// Event kinds subscribed as soon as the app is created.
const EAGER_SUBSCRIPTIONS: [SystemEventKind; 3] = [
    SystemEventKind::LowMemory,
    SystemEventKind::LanguageChanged,
    SystemEventKind::RegionChanged,
];

pub(crate) type Reply<T> = oneshot::Sender<Result<T, WatchError>>;

/// A message for the engine loop.
pub(crate) enum Envelope {
    Lifecycle {
        event: LifecycleEvent,
        reply: Reply<()>,
    },
    Launch {
        bundle: LaunchBundle,
        reply: Reply<()>,
    },
    System {
        event: AppEvent,
        reply: Reply<()>,
    },
    AddHandler {
        kind: SystemEventKind,
        callback: EventCallback,
        reply: Reply<HandlerId>,
    },
    RemoveHandler {
        id: HandlerId,
        reply: Reply<()>,
    },
    Surface {
        reply: Reply<SurfaceHandle>,
    },
    CurrentTime {
        reply: Reply<TimeSnapshot>,
    },
    TimerFired(TimerId),
    AlarmFired(AlarmId),
    Exit,
}

/// The live application.
pub struct WatchCore<D> {
    identity: AppIdentity,
    state: AppState,
    callbacks: LifecycleCallbacks<D>,
    data: D,
    clock: Box<dyn ClockSource>,
    scheduler: TickScheduler,
    registry: Box<dyn EventRegistry>,
    peer: Box<dyn AmbientPeer>,
    surfaces: Box<dyn SurfaceProvider>,
    surface: Option<SurfaceHandle>,
    subscriptions: SubscriptionTable,
    handlers: EventHandlers,
    initialized: bool,
    exit_requested: bool,
    notices: broadcast::Sender<LifecycleNotice>,
}

// Core implementation block for state handling.
impl<D> WatchCore<D> {
    pub fn new(
        identity: AppIdentity,
        callbacks: LifecycleCallbacks<D>,
        data: D,
        host: HostServices,
        handler_capacity: usize,
        notices: broadcast::Sender<LifecycleNotice>,
    ) -> Self {
        Self {
            identity,
            state: AppState::default(),
            callbacks,
            data,
            clock: host.clock,
            scheduler: TickScheduler::new(host.timer, host.alarm),
            registry: host.registry,
            peer: host.peer,
            surfaces: host.surface,
            surface: None,
            subscriptions: SubscriptionTable::new(),
            handlers: EventHandlers::new(handler_capacity),
            initialized: false,
            exit_requested: false,
            notices,
        }
    }

    /// Feeds one stimulus through the state machine and carries out its
    /// effects in order.
    ///
    /// A stimulus that is invalid for the current state changes nothing; it is
    /// logged and reported back as [`WatchError::InvalidContext`].
    pub fn handle(&mut self, event: &LifecycleEvent) -> Result<(), WatchError> {
        let transition = match transition(&self.state, event) {
            Ok(transition) => transition,
            Err(rejection) => return Err(self.reject(rejection)),
        };
        trace!("{} -> {:?}", event.name(), transition.effects);
        for effect in transition.effects {
            self.execute(effect)?;
        }
        Ok(())
    }

    /// Creates the surface, subscribes to system events and runs `create`.
    pub fn start(&mut self, width: u32, height: u32) -> Result<(), WatchError> {
        info!(
            "Starting '{}' ({}) on a {}x{} surface",
            self.identity.name(),
            self.identity.app_id(),
            width,
            height
        );
        let surface = self
            .surfaces
            .create_surface(width, height)
            .map_err(|source| WatchError::Surface {
                width,
                height,
                source,
            })?;
        self.surface = Some(surface);
        self.initialized = true;
        for kind in EAGER_SUBSCRIPTIONS {
            self.subscribe(kind, Route::Handlers);
        }
        if self.handlers.count(SystemEventKind::LowBattery) > 0 {
            self.subscribe(SystemEventKind::LowBattery, Route::Handlers);
        }
        self.subscribe(SystemEventKind::WallClockChanged, Route::Lifecycle);
        self.handle(&LifecycleEvent::Create { width, height })
    }

    /// Decodes a launch request and hands it to the `app_control` hook.
    pub fn deliver_launch(&mut self, bundle: &LaunchBundle) -> Result<(), WatchError> {
        let control = AppControl::decode(bundle).map_err(|reason| {
            error!("Failed to decode launch request: {}", reason);
            WatchError::invalid_parameter(reason)
        })?;
        self.handle(&LifecycleEvent::AppControl(control))
    }

    /// Runs the after-loop sequence: pause if still running, stop ticking,
    /// `terminate`, then release every host resource.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.handle(&LifecycleEvent::Shutdown) {
            error!("Shutdown did not complete: {}", e);
        }
    }

    /// Claims a foreground timer fire. Stale fires are dropped.
    pub fn on_timer_fired(&mut self, id: TimerId) {
        if self.scheduler.accept_time_tick(id) {
            if let Err(e) = self.handle(&LifecycleEvent::TimeTickFired) {
                debug!("Time tick not delivered: {}", e);
            }
        }
    }

    /// Claims an ambient alarm fire. Fires from a disarmed alarm are dropped.
    pub fn on_alarm_fired(&mut self, id: AlarmId) {
        if !self.scheduler.accept_ambient(id) {
            trace!("Dropping stale ambient alarm {:?}", id);
            return;
        }
        if let Err(e) = self.handle(&LifecycleEvent::AmbientAlarmFired) {
            debug!("Ambient tick not delivered: {}", e);
        }
    }

    /// Routes a host-delivered system event.
    pub fn dispatch_system_event(&mut self, event: AppEvent) {
        match self.subscriptions.route(event.kind) {
            Some(Route::Lifecycle) => {
                info!("Wall clock changed");
                if let Err(e) = self.handle(&LifecycleEvent::WallClockChanged) {
                    debug!("Wall clock change ignored: {}", e);
                }
            }
            Some(Route::Handlers) => {
                let handlers = self.handlers.dispatch(&event);
                debug!("{} event reached {} handler(s)", event.kind, handlers);
                self.notify(LifecycleNotice::SystemEvent {
                    kind: event.kind,
                    handlers,
                });
            }
            None => debug!("Ignoring {} event: not subscribed", event.kind),
        }
    }

    /// Registers an application handler. The low-battery subscription is
    /// taken lazily, once the first handler for it exists.
    pub fn add_event_handler(
        &mut self,
        kind: SystemEventKind,
        callback: EventCallback,
    ) -> Result<HandlerId, WatchError> {
        let id = self.handlers.add(kind, callback).map_err(|e| {
            warn!("Refused {} handler: {}", kind, e);
            e
        })?;
        if kind == SystemEventKind::LowBattery && self.initialized {
            self.subscribe(kind, Route::Handlers);
        }
        Ok(id)
    }

    /// Unregisters an application handler, dropping the low-battery
    /// subscription with the last handler for it.
    pub fn remove_event_handler(&mut self, id: HandlerId) -> Result<(), WatchError> {
        let kind = self.handlers.remove(id).map_err(|e| {
            warn!("Cannot remove event handler: {}", e);
            e
        })?;
        if kind == SystemEventKind::LowBattery && self.handlers.count(kind) == 0 {
            if let Err(e) = self.subscriptions.set(kind, None, self.registry.as_mut()) {
                error!("Failed to unsubscribe from {} events: {}", kind, e);
            }
        }
        Ok(())
    }

    /// Cancels every timer, drops every subscription and destroys the surface.
    /// Safe to call more than once.
    pub fn release(&mut self) {
        self.scheduler.release();
        self.subscriptions.clear(self.registry.as_mut());
        if let Some(surface) = self.surface.take() {
            self.surfaces.destroy_surface(surface);
        }
        self.initialized = false;
    }

    /// Serves one mailbox message.
    pub(crate) fn dispatch(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Lifecycle { event, reply } => {
                reply.send(self.handle(&event)).ok();
            }
            Envelope::Launch { bundle, reply } => {
                reply.send(self.deliver_launch(&bundle)).ok();
            }
            Envelope::System { event, reply } => {
                self.dispatch_system_event(event);
                reply.send(Ok(())).ok();
            }
            Envelope::AddHandler {
                kind,
                callback,
                reply,
            } => {
                reply.send(self.add_event_handler(kind, callback)).ok();
            }
            Envelope::RemoveHandler { id, reply } => {
                reply.send(self.remove_event_handler(id)).ok();
            }
            Envelope::Surface { reply } => {
                let surface = self
                    .surface
                    .ok_or_else(|| WatchError::invalid_context("no surface has been created"));
                reply.send(surface).ok();
            }
            Envelope::CurrentTime { reply } => {
                reply.send(Ok(self.current_time())).ok();
            }
            Envelope::TimerFired(id) => self.on_timer_fired(id),
            Envelope::AlarmFired(id) => self.on_alarm_fired(id),
            Envelope::Exit => {
                if !self.exit_requested {
                    info!("Exit requested");
                }
                self.exit_requested = true;
            }
        }
    }

    fn execute(&mut self, effect: Effect) -> Result<(), WatchError> {
        match effect {
            Effect::Enter(next) => {
                let from = self.state.lifecycle;
                self.state.lifecycle = next;
                if from != next {
                    debug!("Lifecycle {} -> {}", from, next);
                    self.notify(LifecycleNotice::StateChanged { from, to: next });
                }
            }
            Effect::SetAmbient(ambient) => {
                self.state.ambient = ambient;
                info!("Ambient mode {}", if ambient { "entered" } else { "left" });
                self.notify(LifecycleNotice::AmbientChanged { ambient });
            }
            Effect::SetSkipResume(skip) => self.state.skip_resume = skip,
            Effect::Invoke(hook) => return self.invoke(hook),
            Effect::CancelTimeTick => self.scheduler.cancel_time_tick(),
            Effect::StartTimeTick => self.time_tick(),
            Effect::StartAmbientTick => self.start_ambient_tick(),
            Effect::StopAmbientTick => self.scheduler.disarm_ambient(),
            Effect::AmbientTick => self.ambient_tick(),
            Effect::NotifyDrawDone => {
                if let Err(e) = self.peer.notify_draw_done() {
                    error!("Failed to send the draw-done signal: {}", e);
                }
            }
            Effect::InitAlarm => {
                if let Err(e) = self.scheduler.init_alarm(self.identity.app_id()) {
                    error!("Failed to initialise the alarm subsystem: {}", e);
                }
            }
            Effect::ExitLoop => self.exit_requested = true,
            Effect::ReleaseResources => self.release(),
        }
        Ok(())
    }

    fn invoke(&mut self, hook: Hook) -> Result<(), WatchError> {
        let data = &mut self.data;
        let callbacks = &mut self.callbacks;
        match hook {
            Hook::Create { width, height } => {
                let create = callbacks.create.as_mut().ok_or(WatchError::MissingCreateHook)?;
                if !create(width, height, data) {
                    error!("The create hook reported failure");
                    return Err(WatchError::CreateFailed);
                }
            }
            Hook::AppControl(control) => {
                if let Some(app_control) = callbacks.app_control.as_mut() {
                    app_control(&control, data);
                }
            }
            Hook::Pause => {
                if let Some(pause) = callbacks.pause.as_mut() {
                    pause(data);
                }
            }
            Hook::Resume => {
                if let Some(resume) = callbacks.resume.as_mut() {
                    resume(data);
                }
            }
            Hook::Terminate => {
                if let Some(terminate) = callbacks.terminate.as_mut() {
                    terminate(data);
                }
            }
            Hook::AmbientChanged(ambient) => {
                if let Some(ambient_changed) = callbacks.ambient_changed.as_mut() {
                    ambient_changed(ambient, data);
                }
            }
        }
        Ok(())
    }

    /// Reads the clock, arms the next foreground timer, then delivers the
    /// tick. Without a `time_tick` hook no timer is armed.
    fn time_tick(&mut self) {
        let Some(hook) = self.callbacks.time_tick.as_mut() else {
            return;
        };
        let snapshot = self.clock.now();
        match self.scheduler.arm_time_tick(&snapshot) {
            Ok(next_in) => {
                self.notices
                    .send(LifecycleNotice::TimeTick {
                        snapshot: snapshot.clone(),
                        next_in,
                    })
                    .ok();
            }
            Err(e) => error!("Failed to arm the time tick; ticking stops: {}", e),
        }
        hook(&snapshot, &mut self.data);
    }

    /// Arms the minute alarm and delivers one ambient tick straight away, so
    /// the ambient frame is current even when the alarm cannot be armed.
    fn start_ambient_tick(&mut self) {
        if self.callbacks.ambient_tick.is_none() {
            return;
        }
        let snapshot = self.clock.now();
        match self.scheduler.arm_ambient(&snapshot) {
            Ok(initial) => self.notify(LifecycleNotice::AlarmArmed {
                initial,
                period: AMBIENT_PERIOD,
            }),
            Err(e) => error!("Failed to arm the ambient alarm: {}", e),
        }
        self.deliver_ambient_tick(snapshot);
    }

    fn ambient_tick(&mut self) {
        if self.callbacks.ambient_tick.is_none() {
            return;
        }
        let snapshot = self.clock.now();
        self.deliver_ambient_tick(snapshot);
    }

    fn deliver_ambient_tick(&mut self, snapshot: TimeSnapshot) {
        trace!(
            "Ambient tick at {:02}:{:02}",
            snapshot.hour24,
            snapshot.minute
        );
        if let Some(hook) = self.callbacks.ambient_tick.as_mut() {
            hook(&snapshot, &mut self.data);
        }
        self.notify(LifecycleNotice::AmbientTick { snapshot });
    }

    fn subscribe(&mut self, kind: SystemEventKind, route: Route) {
        if let Err(e) = self.subscriptions.set(kind, Some(route), self.registry.as_mut()) {
            error!("Failed to subscribe to {} events: {}", kind, e);
        }
    }

    fn reject(&self, rejection: Rejection) -> WatchError {
        warn!("{}", rejection);
        self.notify(LifecycleNotice::Rejected {
            stimulus: rejection.stimulus,
            reason: rejection.reason.to_string(),
        });
        rejection.into()
    }

    fn notify(&self, notice: LifecycleNotice) {
        self.notices.send(notice).ok();
    }
}

// Read-only accessors.
impl<D> WatchCore<D> {
    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.state.lifecycle
    }

    pub fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    /// The surface created at startup, until shutdown destroys it.
    pub fn surface(&self) -> Option<SurfaceHandle> {
        self.surface
    }

    /// A fresh reading of the injected clock.
    pub fn current_time(&self) -> TimeSnapshot {
        self.clock.now()
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut D {
        &mut self.data
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn callbacks(&self) -> &LifecycleCallbacks<D> {
        &self.callbacks
    }

    pub fn handler_count(&self, kind: SystemEventKind) -> usize {
        self.handlers.count(kind)
    }

    pub fn is_subscribed(&self, kind: SystemEventKind) -> bool {
        self.subscriptions.is_subscribed(kind)
    }

    pub fn time_tick_armed(&self) -> bool {
        self.scheduler.time_tick_armed()
    }

    pub fn ambient_armed(&self) -> bool {
        self.scheduler.ambient_armed()
    }

    pub fn subscribe_lifecycle_events(&self) -> broadcast::Receiver<LifecycleNotice> {
        self.notices.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventValue, CALLER_KEY, OPERATION_KEY};
    use crate::testing::{
        snapshot, Journal, ManualClock, RecordingAlarm, RecordingPeer, RecordingRegistry,
        RecordingSurface, RecordingTimer, SURFACE_ID,
    };
    use std::sync::{Arc, Mutex};

    const APP_ID: &str = "org.example.clock";

    /// A core wired to recording fakes. `hooks` sees user callbacks, `host`
    /// sees collaborator calls.
    struct Rig {
        core: WatchCore<u32>,
        hooks: Journal,
        host: Journal,
        clock: ManualClock,
        timers: Arc<Mutex<Vec<TimerId>>>,
        alarms: Arc<Mutex<Vec<AlarmId>>>,
        registry: RecordingRegistry,
        notices: broadcast::Receiver<LifecycleNotice>,
    }

    impl Rig {
        fn last_timer(&self) -> TimerId {
            *self.timers.lock().unwrap().last().unwrap()
        }

        fn last_alarm(&self) -> AlarmId {
            *self.alarms.lock().unwrap().last().unwrap()
        }

        fn notices(&mut self) -> Vec<LifecycleNotice> {
            let mut seen = Vec::new();
            while let Ok(notice) = self.notices.try_recv() {
                seen.push(notice);
            }
            seen
        }
    }

    fn recording_callbacks(hooks: &Journal) -> LifecycleCallbacks<u32> {
        let (h1, h2, h3, h4, h5, h6, h7, h8) = (
            hooks.clone(),
            hooks.clone(),
            hooks.clone(),
            hooks.clone(),
            hooks.clone(),
            hooks.clone(),
            hooks.clone(),
            hooks.clone(),
        );
        LifecycleCallbacks::new()
            .on_create(move |w, h, _| {
                h1.push(format!("create({w}x{h})"));
                true
            })
            .on_app_control(move |control, _| h2.push(format!("app_control({})", control.operation)))
            .on_pause(move |_| h3.push("pause"))
            .on_resume(move |_| h4.push("resume"))
            .on_terminate(move |_| h5.push("terminate"))
            .on_time_tick(move |now, ticks| {
                *ticks += 1;
                h6.push(format!("time_tick({:02}:{:02}:{:02})", now.hour24, now.minute, now.second));
            })
            .on_ambient_tick(move |now, _| {
                h7.push(format!("ambient_tick({:02}:{:02})", now.hour24, now.minute))
            })
            .on_ambient_changed(move |ambient, _| h8.push(format!("ambient_changed({ambient})")))
    }

    fn rig_with(
        callbacks: impl FnOnce(&Journal) -> LifecycleCallbacks<u32>,
        failing_alarm: bool,
        failing_surface: bool,
    ) -> Rig {
        let hooks = Journal::default();
        let host = Journal::default();
        let clock = ManualClock::new(snapshot(10, 15, 30, 250));
        let timer = RecordingTimer::new(host.clone());
        let timers = timer.issued();
        let mut alarm = RecordingAlarm::new(host.clone());
        if failing_alarm {
            alarm = alarm.failing();
        }
        let alarms = alarm.issued();
        let registry = RecordingRegistry::new(host.clone());
        let mut surface = RecordingSurface::new(host.clone());
        if failing_surface {
            surface = surface.failing();
        }
        let (notices_tx, notices) = broadcast::channel(64);
        let core = WatchCore::new(
            AppIdentity::from_app_id(APP_ID).unwrap(),
            callbacks(&hooks),
            0,
            HostServices {
                clock: Box::new(clock.clone()),
                surface: Box::new(surface),
                timer: Box::new(timer),
                alarm: Box::new(alarm),
                registry: Box::new(registry.clone()),
                peer: Box::new(RecordingPeer::new(host.clone())),
            },
            8,
            notices_tx,
        );
        Rig {
            core,
            hooks,
            host,
            clock,
            timers,
            alarms,
            registry,
            notices,
        }
    }

    fn rig() -> Rig {
        rig_with(recording_callbacks, false, false)
    }

    /// A rig that has been created and made visible.
    fn running() -> Rig {
        let mut rig = rig();
        rig.core.start(360, 360).unwrap();
        rig.core.handle(&LifecycleEvent::Resume).unwrap();
        rig.hooks.clear();
        rig.host.clear();
        rig
    }

    #[test]
    fn start_subscribes_and_creates() {
        let mut rig = rig();
        rig.core.start(360, 360).unwrap();

        assert_eq!(rig.hooks.entries(), vec!["create(360x360)"]);
        assert_eq!(rig.core.lifecycle(), LifecycleState::Created);
        assert_eq!(rig.host.entries()[0], "surface.create(360x360)");
        assert_eq!(rig.host.count(&format!("alarm.init({APP_ID})")), 1);
        assert_eq!(
            rig.registry.active(),
            vec![
                SystemEventKind::LowMemory,
                SystemEventKind::LanguageChanged,
                SystemEventKind::RegionChanged,
                SystemEventKind::WallClockChanged,
            ]
        );
        assert!(!rig.core.is_subscribed(SystemEventKind::LowBattery));
        assert!(!rig.core.time_tick_armed());
    }

    #[test]
    fn resume_ticks_immediately_and_arms_the_next_second() {
        let mut rig = rig();
        rig.core.start(360, 360).unwrap();
        rig.core.handle(&LifecycleEvent::Resume).unwrap();

        assert_eq!(
            rig.hooks.entries(),
            vec!["create(360x360)", "resume", "time_tick(10:15:30)"]
        );
        assert!(rig.host.entries().contains(&"timer.arm(750ms)".to_string()));
        assert!(rig.core.time_tick_armed());
        assert_eq!(*rig.core.data(), 1);
    }

    #[test]
    fn timer_fires_rearm_from_a_fresh_reading() {
        let mut rig = running();
        rig.clock.set(snapshot(10, 15, 31, 4));
        let id = rig.last_timer();
        rig.core.on_timer_fired(id);

        assert_eq!(rig.hooks.entries(), vec!["time_tick(10:15:31)"]);
        assert_eq!(rig.host.entries(), vec!["timer.arm(996ms)"]);
        assert_eq!(*rig.core.data(), 2);
    }

    #[test]
    fn stale_timer_fires_are_dropped() {
        let mut rig = running();
        let stale = rig.last_timer();
        rig.core.handle(&LifecycleEvent::Pause).unwrap();
        rig.core.on_timer_fired(stale);

        assert_eq!(rig.hooks.entries(), vec!["pause"]);
        assert_eq!(rig.host.entries(), vec!["timer.cancel"]);
        assert!(!rig.core.time_tick_armed());
    }

    #[test]
    fn entering_ambient_while_running_pauses_then_ticks() {
        let mut rig = running();
        rig.core.handle(&LifecycleEvent::AmbientChanged(true)).unwrap();

        assert_eq!(
            rig.hooks.entries(),
            vec!["pause", "ambient_changed(true)", "ambient_tick(10:15)"]
        );
        assert_eq!(
            rig.host.entries(),
            vec!["timer.cancel", "alarm.arm(30s, every 60s)", "peer.draw_done"]
        );
        assert_eq!(
            rig.core.state(),
            AppState {
                lifecycle: LifecycleState::Paused,
                ambient: true,
                skip_resume: false,
            }
        );
    }

    #[test]
    fn leaving_ambient_resumes_and_disarms() {
        let mut rig = running();
        rig.core.handle(&LifecycleEvent::AmbientChanged(true)).unwrap();
        rig.hooks.clear();
        rig.host.clear();

        rig.core.handle(&LifecycleEvent::AmbientChanged(false)).unwrap();
        assert_eq!(
            rig.hooks.entries(),
            vec!["ambient_changed(false)", "resume", "time_tick(10:15:30)"]
        );
        assert_eq!(rig.host.entries(), vec!["timer.arm(750ms)", "alarm.cancel"]);
        assert!(!rig.core.ambient_armed());
        assert_eq!(rig.core.lifecycle(), LifecycleState::Running);
    }

    #[test]
    fn ambient_entered_while_paused_does_not_resume_on_exit() {
        let mut rig = running();
        rig.core.handle(&LifecycleEvent::Pause).unwrap();
        rig.core.handle(&LifecycleEvent::AmbientChanged(true)).unwrap();
        rig.core.handle(&LifecycleEvent::AmbientChanged(false)).unwrap();

        assert_eq!(
            rig.hooks.entries(),
            vec![
                "pause",
                "ambient_changed(true)",
                "ambient_tick(10:15)",
                "ambient_changed(false)",
            ]
        );
        assert_eq!(rig.core.lifecycle(), LifecycleState::Paused);
        assert!(!rig.core.time_tick_armed());
    }

    #[test]
    fn hidden_during_ambient_stays_hidden_on_exit() {
        let mut rig = running();
        rig.core.handle(&LifecycleEvent::AmbientChanged(true)).unwrap();
        rig.hooks.clear();

        rig.core.handle(&LifecycleEvent::Pause).unwrap();
        assert!(rig.core.state().skip_resume);
        rig.core.handle(&LifecycleEvent::AmbientChanged(false)).unwrap();

        assert_eq!(rig.hooks.entries(), vec!["ambient_changed(false)"]);
        assert_eq!(rig.core.lifecycle(), LifecycleState::Paused);
        assert!(!rig.core.time_tick_armed());
        assert!(!rig.core.ambient_armed());
    }

    #[test]
    fn becoming_visible_during_ambient_resumes_on_exit() {
        let mut rig = running();
        rig.core.handle(&LifecycleEvent::Pause).unwrap();
        rig.core.handle(&LifecycleEvent::AmbientChanged(true)).unwrap();
        rig.core.handle(&LifecycleEvent::Resume).unwrap();
        rig.hooks.clear();

        rig.core.handle(&LifecycleEvent::AmbientChanged(false)).unwrap();
        assert_eq!(
            rig.hooks.entries(),
            vec!["ambient_changed(false)", "resume", "time_tick(10:15:30)"]
        );
    }

    #[test]
    fn alarm_fires_deliver_ambient_ticks_until_disarmed() {
        let mut rig = running();
        rig.core.handle(&LifecycleEvent::AmbientChanged(true)).unwrap();
        let alarm = rig.last_alarm();
        rig.hooks.clear();

        rig.clock.set(snapshot(10, 16, 0, 0));
        rig.core.on_alarm_fired(alarm);
        assert_eq!(rig.hooks.entries(), vec!["ambient_tick(10:16)"]);

        rig.core.handle(&LifecycleEvent::AmbientChanged(false)).unwrap();
        rig.hooks.clear();
        rig.core.on_alarm_fired(alarm);
        assert!(rig.hooks.entries().is_empty());
    }

    #[test]
    fn draw_done_is_sent_once_per_ambient_entry() {
        let mut rig = running();
        rig.core.handle(&LifecycleEvent::AmbientChanged(true)).unwrap();
        let alarm = rig.last_alarm();
        rig.core.on_alarm_fired(alarm);
        rig.core.on_alarm_fired(alarm);
        assert_eq!(rig.host.count("peer.draw_done"), 1);
    }

    #[test]
    fn failed_alarm_still_delivers_one_ambient_tick() {
        let mut rig = rig_with(recording_callbacks, true, false);
        rig.core.start(360, 360).unwrap();
        rig.core.handle(&LifecycleEvent::Resume).unwrap();
        rig.hooks.clear();

        rig.core.handle(&LifecycleEvent::AmbientChanged(true)).unwrap();
        assert_eq!(
            rig.hooks.entries(),
            vec!["pause", "ambient_changed(true)", "ambient_tick(10:15)"]
        );
        assert!(!rig.core.ambient_armed());
        assert_eq!(rig.host.count("peer.draw_done"), 1);
    }

    #[test]
    fn wall_clock_jumps_refresh_only_in_ambient() {
        let mut rig = running();
        let jump = AppEvent {
            kind: SystemEventKind::WallClockChanged,
            value: EventValue::None,
        };
        rig.core.dispatch_system_event(jump.clone());
        assert!(rig.hooks.entries().is_empty());

        rig.core.handle(&LifecycleEvent::AmbientChanged(true)).unwrap();
        rig.hooks.clear();
        rig.clock.set(snapshot(22, 0, 5, 0));
        rig.core.dispatch_system_event(jump);
        assert_eq!(rig.hooks.entries(), vec!["ambient_tick(22:00)"]);
    }

    #[test]
    fn without_a_time_tick_hook_no_timer_is_armed() {
        let mut rig = rig_with(
            |hooks| {
                let hooks = hooks.clone();
                LifecycleCallbacks::new()
                    .on_create(|_, _, _| true)
                    .on_resume(move |_| hooks.push("resume"))
            },
            false,
            false,
        );
        rig.core.start(360, 360).unwrap();
        rig.core.handle(&LifecycleEvent::Resume).unwrap();
        assert_eq!(rig.hooks.entries(), vec!["resume"]);
        assert!(!rig.core.time_tick_armed());
        assert_eq!(rig.host.count("timer.arm(750ms)"), 0);
    }

    #[test]
    fn rejected_stimuli_change_nothing() {
        let mut rig = running();
        rig.core.handle(&LifecycleEvent::Pause).unwrap();
        rig.notices();
        let before = rig.core.state();

        let error = rig.core.handle(&LifecycleEvent::Pause).unwrap_err();
        assert!(matches!(error, WatchError::InvalidContext { .. }));
        assert_eq!(rig.core.state(), before);
        assert!(matches!(
            rig.notices().as_slice(),
            [LifecycleNotice::Rejected { stimulus: "pause", .. }]
        ));
    }

    #[test]
    fn create_failure_runs_terminate_only() {
        let mut rig = rig_with(
            |hooks| {
                let (h1, h2, h3) = (hooks.clone(), hooks.clone(), hooks.clone());
                LifecycleCallbacks::new()
                    .on_create(move |_, _, _| {
                        h1.push("create");
                        false
                    })
                    .on_pause(move |_| h2.push("pause"))
                    .on_terminate(move |_| h3.push("terminate"))
            },
            false,
            false,
        );
        let error = rig.core.start(360, 360).unwrap_err();
        assert!(matches!(error, WatchError::CreateFailed));
        assert_eq!(rig.core.lifecycle(), LifecycleState::None);

        rig.core.shutdown();
        assert_eq!(rig.hooks.entries(), vec!["create", "terminate"]);
        assert_eq!(rig.core.lifecycle(), LifecycleState::Dying);
        assert!(rig.registry.active().is_empty());
    }

    #[test]
    fn the_created_surface_is_reachable_until_shutdown() {
        let mut rig = rig();
        assert_eq!(rig.core.surface(), None);
        rig.core.start(360, 360).unwrap();
        assert_eq!(
            rig.core.surface(),
            Some(SurfaceHandle {
                id: SURFACE_ID,
                width: 360,
                height: 360,
            })
        );
        rig.core.shutdown();
        assert_eq!(rig.core.surface(), None);
    }

    #[test]
    fn current_time_reads_the_injected_clock() {
        let rig = rig();
        rig.clock.set(snapshot(23, 59, 58, 120));
        assert_eq!(rig.core.current_time(), snapshot(23, 59, 58, 120));
    }

    #[test]
    fn surface_failure_skips_create() {
        let mut rig = rig_with(recording_callbacks, false, true);
        let error = rig.core.start(360, 360).unwrap_err();
        assert!(matches!(error, WatchError::Surface { .. }));
        assert!(rig.hooks.entries().is_empty());
        assert!(rig.registry.active().is_empty());
    }

    #[test]
    fn terminate_requests_exit_once() {
        let mut rig = running();
        rig.core.handle(&LifecycleEvent::Terminate).unwrap();
        assert!(rig.core.exit_requested());
        assert_eq!(rig.core.lifecycle(), LifecycleState::Dying);
        assert!(rig.core.handle(&LifecycleEvent::Terminate).is_err());
        // The host terminate path does not call user hooks by itself.
        assert!(rig.hooks.entries().is_empty());
    }

    #[test]
    fn shutdown_from_running_pauses_terminates_and_releases() {
        let mut rig = running();
        rig.core.shutdown();

        assert_eq!(rig.hooks.entries(), vec!["pause", "terminate"]);
        let host = rig.host.entries();
        assert_eq!(host[0], "timer.cancel");
        assert!(host.contains(&"alarm.fini".to_string()));
        assert_eq!(host.last().map(String::as_str), Some("surface.destroy"));
        assert!(rig.registry.active().is_empty());
        assert!(!rig.core.time_tick_armed());
    }

    #[test]
    fn shutdown_after_a_host_terminate_skips_pause() {
        let mut rig = running();
        rig.core.handle(&LifecycleEvent::Terminate).unwrap();
        rig.core.shutdown();
        assert_eq!(rig.hooks.entries(), vec!["terminate"]);
    }

    #[test]
    fn launch_requests_reach_app_control() {
        let mut rig = rig();
        rig.core.start(360, 360).unwrap();
        let bundle: LaunchBundle = [
            (OPERATION_KEY.to_string(), "org.example/operation/view".to_string()),
            (CALLER_KEY.to_string(), "org.example.launcher".to_string()),
        ]
        .into_iter()
        .collect();
        rig.core.deliver_launch(&bundle).unwrap();
        assert_eq!(
            rig.hooks.entries(),
            vec!["create(360x360)", "app_control(org.example/operation/view)"]
        );
    }

    #[test]
    fn undecodable_launch_requests_skip_the_hook() {
        let mut rig = rig();
        rig.core.start(360, 360).unwrap();
        let bundle: LaunchBundle = [(OPERATION_KEY.to_string(), String::new())]
            .into_iter()
            .collect();
        let error = rig.core.deliver_launch(&bundle).unwrap_err();
        assert!(matches!(error, WatchError::InvalidParameter { .. }));
        assert_eq!(rig.hooks.entries(), vec!["create(360x360)"]);
    }

    #[test]
    fn low_battery_subscription_follows_its_handlers() {
        let mut rig = running();
        let handler: EventCallback = Arc::new(|_: &AppEvent| {});
        let id = rig
            .core
            .add_event_handler(SystemEventKind::LowBattery, handler)
            .unwrap();
        assert!(rig.core.is_subscribed(SystemEventKind::LowBattery));
        assert_eq!(rig.host.entries(), vec!["registry.subscribe(low-battery)"]);

        rig.core.remove_event_handler(id).unwrap();
        assert!(!rig.core.is_subscribed(SystemEventKind::LowBattery));
        assert_eq!(rig.host.count("registry.unsubscribe(low-battery)"), 1);
        assert!(rig.core.remove_event_handler(id).is_err());
    }

    #[test]
    fn low_battery_handlers_added_before_start_subscribe_at_create() {
        let mut rig = rig();
        rig.core
            .add_event_handler(SystemEventKind::LowBattery, Arc::new(|_: &AppEvent| {}))
            .unwrap();
        assert!(rig.host.entries().is_empty());
        rig.core.start(360, 360).unwrap();
        assert!(rig.core.is_subscribed(SystemEventKind::LowBattery));
    }

    #[test]
    fn system_events_fan_out_to_handlers() {
        let mut rig = running();
        let seen = Journal::default();
        let log = seen.clone();
        rig.core
            .add_event_handler(
                SystemEventKind::LanguageChanged,
                Arc::new(move |event: &AppEvent| {
                    if let EventValue::Text(tag) = &event.value {
                        log.push(tag.clone());
                    }
                }),
            )
            .unwrap();
        rig.core.dispatch_system_event(AppEvent {
            kind: SystemEventKind::LanguageChanged,
            value: EventValue::Text("de_DE".into()),
        });
        assert_eq!(seen.entries(), vec!["de_DE"]);
    }

    #[test]
    fn exit_envelopes_only_request_exit() {
        let mut rig = running();
        rig.core.dispatch(Envelope::Exit);
        rig.core.dispatch(Envelope::Exit);
        assert!(rig.core.exit_requested());
        assert_eq!(rig.core.lifecycle(), LifecycleState::Running);
    }

    #[test]
    fn lifecycle_envelopes_are_acknowledged() {
        let mut rig = running();
        let (reply, mut ack) = oneshot::channel();
        rig.core.dispatch(Envelope::Lifecycle {
            event: LifecycleEvent::Pause,
            reply,
        });
        assert!(matches!(ack.try_recv(), Ok(Ok(()))));

        let (reply, mut ack) = oneshot::channel();
        rig.core.dispatch(Envelope::Lifecycle {
            event: LifecycleEvent::Pause,
            reply,
        });
        assert!(matches!(ack.try_recv(), Ok(Err(WatchError::InvalidContext { .. }))));
    }

    #[test]
    fn state_changes_are_broadcast() {
        let mut rig = rig();
        rig.core.start(360, 360).unwrap();
        rig.core.handle(&LifecycleEvent::Resume).unwrap();
        let transitions: Vec<_> = rig
            .notices()
            .into_iter()
            .filter_map(|notice| match notice {
                LifecycleNotice::StateChanged { from, to } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                (LifecycleState::None, LifecycleState::Created),
                (LifecycleState::Created, LifecycleState::Running),
            ]
        );
    }
}
