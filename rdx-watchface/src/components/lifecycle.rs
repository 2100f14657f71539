//! The lifecycle state machine, expressed as a pure transition function.
//!
//! [`transition`] takes the current [`AppState`] and one [`LifecycleEvent`] and
//! returns either a [`Rejection`] (the call is invalid in this state and must
//! be a logged no-op) or a [`Transition`]: the resulting state plus the ordered
//! list of [`Effect`]s the engine has to carry out. State assignments appear in
//! the effect list at the exact point they happen, so an executor replaying the
//! list observes the same intermediate states the callbacks would.
//!
//! Two axes are tracked: the coarse lifecycle state and the ambient flag. The
//! interaction rules between them live here and nowhere else.

use crate::events::AppControl;
use std::fmt;
use thiserror::Error;

/// The coarse run state of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    #[default]
    None,
    Created,
    Running,
    Paused,
    Dying,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Dying => "dying",
        };
        f.write_str(name)
    }
}

/// The mutable part of the application state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppState {
    pub lifecycle: LifecycleState,
    pub ambient: bool,
    /// Set when a resume must not be replayed on leaving ambient mode.
    pub skip_resume: bool,
}

/// One external stimulus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Create { width: u32, height: u32 },
    AppControl(AppControl),
    Pause,
    Resume,
    AmbientChanged(bool),
    /// Termination requested by the host.
    Terminate,
    /// Runs once after the loop has exited.
    Shutdown,
    TimeTickFired,
    AmbientAlarmFired,
    WallClockChanged,
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::AppControl(_) => "app-control",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::AmbientChanged(true) => "ambient-enter",
            Self::AmbientChanged(false) => "ambient-exit",
            Self::Terminate => "terminate",
            Self::Shutdown => "shutdown",
            Self::TimeTickFired => "time-tick",
            Self::AmbientAlarmFired => "ambient-alarm",
            Self::WallClockChanged => "wall-clock-changed",
        }
    }
}

/// A user callback invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hook {
    Create { width: u32, height: u32 },
    AppControl(AppControl),
    Pause,
    Resume,
    Terminate,
    AmbientChanged(bool),
}

/// One step of a transition, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Enter(LifecycleState),
    SetAmbient(bool),
    SetSkipResume(bool),
    Invoke(Hook),
    /// Cancel the foreground timer. Idempotent.
    CancelTimeTick,
    /// Read the clock, arm the next foreground timer, deliver a time tick.
    StartTimeTick,
    /// Arm the ambient alarm at the next minute boundary and deliver one
    /// ambient tick immediately.
    StartAmbientTick,
    /// Disarm the ambient alarm. Idempotent.
    StopAmbientTick,
    /// Deliver one ambient tick without touching the alarm.
    AmbientTick,
    NotifyDrawDone,
    InitAlarm,
    ExitLoop,
    ReleaseResources,
}

/// The outcome of an accepted stimulus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: AppState,
    pub effects: Vec<Effect>,
}

/// A stimulus that is invalid in the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stimulus} rejected while {state} (ambient: {ambient}): {reason}")]
pub struct Rejection {
    pub stimulus: &'static str,
    pub state: LifecycleState,
    pub ambient: bool,
    pub reason: &'static str,
}

/// Decides what `event` does to `state`.
pub fn transition(state: &AppState, event: &LifecycleEvent) -> Result<Transition, Rejection> {
    let mut plan = Plan::new(*state, event.name());
    match event {
        LifecycleEvent::Create { width, height } => {
            if state.lifecycle != LifecycleState::None {
                return Err(plan.reject("the application was already created"));
            }
            plan.push(Effect::Invoke(Hook::Create {
                width: *width,
                height: *height,
            }));
            plan.enter(LifecycleState::Created);
            plan.push(Effect::InitAlarm);
        }
        LifecycleEvent::AppControl(control) => match state.lifecycle {
            LifecycleState::Created | LifecycleState::Running | LifecycleState::Paused => {
                plan.push(Effect::Invoke(Hook::AppControl(control.clone())));
            }
            _ => return Err(plan.reject("app control outside the lifecycle window")),
        },
        LifecycleEvent::Pause => match state.lifecycle {
            LifecycleState::Created | LifecycleState::Running => plan.pause(),
            // Ambient entry already paused the face; the host hiding it must
            // still stop the resume that would follow ambient exit.
            LifecycleState::Paused if state.ambient => plan.pause(),
            LifecycleState::Paused => return Err(plan.reject("already paused")),
            _ => return Err(plan.reject("nothing to pause")),
        },
        LifecycleEvent::Resume => match state.lifecycle {
            LifecycleState::None | LifecycleState::Dying => {
                return Err(plan.reject("nothing to resume"))
            }
            _ if state.ambient => plan.set_skip_resume(false),
            _ => plan.resume(),
        },
        LifecycleEvent::AmbientChanged(entering) => {
            if matches!(
                state.lifecycle,
                LifecycleState::None | LifecycleState::Dying
            ) {
                return Err(plan.reject("ambient change outside the lifecycle window"));
            }
            if state.ambient == *entering {
                return Err(plan.reject("ambient mode is already in that state"));
            }
            if *entering {
                plan.enter_ambient();
            } else {
                plan.exit_ambient();
            }
        }
        LifecycleEvent::Terminate => {
            if state.lifecycle == LifecycleState::Dying {
                return Err(plan.reject("already terminating"));
            }
            plan.enter(LifecycleState::Dying);
            plan.push(Effect::ExitLoop);
        }
        LifecycleEvent::Shutdown => {
            if state.lifecycle == LifecycleState::Running {
                plan.push(Effect::Invoke(Hook::Pause));
            }
            plan.enter(LifecycleState::Dying);
            plan.push(Effect::CancelTimeTick);
            plan.push(Effect::Invoke(Hook::Terminate));
            plan.push(Effect::ReleaseResources);
        }
        LifecycleEvent::TimeTickFired => {
            if state.lifecycle == LifecycleState::Running && !state.ambient {
                plan.push(Effect::StartTimeTick);
            }
        }
        LifecycleEvent::AmbientAlarmFired | LifecycleEvent::WallClockChanged => {
            if state.ambient && state.lifecycle != LifecycleState::Running {
                plan.push(Effect::AmbientTick);
            }
        }
    }
    Ok(plan.finish())
}

/// Accumulates effects while tracking the state they produce.
struct Plan {
    state: AppState,
    stimulus: &'static str,
    effects: Vec<Effect>,
}

impl Plan {
    fn new(state: AppState, stimulus: &'static str) -> Self {
        Self {
            state,
            stimulus,
            effects: Vec::new(),
        }
    }

    fn reject(&self, reason: &'static str) -> Rejection {
        Rejection {
            stimulus: self.stimulus,
            state: self.state.lifecycle,
            ambient: self.state.ambient,
            reason,
        }
    }

    fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    fn enter(&mut self, lifecycle: LifecycleState) {
        self.state.lifecycle = lifecycle;
        self.push(Effect::Enter(lifecycle));
    }

    fn set_ambient(&mut self, ambient: bool) {
        self.state.ambient = ambient;
        self.push(Effect::SetAmbient(ambient));
    }

    fn set_skip_resume(&mut self, skip: bool) {
        self.state.skip_resume = skip;
        self.push(Effect::SetSkipResume(skip));
    }

    fn pause(&mut self) {
        if self.state.ambient {
            self.set_skip_resume(true);
        }
        self.push(Effect::CancelTimeTick);
        if self.state.lifecycle == LifecycleState::Running {
            self.push(Effect::Invoke(Hook::Pause));
        }
        self.enter(LifecycleState::Paused);
    }

    fn resume(&mut self) {
        if matches!(
            self.state.lifecycle,
            LifecycleState::Paused | LifecycleState::Created
        ) {
            self.push(Effect::Invoke(Hook::Resume));
        }
        self.enter(LifecycleState::Running);
        self.push(Effect::CancelTimeTick);
        self.push(Effect::StartTimeTick);
    }

    fn enter_ambient(&mut self) {
        if self.state.lifecycle != LifecycleState::Paused {
            self.pause();
            self.set_skip_resume(false);
        } else {
            self.set_skip_resume(true);
        }
        self.set_ambient(true);
        self.push(Effect::Invoke(Hook::AmbientChanged(true)));
        self.push(Effect::StartAmbientTick);
        self.push(Effect::NotifyDrawDone);
    }

    fn exit_ambient(&mut self) {
        self.set_ambient(false);
        self.push(Effect::Invoke(Hook::AmbientChanged(false)));
        if !self.state.skip_resume {
            self.resume();
        }
        self.push(Effect::StopAmbientTick);
    }

    fn finish(self) -> Transition {
        Transition {
            next: self.state,
            effects: self.effects,
        }
    }
}
