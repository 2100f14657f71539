//! The application's lifecycle callback record.
//!
//! A [`LifecycleCallbacks`] is a fixed set of optional hooks. Every hook gets
//! `&mut D`, the user data owned by the running app, instead of capturing
//! shared state. Absent hooks are no-ops, except `create`, which is mandatory.

use crate::events::AppControl;
use crate::time::TimeSnapshot;

/// Version tag of the callback record layout. New hooks bump the schema
/// rather than hiding in reserved slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallbackSchema {
    #[default]
    V1,
}

pub type CreateHook<D> = Box<dyn FnMut(u32, u32, &mut D) -> bool + Send>;
pub type AppControlHook<D> = Box<dyn FnMut(&AppControl, &mut D) + Send>;
pub type StateHook<D> = Box<dyn FnMut(&mut D) + Send>;
pub type TickHook<D> = Box<dyn FnMut(&TimeSnapshot, &mut D) + Send>;
pub type AmbientChangedHook<D> = Box<dyn FnMut(bool, &mut D) + Send>;

/// The set of user hooks driven by the lifecycle state machine.
pub struct LifecycleCallbacks<D> {
    pub schema: CallbackSchema,
    /// Called once with the surface size. Returning `false` aborts startup.
    pub create: Option<CreateHook<D>>,
    /// Called for every launch request, including the one that started the app.
    pub app_control: Option<AppControlHook<D>>,
    pub pause: Option<StateHook<D>>,
    pub resume: Option<StateHook<D>>,
    /// Called once after the loop exits.
    pub terminate: Option<StateHook<D>>,
    /// Called on every second boundary while visible and not ambient.
    pub time_tick: Option<TickHook<D>>,
    /// Called on every minute boundary in ambient mode. Keep it short: the
    /// device may be suspended right after it returns.
    pub ambient_tick: Option<TickHook<D>>,
    pub ambient_changed: Option<AmbientChangedHook<D>>,
}

impl<D> Default for LifecycleCallbacks<D> {
    fn default() -> Self {
        Self {
            schema: CallbackSchema::V1,
            create: None,
            app_control: None,
            pause: None,
            resume: None,
            terminate: None,
            time_tick: None,
            ambient_tick: None,
            ambient_changed: None,
        }
    }
}

impl<D> LifecycleCallbacks<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_create(mut self, hook: impl FnMut(u32, u32, &mut D) -> bool + Send + 'static) -> Self {
        self.create = Some(Box::new(hook));
        self
    }

    pub fn on_app_control(mut self, hook: impl FnMut(&AppControl, &mut D) + Send + 'static) -> Self {
        self.app_control = Some(Box::new(hook));
        self
    }

    pub fn on_pause(mut self, hook: impl FnMut(&mut D) + Send + 'static) -> Self {
        self.pause = Some(Box::new(hook));
        self
    }

    pub fn on_resume(mut self, hook: impl FnMut(&mut D) + Send + 'static) -> Self {
        self.resume = Some(Box::new(hook));
        self
    }

    pub fn on_terminate(mut self, hook: impl FnMut(&mut D) + Send + 'static) -> Self {
        self.terminate = Some(Box::new(hook));
        self
    }

    pub fn on_time_tick(mut self, hook: impl FnMut(&TimeSnapshot, &mut D) + Send + 'static) -> Self {
        self.time_tick = Some(Box::new(hook));
        self
    }

    pub fn on_ambient_tick(
        mut self,
        hook: impl FnMut(&TimeSnapshot, &mut D) + Send + 'static,
    ) -> Self {
        self.ambient_tick = Some(Box::new(hook));
        self
    }

    pub fn on_ambient_changed(mut self, hook: impl FnMut(bool, &mut D) + Send + 'static) -> Self {
        self.ambient_changed = Some(Box::new(hook));
        self
    }
}

impl<D> std::fmt::Debug for LifecycleCallbacks<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCallbacks")
            .field("schema", &self.schema)
            .field("create", &self.create.is_some())
            .field("app_control", &self.app_control.is_some())
            .field("pause", &self.pause.is_some())
            .field("resume", &self.resume.is_some())
            .field("terminate", &self.terminate.is_some())
            .field("time_tick", &self.time_tick.is_some())
            .field("ambient_tick", &self.ambient_tick.is_some())
            .field("ambient_changed", &self.ambient_changed.is_some())
            .finish()
    }
}
