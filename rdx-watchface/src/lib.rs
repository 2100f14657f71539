//! # Watchface
//!
//! The lifecycle core of a wearable watch face.
//!
//! A watch face is an application with two display modes. While it is visible
//! it redraws every second; when the device drops into its low-power ambient
//! mode it redraws once a minute, woken by an alarm that keeps firing while the
//! process is suspended. This crate owns the rules that tie those timers to
//! the application's lifecycle, so the face itself only has to draw.
//!
//! ## Core Concepts
//!
//! - **Lifecycle**: a face moves through `Created`, `Running`, `Paused` and
//!   `Dying`, with an independent ambient flag on top. The transition rules
//!   are a pure function in [`components::lifecycle`].
//! - **Ticks**: a foreground one-shot timer re-armed to the next second
//!   boundary, and an ambient alarm aligned to the next minute. Neither trusts
//!   a cached clock reading.
//! - **Single loop**: all state lives on the task running [`WatchApp::run`].
//!   Other tasks post stimuli through an [`AppHandle`].
//! - **Host collaborators**: surfaces, timers, alarms, system events and the
//!   ambient peer are traits in [`host`], with tokio-backed defaults.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use watchface::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let callbacks = LifecycleCallbacks::<u64>::new()
//!         .on_create(|width, height, _| {
//!             println!("Drawing on a {width}x{height} surface");
//!             true
//!         })
//!         .on_time_tick(|now, frames| {
//!             *frames += 1;
//!             println!("{:02}:{:02}:{:02}", now.hour24, now.minute, now.second);
//!         })
//!         .on_ambient_tick(|now, _| println!("ambient {:02}:{:02}", now.hour, now.minute));
//!
//!     let mut app = WatchApp::new(WatchConfig::default(), callbacks, 0)?;
//!
//!     // Make the face visible once the loop is up, and stop on Ctrl+C.
//!     let handle = app.handle();
//!     tokio::spawn(async move {
//!         handle.resume().await.ok();
//!         tokio::signal::ctrl_c().await.ok();
//!         handle.exit();
//!     });
//!
//!     app.run(LaunchBundle::new()).await?;
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Watchface Core";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod app;
pub mod callbacks;
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod host;
pub mod time;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{AppHandle, WatchApp};

/// A prelude module for easy importing of the most common watchface types.
pub mod prelude {
    pub use crate::app::{AppHandle, WatchApp};
    pub use crate::callbacks::{CallbackSchema, LifecycleCallbacks};
    pub use crate::common::{AppIdentity, HandlerId};
    pub use crate::components::lifecycle::LifecycleState;
    pub use crate::components::subscriptions::EventCallback;
    pub use crate::config::WatchConfig;
    pub use crate::error::{ErrorCode, WatchError};
    pub use crate::events::{
        AppControl, AppEvent, EventValue, LaunchBundle, LifecycleNotice, SystemEventKind,
    };
    pub use crate::host::SurfaceHandle;
    pub use crate::time::TimeSnapshot;
}
