use anyhow::Result;
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use watchface::events::OPERATION_KEY;
use watchface::prelude::*;
use watchface::{ENGINE_NAME, VERSION as LIB_VERSION};

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct ShellHighlighter;

impl Highlighter for ShellHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

/// What the simulated face remembers between callbacks.
#[derive(Debug, Default)]
struct ShellFace {
    frames: u64,
    ambient_frames: u64,
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    let rule = "-".repeat(72);
    println!("{}", rule.dimmed());
    println!("{}", version_string);
    println!(
        "{}",
        "    This software is provided 'as is', without warranty of any kind.".dimmed()
    );
    println!("{}", rule.dimmed());
}

fn print_help() {
    println!("Available commands:");
    println!("  pause                 - The host hides the face.");
    println!("  resume                - The host shows the face.");
    println!("  ambient on|off        - The device enters or leaves ambient mode.");
    println!("  control <OP> [K=V..]  - Sends a launch request with operation OP.");
    println!("  event <KIND> [VALUE]  - Sends a system event (low-memory, low-battery, language, region).");
    println!("  clock                 - Reports a wall clock change.");
    println!("  time                  - Reads the face's clock.");
    println!("  surface               - Shows the surface the face draws on.");
    println!("  on <KIND>             - Registers a handler that prints KIND events.");
    println!("  off <H>               - Removes a handler by its shell handle.");
    println!("  list                  - Shows registered handlers.");
    println!("  watch                 - Begins printing tick notices.");
    println!("  unwatch               - Stops printing tick notices.");
    println!("  terminate             - The host terminates the face.");
    println!("  exit                  - Asks the face to exit and quits the shell.");
}

fn shell_callbacks() -> LifecycleCallbacks<ShellFace> {
    LifecycleCallbacks::<ShellFace>::new()
        .on_create(|width, height, _| {
            println!("<-- [FACE] create {}x{}", width, height);
            true
        })
        .on_app_control(|control, _| {
            println!(
                "<-- [FACE] app control {} {:?}",
                control.operation.green(),
                control.extra
            )
        })
        .on_pause(|_| println!("<-- [FACE] pause"))
        .on_resume(|_| println!("<-- [FACE] resume"))
        .on_terminate(|face| {
            println!(
                "<-- [FACE] terminate after {} frames, {} ambient frames",
                face.frames, face.ambient_frames
            )
        })
        .on_time_tick(|_, face| face.frames += 1)
        .on_ambient_tick(|_, face| face.ambient_frames += 1)
        .on_ambient_changed(|ambient, _| println!("<-- [FACE] ambient changed: {}", ambient))
}

/// Prints lifecycle notices; ticks only while `watching_ticks` is set.
fn spawn_notice_listener(handle: &AppHandle, watching_ticks: Arc<AtomicBool>) {
    let mut notices = handle.subscribe_lifecycle_events();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice {
                LifecycleNotice::TimeTick { snapshot, next_in } => {
                    if watching_ticks.load(Ordering::Relaxed) {
                        println!(
                            "<-- [TICK] {:02}:{:02}:{:02} (next in {}ms)",
                            snapshot.hour24,
                            snapshot.minute,
                            snapshot.second,
                            next_in.as_millis()
                        );
                    }
                }
                LifecycleNotice::AmbientTick { snapshot } => {
                    if watching_ticks.load(Ordering::Relaxed) {
                        println!(
                            "<-- [AMBIENT TICK] {:02}:{:02}",
                            snapshot.hour24, snapshot.minute
                        );
                    }
                }
                LifecycleNotice::Rejected { stimulus, reason } => {
                    println!("<-- [REJECTED] {}: {}", stimulus.red(), reason);
                }
                LifecycleNotice::Exited => {
                    println!("<-- [NOTICE] {:?}", notice);
                    break;
                }
                other => println!("<-- [NOTICE] {:?}", other),
            }
        }
    });
}

fn report(result: Result<(), WatchError>) {
    match result {
        Ok(()) => println!("--> ok"),
        Err(e) => println!("--> {} ({})", e.to_string().red(), e.code().as_i32()),
    }
}

fn parse_event_value(raw: Option<&&str>) -> EventValue {
    match raw {
        None => EventValue::None,
        Some(text) => match text.parse::<i32>() {
            Ok(level) => EventValue::Level(level),
            Err(_) => EventValue::Text(text.to_string()),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config_path = env::var("WATCHSHELL_CONFIG").ok();
    let config = WatchConfig::load(config_path.as_deref().map(std::path::Path::new))?;
    let mut app = WatchApp::new(config, shell_callbacks(), ShellFace::default())?;
    let handle = app.handle();

    // Create the shared flag for the tick printer.
    let watching_ticks = Arc::new(AtomicBool::new(false));
    spawn_notice_listener(&handle, watching_ticks.clone());

    info!("Spawning {} in the background...", ENGINE_NAME.cyan());
    let engine = tokio::spawn(async move {
        if let Err(e) = app.run(LaunchBundle::new()).await {
            eprintln!("\nFace stopped with an error: {}", e);
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    // Shell handles for the handlers registered from the prompt.
    let mut active_handlers: BTreeMap<usize, (SystemEventKind, HandlerId)> = BTreeMap::new();
    let mut next_handle: usize = 0;

    let mut rl = Editor::new()?;
    rl.set_helper(Some(ShellHighlighter));

    println!(
        "{} is running. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting watchshell...");
                handle.exit();
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;
        let args = line.split_whitespace().collect::<Vec<_>>();
        let Some(command) = args.first() else {
            continue;
        };

        match *command {
            "pause" => report(handle.pause().await),
            "resume" => report(handle.resume().await),
            "ambient" => match args.get(1) {
                Some(&"on") => report(handle.ambient(true).await),
                Some(&"off") => report(handle.ambient(false).await),
                _ => println!("Usage: ambient on|off"),
            },
            "control" => {
                let Some(operation) = args.get(1) else {
                    println!("Usage: control <OPERATION> [KEY=VALUE ...]");
                    continue;
                };
                let mut bundle = LaunchBundle::new();
                bundle.insert(OPERATION_KEY.to_string(), operation.to_string());
                for pair in &args[2..] {
                    if let Some((key, value)) = pair.split_once('=') {
                        bundle.insert(key.to_string(), value.to_string());
                    }
                }
                report(handle.app_control(bundle).await);
            }
            "event" => match args.get(1).and_then(|name| SystemEventKind::from_name(name)) {
                Some(kind) => {
                    report(handle.system_event(kind, parse_event_value(args.get(2))).await)
                }
                None => println!("Usage: event low-memory|low-battery|language|region [VALUE]"),
            },
            "clock" => report(handle.wall_clock_changed().await),
            "time" => match handle.current_time().await {
                Ok(now) => println!(
                    "--> {:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03} {}",
                    now.year,
                    now.month,
                    now.day,
                    now.hour24,
                    now.minute,
                    now.second,
                    now.millisecond,
                    now.timezone()
                ),
                Err(e) => println!("--> {}", e.to_string().red()),
            },
            "surface" => match handle.surface().await {
                Ok(surface) => println!(
                    "--> Surface #{} ({}x{})",
                    surface.id, surface.width, surface.height
                ),
                Err(e) => println!("--> {}", e.to_string().red()),
            },
            "on" => match args.get(1).and_then(|name| SystemEventKind::from_name(name)) {
                Some(kind) => {
                    let callback: EventCallback = Arc::new(|event: &AppEvent| {
                        println!("<-- [EVENT] {} {:?}", event.kind, event.value)
                    });
                    match handle.add_event_handler(kind, callback).await {
                        Ok(id) => {
                            let shell_handle = next_handle;
                            active_handlers.insert(shell_handle, (kind, id));
                            next_handle += 1;
                            println!("--> Added {} handler with handle: #{}", kind, shell_handle);
                        }
                        Err(e) => println!("--> {}", e.to_string().red()),
                    }
                }
                None => println!("Usage: on low-memory|low-battery|language|region"),
            },
            "off" => match args.get(1).and_then(|raw| raw.parse::<usize>().ok()) {
                Some(shell_handle) => match active_handlers.remove(&shell_handle) {
                    Some((_, id)) => report(handle.remove_event_handler(id).await),
                    None => println!(
                        "Error: Invalid handle #{}. Use 'list' to see handlers.",
                        shell_handle
                    ),
                },
                None => println!("Usage: off <HANDLE>"),
            },
            "list" => {
                println!("Registered handlers:");
                for (shell_handle, (kind, id)) in &active_handlers {
                    println!("  Handle #{}: {} ({:?})", shell_handle, kind, id);
                }
            }
            "watch" => {
                watching_ticks.store(true, Ordering::Relaxed);
                println!("--> Started printing ticks.");
            }
            "unwatch" => {
                watching_ticks.store(false, Ordering::Relaxed);
                println!("--> Stopped printing ticks.");
            }
            "terminate" => {
                report(handle.terminate().await);
                break;
            }
            "help" => print_help(),
            "exit" => {
                handle.exit();
                break;
            }
            _ => println!("Unknown command: '{}'. Type 'help'.", line),
        }
    }

    engine.await?;
    Ok(())
}
