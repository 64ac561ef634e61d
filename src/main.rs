//! rebind-demo - drive the hotkey subsystem against real devices.
//!
//! A stand-in composition root: wires the gilrs pad driver and the rdev
//! keyboard hook into the registry, loads the bindings file, and exposes a
//! tiny stdin prompt for triggering interactive rebinds.

use anyhow::Result;
use clap::{Arg, Command};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rebind::input::keys_rdev::RdevHookBackend;
use rebind::input::pad_gilrs::GilrsPadDriver;
use rebind::input::{KeySource, PadSource};
use rebind::{Action, HotkeyRegistry, RebindCoordinator, Scheduler};

fn main() -> Result<()> {
    // Initialize logging for development
    env_logger::init();

    let matches = Command::new("rebind-demo")
        .version(rebind::VERSION)
        .about("Exercise the hotkey binding subsystem against real devices")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Path to the bindings file (defaults to the platform config dir)"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECS")
                .default_value("10")
                .help("How long a rebind listens before giving up"),
        )
        .get_matches();

    let config = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(HotkeyRegistry::default_config_path);
    let timeout_secs: f64 = matches
        .get_one::<String>("timeout")
        .expect("timeout has a default")
        .parse()?;
    let timeout = Duration::from_secs_f64(timeout_secs);

    // Composition root: everything is owned here and injected down.
    let pad = Arc::new(PadSource::new(GilrsPadDriver::new()?));
    let keys = Arc::new(KeySource::new(RdevHookBackend::new()));
    let registry = Arc::new(HotkeyRegistry::new(pad, keys));
    let scheduler = Arc::new(Scheduler::new());
    let coordinator = RebindCoordinator::new(Arc::clone(&registry), Arc::clone(&scheduler));

    for action in Action::all() {
        let action = *action;
        registry.set_callback(action, Arc::new(move || println!("-> {action}")));
    }
    registry.start();
    registry.load(&config);

    println!("{}", registry.format_bindings());
    println!("Enter an action number to rebind it, or q to quit:");
    for (index, action) in Action::all().iter().enumerate() {
        println!("  {index}: {action}");
    }

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.eq_ignore_ascii_case("q") {
            break;
        }
        let Ok(index) = line.parse::<usize>() else {
            continue;
        };
        let Some(action) = Action::all().get(index).copied() else {
            println!("no action {index}");
            continue;
        };

        println!("press a pad button or key to bind '{action}'...");
        let registry_for_apply = Arc::clone(&registry);
        let config_for_apply = config.clone();
        coordinator.start_interactive_rebind(action, timeout, move |action, binding| {
            match binding {
                Some(binding) => println!("'{action}' bound to '{binding}'"),
                None => println!("rebind for '{action}' timed out"),
            }
            registry_for_apply.register_bindings();
            if let Err(err) = registry_for_apply.save(&config_for_apply) {
                eprintln!("could not save bindings: {err}");
            }
        });
    }

    registry.stop();
    scheduler.stop();
    Ok(())
}
