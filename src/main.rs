use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use anyhow::Result;
use clap::{App, load_yaml};
use env_logger::Builder;
use jemallocator::Jemalloc;
use log::info;
use log::LevelFilter::*;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag::register;
use tokio::runtime::Runtime;
use shadow::{args, plugin};
use shadow::emitter::Emitter;

#[global_allocator]
static ALLOC: Jemalloc = Jemalloc;

fn main() -> Result<()> {
    let yaml = load_yaml!("args.yml");
    let ver  = env!("CARGO_PKG_VERSION");
    let args = App::from_yaml(&yaml).version(ver).get_matches();

    let (module, level) = match args.occurrences_of("verbose") {
        0 => (Some("shadow"), Info),
        1 => (Some("shadow"), Debug),
        2 => (Some("shadow"), Trace),
        _ => (None,           Trace),
    };
    Builder::from_default_env().filter(module, level).init();

    let settings = args::settings(&args)?;

    info!("initializing shadow {}", ver);

    let shutdown = Arc::new(AtomicBool::new(false));
    register(SIGTERM, shutdown.clone())?;
    register(SIGINT,  shutdown.clone())?;

    if let Some(after) = settings.exit_after {
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            thread::sleep(after);
            info!("exiting after {:?}", after);
            shutdown.store(true, Ordering::Release);
        });
    }

    let runtime = Runtime::new()?;
    let plugins = plugin::init(&settings, runtime.handle())?;

    Emitter::new(plugins).run(shutdown);
    runtime.shutdown_timeout(Duration::from_secs(1));

    info!("shutdown complete");

    Ok(())
}
