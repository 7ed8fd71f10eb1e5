mod app;

use std::path::PathBuf;

use anyhow::Context;
use shamble_runtime::{DemoConfig, RuntimeEvent};
use winit::event_loop::EventLoop;

use crate::app::App;

const DEFAULT_CONFIG: &str = "shamble.toml";
const DEFAULT_LOG_FILTER: &str = "warn,shamble=info,shamble_runtime=info";

fn load_config() -> anyhow::Result<DemoConfig> {
    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => DemoConfig::load(&path)
            .with_context(|| format!("could not load config from {}", path.display())),
        None => DemoConfig::load_or_default(DEFAULT_CONFIG).context("could not load config"),
    }
}

fn run_app(event_loop: EventLoop<RuntimeEvent>, mut app: App) -> anyhow::Result<()> {
    event_loop
        .run_app(&mut app)
        .context("event loop exited with an error")
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_LOG_FILTER))
        .init();

    let config = load_config()?;
    let event_loop = EventLoop::<RuntimeEvent>::with_user_event()
        .build()
        .context("could not create the event loop")?;

    let app = App::new(&event_loop, config);
    run_app(event_loop, app)
}
