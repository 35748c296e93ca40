mod actions;
mod cli;
mod config;
mod debounce;
mod dispatch;
mod error;
mod geometry;
mod gestures;
mod input;
mod ipc;
mod landmarks;
mod logging;
mod media;
mod tracker;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
