//! Daemon process: control socket, frame pipeline, hotkey and profile watchers.

mod pipeline;
mod runtime;
mod server;

pub use server::{client_request, run_daemon};
