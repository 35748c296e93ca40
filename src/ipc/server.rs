use anyhow::{Result, anyhow};
use log::{error, info, warn};
use notify::{Event, RecursiveMode, Watcher};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    io::{BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
    },
    thread,
    time::Duration,
};

use super::pipeline::{PipelineMsg, run_pipeline};
use super::runtime::socket_path;
use crate::actions::{InputSink, UinputSink};
use crate::config::{DaemonConfigState, Profile};
use crate::debounce::GestureDebouncer;
use crate::dispatch::ActionDispatcher;
use crate::input;
use crate::landmarks::JsonLinesSource;
use crate::media::{KeyMediaController, MediaController, NoMedia};

type Reply = Sender<std::result::Result<String, String>>;

enum IpcMsg {
    Reload(Reply),
    UseProfile(String, Reply),
    Toggled,
    Shutdown,
}

enum DaemonEvent {
    ProfileChanged,
    PipelineExited(std::result::Result<u64, String>),
}

fn build_media(profile: &Profile) -> Box<dyn MediaController> {
    if profile.media.is_empty() {
        return Box::new(NoMedia);
    }
    match KeyMediaController::from_bindings(&profile.media) {
        Ok(m) => Box::new(m),
        Err(e) => {
            warn!("media bindings unusable ({e}); media mode disabled");
            Box::new(NoMedia)
        }
    }
}

pub fn run_daemon(source_override: Option<String>) -> Result<()> {
    // socket
    let sock = socket_path()?;
    if sock.exists() {
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    // state
    let mut cfg = DaemonConfigState::load_or_install_default()?;
    if let Some(src) = source_override {
        cfg.profile.meta.source = src;
    }
    info!("daemon: active profile '{}'", cfg.active_name);

    let sink: Box<dyn InputSink> = match UinputSink::new() {
        Ok(s) => Box::new(s),
        Err(e) => {
            warn!("uinput unavailable ({e}); actions will be dropped");
            Box::new(UinputSink::noop())
        }
    };
    let dispatcher = ActionDispatcher::new(sink, build_media(&cfg.profile));
    let engine = Arc::new(GestureDebouncer::start(
        dispatcher,
        cfg.profile.thresholds.settle(),
    ));
    let stop = Arc::new(AtomicBool::new(false));

    // channels
    let (tx_req, rx_req) = mpsc::channel::<IpcMsg>();
    let (tx_evt, rx_evt) = mpsc::channel::<DaemonEvent>();
    let (tx_ctl, rx_ctl) = mpsc::channel::<PipelineMsg>();

    // frame pipeline
    // fixed for the daemon's lifetime, reloads do not reopen the stream
    let source_name = cfg.profile.meta.source.clone();
    let source = JsonLinesSource::open(&source_name)?;
    info!("daemon: reading landmarks from '{source_name}'");
    {
        let th = cfg.profile.thresholds.clone();
        let engine = engine.clone();
        let stop = stop.clone();
        let tx_evt = tx_evt.clone();
        thread::Builder::new()
            .name("frame-loop".into())
            .spawn(move || {
                let r = run_pipeline(source, &th, engine, rx_ctl, stop).map_err(|e| e.to_string());
                let _ = tx_evt.send(DaemonEvent::PipelineExited(r));
            })?;
    }

    // hotkey
    {
        let key = input::parse_hotkey(&cfg.profile.hotkeys.toggle_mode)?;
        let engine = engine.clone();
        let stop = stop.clone();
        let tx_req = tx_req.clone();
        thread::Builder::new()
            .name("hotkey".into())
            .spawn(move || {
                input::watch_hotkey(key, stop, || match engine.toggle_mode() {
                    Ok(_) => {
                        let _ = tx_req.send(IpcMsg::Toggled);
                    }
                    Err(e) => warn!("mode toggle refused: {e}"),
                })
            })?;
    }

    // profile watcher; kept alive for the daemon's lifetime
    let _watcher = watch_profile(&cfg, tx_evt.clone());

    // signals
    {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let tx_req = tx_req.clone();
        thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("daemon: signal {sig}, shutting down");
                let _ = tx_req.send(IpcMsg::Shutdown);
            }
        });
    }

    // accept loop
    listener.set_nonblocking(true)?;
    let result = loop {
        if let Ok((stream, _)) = listener.accept() {
            let tx = tx_req.clone();
            let engine = engine.clone();
            let mut snapshot = cfg.clone();
            snapshot.profile.meta.source = source_name.clone();
            thread::spawn(move || {
                if let Err(e) = handle_client(stream, &snapshot, &engine, tx) {
                    error!("ipc client error: {e}");
                }
            });
        }

        let mut exit = None;
        while let Ok(evt) = rx_evt.try_recv() {
            match evt {
                DaemonEvent::ProfileChanged => {
                    if let Err(e) = cfg.reload() {
                        error!("auto-reload failed, keeping last good profile: {e}");
                    } else {
                        apply_profile(&cfg.profile, &engine, &tx_ctl);
                        info!("profile '{}' reloaded from disk", cfg.active_name);
                    }
                }
                DaemonEvent::PipelineExited(Ok(frames)) => {
                    info!("frame loop finished after {frames} frame(s)");
                    exit = Some(Ok(()));
                }
                DaemonEvent::PipelineExited(Err(e)) => {
                    error!("frame loop stopped: {e}");
                    exit = Some(Err(anyhow!(e)));
                }
            }
        }
        if let Some(r) = exit {
            break r;
        }

        let mut shutdown = false;
        while let Ok(msg) = rx_req.try_recv() {
            match msg {
                IpcMsg::Reload(reply) => {
                    let r = cfg.reload().map(|_| {
                        apply_profile(&cfg.profile, &engine, &tx_ctl);
                        info!("profile reloaded");
                        cfg.active_name.clone()
                    });
                    let _ = reply.send(r.map_err(|e| e.to_string()));
                }
                IpcMsg::UseProfile(name, reply) => {
                    let r = cfg.set_active(&name).map(|_| {
                        apply_profile(&cfg.profile, &engine, &tx_ctl);
                        info!("switched active profile to {}", cfg.active_name);
                        cfg.active_name.clone()
                    });
                    let _ = reply.send(r.map_err(|e| e.to_string()));
                }
                IpcMsg::Toggled => {
                    let _ = tx_ctl.send(PipelineMsg::Reset);
                }
                IpcMsg::Shutdown => shutdown = true,
            }
        }
        if shutdown {
            break Ok(());
        }

        thread::sleep(Duration::from_millis(5));
    };

    stop.store(true, Ordering::Relaxed);
    engine.shutdown();
    let _ = std::fs::remove_file(&sock);
    info!("daemon: stopped");
    result
}

fn apply_profile(profile: &Profile, engine: &GestureDebouncer, tx_ctl: &Sender<PipelineMsg>) {
    engine.set_media(build_media(profile));
    let _ = tx_ctl.send(PipelineMsg::Thresholds(profile.thresholds.clone()));
}

fn watch_profile(
    cfg: &DaemonConfigState,
    tx_evt: Sender<DaemonEvent>,
) -> Option<notify::RecommendedWatcher> {
    let handler = move |res: notify::Result<Event>| match res {
        Ok(ev)
            if (ev.kind.is_modify() || ev.kind.is_create())
                && ev
                    .paths
                    .iter()
                    .any(|p| p.extension().is_some_and(|e| e == "toml")) =>
        {
            let _ = tx_evt.send(DaemonEvent::ProfileChanged);
        }
        Ok(_) => {}
        Err(e) => warn!("profile watch error: {e}"),
    };
    let mut watcher = match notify::recommended_watcher(handler) {
        Ok(w) => w,
        Err(e) => {
            warn!("profile watcher unavailable: {e}");
            return None;
        }
    };
    // watch the directory so editors that replace the file are seen too
    if let Err(e) = watcher.watch(&cfg.profiles_dir, RecursiveMode::NonRecursive) {
        warn!("cannot watch {}: {e}", cfg.profiles_dir.display());
        return None;
    }
    info!("watching {} for changes", cfg.profiles_dir.display());
    Some(watcher)
}

fn await_reply(rx: Receiver<std::result::Result<String, String>>) -> serde_json::Value {
    match rx.recv_timeout(Duration::from_secs(2)) {
        Ok(Ok(name)) => serde_json::json!({"ok": true, "data": {"active_profile": name}}),
        Ok(Err(e)) => serde_json::json!({"ok": false, "error": e}),
        Err(_) => serde_json::json!({"ok": false, "error": "daemon did not answer"}),
    }
}

fn handle_client(
    mut stream: UnixStream,
    cfg: &DaemonConfigState,
    engine: &GestureDebouncer,
    tx_req: Sender<IpcMsg>,
) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let req: serde_json::Value = serde_json::from_str(&line)?;
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

    let resp = match op {
        "status" => serde_json::json!({"ok": true, "data": {
            "engine": engine.status(),
            "active_profile": cfg.active_name,
            "source": cfg.profile.meta.source,
            "socket": socket_path()?,
        }}),
        "toggle" => match engine.toggle_mode() {
            Ok(mode) => {
                let _ = tx_req.send(IpcMsg::Toggled);
                serde_json::json!({"ok": true, "data": {"mode": mode}})
            }
            Err(e) => serde_json::json!({"ok": false, "error": e.to_string()}),
        },
        "enable" | "disable" => {
            engine.set_enabled(op == "enable");
            serde_json::json!({"ok": true, "data": {"enabled": op == "enable"}})
        }
        "reload" => {
            let (tx, rx) = mpsc::channel();
            let _ = tx_req.send(IpcMsg::Reload(tx));
            await_reply(rx)
        }
        "use" => {
            let name = req.get("profile").and_then(|v| v.as_str()).unwrap_or("");
            let (tx, rx) = mpsc::channel();
            let _ = tx_req.send(IpcMsg::UseProfile(name.to_string(), tx));
            await_reply(rx)
        }
        "list" => {
            let list = cfg.list_profiles();
            serde_json::json!({"ok": true, "data": {"profiles": list, "active": cfg.active_name}})
        }
        "doctor" => {
            let report = cfg.doctor_report();
            serde_json::json!({"ok": true, "data": report})
        }
        "shutdown" => {
            let _ = tx_req.send(IpcMsg::Shutdown);
            serde_json::json!({"ok": true, "data": "shutting down"})
        }
        _ => serde_json::json!({"ok": false, "error": format!("unknown op: {op}")}),
    };

    writeln!(stream, "{}", resp)?;
    Ok(())
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = socket_path()?;
    if !sock.exists() {
        return Err(anyhow!(
            "facectl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}
