use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{env, process::Command};

use crate::actions::{Button, InputCommand, InputSink, UinputSink};
use crate::config::DaemonConfigState;
use crate::ipc;
use crate::media::{KeyMediaController, MediaCommand, MediaController};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        let source: Option<String> = pargs.opt_value_from_str("--source")?;
        return ipc::run_daemon(source);
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // --source may come before or after the subcommand
    let source: Option<String> = pargs.opt_value_from_str("--source")?;

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("start") => {
            let exe = std::env::current_exe()?;
            let mut cmd = Command::new(exe);
            cmd.arg("--daemon");
            if let Some(src) = &source {
                cmd.arg("--source").arg(src);
            }
            let child = cmd.spawn()?;
            println!("facectl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some("run") => ipc::run_daemon(source),

        Some(op @ ("stop" | "status" | "toggle" | "enable" | "disable" | "reload" | "list"
        | "doctor")) => {
            let op = if op == "stop" { "shutdown" } else { op };
            let r = ipc::client_request(serde_json::json!({ "op": op }))?;
            print_response(&r);
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: facectl use <profile_name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("emit") => emit(&mut pargs),

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn emit(pargs: &mut Arguments) -> Result<()> {
    // usage:
    //   facectl emit click right
    //   facectl emit move -20 5
    //   facectl emit key SHIFT+N
    //   facectl emit media play_pause
    let what: String = pargs
        .free_from_str()
        .map_err(|_| anyhow!("usage: facectl emit <click|move|key|media> ..."))?;
    let mut sink = UinputSink::new()?;
    match what.as_str() {
        "click" => {
            let btn: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: facectl emit click <left|right|middle>"))?;
            sink.send(&InputCommand::Click(Button::parse(&btn)?))?;
            println!("ok: clicked {btn}");
        }
        "move" => {
            let dx: i32 = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: facectl emit move <dx> <dy>"))?;
            let dy: i32 = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: facectl emit move <dx> <dy>"))?;
            sink.send(&InputCommand::MoveRelative { dx, dy })?;
            println!("ok: moved ({dx}, {dy})");
        }
        "key" => {
            let chord: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: facectl emit key SHIFT+N"))?;
            crate::actions::parse_chord(&chord)?;
            sink.send(&InputCommand::KeyChord(chord.clone()))?;
            println!("ok: sent key chord {chord}");
        }
        "media" => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: facectl emit media <command>"))?;
            let cmd = MediaCommand::from_key(&name)
                .ok_or_else(|| anyhow!("unknown media command: {name}"))?;
            let cfg = DaemonConfigState::load_or_install_default()?;
            let mut media = KeyMediaController::from_bindings(&cfg.profile.media)?;
            media.open()?;
            if !media.send(cmd, &mut sink)? {
                return Err(anyhow!(
                    "profile '{}' has no binding for media.{name}",
                    cfg.active_name
                ));
            }
            println!("ok: sent media {name}");
        }
        other => return Err(anyhow!("unknown emit kind: {other}")),
    }
    Ok(())
}

fn print_help() {
    println!(
        r#"facectl: head-and-blink mouse daemon

USAGE:
  facectl help [command]                  Show general or command-specific help
  facectl start [--source PATH]           Start the daemon in the background
  facectl run [--source PATH]             Run the daemon in the foreground
  facectl stop                            Stop the daemon
  facectl status                          Show mode, hold state, pending blinks
  facectl toggle                          Switch between mouse and media mode
  facectl enable | disable                Resume or pause action injection
  facectl reload                          Reload active profile
  facectl use <name>                      Switch active profile
  facectl list                            List profiles
  facectl doctor                          Diagnose permissions/devices
  facectl emit click <left|right|middle>  Emit a mouse click
  facectl emit move <dx> <dy>             Emit a relative pointer move
  facectl emit key SHIFT+N                Emit a key or chord
  facectl emit media <command>            Emit a media command via the profile

GESTURES:
  mouse mode: 1 blink click, 2 double click, 3 press (drag), 4+ right click
              any blink while dragging releases; a long blink right clicks
  media mode: 1 play/pause, 2 next, 3 mute, 4 fullscreen, 5 like,
              6 volume up, 7 volume down, 8+ or a long blink subscribe

TIPS:
  - Landmarks: one JSON object per line, {{"faces": [[[x, y], ...68 points]]}}
  - Profiles: ~/.config/facectl/profiles
  - Active profile pointer: ~/.config/facectl/active
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!(
            "usage: facectl start [--source PATH]\nStarts the background daemon; PATH overrides meta.source."
        ),
        "run" => println!(
            "usage: facectl run [--source PATH]\nRuns the daemon in the foreground until the stream ends."
        ),
        "stop" => println!("usage: facectl stop\nStops the running daemon."),
        "status" => println!(
            "usage: facectl status\nShows mode, hold state, pending blinks, profile, source, socket."
        ),
        "toggle" => println!(
            "usage: facectl toggle\nSwitches mouse/media mode; refused when no media bindings exist."
        ),
        "enable" | "disable" => {
            println!("usage: facectl enable|disable\nResumes or pauses all injected input.")
        }
        "reload" => println!(
            "usage: facectl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: facectl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => println!("usage: facectl list\nLists available profiles."),
        "doctor" => println!(
            "usage: facectl doctor\nChecks permissions, keyboards and the landmark source."
        ),
        "emit" => println!(
            "usage:\n  facectl emit click <left|right|middle>\n  facectl emit move <dx> <dy>\n  facectl emit key SHIFT+N\n  facectl emit media <play_pause|next|mute|...>"
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
