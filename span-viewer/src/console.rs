//! Console input: one line per remote action.
//!
//! ```text
//! click X Y [left|right|middle]    dblclick X Y [button]
//! move X Y                         down X Y [button] / up X Y [button]
//! scroll DELTA                     key NAME / keydown NAME / keyup NAME
//! type TEXT...                     switch | desktop | cad
//! help                             quit
//! ```
//!
//! Pointer coordinates are pixels of the last frame written, so they are
//! only usable once a frame has arrived.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use span_core::{CommandSender, MouseButton, SpanError, SystemAction, ViewEvent, Viewport};

pub const HELP: &str = "\
commands:
  click X Y [left|right|middle]   double-click: dblclick X Y [button]
  move X Y                        down X Y [button] / up X Y [button]
  scroll DELTA                    (120 per notch, positive scrolls down)
  key NAME                        tap a named key (Enter, Esc, F5, ...)
  keydown NAME / keyup NAME       hold and release, for chords
  type TEXT...                    type the rest of the line
  switch | desktop | cad          Alt+Tab, Meta+D, Ctrl+Alt+Del
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Event(ViewEvent),
    Help,
    Quit,
}

/// Parse one console line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleInput>, SpanError> {
    let trimmed = line.trim_start();
    if trimmed.trim_end().is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let (verb, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest),
        None => (trimmed.trim_end(), ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let event = match verb.to_ascii_lowercase().as_str() {
        "help" | "?" => return Ok(Some(ConsoleInput::Help)),
        "quit" | "exit" => return Ok(Some(ConsoleInput::Quit)),
        "click" => {
            let (x, y, button) = pointer_args(&args, true)?;
            ViewEvent::Click { x, y, button }
        }
        "dblclick" | "double" => {
            let (x, y, button) = pointer_args(&args, true)?;
            ViewEvent::DoubleClick { x, y, button }
        }
        "down" => {
            let (x, y, button) = pointer_args(&args, true)?;
            ViewEvent::PointerDown { x, y, button }
        }
        "up" => {
            let (x, y, button) = pointer_args(&args, true)?;
            ViewEvent::PointerUp { x, y, button }
        }
        "move" => {
            let (x, y, _) = pointer_args(&args, false)?;
            ViewEvent::PointerMove { x, y }
        }
        "scroll" => match args.as_slice() {
            [delta] => ViewEvent::Wheel {
                delta_y: delta
                    .parse()
                    .map_err(|_| invalid(format!("scroll delta must be an integer: {delta}")))?,
            },
            _ => return Err(invalid("usage: scroll DELTA")),
        },
        "key" => ViewEvent::KeyPress(single_arg(&args, "key NAME")?),
        "keydown" => ViewEvent::KeyDown(single_arg(&args, "keydown NAME")?),
        "keyup" => ViewEvent::KeyUp(single_arg(&args, "keyup NAME")?),
        "type" => {
            let text = rest.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                return Err(invalid("usage: type TEXT"));
            }
            ViewEvent::Text(text.to_string())
        }
        "switch" | "alt-tab" => ViewEvent::Gesture(SystemAction::SwitchWindow),
        "desktop" => ViewEvent::Gesture(SystemAction::ShowDesktop),
        "cad" | "ctrl-alt-del" => ViewEvent::Gesture(SystemAction::SecureAttention),
        other => return Err(invalid(format!("unknown command `{other}`, try `help`"))),
    };
    Ok(Some(ConsoleInput::Event(event)))
}

fn invalid(msg: impl Into<String>) -> SpanError {
    SpanError::InvalidTarget(msg.into())
}

fn pointer_args(args: &[&str], with_button: bool) -> Result<(f64, f64, MouseButton), SpanError> {
    let coord = |s: &str| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| invalid(format!("not a coordinate: {s}")))
    };
    match (args, with_button) {
        ([x, y], _) => Ok((coord(*x)?, coord(*y)?, MouseButton::Left)),
        ([x, y, b], true) => {
            let button = match b.to_ascii_lowercase().as_str() {
                "left" => MouseButton::Left,
                "right" => MouseButton::Right,
                "middle" => MouseButton::Middle,
                other => return Err(invalid(format!("unknown button: {other}"))),
            };
            Ok((coord(*x)?, coord(*y)?, button))
        }
        _ if with_button => Err(invalid("expected X Y [button]")),
        _ => Err(invalid("expected X Y")),
    }
}

fn single_arg(args: &[&str], usage: &str) -> Result<String, SpanError> {
    match args {
        [name] => Ok((*name).to_string()),
        _ => Err(invalid(format!("usage: {usage}"))),
    }
}

fn is_pointer(event: &ViewEvent) -> bool {
    matches!(
        event,
        ViewEvent::PointerMove { .. }
            | ViewEvent::PointerDown { .. }
            | ViewEvent::PointerUp { .. }
            | ViewEvent::Click { .. }
            | ViewEvent::DoubleClick { .. }
    )
}

// ── Console loop ─────────────────────────────────────────────────

/// Read lines until `quit`, end of input, or the stop flag clears.
///
/// Returns the number of commands enqueued. Ends early with
/// [`SpanError::UnknownSession`] if the relay forgets the session; any
/// other send failure is logged and the line dropped.
pub async fn run(
    mut lines: mpsc::Receiver<String>,
    sender: CommandSender,
    viewport: watch::Receiver<Option<Viewport>>,
    running: Arc<AtomicBool>,
) -> Result<u64, SpanError> {
    let mut sent = 0u64;
    while running.load(Ordering::SeqCst) {
        let Some(line) = lines.recv().await else {
            break;
        };
        let event = match parse_line(&line) {
            Ok(None) => continue,
            Ok(Some(ConsoleInput::Help)) => {
                println!("{HELP}");
                continue;
            }
            Ok(Some(ConsoleInput::Quit)) => break,
            Ok(Some(ConsoleInput::Event(event))) => event,
            Err(e) => {
                warn!("{}", e.detail());
                continue;
            }
        };

        // Keyboard and gestures need no frame; pointer events do.
        let view = match *viewport.borrow() {
            Some(v) => v,
            None if is_pointer(&event) => {
                warn!("no frame received yet; pointer coordinates have nothing to map onto");
                continue;
            }
            None => Viewport::new(0.0, 0.0, 1.0, 1.0),
        };

        match sender.send(&event, &view).await {
            Ok(true) => sent += 1,
            Ok(false) => info!(?event, "nothing sent: no remote effect inside the current frame"),
            Err(e @ SpanError::UnknownSession(_)) => return Err(e),
            Err(e) => warn!("command not sent: {e}"),
        }
    }
    Ok(sent)
}

/// Forward stdin lines on a dedicated thread.
///
/// Blocking reads stay off the runtime so an idle terminal never holds up
/// shutdown.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(64);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.blocking_send(line.clone()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}
