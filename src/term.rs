// Copyright (c) 2025 Mikko Tanner. All rights reserved.
// Licensed under the MIT License or the Apache License, Version 2.0.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal plumbing: raw-mode lifecycle, signals and keystrokes.

use crate::paint::TermSize;
use crossterm::{
    cursor::{Hide, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use signal_hook::{
    consts::signal::{SIGINT, SIGQUIT, SIGTERM},
    iterator::{Signals, SignalsInfo},
};
use std::{
    io::{Result, stdout},
    panic,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering::Relaxed},
    },
    thread,
    time::Duration,
};
use tracing::{info, warn};

/// RAII handle on the full-screen graph UI.
///
/// Creation installs the panic hook, flips the terminal into raw mode
/// and jumps to the alternate screen; dropping the guard undoes all of
/// it, so every exit path (`?` included) hands the shell back usable.
pub struct TerminalGuard {
    verbose: bool,
}

impl TerminalGuard {
    pub fn new(verbose: bool) -> Result<Self> {
        // panic hook first, so a failed setup still restores the terminal
        panic::set_hook(Box::new(panic_handler));
        enable_raw_mode()?;
        execute!(stdout(), EnterAlternateScreen, Hide)?;
        Ok(Self { verbose })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        terminal_teardown(self.verbose);
    }
}

/// Undo everything [TerminalGuard::new] changed about the terminal.
fn terminal_teardown(verbose: bool) {
    let _ = disable_raw_mode();
    let _ = execute!(stdout(), LeaveAlternateScreen, Show);

    if verbose {
        eprintln!("pinggraph: graph closed, terminal restored.");
    }
}

/// A crash mid-frame must not strand the shell on the alternate screen
/// with echo off, so the hook tears the UI down before reporting.
pub fn panic_handler(info: &panic::PanicHookInfo) {
    terminal_teardown(false);
    eprintln!("pinggraph panicked: {info}");
}

/// Current terminal dimensions, with a conservative fallback.
pub fn current_size() -> TermSize {
    match terminal::size() {
        Ok((w, h)) => TermSize::new(w, h),
        Err(_) => TermSize::new(80, 24),
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Route [SIGINT], [SIGTERM] and [SIGQUIT] into the shared quit flag.
///
/// A dedicated thread sleeps on the signal iterator while every task
/// merely polls the flag. SIGQUIT would ordinarily core-dump; here it
/// shuts the monitor down like the other two.
pub fn setup_signal_handler(quit: Arc<AtomicBool>) {
    let listen: [i32; 3] = [SIGINT, SIGTERM, SIGQUIT];
    let mut signals: SignalsInfo = match Signals::new(listen) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "cannot install signal handlers");
            return;
        }
    };

    // Dedicated thread; the rest of the program polls the quit flag.
    thread::spawn(move || {
        for sig in signals.forever() {
            info!(signal = sig, "termination signal received, shutting down");
            quit.store(true, Relaxed);
        }
    });
}

////////////////////////////////////////////////////////////////////////////////

/// One conditional keystroke listener.
pub struct KeyListener {
    matches: Box<dyn Fn(&KeyEvent) -> bool + Send>,
    action: Box<dyn FnMut() + Send>,
}

/// Keystroke dispatcher for the raw-mode input loop.
///
/// Listeners are consulted in registration order; the first match wins.
/// Unmatched events fall through to the fallback listener. `Ctrl-C` is
/// hardwired to raise the quit flag before any listener runs, since raw
/// mode swallows the usual SIGINT delivery.
pub struct KeyDispatcher {
    listeners: Vec<KeyListener>,
    fallback: Option<Box<dyn FnMut(KeyEvent) + Send>>,
}

impl Default for KeyDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyDispatcher {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            fallback: None,
        }
    }

    /// Register an action for a bare character key.
    pub fn on_char<F: FnMut() + Send + 'static>(mut self, c: char, action: F) -> Self {
        self.listeners.push(KeyListener {
            matches: Box::new(move |e: &KeyEvent| {
                e.code == KeyCode::Char(c) && e.modifiers.is_empty()
            }),
            action: Box::new(action),
        });
        self
    }

    /// Register the listener for anything nothing else matched.
    pub fn with_fallback<F: FnMut(KeyEvent) + Send + 'static>(mut self, f: F) -> Self {
        self.fallback = Some(Box::new(f));
        self
    }

    fn dispatch(&mut self, ev: KeyEvent) {
        for listener in &mut self.listeners {
            if (listener.matches)(&ev) {
                (listener.action)();
                return;
            }
        }
        if let Some(fallback) = &mut self.fallback {
            fallback(ev);
        }
    }
}

/// Run the keystroke loop on a dedicated thread until `quit` is raised.
pub fn spawn_input_loop(mut dispatcher: KeyDispatcher, quit: Arc<AtomicBool>) {
    thread::spawn(move || {
        while !quit.load(Relaxed) {
            match event::poll(Duration::from_millis(100)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(_) => break,
            }
            let Ok(Event::Key(e)) = event::read() else {
                continue;
            };
            if e.kind != KeyEventKind::Press {
                continue;
            }
            // raw mode keeps Ctrl-C from ever becoming SIGINT; catch it here
            if e.code == KeyCode::Char('c') && e.modifiers.contains(KeyModifiers::CONTROL) {
                quit.store(true, Relaxed);
                continue;
            }
            dispatcher.dispatch(e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn press(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::empty())
    }

    #[test]
    fn test_dispatch_order_and_fallback() {
        let hits: Arc<AtomicU32> = Arc::new(AtomicU32::new(0));
        let fallbacks: Arc<AtomicU32> = Arc::new(AtomicU32::new(0));

        let h: Arc<AtomicU32> = hits.clone();
        let f: Arc<AtomicU32> = fallbacks.clone();
        let mut dispatcher: KeyDispatcher = KeyDispatcher::new()
            .on_char('h', move || {
                h.fetch_add(1, Relaxed);
            })
            .with_fallback(move |_| {
                f.fetch_add(1, Relaxed);
            });

        dispatcher.dispatch(press('h'));
        dispatcher.dispatch(press('h'));
        dispatcher.dispatch(press('z'));

        assert_eq!(hits.load(Relaxed), 2);
        assert_eq!(fallbacks.load(Relaxed), 1, "unmatched key must fall through");
    }

    #[test]
    fn test_modified_char_does_not_match_bare_listener() {
        let hits: Arc<AtomicU32> = Arc::new(AtomicU32::new(0));
        let h: Arc<AtomicU32> = hits.clone();
        let mut dispatcher: KeyDispatcher = KeyDispatcher::new().on_char('e', move || {
            h.fetch_add(1, Relaxed);
        });

        dispatcher.dispatch(KeyEvent::new(KeyCode::Char('e'), KeyModifiers::CONTROL));
        assert_eq!(hits.load(Relaxed), 0);
    }
}
