// Copyright (c) 2025 Mikko Tanner. All rights reserved.
// Licensed under the MIT License or the Apache License, Version 2.0.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal ping monitor: probe one host continuously, keep the full
//! round-trip history, persist it to a compact `.pings` file and draw a
//! live latency graph.

mod args;
mod axes;
mod codec;
mod files;
mod glyphs;
mod graph;
mod gui;
mod paint;
mod probe;
mod siphon;
mod spans;
mod stats;
mod store;
mod term;

use crate::{
    args::{Cli, Command, MonitorArgs},
    graph::Graph,
    gui::Gui,
    paint::TermSize,
    spans::SpanEngine,
    stats::format_duration,
    store::{Data, display_ip},
};
use chrono::{Local, Offset, SecondsFormat};
use clap::Parser;
use futures::future::join_all;
use std::{
    error::Error,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering::Relaxed},
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Live redraw cadence (~60 fps).
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[tokio::main(worker_threads = 8)]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli: Cli = Cli::parse();

    match cli.command {
        Some(Command::Drawframe { term_size, paths }) => {
            init_stderr_logging();
            drawframe(term_size, &paths)
        }
        Some(Command::Rawdata { all, csv, files }) => {
            init_stderr_logging();
            rawdata(all, csv, &files)
        }
        Some(Command::Ping { url, count }) => {
            init_stderr_logging();
            simple_ping(&url, count).await
        }
        None => live_monitor(cli.monitor).await,
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Logging for the non-TUI subcommands.
fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Logging for the live monitor: file-only, since stderr would scribble
/// over the alternate screen.
fn init_file_logging(path: &Path) -> Result<(), Box<dyn Error>> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("cannot open log file {}: {e}", path.display()))?;
    let file: Arc<std::fs::File> = Arc::new(file);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(move || Arc::clone(&file))
        .with_ansi(false)
        .init();
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////

async fn live_monitor(conf: MonitorArgs) -> Result<(), Box<dyn Error>> {
    if let Some(log_path) = &conf.log_file {
        init_file_logging(log_path)?;
    }

    // Everything that can fail at startup fails here, before the
    // terminal is touched.
    let mut data: Data;
    let mut writer_setup: Option<(tokio::fs::File, Data)> = None;
    if let Some(path) = &conf.file {
        data = files::load_or_new(path, &conf.url)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(|e| format!("cannot open {}: {e}", path.display()))?;
        writer_setup = Some((tokio::fs::File::from_std(file), data.clone()));
    } else {
        data = Data::new(&conf.url);
    }
    data = data.in_timezone(Local::now().offset().fix());
    let mut spans: SpanEngine = SpanEngine::rebuild(&data);

    let quit: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
    term::setup_signal_handler(quit.clone());

    let mut bindings: Vec<(&'static str, &'static str)> = vec![
        ("q", "quit"),
        ("ctrl-c", "quit"),
        ("h", "toggle this box"),
    ];
    if conf.debug_error_creator {
        bindings.push(("e", "inject a test error"));
    }
    let gui: Arc<Gui> = Arc::new(Gui::new(!conf.hide_help, bindings));

    let (err_tx, mut err_rx) = mpsc::channel::<String>(16);

    // probe stream, fanned out to the renderer and the writer
    let raw_stream = probe::open_stream(conf.url.clone(), conf.pings_per_minute, 2048);
    let (mut render_rx, disk_rx) = siphon::tee_buffered(raw_stream, 4096);
    let mut tasks: Vec<tokio::task::JoinHandle<()>> = Vec::new();
    match writer_setup {
        Some((file, writer_data)) => {
            tasks.push(tokio::spawn(files::run_writer(
                file,
                writer_data,
                disk_rx,
                err_tx.clone(),
                quit.clone(),
            )));
        }
        None => drop(disk_rx),
    }

    // error channel feeds the toast overlay
    {
        let gui: Arc<Gui> = gui.clone();
        tokio::spawn(async move {
            while let Some(msg) = err_rx.recv().await {
                gui.push_error(msg);
            }
        });
    }
    // toast lifetime ticker
    {
        let gui: Arc<Gui> = gui.clone();
        let quit: Arc<AtomicBool> = quit.clone();
        tokio::spawn(async move {
            let mut tick = time::interval(Duration::from_secs(1));
            while !quit.load(Relaxed) {
                tick.tick().await;
                gui.expire_toasts();
            }
        });
    }

    // keystrokes
    let dispatcher: term::KeyDispatcher = {
        let quit_key: Arc<AtomicBool> = quit.clone();
        let gui_help: Arc<Gui> = gui.clone();
        let mut dispatcher: term::KeyDispatcher = term::KeyDispatcher::new()
            .on_char('q', move || quit_key.store(true, Relaxed))
            .on_char('h', move || gui_help.toggle_help());
        if conf.debug_error_creator {
            let inject: mpsc::Sender<String> = err_tx.clone();
            dispatcher = dispatcher.on_char('e', move || {
                let _ = inject.try_send("debug: injected test error".to_string());
            });
        }
        dispatcher
    };
    term::spawn_input_loop(dispatcher, quit.clone());

    // the render loop owns the terminal for writing
    let guard: term::TerminalGuard = term::TerminalGuard::new(false)?;
    let mut graph: Graph = Graph::new(term::current_size());
    let mut out = std::io::stdout();
    let mut frame_tick = time::interval(FRAME_INTERVAL);
    frame_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut fatal: Option<String> = None;

    loop {
        frame_tick.tick().await;
        if quit.load(Relaxed) {
            break;
        }

        let drained = siphon::drain_now(&mut render_rx);
        if drained.skipped > 0 {
            warn!(missed = drained.skipped, "renderer fell behind the probe stream");
        }
        for item in drained.items {
            match item {
                Ok(result) => {
                    spans.add_point(data.total_count, &result.data);
                    data.add_point(result);
                }
                Err(probe_err) => {
                    fatal = Some(probe_err.to_string());
                    quit.store(true, Relaxed);
                    break;
                }
            }
        }
        if drained.closed {
            quit.store(true, Relaxed);
        }

        graph.render(&data, &spans, &gui, term::current_size(), &mut out)?;
    }

    // let the writer finish its last flush before reporting
    drop(err_tx);
    join_all(tasks).await;

    // restore the terminal, then leave the last frame and a summary on
    // the normal screen
    let last_frame: String = graph.last_frame_text();
    drop(guard);

    let mut stdout = std::io::stdout();
    write!(stdout, "{last_frame}")?;
    writeln!(stdout)?;
    writeln!(stdout, "{}", exit_summary(&data))?;

    match fatal {
        Some(msg) => Err(msg.into()),
        None => Ok(()),
    }
}

/// The one-paragraph account printed on clean shutdown.
fn exit_summary(data: &Data) -> String {
    if data.total_count == 0 {
        return format!("No probes recorded for {}.", data.url);
    }
    let stats = &data.header.stats;
    let span = &data.header.time_span;
    format!(
        "Recorded {} probes to {} across {} address(es) between {} and {}. \
         Latency min {} / mean {} / max {} (stddev {}), packet loss {}. \
         Longest good streak {}, longest drop streak {}.",
        data.total_count,
        data.url,
        data.network.len(),
        data.display_time(span.begin).to_rfc3339_opts(SecondsFormat::Secs, true),
        data.display_time(span.end).to_rfc3339_opts(SecondsFormat::Secs, true),
        format_duration(stats.min),
        stats.mean_str(),
        format_duration(stats.max),
        stats.stddev_str(),
        stats.loss_str(),
        data.runs.good.longest,
        data.runs.dropped.longest,
    )
}

////////////////////////////////////////////////////////////////////////////////

/// Render one frame per `.pings` file to stdout.
fn drawframe(term_size: Option<TermSize>, paths: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let found: Vec<PathBuf> = files::find_pings_files(paths)?;
    if found.is_empty() {
        return Err("no .pings files found".into());
    }
    let size: TermSize = term_size.unwrap_or_else(term::current_size);

    let mut stdout = std::io::stdout();
    for path in &found {
        let data: Data = files::load_data(path, "")?;
        let spans: SpanEngine = SpanEngine::rebuild(&data);
        writeln!(stdout, "{}:", path.display())?;
        write!(stdout, "{}", graph::compose_frame(&data, &spans, size).to_plain_string())?;
    }
    Ok(())
}

/// Dump recordings: a summary line each, every packet, or CSV.
fn rawdata(all: bool, csv: bool, paths: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let found: Vec<PathBuf> = files::find_pings_files(paths)?;
    if found.is_empty() {
        return Err("no .pings files found".into());
    }

    let mut stdout = std::io::stdout();
    for path in &found {
        let data: Data = files::load_data(path, "")?;
        if csv {
            files::write_csv(&mut stdout, &data)?;
        } else if all {
            writeln!(stdout, "{}", files::summary_line(path, &data))?;
            files::write_packets(&mut stdout, &data)?;
        } else {
            writeln!(stdout, "{}", files::summary_line(path, &data))?;
        }
    }
    Ok(())
}

/// Plain ping without the graph; `count <= 0` runs until interrupted.
async fn simple_ping(url: &str, count: i64) -> Result<(), Box<dyn Error>> {
    let quit: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
    term::setup_signal_handler(quit.clone());

    let mut rx = probe::open_stream(url.to_string(), 60.0, 16);
    let mut seen: i64 = 0;

    while count <= 0 || seen < count {
        if quit.load(Relaxed) {
            break;
        }
        let item = tokio::select! {
            item = rx.recv() => item,
            _ = time::sleep(Duration::from_millis(200)) => continue,
        };
        match item {
            None => break,
            Some(Ok(result)) if result.data.is_dropped() => {
                println!(
                    "probe to {}: dropped ({})",
                    display_ip(&result.ip),
                    result.data.drop_reason
                );
            }
            Some(Ok(result)) => {
                println!(
                    "reply from {}: time={}",
                    display_ip(&result.ip),
                    format_duration(result.data.duration)
                );
            }
            Some(Err(probe_err)) => return Err(probe_err.to_string().into()),
        }
        seen += 1;
    }
    Ok(())
}
