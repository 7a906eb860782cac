// Copyright (c) 2025 Mikko Tanner. All rights reserved.
// Licensed under the MIT License or the Apache License, Version 2.0.
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::paint::TermSize;
use clap::{
    Args, Parser, Subcommand, crate_authors, crate_description, crate_name, crate_version,
};
use std::path::PathBuf;

/// Parse a probes-per-minute rate. Zero is "as fast as possible";
/// negative rates are rejected.
fn parse_rate(arg: &str) -> Result<f64, String> {
    match arg.parse::<f64>() {
        Ok(rate) if rate.is_finite() && rate >= 0.0 => Ok(rate),
        _ => Err(format!("invalid rate (must be >= 0): {arg}")),
    }
}

/// Parse a terminal size given as `HxW` (height first).
fn parse_term_size(arg: &str) -> Result<TermSize, String> {
    let parts: Vec<&str> = arg.split('x').collect();
    if parts.len() != 2 {
        return Err(format!("expected HxW, got: {arg}"));
    }
    let height: u16 = parts[0]
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in: {arg}"))?;
    let width: u16 = parts[1]
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in: {arg}"))?;
    if height == 0 || width == 0 {
        return Err(format!("terminal size must be non-zero: {arg}"));
    }
    Ok(TermSize::new(width, height))
}

/// Configuration struct for the program.
#[derive(Parser, Debug)]
#[command(name = crate_name!(), version = crate_version!(), author = crate_authors!(), about = crate_description!())]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub monitor: MonitorArgs,
}

/// Flags for the default live-monitor mode.
#[derive(Args, Debug, Clone)]
pub struct MonitorArgs {
    #[arg(
        long,
        value_name = "URL",
        default_value = "www.google.com",
        help = "Host to monitor"
    )]
    pub url: String,

    #[arg(
        long,
        value_name = "RATE",
        value_parser = parse_rate,
        default_value = "60",
        help = "Probes per minute; 0 means as fast as possible"
    )]
    pub pings_per_minute: f64,

    #[arg(
        long,
        value_name = "PATH",
        help = "Persist the recording to this .pings file"
    )]
    pub file: Option<PathBuf>,

    #[arg(long, help = "Start with the key-binding box hidden")]
    pub hide_help: bool,

    #[arg(
        long,
        short = 'l',
        value_name = "PATH",
        help = "Append structured logs to this file"
    )]
    pub log_file: Option<PathBuf>,

    #[arg(long, help = "Bind 'e' to inject a test error into the toast overlay")]
    pub debug_error_creator: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render one frame per recording to stdout
    Drawframe {
        #[arg(
            long,
            value_name = "HxW",
            value_parser = parse_term_size,
            help = "Frame size as HEIGHTxWIDTH; defaults to the current terminal"
        )]
        term_size: Option<TermSize>,

        #[arg(required = true, value_name = "PATH", help = "Recordings, or directories to search")]
        paths: Vec<PathBuf>,
    },

    /// Dump the contents of recordings as text
    Rawdata {
        #[arg(long, help = "Print every packet instead of a summary")]
        all: bool,

        #[arg(long, help = "Print packets as CSV")]
        csv: bool,

        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
    },

    /// Plain non-graphical ping
    Ping {
        #[arg(long, value_name = "URL", default_value = "www.google.com")]
        url: String,

        #[arg(
            short = 'n',
            value_name = "COUNT",
            default_value_t = 0,
            allow_hyphen_values = true,
            help = "Probes to send; 0 or less runs until interrupted"
        )]
        count: i64,
    },
}
