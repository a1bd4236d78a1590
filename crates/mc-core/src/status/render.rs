//! Plain-text rendering of a status snapshot.

use std::fmt::Write;

use mc_telemetry::Eta;

use super::{StatusSnapshot, StreamView};

/// Render `secs` as `1d 2h 3m 4s`, omitting leading zero units.
pub fn format_duration_secs(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;

    let mut out = String::new();
    for (value, unit) in [(days, 'd'), (hours, 'h'), (minutes, 'm')] {
        if value > 0 || !out.is_empty() {
            let _ = write!(out, "{}{} ", value, unit);
        }
    }
    let _ = write!(out, "{}s", seconds);
    out
}

/// Render a byte count with a binary unit.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn format_eta(eta: Eta) -> String {
    match eta {
        Eta::Seconds(secs) => format_duration_secs(secs),
        Eta::Unknown => "unknown (no data rate)".to_string(),
    }
}

fn stream_line(out: &mut String, name: &str, view: &StreamView) {
    let q = &view.quota;
    let _ = writeln!(
        out,
        "{:<6} {} KB / {} KB ({:.2}%), {} files, {}/s, full in {}",
        name,
        q.used_kb,
        q.cap_kb,
        q.percent_used,
        q.file_count,
        format_bytes(view.byte_rate),
        format_eta(view.eta)
    );
    if let Some(newest) = &q.newest_file {
        let _ = writeln!(out, "       active file: {}", newest);
    }
}

/// Multi-section text body of the status file.
pub fn render_text(s: &StatusSnapshot) -> String {
    let mut out = String::with_capacity(1024);
    let sample = &s.sample.sample;

    let _ = writeln!(out, "== sample (tick {}) ==", s.tick);
    let _ = writeln!(out, "{}", s.sample.line);
    let _ = writeln!(out, "stage:               {}", sample.stage);
    let _ = writeln!(out, "melt_temp:           {:.2}", sample.melt_temp);
    let _ = writeln!(out, "injection_pressure:  {:.2}", sample.injection_pressure);
    let _ = writeln!(out, "vibration_amplitude: {:.2}", sample.vibration_amplitude);
    let _ = writeln!(out, "vibration_frequency: {:.2}", sample.vibration_frequency);
    out.push('\n');

    let _ = writeln!(out, "== prediction ==");
    let _ = writeln!(out, "{}", s.prediction);
    out.push('\n');

    let c = &s.config;
    let _ = writeln!(out, "== config ==");
    let _ = writeln!(
        out,
        "rates: {} Hz sampling, {} Hz log (every {}{} tick)",
        c.hi_rate_hz,
        c.lo_rate_hz,
        s.decimation_factor,
        if c.is_exact_decimation() { "" } else { ", approximate" }
    );
    let _ = writeln!(out, "max log file: {} KB", c.max_log_file_kb);
    let _ = writeln!(out, "max log dir:  {} KB", c.max_log_dir_kb);
    let _ = writeln!(out, "max train dir: {} KB", c.max_train_dir_kb);
    out.push('\n');

    let _ = writeln!(out, "== capture ==");
    match (&s.capture.file, s.capture.active) {
        (Some(file), true) => {
            let _ = writeln!(out, "active: {} ({} records)", file, s.capture.records);
        }
        (None, true) => {
            let _ = writeln!(out, "active: no file (open failed)");
        }
        _ => {
            let _ = writeln!(out, "inactive");
        }
    }
    out.push('\n');

    let _ = writeln!(out, "== storage ==");
    let _ = writeln!(out, "record size: {} B", s.record_bytes);
    stream_line(&mut out, "logs", &s.logs);
    stream_line(&mut out, "train", &s.train);
    match &s.filesystem {
        Some(fs) => {
            let _ = writeln!(
                out,
                "filesystem: {} available of {}",
                format_bytes(fs.available_bytes),
                format_bytes(fs.total_bytes)
            );
        }
        None => {
            let _ = writeln!(out, "filesystem: unavailable");
        }
    }
    out.push('\n');

    let _ = writeln!(out, "== upload ==");
    let _ = writeln!(
        out,
        "bucket {} full in {}",
        format_bytes(s.bucket.quota_bytes),
        format_eta(s.bucket.eta)
    );
    let _ = writeln!(
        out,
        "buffered files: {} logs, {} train",
        s.logs.quota.file_count, s.train.quota.file_count
    );
    let _ = writeln!(out, "next upload in {}", format_duration_secs(s.next_upload_secs));

    out
}
