use chrono::{DateTime, Utc};
use colored::*;
use log::{Level, LevelFilter, Metadata, Record};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::GeminiConfig;

static AD_LOGGER: Lazy<AdLogger> = Lazy::new(AdLogger::new);

pub fn init_with_config(config: LoggerConfig) -> Result<(), String> {
    let max_level = config.min_level.to_level_filter();
    AD_LOGGER.update_config(config)?;

    log::set_logger(&*AD_LOGGER).map_err(|e| format!("Failed to set logger: {:?}", e))?;
    log::set_max_level(max_level);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn color(&self) -> Color {
        match self {
            LogLevel::Trace => Color::Cyan,
            LogLevel::Debug => Color::Blue,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            LogLevel::Trace => "🔍",
            LogLevel::Debug => "🐛",
            LogLevel::Info => "💡",
            LogLevel::Warn => "⚠️",
            LogLevel::Error => "❌",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    pub fn to_level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }

    pub fn from_level(level: Level) -> Self {
        match level {
            Level::Trace => LogLevel::Trace,
            Level::Debug => LogLevel::Debug,
            Level::Info => LogLevel::Info,
            Level::Warn => LogLevel::Warn,
            Level::Error => LogLevel::Error,
        }
    }
}

/// One rendered log line; also the JSON shape for file/JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub target: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl LogEntry {
    fn from_record(record: &Record) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::from_level(record.level()),
            target: record.target().to_string(),
            message: record.args().to_string(),
            file: record.file().map(str::to_string),
            line: record.line(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    pub show_colors: bool,
    pub show_emojis: bool,
    pub show_target: bool,
    pub show_file_location: bool,
    pub timestamp_format: String,
    pub output_json: bool,
    pub log_file_path: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: true,
            show_emojis: true,
            show_target: false,
            show_file_location: false,
            timestamp_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
            output_json: false,
            log_file_path: None,
        }
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_colors(mut self, enabled: bool) -> Self {
        self.show_colors = enabled;
        self
    }

    pub fn with_file_output(mut self, path: &str) -> Self {
        self.log_file_path = Some(path.to_string());
        self
    }

    pub fn with_json_output(mut self, enabled: bool) -> Self {
        self.output_json = enabled;
        self
    }

    pub fn production() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: false,
            show_emojis: false,
            output_json: true,
            ..Default::default()
        }
    }

    pub fn development() -> Self {
        Self {
            min_level: LogLevel::Debug,
            show_target: true,
            show_file_location: true,
            ..Default::default()
        }
    }
}

struct LoggerState {
    config: LoggerConfig,
    file: Option<File>,
}

/// Console logger for the `log` facade. Writes to stderr so stdout stays
/// free for command output.
pub struct AdLogger {
    state: Mutex<LoggerState>,
}

impl AdLogger {
    fn new() -> Self {
        Self {
            state: Mutex::new(LoggerState {
                config: LoggerConfig::default(),
                file: None,
            }),
        }
    }

    fn update_config(&self, config: LoggerConfig) -> Result<(), String> {
        let file = match &config.log_file_path {
            Some(path) => Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| format!("Failed to open log file {}: {}", path, e))?,
            ),
            None => None,
        };

        let mut state = self
            .state
            .lock()
            .map_err(|_| "Logger state is poisoned".to_string())?;
        state.config = config;
        state.file = file;
        Ok(())
    }
}

fn format_line(entry: &LogEntry, config: &LoggerConfig) -> String {
    let mut output = String::new();

    let timestamp = entry.timestamp.format(&config.timestamp_format).to_string();
    if config.show_colors {
        output.push_str(&format!("{} ", timestamp.bright_black()));
    } else {
        output.push_str(&format!("{} ", timestamp));
    }

    let level = if config.show_emojis {
        format!("{} {}", entry.level.emoji(), entry.level.as_str())
    } else {
        entry.level.as_str().to_string()
    };
    if config.show_colors {
        output.push_str(&format!("[{}] ", level.color(entry.level.color()).bold()));
    } else {
        output.push_str(&format!("[{}] ", level));
    }

    if config.show_target {
        if config.show_colors {
            output.push_str(&format!("{}: ", entry.target.bright_blue()));
        } else {
            output.push_str(&format!("{}: ", entry.target));
        }
    }

    output.push_str(&entry.message);

    if config.show_file_location {
        if let (Some(file), Some(line)) = (&entry.file, entry.line) {
            let location = format!("{}:{}", file, line);
            if config.show_colors {
                output.push_str(&format!(" ({})", location.bright_black()));
            } else {
                output.push_str(&format!(" ({})", location));
            }
        }
    }

    output
}

fn render(entry: &LogEntry, config: &LoggerConfig) -> String {
    if config.output_json {
        serde_json::to_string(entry).unwrap_or_default()
    } else {
        format_line(entry, config)
    }
}

impl log::Log for AdLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        match self.state.lock() {
            Ok(state) => LogLevel::from_level(metadata.level()) >= state.config.min_level,
            Err(_) => true,
        }
    }

    fn log(&self, record: &Record) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if LogLevel::from_level(record.level()) < state.config.min_level {
            return;
        }

        let entry = LogEntry::from_record(record);
        eprintln!("{}", render(&entry, &state.config));

        if state.file.is_some() {
            // Files never get ANSI colors.
            let file_config = LoggerConfig {
                show_colors: false,
                ..state.config.clone()
            };
            let line = render(&entry, &file_config) + "\n";
            if let Some(file) = state.file.as_mut() {
                let _ = file.write_all(line.as_bytes());
            }
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
        if let Ok(mut state) = self.state.lock() {
            if let Some(file) = state.file.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

/// Logs how long an operation took when dropped.
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        log::debug!("⏱️  Starting timer: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        log::info!(
            "⏱️  {} completed in {:.2}s",
            self.name,
            self.elapsed().as_secs_f64()
        );
    }
}

pub fn timer(name: &str) -> Timer {
    Timer::new(name)
}

pub fn log_config_info(config: &GeminiConfig) {
    log::info!("⚙️  Configuration loaded:");
    log::info!("   Endpoint: {}", config.endpoint_url());
    log::info!(
        "   API key: {}",
        if config.api_key.is_some() { "✅" } else { "❌" }
    );
    log::info!("   Timeout: {}ms", config.timeout.as_millis());
    log::info!(
        "   Retry: {} attempts, {}ms initial delay, x{} backoff",
        config.retry.max_attempts,
        config.retry.initial_delay.as_millis(),
        config.retry.backoff_multiplier
    );
    log::info!("   Max image size: {} bytes", config.max_image_bytes);
}
