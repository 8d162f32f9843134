//! Logging setup driven by environment variables.
//!
//! - `LOG_MODE`: `stdout` (default) or `file`
//! - `LOG_LEVEL`: `trace`, `debug`, `info` (default), `warn` or `error`
//! - `LOG_DATA_DIR`: directory of the log files, `logs/` by default
//! - `LOG_MAX_SIZE`: size after which a new file is started, 1 GiB by default
//! - `IN_DOCKER`: when `true`, logs always go to `logs/`
//!
//! In file mode the indexer writes `indexer-YYYY-MM-DD.N.log`, where `N` grows each time
//! the current file is over `LOG_MAX_SIZE` at startup.

pub mod error;

use chrono::Utc;
use regex::Regex;
use std::{
	env,
	fs::{create_dir_all, metadata},
	path::{Path, PathBuf},
	sync::LazyLock,
};
use tracing::{info, Level, Subscriber};
use tracing_subscriber::{
	filter::EnvFilter,
	fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
	prelude::*,
	registry::LookupSpan,
};

use crate::utils::parsing::parse_string_to_bytes_size;

const DEFAULT_LOG_DIR: &str = "logs/";
const LOG_FILE_STEM: &str = "indexer";
const DEFAULT_MAX_SIZE: u64 = 1 << 30;

static ANSI_ESCAPE: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").ok());

fn strip_ansi_escapes(s: &str) -> String {
	match ANSI_ESCAPE.as_ref() {
		Some(re) => re.replace_all(s, "").into_owned(),
		None => s.to_string(),
	}
}

/// Wraps a formatter so colour codes never reach log files
struct PlainTextFormatter<T>(T);

impl<S, N, T> FormatEvent<S, N> for PlainTextFormatter<T>
where
	S: Subscriber + for<'a> LookupSpan<'a>,
	N: for<'a> FormatFields<'a> + 'static,
	T: FormatEvent<S, N>,
{
	fn format_event(
		&self,
		ctx: &FmtContext<'_, S, N>,
		mut writer: Writer<'_>,
		event: &tracing::Event<'_>,
	) -> std::fmt::Result {
		let mut line = String::new();
		self.0.format_event(ctx, Writer::new(&mut line), event)?;
		write!(writer, "{}", strip_ansi_escapes(&line))
	}
}

/// `logs/indexer.log` with date `2024-05-01` and index 2 becomes
/// `logs/indexer-2024-05-01.2.log`
pub fn compute_rolled_file_path(base_file_path: &str, date_str: &str, index: u32) -> String {
	let stem = base_file_path
		.strip_suffix(".log")
		.unwrap_or(base_file_path);
	format!("{}-{}.{}.log", stem, date_str, index)
}

/// Returns `file_path`, or the first following index of the day whose file is not over
/// `max_size` bytes.
pub fn space_based_rolling(
	file_path: &str,
	base_file_path: &str,
	date_str: &str,
	max_size: u64,
) -> String {
	let mut candidate = file_path.to_string();
	let mut next_index = 1;
	while metadata(&candidate).is_ok_and(|existing| existing.len() > max_size) {
		next_index += 1;
		candidate = compute_rolled_file_path(base_file_path, date_str, next_index);
	}
	candidate
}

fn level_from_env() -> Level {
	env::var("LOG_LEVEL")
		.ok()
		.and_then(|level| level.trim().parse::<Level>().ok())
		.unwrap_or(Level::INFO)
}

fn log_dir_from_env() -> PathBuf {
	let in_docker = env::var("IN_DOCKER").is_ok_and(|value| value == "true");
	let dir = match env::var("LOG_DATA_DIR") {
		Ok(dir) if !in_docker && !dir.trim().is_empty() => dir,
		_ => DEFAULT_LOG_DIR.to_string(),
	};
	PathBuf::from(dir)
}

fn parse_log_max_size() -> Result<u64, Box<dyn std::error::Error>> {
	match env::var("LOG_MAX_SIZE") {
		Ok(value) => parse_string_to_bytes_size(&value)
			.map_err(|e| format!("LOG_MAX_SIZE is not a valid size: {}", e).into()),
		Err(_) => Ok(DEFAULT_MAX_SIZE),
	}
}

/// Picks today's log file under `dir`, creating the directory if needed
fn current_log_file(dir: &Path, max_size: u64) -> Result<PathBuf, Box<dyn std::error::Error>> {
	create_dir_all(dir)?;
	let base_file_path = dir
		.join(format!("{}.log", LOG_FILE_STEM))
		.to_string_lossy()
		.into_owned();
	let date_str = Utc::now().format("%Y-%m-%d").to_string();
	let first = compute_rolled_file_path(&base_file_path, &date_str, 1);
	Ok(PathBuf::from(space_based_rolling(
		&first,
		&base_file_path,
		&date_str,
		max_size,
	)))
}

fn compact_format(with_ansi: bool) -> fmt::format::Format<fmt::format::Compact> {
	fmt::format()
		.with_level(true)
		.with_target(true)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_ansi(with_ansi)
		.compact()
}

/// Installs the global subscriber
pub fn setup_logging() -> Result<(), Box<dyn std::error::Error>> {
	let to_file = env::var("LOG_MODE").is_ok_and(|mode| mode.trim().eq_ignore_ascii_case("file"));
	let level = level_from_env();
	let registry = tracing_subscriber::registry().with(EnvFilter::new(level.to_string()));

	if to_file {
		let path = current_log_file(&log_dir_from_env(), parse_log_max_size()?)?;
		let directory = path.parent().unwrap_or(Path::new("."));
		let file_name = path.file_name().unwrap_or_default();

		registry
			.with(
				fmt::layer()
					.event_format(PlainTextFormatter(compact_format(false)))
					.with_writer(tracing_appender::rolling::never(directory, file_name))
					.fmt_fields(fmt::format::PrettyFields::new()),
			)
			.try_init()?;
		info!(path = %path.display(), level = %level, "Logging to file");
	} else {
		registry
			.with(
				fmt::layer()
					.event_format(compact_format(true))
					.fmt_fields(fmt::format::PrettyFields::new()),
			)
			.try_init()?;
		info!(level = %level, "Logging to stdout");
	}
	Ok(())
}
