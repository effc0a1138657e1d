//! Command-line arguments and their resolution into a run configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;

/// Command-line arguments for hnkeep.
#[derive(Parser, Debug)]
#[command(name = "hnkeep")]
#[command(about = "Migrate Harmonic-HN bookmark exports to Karakeep")]
#[command(version)]
pub struct Args {
    /// Input file path, e.g. harmonic-export.txt (default: stdin)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Output file path, e.g. karakeep-import.json (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Show progress messages during fetch/sync
    #[arg(long)]
    pub verbose: bool,

    /// Preview conversion without API calls
    #[arg(long)]
    pub dry_run: bool,

    /// Only include bookmarks before this date (YYYY-MM-DD, RFC3339, or unix seconds)
    #[arg(long, value_name = "DATE")]
    pub before: Option<String>,

    /// Only include bookmarks after this date (YYYY-MM-DD, RFC3339, or unix seconds)
    #[arg(long, value_name = "DATE")]
    pub after: Option<String>,

    /// Number of bookmarks to process (0 = all)
    #[arg(short = 'n', long, default_value_t = 0)]
    pub limit: usize,

    /// Number of concurrent API calls
    #[arg(short, long, default_value_t = 5)]
    pub concurrency: usize,

    /// Comma-separated tags added to all imported bookmarks
    /// (default: src:hackernews,hnkeep:<today>)
    #[arg(short, long, value_name = "TAGS")]
    pub tags: Option<String>,

    /// Template for the note field (empty = no note). Variables:
    /// {{smart_url}}, {{item_url}}, {{hn_url}}, {{id}}, {{title}},
    /// {{author}}, {{date}}
    #[arg(long, default_value = "{{smart_url}}", value_name = "TEMPLATE")]
    pub note_template: String,

    /// Keep duplicate URLs instead of merging them
    #[arg(long)]
    pub no_dedupe: bool,

    /// Cache directory for Hacker News API responses
    /// (default: $XDG_CACHE_HOME/hnkeep or ~/.cache/hnkeep)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Disable caching of Hacker News API responses
    #[arg(long)]
    pub no_cache: bool,

    /// Clear the cache before running
    #[arg(long)]
    pub clear_cache: bool,

    /// Sync mode: push directly to the Karakeep API
    #[arg(long)]
    pub sync: bool,

    /// Karakeep API URL
    #[arg(long, env = "KARAKEEP_API_URL", value_name = "URL")]
    pub api_url: Option<String>,

    /// Karakeep API key
    #[arg(long, env = "KARAKEEP_API_KEY", hide_env_values = true, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Karakeep API request timeout in seconds
    #[arg(long, default_value_t = 30, value_name = "SECONDS")]
    pub api_timeout: u64,
}

/// Fully resolved run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub verbose: bool,
    pub dry_run: bool,
    /// Unix-seconds bounds; `None` means unbounded.
    pub before: Option<i64>,
    pub after: Option<i64>,
    pub limit: usize,
    pub concurrency: usize,
    pub tags: Vec<String>,
    pub note_template: String,
    pub dedupe: bool,
    /// `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    pub clear_cache: bool,
    pub sync: bool,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub api_timeout: Duration,
}

impl Args {
    /// Validates and resolves the raw arguments.
    pub fn resolve(self) -> Result<Config> {
        let before = self
            .before
            .as_deref()
            .map(parse_date)
            .transpose()
            .context("parsing --before date")?;
        let after = self
            .after
            .as_deref()
            .map(parse_date)
            .transpose()
            .context("parsing --after date")?;

        let tags = split_tags(&self.tags.unwrap_or_else(default_tags));

        let cache_dir = if self.no_cache {
            None
        } else {
            self.cache_dir.or_else(default_cache_dir)
        };

        if self.sync {
            if self.api_url.is_none() {
                bail!("--sync requires --api-url or KARAKEEP_API_URL to be set");
            }
            if self.api_key.is_none() {
                bail!("--sync requires --api-key or KARAKEEP_API_KEY to be set");
            }
        }

        Ok(Config {
            input: self.input,
            output: self.output,
            verbose: self.verbose,
            dry_run: self.dry_run,
            before,
            after,
            limit: self.limit,
            concurrency: self.concurrency.max(1),
            tags,
            note_template: self.note_template,
            dedupe: !self.no_dedupe,
            cache_dir,
            clear_cache: self.clear_cache,
            sync: self.sync,
            api_url: self.api_url,
            api_key: self.api_key,
            api_timeout: Duration::from_secs(self.api_timeout),
        })
    }
}

fn default_tags() -> String {
    format!("src:hackernews,hnkeep:{}", Utc::now().format("%Y%m%d"))
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

/// Cache directory per platform convention: `$XDG_CACHE_HOME/hnkeep`, else
/// `~/.cache/hnkeep`. `None` when no home directory can be determined.
fn default_cache_dir() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        if !xdg.is_empty() {
            return Some(PathBuf::from(xdg).join("hnkeep"));
        }
    }
    std::env::var("HOME")
        .ok()
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(".cache").join("hnkeep"))
}

/// Parses a date given as unix seconds, `YYYY-MM-DD` (UTC midnight), or
/// RFC3339.
fn parse_date(value: &str) -> Result<i64> {
    if let Ok(ts) = value.parse::<i64>() {
        return Ok(ts);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        return Ok(midnight.and_utc().timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp());
    }
    bail!("invalid date format: {value}")
}
