//! End-to-end pipeline orchestration: read input, parse, filter, fetch,
//! convert, then export to a file or sync against a Karakeep server.

use std::io::{IsTerminal, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::CommandFactory;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{Args, Config};
use crate::converter::{ConvertOptions, Converter, ItemFetcher, Schema};
use crate::hackernews::{CachedClient, HnClient};
use crate::harmonic::{self, HarmonicBookmark};
use crate::karakeep::KarakeepClient;
use crate::output::{stderr_is_tty, ProgressLine, Stats};
use crate::syncer::Syncer;

/// Reads the whole input from a file, or stdin when no path is given.
fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("reading stdin")?;
            Ok(input)
        }
    }
}

/// Writes the export as pretty-printed JSON to a file, or stdout when no
/// path is given.
fn write_output(path: Option<&Path>, export: &Schema) -> Result<()> {
    match path {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            let mut writer = std::io::BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, export)?;
            use std::io::Write;
            writeln!(writer)?;
            Ok(())
        }
        None => {
            let stdout = std::io::stdout().lock();
            let mut writer = std::io::BufWriter::new(stdout);
            serde_json::to_writer_pretty(&mut writer, export)?;
            use std::io::Write;
            writeln!(writer)?;
            Ok(())
        }
    }
}

/// Keeps bookmarks whose timestamp falls inside the optional bounds.
fn filter_by_date(
    bookmarks: Vec<HarmonicBookmark>,
    before: Option<i64>,
    after: Option<i64>,
) -> Vec<HarmonicBookmark> {
    if before.is_none() && after.is_none() {
        return bookmarks;
    }
    bookmarks
        .into_iter()
        .filter(|bm| after.map_or(true, |ts| bm.timestamp >= ts))
        .filter(|bm| before.map_or(true, |ts| bm.timestamp <= ts))
        .collect()
}

/// Runs the whole pipeline for one invocation.
pub async fn run(token: &CancellationToken, config: Config) -> Result<()> {
    let mut stats = Stats::default();

    // bare invocation on a terminal: show usage instead of waiting on stdin
    if config.input.is_none() && std::io::stdin().is_terminal() {
        Args::command().print_help()?;
        return Ok(());
    }

    let input = read_input(config.input.as_deref())?;
    let bookmarks = harmonic::parse(&input).context("parsing input")?;
    stats.found = bookmarks.len();

    let mut bookmarks = filter_by_date(bookmarks, config.before, config.after);
    stats.after_filter = bookmarks.len();
    if config.limit > 0 && config.limit < bookmarks.len() {
        bookmarks.truncate(config.limit);
    }
    stats.after_limit = bookmarks.len();

    if bookmarks.is_empty() {
        eprintln!(
            "Warning: no bookmarks to process (found {}, all filtered out)",
            stats.found
        );
        return Ok(());
    }

    // upfront connectivity check for sync mode (includes dry runs, so a bad
    // key is caught before the user trusts the preview)
    let karakeep_client = if config.sync {
        let api_url = config
            .api_url
            .as_deref()
            .context("sync mode requires an API URL")?;
        let api_key = config
            .api_key
            .as_deref()
            .context("sync mode requires an API key")?;
        let client = KarakeepClient::new(api_url, api_key, config.api_timeout)?;

        info!("checking Karakeep API connectivity");
        client
            .check_connectivity(token)
            .await
            .context("karakeep API check failed")?;
        Some(Arc::new(client))
    } else {
        None
    };

    if config.dry_run {
        stats.print_dry_run(&bookmarks);
        return Ok(());
    }

    // compose the fetcher: plain client, or the caching wrapper
    let client = HnClient::new()?;
    let mut cached_client: Option<Arc<CachedClient>> = None;
    let fetcher: Arc<dyn ItemFetcher> = match &config.cache_dir {
        Some(dir) => {
            let cached = Arc::new(
                CachedClient::new(client, dir).context("creating cached client")?,
            );
            if config.clear_cache {
                cached.clear_cache().await.context("clearing cache")?;
            }
            cached_client = Some(Arc::clone(&cached));
            cached
        }
        None => Arc::new(client),
    };

    // progress lines only when a human is watching and logs are quiet
    let show_progress = !config.verbose && stderr_is_tty();
    let fetch_progress = show_progress.then(|| Arc::new(ProgressLine::new("Fetching")));

    let mut converter = Converter::new(fetcher).with_concurrency(config.concurrency);
    if let Some(progress) = &fetch_progress {
        converter = converter.with_progress(Arc::clone(progress));
    }

    let fetch_start = Instant::now();
    let items = converter.fetch_items(token, &bookmarks).await;
    stats.fetch_duration = fetch_start.elapsed();
    if let Some(progress) = &fetch_progress {
        progress.clear();
    }
    let items = items.context("fetching items")?;
    stats.skipped = stats.after_limit.saturating_sub(items.len());

    if let Some(cached) = &cached_client {
        stats.cache_hits = cached.cache_hits() as usize;
    }

    let options = ConvertOptions {
        tags: config.tags.clone(),
        note_template: config.note_template.clone(),
        dedupe: config.dedupe,
    };
    let (export, deduped) = converter.convert(&bookmarks, &items, &options);
    stats.deduped = deduped;
    stats.converted = export.bookmarks.len();

    // sync mode: push directly to the Karakeep API
    if let Some(client) = karakeep_client {
        if config.output.is_some() {
            eprintln!("Warning: --output is ignored in sync mode");
        }

        // pre-fetch existing bookmarks; create-or-get dedupes server-side,
        // this sizes the run for the summary
        info!("pre-fetching existing bookmarks");
        let existing = client
            .list_bookmarks(token)
            .await
            .context("pre-fetching bookmarks")?;
        stats.prefetched = existing.len();
        info!(count = existing.len(), "pre-fetched existing bookmarks");

        let sync_progress = show_progress.then(|| Arc::new(ProgressLine::new("Syncing")));
        let mut syncer =
            Syncer::new(Arc::clone(&client)).with_concurrency(config.concurrency);
        if let Some(progress) = &sync_progress {
            syncer = syncer.with_progress(Arc::clone(progress));
        }

        let sync_start = Instant::now();
        let report = syncer.sync(token, export.bookmarks).await;
        stats.sync_duration = sync_start.elapsed();
        if let Some(progress) = &sync_progress {
            progress.clear();
        }

        // the partial tally is still worth showing on an interrupted run
        stats.print_sync_summary(&report);

        if token.is_cancelled() {
            bail!("sync interrupted");
        }

        // non-zero exit on any failed bookmark; details already printed
        if report.failed() > 0 {
            bail!("{} bookmark(s) failed to sync", report.failed());
        }
        return Ok(());
    }

    // default mode: write the import file
    write_output(config.output.as_deref(), &export)?;
    stats.print_summary();
    Ok(())
}
