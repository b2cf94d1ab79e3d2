//! Banner census over a dump: one JSON line per talk page.
//!
//! Two strategies share the per-page work:
//! - Sequential (baseline, with a progress spinner)
//! - Channel-pipeline (reader thread, worker threads, order-preserving writer)

use crate::classify::{resolve_redirects, BannerCatalog, BannerGroup, ClassifiedBanner, Classifier, StaticRedirects};
use crate::config::RaterConfig;
use crate::dump::{extract_page, is_talk_namespace, scan_pages, RawPage};
use crate::error::Result;
use crate::parser::parse_all;
use crate::template::ParsedTemplate;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{BufRead, BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

fn is_false(b: &bool) -> bool {
    !*b
}

/// Configuration for parallel processing
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Channel buffer size for pipeline processing
    pub channel_buffer: usize,
    /// Number of worker threads for pipeline
    pub num_workers: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        let cpus = thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4);
        Self {
            channel_buffer: 10000,
            num_workers: cpus.saturating_sub(1).max(1),
        }
    }
}

/// Everything a worker needs to classify a page.
#[derive(Debug, Default)]
pub struct CensusContext {
    pub config: RaterConfig,
    pub catalog: BannerCatalog,
    pub redirects: Option<StaticRedirects>,
    /// Talk namespaces to keep; empty keeps them all
    pub namespaces: Vec<i64>,
}

impl CensusContext {
    pub fn new(config: RaterConfig, catalog: BannerCatalog) -> Self {
        CensusContext {
            config,
            catalog,
            redirects: None,
            namespaces: vec![1],
        }
    }

    fn wants(&self, namespace: i64) -> bool {
        is_talk_namespace(namespace) && (self.namespaces.is_empty() || self.namespaces.contains(&namespace))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BannerReport {
    pub name: String,
    pub canonical: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_target: Option<String>,
    pub in_shell: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<BannerGroup>,
    #[serde(skip_serializing_if = "is_false")]
    pub without_ratings: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub inactive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageReport {
    pub title: String,
    pub namespace: i64,
    pub has_shell: bool,
    pub banners: Vec<BannerReport>,
}

#[derive(Debug)]
pub enum PageOutcome {
    /// No title, nothing to report
    Skipped,
    NonTalk,
    Redirect,
    Talk(PageReport),
}

/// Result of page processing
#[derive(Debug)]
pub struct ProcessedPage {
    pub page_id: usize,
    pub outcome: PageOutcome,
}

#[derive(Debug, Default, Clone)]
pub struct Stats {
    pub pages_processed: usize,
    pub talk_pages: usize,
    pub pages_with_banners: usize,
    pub pages_with_shell: usize,
    pub banners_found: usize,
    pub non_talk: usize,
    pub redirects: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

fn rating(template: &ParsedTemplate, param: &str) -> Option<String> {
    template
        .get_param(param)
        .map(|p| p.value.clone())
        .filter(|value| !value.is_empty())
}

/// Classify the banners on one talk page.
pub fn census_page(page: &RawPage, classifier: &Classifier<'_>, context: &CensusContext) -> PageReport {
    let mut templates = parse_all(&page.text, true);
    if let Some(redirects) = &context.redirects {
        if let Err(err) = resolve_redirects(&mut templates, redirects, &context.config) {
            tracing::warn!(title = %page.title, "{}", err);
        }
    }
    let banners = classifier.classify_with_groups(templates);

    let shell = banners
        .iter()
        .map(|b| &b.template)
        .find(|b| classifier.shell().is_shell(b));
    let shell_content = shell
        .and_then(|s| s.get_param("1"))
        .map(|p| p.value.as_str())
        .unwrap_or_default();

    let reports = banners
        .iter()
        .filter(|b| !classifier.shell().is_shell(&b.template))
        .map(|classified: &ClassifiedBanner| {
            let banner = &classified.template;
            BannerReport {
                name: banner.name.clone(),
                canonical: classified.canonical.clone(),
                class: rating(banner, &banner.class_param_name),
                importance: rating(banner, &banner.importance_param_name),
                redirect_target: banner.redirect_target.as_ref().map(|t| t.main_text().to_string()),
                in_shell: !shell_content.is_empty() && shell_content.contains(banner.wikitext.as_str()),
                groups: classified.groups.clone(),
                without_ratings: banner.without_ratings,
                inactive: banner.inactive_project,
            }
        })
        .collect();

    PageReport {
        title: page.title.clone(),
        namespace: page.namespace,
        has_shell: shell.is_some(),
        banners: reports,
    }
}

pub fn process_page_xml(
    page_xml: &str,
    page_id: usize,
    classifier: &Classifier<'_>,
    context: &CensusContext,
) -> ProcessedPage {
    let outcome = match extract_page(page_xml, page_id) {
        None => PageOutcome::Skipped,
        Some(page) if !context.wants(page.namespace) => PageOutcome::NonTalk,
        Some(page) if page.is_redirect => PageOutcome::Redirect,
        Some(page) => PageOutcome::Talk(census_page(&page, classifier, context)),
    };
    ProcessedPage { page_id, outcome }
}

fn update_stats_from_result(stats: &mut Stats, result: &ProcessedPage) {
    stats.pages_processed += 1;
    match &result.outcome {
        PageOutcome::Skipped => stats.skipped += 1,
        PageOutcome::NonTalk => stats.non_talk += 1,
        PageOutcome::Redirect => stats.redirects += 1,
        PageOutcome::Talk(report) => {
            stats.talk_pages += 1;
            stats.banners_found += report.banners.len();
            if !report.banners.is_empty() {
                stats.pages_with_banners += 1;
            }
            if report.has_shell {
                stats.pages_with_shell += 1;
            }
        }
    }
}

fn write_result<W: Write>(result: &ProcessedPage, stats: &mut Stats, writer: &mut W) -> Result<()> {
    update_stats_from_result(stats, result);
    if let PageOutcome::Talk(report) = &result.outcome {
        serde_json::to_writer(&mut *writer, report)?;
        writeln!(writer)?;
    }
    Ok(())
}

/// Strategy 1: sequential processing on the calling thread
pub fn process_sequential<W: Write>(
    reader: impl BufRead,
    writer: &mut BufWriter<W>,
    context: &CensusContext,
    page_limit: Option<usize>,
    quiet: bool,
) -> Result<Stats> {
    let start_time = Instant::now();
    let mut stats = Stats::default();
    let classifier = Classifier::new(&context.config, &context.catalog);

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
            pb.set_style(style);
        }
        pb
    };

    let mut page_id = 0;
    let mut failure = None;
    scan_pages(reader, |page_xml| {
        if page_limit.map_or(false, |limit| page_id >= limit) {
            return false;
        }

        let result = process_page_xml(&page_xml, page_id, &classifier, context);
        page_id += 1;
        if let Err(err) = write_result(&result, &mut stats, &mut *writer) {
            failure = Some(err);
            return false;
        }

        if !quiet && stats.pages_processed % 1000 == 0 {
            let rate = stats.pages_processed as f64 / start_time.elapsed().as_secs_f64();
            pb.set_message(format!(
                "Pages: {} | Talk: {} | Banners: {} | Rate: {:.0} pg/s",
                stats.pages_processed, stats.talk_pages, stats.banners_found, rate
            ));
        }
        true
    })?;
    if let Some(err) = failure {
        return Err(err);
    }

    writer.flush()?;
    match page_limit {
        Some(limit) if page_id >= limit && !quiet => {
            pb.finish_with_message(format!("Reached limit of {} pages", limit))
        }
        _ => pb.finish_and_clear(),
    }

    stats.elapsed = start_time.elapsed();
    Ok(stats)
}

/// Strategy 2: channel pipeline
///
/// A reader thread splits pages off the dump, workers classify them, and the
/// calling thread writes results back in dump order.
pub fn process_channel_pipeline<W: Write + Send + 'static>(
    reader: impl BufRead + Send + 'static,
    writer: W,
    context: Arc<CensusContext>,
    config: &ParallelConfig,
    page_limit: Option<usize>,
) -> Result<Stats> {
    let (page_tx, page_rx): (SyncSender<(usize, String)>, Receiver<(usize, String)>) =
        sync_channel(config.channel_buffer);
    let (result_tx, result_rx): (SyncSender<ProcessedPage>, Receiver<ProcessedPage>) =
        sync_channel(config.channel_buffer);

    let stop = Arc::new(AtomicBool::new(false));
    let start_time = Instant::now();

    let reader_stop = Arc::clone(&stop);
    let reader_handle = thread::spawn(move || read_pages_to_channel(reader, page_tx, &reader_stop, page_limit));

    let page_rx = Arc::new(Mutex::new(page_rx));
    let worker_handles: Vec<JoinHandle<()>> = (0..config.num_workers.max(1))
        .map(|_| {
            let rx = Arc::clone(&page_rx);
            let tx = result_tx.clone();
            let stop = Arc::clone(&stop);
            let context = Arc::clone(&context);
            thread::spawn(move || process_pages_worker(rx, tx, &stop, &context))
        })
        .collect();

    // Channel closes once every worker is done
    drop(result_tx);

    let written = write_results_sorted(result_rx, writer, &stop);

    let read = reader_handle.join();
    for handle in worker_handles {
        handle.join().ok();
    }

    let mut stats = written?;
    if let Ok(Err(err)) = read {
        return Err(err.into());
    }
    stats.elapsed = start_time.elapsed();
    Ok(stats)
}

fn read_pages_to_channel(
    reader: impl BufRead,
    tx: SyncSender<(usize, String)>,
    stop: &AtomicBool,
    page_limit: Option<usize>,
) -> std::io::Result<usize> {
    let mut page_id: usize = 0;
    scan_pages(reader, |page_xml| {
        if stop.load(Ordering::Relaxed) || page_limit.map_or(false, |limit| page_id >= limit) {
            return false;
        }
        if tx.send((page_id, page_xml)).is_err() {
            return false;
        }
        page_id += 1;
        true
    })?;
    Ok(page_id)
}

fn process_pages_worker(
    rx: Arc<Mutex<Receiver<(usize, String)>>>,
    tx: SyncSender<ProcessedPage>,
    stop: &AtomicBool,
    context: &CensusContext,
) {
    let classifier = Classifier::new(&context.config, &context.catalog);
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let item = {
            let lock = rx.lock().ok();
            lock.and_then(|guard| guard.recv().ok())
        };

        match item {
            Some((page_id, xml)) => {
                let result = process_page_xml(&xml, page_id, &classifier, context);
                if tx.send(result).is_err() {
                    break;
                }
            }
            None => break,
        }
    }
}

/// Write results in page order through a reorder buffer.
///
/// Every page id yields exactly one result, so the buffer only holds pages
/// that finished ahead of a slower predecessor.
fn write_results_sorted<W: Write>(rx: Receiver<ProcessedPage>, writer: W, stop: &AtomicBool) -> Result<Stats> {
    let mut writer = BufWriter::with_capacity(256 * 1024, writer);
    let mut stats = Stats::default();

    let mut pending: BTreeMap<usize, ProcessedPage> = BTreeMap::new();
    let mut next_expected: usize = 0;

    let mut write_ready = |result: ProcessedPage, stats: &mut Stats| -> Result<()> {
        write_result(&result, stats, &mut writer).map_err(|err| {
            stop.store(true, Ordering::SeqCst);
            err
        })
    };

    for result in rx {
        if result.page_id != next_expected {
            pending.insert(result.page_id, result);
            continue;
        }
        write_ready(result, &mut stats)?;
        next_expected += 1;

        while let Some(buffered) = pending.remove(&next_expected) {
            write_ready(buffered, &mut stats)?;
            next_expected += 1;
        }
    }

    // Only reachable with gaps, i.e. a worker that died mid-page
    while let Some((_, result)) = pending.pop_first() {
        write_ready(result, &mut stats)?;
    }

    writer.flush()?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const DUMP: &str = r#"<mediawiki>
<page><title>Talk:Chess</title><ns>1</ns><text xml:space="preserve">{{WikiProject banner shell|class=B|
{{WikiProject Chess|importance=Top}}
{{WikiProject Games}}
}}
{{Old move|from=Chess (game)}}</text></page>
<page><title>Chess</title><ns>0</ns><text xml:space="preserve">'''Chess''' is a game.</text></page>
<page><title>Talk:Go</title><ns>1</ns><text xml:space="preserve">{{WPGames|class=C|importance=Mid}}
{{WikiProject Dead}}</text></page>
<page><title>Talk:Draughts</title><ns>1</ns><redirect title="Talk:Checkers" /><text xml:space="preserve">#REDIRECT [[Talk:Checkers]]</text></page>
<page><title>User talk:Someone</title><ns>3</ns><text xml:space="preserve">{{WikiProject Chess}}</text></page>
<page><title>Talk:Empty</title><ns>1</ns><text xml:space="preserve">Nothing here.</text></page>
</mediawiki>"#;

    fn context() -> CensusContext {
        let config = RaterConfig::default();
        let catalog = BannerCatalog {
            with_ratings: vec!["WikiProject Chess".into(), "WikiProject Games".into()],
            inactive: vec!["WikiProject Dead".into()],
            ..BannerCatalog::default()
        };
        let redirects = StaticRedirects::new(
            [("WPGames".to_string(), "WikiProject Games".to_string())].into_iter().collect(),
            &config,
        );
        CensusContext {
            redirects: Some(redirects),
            ..CensusContext::new(config, catalog)
        }
    }

    fn run_sequential(limit: Option<usize>) -> (Stats, Vec<serde_json::Value>) {
        let mut writer = BufWriter::new(Vec::new());
        let stats = process_sequential(Cursor::new(DUMP), &mut writer, &context(), limit, true).unwrap();
        let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        (stats, lines)
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Per-page census
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn reports_banners_and_shell_membership() {
        let (_, lines) = run_sequential(None);
        let chess = &lines[0];
        assert_eq!(chess["title"], "Talk:Chess");
        assert_eq!(chess["has_shell"], true);

        let banners = chess["banners"].as_array().unwrap();
        assert_eq!(banners.len(), 2);
        assert_eq!(banners[0]["name"], "WikiProject Chess");
        assert_eq!(banners[0]["importance"], "Top");
        assert_eq!(banners[0]["in_shell"], true);
        assert_eq!(banners[0]["groups"][0], "with-ratings");
        assert!(banners[0].get("class").is_none());
    }

    #[test]
    fn follows_redirects_and_flags_inactive() {
        let (_, lines) = run_sequential(None);
        let go = &lines[1];
        assert_eq!(go["title"], "Talk:Go");
        assert_eq!(go["has_shell"], false);

        let banners = go["banners"].as_array().unwrap();
        assert_eq!(banners[0]["name"], "WPGames");
        assert_eq!(banners[0]["canonical"], "WikiProject Games");
        assert_eq!(banners[0]["redirect_target"], "WikiProject Games");
        assert_eq!(banners[0]["class"], "C");
        assert_eq!(banners[0]["in_shell"], false);
        assert_eq!(banners[1]["inactive"], true);
    }

    #[test]
    fn wrapper_keeps_its_own_name_and_group() {
        let context = CensusContext::new(
            RaterConfig::default(),
            BannerCatalog {
                wrappers: vec!["WikiProject Dinosaurs/Wrapper".into()],
                ..BannerCatalog::default()
            },
        );
        let classifier = Classifier::new(&context.config, &context.catalog);
        let page = RawPage {
            title: "Talk:Tyrannosaurus".to_string(),
            namespace: 1,
            text: "{{WikiProject Dinosaurs/Wrapper|class=C}}".to_string(),
            page_id: 0,
            is_redirect: false,
        };

        let report = census_page(&page, &classifier, &context);
        let banner = &report.banners[0];
        assert_eq!(banner.canonical, "WikiProject Dinosaurs/Wrapper");
        assert_eq!(banner.groups, vec![BannerGroup::Wrapper]);
        assert_eq!(banner.redirect_target.as_deref(), Some("Subst:WikiProject Dinosaurs/Wrapper"));
        assert_eq!(banner.class.as_deref(), Some("C"));
    }

    #[test]
    fn counts_every_kind_of_page() {
        let (stats, lines) = run_sequential(None);
        assert_eq!(lines.len(), 3);
        assert_eq!(stats.pages_processed, 6);
        assert_eq!(stats.talk_pages, 3);
        assert_eq!(stats.pages_with_banners, 2);
        assert_eq!(stats.pages_with_shell, 1);
        assert_eq!(stats.banners_found, 4);
        assert_eq!(stats.non_talk, 2);
        assert_eq!(stats.redirects, 1);
    }

    #[test]
    fn page_limit_stops_reading() {
        let (stats, lines) = run_sequential(Some(2));
        assert_eq!(stats.pages_processed, 2);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn all_talk_namespaces_when_unrestricted() {
        let context = CensusContext {
            namespaces: Vec::new(),
            ..context()
        };
        let mut writer = BufWriter::new(Vec::new());
        let stats = process_sequential(Cursor::new(DUMP), &mut writer, &context, None, true).unwrap();
        assert_eq!(stats.talk_pages, 4);
    }

    // ─────────────────────────────────────────────────────────────
    // Pipeline
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn pipeline_matches_sequential_output() {
        let mut expected = BufWriter::new(Vec::new());
        process_sequential(Cursor::new(DUMP), &mut expected, &context(), None, true).unwrap();
        let expected = expected.into_inner().unwrap();

        let buf = SharedBuf::default();
        let config = ParallelConfig {
            channel_buffer: 1,
            num_workers: 3,
        };
        let stats = process_channel_pipeline(
            Cursor::new(DUMP.to_string()),
            buf.clone(),
            Arc::new(context()),
            &config,
            None,
        )
        .unwrap();

        assert_eq!(stats.pages_processed, 6);
        assert_eq!(*buf.0.lock().unwrap(), expected);
    }

    #[test]
    fn pipeline_respects_page_limit() {
        let buf = SharedBuf::default();
        let stats = process_channel_pipeline(
            Cursor::new(DUMP.to_string()),
            buf,
            Arc::new(context()),
            &ParallelConfig::default(),
            Some(3),
        )
        .unwrap();
        assert_eq!(stats.pages_processed, 3);
        assert_eq!(stats.talk_pages, 2);
    }
}
