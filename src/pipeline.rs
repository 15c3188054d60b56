use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::cli::RunArgs;
use crate::config::Config;
use crate::error::{RewriteError, SearchError, SheetWriteError};
use crate::extract::StructuredExtractor;
use crate::formats::{FlatRow, PageResult};
use crate::rewrite::QueryRewriter;
use crate::search::UrlFinder;
use crate::sheet::SheetWriter;

#[async_trait]
pub trait Rewriter: Send {
    async fn rewrite(&mut self, query: &str) -> Result<String, RewriteError>;
}

#[async_trait]
pub trait UrlSource: Send + Sync {
    async fn find(&self, description: &str, limit: usize) -> Result<Vec<String>, SearchError>;
}

#[async_trait]
pub trait PageExtractor: Send + Sync {
    async fn extract_all(&self, urls: &[String]) -> Vec<PageResult>;
}

#[async_trait]
pub trait SheetSink: Send + Sync {
    async fn write(
        &self,
        rows: &[FlatRow],
        title: Option<&str>,
    ) -> Result<Option<String>, SheetWriteError>;
}

#[async_trait]
impl Rewriter for QueryRewriter {
    async fn rewrite(&mut self, query: &str) -> Result<String, RewriteError> {
        QueryRewriter::rewrite(self, query).await
    }
}

#[async_trait]
impl UrlSource for UrlFinder {
    async fn find(&self, description: &str, limit: usize) -> Result<Vec<String>, SearchError> {
        UrlFinder::find(self, description, limit).await
    }
}

#[async_trait]
impl PageExtractor for StructuredExtractor {
    async fn extract_all(&self, urls: &[String]) -> Vec<PageResult> {
        StructuredExtractor::extract_all(self, urls).await
    }
}

#[async_trait]
impl SheetSink for SheetWriter {
    async fn write(
        &self,
        rows: &[FlatRow],
        title: Option<&str>,
    ) -> Result<Option<String>, SheetWriteError> {
        SheetWriter::write(self, rows, title).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Rewriting,
    Searching,
    Extracting,
    Flattening,
    Writing,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    NoUrls,
    NoRows,
    NoLink,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            AbortReason::NoUrls => "No relevant URLs found.",
            AbortReason::NoRows => "No user interactions could be extracted from the pages.",
            AbortReason::NoLink => "Failed to retrieve the Google Sheets link.",
        };
        f.write_str(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done { link: String },
    Aborted { at: Stage, reason: AbortReason },
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub description: String,
    pub rewrite_fell_back: bool,
    pub urls: Vec<String>,
    pub pages: Vec<PageResult>,
    pub rows: Vec<FlatRow>,
    pub stages: Vec<Stage>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub query: String,
    pub num_links: usize,
    pub title: Option<String>,
}

/// Milestones reported while a run is in flight, before the stage that
/// follows them starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress<'a> {
    Searching { description: &'a str, fell_back: bool },
    UrlsFound(&'a [String]),
    Flattened { pages: usize, rows: usize },
}

/// Drives one lead-generation run through every stage in order.
pub struct Pipeline<R, U, E, S> {
    pub rewriter: R,
    pub finder: U,
    pub extractor: E,
    pub sink: S,
}

impl<R, U, E, S> Pipeline<R, U, E, S>
where
    R: Rewriter,
    U: UrlSource,
    E: PageExtractor,
    S: SheetSink,
{
    pub async fn run(&mut self, request: &RunRequest) -> anyhow::Result<RunReport> {
        self.run_with_progress(request, &mut |_| {}).await
    }

    pub async fn run_with_progress(
        &mut self,
        request: &RunRequest,
        progress: &mut (dyn FnMut(Progress<'_>) + Send),
    ) -> anyhow::Result<RunReport> {
        let mut stages = vec![Stage::Idle];

        stages.push(Stage::Rewriting);
        let (description, rewrite_fell_back) = match self.rewriter.rewrite(&request.query).await {
            Ok(phrase) => (phrase, false),
            Err(err) => {
                tracing::warn!(error = %err, "query rewrite failed; searching with the raw query");
                (request.query.trim().to_owned(), true)
            }
        };
        tracing::info!(description = %description, "searching for");
        progress(Progress::Searching {
            description: &description,
            fell_back: rewrite_fell_back,
        });

        stages.push(Stage::Searching);
        let urls = self
            .finder
            .find(&description, request.num_links)
            .await
            .context("search for forum pages")?;

        let mut report = RunReport {
            description,
            rewrite_fell_back,
            urls,
            pages: Vec::new(),
            rows: Vec::new(),
            stages,
            outcome: Outcome::Aborted {
                at: Stage::Idle,
                reason: AbortReason::NoUrls,
            },
        };

        if report.urls.is_empty() {
            return Ok(report.abort(Stage::Searching, AbortReason::NoUrls));
        }
        progress(Progress::UrlsFound(&report.urls));

        report.stages.push(Stage::Extracting);
        report.pages = self.extractor.extract_all(&report.urls).await;
        let empty_pages = report
            .pages
            .iter()
            .filter(|p| p.interactions().is_empty())
            .count();
        tracing::info!(
            pages = report.pages.len(),
            empty_pages,
            "extraction finished"
        );

        report.stages.push(Stage::Flattening);
        report.rows = crate::flatten::flatten(&report.pages);
        tracing::info!(rows = report.rows.len(), "rows flattened");
        progress(Progress::Flattened {
            pages: report.pages.len(),
            rows: report.rows.len(),
        });

        report.stages.push(Stage::Writing);
        let link = self
            .sink
            .write(&report.rows, request.title.as_deref())
            .await
            .context("write spreadsheet")?;

        Ok(match link {
            Some(link) => {
                report.stages.push(Stage::Done);
                report.outcome = Outcome::Done { link };
                report
            }
            None if report.rows.is_empty() => report.abort(Stage::Writing, AbortReason::NoRows),
            None => report.abort(Stage::Writing, AbortReason::NoLink),
        })
    }
}

impl RunReport {
    fn abort(mut self, at: Stage, reason: AbortReason) -> Self {
        tracing::warn!(stage = ?at, %reason, "run aborted");
        self.stages.push(Stage::Aborted);
        self.outcome = Outcome::Aborted { at, reason };
        self
    }

    pub fn final_stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Idle)
    }
}

pub async fn run(args: RunArgs, config: &Config) -> anyhow::Result<()> {
    let firecrawl_key = config.require_firecrawl_key()?;
    let gemini_keys = config.require_gemini_keys()?.to_vec();
    let composio_key = config.require_composio_key()?;
    if args.query.trim().is_empty() {
        anyhow::bail!("--query must describe the leads you are looking for");
    }
    if let Some(path) = args.rows_out.as_deref()
        && PathBuf::from(path).exists()
    {
        anyhow::bail!("rows output already exists: {path}");
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(180))
        .build()
        .context("build http client")?;
    let domain = args.domain.as_deref().unwrap_or(&config.forum_domain);

    let mut pipeline = Pipeline {
        rewriter: QueryRewriter::new(
            client.clone(),
            &config.gemini_base_url,
            &config.gemini_model,
            gemini_keys,
        )?,
        finder: UrlFinder::new(client.clone(), &config.firecrawl_base_url, firecrawl_key, domain),
        extractor: StructuredExtractor::new(
            client.clone(),
            &config.firecrawl_base_url,
            firecrawl_key,
            config.extract.clone(),
        ),
        sink: SheetWriter::new(
            client,
            &config.composio_base_url,
            composio_key,
            &config.composio_entity_id,
        ),
    };

    let request = RunRequest {
        query: args.query.clone(),
        num_links: usize::from(args.num_links),
        title: args.title.clone(),
    };
    let report = pipeline
        .run_with_progress(&request, &mut print_progress)
        .await?;

    if let Some(path) = args.rows_out.as_deref()
        && !report.rows.is_empty()
    {
        crate::formats::write_jsonl(&PathBuf::from(path), &report.rows)
            .context("write rows output")?;
    }

    match &report.outcome {
        Outcome::Done { link } => {
            println!("Wrote {} lead(s) to Google Sheets.", report.rows.len());
            println!("Google Sheets link: {link}");
        }
        Outcome::Aborted { reason, .. } => println!("{reason}"),
    }
    Ok(())
}

fn print_progress(event: Progress<'_>) {
    match event {
        Progress::Searching { description, .. } => println!("Searching for: {description}"),
        Progress::UrlsFound(urls) => {
            println!("Forum links used:");
            for url in urls {
                println!("  {url}");
            }
        }
        Progress::Flattened { pages, rows } => {
            println!("Extracted {rows} interaction(s) from {pages} page(s).");
        }
    }
}
