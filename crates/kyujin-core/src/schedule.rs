//! Interval schedules persisted to a JSON file, and the loop that fires them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::orchestrator::{CrawlOrchestrator, CrawlRequest, CrawlScope};
use crate::region::prefectures_by_region;
use crate::source::{ListingSource, SearchQuery};

pub const DEFAULT_SCHEDULE_FILE: &str = "schedules.json";

/// A named, periodically repeated crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub name: String,
    pub source: ListingSource,
    /// Prefecture (or free-text location for card sources).
    #[serde(default)]
    pub area: Option<String>,
    /// Region key; when set, the run fans out over its prefectures and `area` is ignored.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    pub interval_hours: u32,
    pub max_pages: u32,
    #[serde(default)]
    pub force: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

impl Schedule {
    /// The same request a manual start with these parameters would make.
    pub fn to_request(&self) -> Result<CrawlRequest, AppError> {
        let scope = match &self.region {
            Some(region) => {
                let areas = prefectures_by_region(region)
                    .ok_or_else(|| AppError::ConfigError(format!("Unknown region: {region}")))?;
                CrawlScope::Region {
                    region: region.clone(),
                    areas: areas.into_iter().map(String::from).collect(),
                    keyword: self.keyword.clone(),
                }
            }
            None => CrawlScope::Single(SearchQuery::new(self.area.clone(), self.keyword.clone())),
        };

        Ok(CrawlRequest {
            source: self.source,
            scope,
            max_pages: self.max_pages,
            force: self.force,
        })
    }
}

/// Never-run schedules are due immediately.
pub fn is_due(schedule: &Schedule, now: DateTime<Utc>) -> bool {
    match schedule.last_run {
        None => true,
        Some(last) => now - last >= TimeDelta::hours(i64::from(schedule.interval_hours)),
    }
}

/// Pretty-printed JSON list of schedules at a fixed path.
#[derive(Debug, Clone)]
pub struct ScheduleFile {
    path: PathBuf,
}

impl ScheduleFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as no schedules.
    pub async fn load(&self) -> Result<Vec<Schedule>, AppError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, schedules: &[Schedule]) -> Result<(), AppError> {
        let content = serde_json::to_string_pretty(schedules)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }

    /// Add a schedule, replacing any existing one with the same name.
    pub async fn add(&self, schedule: Schedule) -> Result<(), AppError> {
        if schedule.name.trim().is_empty() {
            return Err(AppError::ConfigError("Schedule name must not be empty".into()));
        }
        if schedule.interval_hours == 0 {
            return Err(AppError::ConfigError(
                "Schedule interval must be at least one hour".into(),
            ));
        }
        schedule.to_request()?;

        let mut schedules = self.load().await?;
        schedules.retain(|s| s.name != schedule.name);
        schedules.push(schedule);
        self.save(&schedules).await
    }

    /// Returns false when no schedule had that name.
    pub async fn remove(&self, name: &str) -> Result<bool, AppError> {
        let mut schedules = self.load().await?;
        let before = schedules.len();
        schedules.retain(|s| s.name != name);
        if schedules.len() == before {
            return Ok(false);
        }
        self.save(&schedules).await?;
        Ok(true)
    }

    pub async fn mark_run(&self, name: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut schedules = self.load().await?;
        let schedule = schedules
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| AppError::Generic(format!("Schedule not found: {name}")))?;
        schedule.last_run = Some(at);
        self.save(&schedules).await
    }
}

/// Polls the schedule file and starts due schedules through the orchestrator.
#[derive(Debug, Clone)]
pub struct Scheduler {
    poll_interval: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl Scheduler {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Run until cancellation. Cancellation is observed between polls only.
    pub async fn run(
        &self,
        orchestrator: &CrawlOrchestrator,
        file: &ScheduleFile,
        cancel: CancellationToken,
    ) -> Result<(), AppError> {
        tracing::info!(path = %file.path().display(), "Scheduler started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if let Err(e) = self.tick(orchestrator, file, Utc::now()).await {
                tracing::error!(error = %e, "Schedule evaluation failed");
            }

            tokio::select! {
                () = tokio::time::sleep(self.poll_interval) => {}
                () = cancel.cancelled() => break,
            }
        }

        tracing::info!("Scheduler stopped");
        Ok(())
    }

    /// Evaluate every schedule once. Returns the names whose runs were accepted.
    ///
    /// A schedule rejected because a run is active keeps its `last_run`, so it
    /// is retried on the next poll.
    pub async fn tick(
        &self,
        orchestrator: &CrawlOrchestrator,
        file: &ScheduleFile,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, AppError> {
        let mut started = Vec::new();

        for schedule in file.load().await? {
            if !is_due(&schedule, now) {
                continue;
            }

            let request = match schedule.to_request() {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(schedule = %schedule.name, error = %e, "Invalid schedule");
                    continue;
                }
            };

            match orchestrator.start(request) {
                Ok(()) => {
                    tracing::info!(schedule = %schedule.name, "Scheduled crawl started");
                    file.mark_run(&schedule.name, now).await?;
                    started.push(schedule.name);
                }
                Err(AppError::AlreadyRunning) => {
                    tracing::info!(schedule = %schedule.name, "Crawl in progress, retrying next poll");
                }
                Err(e) => {
                    tracing::warn!(schedule = %schedule.name, error = %e, "Scheduled crawl not started");
                }
            }
        }

        Ok(started)
    }
}
