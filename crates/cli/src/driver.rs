//! Drives a [`Session`] over HTTP with the headless platform.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use pagewarp_client::{HttpTransport, Request, Transport, extract_links};
use pagewarp_core::{SessionConfig, VisitKind};
use pagewarp_engine::{Headless, Navigation, Prefetched, Session, Summary};

use crate::cli::Cli;

#[derive(Debug, Serialize)]
pub struct Report {
    pub steps: Vec<Step>,
    pub summary: Summary,
}

#[derive(Debug, Serialize)]
pub struct Step {
    pub action: &'static str,
    pub target: String,
    pub outcome: String,
}

impl Step {
    fn new(action: &'static str, target: impl Into<String>, outcome: String) -> Self {
        Self { action, target: target.into(), outcome }
    }
}

pub async fn run(cli: &Cli) -> Result<Report> {
    let config = SessionConfig::load().context("failed to load configuration")?;
    let transport = Arc::new(HttpTransport::new(&config.request)?);
    walk(cli, config, transport).await
}

/// Land on `cli.start`, prefetch harvested links, visit every path, go back
/// and reload as requested.
pub async fn walk(cli: &Cli, config: SessionConfig, transport: Arc<dyn Transport>) -> Result<Report> {
    let headless = Headless::new(&cli.start);
    let session = Session::connect(&cli.origin, config, Arc::clone(&transport), headless.platform())?;
    let mut steps = Vec::new();

    let start = session
        .context()
        .key(cli.start.as_str())
        .map_err(|reason| anyhow!("start path {} is not navigable: {reason}", cli.start))?;
    headless.history.set_location(start.as_str());

    let url = session.context().resolver().origin().join(&start)?;
    let request = Request::new(start.clone(), url, VisitKind::Initial, session.context().id());
    let landing = transport.get(request).await.map_err(|e| e.into_error(&start))?.text();
    let page = session.initialize(&landing);
    steps.push(Step::new("initialize", page.key.as_str(), format!("title {:?}", page.title)));

    if cli.prefetch > 0 {
        let links = extract_links(&landing)
            .into_iter()
            .filter(|link| session.context().key(&link.element).is_ok_and(|key| key != page.key))
            .take(cli.prefetch);
        for link in links {
            let outcome = session.prefetch(&link.element).await;
            steps.push(Step::new("prefetch", link.element.href.as_str(), prefetched(&outcome)));
        }
    }

    for path in &cli.paths {
        let nav = session.trigger(path).await;
        steps.push(Step::new("visit", path.as_str(), navigation(&nav)));
    }

    for _ in 0..cli.back {
        let Some(entry) = headless.history.back() else { break };
        let target = entry.key.to_string();
        let outcome = session.on_history_change(entry).await;
        session.settled().await;
        let outcome = match outcome {
            Some(nav) => navigation(&nav),
            None => format!("settled on {}", session.context().current()),
        };
        steps.push(Step::new("back", target, outcome));
    }

    if cli.reload {
        let nav = session.reload().await;
        steps.push(Step::new("reload", session.context().current().as_str(), navigation(&nav)));
    }

    session.settled().await;
    let summary = session.summary();
    session.disconnect();
    Ok(Report { steps, summary })
}

fn navigation(nav: &Navigation) -> String {
    match nav {
        Navigation::Rendered(page) => format!("rendered {} ({} visits)", page.key, page.visits),
        Navigation::NotNavigable(reason) => format!("not navigable: {reason}"),
        Navigation::Vetoed => "vetoed".into(),
        Navigation::Aborted => "aborted".into(),
        Navigation::FullNavigation { key, reason } => format!("full navigation to {key}: {reason}"),
    }
}

fn prefetched(outcome: &Prefetched) -> String {
    match outcome {
        Prefetched::Fetched(page) => format!("fetched {}", page.key),
        Prefetched::Cached => "cached".into(),
        Prefetched::InTransit => "in transit".into(),
        Prefetched::Vetoed => "vetoed".into(),
        Prefetched::Aborted => "aborted".into(),
        Prefetched::Failed(reason) => format!("failed: {reason}"),
        Prefetched::NotNavigable(reason) => format!("not navigable: {reason}"),
    }
}
