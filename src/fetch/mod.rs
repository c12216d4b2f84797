//! Request execution.
//!
//! Per logical request: cache lookup, then up to `retries + 1` attempts (each
//! following redirects and materializing the response), then cache store and
//! save. A list of URLs fans out with a bounded number of requests in flight,
//! all sharing one set of HTTP clients.

mod redirects;
pub mod response;
mod save;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, warn};
use tokio::sync::Mutex;
use tokio_retry::RetryIf;

pub use response::{BodyStream, DecodeStrategy, MediaType, ResponseBody, ResponseRecord};

use crate::cache::ResponseCache;
use crate::config::{DEFAULT_CONCURRENCY, LOG_TARGET_ATTEMPT};
use crate::error_handling::{describe_error, get_retry_strategy, RequestError};
use crate::initialization::{init_clients, Clients};
use crate::request::plan::RequestPlan;
use crate::request::{RequestSpec, Target, TlsOptions};
use redirects::{follow_redirects, Landed};
use response::materialize::materialize;
use save::save_body;

/// Result of [`request`]: one record, or one per URL in input order.
#[derive(Debug)]
pub enum Fetched {
    One(ResponseRecord),
    Many(Vec<ResponseRecord>),
}

impl Fetched {
    /// The single record, or `None` for a fan-out result.
    pub fn into_one(self) -> Option<ResponseRecord> {
        match self {
            Fetched::One(record) => Some(record),
            Fetched::Many(_) => None,
        }
    }

    /// All records, in input order.
    pub fn into_records(self) -> Vec<ResponseRecord> {
        match self {
            Fetched::One(record) => vec![record],
            Fetched::Many(records) => records,
        }
    }
}

/// Sends the request described by `spec`.
///
/// Accepts anything convertible into a [`RequestSpec`], including a plain URL.
/// A spec whose `url` is a list fans out and returns [`Fetched::Many`].
///
/// # Errors
///
/// See [`RequestError`]. Configuration errors are raised before any network
/// contact; for a fan-out, the first failure in input order is returned.
pub async fn request(spec: impl Into<RequestSpec>) -> Result<Fetched, RequestError> {
    let spec = spec.into();
    if matches!(spec.url, Some(Target::Many(_))) {
        fetch_all(spec).await.map(Fetched::Many)
    } else {
        fetch_one(spec).await.map(Fetched::One)
    }
}

/// Sends a single-target request.
pub async fn fetch_one(spec: impl Into<RequestSpec>) -> Result<ResponseRecord, RequestError> {
    let plan = RequestPlan::from_spec(spec.into())?;
    let clients = build_clients(&plan.tls)?;
    execute(plan, &clients).await
}

/// Sends one request per URL with at most `concurrency` in flight.
///
/// Results keep the input order regardless of completion order. Every
/// per-URL spec is validated before the first request is sent.
pub async fn fetch_all(spec: RequestSpec) -> Result<Vec<ResponseRecord>, RequestError> {
    let urls = match &spec.url {
        Some(Target::Many(urls)) => urls.clone(),
        Some(Target::Single(url)) => vec![url.clone()],
        None => return Err(RequestError::config("Invalid parameter: url is required")),
    };
    let concurrency = spec.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1);

    let plans = urls
        .iter()
        .map(|url| spec.fork(url).and_then(RequestPlan::from_spec))
        .collect::<Result<Vec<_>, _>>()?;
    let clients = build_clients(&spec.tls)?;
    debug!("Fanning out {} requests, {concurrency} at a time", plans.len());

    stream::iter(plans)
        .map(|plan| execute(plan, &clients))
        .buffered(concurrency)
        .try_collect()
        .await
}

async fn attempt(plan: &mut RequestPlan, clients: &Clients) -> Result<ResponseRecord, RequestError> {
    let Landed {
        response,
        options,
        chain,
    } = follow_redirects(plan, clients).await?;
    materialize(response, &mut plan.delivery, &options, plan.throw_http_error, chain).await
}

fn build_clients(tls: &TlsOptions) -> Result<Clients, RequestError> {
    init_clients(tls).map_err(|e| RequestError::config(format!("Invalid TLS options: {e}")))
}

/// Runs a validated plan: cache, attempts with retry, then store and save.
pub(crate) async fn execute(
    plan: RequestPlan,
    clients: &Clients,
) -> Result<ResponseRecord, RequestError> {
    let url = plan.url.clone();
    let cache = plan
        .cache
        .as_ref()
        .map(|settings| ResponseCache::new(settings.dir.clone(), settings.max_age));
    if let Some(cache) = &cache {
        if let Some(record) = cache.lookup(&url).await {
            return Ok(record);
        }
    }

    let retries = plan.retries;
    let plan = Arc::new(Mutex::new(plan));

    // Counts the initial attempt and every retry
    let attempt_count = Arc::new(AtomicU32::new(0));

    let result = RetryIf::spawn(
        get_retry_strategy(retries),
        {
            let plan = Arc::clone(&plan);
            let attempt_count = Arc::clone(&attempt_count);
            move || {
                attempt_count.fetch_add(1, Ordering::SeqCst);
                let plan = Arc::clone(&plan);
                let clients = clients.clone();
                async move {
                    let mut plan = plan.lock().await;
                    attempt(&mut plan, &clients).await
                }
            }
        },
        |error: &RequestError| {
            let retriable = error.is_retriable();
            if retriable {
                warn!(
                    target: LOG_TARGET_ATTEMPT,
                    "Attempt {} for {url} failed with {}: {error}",
                    attempt_count.load(Ordering::SeqCst),
                    describe_error(error)
                );
            }
            retriable
        },
    )
    .await;

    let attempts = attempt_count.load(Ordering::SeqCst);
    let record = match result {
        Ok(record) => record,
        Err(e) => {
            debug!(target: LOG_TARGET_ATTEMPT, "Request to {url} failed after {attempts} attempt(s): {e}");
            return Err(e);
        }
    };
    debug!(
        target: LOG_TARGET_ATTEMPT,
        "{url} completed with status {} after {attempts} attempt(s)",
        record.status_code
    );

    if let Some(cache) = &cache {
        cache.store(&url, &record).await;
    }
    let plan = plan.lock().await;
    if let Some(path) = plan.delivery.save_path() {
        save_body(path, &record, &url).await?;
    }
    Ok(record)
}
