//! Background publisher for due posts.
//!
//! Every tick loads the due batch, publishes each post on its own task
//! (bounded by a semaphore) and waits for the whole batch before sleeping,
//! so a post is never picked up twice by one process.

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::models::{PostStatus, ScheduledPost};
use crate::publish::PostPublisher;
use crate::store::{AccountStore, ScheduleStore};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub batch_size: i64,
    pub max_concurrent: usize,
    pub publish_timeout: Duration,
}

/// Result of one publish attempt, as recorded on the post.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub post_id: String,
    pub status: PostStatus,
    pub error_message: Option<String>,
    pub response: Option<serde_json::Value>,
}

pub struct Scheduler {
    accounts: Arc<dyn AccountStore>,
    posts: Arc<dyn ScheduleStore>,
    publisher: Arc<PostPublisher>,
    config: SchedulerConfig,
    in_flight: DashSet<String>,
    /// Posts the provider accepted whose PUBLISHED status could not be
    /// written yet, with the publish time and provider response.
    unrecorded: DashMap<String, (DateTime<Utc>, serde_json::Value)>,
}

/// Removes a post from the in-flight set when the attempt ends.
struct InFlight<'a> {
    set: &'a DashSet<String>,
    post_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.post_id);
    }
}

impl Scheduler {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        posts: Arc<dyn ScheduleStore>,
        publisher: Arc<PostPublisher>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            accounts,
            posts,
            publisher,
            config,
            in_flight: DashSet::new(),
            unrecorded: DashMap::new(),
        }
    }

    /// Publish one post and record the outcome on it.
    ///
    /// Fails with `Conflict` if the post is already being published and with
    /// a store error if the outcome could not be recorded. Publishing errors
    /// are not returned; they end up in the outcome and on the post.
    pub async fn run_post(&self, post: &ScheduledPost) -> Result<PublishOutcome, AppError> {
        if post.status == PostStatus::Published {
            return Err(AppError::Conflict("post is already published".into()));
        }
        if !self.in_flight.insert(post.id.clone()) {
            return Err(AppError::Conflict("post is already being published".into()));
        }
        let _in_flight = InFlight {
            set: &self.in_flight,
            post_id: post.id.clone(),
        };

        // Already live on the provider; only the status write is outstanding
        let pending = self.unrecorded.get(&post.id).map(|entry| entry.value().clone());
        if let Some((at, response)) = pending {
            return self.record_published(&post.id, at, response).await;
        }

        let deadline = self.config.publish_timeout;
        let result = match tokio::time::timeout(deadline, self.attempt(post)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::provider_unreachable(format!(
                "publish deadline of {}s exceeded",
                deadline.as_secs()
            ))),
        };

        let now = Utc::now();
        match result {
            Ok(response) => self.record_published(&post.id, now, response).await,
            Err(e) => {
                let message = e.to_string();
                if !self.posts.mark_failed(&post.id, &message, now).await? {
                    warn!("Post {} vanished or was published elsewhere", post.id);
                }
                warn!(
                    "Post {} failed (retryable: {}): {message}",
                    post.id,
                    e.is_retryable()
                );
                Ok(PublishOutcome {
                    post_id: post.id.clone(),
                    status: PostStatus::Failed,
                    error_message: Some(message),
                    response: None,
                })
            }
        }
    }

    /// Write PUBLISHED for a post the provider accepted, retrying once.
    ///
    /// If both writes fail the post is remembered, and later runs retry the
    /// write instead of publishing again.
    async fn record_published(
        &self,
        post_id: &str,
        at: DateTime<Utc>,
        response: serde_json::Value,
    ) -> Result<PublishOutcome, AppError> {
        let mut written = self.posts.mark_published(post_id, at).await;
        if let Err(e) = &written {
            error!("Post {post_id} is live but recording it failed, retrying: {e}");
            written = self.posts.mark_published(post_id, at).await;
        }

        match written {
            Ok(recorded) => {
                self.unrecorded.remove(post_id);
                if !recorded {
                    warn!("Post {post_id} vanished or was published elsewhere");
                }
                info!("Post {post_id} published");
                Ok(PublishOutcome {
                    post_id: post_id.to_string(),
                    status: PostStatus::Published,
                    error_message: None,
                    response: Some(response),
                })
            }
            Err(e) => {
                error!(
                    "Post {post_id} is live on the provider but still unrecorded ({e}); response: {response}"
                );
                self.unrecorded.insert(post_id.to_string(), (at, response));
                Err(e)
            }
        }
    }

    async fn attempt(&self, post: &ScheduledPost) -> Result<serde_json::Value, AppError> {
        let account = self
            .accounts
            .get_account(&post.account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("account {}", post.account_id)))?;

        let media = post.media();
        self.publisher
            .publish(&account, &post.content, media.as_ref())
            .await
    }

    /// Publish every post due now. Returns how many were attempted.
    pub async fn tick(self: &Arc<Self>) -> Result<usize, AppError> {
        let due = self
            .posts
            .due_posts(Utc::now(), self.config.batch_size)
            .await?;

        if due.is_empty() {
            return Ok(0);
        }

        info!("Found {} due posts", due.len());

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut tasks = JoinSet::new();
        let count = due.len();

        for post in due {
            let scheduler = self.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                scheduler.run_post(&post).await
            });
        }

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(outcome)) => debug!("Post {} -> {:?}", outcome.post_id, outcome.status),
                Ok(Err(AppError::Conflict(msg))) => debug!("Skipped post: {msg}"),
                Ok(Err(e)) => error!("Failed to record publish outcome: {e}"),
                Err(e) => error!("Publish task join error: {e}"),
            }
        }

        Ok(count)
    }
}

/// Start the scheduler loop.
pub async fn scheduler_daemon(scheduler: Arc<Scheduler>, interval: Duration) {
    info!("Post scheduler started (interval: {}s)", interval.as_secs());

    loop {
        tokio::time::sleep(interval).await;
        if let Err(e) = scheduler.tick().await {
            error!("Scheduler tick error: {e}");
        }
    }
}
