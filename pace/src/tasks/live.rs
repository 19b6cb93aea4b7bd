//! Live merging of the board's subscriptions into local state.
//!
//! A [`LiveView`] holds one subscription per board query. Tasks are found
//! by assignee id, by assignee email and by the legacy assignee field;
//! projects by owner and by membership. Each subscription feeds the shared
//! [`BoardState`] under its own [`SourceId`]. Dropping the view drops the
//! subscriptions, which unregisters their listeners from the store.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::select_all;
use parking_lot::Mutex;

use pace_proto::document::{ChangeSet, Document};
use pace_proto::identity::Identity;
use pace_proto::project::Project;
use pace_proto::task::Task;

use super::merge::SourceId;
use super::reconciler::BoardState;
use crate::store::{DocumentStore, ProjectQuery, StoreError, Subscription, TaskQuery};

struct Feed<T: Document> {
    source: SourceId,
    label: String,
    subscription: Subscription<T>,
    open: bool,
}

enum Delivery {
    Tasks(usize, Option<ChangeSet<Task>>),
    Projects(usize, Option<ChangeSet<Project>>),
}

type Pending<'a> = Pin<Box<dyn Future<Output = Delivery> + Send + 'a>>;

/// The board's open subscriptions.
pub struct LiveView {
    state: Arc<Mutex<BoardState>>,
    tasks: Vec<Feed<Task>>,
    projects: Vec<Feed<Project>>,
}

impl LiveView {
    pub(crate) async fn open<S: DocumentStore>(
        store: &S,
        identity: &Identity,
        state: Arc<Mutex<BoardState>>,
    ) -> Result<Self, StoreError> {
        let mut view = Self {
            state,
            tasks: Vec::new(),
            projects: Vec::new(),
        };
        for query in TaskQuery::assigned_to(identity) {
            let label = query.to_string();
            let subscription = store.subscribe_tasks(query).await?;
            let source = view.state.lock().allocate_source();
            view.tasks.push(Feed {
                source,
                label,
                subscription,
                open: true,
            });
        }
        for query in ProjectQuery::visible_to(identity) {
            let label = query.to_string();
            let subscription = store.subscribe_projects(query).await?;
            let source = view.state.lock().allocate_source();
            view.projects.push(Feed {
                source,
                label,
                subscription,
                open: true,
            });
        }
        tracing::debug!(
            task_feeds = view.tasks.len(),
            project_feeds = view.projects.len(),
            "live view opened"
        );
        Ok(view)
    }

    /// Number of subscriptions still delivering.
    #[must_use]
    pub fn open_feeds(&self) -> usize {
        self.tasks.iter().filter(|f| f.open).count()
            + self.projects.iter().filter(|f| f.open).count()
    }

    /// Apply every batch already queued, without waiting. Returns the
    /// number of batches applied.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        let mut state = self.state.lock();
        for feed in &mut self.tasks {
            while let Some(batch) = feed.subscription.try_next() {
                let stats = state.tasks.apply(feed.source, batch);
                tracing::debug!(feed = %feed.label, ?stats, "merged task changes");
                applied += 1;
            }
        }
        for feed in &mut self.projects {
            while let Some(batch) = feed.subscription.try_next() {
                let stats = state.projects.apply(feed.source, batch);
                tracing::debug!(feed = %feed.label, ?stats, "merged project changes");
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next batch on any subscription, apply it and anything
    /// else already queued. Returns the number of batches applied, or
    /// `None` once every subscription has closed.
    pub async fn changed(&mut self) -> Option<usize> {
        loop {
            let delivery = {
                let mut pending: Vec<Pending<'_>> = Vec::new();
                for (index, feed) in self.tasks.iter_mut().enumerate().filter(|(_, f)| f.open) {
                    pending.push(Box::pin(async move {
                        Delivery::Tasks(index, feed.subscription.next().await)
                    }));
                }
                for (index, feed) in self.projects.iter_mut().enumerate().filter(|(_, f)| f.open) {
                    pending.push(Box::pin(async move {
                        Delivery::Projects(index, feed.subscription.next().await)
                    }));
                }
                if pending.is_empty() {
                    return None;
                }
                select_all(pending).await.0
            };

            match delivery {
                Delivery::Tasks(index, Some(batch)) => {
                    let feed = &self.tasks[index];
                    let stats = self.state.lock().tasks.apply(feed.source, batch);
                    tracing::debug!(feed = %feed.label, ?stats, "merged task changes");
                }
                Delivery::Projects(index, Some(batch)) => {
                    let feed = &self.projects[index];
                    let stats = self.state.lock().projects.apply(feed.source, batch);
                    tracing::debug!(feed = %feed.label, ?stats, "merged project changes");
                }
                Delivery::Tasks(index, None) => {
                    self.close_task_feed(index);
                    continue;
                }
                Delivery::Projects(index, None) => {
                    self.close_project_feed(index);
                    continue;
                }
            }
            return Some(1 + self.drain());
        }
    }

    fn close_task_feed(&mut self, index: usize) {
        let feed = &mut self.tasks[index];
        feed.open = false;
        let dropped = self.state.lock().tasks.drop_source(feed.source);
        tracing::warn!(feed = %feed.label, dropped, "task subscription closed");
    }

    fn close_project_feed(&mut self, index: usize) {
        let feed = &mut self.projects[index];
        feed.open = false;
        let dropped = self.state.lock().projects.drop_source(feed.source);
        tracing::warn!(feed = %feed.label, dropped, "project subscription closed");
    }
}
