//! Classifier-driven grouping of tools into workflow-level MCP tools.

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::classifier::{Classifier, ClassifierError, GroupCandidate, GroupPlan};
use crate::config::StoreError;
use crate::model::Group;
use crate::registry::{GroupRegistry, RegistryEvent, ToolRegistry};

/// Tools needed before the first grouping is attempted.
pub const FIRST_BUILD_THRESHOLD: usize = 3;

/// Tools needed before an existing grouping is rebuilt on new arrivals.
pub const REBUILD_THRESHOLD: usize = 5;

#[derive(Debug, Error)]
pub enum GroupingError {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error("failed to save groups: {0}")]
    Store(#[from] StoreError),
}

pub struct GroupPlanner {
    tools: Arc<ToolRegistry>,
    groups: Arc<GroupRegistry>,
    classifier: Arc<dyn Classifier>,
    tasks: TaskTracker,
    running: AtomicBool,
    pending: AtomicBool,
}

impl GroupPlanner {
    pub fn new(
        tools: Arc<ToolRegistry>,
        groups: Arc<GroupRegistry>,
        classifier: Arc<dyn Classifier>,
        tasks: TaskTracker,
    ) -> Arc<Self> {
        Arc::new(Self {
            tools,
            groups,
            classifier,
            tasks,
            running: AtomicBool::new(false),
            pending: AtomicBool::new(false),
        })
    }

    /// Startup: reuse persisted groups, or build fresh ones when asked to or
    /// when there are none yet and enough tools exist.
    pub fn start(self: &Arc<Self>, force_rebuild: bool) -> Option<JoinHandle<()>> {
        // Loaded first so a failed rebuild still leaves the saved groups served.
        let loaded = self.groups.load_persisted(&self.tools);
        if force_rebuild {
            log::info!("Rebuilding tool groups");
            return self.trigger();
        }

        if loaded > 0 {
            log::info!("Loaded {loaded} groups from config");
            return None;
        }

        if self.tools.len() >= FIRST_BUILD_THRESHOLD {
            log::info!("Grouping {} existing tools", self.tools.len());
            return self.trigger();
        }
        None
    }

    pub fn should_rebuild(&self) -> bool {
        let threshold = if self.groups.is_empty() {
            FIRST_BUILD_THRESHOLD
        } else {
            REBUILD_THRESHOLD
        };
        self.tools.len() >= threshold
    }

    /// Schedule a rebuild. Triggers landing while one runs collapse into a
    /// single follow-up run.
    pub fn trigger(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            self.pending.store(true, Ordering::SeqCst);
            return None;
        }

        let planner = Arc::clone(self);
        Some(self.tasks.spawn(async move {
            loop {
                match planner.rebuild().await {
                    Ok(count) => log::info!("Tool groups rebuilt: {count} groups"),
                    Err(e) => log::warn!("Grouping skipped, keeping previous groups: {e}"),
                }

                if planner.pending.swap(false, Ordering::SeqCst) {
                    continue;
                }
                planner.running.store(false, Ordering::SeqCst);
                // A trigger may have arrived between the swap and the store.
                if !planner.pending.swap(false, Ordering::SeqCst)
                    || planner.running.swap(true, Ordering::SeqCst)
                {
                    break;
                }
            }
        }))
    }

    /// Ask the classifier for a fresh grouping and install it.
    ///
    /// On any failure the current groups stay in place.
    pub async fn rebuild(&self) -> Result<usize, GroupingError> {
        let tools = self.tools.snapshot();
        if tools.is_empty() {
            return Ok(0);
        }

        let candidates: Vec<GroupCandidate> = tools
            .iter()
            .map(|tool| GroupCandidate {
                name: tool.name.clone(),
                method: tool.method.clone(),
                path: url_path(&tool.url),
                description: tool.description.clone(),
            })
            .collect();

        let plan = self.classifier.group_tools(&candidates).await?;
        let groups = self.materialize(plan);
        let count = groups.len();
        self.groups.replace_all(groups)?;
        Ok(count)
    }

    /// Keep only members that exist, once each, and only non-empty groups.
    fn materialize(&self, plan: GroupPlan) -> Vec<Group> {
        let now = Utc::now();
        plan.groups
            .into_iter()
            .filter_map(|planned| {
                if planned.name.trim().is_empty() {
                    return None;
                }
                let mut members: Vec<String> = Vec::new();
                for name in planned.tool_names {
                    if self.tools.contains(&name) && !members.contains(&name) {
                        members.push(name);
                    }
                }
                if members.is_empty() {
                    log::debug!("Dropping group {} without known tools", planned.name);
                    return None;
                }
                Some(Group {
                    name: planned.name,
                    description: planned.description,
                    tool_names: members,
                    created_at: now,
                    use_count: 0,
                    last_used: None,
                })
            })
            .collect()
    }

    /// React to new tools until shutdown.
    pub fn watch(
        self: Arc<Self>,
        mut events: broadcast::Receiver<RegistryEvent>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let tasks = self.tasks.clone();
        tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(RegistryEvent::ToolAdded(_)) | Err(RecvError::Lagged(_)) => {
                            if self.should_rebuild() {
                                self.trigger();
                            }
                        }
                        Ok(RegistryEvent::GroupsRebuilt) => {}
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        })
    }
}

/// Path component of a tool URL, or the URL itself when it does not parse.
fn url_path(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{NameRequest, PlannedGroup};
    use crate::config::{Document, Store};
    use crate::model::ToolSpec;
    use futures::future::BoxFuture;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Puts every candidate into one "all" group plus a group naming unknown tools.
    #[derive(Default)]
    struct Planner {
        calls: AtomicUsize,
        seen: Mutex<Vec<GroupCandidate>>,
        fail: bool,
        delay: Option<Duration>,
    }

    impl Classifier for Planner {
        fn name_tool<'a>(&'a self, _request: NameRequest<'a>) -> BoxFuture<'a, Result<String, ClassifierError>> {
            Box::pin(async { Err(ClassifierError::EmptyResponse) })
        }

        fn group_tools<'a>(
            &'a self,
            tools: &'a [GroupCandidate],
        ) -> BoxFuture<'a, Result<GroupPlan, ClassifierError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                if self.fail {
                    return Err(ClassifierError::EmptyResponse);
                }
                *self.seen.lock() = tools.to_vec();
                let mut names: Vec<String> = tools.iter().map(|t| t.name.clone()).collect();
                names.push(names[0].clone());
                Ok(GroupPlan {
                    groups: vec![
                        PlannedGroup {
                            name: "all".to_string(),
                            description: "Everything".to_string(),
                            tool_names: names,
                        },
                        PlannedGroup {
                            name: "phantom".to_string(),
                            description: String::new(),
                            tool_names: vec!["does_not_exist".to_string()],
                        },
                    ],
                })
            })
        }
    }

    struct Fixture {
        tools: Arc<ToolRegistry>,
        groups: Arc<GroupRegistry>,
        store: Arc<Store>,
        tasks: TaskTracker,
    }

    fn fixture(tool_count: usize) -> Fixture {
        let (events, _) = broadcast::channel(64);
        let store = Arc::new(Store::in_memory(Document::default()));
        let tools = Arc::new(ToolRegistry::new(100, Arc::clone(&store), events.clone()));
        for i in 0..tool_count {
            tools
                .register(ToolSpec {
                    name: format!("tool_{i}"),
                    method: "GET".to_string(),
                    url: format!("http://localhost:3000/items/{i}?full=1"),
                    description: format!("Auto-discovered: GET /items/{i}"),
                    ..Default::default()
                })
                .unwrap();
        }
        let groups = Arc::new(GroupRegistry::new(Arc::clone(&store), events));
        Fixture {
            tools,
            groups,
            store,
            tasks: TaskTracker::new(),
        }
    }

    fn make_planner(f: &Fixture, classifier: Arc<Planner>) -> Arc<GroupPlanner> {
        GroupPlanner::new(
            Arc::clone(&f.tools),
            Arc::clone(&f.groups),
            classifier,
            f.tasks.clone(),
        )
    }

    #[tokio::test]
    async fn test_rebuild_filters_unknown_members_and_empty_groups() {
        let f = fixture(3);
        let classifier = Arc::new(Planner::default());
        let planner = make_planner(&f, Arc::clone(&classifier));

        assert_eq!(planner.rebuild().await.unwrap(), 1);

        let all = f.groups.get("all").unwrap();
        assert_eq!(all.tool_names, vec!["tool_0", "tool_1", "tool_2"]);
        assert!(f.groups.get("phantom").is_none());
        assert_eq!(f.store.snapshot().groups.len(), 1);
        assert!(f.store.snapshot().use_grouping);

        let seen = classifier.seen.lock();
        assert_eq!(seen[0].path, "/items/0");
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_groups() {
        let f = fixture(3);
        make_planner(&f, Arc::new(Planner::default())).rebuild().await.unwrap();

        let failing = make_planner(
            &f,
            Arc::new(Planner {
                fail: true,
                ..Default::default()
            }),
        );
        assert!(failing.rebuild().await.is_err());
        assert!(f.groups.get("all").is_some());
    }

    #[tokio::test]
    async fn test_thresholds() {
        let f = fixture(2);
        let planner = make_planner(&f, Arc::new(Planner::default()));
        assert!(!planner.should_rebuild());

        let f = fixture(3);
        let planner = make_planner(&f, Arc::new(Planner::default()));
        assert!(planner.should_rebuild());
        planner.rebuild().await.unwrap();
        assert!(!planner.should_rebuild());

        for i in 3..5 {
            f.tools
                .register(ToolSpec {
                    name: format!("tool_{i}"),
                    method: "GET".to_string(),
                    url: format!("http://localhost:3000/items/{i}"),
                    ..Default::default()
                })
                .unwrap();
        }
        assert!(planner.should_rebuild());
    }

    #[tokio::test]
    async fn test_concurrent_triggers_coalesce() {
        let f = fixture(3);
        let classifier = Arc::new(Planner {
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let planner = make_planner(&f, Arc::clone(&classifier));

        let first = planner.trigger().unwrap();
        for _ in 0..5 {
            assert!(planner.trigger().is_none());
        }
        first.await.unwrap();

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
        assert!(planner.trigger().is_some());
    }

    #[tokio::test]
    async fn test_start_prefers_persisted_groups() {
        let f = fixture(3);
        f.store
            .replace_groups(&[Group {
                name: "saved".to_string(),
                description: String::new(),
                tool_names: vec!["tool_1".to_string()],
                created_at: Utc::now(),
                use_count: 0,
                last_used: None,
            }])
            .unwrap();
        let classifier = Arc::new(Planner::default());
        let planner = make_planner(&f, Arc::clone(&classifier));

        assert!(planner.start(false).is_none());
        assert!(f.groups.get("saved").is_some());
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);

        planner.start(true).unwrap().await.unwrap();
        assert!(f.groups.get("saved").is_none());
        assert!(f.groups.get("all").is_some());
    }

    #[tokio::test]
    async fn test_failed_regroup_keeps_saved_groups() {
        let f = fixture(3);
        f.store
            .replace_groups(&[Group {
                name: "saved".to_string(),
                description: String::new(),
                tool_names: vec!["tool_0".to_string(), "tool_2".to_string()],
                created_at: Utc::now(),
                use_count: 0,
                last_used: None,
            }])
            .unwrap();
        let classifier = Arc::new(Planner {
            fail: true,
            ..Default::default()
        });
        let planner = make_planner(&f, Arc::clone(&classifier));

        planner.start(true).unwrap().await.unwrap();

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.groups.len(), 1);
        assert_eq!(f.groups.get("saved").unwrap().tool_names.len(), 2);
        assert!(f.store.snapshot().groups.contains_key("saved"));
    }

    #[test]
    fn test_url_path() {
        assert_eq!(url_path("http://localhost:3000/a/b?c=d"), "/a/b");
        assert_eq!(url_path("not a url"), "not a url");
    }
}
