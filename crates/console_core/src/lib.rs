use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use shared::protocol::{ChannelMessage, InstanceRecord};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod api;
pub mod channel;
pub mod routes;

use api::ResourceClient;
use channel::NotificationChannel;

/// Collection name of the instance resources on the REST API.
pub const INSTANCE_COLLECTION: &str = "openedxinstance";
/// Selection category reconciled against the collection on every refresh.
/// Other categories are plain key/value slots the refresh never touches.
pub const INSTANCE_CATEGORY: &str = "instance";

/// Topic and event of the one subscription the dashboard holds.
pub const NOTIFIER_TOPIC: &str = "notifier";
pub const NOTIFICATION_EVENT: &str = "notification";

const EVENT_BUFFER: usize = 64;

/// Shared state the view binds to: the instance collection, replaced
/// wholesale on every successful fetch, and the per-category selection map.
#[derive(Default, Debug, Clone)]
pub struct DashboardState {
    pub instances: Vec<InstanceRecord>,
    pub selected: HashMap<String, InstanceRecord>,
}

/// Emitted whenever the bound state changes, so view bindings observe fresh
/// objects instead of holding on to stale ones.
#[derive(Debug, Clone)]
pub enum ConsoleEvent {
    InstanceListUpdated {
        instances: Vec<InstanceRecord>,
    },
    SelectionChanged {
        category: String,
        instance: Option<InstanceRecord>,
    },
}

/// Controller state for the instance dashboard: owns the resource client,
/// the bound state, and the event channel the view subscribes to.
pub struct Dashboard {
    api: ResourceClient,
    inner: Mutex<DashboardState>,
    events: broadcast::Sender<ConsoleEvent>,
}

impl Dashboard {
    pub fn new(api: ResourceClient) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Arc::new(Self {
            api,
            inner: Mutex::new(DashboardState::default()),
            events,
        })
    }

    /// Fetch the instance collection and reconcile the bound state with it.
    ///
    /// On success the collection is replaced wholesale, and a held
    /// `"instance"` selection is re-pointed at the freshly fetched record
    /// with the same primary key (first match wins) or cleared when no such
    /// record exists. On failure the state is left untouched: the error is
    /// logged and swallowed, never retried and never surfaced to the view.
    ///
    /// The state lock is not held across the fetch, so overlapping calls are
    /// possible and whichever response resolves last wins.
    pub async fn synchronize(&self) {
        match self.api.list::<InstanceRecord>(INSTANCE_COLLECTION).await {
            Ok(instances) => {
                debug!(count = instances.len(), "updating instance list");
                self.apply_instance_list(instances).await;
            }
            Err(err) => {
                warn!("instance list refresh failed: {err}");
            }
        }
    }

    async fn apply_instance_list(&self, instances: Vec<InstanceRecord>) {
        let (instances, selection_change) = {
            let mut guard = self.inner.lock().await;
            guard.instances = instances;

            let selection_change = match guard.selected.get(INSTANCE_CATEGORY) {
                Some(previous) => {
                    let pk = previous.pk;
                    let fresh = guard
                        .instances
                        .iter()
                        .find(|record| record.pk == pk)
                        .cloned();
                    match &fresh {
                        Some(record) => {
                            guard
                                .selected
                                .insert(INSTANCE_CATEGORY.to_string(), record.clone());
                        }
                        None => {
                            guard.selected.remove(INSTANCE_CATEGORY);
                        }
                    }
                    Some(fresh)
                }
                None => None,
            };

            (guard.instances.clone(), selection_change)
        };

        let _ = self
            .events
            .send(ConsoleEvent::InstanceListUpdated { instances });
        if let Some(instance) = selection_change {
            let _ = self.events.send(ConsoleEvent::SelectionChanged {
                category: INSTANCE_CATEGORY.to_string(),
                instance,
            });
        }
    }

    /// Unconditionally overwrite the selection for `category`. No validation
    /// that the value comes from the current collection.
    pub async fn select(&self, category: &str, instance: InstanceRecord) {
        info!(category, pk = instance.pk.0, "selected");
        self.inner
            .lock()
            .await
            .selected
            .insert(category.to_string(), instance.clone());
        let _ = self.events.send(ConsoleEvent::SelectionChanged {
            category: category.to_string(),
            instance: Some(instance),
        });
    }

    pub async fn instances(&self) -> Vec<InstanceRecord> {
        self.inner.lock().await.instances.clone()
    }

    pub async fn selected(&self, category: &str) -> Option<InstanceRecord> {
        self.inner.lock().await.selected.get(category).cloned()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.events.subscribe()
    }
}

/// Drives the dashboard from the notification channel: one synchronization
/// up front, then one more for every `server_update` message. All other
/// message kinds are dropped. There is no unsubscribe and no reconnect; the
/// consumer task runs until the channel closes.
pub struct LiveUpdateController {
    dashboard: Arc<Dashboard>,
    channel: Arc<dyn NotificationChannel>,
}

impl LiveUpdateController {
    pub fn new(dashboard: Arc<Dashboard>, channel: Arc<dyn NotificationChannel>) -> Self {
        Self { dashboard, channel }
    }

    /// Transition from uninitialized to subscribed. The initial
    /// synchronization does not wait for the channel to be ready.
    pub async fn start(&self) -> Result<()> {
        self.dashboard.synchronize().await;

        let mut messages = self.channel.messages();
        let dashboard = Arc::clone(&self.dashboard);
        tokio::spawn(async move {
            while let Ok(envelope) = messages.recv().await {
                match envelope.data {
                    ChannelMessage::ServerUpdate { server_pk } => {
                        debug!(?server_pk, "server update received");
                        dashboard.synchronize().await;
                    }
                    ChannelMessage::OpenedxAppserverUpdate { .. } | ChannelMessage::Unknown => {}
                }
            }
        });

        self.channel.ready().await?;
        self.channel
            .subscribe(NOTIFIER_TOPIC, NOTIFICATION_EVENT, None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
