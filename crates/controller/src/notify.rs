//! Outbound webhooks fired when a light or group is switched through the app.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::domain::{Group, GroupId, Light, LightId};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotifyEvent {
    LightSwitched {
        light_id: LightId,
        name: String,
        light_type: String,
        on: bool,
    },
    /// `on` is true when every member light is on.
    GroupSwitched {
        group_id: GroupId,
        name: String,
        group_type: String,
        on: bool,
    },
}

impl NotifyEvent {
    pub fn light_switched(light: &Light) -> Self {
        NotifyEvent::LightSwitched {
            light_id: light.id,
            name: light.name.clone(),
            light_type: light.light_type.clone(),
            on: light.on,
        }
    }

    pub fn group_switched(group: &Group, on: bool) -> Self {
        NotifyEvent::GroupSwitched {
            group_id: group.id,
            name: group.name.clone(),
            group_type: group.group_type.clone(),
            on,
        }
    }

    /// Values substituted for `{item}`, `{id}`, `{name}`, `{type}`, `{on}`.
    fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            NotifyEvent::LightSwitched {
                light_id,
                name,
                light_type,
                on,
            } => vec![
                ("item", "light".to_string()),
                ("id", light_id.to_string()),
                ("name", name.clone()),
                ("type", light_type.clone()),
                ("on", on.to_string()),
            ],
            NotifyEvent::GroupSwitched {
                group_id,
                name,
                group_type,
                on,
            } => vec![
                ("item", "group".to_string()),
                ("id", group_id.to_string()),
                ("name", name.clone()),
                ("type", group_type.clone()),
                ("on", on.to_string()),
            ],
        }
    }

    pub fn render(&self, template: &str) -> String {
        self.params()
            .iter()
            .fold(template.to_string(), |out, (key, value)| {
                out.replace(&format!("{{{key}}}"), value)
            })
    }
}

/// Receives events; failures stay inside the notifier.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotifyEvent);
}

pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: NotifyEvent) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebhookMethod {
    #[default]
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub method: WebhookMethod,
    /// POST body template; sent as JSON when it renders to valid JSON.
    #[serde(default)]
    pub body: Option<String>,
    /// Lights this hook listens to. Empty means all lights.
    #[serde(default)]
    pub lights: Vec<LightId>,
    /// Groups this hook listens to. Empty means all groups.
    #[serde(default)]
    pub groups: Vec<GroupId>,
}

impl WebhookConfig {
    pub fn matches(&self, event: &NotifyEvent) -> bool {
        match event {
            NotifyEvent::LightSwitched { light_id, .. } => {
                self.lights.is_empty() || self.lights.contains(light_id)
            }
            NotifyEvent::GroupSwitched { group_id, .. } => {
                self.groups.is_empty() || self.groups.contains(group_id)
            }
        }
    }
}

pub struct WebhookNotifier {
    http: Client,
    hooks: Vec<WebhookConfig>,
}

impl WebhookNotifier {
    pub fn new(hooks: Vec<WebhookConfig>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, hooks })
    }

    async fn execute(&self, hook: &WebhookConfig, event: &NotifyEvent) {
        let url = event.render(&hook.url);
        let request = match hook.method {
            WebhookMethod::Get => self.http.get(&url),
            WebhookMethod::Post => {
                let body = event.render(hook.body.as_deref().unwrap_or_default());
                let body = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));
                self.http.post(&url).json(&body)
            }
        };
        match request.send().await.and_then(|resp| resp.error_for_status()) {
            Ok(resp) => debug!(hook = %hook.name, %url, status = %resp.status(), "notify: webhook delivered"),
            Err(err) => warn!(hook = %hook.name, %url, error = %err, "notify: webhook failed"),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: NotifyEvent) {
        join_all(
            self.hooks
                .iter()
                .filter(|hook| hook.matches(&event))
                .map(|hook| self.execute(hook, &event)),
        )
        .await;
    }
}

#[cfg(test)]
#[path = "tests/notify_tests.rs"]
mod tests;
