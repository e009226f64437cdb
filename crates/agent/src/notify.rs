//! Notification Handler: renders push payloads and routes notification
//! clicks back into the application.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sous_client::resolve;
use sous_core::Error;
use url::Url;

use crate::agent::Agent;
use crate::host::{HostCommand, Notification, NotificationAction};

/// Push payload as sent by the application server.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub actions: Option<Vec<NotificationAction>>,
    #[serde(default)]
    pub tag: Option<String>,
}

impl PushPayload {
    /// Parse a payload delivered either as a JSON object or as JSON text.
    ///
    /// Returns `None` for a missing or malformed payload.
    pub fn parse(raw: Option<&Value>) -> Option<Self> {
        let parsed = match raw? {
            Value::String(text) => serde_json::from_str(text),
            value => serde_json::from_value(value.clone()),
        };
        match parsed {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!(error = %e, "malformed push payload");
                None
            }
        }
    }
}

/// The part of a shown notification the host echoes back on click.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShownNotification {
    pub id: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PushOutcome {
    /// Id of the displayed notification, if one was shown.
    pub shown: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClickOutcome {
    pub closed: String,
    pub opened: Option<Url>,
}

fn default_actions() -> Vec<NotificationAction> {
    vec![
        NotificationAction { action: "view".into(), title: "View".into() },
        NotificationAction { action: "dismiss".into(), title: "Dismiss".into() },
    ]
}

/// Show a notification for an inbound push.
pub async fn on_push(agent: &Agent, payload: Option<&Value>) -> Result<PushOutcome, Error> {
    let Some(payload) = PushPayload::parse(payload) else {
        tracing::debug!("push without usable payload, nothing shown");
        return Ok(PushOutcome::default());
    };

    let config = agent.config();
    let notification = Notification {
        id: agent.next_notification_id(),
        title: payload.title,
        body: payload.body,
        icon: config.notification_icon.clone(),
        badge: config.notification_badge.clone(),
        tag: payload.tag,
        actions: payload.actions.unwrap_or_else(default_actions),
        data: payload.data,
    };
    let id = notification.id.clone();

    agent.host().send(HostCommand::ShowNotification { notification }).await?;
    Ok(PushOutcome { shown: Some(id) })
}

/// Handle a click on a notification or one of its actions.
///
/// `view` and a plain click navigate; every other action only closes.
pub async fn on_click(
    agent: &Agent, notification: &ShownNotification, action: Option<&str>,
) -> Result<ClickOutcome, Error> {
    agent
        .host()
        .send(HostCommand::CloseNotification { id: notification.id.clone() })
        .await?;

    let mut outcome = ClickOutcome { closed: notification.id.clone(), opened: None };

    match action {
        None | Some("") | Some("view") => {
            let url = target_url(agent, &notification.data)?;
            agent.host().send(HostCommand::OpenWindow { url: url.clone() }).await?;
            outcome.opened = Some(url);
        }
        Some(other) => tracing::debug!(action = other, "notification closed without navigation"),
    }

    Ok(outcome)
}

fn target_url(agent: &Agent, data: &Value) -> Result<Url, Error> {
    if let Some(raw) = data.get("url").and_then(Value::as_str) {
        match resolve(agent.origin(), raw) {
            Ok(url) => return Ok(url),
            Err(e) => tracing::warn!(url = raw, error = %e, "unusable notification url, using default"),
        }
    }
    resolve(agent.origin(), &agent.config().default_notification_url).map_err(|e| Error::InvalidUrl(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockNetwork, RecordingHost, test_config};
    use serde_json::json;
    use sous_core::ContentStore;
    use std::sync::Arc;

    async fn agent() -> (Agent, Arc<RecordingHost>) {
        let host = Arc::new(RecordingHost::default());
        let store = ContentStore::open_in_memory().await.unwrap();
        let agent = Agent::new(test_config(), store, Arc::new(MockNetwork::new()), host.clone()).unwrap();
        (agent, host)
    }

    #[tokio::test]
    async fn test_push_then_view() {
        let (agent, host) = agent().await;
        let payload = json!({ "title": "Ready", "body": "Your recipe is ready", "data": { "url": "/recipes/42" } });

        let outcome = on_push(&agent, Some(&payload)).await.unwrap();
        let shown = host.notifications();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, "Ready");
        assert_eq!(shown[0].body, "Your recipe is ready");
        assert_eq!(shown[0].icon, "/static/icons/icon-192x192.png");
        assert_eq!(outcome.shown.as_deref(), Some(shown[0].id.as_str()));

        let clicked = ShownNotification { id: shown[0].id.clone(), data: shown[0].data.clone() };
        let click = on_click(&agent, &clicked, Some("view")).await.unwrap();
        assert_eq!(click.opened.as_ref().map(Url::as_str), Some("https://recipes.test/recipes/42"));

        let commands = host.commands();
        assert!(commands.contains(&HostCommand::CloseNotification { id: clicked.id.clone() }));
        assert!(commands.contains(&HostCommand::OpenWindow { url: Url::parse("https://recipes.test/recipes/42").unwrap() }));
    }

    #[tokio::test]
    async fn test_payload_as_json_text() {
        let (agent, host) = agent().await;
        let payload = Value::String(r#"{"title":"Meal plan","body":"Your week is planned"}"#.into());

        on_push(&agent, Some(&payload)).await.unwrap();
        let shown = host.notifications();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].actions, default_actions());
    }

    #[tokio::test]
    async fn test_payload_actions_passed_through() {
        let (agent, host) = agent().await;
        let payload = json!({
            "title": "New recipe",
            "body": "Try it",
            "actions": [{ "action": "view", "title": "Open" }],
            "data": { "url": "/recipes/9", "recipe_id": 9 }
        });

        on_push(&agent, Some(&payload)).await.unwrap();
        let shown = &host.notifications()[0];
        assert_eq!(shown.actions.len(), 1);
        assert_eq!(shown.data["recipe_id"], 9);
    }

    #[tokio::test]
    async fn test_missing_payload_shows_nothing() {
        let (agent, host) = agent().await;
        let outcome = on_push(&agent, None).await.unwrap();
        assert_eq!(outcome.shown, None);
        assert!(host.commands().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_shows_nothing() {
        let (agent, host) = agent().await;
        for raw in [json!("not json"), json!({ "body": "no title" }), json!(42)] {
            let outcome = on_push(&agent, Some(&raw)).await.unwrap();
            assert_eq!(outcome.shown, None);
        }
        assert!(host.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_dismiss_only_closes() {
        let (agent, host) = agent().await;
        let clicked = ShownNotification { id: "v1-notification-1".into(), data: json!({ "url": "/recipes/42" }) };

        let outcome = on_click(&agent, &clicked, Some("dismiss")).await.unwrap();
        assert_eq!(outcome.opened, None);
        assert_eq!(host.commands(), vec![HostCommand::CloseNotification { id: "v1-notification-1".into() }]);
    }

    #[tokio::test]
    async fn test_plain_click_without_url_opens_default() {
        let (agent, _host) = agent().await;
        let clicked = ShownNotification { id: "n".into(), data: Value::Null };

        let outcome = on_click(&agent, &clicked, None).await.unwrap();
        assert_eq!(outcome.opened.as_ref().map(Url::as_str), Some("https://recipes.test/"));
    }

    #[tokio::test]
    async fn test_unusable_url_falls_back_to_default() {
        let (agent, _host) = agent().await;
        let clicked = ShownNotification { id: "n".into(), data: json!({ "url": "javascript:alert(1)" }) };

        let outcome = on_click(&agent, &clicked, Some("view")).await.unwrap();
        assert_eq!(outcome.opened.as_ref().map(Url::as_str), Some("https://recipes.test/"));
    }
}
