use salvo::prelude::*;
use serde_json::json;
use tracing::{debug, error};

use crate::discourse::{ChatWebhook, ForumEvent, PostWebhook};
use crate::error::error_summary;
use crate::web::handlers::{ready_state, render_error};
use crate::web::metrics::Metrics;

const EVENT_HEADER: &str = "x-discourse-event";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Surface {
    Post,
    Chat,
}

/// Maps the event header to an event this route handles.
fn route_event(header: Option<&str>, surface: Surface) -> Option<ForumEvent> {
    let event = ForumEvent::from_header(header?.trim())?;
    let matches = match event {
        ForumEvent::PostCreated | ForumEvent::PostEdited | ForumEvent::PostDestroyed => {
            surface == Surface::Post
        }
        ForumEvent::ChatMessageCreated
        | ForumEvent::ChatMessageEdited
        | ForumEvent::ChatMessageTrashed => surface == Surface::Chat,
    };
    matches.then_some(event)
}

fn event_of(req: &Request, surface: Surface) -> Option<ForumEvent> {
    let header = req
        .headers()
        .get(EVENT_HEADER)
        .and_then(|value| value.to_str().ok());
    route_event(header, surface)
}

fn acknowledge(res: &mut Response) {
    res.render(Json(json!({ "text": "200 ok", "ec": 200 })));
}

#[handler]
pub async fn post_webhook(req: &mut Request, res: &mut Response) {
    let Some(state) = ready_state(res) else {
        return;
    };
    let Some(event) = event_of(req, Surface::Post) else {
        debug!("Ignoring post webhook with unhandled event");
        acknowledge(res);
        return;
    };
    let webhook = match req.parse_json::<PostWebhook>().await {
        Ok(webhook) => webhook,
        Err(err) => {
            render_error(res, StatusCode::BAD_REQUEST, &format!("invalid payload: {err}"));
            return;
        }
    };

    Metrics::forum_event_received();
    let bridge = state.bridge.clone();
    tokio::spawn(async move {
        let post_id = webhook.post.id;
        if let Err(err) = bridge.handle_post_event(event, webhook).await {
            error!(post_id, ?event, "Failed to handle post event: {}", error_summary(&err));
        }
    });
    acknowledge(res);
}

#[handler]
pub async fn chat_webhook(req: &mut Request, res: &mut Response) {
    let Some(state) = ready_state(res) else {
        return;
    };
    let Some(event) = event_of(req, Surface::Chat) else {
        debug!("Ignoring chat webhook with unhandled event");
        acknowledge(res);
        return;
    };
    let webhook = match req.parse_json::<ChatWebhook>().await {
        Ok(webhook) => webhook,
        Err(err) => {
            render_error(res, StatusCode::BAD_REQUEST, &format!("invalid payload: {err}"));
            return;
        }
    };

    Metrics::forum_event_received();
    let bridge = state.bridge.clone();
    tokio::spawn(async move {
        let message_id = webhook.message.id;
        if let Err(err) = bridge.handle_chat_event(event, webhook).await {
            error!(message_id, ?event, "Failed to handle chat event: {}", error_summary(&err));
        }
    });
    acknowledge(res);
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::{Surface, route_event};
    use crate::discourse::ForumEvent;

    #[test_case(Some("post_created"), Surface::Post, Some(ForumEvent::PostCreated) ; "post on post route")]
    #[test_case(Some("post_destroyed"), Surface::Post, Some(ForumEvent::PostDestroyed) ; "destroy on post route")]
    #[test_case(Some("chat_message_trashed"), Surface::Chat, Some(ForumEvent::ChatMessageTrashed) ; "trash on chat route")]
    #[test_case(Some("chat_message_created"), Surface::Post, None ; "chat on post route")]
    #[test_case(Some("ping"), Surface::Post, None ; "ping")]
    #[test_case(None, Surface::Chat, None ; "missing header")]
    fn routes_events_by_header(header: Option<&str>, surface: Surface, expected: Option<ForumEvent>) {
        assert_eq!(route_event(header, surface), expected);
    }
}
