use salvo::prelude::*;
use serde_json::json;

use crate::web::{WebState, web_state};

pub mod health;
pub mod login;
pub mod metrics;
pub mod webhooks;

fn render_error(res: &mut Response, status: StatusCode, message: &str) {
    res.status_code(status);
    res.render(Json(json!({ "error": message })));
}

/// Shared state, or a 503 when the server is not wired up yet.
fn ready_state(res: &mut Response) -> Option<&'static WebState> {
    let state = web_state();
    if state.is_none() {
        render_error(res, StatusCode::SERVICE_UNAVAILABLE, "bridge is starting");
    }
    state
}
