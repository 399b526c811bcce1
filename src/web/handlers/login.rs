use salvo::prelude::*;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::error_summary;
use crate::web::handlers::ready_state;

/// Redirect target of the forum's user API key flow. The answer never
/// reflects the outcome; the user hears back through Telegram.
#[handler]
pub async fn login_callback(req: &mut Request, res: &mut Response) {
    let Some(state) = ready_state(res) else {
        return;
    };

    match req.query::<String>("payload") {
        Some(payload) if !payload.is_empty() => {
            let bridge = state.bridge.clone();
            tokio::spawn(async move {
                if let Err(err) = bridge.complete_login(&payload).await {
                    warn!("Login callback failed: {}", error_summary(&err));
                }
            });
        }
        _ => debug!("Login callback without payload"),
    }

    res.render(Json(json!({ "message": "ok" })));
}
