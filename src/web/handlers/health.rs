use salvo::prelude::*;
use serde_json::json;

use crate::web::web_state;

#[handler]
pub async fn health_check(res: &mut Response) {
    let uptime_seconds = web_state()
        .map(|state| state.started_at.elapsed().as_secs())
        .unwrap_or_default();

    res.render(Json(json!({
        "status": "ok",
        "uptime_seconds": uptime_seconds,
        "version": env!("CARGO_PKG_VERSION"),
    })));
}
