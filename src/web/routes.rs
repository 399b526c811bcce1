use salvo::prelude::*;

use crate::web::handlers::{
    health::health_check,
    login::login_callback,
    metrics::metrics,
    webhooks::{chat_webhook, post_webhook},
};

pub fn create_router() -> Router {
    Router::new()
        .push(Router::with_path("health").get(health_check))
        .push(Router::with_path("metrics").get(metrics))
        .push(Router::with_path("login").get(login_callback))
        .push(
            Router::with_path("webhooks")
                .push(Router::with_path("post").post(post_webhook))
                .push(Router::with_path("chat").post(chat_webhook)),
        )
}
