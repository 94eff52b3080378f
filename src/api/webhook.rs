//! put.io transfer webhook
//!
//! put.io posts a form-encoded body when a transfer finishes. The handler only
//! validates `file_id` and launches the pipeline in the background. The caller
//! always gets 200, even for an unknown webhook id.

use std::collections::HashMap;

use axum::{
    Router,
    extract::{Path, State, rejection::FormRejection},
    http::StatusCode,
    routing::post,
    Form,
};
use tracing::{info, warn};

use crate::app::AppState;
use crate::transfer::FileId;

async fn transfer_completed(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
    payload: Result<Form<HashMap<String, String>>, FormRejection>,
) -> StatusCode {
    if webhook_id != state.config.webhook_id {
        warn!(webhook_id = %webhook_id, "Ignoring webhook for an unknown id");
        return StatusCode::OK;
    }

    let fields = match payload {
        Ok(Form(fields)) => fields,
        Err(e) => {
            warn!(error = %e, "Discarding webhook with unreadable body");
            return StatusCode::OK;
        }
    };

    match parse_file_id(fields.get("file_id").map(String::as_str)) {
        Some(file_id) => {
            info!(file_id, "Transfer completed webhook received");
            state.launcher.launch(file_id);
        }
        None => {
            warn!(file_id = ?fields.get("file_id"), "Discarding webhook without a usable file_id");
        }
    }

    StatusCode::OK
}

fn parse_file_id(raw: Option<&str>) -> Option<FileId> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook/{webhook_id}", post(transfer_completed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::body::Body;
    use axum::http::{Request, header};
    use tower::ServiceExt;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    use crate::config::Config;
    use crate::services::TransferLauncher;

    #[derive(Default)]
    struct CountingLauncher {
        launched: Mutex<Vec<FileId>>,
    }

    impl TransferLauncher for CountingLauncher {
        fn launch(&self, file_id: FileId) {
            self.launched.lock().unwrap().push(file_id);
        }
    }

    /// Counts WARN events seen by the subscriber
    #[derive(Clone, Default)]
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn app(launcher: Arc<CountingLauncher>) -> Router {
        let config = Config::from_lookup(|k| (k == "PUTIO_TOKEN").then(|| "t".to_string())).unwrap();
        router().with_state(AppState {
            config: Arc::new(config),
            launcher,
        })
    }

    fn form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn post_counting_warnings(
        launcher: Arc<CountingLauncher>,
        request: Request<Body>,
    ) -> (StatusCode, usize) {
        let warnings = WarnCounter::default();
        let subscriber = tracing_subscriber::registry().with(warnings.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let status = app(launcher).oneshot(request).await.unwrap().status();
        (status, warnings.0.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_valid_file_id_launches_pipeline() {
        let launcher = Arc::new(CountingLauncher::default());
        let (status, warnings) = post_counting_warnings(
            launcher.clone(),
            form("/webhook/putio_transfer_completed", "file_id=123&name=x"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(warnings, 0);
        assert_eq!(*launcher.launched.lock().unwrap(), vec![123]);
    }

    #[tokio::test]
    async fn test_missing_file_id_warns_once_and_launches_nothing() {
        let launcher = Arc::new(CountingLauncher::default());
        let (status, warnings) = post_counting_warnings(
            launcher.clone(),
            form("/webhook/putio_transfer_completed", "name=x"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(warnings, 1);
        assert!(launcher.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_id_is_discarded() {
        let launcher = Arc::new(CountingLauncher::default());
        let (status, warnings) = post_counting_warnings(
            launcher.clone(),
            form("/webhook/putio_transfer_completed", "file_id="),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(warnings, 1);
        assert!(launcher.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_webhook_id_is_accepted_and_ignored() {
        let launcher = Arc::new(CountingLauncher::default());
        let (status, warnings) = post_counting_warnings(
            launcher.clone(),
            form("/webhook/something_else", "file_id=1"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(warnings, 1);
        assert!(launcher.launched.lock().unwrap().is_empty());
    }

    #[test]
    fn test_parse_file_id() {
        assert_eq!(parse_file_id(Some("42")), Some(42));
        assert_eq!(parse_file_id(Some(" 42 ")), Some(42));
        assert_eq!(parse_file_id(Some("")), None);
        assert_eq!(parse_file_id(Some("abc")), None);
        assert_eq!(parse_file_id(None), None);
    }
}
