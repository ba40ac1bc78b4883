//! Route handlers of the feed server

use super::{ServerState, build_cors_layer};
use crate::channel::{FeedContainer, FeedEntry};
use crate::config::ServerConfig;
use crate::error::{Error, ToHttpStatus};
use crate::generator::{RSS_FILE_NAME, render_channel_rss};
use crate::utils::{html_escape, resolve_under_root};
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;

/// Body of every 404 response
pub const NOT_FOUND_BODY: &str = "<html>
    <body>
        404 resource not found
    </body>
</html>
";

const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

/// Create the feed server router
pub fn create_router(state: ServerState, config: &ServerConfig) -> Router {
    let router = Router::new()
        .route("/", get(list_feeds))
        .route("/feed/:id", get(feed_document).post(feed_document))
        .route("/feed/:id/:file", get(feed_file))
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.cors_enabled {
        router.layer(build_cors_layer(&config.cors_origins))
    } else {
        router
    }
}

/// HTML index linking every feed
pub fn index_page(feeds: &FeedContainer) -> String {
    let entries = if feeds.is_empty() {
        "no entries".to_string()
    } else {
        feeds
            .feeds()
            .iter()
            .map(|feed| {
                format!(
                    "<a href='feed/{}'>{}</a></br>",
                    urlencoding::encode(&feed.feed_id),
                    html_escape(&feed.feed_name)
                )
            })
            .collect()
    };
    format!(
        "<html>
    <body>
{entries}
    </body>
</html>
"
    )
}

async fn list_feeds(State(state): State<ServerState>) -> Html<String> {
    let feeds = state.feeds.read().await;
    tracing::debug!(feeds = feeds.len(), "listing feeds");
    Html(index_page(&feeds))
}

/// Feed by id, falling back to its directory name
fn find_feed<'a>(feeds: &'a FeedContainer, id: &str) -> Option<&'a FeedEntry> {
    feeds.find_by_id(id).or_else(|| feeds.find_by_dir_name(id))
}

async fn feed_document(State(state): State<ServerState>, Path(id): Path<String>) -> Response {
    let feeds = state.feeds.read().await;
    let Some(feed) = find_feed(&feeds, &id) else {
        tracing::info!(feed_id = %id, "unknown feed requested");
        return Error::NotFound(format!("feed {id}")).into_response();
    };

    let local_dir = feed.local_dir(&state.feeds_dir);
    let stored = local_dir.join(RSS_FILE_NAME);
    let content = match tokio::fs::read_to_string(&stored).await {
        Ok(content) => content,
        Err(_) => {
            tracing::info!(feed_id = %feed.feed_id, "no stored rss, generating");
            render_channel_rss(&feed.channel, &state.host, &feed.dir_name(), &local_dir, true)
        }
    };

    ([(header::CONTENT_TYPE, RSS_CONTENT_TYPE)], content).into_response()
}

async fn feed_file(
    State(state): State<ServerState>,
    Path((id, file)): Path<(String, String)>,
    request: Request,
) -> Response {
    let dir_name = {
        let feeds = state.feeds.read().await;
        find_feed(&feeds, &id)
            .map(FeedEntry::dir_name)
            .unwrap_or(id)
    };

    let Some(path) = resolve_under_root(&state.feeds_dir, &format!("{dir_name}/{file}")) else {
        return not_found().await.into_response();
    };
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "requested file missing");
        return not_found().await.into_response();
    }

    if file == RSS_FILE_NAME {
        return match tokio::fs::read_to_string(&path).await {
            Ok(content) => ([(header::CONTENT_TYPE, RSS_CONTENT_TYPE)], content).into_response(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => not_found().await.into_response(),
            Err(e) => Error::Io(e).into_response(),
        };
    }

    match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(infallible) => match infallible {},
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html(NOT_FOUND_BODY))
}

/// Errors become html pages; a missing resource gets the regular 404 page
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status == StatusCode::NOT_FOUND {
            return (status, Html(NOT_FOUND_BODY)).into_response();
        }

        tracing::error!(error = %self, code = self.error_code(), "request failed");
        let body = format!(
            "<html>
    <body>
        {} {}
    </body>
</html>
",
            status.as_u16(),
            html_escape(self.error_code())
        );
        (status, Html(body)).into_response()
    }
}
