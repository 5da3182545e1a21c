use async_stream::stream;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::Utc;
use futures_util::Stream;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;

use crate::web::auth::AppState;

/// Server-sent render events. A `snapshot` event carrying every known
/// channel comes first, then one `channel_updated` or `track_extended`
/// event per state change. Subscribers that fall behind skip ahead.
#[utoipa::path(
    get,
    path = "/api/stream",
    tag = "stream",
    responses(
        (status = 200, description = "Event stream of render events", content_type = "text/event-stream", body = String)
    )
)]
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe and snapshot under one lock so no change falls between them.
    let (mut rx, snapshot) = {
        let reconciler = state.reconciler.lock().await;
        (reconciler.sink().subscribe(), reconciler.snapshot(Utc::now()))
    };

    let events = stream! {
        match Event::default().event("snapshot").json_data(&snapshot) {
            Ok(event) => yield Ok::<Event, Infallible>(event),
            Err(e) => log::warn!("Failed to encode snapshot: {}", e),
        }

        loop {
            match rx.recv().await {
                Ok(render) => match Event::default().event(render.kind()).json_data(&render) {
                    Ok(event) => yield Ok::<Event, Infallible>(event),
                    Err(e) => log::warn!("Failed to encode {} event: {}", render.kind(), e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Stream subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::BodyDataStream;
    use axum::response::IntoResponse;
    use futures_util::StreamExt;
    use std::time::Duration;

    use crate::web::config::Config;

    fn state(stream_capacity: usize) -> AppState {
        let yaml = format!(
            "web:\n  stream_capacity: {}\nhistory:\n  folder: ./tracks\n  autoload: false\n",
            stream_capacity
        );
        AppState::new(Config::from_yaml(&yaml).unwrap())
    }

    async fn publish(state: &AppState, channel_id: &str) {
        let now = Utc::now();
        let payload = format!(
            r#"{{"timestamp": "{}", "lon": 1.0, "lat": 2.0}}"#,
            now.to_rfc3339()
        );
        state
            .reconciler
            .lock()
            .await
            .on_position_event(channel_id, &payload, now);
    }

    /// Reads frames until one whole `\n\n`-terminated event is buffered.
    async fn next_event(body: &mut BodyDataStream, buffer: &mut String) -> String {
        loop {
            if let Some(end) = buffer.find("\n\n") {
                let event = buffer[..end].to_string();
                buffer.drain(..end + 2);
                return event;
            }
            let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
                .await
                .expect("no event within timeout")
                .expect("stream ended")
                .unwrap();
            buffer.push_str(std::str::from_utf8(&chunk).unwrap());
        }
    }

    async fn open(state: &AppState) -> BodyDataStream {
        stream_events(State(state.clone()))
            .await
            .into_response()
            .into_body()
            .into_data_stream()
    }

    #[tokio::test]
    async fn snapshot_comes_before_changes() {
        let state = state(16);
        publish(&state, "rover1").await;

        let mut body = open(&state).await;
        let mut buffer = String::new();

        let snapshot = next_event(&mut body, &mut buffer).await;
        assert!(snapshot.starts_with("event: snapshot\n"), "{}", snapshot);
        assert!(snapshot.contains(r#""id":"rover1""#));

        publish(&state, "rover2").await;
        let update = next_event(&mut body, &mut buffer).await;
        assert!(update.starts_with("event: channel_updated\n"), "{}", update);
        assert!(update.contains(r#""channel_id":"rover2""#));
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead() {
        let state = state(2);
        let mut body = open(&state).await;
        let mut buffer = String::new();

        let snapshot = next_event(&mut body, &mut buffer).await;
        assert!(snapshot.starts_with("event: snapshot\n"));

        for i in 0..10 {
            publish(&state, &format!("c{}", i)).await;
        }

        // Only the newest events the channel still holds come through.
        let oldest_kept = next_event(&mut body, &mut buffer).await;
        assert!(oldest_kept.contains(r#""channel_id":"c8""#), "{}", oldest_kept);
        let newest = next_event(&mut body, &mut buffer).await;
        assert!(newest.contains(r#""channel_id":"c9""#), "{}", newest);

        publish(&state, "late").await;
        let after = next_event(&mut body, &mut buffer).await;
        assert!(after.starts_with("event: channel_updated\n"));
        assert!(after.contains(r#""channel_id":"late""#), "{}", after);
    }
}
