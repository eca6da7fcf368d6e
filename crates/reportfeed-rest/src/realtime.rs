//! Realtime change feed over the hosted backend's websocket.
//!
//! The socket speaks the Phoenix channel protocol: every frame is a JSON
//! object with `topic`, `event`, `payload` and `ref`. A subscription joins
//! one `realtime:<table>` channel asking for `postgres_changes`, and keeps
//! the socket alive with a heartbeat on the `phoenix` topic.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, trace, warn};

use reportfeed_core::error::{Error, ProtocolError, StoreError};
use reportfeed_core::{ChangeEvent, ChangeKind, Filter, RecordId, Result, StoreUrl, TableName};

/// Interval between heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// A Phoenix channel frame.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
}

/// Change feed over the realtime websocket.
///
/// Dropping the feed closes the socket.
pub struct RealtimeFeed {
    inner: Pin<Box<dyn Stream<Item = Result<ChangeEvent>> + Send>>,
}

/// What to subscribe to and how to authorize it.
#[derive(Debug, Clone)]
pub(crate) struct Subscription {
    pub table: TableName,
    pub filter: Option<Filter>,
    pub access_token: Option<String>,
}

impl Subscription {
    fn topic(&self) -> String {
        format!("realtime:{}", self.table)
    }

    pub(crate) fn join_message(&self) -> PhoenixMessage {
        let mut change = json!({
            "event": "*",
            "schema": "public",
            "table": self.table.as_str(),
        });
        if let Some(filter) = &self.filter {
            change["filter"] = Value::String(format!("{}=eq.{}", filter.column, filter.value));
        }

        let mut payload = json!({
            "config": {
                "broadcast": {"self": false},
                "presence": {"key": ""},
                "postgres_changes": [change],
            }
        });
        if let Some(token) = &self.access_token {
            payload["access_token"] = Value::String(token.clone());
        }

        PhoenixMessage {
            topic: self.topic(),
            event: "phx_join".to_string(),
            payload,
            reference: Some("1".to_string()),
        }
    }
}

fn heartbeat(reference: u64) -> PhoenixMessage {
    PhoenixMessage {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

fn transport(err: impl std::fmt::Display) -> Error {
    Error::Store(StoreError::Transport {
        message: err.to_string(),
    })
}

fn encode(message: &PhoenixMessage) -> Result<Message> {
    let text = serde_json::to_string(message).map_err(|e| {
        Error::Store(StoreError::Malformed {
            message: e.to_string(),
        })
    })?;
    Ok(Message::text(text))
}

/// One turn of the socket loop.
enum Step {
    Heartbeat,
    Frame(Option<std::result::Result<Message, WsError>>),
}

/// Outcome of one incoming frame.
#[derive(Debug)]
pub(crate) enum Incoming {
    /// A row changed.
    Change(ChangeEvent),
    /// The server refused the join or reported a channel error.
    Failed(ProtocolError),
    /// The server closed the channel.
    Closed,
    /// Nothing the feed needs to act on.
    Ignored,
}

/// Interpret one text frame for the subscription's channel.
pub(crate) fn interpret(text: &str, subscription: &Subscription) -> Incoming {
    let message: PhoenixMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "Ignoring unparseable realtime frame");
            return Incoming::Ignored;
        }
    };

    if message.topic != subscription.topic() {
        return Incoming::Ignored;
    }

    match message.event.as_str() {
        "postgres_changes" => {
            let data = &message.payload["data"];
            let kind = data["type"]
                .as_str()
                .or_else(|| data["eventType"].as_str())
                .map(ChangeKind::parse)
                .unwrap_or(ChangeKind::Other);
            let record_id = ["record", "old_record"]
                .iter()
                .filter_map(|key| id_of(&data[*key]))
                .next();
            Incoming::Change(ChangeEvent {
                table: subscription.table.clone(),
                kind,
                record_id,
            })
        }
        "phx_reply" => {
            let status = message.payload["status"].as_str().unwrap_or_default();
            if status == "ok" {
                debug!(topic = %message.topic, "Channel joined");
                Incoming::Ignored
            } else {
                let reason = message.payload["response"]["reason"]
                    .as_str()
                    .map(str::to_string);
                Incoming::Failed(ProtocolError::new(
                    400,
                    Some(format!("phx_reply:{status}")),
                    reason,
                ))
            }
        }
        "phx_error" => Incoming::Failed(ProtocolError::new(
            500,
            Some("phx_error".to_string()),
            Some("channel crashed".to_string()),
        )),
        "phx_close" => Incoming::Closed,
        "system" => {
            let status = message.payload["status"].as_str().unwrap_or_default();
            if status == "error" {
                let reason = message.payload["message"].as_str().map(str::to_string);
                Incoming::Failed(ProtocolError::new(400, Some("system".to_string()), reason))
            } else {
                Incoming::Ignored
            }
        }
        other => {
            trace!(event = other, "Ignoring realtime event");
            Incoming::Ignored
        }
    }
}

fn id_of(record: &Value) -> Option<RecordId> {
    match record.get("id")? {
        Value::String(s) => RecordId::new(s.as_str()).ok(),
        Value::Number(n) => RecordId::new(n.to_string()).ok(),
        _ => None,
    }
}

impl RealtimeFeed {
    pub(crate) fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<ChangeEvent>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Connect, join the channel and stream its changes.
    pub(crate) async fn connect(
        url: &StoreUrl,
        api_key: &str,
        subscription: Subscription,
    ) -> Result<Self> {
        let ws_url = url.realtime_url(api_key);
        info!(table = %subscription.table, "Connecting to realtime");

        let (ws_stream, _) = connect_async(ws_url.as_str()).await.map_err(transport)?;
        let (mut write, mut read) = ws_stream.split();

        write
            .send(encode(&subscription.join_message())?)
            .await
            .map_err(transport)?;

        debug!("WebSocket connected, joined channel");

        let stream = async_stream::stream! {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + HEARTBEAT_INTERVAL,
                HEARTBEAT_INTERVAL,
            );
            let mut reference: u64 = 1;

            loop {
                let step = tokio::select! {
                    _ = ticker.tick() => Step::Heartbeat,
                    frame = read.next() => Step::Frame(frame),
                };

                match step {
                    Step::Heartbeat => {
                        reference += 1;
                        let sent = match encode(&heartbeat(reference)) {
                            Ok(frame) => write.send(frame).await.map_err(transport),
                            Err(e) => Err(e),
                        };
                        if let Err(e) = sent {
                            yield Err(e);
                            break;
                        }
                        trace!(reference, "Sent heartbeat");
                    }
                    Step::Frame(Some(Ok(Message::Text(text)))) => {
                        match interpret(&text, &subscription) {
                            Incoming::Change(event) => yield Ok(event),
                            Incoming::Failed(error) => {
                                warn!(%error, "Realtime channel error");
                                yield Err(Error::Store(StoreError::Rejected(error)));
                                break;
                            }
                            Incoming::Closed => {
                                info!("Channel closed by server");
                                break;
                            }
                            Incoming::Ignored => {}
                        }
                    }
                    Step::Frame(Some(Ok(Message::Ping(data)))) => {
                        trace!("Received ping");
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!(error = %e, "Failed to send pong");
                        }
                    }
                    Step::Frame(Some(Ok(Message::Close(frame)))) => {
                        info!(?frame, "WebSocket closed by server");
                        break;
                    }
                    Step::Frame(Some(Ok(_))) => {}
                    Step::Frame(Some(Err(e))) => {
                        error!(error = %e, "WebSocket error");
                        yield Err(transport(e));
                        break;
                    }
                    Step::Frame(None) => break,
                }
            }
        };

        Ok(Self::new(stream))
    }

    /// Connect in the background. Connection failures arrive as the feed's
    /// first item.
    pub(crate) fn spawn(url: StoreUrl, api_key: String, subscription: Subscription) -> Self {
        let (tx, mut rx) = mpsc::channel::<Result<ChangeEvent>>(100);

        tokio::spawn(async move {
            match RealtimeFeed::connect(&url, &api_key, subscription).await {
                Ok(mut stream) => loop {
                    tokio::select! {
                        _ = tx.closed() => break,
                        event = stream.next() => match event {
                            Some(event) => {
                                if tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                },
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
            trace!("Realtime task finished");
        });

        let stream = async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        };

        Self::new(stream)
    }
}

impl Stream for RealtimeFeed {
    type Item = Result<ChangeEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(filter: Option<Filter>) -> Subscription {
        Subscription {
            table: TableName::new("Reports").unwrap(),
            filter,
            access_token: Some("jwt".to_string()),
        }
    }

    #[test]
    fn join_message_shape() {
        let join = subscription(Some(Filter::eq("user_id", "u1"))).join_message();
        assert_eq!(join.topic, "realtime:Reports");
        assert_eq!(join.event, "phx_join");
        let change = &join.payload["config"]["postgres_changes"][0];
        assert_eq!(change["event"], "*");
        assert_eq!(change["schema"], "public");
        assert_eq!(change["table"], "Reports");
        assert_eq!(change["filter"], "user_id=eq.u1");
        assert_eq!(join.payload["access_token"], "jwt");
    }

    #[test]
    fn join_without_filter_has_no_filter_key() {
        let join = subscription(None).join_message();
        assert!(join.payload["config"]["postgres_changes"][0].get("filter").is_none());
    }

    #[test]
    fn postgres_change_becomes_event() {
        let text = json!({
            "topic": "realtime:Reports",
            "event": "postgres_changes",
            "payload": {
                "data": {
                    "type": "INSERT",
                    "table": "Reports",
                    "record": {"id": "r9", "user_id": "u1"}
                },
                "ids": [1]
            },
            "ref": null
        })
        .to_string();

        match interpret(&text, &subscription(None)) {
            Incoming::Change(event) => {
                assert_eq!(event.kind, ChangeKind::Insert);
                assert_eq!(event.record_id.unwrap().as_str(), "r9");
            }
            other => panic!("expected change, got {other:?}"),
        }
    }

    #[test]
    fn delete_uses_old_record_id() {
        let text = json!({
            "topic": "realtime:Reports",
            "event": "postgres_changes",
            "payload": {"data": {"type": "DELETE", "record": null, "old_record": {"id": 7}}}
        })
        .to_string();

        match interpret(&text, &subscription(None)) {
            Incoming::Change(event) => {
                assert_eq!(event.kind, ChangeKind::Delete);
                assert_eq!(event.record_id.unwrap().as_str(), "7");
            }
            other => panic!("expected change, got {other:?}"),
        }
    }

    #[test]
    fn rejected_join_is_failure() {
        let text = json!({
            "topic": "realtime:Reports",
            "event": "phx_reply",
            "payload": {"status": "error", "response": {"reason": "Unauthorized"}},
            "ref": "1"
        })
        .to_string();
        assert!(matches!(
            interpret(&text, &subscription(None)),
            Incoming::Failed(ref p) if p.message.as_deref() == Some("Unauthorized")
        ));
    }

    #[test]
    fn other_topics_and_heartbeat_replies_are_ignored() {
        let reply = json!({
            "topic": "phoenix",
            "event": "phx_reply",
            "payload": {"status": "ok", "response": {}},
            "ref": "2"
        })
        .to_string();
        assert!(matches!(interpret(&reply, &subscription(None)), Incoming::Ignored));
        assert!(matches!(interpret("not json", &subscription(None)), Incoming::Ignored));
    }
}
