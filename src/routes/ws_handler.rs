use axum::extract::ws::{Message, WebSocket};
use serde::Serialize;
use tracing::{info, warn, error};

use gwfetch::{JobStatus, LogLevel, LogLine, LogTail, TailItem};

#[derive(Serialize)]
struct LogPayload<'a> {
    seq: u64,
    level: Option<LogLevel>,
    message: &'a str,
    timestamp: Option<String>,
    status: Option<&'a JobStatus>,
    end_flag: bool,
}

impl<'a> LogPayload<'a> {
    fn line(line: &'a LogLine) -> Self {
        Self {
            seq: line.seq,
            level: Some(line.level),
            message: &line.message,
            timestamp: Some(line.timestamp.to_rfc3339()),
            status: None,
            end_flag: false,
        }
    }

    fn end(seq: u64, status: &'a JobStatus) -> Self {
        Self {
            seq,
            level: None,
            message: "",
            timestamp: None,
            status: Some(status),
            end_flag: true,
        }
    }
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, payload: &T) -> bool {
    let json = match serde_json::to_string(payload) {
        Ok(j) => j,
        Err(e) => {
            error!("json serialize error: {}", e);
            return false;
        }
    };

    if let Err(e) = socket.send(Message::Text(json.into())).await {
        warn!("ws send failed: {}", e);
        return false;
    }
    true
}

/// Streams a job log as JSON frames, finishing with an `end_flag` frame carrying the job status.
///
/// Returns as soon as the client closes, even while the job is quiet.
pub async fn handle_ws_tail(mut socket: WebSocket, mut tail: LogTail) {
    info!("ws log tail started");

    loop {
        let item = tokio::select! {
            item = tail.next_item() => item,
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    info!("ws client disconnected");
                    return;
                }
                Some(Ok(_)) => continue,
            },
        };

        match item {
            Some(TailItem::Lines(lines)) => {
                for line in &lines {
                    if !send_json(&mut socket, &LogPayload::line(line)).await {
                        return;
                    }
                }
            }
            Some(TailItem::End(status)) => {
                let seq = tail.cursor() as u64;
                if send_json(&mut socket, &LogPayload::end(seq, &status)).await {
                    let _ = socket.send(Message::Close(None)).await;
                }
            }
            None => break,
        }
    }

    info!("ws log tail finished");
}
