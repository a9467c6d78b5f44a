// ===============================
// src/recorder.rs
// ===============================
//
// JSONL recorder yang ringan & tahan banting:
// - Setiap Event dibungkus {ts_ns, gateway, event} lalu ditulis satu baris.
// - Flush periodik tiap 1s atau tiap 1000 event.
// - Jika tulis gagal, reopen file dan coba sekali lagi.
//
use serde::Serialize;
use std::path::Path;
use tokio::{
    fs::{self, OpenOptions},
    io::{self, AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::Event;

const FLUSH_EVERY_N_EVENTS: u32 = 1000;

#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub ts_ns: i64,
    pub gateway: &'a str,
    pub event: &'a Event,
}

pub fn encode_line(gateway: &str, ev: &Event, ts_ns: i64) -> serde_json::Result<String> {
    serde_json::to_string(&Envelope { ts_ns, gateway, event: ev })
}

async fn open_writer(path: &str) -> io::Result<BufWriter<fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

async fn write_line(writer: &mut BufWriter<fs::File>, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

pub async fn run(mut rx: mpsc::UnboundedReceiver<Event>, gateway: String, path: String) -> io::Result<()> {
    info!(%path, "recorder: started");
    let mut writer = open_writer(&path).await?;

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut since_last_flush: u32 = 0;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else {
                    writer.flush().await?;
                    info!("recorder: channel closed, stopped");
                    return Ok(());
                };
                let ts_ns = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
                let line = match encode_line(&gateway, &ev, ts_ns) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(?e, "recorder: serialize error, skip event");
                        continue;
                    }
                };

                if let Err(e) = write_line(&mut writer, &line).await {
                    error!(?e, "recorder: write failed, attempting reopen");
                    writer = open_writer(&path).await?;
                    if let Err(e2) = write_line(&mut writer, &line).await {
                        error!(?e2, "recorder: write failed again after reopen, drop event");
                        continue;
                    }
                }

                since_last_flush += 1;
                if since_last_flush >= FLUSH_EVERY_N_EVENTS {
                    writer.flush().await?;
                    since_last_flush = 0;
                }
            }

            _ = tick.tick() => {
                writer.flush().await?;
                since_last_flush = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LogNote;

    #[test]
    fn envelope_carries_gateway_and_timestamp() {
        let ev = Event::Log(LogNote { code: Some(3), message: "x".into() });
        let line = encode_line("CTP", &ev, 42).unwrap();
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["ts_ns"], 42);
        assert_eq!(v["gateway"], "CTP");
        assert_eq!(v["event"]["Log"]["code"], 3);
    }

    #[tokio::test]
    async fn writes_one_line_per_event_and_flushes_on_close() {
        let dir = std::env::temp_dir().join(format!("venue_session_rec_{}", std::process::id()));
        let path = dir.join("events.jsonl");
        let path_str = path.to_string_lossy().to_string();

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Event::Log(LogNote { code: None, message: "a".into() })).unwrap();
        tx.send(Event::Log(LogNote { code: None, message: "b".into() })).unwrap();
        drop(tx);

        run(rx, "CTP".into(), path_str).await.unwrap();
        let body = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(body.lines().count(), 2);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
