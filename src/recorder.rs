// ===============================
// src/recorder.rs
// ===============================
//
// JSONL event recorder:
// - every Event becomes one line in an append-only .jsonl file
// - writes go through a BufWriter; flushed every second and every 1000 events
// - parent directories are created on open
// - a failed write reopens the file and retries once
//
// Views hold a RecordTx. Recording never blocks: a full or absent channel
// drops the event.
//
// ENV: `RECORD_FILE=/path/to/events.jsonl` enables it (see main.rs).
//
use std::path::Path;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{debug, error, info};

use crate::domain::Event;

const FLUSH_EVERY_N_EVENTS: u32 = 1000;

/// Sending half handed to views. `Default` records nothing.
#[derive(Clone, Debug, Default)]
pub struct RecordTx(Option<mpsc::Sender<Event>>);

impl RecordTx {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self(Some(tx))
    }

    pub fn record(&self, ev: Event) {
        if let Some(tx) = &self.0 {
            if tx.try_send(ev).is_err() {
                debug!("recorder: channel full or closed, event dropped");
            }
        }
    }
}

async fn open_writer(path: &str) -> std::io::Result<BufWriter<File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent).await {
                error!(?e, %path, "recorder: create_dir_all failed");
            }
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

async fn write_line(writer: &mut BufWriter<File>, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) {
    let mut writer = match open_writer(&path).await {
        Ok(w) => w,
        Err(e) => {
            error!(?e, %path, "recorder: open failed, recording disabled");
            return;
        }
    };
    info!(%path, "recorder: started");

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut since_last_flush: u32 = 0;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else {
                    let _ = writer.flush().await;
                    info!("recorder: channel closed, stopped");
                    break;
                };
                let line = match serde_json::to_string(&ev) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(?e, "recorder: serialize error, skip event");
                        continue;
                    }
                };
                if let Err(e) = write_line(&mut writer, &line).await {
                    error!(?e, "recorder: write failed, attempting reopen");
                    match open_writer(&path).await {
                        Ok(w) => writer = w,
                        Err(e) => {
                            error!(?e, "recorder: reopen failed, drop event");
                            continue;
                        }
                    }
                    if let Err(e2) = write_line(&mut writer, &line).await {
                        error!(?e2, "recorder: write failed again after reopen, drop event");
                        continue;
                    }
                }
                since_last_flush += 1;
                if since_last_flush >= FLUSH_EVERY_N_EVENTS {
                    let _ = writer.flush().await;
                    since_last_flush = 0;
                }
            }
            _ = tick.tick() => {
                let _ = writer.flush().await;
                since_last_flush = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_one_line_per_event() {
        let path = std::env::temp_dir()
            .join(format!("fighter-pools-rec-{}", std::process::id()))
            .join("events.jsonl");
        let path = path.to_string_lossy().to_string();
        let _ = fs::remove_file(&path).await;

        let (tx, rx) = mpsc::channel(16);
        let rec = RecordTx::new(tx);
        rec.record(Event::Note("hello".into()));
        rec.record(Event::Round { pool_id: "p1".into(), ok: true });
        drop(rec);
        run(rx, path.clone()).await;

        let text = fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("\"pool_id\":\"p1\""));
    }

    #[test]
    fn default_sender_records_nothing() {
        RecordTx::default().record(Event::Note("dropped".into()));
    }
}
