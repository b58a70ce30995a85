//! Script feeder
//!
//! Reads motion scripts as JSON lines and pushes them onto the motion queue from a
//! plain thread, the way the sign lookup stage would.

use crate::dispatch::MotionQueue;
use anyhow::{anyhow, Result};
use signarm_shared::{rest::rest_pose, Arm, MotionScript};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// What the feeder did with its input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub enqueued: usize,
    pub malformed: usize,
}

/// Enqueue every script in `reader`
///
/// Malformed lines are logged and skipped. With `rest`, both arms are sent to their
/// rest pose before the first script and after the last.
pub fn feed<R: BufRead>(reader: R, queue: &MotionQueue, rest: bool) -> Result<FeedSummary> {
    let mut summary = FeedSummary::default();

    if rest {
        enqueue_rest(queue, &mut summary)?;
    }

    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| anyhow!("Failed to read script input: {}", e))?;
        if line.trim().is_empty() {
            continue;
        }

        let script = match MotionScript::from_json(&line) {
            Ok(script) => script,
            Err(e) => {
                summary.malformed += 1;
                warn!("[FEED] Malformed script on line {}: {}", number + 1, e);
                continue;
            }
        };

        for warning in script.shape_warnings() {
            debug!("[FEED] {}: {}", script.token, warning);
        }

        queue.enqueue(script)?;
        summary.enqueued += 1;
    }

    if rest {
        enqueue_rest(queue, &mut summary)?;
    }

    Ok(summary)
}

fn enqueue_rest(queue: &MotionQueue, summary: &mut FeedSummary) -> Result<()> {
    for arm in Arm::ALL {
        queue.enqueue(rest_pose(arm))?;
        summary.enqueued += 1;
    }
    Ok(())
}

/// Feed from `path` (stdin when absent) on a dedicated thread
///
/// The queue handle moves into the thread; the queue closes when the input ends.
pub fn spawn_feeder(
    path: Option<PathBuf>,
    queue: MotionQueue,
    rest: bool,
) -> JoinHandle<Result<FeedSummary>> {
    std::thread::spawn(move || {
        let summary = match path {
            Some(path) => {
                let file = File::open(&path)
                    .map_err(|e| anyhow!("Cannot open {}: {}", path.display(), e))?;
                info!("[FEED] Reading scripts from {}", path.display());
                feed(BufReader::new(file), &queue, rest)?
            }
            None => {
                info!("[FEED] Reading scripts from stdin");
                feed(std::io::stdin().lock(), &queue, rest)?
            }
        };

        info!(
            "[FEED] Input finished: {} enqueued, {} malformed",
            summary.enqueued, summary.malformed
        );
        Ok(summary)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::motion_queue;
    use std::io::Cursor;

    const INPUT: &str = r#"{"token":"HELLO","type":"DYNAMIC","duration":1.2,"keyframes":[{"time":0.0,"L":[0,0,0,0,0]}]}

not json
{"token":"A","type":"STATIC","duration":0.5,"keyframes":{"0.0":{"R":[10,20,30,40,50]}}}
{"token":"B","type":"STATIC","duration":0.5}
"#;

    #[tokio::test]
    async fn test_feed_skips_malformed_lines() {
        let (queue, mut rx) = motion_queue();
        let summary = feed(Cursor::new(INPUT), &queue, false).unwrap();
        drop(queue);

        assert_eq!(summary, FeedSummary { enqueued: 2, malformed: 2 });
        assert_eq!(rx.dequeue().await.unwrap().token, "HELLO");

        let letter = rx.dequeue().await.unwrap();
        assert_eq!(letter.token, "A");
        assert_eq!(letter.keyframes[0].time, 0.0);
        assert!(rx.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_feed_brackets_with_rest_poses() {
        let (queue, mut rx) = motion_queue();
        let summary = feed(Cursor::new(INPUT), &queue, true).unwrap();
        drop(queue);
        assert_eq!(summary.enqueued, 6);

        let mut tokens = Vec::new();
        while let Some(script) = rx.dequeue().await {
            tokens.push(script.token);
        }
        assert_eq!(
            tokens,
            vec!["REST_LEFT", "REST_RIGHT", "HELLO", "A", "REST_LEFT", "REST_RIGHT"]
        );
    }

    #[test]
    fn test_feed_fails_when_engine_gone() {
        let (queue, rx) = motion_queue();
        drop(rx);
        assert!(feed(Cursor::new(INPUT), &queue, false).is_err());
    }

    #[test]
    fn test_spawn_feeder_missing_file() {
        let (queue, _rx) = motion_queue();
        let handle = spawn_feeder(Some("/nonexistent/scripts.jsonl".into()), queue, false);
        assert!(handle.join().unwrap().is_err());
    }
}
