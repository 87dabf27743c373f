use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::upload::RunHandle;

/// Marker the backend embeds in its terminal success message.
const COMPLETION_MARKER: &str = "Process complete";
/// Label preceding the video location in the terminal success message.
const LOCATION_LABEL: &str = "Video available at:";
/// Prefix of the backend's terminal failure message.
const ERROR_PREFIX: &str = "Error:";
/// Generic message for a progress channel that died before a terminal event.
pub const PROCESSING_ERROR: &str = "Error occurred during file processing";

/// One discrete phase of a run's server-side processing, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Images,
    Scripts,
    Audio,
    Video,
    Combining,
}

impl PipelineStage {
    pub fn number(self) -> u8 {
        match self {
            PipelineStage::Images => 1,
            PipelineStage::Scripts => 2,
            PipelineStage::Audio => 3,
            PipelineStage::Video => 4,
            PipelineStage::Combining => 5,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(PipelineStage::Images),
            2 => Some(PipelineStage::Scripts),
            3 => Some(PipelineStage::Audio),
            4 => Some(PipelineStage::Video),
            5 => Some(PipelineStage::Combining),
            _ => None,
        }
    }

    /// Label shown while the stage is running.
    pub fn active_label(self) -> &'static str {
        match self {
            PipelineStage::Images => "Generating images for slides ...",
            PipelineStage::Scripts => "Generating scripts for slides ...",
            PipelineStage::Audio => "Generating audio for slides ...",
            PipelineStage::Video => "Generating video for slides ...",
            PipelineStage::Combining => "Combining all ...",
        }
    }

    /// Label shown once a later stage signal confirms this one finished.
    pub fn done_label(self) -> &'static str {
        match self {
            PipelineStage::Images => "Images generated for slides",
            PipelineStage::Scripts => "Scripts generated for slides",
            PipelineStage::Audio => "Audio generated for slides",
            PipelineStage::Video => "Video generated for slides",
            PipelineStage::Combining => "All combined",
        }
    }
}

/// Decoded observation from the progress channel. `Complete` and `Failed`
/// are terminal: the channel closes after delivering one of them.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Stage(PipelineStage),
    /// A well-formed message that matches no known stage. Passed through so
    /// newer backends cannot crash the monitor.
    Indeterminate(String),
    Complete { video_location: String },
    Failed { message: String },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. } | ProgressEvent::Failed { .. }
        )
    }
}

/// Decodes one progress message. Pure: transport never leaks in here.
///
/// The channel carries unstructured text, so decoding is pattern-driven:
/// the completion marker plus location label wins, then the error prefix,
/// then numeric stage signals; everything else is an indeterminate
/// observation rather than an error.
pub fn decode_progress(text: &str) -> ProgressEvent {
    if text.contains(COMPLETION_MARKER) {
        return match text.split_once(LOCATION_LABEL) {
            Some((_, rest)) => {
                let location = rest.trim();
                if location.is_empty() {
                    ProgressEvent::Failed {
                        message: "completion message carried no video location".to_string(),
                    }
                } else {
                    ProgressEvent::Complete {
                        video_location: location.to_string(),
                    }
                }
            }
            // The run generator ends after this line; treating it as
            // indeterminate would leave the channel waiting forever.
            None => ProgressEvent::Failed {
                message: "completion message carried no video location".to_string(),
            },
        };
    }
    if let Some(rest) = text.trim_start().strip_prefix(ERROR_PREFIX) {
        return ProgressEvent::Failed {
            message: rest.trim().to_string(),
        };
    }
    if let Ok(n) = text.trim().parse::<u8>() {
        if let Some(stage) = PipelineStage::from_number(n) {
            return ProgressEvent::Stage(stage);
        }
    }
    ProgressEvent::Indeterminate(text.to_string())
}

/// Reassembles server-sent events from raw transport chunks and yields the
/// data payloads. Events are separated by a blank line; only `data:` fields
/// matter on this channel.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buf: String,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one transport chunk and returns every complete event payload it
    /// finished.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut payloads = Vec::new();
        while let Some(idx) = self.buf.find("\n\n") {
            let event: String = self.buf.drain(..idx + 2).collect();
            let data: Vec<&str> = event
                .lines()
                .filter_map(|line| {
                    let line = line.strip_suffix('\r').unwrap_or(line);
                    line.strip_prefix("data:")
                        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
                })
                .collect();
            if !data.is_empty() {
                payloads.push(data.join("\n"));
            }
        }
        payloads
    }
}

/// Monotonic display view over raw stage observations.
///
/// Raw events are delivered in channel-arrival order and never reordered; a
/// stage signal below the highest one seen is an anomaly that is logged and
/// ignored so the display cannot revert.
#[derive(Debug, Default)]
pub struct StageTracker {
    current: Option<PipelineStage>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a stage observation. Returns `true` when the display advanced.
    pub fn observe(&mut self, stage: PipelineStage) -> bool {
        match self.current {
            Some(current) if stage <= current => {
                if stage < current {
                    warn!(
                        observed = stage.number(),
                        current = current.number(),
                        "stage signal regressed, keeping current stage"
                    );
                }
                false
            }
            _ => {
                self.current = Some(stage);
                true
            }
        }
    }

    pub fn current(&self) -> Option<PipelineStage> {
        self.current
    }

    /// Whether a stage is confirmed finished (a later stage became active).
    pub fn is_done(&self, stage: PipelineStage) -> bool {
        matches!(self.current, Some(current) if stage < current)
    }
}

/// Opens the server-push progress channel for a started run and streams
/// decoded events.
///
/// Consumes the [`RunHandle`], so exactly one channel can exist per run.
/// The channel closes on the first terminal event; transport errors and
/// early closes become a terminal `Failed` event. Dropping the receiver
/// cancels the subscription and releases the connection; no events are
/// delivered afterwards. There is no reconnection: a new run needs a new
/// subscription.
pub fn subscribe(handle: RunHandle) -> mpsc::Receiver<ProgressEvent> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        run_channel(handle, tx).await;
    });
    rx
}

async fn run_channel(handle: RunHandle, tx: mpsc::Sender<ProgressEvent>) {
    let url = handle.api.build_url("/upload_progress");
    let response = match handle.api.client().get(&url).send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            warn!(status = %response.status(), "progress channel refused");
            let _ = tx
                .send(ProgressEvent::Failed {
                    message: PROCESSING_ERROR.to_string(),
                })
                .await;
            return;
        }
        Err(e) => {
            warn!("failed to open progress channel: {}", e);
            let _ = tx
                .send(ProgressEvent::Failed {
                    message: PROCESSING_ERROR.to_string(),
                })
                .await;
            return;
        }
    };

    let mut stream = response.bytes_stream();
    let mut sse = SseBuffer::new();
    while let Some(item) = stream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("progress channel transport error: {}", e);
                let _ = tx
                    .send(ProgressEvent::Failed {
                        message: PROCESSING_ERROR.to_string(),
                    })
                    .await;
                return;
            }
        };
        for payload in sse.push(&String::from_utf8_lossy(&chunk)) {
            let event = decode_progress(&payload);
            debug!(?event, "progress event");
            let terminal = event.is_terminal();
            if tx.send(event).await.is_err() {
                // Receiver dropped: subscription cancelled. Dropping the
                // stream closes the connection.
                return;
            }
            if terminal {
                return;
            }
        }
    }

    // Stream ended without a terminal message.
    warn!("progress channel closed before a terminal message");
    let _ = tx
        .send(ProgressEvent::Failed {
            message: PROCESSING_ERROR.to_string(),
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_completion_with_trimmed_location() {
        let event = decode_progress(
            "Process complete. Video available at: /static/out/run42.mp4  ",
        );
        assert_eq!(
            event,
            ProgressEvent::Complete {
                video_location: "/static/out/run42.mp4".to_string()
            }
        );
    }

    #[test]
    fn completion_with_empty_location_fails() {
        let event = decode_progress("Process complete. Video available at:   ");
        assert!(matches!(event, ProgressEvent::Failed { .. }));
    }

    #[test]
    fn completion_without_label_fails() {
        let event = decode_progress("Process complete.");
        assert!(matches!(event, ProgressEvent::Failed { .. }));
    }

    #[test]
    fn decodes_numeric_stage_signals() {
        assert_eq!(
            decode_progress("2"),
            ProgressEvent::Stage(PipelineStage::Scripts)
        );
        assert_eq!(
            decode_progress(" 5 "),
            ProgressEvent::Stage(PipelineStage::Combining)
        );
    }

    #[test]
    fn decodes_error_line() {
        let event = decode_progress("Error: ffmpeg exited with code 1--uploads/deck.pdf");
        assert_eq!(
            event,
            ProgressEvent::Failed {
                message: "ffmpeg exited with code 1--uploads/deck.pdf".to_string()
            }
        );
    }

    #[test]
    fn unknown_text_is_indeterminate() {
        assert_eq!(
            decode_progress("warming up workers"),
            ProgressEvent::Indeterminate("warming up workers".to_string())
        );
        assert_eq!(
            decode_progress("9"),
            ProgressEvent::Indeterminate("9".to_string())
        );
    }

    #[test]
    fn sse_buffer_reassembles_split_events() {
        let mut buffer = SseBuffer::new();
        assert!(buffer.push("data: 1\n").is_empty());
        assert_eq!(buffer.push("\ndata: 2\n\n"), vec!["1", "2"]);
    }

    #[test]
    fn sse_buffer_keeps_payload_after_label() {
        let mut buffer = SseBuffer::new();
        let payloads =
            buffer.push("data: Process complete. Video available at: /api/static/deck.mp4\n\n");
        assert_eq!(
            payloads,
            vec!["Process complete. Video available at: /api/static/deck.mp4"]
        );
    }

    #[test]
    fn tracker_ignores_regressions() {
        let mut tracker = StageTracker::new();
        assert!(tracker.observe(PipelineStage::Audio));
        assert!(!tracker.observe(PipelineStage::Scripts));
        assert_eq!(tracker.current(), Some(PipelineStage::Audio));
        assert!(tracker.is_done(PipelineStage::Scripts));
        assert!(!tracker.is_done(PipelineStage::Audio));
    }

    #[test]
    fn tracker_repeat_is_idempotent() {
        let mut tracker = StageTracker::new();
        assert!(tracker.observe(PipelineStage::Images));
        assert!(!tracker.observe(PipelineStage::Images));
        assert_eq!(tracker.current(), Some(PipelineStage::Images));
    }
}
