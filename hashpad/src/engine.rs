//! The editor session object and the task that drives it from one logical thread of control.

use std::time::Instant as StdInstant;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::capacity::{CapacityReadout, CapacitySnapshot};
use crate::channel::{Channel, NavigationEvent};
use crate::codec::encode;
use crate::config::EngineConfig;
use crate::error::AppError;
use crate::metrics::{SyncMetrics, SyncReport};
use crate::mutation::{MergedText, TextSurface, clean_transcript, merge_transcript};
use crate::navigation::{ChannelRead, NavigationBridge, PublishOutcome};
use crate::scheduler::SaveScheduler;
use crate::state::{LoadStatus, SyncState};

const COMMAND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FlushOutcome {
    Written,
    /// Channel already held the document.
    Unchanged,
    /// Document no longer fits; it stays dirty in memory.
    OverLimit,
    /// Encoding failed; it stays dirty in memory.
    EncodeFailed,
    NothingToFlush,
    Disposed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub text: String,
    pub dirty: bool,
    pub flush_pending: bool,
    pub capacity: CapacityReadout,
    pub load_status: LoadStatus,
}

pub struct EditorEngine<C> {
    state: SyncState,
    /// Encoded form of `state.current_text`, kept in step with every mutation.
    encoded: String,
    capacity: CapacitySnapshot,
    scheduler: SaveScheduler,
    bridge: NavigationBridge<C>,
    metrics: SyncMetrics,
    load_status: LoadStatus,
    disposed: bool,
}

impl<C: Channel> EditorEngine<C> {
    pub fn new(channel: C, config: &EngineConfig) -> Self {
        Self {
            state: SyncState::default(),
            encoded: String::new(),
            capacity: CapacitySnapshot::empty(),
            scheduler: SaveScheduler::new(config.save_delay()),
            bridge: NavigationBridge::new(channel, config),
            metrics: SyncMetrics::new(),
            load_status: LoadStatus::Empty,
            disposed: false,
        }
    }

    /// Cold load: hydrates from whatever the channel holds right now.
    pub fn start(&mut self) -> LoadStatus {
        match self.bridge.read(&mut self.metrics) {
            ChannelRead::Empty => self.reset_to_empty(),
            ChannelRead::Document { text, encoded } => self.hydrate(text, encoded),
            ChannelRead::Unreadable { .. } => {
                self.state.reset();
                self.encoded.clear();
                self.capacity = self.bridge.assess("");
                self.load_status = LoadStatus::Unreadable;
            }
        }
        info!(
            status = ?self.load_status,
            chars = self.state.current_text.chars().count(),
            percent_used = self.capacity.percent_used(),
            "editor session started"
        );
        self.load_status
    }

    /// The single entry point for typing and merged dictation alike.
    pub fn apply_mutation(&mut self, text: String, now: Instant) -> CapacityReadout {
        if self.disposed {
            return self.capacity.readout();
        }

        let dirty = self.state.apply(text);
        self.encoded = self.encode_current();
        self.capacity = self.bridge.assess(&self.encoded);
        if dirty {
            self.scheduler.on_mutation(now);
        }
        self.capacity.readout()
    }

    /// Merges a finalized dictation phrase at `caret` and routes it through `apply_mutation`.
    pub fn insert_transcript(
        &mut self,
        fragment: &str,
        caret: Option<usize>,
        now: Instant,
    ) -> Option<MergedText> {
        if self.disposed {
            return None;
        }

        let cleaned = match clean_transcript(fragment) {
            Ok(cleaned) if !cleaned.is_empty() => cleaned,
            Ok(_) => return None,
            Err(err) => {
                warn!("dropped transcript: {err}");
                return None;
            }
        };

        let merged = merge_transcript(&self.state.current_text, caret, &cleaned);
        self.apply_mutation(merged.text.clone(), now);
        Some(merged)
    }

    /// Uses the widget's caret only while the widget shows the engine's document; a caret into
    /// different text would land the phrase in the wrong place, so it falls back to the end.
    pub fn insert_transcript_from(
        &mut self,
        surface: &dyn TextSurface,
        fragment: &str,
        now: Instant,
    ) -> Option<MergedText> {
        let caret = surface
            .caret_position()
            .filter(|_| surface.text() == self.state.current_text);
        if caret.is_none() && surface.caret_position().is_some() {
            debug!("widget text is out of step with the document; appending transcript");
        }
        self.insert_transcript(fragment, caret, now)
    }

    /// Runs the debounced flush if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<FlushOutcome> {
        if !self.scheduler.take_due(now) {
            return None;
        }
        if !self.state.dirty {
            return Some(FlushOutcome::NothingToFlush);
        }
        Some(self.flush())
    }

    /// Flushes immediately on blur, pointer movement or before dictation starts. A clean or empty
    /// document leaves any pending timer in place.
    pub fn force_flush(&mut self) -> FlushOutcome {
        if self.disposed {
            return FlushOutcome::Disposed;
        }
        if !self.state.dirty || self.state.current_text.is_empty() {
            return FlushOutcome::NothingToFlush;
        }
        self.scheduler.cancel();
        self.flush()
    }

    pub fn recording_started(&mut self) -> FlushOutcome {
        debug!("dictation starting; flushing pending edits");
        self.force_flush()
    }

    /// Back/forward or out-of-band change. Never writes to the channel.
    pub fn on_navigation(&mut self, event: NavigationEvent) -> LoadStatus {
        if self.disposed {
            return self.load_status;
        }

        match self.bridge.read(&mut self.metrics) {
            ChannelRead::Empty => {
                self.scheduler.cancel();
                self.reset_to_empty();
            }
            ChannelRead::Document { text, encoded } => {
                self.scheduler.cancel();
                self.hydrate(text, encoded);
            }
            ChannelRead::Unreadable { .. } => {
                warn!(?event, "navigated to an unreadable link; keeping current document");
                self.load_status = LoadStatus::Unreadable;
                return self.load_status;
            }
        }

        self.metrics.record_navigation();
        info!(
            ?event,
            status = ?self.load_status,
            percent_used = self.capacity.percent_used(),
            "document replaced from navigation"
        );
        self.load_status
    }

    /// Session end with the channel still alive: persists any dirty content, including an
    /// emptied document, then disposes.
    pub fn close(&mut self) -> FlushOutcome {
        if self.disposed {
            return FlushOutcome::Disposed;
        }
        let outcome = if self.state.dirty {
            self.scheduler.cancel();
            self.flush()
        } else {
            FlushOutcome::NothingToFlush
        };
        self.dispose();
        outcome
    }

    /// Cancels the save timer without flushing. Everything afterwards is a no-op.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if self.scheduler.cancel() {
            debug!("disposed with a pending flush; it will not fire");
        }
        self.scheduler.dispose();
        self.disposed = true;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.deadline()
    }

    pub fn text(&self) -> &str {
        &self.state.current_text
    }

    pub fn sync_state(&self) -> &SyncState {
        &self.state
    }

    pub fn capacity(&self) -> CapacitySnapshot {
        self.capacity
    }

    pub fn load_status(&self) -> LoadStatus {
        self.load_status
    }

    pub fn channel(&self) -> &C {
        self.bridge.channel()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            text: self.state.current_text.clone(),
            dirty: self.state.dirty,
            flush_pending: self.scheduler.deadline().is_some(),
            capacity: self.capacity.readout(),
            load_status: self.load_status,
        }
    }

    pub fn report(&self) -> SyncReport {
        self.metrics.report()
    }

    fn flush(&mut self) -> FlushOutcome {
        if self.disposed {
            return FlushOutcome::Disposed;
        }

        let text = self.state.current_text.clone();
        if self.encoded.is_empty() && !text.is_empty() {
            self.metrics.record_codec_failure();
            warn!("document could not be encoded; keeping it in memory");
            return FlushOutcome::EncodeFailed;
        }

        let outcome = match self.bridge.publish(&self.encoded, &mut self.metrics) {
            PublishOutcome::OverLimit => return FlushOutcome::OverLimit,
            PublishOutcome::Unchanged => FlushOutcome::Unchanged,
            PublishOutcome::Written => FlushOutcome::Written,
        };
        self.state.mark_persisted(&text);
        self.load_status = if text.is_empty() {
            LoadStatus::Empty
        } else {
            LoadStatus::Loaded
        };
        outcome
    }

    fn encode_current(&mut self) -> String {
        let started = StdInstant::now();
        let encoded = encode(&self.state.current_text);
        self.metrics
            .record_encode(started.elapsed().as_micros() as u64);
        encoded
    }

    fn hydrate(&mut self, text: String, encoded: String) {
        self.state = SyncState::hydrated(text);
        self.capacity = self.bridge.assess(&encoded);
        self.encoded = encoded;
        self.load_status = LoadStatus::Loaded;
    }

    fn reset_to_empty(&mut self) {
        self.state.reset();
        self.encoded.clear();
        self.capacity = self.bridge.assess("");
        self.load_status = LoadStatus::Empty;
    }
}

pub enum EngineCommand {
    Mutation(String),
    Transcript {
        text: String,
        caret: Option<usize>,
    },
    RecordingStarted,
    /// Focus left the text surface or the pointer moved after an edit.
    ForceFlush,
    Snapshot(oneshot::Sender<EngineSnapshot>),
    Report(oneshot::Sender<SyncReport>),
    /// Flushes outstanding edits, then disposes the engine.
    Shutdown(oneshot::Sender<FlushOutcome>),
}

/// Cheap, cloneable front door to an engine running on its own task.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    capacity: watch::Receiver<CapacityReadout>,
}

impl EngineHandle {
    pub async fn apply_mutation(&self, text: impl Into<String>) -> Result<(), AppError> {
        self.send(EngineCommand::Mutation(text.into())).await
    }

    /// `caret` comes from the widget's `TextSurface`; `None` appends at the end.
    pub async fn insert_transcript(
        &self,
        text: impl Into<String>,
        caret: Option<usize>,
    ) -> Result<(), AppError> {
        self.send(EngineCommand::Transcript {
            text: text.into(),
            caret,
        })
        .await
    }

    pub async fn recording_started(&self) -> Result<(), AppError> {
        self.send(EngineCommand::RecordingStarted).await
    }

    pub async fn force_flush(&self) -> Result<(), AppError> {
        self.send(EngineCommand::ForceFlush).await
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot, AppError> {
        let (reply, response) = oneshot::channel();
        self.send(EngineCommand::Snapshot(reply)).await?;
        response.await.map_err(|_| AppError::EngineStopped)
    }

    pub async fn report(&self) -> Result<SyncReport, AppError> {
        let (reply, response) = oneshot::channel();
        self.send(EngineCommand::Report(reply)).await?;
        response.await.map_err(|_| AppError::EngineStopped)
    }

    pub async fn shutdown(&self) -> Result<FlushOutcome, AppError> {
        let (reply, response) = oneshot::channel();
        self.send(EngineCommand::Shutdown(reply)).await?;
        response.await.map_err(|_| AppError::EngineStopped)
    }

    pub fn capacity(&self) -> watch::Receiver<CapacityReadout> {
        self.capacity.clone()
    }

    async fn send(&self, command: EngineCommand) -> Result<(), AppError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::EngineStopped)
    }
}

/// Starts `engine` (cold load included) on a tokio task and returns its handle.
pub fn spawn_engine<C>(
    mut engine: EditorEngine<C>,
    navigation: broadcast::Receiver<NavigationEvent>,
) -> (EngineHandle, JoinHandle<()>)
where
    C: Channel + Send + 'static,
{
    engine.start();
    let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (capacity_tx, capacity) = watch::channel(engine.capacity().readout());

    let task = tokio::spawn(run_engine(engine, command_rx, navigation, capacity_tx));
    (EngineHandle { commands, capacity }, task)
}

async fn run_engine<C: Channel>(
    mut engine: EditorEngine<C>,
    mut commands: mpsc::Receiver<EngineCommand>,
    mut navigation: broadcast::Receiver<NavigationEvent>,
    capacity: watch::Sender<CapacityReadout>,
) {
    let mut navigation_open = true;

    loop {
        let deadline = engine.next_deadline();

        // Commands queued before a navigation event must be applied first.
        tokio::select! {
            biased;

            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("all engine handles dropped");
                    break;
                };
                if handle_command(&mut engine, command) {
                    break;
                }
            }
            event = navigation.recv(), if navigation_open => {
                match event {
                    Ok(event) => {
                        engine.on_navigation(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("navigation listener lagged, skipped {skipped} events");
                        engine.on_navigation(NavigationEvent::External);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("navigation event channel closed");
                        navigation_open = false;
                    }
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some(outcome) = engine.poll(Instant::now()) {
                    debug!(?outcome, "debounced flush finished");
                }
            }
        }

        capacity.send_if_modified(|current| {
            let next = engine.capacity().readout();
            let changed = *current != next;
            *current = next;
            changed
        });
    }

    engine.dispose();
}

/// Returns `true` when the engine should stop.
fn handle_command<C: Channel>(engine: &mut EditorEngine<C>, command: EngineCommand) -> bool {
    match command {
        EngineCommand::Mutation(text) => {
            engine.apply_mutation(text, Instant::now());
        }
        EngineCommand::Transcript { text, caret } => {
            engine.insert_transcript(&text, caret, Instant::now());
        }
        EngineCommand::RecordingStarted => {
            engine.recording_started();
        }
        EngineCommand::ForceFlush => {
            engine.force_flush();
        }
        EngineCommand::Snapshot(reply) => {
            let _ = reply.send(engine.snapshot());
        }
        EngineCommand::Report(reply) => {
            let _ = reply.send(engine.report());
        }
        EngineCommand::Shutdown(reply) => {
            let outcome = engine.close();
            info!(?outcome, "editor session shut down");
            let _ = reply.send(outcome);
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;
    use crate::channel::{MemoryChannel, WriteMode};
    use crate::codec::decode;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn engine_with(initial: &str) -> (EditorEngine<MemoryChannel>, MemoryChannel) {
        let channel = MemoryChannel::new(initial);
        let mut engine = EditorEngine::new(channel.clone(), &EngineConfig::default());
        engine.start();
        (engine, channel)
    }

    #[test]
    fn cold_load_with_empty_channel_yields_empty_document() {
        let (engine, _) = engine_with("");
        assert_eq!(engine.load_status(), LoadStatus::Empty);
        assert_eq!(engine.text(), "");
        assert_eq!(engine.capacity().percent_used(), 0);
        assert!(!engine.sync_state().dirty);
    }

    #[test]
    fn cold_load_hydrates_document_and_meter() {
        let encoded = encode("# Shopping\n- milk");
        let (engine, channel) = engine_with(&encoded);

        assert_eq!(engine.load_status(), LoadStatus::Loaded);
        assert_eq!(engine.text(), "# Shopping\n- milk");
        assert_eq!(engine.sync_state().last_persisted_text, "# Shopping\n- milk");
        assert!(!engine.sync_state().dirty);
        assert_eq!(
            engine.capacity(),
            crate::capacity::assess(&encoded, EngineConfig::default().max_channel_length)
        );
        assert_eq!(channel.write_count(), 0);
    }

    #[test]
    fn cold_load_of_corrupt_link_is_flagged_not_overwritten() {
        let (mut engine, channel) = engine_with("bm90IGd6aXA");
        assert_eq!(engine.load_status(), LoadStatus::Unreadable);
        assert_eq!(engine.text(), "");
        assert!(!engine.sync_state().dirty);

        assert_eq!(engine.force_flush(), FlushOutcome::NothingToFlush);
        assert_eq!(channel.read(), "bm90IGd6aXA");
        assert_eq!(channel.write_count(), 0);
    }

    #[test]
    fn debounce_coalesces_into_one_flush_with_latest_content() {
        let start = Instant::now();
        let (mut engine, channel) = engine_with("");

        engine.apply_mutation("a".to_string(), start);
        engine.apply_mutation("ab".to_string(), start + ms(200));
        engine.apply_mutation("abc".to_string(), start + ms(400));

        assert_eq!(engine.poll(start + ms(1_000)), None);
        assert_eq!(engine.poll(start + ms(1_399)), None);
        assert_eq!(engine.poll(start + ms(1_400)), Some(FlushOutcome::Written));
        assert_eq!(engine.poll(start + ms(3_000)), None);

        assert_eq!(channel.write_count(), 1);
        assert_eq!(decode(&channel.read()), "abc");
        assert!(!engine.sync_state().dirty);
    }

    #[test]
    fn force_flush_cancels_the_pending_timer() {
        let start = Instant::now();
        let (mut engine, channel) = engine_with("");

        engine.apply_mutation("draft".to_string(), start);
        assert_eq!(engine.next_deadline(), Some(start + ms(1_000)));

        assert_eq!(engine.force_flush(), FlushOutcome::Written);
        assert_eq!(engine.next_deadline(), None);
        assert_eq!(engine.poll(start + ms(1_000)), None);
        assert_eq!(channel.write_count(), 1);
    }

    #[test]
    fn force_flush_is_noop_for_clean_or_empty_documents() {
        let start = Instant::now();
        let (mut engine, channel) = engine_with(&encode("kept"));
        assert_eq!(engine.force_flush(), FlushOutcome::NothingToFlush);

        engine.apply_mutation(String::new(), start);
        assert_eq!(engine.force_flush(), FlushOutcome::NothingToFlush);
        assert!(engine.next_deadline().is_some());

        // The debounced path still persists the cleared document.
        assert_eq!(engine.poll(start + ms(1_000)), Some(FlushOutcome::Written));
        assert_eq!(channel.read(), "");
    }

    #[test]
    fn unchanged_content_is_written_once() {
        let start = Instant::now();
        let (mut engine, channel) = engine_with("");

        engine.apply_mutation("same".to_string(), start);
        assert_eq!(engine.force_flush(), FlushOutcome::Written);
        assert_eq!(engine.force_flush(), FlushOutcome::NothingToFlush);
        assert_eq!(engine.flush(), FlushOutcome::Unchanged);
        assert_eq!(channel.write_count(), 1);
    }

    #[test]
    fn returning_to_saved_text_clears_dirty() {
        let start = Instant::now();
        let (mut engine, channel) = engine_with(&encode("saved"));

        engine.apply_mutation("saved, edited".to_string(), start);
        assert!(engine.sync_state().dirty);
        engine.apply_mutation("saved".to_string(), start + ms(100));
        assert!(!engine.sync_state().dirty);

        assert_eq!(
            engine.poll(start + ms(1_100)),
            Some(FlushOutcome::NothingToFlush)
        );
        assert_eq!(channel.write_count(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn over_limit_document_is_kept_in_memory_and_not_written(
            text in "[A-Za-z0-9]{4000}",
        ) {
            let start = Instant::now();
            let (mut engine, channel) = engine_with("");

            let readout = engine.apply_mutation(text.clone(), start);
            prop_assert!(readout.over_limit);
            prop_assert!(readout.percent_used > 100);

            prop_assert_eq!(engine.force_flush(), FlushOutcome::OverLimit);
            prop_assert_eq!(engine.text(), text.as_str());
            prop_assert!(engine.sync_state().dirty);
            prop_assert!(engine.capacity().over_limit);
            prop_assert_eq!(channel.read(), "");
            prop_assert_eq!(channel.write_count(), 0);
            prop_assert_eq!(engine.report().over_limit_blocks, 1);
        }

        #[test]
        fn appending_text_flags_over_limit_exactly_past_the_ceiling(
            prefix in "[A-Za-z0-9 ]{0,1500}",
            suffix in "[A-Za-z0-9]{1,3000}",
        ) {
            let start = Instant::now();
            let (mut engine, _) = engine_with("");
            let max_length = EngineConfig::default().max_channel_length;
            let grown = format!("{prefix}{suffix}");

            let before = engine.apply_mutation(prefix.clone(), start);
            prop_assert_eq!(before.over_limit, encode(&prefix).len() + 1 > max_length);

            let after = engine.apply_mutation(grown.clone(), start + ms(10));
            prop_assert_eq!(after.over_limit, encode(&grown).len() + 1 > max_length);
        }
    }

    #[test]
    fn navigation_hydrates_without_writing_back() {
        let start = Instant::now();
        let (mut engine, mut host) = engine_with("");
        let content = "fetched from history";

        host.write(&encode(content), WriteMode::Append);
        let writes_before = host.write_count();

        assert_eq!(
            engine.on_navigation(NavigationEvent::External),
            LoadStatus::Loaded
        );
        assert_eq!(engine.text(), content);
        assert!(!engine.sync_state().dirty);
        assert_eq!(engine.next_deadline(), None);
        assert_eq!(engine.poll(start + ms(10_000)), None);
        assert_eq!(host.write_count(), writes_before);
    }

    #[test]
    fn navigation_discards_pending_local_flush() {
        let start = Instant::now();
        let channel = MemoryChannel::new("");
        let config = EngineConfig {
            write_mode: WriteMode::Append,
            ..EngineConfig::default()
        };
        let mut engine = EditorEngine::new(channel.clone(), &config);
        engine.start();

        engine.apply_mutation("first".to_string(), start);
        engine.force_flush();
        engine.apply_mutation("first, then more".to_string(), start + ms(100));

        assert!(channel.back());
        assert_eq!(engine.on_navigation(NavigationEvent::Back), LoadStatus::Empty);
        assert_eq!(engine.text(), "");
        assert_eq!(engine.poll(start + ms(5_000)), None);
        assert_eq!(channel.write_count(), 1);
    }

    #[test]
    fn navigation_to_unreadable_link_keeps_document() {
        let start = Instant::now();
        let (mut engine, host) = engine_with("");
        engine.apply_mutation("local work".to_string(), start);

        host.set_external("!!corrupt!!");
        assert_eq!(
            engine.on_navigation(NavigationEvent::External),
            LoadStatus::Unreadable
        );
        assert_eq!(engine.text(), "local work");
        assert!(engine.sync_state().dirty);
    }

    #[test]
    fn transcript_flows_through_the_mutation_path() {
        let start = Instant::now();
        let (mut engine, _) = engine_with(&encode("Dear team"));

        let merged = engine
            .insert_transcript("  see you monday ", None, start)
            .expect("transcript should merge");
        assert_eq!(merged.text, "Dear team see you monday");
        assert_eq!(engine.text(), "Dear team see you monday");
        assert!(engine.sync_state().dirty);
        assert_eq!(engine.next_deadline(), Some(start + ms(1_000)));

        assert_eq!(engine.insert_transcript("   ", None, start), None);
    }

    struct Surface {
        text: &'static str,
        caret: Option<usize>,
    }

    impl TextSurface for Surface {
        fn caret_position(&self) -> Option<usize> {
            self.caret
        }

        fn text(&self) -> String {
            self.text.to_string()
        }
    }

    #[test]
    fn transcript_uses_surface_caret() {
        let start = Instant::now();
        let (mut engine, _) = engine_with(&encode("world"));
        let surface = Surface {
            text: "world",
            caret: Some(0),
        };
        engine.insert_transcript_from(&surface, "hello", start);
        assert_eq!(engine.text(), "hello world");
    }

    #[test]
    fn stale_surface_caret_falls_back_to_end() {
        let start = Instant::now();
        let (mut engine, _) = engine_with(&encode("world"));
        let surface = Surface {
            text: "older widget text",
            caret: Some(0),
        };
        engine.insert_transcript_from(&surface, "hello", start);
        assert_eq!(engine.text(), "world hello");
    }

    #[test]
    fn recording_start_flushes_pending_edits() {
        let start = Instant::now();
        let (mut engine, channel) = engine_with("");
        engine.apply_mutation("before dictation".to_string(), start);

        assert_eq!(engine.recording_started(), FlushOutcome::Written);
        assert_eq!(decode(&channel.read()), "before dictation");
    }

    #[test]
    fn dispose_cancels_pending_flush() {
        let start = Instant::now();
        let (mut engine, channel) = engine_with("");
        engine.apply_mutation("unsaved".to_string(), start);

        engine.dispose();
        assert_eq!(engine.poll(start + ms(5_000)), None);
        assert_eq!(engine.force_flush(), FlushOutcome::Disposed);
        assert_eq!(channel.write_count(), 0);

        engine.apply_mutation("ignored".to_string(), start);
        assert_eq!(engine.text(), "unsaved");
        assert_eq!(engine.insert_transcript("late phrase", None, start), None);
        assert_eq!(engine.text(), "unsaved");
    }

    #[test]
    fn close_persists_cleared_document() {
        let start = Instant::now();
        let (mut engine, channel) = engine_with(&encode("to be deleted"));
        engine.apply_mutation(String::new(), start);

        assert_eq!(engine.close(), FlushOutcome::Written);
        assert_eq!(channel.read(), "");
        assert!(engine.is_disposed());
    }
}
