//! Polling loop that turns new chat log content into handler calls.

use crate::chatlog::{parse_message, ChatMessage};
use crate::directory::ChatDirectory;
use crate::error::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Poll interval used when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Receives every message parsed from a monitored channel.
///
/// Called only from the monitor's poll task, in file order per channel and in
/// configured channel order per cycle.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, channel: &str, message: &ChatMessage);
}

impl<F> MessageHandler for F
where
    F: Fn(&str, &ChatMessage) + Send + Sync + 'static,
{
    fn handle(&self, channel: &str, message: &ChatMessage) {
        self(channel, message)
    }
}

/// Running poll task and the means to stop it.
struct Worker {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Watches a fixed list of channels and dispatches their new messages.
pub struct Monitor {
    channels: Arc<[String]>,
    directory: Arc<ChatDirectory>,
    handler: Arc<dyn MessageHandler>,
    poll_interval: Duration,
    worker: Option<Worker>,
}

impl Monitor {
    /// Open the chat directory at `path` and start following its rotations.
    /// Polling begins with [`Monitor::start`].
    pub fn new(
        channels: Vec<String>,
        path: impl AsRef<Path>,
        handler: impl MessageHandler,
        poll_interval: Duration,
    ) -> Result<Self> {
        let directory = Arc::new(ChatDirectory::open(path)?);
        directory.watch()?;
        Ok(Self::with_directory(
            channels,
            directory,
            handler,
            poll_interval,
        ))
    }

    /// Build a monitor over an already opened directory.
    pub fn with_directory(
        channels: Vec<String>,
        directory: Arc<ChatDirectory>,
        handler: impl MessageHandler,
        poll_interval: Duration,
    ) -> Self {
        Self {
            channels: channels.into(),
            directory,
            handler: Arc::new(handler),
            poll_interval,
            worker: None,
        }
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn directory(&self) -> &Arc<ChatDirectory> {
        &self.directory
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Spawn the poll task on the current tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::InvalidState("monitor already started"));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = runtime.spawn(poll(
            self.channels.clone(),
            self.directory.clone(),
            self.handler.clone(),
            self.poll_interval,
            shutdown_rx,
        ));

        info!(
            channels = ?self.channels,
            path = %self.directory.path().display(),
            "monitor started"
        );
        self.worker = Some(Worker { shutdown, task });
        Ok(())
    }

    /// Stop polling. Once this returns the handler is not called again.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Err(Error::InvalidState("monitor not started"));
        };

        // The task may already be gone if the handler panicked.
        let _ = worker.shutdown.send(true);
        if let Err(e) = worker.task.await {
            warn!(error = %e, "monitor poll task ended abnormally");
        }

        info!("monitor stopped");
        Ok(())
    }
}

async fn poll(
    channels: Arc<[String]>,
    directory: Arc<ChatDirectory>,
    handler: Arc<dyn MessageHandler>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if !poll_cycle(&channels, &directory, handler.as_ref(), || {
            is_shutdown(&shutdown)
        }) {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        if is_shutdown(&shutdown) {
            break;
        }
    }
    debug!("monitor poll task exiting");
}

fn is_shutdown(shutdown: &watch::Receiver<bool>) -> bool {
    // A dropped sender means the monitor itself is gone.
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// One pass over `channels`. Returns `false` if a stop was requested
/// before the pass completed.
fn poll_cycle(
    channels: &[String],
    directory: &ChatDirectory,
    handler: &dyn MessageHandler,
    stopping: impl Fn() -> bool,
) -> bool {
    for channel in channels {
        if stopping() {
            return false;
        }

        let Some(raw_messages) = directory.read_messages(channel) else {
            continue;
        };

        for raw in raw_messages {
            match parse_message(&raw) {
                Some(message) => handler.handle(channel, &message),
                None => debug!(channel = %channel, raw = %raw, "dropping unparseable message"),
            }
        }
    }
    !stopping()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatlog::MESSAGE_DELIMITER;
    use parking_lot::Mutex;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::time::Instant;

    const ALLIANCE_LOG: &str = "Alliance_20150404_234536.txt";
    const CORP_LOG: &str = "Corp_20150130_065423.txt";

    type Received = Arc<Mutex<Vec<(String, ChatMessage)>>>;

    fn encode(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
    }

    fn write_message(path: &Path, text: &str) {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(&encode(&format!("{}{}\r\n", MESSAGE_DELIMITER, text)))
            .unwrap();
    }

    fn chat_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in [ALLIANCE_LOG, CORP_LOG] {
            let bom = encode(&MESSAGE_DELIMITER.to_string());
            std::fs::write(dir.path().join(name), bom).unwrap();
        }
        dir
    }

    fn recording_handler() -> (Received, impl MessageHandler) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let handler = move |channel: &str, message: &ChatMessage| {
            sink.lock().push((channel.to_string(), message.clone()));
        };
        (received, handler)
    }

    fn channels() -> Vec<String> {
        vec!["Alliance".to_string(), "Corp".to_string()]
    }

    async fn wait_for(received: &Received, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while received.lock().len() < count {
            assert!(Instant::now() < deadline, "timed out waiting for messages");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_new_invalid_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (_, handler) = recording_handler();
        let result = Monitor::new(
            channels(),
            dir.path().join("I").join("wont").join("exist"),
            handler,
            Duration::ZERO,
        );
        assert!(matches!(result, Err(Error::InvalidChatDirectory { .. })));
    }

    #[test]
    fn test_new_initial_state() {
        let dir = chat_dir();
        let (_, handler) = recording_handler();
        let monitor = Monitor::new(channels(), dir.path(), handler, Duration::from_millis(3)).unwrap();

        assert_eq!(monitor.channels(), &["Alliance".to_string(), "Corp".to_string()]);
        assert_eq!(monitor.poll_interval(), Duration::from_millis(3));
        assert_eq!(monitor.directory().channels(), vec!["Alliance", "Corp"]);
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_start_outside_runtime() {
        let dir = chat_dir();
        let (_, handler) = recording_handler();
        let mut monitor = Monitor::new(channels(), dir.path(), handler, Duration::ZERO).unwrap();
        assert!(matches!(monitor.start(), Err(Error::NoRuntime)));
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let dir = chat_dir();
        let (_, handler) = recording_handler();
        let mut monitor =
            Monitor::new(channels(), dir.path(), handler, Duration::from_millis(10)).unwrap();

        monitor.start().unwrap();
        assert!(monitor.is_running());
        assert!(matches!(monitor.start(), Err(Error::InvalidState(_))));
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_not_started_fails() {
        let dir = chat_dir();
        let (_, handler) = recording_handler();
        let mut monitor = Monitor::new(channels(), dir.path(), handler, Duration::ZERO).unwrap();

        assert!(matches!(monitor.stop().await, Err(Error::InvalidState(_))));

        monitor.start().unwrap();
        monitor.stop().await.unwrap();
        assert!(!monitor.is_running());
        assert!(matches!(monitor.stop().await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_dispatches_in_channel_then_file_order() {
        let dir = chat_dir();
        let (received, handler) = recording_handler();
        let mut monitor =
            Monitor::new(channels(), dir.path(), handler, Duration::from_millis(10)).unwrap();

        write_message(&dir.path().join(CORP_LOG), "[ 2015.01.30 06:55:00 ] Director > corp 1");
        write_message(&dir.path().join(ALLIANCE_LOG), "[ 2015.04.04 23:46:00 ] FC > ally 1");
        write_message(&dir.path().join(ALLIANCE_LOG), "[ 2015.04.04 23:46:01 ] FC > ally 2\nline two");
        write_message(&dir.path().join(CORP_LOG), "[ 2015.01.30 06:55:01 ] Director > corp 2");

        monitor.start().unwrap();
        wait_for(&received, 4).await;
        monitor.stop().await.unwrap();

        let received = received.lock();
        let summary: Vec<(&str, &str)> = received
            .iter()
            .map(|(channel, msg)| (channel.as_str(), msg.body.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Alliance", "ally 1"),
                ("Alliance", "ally 2\nline two"),
                ("Corp", "corp 1"),
                ("Corp", "corp 2"),
            ]
        );
        assert_eq!(received[0].1.author, "FC");
    }

    #[tokio::test]
    async fn test_unparseable_messages_are_dropped() {
        let dir = chat_dir();
        let (received, handler) = recording_handler();
        let mut monitor =
            Monitor::new(channels(), dir.path(), handler, Duration::from_millis(10)).unwrap();

        let alliance = dir.path().join(ALLIANCE_LOG);
        write_message(&alliance, "not a chat line");
        write_message(&alliance, "[ 2015.99.04 23:46:00 ] FC > bad timestamp");
        write_message(&alliance, "[ 2015.04.04 23:46:00 ] FC > good");

        monitor.start().unwrap();
        wait_for(&received, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.stop().await.unwrap();

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].1.body, "good");
    }

    #[tokio::test]
    async fn test_no_dispatch_after_stop() {
        let dir = chat_dir();
        let (received, handler) = recording_handler();
        let mut monitor =
            Monitor::new(channels(), dir.path(), handler, Duration::from_millis(5)).unwrap();
        let alliance = dir.path().join(ALLIANCE_LOG);

        monitor.start().unwrap();
        write_message(&alliance, "[ 2015.04.04 23:46:00 ] FC > before stop");
        wait_for(&received, 1).await;
        monitor.stop().await.unwrap();

        write_message(&alliance, "[ 2015.04.04 23:47:00 ] FC > after stop");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(received.lock().len(), 1);

        // Restarting picks up what was written while stopped.
        monitor.start().unwrap();
        wait_for(&received, 2).await;
        monitor.stop().await.unwrap();
        assert_eq!(received.lock()[1].1.body, "after stop");
    }

    #[tokio::test]
    async fn test_follows_rotation() {
        let dir = chat_dir();
        let (received, handler) = recording_handler();
        let mut monitor =
            Monitor::new(channels(), dir.path(), handler, Duration::from_millis(5)).unwrap();
        monitor.start().unwrap();

        let rotated = dir.path().join("Alliance_20150404_235000.txt");
        std::fs::write(&rotated, encode(&MESSAGE_DELIMITER.to_string())).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while monitor
            .directory()
            .active_path("Alliance")
            .as_deref()
            .and_then(Path::file_name)
            != rotated.file_name()
        {
            assert!(Instant::now() < deadline, "rotation was not observed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        write_message(&dir.path().join(ALLIANCE_LOG), "[ 2015.04.04 23:50:00 ] FC > stale");
        write_message(&rotated, "[ 2015.04.04 23:50:01 ] FC > fresh");
        wait_for(&received, 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        monitor.stop().await.unwrap();

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].1.body, "fresh");
    }

    #[test]
    fn test_poll_cycle_skips_unknown_channels() {
        let dir = chat_dir();
        let directory = ChatDirectory::open(dir.path()).unwrap();
        let (received, handler) = recording_handler();

        write_message(&dir.path().join(CORP_LOG), "[ 2015.01.30 06:55:00 ] Director > hi");
        let channels = ["Missing".to_string(), "Corp".to_string()];
        assert!(poll_cycle(&channels, &directory, &handler, || false));

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "Corp");
    }

    #[test]
    fn test_poll_cycle_stops_between_channels() {
        let dir = chat_dir();
        let directory = ChatDirectory::open(dir.path()).unwrap();
        let (received, handler) = recording_handler();

        write_message(&dir.path().join(ALLIANCE_LOG), "[ 2015.04.04 23:46:00 ] FC > one");
        write_message(&dir.path().join(CORP_LOG), "[ 2015.01.30 06:55:00 ] Director > two");

        let checks = std::cell::Cell::new(0);
        let stopping = || {
            checks.set(checks.get() + 1);
            checks.get() > 1
        };
        assert!(!poll_cycle(&channels(), &directory, &handler, stopping));

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "Alliance");
    }
}
