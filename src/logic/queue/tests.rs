use super::*;
use crate::logic::classifier::{Classifier, ClassifierError, ClassificationDispatcher};
use crate::logic::pe::parser::tests::build_pe;
use crate::logic::pe::CapstoneDecoder;
use crate::logic::types::{Classification, FileHashes, ScanResult};
use crate::logic::uplink::client::tests::{test_identity, test_locator, ScriptedTransport};
use crate::logic::uplink::{AuxPush, CollectorClient};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{broadcast, Semaphore};

struct OfflineModel;

#[async_trait]
impl Classifier for OfflineModel {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn classify(&self, _path: &Path, _hashes: Option<&FileHashes>) -> Result<ScanResult, ClassifierError> {
        Err(ClassifierError::Unavailable("python: not found".to_string()))
    }
}

struct Harness {
    events: EventBus,
    transport: Arc<ScriptedTransport>,
    agent: ScanAgent,
    handle: AgentHandle,
}

/// Model that reports each entry and then waits for a permit
struct GatedModel {
    entered: mpsc::UnboundedSender<String>,
    gate: Arc<Semaphore>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

#[async_trait]
impl Classifier for GatedModel {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn classify(&self, path: &Path, _hashes: Option<&FileHashes>) -> Result<ScanResult, ClassifierError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _ = self.entered.send(crate::logic::types::file_name_of(path));

        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        Err(ClassifierError::Unavailable("gated".to_string()))
    }
}

/// Counts records whose message contains a marker
struct MarkerCounter {
    marker: &'static str,
    hits: AtomicUsize,
}

impl log::Log for MarkerCounter {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if record.args().to_string().contains(self.marker) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn flush(&self) {}
}

static HANDLES_DROPPED: Lazy<MarkerCounter> = Lazy::new(|| MarkerCounter {
    marker: "All agent handles dropped",
    hits: AtomicUsize::new(0),
});

fn harness() -> Harness {
    harness_with(Box::new(OfflineModel), Duration::ZERO)
}

fn harness_with(classifier: Box<dyn Classifier>, scan_delay: Duration) -> Harness {
    let events = EventBus::default();
    let transport = ScriptedTransport::new(vec![Ok(200)]);
    let collector = Arc::new(CollectorClient::new(transport.clone(), test_locator(), test_identity()));

    let pipeline = ScanPipeline::new(
        events.clone(),
        ClassificationDispatcher::new(classifier),
        Arc::new(CapstoneDecoder),
        collector,
        AuxPush::new(reqwest::Client::new(), "http://127.0.0.1:1/scan", false),
        scan_delay,
    );

    let (agent, handle) = ScanAgent::new(Arc::new(pipeline), events.clone());
    Harness {
        events,
        transport,
        agent,
        handle,
    }
}

async fn next_result(rx: &mut broadcast::Receiver<AgentEvent>) -> ScanResult {
    loop {
        match tokio::time::timeout(Duration::from_secs(10), rx.recv()).await {
            Ok(Ok(AgentEvent::ScanResult(result))) => return result,
            Ok(Ok(_)) => continue,
            other => panic!("no scan result: {:?}", other.map(|r| r.map(|e| e.channel()))),
        }
    }
}

#[tokio::test]
async fn test_results_are_emitted_in_fifo_order() {
    let dir = tempfile::tempdir().unwrap();
    let names = ["first.txt", "second.txt", "third.txt"];
    for name in names {
        std::fs::write(dir.path().join(name), name.as_bytes()).unwrap();
    }

    let h = harness();
    let mut rx = h.events.subscribe();
    let agent = tokio::spawn(h.agent.run());

    for name in names {
        h.handle.scan_path(dir.path().join(name)).await.unwrap();
    }

    let mut started = Vec::new();
    let mut finished = Vec::new();
    while finished.len() < names.len() {
        match tokio::time::timeout(Duration::from_secs(10), rx.recv()).await.unwrap().unwrap() {
            AgentEvent::ScanStarted { filename, manual, .. } => {
                assert!(manual);
                started.push(filename);
            }
            AgentEvent::ScanResult(result) => finished.push(result.detected_filename),
            _ => {}
        }
    }

    assert_eq!(started, names);
    assert_eq!(finished, names);

    h.handle.shutdown().await.unwrap();
    agent.await.unwrap();
    assert_eq!(h.transport.calls.lock().len(), 3);
}

#[tokio::test]
async fn test_non_pe_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, b"abc").unwrap();

    let h = harness();
    let mut rx = h.events.subscribe();
    let agent = tokio::spawn(h.agent.run());

    h.handle.sender().send(AgentCommand::FileDetected(file)).await.unwrap();
    let result = next_result(&mut rx).await;

    assert_eq!(result.classification, Classification::Benign);
    assert!(!result.is_pe);
    assert!(result.disassembly.is_none());
    assert_eq!(result.file_hashes.md5, "900150983cd24fb0d6963f7d28e17f72");

    h.handle.shutdown().await.unwrap();
    agent.await.unwrap();

    let calls = h.transport.calls.lock();
    let body = &calls[0].body;
    assert_eq!(body["detected_filename"], "notes.txt");
    assert_eq!(body["is_pe"], false);
    assert_eq!(body["agent_id"], "agent-1");
}

#[tokio::test]
async fn test_pe_file_with_offline_model_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("setup.exe");
    let mut image = build_pe(true, 0x1000, &[(".text", 0x200, 0x1000, 0x200, 0x400)], 0x600);
    image[0x400..0x405].copy_from_slice(&[0x55, 0x48, 0x89, 0xE5, 0xC3]);
    std::fs::write(&file, &image).unwrap();

    let h = harness();
    let mut rx = h.events.subscribe();
    let agent = tokio::spawn(h.agent.run());

    h.handle.scan_path(&file).await.unwrap();

    let mut saw_disassembly = false;
    let result = loop {
        match tokio::time::timeout(Duration::from_secs(10), rx.recv()).await.unwrap().unwrap() {
            AgentEvent::Disassembly { filename, instructions, meta } => {
                assert_eq!(filename, "setup.exe");
                assert_eq!(instructions.len(), 3);
                assert_eq!(meta.is64, Some(true));
                saw_disassembly = true;
            }
            AgentEvent::ScanResult(result) => break result,
            _ => {}
        }
    };

    assert!(saw_disassembly);
    assert!(result.is_pe);
    assert!(result.fallback);
    assert!(result.error.as_deref().unwrap_or_default().contains("python: not found"));
    assert!(result.confidence_score.is_some());

    let lines = result.disassembly.unwrap();
    assert_eq!(lines[0].address, "0x1000");
    assert_eq!(lines[0].mnemonic, "push");
    assert_eq!(lines.last().unwrap().mnemonic, "ret");

    let meta = result.disassembly_meta.unwrap();
    assert_eq!(meta.arch, "x86_64");
    assert_eq!(meta.entry_rva, 0x1000);
    assert_eq!(meta.is64, None);

    h.handle.shutdown().await.unwrap();
    agent.await.unwrap();
}

#[tokio::test]
async fn test_vanished_file_produces_no_result() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness();
    let mut rx = h.events.subscribe();
    let agent = tokio::spawn(h.agent.run());

    h.handle.scan_path(dir.path().join("gone.exe")).await.unwrap();
    h.handle.shutdown().await.unwrap();
    agent.await.unwrap();

    let mut channels = Vec::new();
    while let Ok(event) = rx.try_recv() {
        channels.push(event.channel());
    }
    assert_eq!(channels, vec!["scan-started", "shutdown-complete"]);
    assert!(h.transport.calls.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_times_out_with_work_pending() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.txt");
    std::fs::write(&file, b"a").unwrap();

    let mut h = harness();
    h.agent.set_shutdown_wait(Duration::from_secs(15));

    // Queue work but request shutdown first so nothing is dequeued.
    h.agent.request_shutdown(None);
    h.agent.enqueue(ScanTask::new(&file, true));

    let start = Instant::now();
    h.agent.run().await;

    assert!(Instant::now() - start >= Duration::from_secs(15));
    assert!(h.transport.calls.lock().is_empty());
}

#[tokio::test]
async fn test_shutdown_when_idle_is_immediate() {
    let h = harness();
    let mut rx = h.events.subscribe();
    let agent = tokio::spawn(h.agent.run());

    tokio::time::timeout(Duration::from_secs(1), h.handle.shutdown()).await.unwrap().unwrap();
    agent.await.unwrap();

    assert!(matches!(rx.recv().await.unwrap(), AgentEvent::ShutdownComplete));
    assert!(h.handle.scan_path("/tmp/x").await.is_err());
}

#[tokio::test]
async fn test_only_one_task_processes_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let image = build_pe(true, 0x1000, &[(".text", 0x200, 0x1000, 0x200, 0x400)], 0x600);
    for name in ["one.exe", "two.exe"] {
        std::fs::write(dir.path().join(name), &image).unwrap();
    }

    let (entered_tx, mut entered) = mpsc::unbounded_channel();
    let gate = Arc::new(Semaphore::new(0));
    let model = Arc::new(GatedModel {
        entered: entered_tx,
        gate: gate.clone(),
        active: AtomicUsize::new(0),
        max_active: AtomicUsize::new(0),
    });

    struct Shared(Arc<GatedModel>);

    #[async_trait]
    impl Classifier for Shared {
        fn name(&self) -> &'static str {
            self.0.name()
        }

        async fn classify(&self, path: &Path, hashes: Option<&FileHashes>) -> Result<ScanResult, ClassifierError> {
            self.0.classify(path, hashes).await
        }
    }

    let h = harness_with(Box::new(Shared(model.clone())), Duration::ZERO);
    let mut rx = h.events.subscribe();
    let agent = tokio::spawn(h.agent.run());

    h.handle.scan_path(dir.path().join("one.exe")).await.unwrap();
    h.handle.scan_path(dir.path().join("two.exe")).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(10), entered.recv()).await.unwrap().unwrap();
    assert_eq!(first, "one.exe");

    // The second task must not start while the first is blocked.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(entered.try_recv().is_err());
    while let Ok(event) = rx.try_recv() {
        assert!(!matches!(event, AgentEvent::ScanResult(_)));
    }

    gate.add_permits(1);
    assert_eq!(next_result(&mut rx).await.detected_filename, "one.exe");

    let second = tokio::time::timeout(Duration::from_secs(10), entered.recv()).await.unwrap().unwrap();
    assert_eq!(second, "two.exe");
    gate.add_permits(1);
    assert_eq!(next_result(&mut rx).await.detected_filename, "two.exe");

    assert_eq!(model.max_active.load(Ordering::SeqCst), 1);

    h.handle.shutdown().await.unwrap();
    agent.await.unwrap();
}

#[tokio::test]
async fn test_dropped_handles_request_shutdown_once() {
    if log::set_logger(&*HANDLES_DROPPED).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("slow.txt");
    std::fs::write(&file, b"slow").unwrap();

    let h = harness_with(Box::new(OfflineModel), Duration::from_millis(300));
    let mut agent = h.agent;
    agent.enqueue(ScanTask::new(&file, true));
    drop(h.handle);

    tokio::time::timeout(Duration::from_secs(10), agent.run()).await.unwrap();

    assert_eq!(HANDLES_DROPPED.hits.load(Ordering::SeqCst), 1);
    assert_eq!(h.transport.calls.lock().len(), 1);
}

#[tokio::test]
async fn test_flush_starts_queued_work_when_idle() {
    let mut h = harness();
    h.agent.enqueue(ScanTask::new("/tmp/queued.txt", true));
    assert!(!h.agent.is_processing());

    h.agent.handle_command(AgentCommand::FlushQueue);
    assert!(h.agent.is_processing());
    assert!(h.agent.queue.is_empty());
}

#[tokio::test]
async fn test_flush_is_ignored_during_shutdown() {
    let mut h = harness();
    h.agent.request_shutdown(None);
    h.agent.enqueue(ScanTask::new("/tmp/queued.txt", true));

    h.agent.handle_command(AgentCommand::FlushQueue);
    assert!(!h.agent.is_processing());
    assert_eq!(h.agent.queue.len(), 1);
}
