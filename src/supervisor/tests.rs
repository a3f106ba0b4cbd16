use super::*;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory log sink installed as the thread-local default subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn count(&self, needle: &str) -> usize {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .matches(needle)
            .count()
    }
}

fn log_dispatch() -> (CapturedLogs, tracing::Dispatch) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (logs, tracing::Dispatch::new(subscriber))
}

fn capture_logs() -> (CapturedLogs, tracing::dispatcher::DefaultGuard) {
    let (logs, dispatch) = log_dispatch();
    (logs, tracing::dispatcher::set_default(&dispatch))
}

fn waits_for_stop(name: &str) -> ServiceSpec {
    ServiceSpec::from_fn(name, |stop| {
        stop.wait();
        Ok(())
    })
}

fn ignores_stop(name: &str, duration: Duration) -> ServiceSpec {
    ServiceSpec::from_fn(name, move |_stop| {
        thread::sleep(duration);
        Ok(())
    })
}

#[test]
fn start_spawns_one_thread_per_service() {
    let supervisor = ServiceSupervisor::new(
        [waits_for_stop("a"), waits_for_stop("b"), waits_for_stop("c")],
        Duration::from_secs(1),
    )
    .unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Idle);

    supervisor.start().unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Running);
    assert_eq!(supervisor.thread_count(), 3);
    assert!(!supervisor.stop_signal().is_set());
    thread::sleep(Duration::from_millis(50));
    assert_eq!(supervisor.alive_services(), vec!["a", "b", "c"]);

    let report = supervisor.stop();
    assert!(report.is_clean());
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
}

#[test]
fn dummy_service_starts_and_stops() {
    let supervisor =
        ServiceSupervisor::new([waits_for_stop("dummy")], Duration::from_millis(500)).unwrap();
    supervisor.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(supervisor.alive_services(), vec!["dummy"]);

    let started = Instant::now();
    let report = supervisor.stop();
    assert!(started.elapsed() < Duration::from_millis(600));
    assert!(report.is_clean());
    assert!(supervisor.alive_services().is_empty());
    assert!(supervisor.completion().is_set());
}

#[test]
fn self_terminating_service_ends_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let supervisor = ServiceSupervisor::new(
        [ServiceSpec::from_fn("dummy", move |stop| {
            counter.fetch_add(1, Ordering::SeqCst);
            stop.set();
            Ok(())
        })],
        Duration::from_millis(500),
    )
    .unwrap();

    let started = Instant::now();
    let report = supervisor.run().unwrap();
    assert!(started.elapsed() < Duration::from_millis(1100));
    assert!(report.is_clean());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
}

#[test]
fn stop_twice_logs_transition_once() {
    let (logs, _guard) = capture_logs();
    let supervisor =
        ServiceSupervisor::new([waits_for_stop("dummy")], Duration::from_millis(500)).unwrap();
    supervisor.start().unwrap();

    assert!(supervisor.stop().is_clean());
    assert!(supervisor.stop().is_clean());

    assert_eq!(logs.count("Stopping services..."), 1);
    assert_eq!(logs.count("Stop requested (already stopping)"), 1);
    assert!(supervisor.stop_signal().is_set());
}

#[test]
fn concurrent_stops_transition_once_and_agree() {
    let (logs, dispatch) = log_dispatch();
    let supervisor = Arc::new(
        ServiceSupervisor::new(
            [
                waits_for_stop("dummy"),
                ignores_stop("stubborn", Duration::from_millis(1500)),
            ],
            Duration::from_millis(200),
        )
        .unwrap(),
    );
    supervisor.start().unwrap();
    thread::sleep(Duration::from_millis(50));

    let barrier = Arc::new(std::sync::Barrier::new(2));
    let stoppers: Vec<_> = (0..2)
        .map(|_| {
            let supervisor = supervisor.clone();
            let barrier = barrier.clone();
            let dispatch = dispatch.clone();
            thread::spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    barrier.wait();
                    supervisor.stop()
                })
            })
        })
        .collect();
    let reports: Vec<StopReport> = stoppers
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(reports[0].still_alive, vec!["stubborn".to_string()]);
    assert_eq!(reports[0].still_alive, reports[1].still_alive);
    assert_eq!(logs.count("Stopping services..."), 1);
    assert_eq!(logs.count("Stop requested (already stopping)"), 1);
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    assert!(supervisor.completion().is_set());

    supervisor.join_remaining();
    assert!(supervisor.alive_services().is_empty());
}

#[test]
fn stop_without_threads_completes_immediately() {
    let supervisor = ServiceSupervisor::new([], Duration::from_secs(1)).unwrap();
    let report = supervisor.stop();
    assert!(report.is_clean());
    assert!(supervisor.completion().is_set());
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
}

#[test]
fn stop_respects_shutdown_timeout() {
    let supervisor = ServiceSupervisor::new(
        [ignores_stop("stubborn", Duration::from_millis(1500))],
        Duration::from_millis(200),
    )
    .unwrap();
    supervisor.start().unwrap();
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    let report = supervisor.stop();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(150), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1000), "returned after {elapsed:?}");
    assert_eq!(report.still_alive, vec!["stubborn"]);
    assert!(supervisor.completion().is_set());

    supervisor.join_remaining();
    assert!(supervisor.alive_services().is_empty());
}

#[test]
fn shared_budget_can_leave_later_threads_unjoined() {
    let supervisor = ServiceSupervisor::new(
        [
            ignores_stop("first", Duration::from_millis(800)),
            ignores_stop("second", Duration::from_millis(800)),
        ],
        Duration::from_millis(200),
    )
    .unwrap();
    supervisor.start().unwrap();

    let started = Instant::now();
    let report = supervisor.stop();
    assert!(started.elapsed() < Duration::from_millis(600));
    assert_eq!(report.still_alive, vec!["first", "second"]);

    supervisor.join_remaining();
}

#[test]
fn repeated_stop_joins_stragglers() {
    let supervisor = ServiceSupervisor::new(
        [ignores_stop("slow", Duration::from_millis(300))],
        Duration::from_millis(50),
    )
    .unwrap();
    supervisor.start().unwrap();

    assert_eq!(supervisor.stop().still_alive, vec!["slow"]);
    thread::sleep(Duration::from_millis(400));
    assert!(supervisor.stop().is_clean());
}

#[test]
fn failing_service_does_not_stop_siblings() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    let supervisor = ServiceSupervisor::new(
        [
            ServiceSpec::from_fn("crashy", |_stop| {
                Err(BguError::Service("boom".to_string()))
            }),
            ServiceSpec::from_fn("steady", move |stop| {
                while !stop.wait_timeout(Duration::from_millis(10)) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }),
        ],
        Duration::from_secs(1),
    )
    .unwrap();
    supervisor.start().unwrap();
    thread::sleep(Duration::from_millis(150));

    assert!(!supervisor.stop_signal().is_set());
    assert_eq!(supervisor.alive_services(), vec!["steady"]);
    let before = ticks.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    assert!(ticks.load(Ordering::SeqCst) > before);

    assert!(supervisor.stop().is_clean());
}

#[test]
fn panicking_service_is_contained() {
    let supervisor = ServiceSupervisor::new(
        [
            ServiceSpec::from_fn("panicky", |_stop| panic!("unit exploded")),
            waits_for_stop("steady"),
        ],
        Duration::from_secs(1),
    )
    .unwrap();
    supervisor.start().unwrap();
    thread::sleep(Duration::from_millis(100));

    assert_eq!(supervisor.alive_services(), vec!["steady"]);
    assert!(!supervisor.stop_signal().is_set());
    assert!(supervisor.stop().is_clean());
}

#[test]
fn start_after_stop_begins_a_fresh_cycle() {
    let supervisor =
        ServiceSupervisor::new([waits_for_stop("dummy")], Duration::from_millis(500)).unwrap();
    supervisor.start().unwrap();
    assert!(supervisor.stop().is_clean());
    assert!(supervisor.completion().is_set());

    supervisor.start().unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Running);
    assert!(!supervisor.stop_signal().is_set());
    assert!(!supervisor.completion().is_set());
    assert_eq!(supervisor.thread_count(), 1);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(supervisor.alive_services(), vec!["dummy"]);

    assert!(supervisor.stop().is_clean());
}

#[test]
fn restart_with_straggler_keeps_its_signal_raised() {
    let supervisor = ServiceSupervisor::new(
        [ignores_stop("slow", Duration::from_millis(300))],
        Duration::from_millis(20),
    )
    .unwrap();
    supervisor.start().unwrap();
    let first_cycle = supervisor.stop_signal();
    assert!(!supervisor.stop().is_clean());

    supervisor.start().unwrap();
    assert!(first_cycle.is_set());
    assert!(!supervisor.stop_signal().is_set());

    supervisor.stop_signal().set();
    thread::sleep(Duration::from_millis(350));
    assert!(supervisor.stop().is_clean());
}

#[test]
fn names_must_be_unique_and_non_empty() {
    let duplicate = ServiceSupervisor::new(
        [waits_for_stop("a"), waits_for_stop("a")],
        Duration::from_secs(1),
    );
    assert!(matches!(duplicate, Err(BguError::InvalidInput(_))));

    let empty = ServiceSupervisor::new([waits_for_stop(" ")], Duration::from_secs(1));
    assert!(matches!(empty, Err(BguError::InvalidInput(_))));
}

#[test]
fn thread_names_follow_service_names() {
    let (tx, rx) = std::sync::mpsc::channel();
    let tx = Mutex::new(tx);
    let supervisor = ServiceSupervisor::new(
        [ServiceSpec::from_fn("named", move |_stop| {
            let name = thread::current().name().map(str::to_string);
            let _ = tx.lock().unwrap().send(name);
            Ok(())
        })],
        Duration::from_secs(1),
    )
    .unwrap();
    supervisor.start().unwrap();

    let name = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(name.as_deref(), Some("svc-named"));
    supervisor.stop();
}
