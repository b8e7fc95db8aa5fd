//! End-to-end tests for the flow runner.
//!
//! Every test drives a real `FlowRunner` with a `RecordingDriver`, so no
//! input device is touched.  Nodes that must stay in flight are held open
//! with a `GateNode` until the test releases them.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use nodes::mock::{MockNode, RecordingDriver};
use nodes::{Dispatcher, ExecutableNode, ExecutionContext, NodeError};

use crate::{ChannelEventSink, Edge, EngineConfig, EngineError, Event, FlowRunner, Flowchart, Node};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Blocks until the paired sender sends or is dropped.
struct GateNode {
    open: Mutex<std_mpsc::Receiver<()>>,
}

impl ExecutableNode for GateNode {
    fn execute(&self, _config: &Value, _ctx: &ExecutionContext<'_>) -> Result<(), NodeError> {
        let _ = self.open.lock().unwrap().recv();
        Ok(())
    }
}

fn gate() -> (GateNode, std_mpsc::Sender<()>) {
    let (tx, rx) = std_mpsc::channel();
    (GateNode { open: Mutex::new(rx) }, tx)
}

fn document(nodes: &[(&str, &str)], edges: &[(&str, &str)]) -> Vec<u8> {
    Flowchart::new(
        nodes
            .iter()
            .map(|(id, node_type)| Node::new(*id, *node_type, Value::Null))
            .collect(),
        edges.iter().map(|(from, to)| Edge::new(*from, *to)).collect(),
    )
    .to_json()
    .unwrap()
}

fn dispatcher() -> Dispatcher {
    Dispatcher::with_builtins(Arc::new(RecordingDriver::new()))
}

fn runner(dispatcher: Dispatcher, config: EngineConfig) -> (FlowRunner, UnboundedReceiver<Event>) {
    let (sink, events) = ChannelEventSink::new();
    (FlowRunner::new(dispatcher, Arc::new(sink), config), events)
}

fn short_timeout(millis: u64) -> EngineConfig {
    EngineConfig {
        run_timeout: Duration::from_millis(millis),
        ..EngineConfig::default()
    }
}

async fn next_event(events: &mut UnboundedReceiver<Event>) -> Event {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event sink closed")
}

/// Collect events up to and including `wanted`.
async fn wait_for(events: &mut UnboundedReceiver<Event>, wanted: &Event) -> Vec<Event> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let done = &event == wanted;
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Collect events up to and including the first terminal one.
async fn until_terminal(events: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let done = event.is_terminal();
        seen.push(event);
        if done {
            return seen;
        }
    }
}

fn position(events: &[Event], wanted: &Event) -> usize {
    events
        .iter()
        .position(|e| e == wanted)
        .unwrap_or_else(|| panic!("{wanted:?} not in {events:?}"))
}

fn started(id: &str) -> Event {
    Event::TaskStarted { task_id: id.into() }
}

fn completed(id: &str) -> Event {
    Event::TaskCompleted { task_id: id.into() }
}

// ============================================================
// Successful runs
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fan_out_runs_each_node_after_its_predecessor() {
    // s → a → {b, c}
    let step = MockNode::succeeding();
    let mut dispatcher = dispatcher();
    dispatcher.register("Step", step.clone());
    let (runner, mut events) = runner(dispatcher, EngineConfig::default());

    let doc = document(
        &[("s", "Start"), ("a", "Step"), ("b", "Step"), ("c", "Step")],
        &[("s", "a"), ("a", "b"), ("a", "c")],
    );
    runner.start_execution(&doc).await.unwrap();

    let seen = until_terminal(&mut events).await;
    assert_eq!(seen.last(), Some(&Event::ExecutionCompleted));
    assert!(!runner.is_executing().await);

    let mut calls = step.calls();
    calls.sort();
    assert_eq!(calls, ["a", "b", "c"]);

    assert!(position(&seen, &completed("s")) < position(&seen, &started("a")));
    assert!(position(&seen, &completed("a")) < position(&seen, &started("b")));
    assert!(position(&seen, &completed("a")) < position(&seen, &started("c")));

    let successes = seen
        .iter()
        .filter(|e| matches!(e, Event::TaskSuccess { .. }))
        .count();
    assert_eq!(successes, 4);
    assert!(seen.contains(&Event::TaskSuccess {
        task_id: "s".into(),
        node_type: "Start".into(),
    }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn join_node_waits_for_every_predecessor() {
    //   s
    //  / \
    // a   b
    //  \ /
    //   d
    let step = MockNode::succeeding();
    let mut dispatcher = dispatcher();
    dispatcher.register("Step", step.clone());
    let (runner, mut events) = runner(dispatcher, EngineConfig::default());

    let doc = document(
        &[("s", "Start"), ("a", "Step"), ("b", "Step"), ("d", "Step")],
        &[("s", "a"), ("s", "b"), ("a", "d"), ("b", "d")],
    );
    runner.start_execution(&doc).await.unwrap();

    let seen = until_terminal(&mut events).await;
    assert_eq!(seen.last(), Some(&Event::ExecutionCompleted));
    assert_eq!(step.calls().iter().filter(|id| *id == "d").count(), 1);

    let d_started = position(&seen, &started("d"));
    assert!(position(&seen, &completed("a")) < d_started);
    assert!(position(&seen, &completed("b")) < d_started);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_edges_do_not_schedule_twice() {
    let step = MockNode::succeeding();
    let mut dispatcher = dispatcher();
    dispatcher.register("Step", step.clone());
    let (runner, mut events) = runner(dispatcher, EngineConfig::default());

    let doc = document(&[("s", "Start"), ("a", "Step")], &[("s", "a"), ("s", "a")]);
    runner.start_execution(&doc).await.unwrap();

    assert_eq!(until_terminal(&mut events).await.last(), Some(&Event::ExecutionCompleted));
    assert_eq!(step.call_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runner_can_be_reused_after_completion() {
    let step = MockNode::succeeding();
    let mut dispatcher = dispatcher();
    dispatcher.register("Step", step.clone());
    let (runner, mut events) = runner(dispatcher, EngineConfig::default());
    let doc = document(&[("s", "Start"), ("a", "Step")], &[("s", "a")]);

    for _ in 0..2 {
        runner.start_execution(&doc).await.unwrap();
        assert_eq!(until_terminal(&mut events).await.last(), Some(&Event::ExecutionCompleted));
    }
    assert!(!runner.is_executing().await);
    assert_eq!(step.call_count(), 2);
}

// ============================================================
// Pre-flight failures
// ============================================================

#[tokio::test]
async fn structural_errors_are_returned_and_start_nothing() {
    let (runner, mut events) = runner(dispatcher(), EngineConfig::default());

    let empty = document(&[], &[]);
    assert!(matches!(runner.start_execution(&empty).await, Err(EngineError::EmptyGraph)));

    let no_start = document(&[("a", "Step"), ("b", "Step")], &[("a", "b")]);
    assert!(matches!(
        runner.start_execution(&no_start).await,
        Err(EngineError::MissingStartNode)
    ));

    // The Start node has no edges, so pruning drops it.
    let orphan_start = document(&[("s", "Start"), ("a", "Step"), ("b", "Step")], &[("a", "b")]);
    assert!(matches!(
        runner.start_execution(&orphan_start).await,
        Err(EngineError::NoStartNode)
    ));

    let lone_start = document(&[("s", "Start")], &[]);
    assert!(matches!(
        runner.start_execution(&lone_start).await,
        Err(EngineError::NoStartNode)
    ));

    let cyclic = document(
        &[("s", "Start"), ("a", "Step"), ("b", "Step")],
        &[("s", "a"), ("a", "b"), ("b", "a")],
    );
    assert!(matches!(
        runner.start_execution(&cyclic).await,
        Err(EngineError::CycleDetected)
    ));

    let duplicate = document(&[("s", "Start"), ("s", "Step")], &[]);
    assert!(matches!(
        runner.start_execution(&duplicate).await,
        Err(EngineError::DuplicateNodeId(_))
    ));

    let two_starts = document(
        &[("s", "Start"), ("t", "Start"), ("a", "Step")],
        &[("s", "a"), ("t", "a")],
    );
    assert!(matches!(
        runner.start_execution(&two_starts).await,
        Err(EngineError::MultipleStartNodes(2))
    ));

    assert!(matches!(
        runner.start_execution(b"{ not json").await,
        Err(EngineError::InvalidDocument(_))
    ));

    assert!(!runner.is_executing().await);
    assert!(events.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_start_while_running_is_rejected() {
    let (gate_node, release) = gate();
    let mut dispatcher = dispatcher();
    dispatcher.register("Gate", gate_node);
    let (runner, mut events) = runner(dispatcher, EngineConfig::default());

    let doc = document(&[("s", "Start"), ("g", "Gate")], &[("s", "g")]);
    runner.start_execution(&doc).await.unwrap();
    wait_for(&mut events, &started("g")).await;

    assert!(matches!(
        runner.start_execution(&doc).await,
        Err(EngineError::AlreadyRunning)
    ));
    assert!(runner.is_executing().await);

    release.send(()).unwrap();
    assert_eq!(until_terminal(&mut events).await.last(), Some(&Event::ExecutionCompleted));
}

// ============================================================
// Per-task failures
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_task_stalls_only_its_own_branch() {
    // s → bad → never
    // s → ok
    let step = MockNode::succeeding();
    let mut dispatcher = dispatcher();
    dispatcher.register("Step", step.clone());
    dispatcher.register("Bad", MockNode::failing_config("text"));
    let config = EngineConfig {
        workers: 1,
        ..short_timeout(1_000)
    };
    let (runner, mut events) = runner(dispatcher, config);

    let doc = document(
        &[("s", "Start"), ("bad", "Bad"), ("never", "Step"), ("ok", "Step")],
        &[("s", "bad"), ("bad", "never"), ("s", "ok")],
    );
    runner.start_execution(&doc).await.unwrap();

    let seen = until_terminal(&mut events).await;
    assert_eq!(seen.last(), Some(&Event::ExecutionTimedOut));
    assert!(seen
        .iter()
        .any(|e| matches!(e, Event::TaskError { task_id, error } if task_id == "bad" && error.contains("text"))));
    assert!(seen.contains(&completed("bad")));
    assert!(seen.contains(&completed("ok")));
    assert_eq!(step.calls(), ["ok"]);
    assert!(!runner.is_executing().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_task_is_reported_and_worker_survives() {
    let step = MockNode::succeeding();
    let mut dispatcher = dispatcher();
    dispatcher.register("Boom", MockNode::panicking("kaboom"));
    dispatcher.register("Step", step.clone());
    let config = EngineConfig {
        workers: 1,
        ..short_timeout(1_000)
    };
    let (runner, mut events) = runner(dispatcher, config);

    let doc = document(
        &[("s", "Start"), ("boom", "Boom"), ("after", "Step")],
        &[("s", "boom"), ("s", "after")],
    );
    runner.start_execution(&doc).await.unwrap();

    let seen = until_terminal(&mut events).await;
    assert!(seen
        .iter()
        .any(|e| matches!(e, Event::TaskError { task_id, error } if task_id == "boom" && error.contains("kaboom"))));
    assert_eq!(step.calls(), ["after"]);
    assert_eq!(seen.last(), Some(&Event::ExecutionTimedOut));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_task_type_is_a_task_error() {
    let (runner, mut events) = runner(dispatcher(), short_timeout(500));

    let doc = document(&[("s", "Start"), ("x", "Teleport")], &[("s", "x")]);
    runner.start_execution(&doc).await.unwrap();

    let seen = until_terminal(&mut events).await;
    assert!(seen
        .iter()
        .any(|e| matches!(e, Event::TaskError { task_id, error } if task_id == "x" && error.contains("Teleport"))));
    assert_eq!(seen.last(), Some(&Event::ExecutionTimedOut));
}

// ============================================================
// Timeout and stop
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hung_task_times_out_and_clears_the_flag() {
    let (gate_node, release) = gate();
    let mut dispatcher = dispatcher();
    dispatcher.register("Gate", gate_node);
    dispatcher.register("Step", MockNode::succeeding());
    let (runner, mut events) = runner(dispatcher, short_timeout(200));

    let doc = document(&[("s", "Start"), ("g", "Gate")], &[("s", "g")]);
    runner.start_execution(&doc).await.unwrap();

    let seen = until_terminal(&mut events).await;
    assert_eq!(seen.last(), Some(&Event::ExecutionTimedOut));
    assert!(!runner.is_executing().await);

    // The stale task finishing must not affect the next run.
    release.send(()).unwrap();
    let next = document(&[("s", "Start"), ("a", "Step")], &[("s", "a")]);
    runner.start_execution(&next).await.unwrap();
    assert_eq!(until_terminal(&mut events).await.last(), Some(&Event::ExecutionCompleted));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_task_channel_does_not_hide_the_deadline() {
    // One hung worker and a two-slot channel: the fan-out to five gates
    // leaves the coordinator blocked on enqueue.
    let (gate_node, release) = gate();
    let mut dispatcher = dispatcher();
    dispatcher.register("Gate", gate_node);
    let config = EngineConfig {
        workers: 1,
        queue_capacity: 2,
        ..short_timeout(200)
    };
    let (runner, mut events) = runner(dispatcher, config);

    let gates = ["g1", "g2", "g3", "g4", "g5"];
    let mut nodes = vec![("s", "Start")];
    nodes.extend(gates.iter().map(|id| (*id, "Gate")));
    let edges: Vec<_> = gates.iter().map(|id| ("s", *id)).collect();
    runner.start_execution(&document(&nodes, &edges)).await.unwrap();

    let terminal = timeout(Duration::from_secs(3), until_terminal(&mut events)).await;
    let seen = terminal.expect("no terminal event within 3s of a 200ms timeout");
    assert_eq!(seen.last(), Some(&Event::ExecutionTimedOut));
    assert!(!runner.is_executing().await);

    // Unblock every gate so the blocking pool can shut down.
    drop(release);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_drains_in_flight_tasks_and_emits_once() {
    let (gate_node, release) = gate();
    let step = MockNode::succeeding();
    let mut dispatcher = dispatcher();
    dispatcher.register("Gate", gate_node);
    dispatcher.register("Step", step.clone());
    let (runner, mut events) = runner(dispatcher, EngineConfig::default());
    let runner = Arc::new(runner);

    let doc = document(&[("s", "Start"), ("g", "Gate"), ("after", "Step")], &[("s", "g"), ("g", "after")]);
    runner.start_execution(&doc).await.unwrap();
    wait_for(&mut events, &started("g")).await;

    let stopping = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.stop_execution().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!runner.is_executing().await);

    release.send(()).unwrap();
    stopping.await.unwrap();

    let seen = until_terminal(&mut events).await;
    assert_eq!(seen.last(), Some(&Event::ExecutionStopped));
    assert!(seen.contains(&completed("g")));

    // Give a late coordinator the chance to misbehave.
    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Ok(event) = events.try_recv() {
        assert!(!event.is_terminal(), "unexpected second terminal event {event:?}");
    }
    assert_eq!(step.call_count(), 0);
}

#[tokio::test]
async fn stop_when_idle_is_a_no_op() {
    let (runner, mut events) = runner(dispatcher(), EngineConfig::default());
    runner.stop_execution().await;
    runner.stop_execution().await;
    assert!(!runner.is_executing().await);
    assert!(events.try_recv().is_err());
}
