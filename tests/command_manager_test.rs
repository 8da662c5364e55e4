//! Integration tests for the command manager running under a thread manager

use prometheus_event_stage::config::ThreadManagerConfig;
use prometheus_event_stage::core::{
    AppResult, Command, CommandEvent, CommandManager, DelayedCommand, FnHandler, QueueElement,
    RepeatedCommand, Signal, SignalHandler, Sink, ThreadManager, TpcThreadManager,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn manager() -> TpcThreadManager {
    TpcThreadManager::new(ThreadManagerConfig {
        processors: 1,
        threads_per_processor: 1,
        sleep_time_ms: 10,
        block_timeout_ms: 200,
    })
    .unwrap()
}

fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

struct Tick(Arc<AtomicUsize>);

impl Command for Tick {
    fn execute(&mut self) -> AppResult<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Heartbeat {
    ticks: Arc<AtomicUsize>,
    repeats: i32,
}

impl Command for Heartbeat {
    fn execute(&mut self) -> AppResult<()> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl DelayedCommand for Heartbeat {
    fn delay_interval(&self) -> Duration {
        Duration::from_millis(20)
    }
}

impl RepeatedCommand for Heartbeat {
    fn repeat_interval(&self) -> Duration {
        Duration::from_millis(15)
    }

    fn number_of_repeats(&self) -> i32 {
        self.repeats
    }
}

struct Shutdown;

impl QueueElement for Shutdown {
    fn type_tag(&self) -> u64 {
        0x5348_5554
    }
}

#[test]
fn test_commands_and_signals_flow_through_scheduler() {
    let threads = manager();
    let commands = Arc::new(CommandManager::new());
    threads.register(Arc::clone(&commands)).unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));
    let signals = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&signals);
    let handler: SignalHandler = Arc::new(FnHandler::new(move |batch: Vec<Arc<dyn Signal>>| {
        seen.fetch_add(batch.len(), Ordering::SeqCst);
        Ok(())
    }));
    commands.register_signal_handler(Shutdown.type_tag(), handler);

    let sink = commands.command_sink();
    sink.enqueue(CommandEvent::command(Tick(Arc::clone(&ticks)))).unwrap();
    sink.enqueue(CommandEvent::signal(Shutdown)).unwrap();

    assert!(wait_until(|| ticks.load(Ordering::SeqCst) == 1));
    assert!(wait_until(|| signals.load(Ordering::SeqCst) == 1));

    threads.dispose();
    commands.dispose();
}

#[test]
fn test_repeated_command_runs_its_count_under_scheduler() {
    let threads = manager();
    let commands = Arc::new(CommandManager::new());
    threads.register(Arc::clone(&commands)).unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));
    commands
        .command_sink()
        .enqueue(CommandEvent::repeated(Heartbeat {
            ticks: Arc::clone(&ticks),
            repeats: 3,
        }))
        .unwrap();

    assert!(wait_until(|| ticks.load(Ordering::SeqCst) == 3));
    assert!(wait_until(|| commands.pending_commands() == 0));
    thread::sleep(Duration::from_millis(60));
    assert_eq!(ticks.load(Ordering::SeqCst), 3);

    threads.dispose();
}
