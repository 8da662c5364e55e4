//! Command manager: a ready-made pipeline executing commands and routing signals.
//!
//! Producers push [`CommandEvent`]s into [`CommandManager::command_sink`];
//! registering the manager with a thread manager runs them:
//!
//! - signals fan out to every handler registered for their type tag
//! - commands execute as soon as they are drained
//! - delayed commands execute once their delay has elapsed
//! - repeated commands keep executing every repeat interval
//!
//! Pending delayed commands are checked on every pass, so the effective
//! resolution is the manager's scheduling interval.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::core::pipeline::panic_message;
use crate::core::{
    AppResult, EventHandler, EventPipeline, Queue, QueueElement, Sink, Source,
};
use crate::infra::queue::DefaultQueue;

/// Work executed by the command manager.
pub trait Command: Send {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Failures are logged by the manager and otherwise ignored.
    fn execute(&mut self) -> AppResult<()>;
}

/// A command executed once its delay has elapsed.
pub trait DelayedCommand: Command {
    /// Wait between enqueue and the first execution.
    fn delay_interval(&self) -> Duration;
}

/// A delayed command that keeps executing.
pub trait RepeatedCommand: DelayedCommand {
    /// Wait between consecutive executions.
    fn repeat_interval(&self) -> Duration;

    /// Total executions; values below one repeat forever.
    fn number_of_repeats(&self) -> i32;
}

/// A notification routed to handlers by its type tag.
pub trait Signal: QueueElement {}

impl<S: QueueElement> Signal for S {}

/// Handler receiving signals of one type tag.
pub type SignalHandler = Arc<dyn EventHandler<Arc<dyn Signal>>>;

/// Everything the command manager accepts.
pub enum CommandEvent {
    /// Routed to the handlers registered for its tag.
    Signal(Arc<dyn Signal>),
    /// Executed immediately.
    Command(Box<dyn Command>),
    /// Executed once after its delay.
    Delayed(Box<dyn DelayedCommand>),
    /// Executed after its delay, then every repeat interval.
    Repeated(Box<dyn RepeatedCommand>),
}

impl CommandEvent {
    /// Wrap a signal.
    pub fn signal(signal: impl Signal + 'static) -> Self {
        Self::Signal(Arc::new(signal))
    }

    /// Wrap a command.
    pub fn command(command: impl Command + 'static) -> Self {
        Self::Command(Box::new(command))
    }

    /// Wrap a delayed command.
    pub fn delayed(command: impl DelayedCommand + 'static) -> Self {
        Self::Delayed(Box::new(command))
    }

    /// Wrap a repeated command.
    pub fn repeated(command: impl RepeatedCommand + 'static) -> Self {
        Self::Repeated(Box::new(command))
    }
}

impl std::fmt::Debug for CommandEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal(signal) => f.debug_tuple("Signal").field(&signal.type_tag()).finish(),
            Self::Command(_) => f.write_str("Command"),
            Self::Delayed(_) => f.write_str("Delayed"),
            Self::Repeated(_) => f.write_str("Repeated"),
        }
    }
}

/// Run one command body, logging failures and panics at warn.
fn run_logged(kind: &str, body: impl FnOnce() -> AppResult<()>) {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(kind, error = %e, "command failed"),
        Err(panic) => warn!(kind, panic = %panic_message(panic.as_ref()), "command panicked"),
    }
}

enum Pending {
    Once(Box<dyn DelayedCommand>),
    Repeating(Box<dyn RepeatedCommand>),
}

struct Scheduled {
    command: Pending,
    next_run: Instant,
    executions: u32,
}

impl Scheduled {
    fn execute(&mut self) -> AppResult<()> {
        match &mut self.command {
            Pending::Once(command) => command.execute(),
            Pending::Repeating(command) => command.execute(),
        }
    }

    /// Whether another run follows; updates the next run time if so.
    fn reschedule(&mut self, now: Instant) -> bool {
        let Pending::Repeating(command) = &self.command else {
            return false;
        };
        let repeats = command.number_of_repeats();
        let again = repeats < 1 || i64::from(self.executions) < i64::from(repeats);
        if again {
            self.next_run = now + command.repeat_interval();
        }
        again
    }
}

#[derive(Default)]
struct CommandEventHandler {
    signal_handlers: RwLock<HashMap<u64, Vec<SignalHandler>>>,
    scheduled: Mutex<Vec<Scheduled>>,
}

impl CommandEventHandler {
    fn dispatch_signal(&self, signal: &Arc<dyn Signal>) {
        let tag = signal.type_tag();
        let handlers = self.signal_handlers.read().get(&tag).cloned().unwrap_or_default();
        for handler in handlers {
            let signal = Arc::clone(signal);
            match catch_unwind(AssertUnwindSafe(|| handler.handle_event(signal))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(type_tag = tag, error = %e, "signal handler failed"),
                Err(panic) => {
                    warn!(type_tag = tag, panic = %panic_message(panic.as_ref()), "signal handler panicked");
                }
            }
        }
    }

    fn schedule(&self, command: Pending, delay: Duration) {
        self.scheduled.lock().push(Scheduled {
            command,
            next_run: Instant::now() + delay,
            executions: 0,
        });
    }

    fn run_due(&self) {
        let pending: VecDeque<Scheduled> = std::mem::take(&mut *self.scheduled.lock()).into();
        if pending.is_empty() {
            return;
        }

        let mut pass = Requeue {
            target: &self.scheduled,
            pending,
            kept: Vec::new(),
        };
        while let Some(mut scheduled) = pass.pending.pop_front() {
            if Instant::now() < scheduled.next_run {
                pass.kept.push(scheduled);
                continue;
            }
            run_logged("delayed", || scheduled.execute());
            scheduled.executions = scheduled.executions.saturating_add(1);
            if scheduled.reschedule(Instant::now()) {
                pass.kept.push(scheduled);
            }
        }
    }
}

/// Returns everything not yet dropped from a pass to the schedule, even on unwind.
struct Requeue<'a> {
    target: &'a Mutex<Vec<Scheduled>>,
    pending: VecDeque<Scheduled>,
    kept: Vec<Scheduled>,
}

impl Drop for Requeue<'_> {
    fn drop(&mut self) {
        let mut scheduled = self.target.lock();
        scheduled.append(&mut self.kept);
        scheduled.extend(self.pending.drain(..));
    }
}

impl EventHandler<CommandEvent> for CommandEventHandler {
    fn handle_event(&self, event: CommandEvent) -> AppResult<()> {
        match event {
            CommandEvent::Signal(signal) => self.dispatch_signal(&signal),
            CommandEvent::Command(mut command) => run_logged("command", || command.execute()),
            CommandEvent::Delayed(command) => {
                let delay = command.delay_interval();
                self.schedule(Pending::Once(command), delay);
            }
            CommandEvent::Repeated(command) => {
                let delay = command.delay_interval();
                self.schedule(Pending::Repeating(command), delay);
            }
        }
        Ok(())
    }

    fn handle_events(&self, events: Vec<CommandEvent>) -> AppResult<()> {
        for event in events {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.handle_event(event))) {
                warn!(panic = %panic_message(panic.as_ref()), "command event panicked");
            }
        }
        self.run_due();
        Ok(())
    }
}

/// Pipeline over an unbounded command queue.
pub struct CommandManager {
    queue: Arc<DefaultQueue<CommandEvent>>,
    sources: Vec<Arc<dyn Source<CommandEvent>>>,
    handler: CommandEventHandler,
}

impl CommandManager {
    /// Empty manager with an unbounded queue.
    #[must_use]
    pub fn new() -> Self {
        let queue = Arc::new(DefaultQueue::unbounded());
        Self {
            sources: vec![Arc::clone(&queue) as Arc<dyn Source<CommandEvent>>],
            queue,
            handler: CommandEventHandler::default(),
        }
    }

    /// Where producers push commands and signals.
    #[must_use]
    pub fn command_sink(&self) -> Arc<dyn Sink<CommandEvent>> {
        Arc::clone(&self.queue) as Arc<dyn Sink<CommandEvent>>
    }

    /// Route signals with `type_tag` to `handler`. Registering the same
    /// handler twice has no effect.
    pub fn register_signal_handler(&self, type_tag: u64, handler: SignalHandler) {
        let mut handlers = self.handler.signal_handlers.write();
        let entry = handlers.entry(type_tag).or_default();
        if entry.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return;
        }
        entry.push(handler);
        debug!(type_tag, handlers = entry.len(), "signal handler registered");
    }

    /// Stop routing `type_tag` signals to `handler`.
    pub fn deregister_signal_handler(&self, type_tag: u64, handler: &SignalHandler) {
        let mut handlers = self.handler.signal_handlers.write();
        if let Some(entry) = handlers.get_mut(&type_tag) {
            entry.retain(|h| !Arc::ptr_eq(h, handler));
            if entry.is_empty() {
                handlers.remove(&type_tag);
            }
        }
    }

    /// Delayed and repeated commands still waiting to run.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.handler.scheduled.lock().len()
    }

    /// Close the queue and handle whatever is still in it.
    pub fn dispose(&self) {
        self.queue.close();
        let remaining = self.queue.dequeue_all();
        debug!(remaining = remaining.len(), "disposing command manager");
        for event in remaining {
            // Never fails: failures are logged while handling.
            let _ = self.handler.handle_event(event);
        }
    }
}

impl Default for CommandManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPipeline for CommandManager {
    type Element = CommandEvent;

    fn sources(&self) -> &[Arc<dyn Source<CommandEvent>>] {
        &self.sources
    }

    fn handler(&self) -> &dyn EventHandler<CommandEvent> {
        &self.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PipelineRunner, PipelineTask, SinkError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Count(Arc<AtomicUsize>);

    impl Command for Count {
        fn execute(&mut self) -> AppResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Later(Count, Duration);

    impl Command for Later {
        fn execute(&mut self) -> AppResult<()> {
            self.0.execute()
        }
    }

    impl DelayedCommand for Later {
        fn delay_interval(&self) -> Duration {
            self.1
        }
    }

    struct Every(Count, i32);

    impl Command for Every {
        fn execute(&mut self) -> AppResult<()> {
            self.0.execute()
        }
    }

    impl DelayedCommand for Every {
        fn delay_interval(&self) -> Duration {
            Duration::ZERO
        }
    }

    impl RepeatedCommand for Every {
        fn repeat_interval(&self) -> Duration {
            Duration::ZERO
        }

        fn number_of_repeats(&self) -> i32 {
            self.1
        }
    }

    struct Ping;

    impl QueueElement for Ping {
        fn type_tag(&self) -> u64 {
            1
        }
    }

    fn pass(manager: &Arc<CommandManager>) {
        PipelineRunner::new(Arc::clone(manager), "commands").run();
    }

    #[test]
    fn test_commands_execute_and_failures_are_contained() {
        struct Fails;
        impl Command for Fails {
            fn execute(&mut self) -> AppResult<()> {
                anyhow::bail!("command failure")
            }
        }

        let manager = Arc::new(CommandManager::new());
        let count = Arc::new(AtomicUsize::new(0));
        let sink = manager.command_sink();
        sink.enqueue(CommandEvent::command(Fails)).unwrap();
        sink.enqueue(CommandEvent::command(Count(Arc::clone(&count)))).unwrap();

        pass(&manager);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(sink.size(), 0);
    }

    #[test]
    fn test_signals_reach_handlers_for_their_tag() {
        let manager = Arc::new(CommandManager::new());
        let received = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&received);
        let handler: SignalHandler = Arc::new(crate::core::FnHandler::new(
            move |signals: Vec<Arc<dyn Signal>>| {
                seen.fetch_add(signals.len(), Ordering::SeqCst);
                Ok(())
            },
        ));
        manager.register_signal_handler(1, Arc::clone(&handler));
        manager.register_signal_handler(1, Arc::clone(&handler));

        manager.command_sink().enqueue(CommandEvent::signal(Ping)).unwrap();
        pass(&manager);
        assert_eq!(received.load(Ordering::SeqCst), 1);

        manager.deregister_signal_handler(1, &handler);
        manager.command_sink().enqueue(CommandEvent::signal(Ping)).unwrap();
        pass(&manager);
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delayed_command_waits_for_its_delay() {
        let manager = Arc::new(CommandManager::new());
        let count = Arc::new(AtomicUsize::new(0));
        manager
            .command_sink()
            .enqueue(CommandEvent::delayed(Later(
                Count(Arc::clone(&count)),
                Duration::from_millis(50),
            )))
            .unwrap();

        pass(&manager);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(manager.pending_commands(), 1);

        std::thread::sleep(Duration::from_millis(80));
        pass(&manager);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(manager.pending_commands(), 0);
    }

    #[test]
    fn test_repeated_command_stops_after_its_repeats() {
        let manager = Arc::new(CommandManager::new());
        let count = Arc::new(AtomicUsize::new(0));
        manager
            .command_sink()
            .enqueue(CommandEvent::repeated(Every(Count(Arc::clone(&count)), 3)))
            .unwrap();

        for _ in 0..5 {
            pass(&manager);
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(manager.pending_commands(), 0);
    }

    #[test]
    fn test_unlimited_repeats_stay_scheduled() {
        let manager = Arc::new(CommandManager::new());
        let count = Arc::new(AtomicUsize::new(0));
        manager
            .command_sink()
            .enqueue(CommandEvent::repeated(Every(Count(Arc::clone(&count)), 0)))
            .unwrap();

        for _ in 0..4 {
            pass(&manager);
        }
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert_eq!(manager.pending_commands(), 1);
    }

    struct Explodes;

    impl Command for Explodes {
        fn execute(&mut self) -> AppResult<()> {
            panic!("command exploded")
        }
    }

    impl DelayedCommand for Explodes {
        fn delay_interval(&self) -> Duration {
            Duration::ZERO
        }
    }

    #[test]
    fn test_panicking_delayed_command_keeps_the_schedule() {
        let manager = Arc::new(CommandManager::new());
        let count = Arc::new(AtomicUsize::new(0));
        let sink = manager.command_sink();
        sink.enqueue(CommandEvent::delayed(Explodes)).unwrap();
        sink.enqueue(CommandEvent::repeated(Every(Count(Arc::clone(&count)), 0)))
            .unwrap();
        sink.enqueue(CommandEvent::delayed(Later(
            Count(Arc::clone(&count)),
            Duration::from_secs(60),
        )))
        .unwrap();

        pass(&manager);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(manager.pending_commands(), 2);

        pass(&manager);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(manager.pending_commands(), 2);
    }

    #[test]
    fn test_panicking_command_does_not_drop_rest_of_batch() {
        let manager = Arc::new(CommandManager::new());
        let count = Arc::new(AtomicUsize::new(0));
        let sink = manager.command_sink();
        sink.enqueue(CommandEvent::command(Explodes)).unwrap();
        sink.enqueue(CommandEvent::command(Count(Arc::clone(&count)))).unwrap();

        pass(&manager);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(sink.size(), 0);
    }

    #[test]
    fn test_dispose_handles_remaining_and_closes() {
        let manager = CommandManager::new();
        let count = Arc::new(AtomicUsize::new(0));
        let sink = manager.command_sink();
        sink.enqueue(CommandEvent::command(Count(Arc::clone(&count)))).unwrap();

        manager.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(
            sink.enqueue(CommandEvent::command(Count(count))).unwrap_err(),
            SinkError::Closed
        );
    }
}
