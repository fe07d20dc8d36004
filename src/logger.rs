use std::cell::RefCell;
use std::fs::{create_dir_all, File};
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Log event types that determine which receivers should log the message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvent {
    /// One line per entity decision (target, window, old/new bid, reason)
    Entity,
    /// Campaign-level data (baseline rate for a window, skipped campaigns)
    Campaign,
    /// Lookback window start/finish with counts
    Window,
    /// Summary of a complete adjustment pass
    Pass,
    /// Scenario-level data (simulated days, comparisons)
    Scenario,
    /// Validation results (pass/fail messages, validation checks)
    Validation,
}

impl LogEvent {
    /// This event and every coarser event above it, up to Scenario
    /// Hierarchy: Entity -> Campaign -> Window -> Pass -> Scenario -> Validation
    ///
    /// Validation only gets what is logged to it directly, so its receivers see clean result lines.
    fn with_upward(self) -> &'static [LogEvent] {
        const ALL: [LogEvent; 6] = [
            LogEvent::Entity,
            LogEvent::Campaign,
            LogEvent::Window,
            LogEvent::Pass,
            LogEvent::Scenario,
            LogEvent::Validation,
        ];
        match self {
            LogEvent::Entity => &ALL[0..5],
            LogEvent::Campaign => &ALL[1..5],
            LogEvent::Window => &ALL[2..5],
            LogEvent::Pass => &ALL[3..5],
            LogEvent::Scenario => &ALL[4..5],
            LogEvent::Validation => &ALL[5..],
        }
    }
}

/// Trait for log receivers that can receive log messages
pub trait LogReceiver {
    /// Check if this receiver should handle the given log event
    fn should_log(&self, event: LogEvent) -> bool;

    /// Write a string to this receiver
    fn write(&mut self, s: &str) -> io::Result<()>;

    /// Flush this receiver
    fn flush(&mut self) -> io::Result<()>;
}

/// Set of events a receiver listens to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventSet(u8);

impl EventSet {
    fn bit(event: LogEvent) -> u8 {
        1 << event as u8
    }

    pub fn contains(self, event: LogEvent) -> bool {
        self.0 & Self::bit(event) != 0
    }
}

impl From<Vec<LogEvent>> for EventSet {
    fn from(events: Vec<LogEvent>) -> Self {
        Self(events.into_iter().fold(0, |bits, event| bits | Self::bit(event)))
    }
}

/// Console log receiver (writes to stdout)
pub struct ConsoleReceiver {
    events: EventSet,
}

impl ConsoleReceiver {
    pub fn new(enabled_events: Vec<LogEvent>) -> Box<dyn LogReceiver> {
        Box::new(Self { events: enabled_events.into() })
    }
}

impl LogReceiver for ConsoleReceiver {
    fn should_log(&self, event: LogEvent) -> bool {
        self.events.contains(event)
    }

    fn write(&mut self, s: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(s.as_bytes())?;
        stdout.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// Log file under `log/`, truncated when opened
pub struct FileReceiver {
    file: File,
    events: EventSet,
}

impl FileReceiver {
    /// Parent directories are created as needed
    pub fn new(path: &Path, enabled_events: Vec<LogEvent>) -> io::Result<Box<dyn LogReceiver>> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Box::new(Self { file, events: enabled_events.into() }))
    }
}

impl LogReceiver for FileReceiver {
    fn should_log(&self, event: LogEvent) -> bool {
        self.events.contains(event)
    }

    fn write(&mut self, s: &str) -> io::Result<()> {
        self.file.write_all(s.as_bytes())?;
        self.file.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Shared text buffer a `MemoryReceiver` appends to
pub type MemoryBuffer = Rc<RefCell<String>>;

/// Keeps everything it receives in memory, for tests
pub struct MemoryReceiver {
    events: EventSet,
    buffer: MemoryBuffer,
}

impl MemoryReceiver {
    /// The receiver to add to a logger, and a handle to read what it got
    pub fn new(enabled_events: Vec<LogEvent>) -> (Box<dyn LogReceiver>, MemoryBuffer) {
        let buffer = MemoryBuffer::default();
        let receiver = Self { events: enabled_events.into(), buffer: Rc::clone(&buffer) };
        (Box::new(receiver), buffer)
    }
}

impl LogReceiver for MemoryReceiver {
    fn should_log(&self, event: LogEvent) -> bool {
        self.events.contains(event)
    }

    fn write(&mut self, s: &str) -> io::Result<()> {
        self.buffer.borrow_mut().push_str(s);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Unique identifier for a receiver
pub type ReceiverId = usize;

/// Global counter for generating unique receiver IDs
static RECEIVER_ID_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// Main logger that manages multiple receivers
pub struct Logger {
    receivers: Vec<(ReceiverId, Box<dyn LogReceiver>)>,
}

impl Logger {
    /// Create a new logger with no receivers
    pub fn new() -> Self {
        Self {
            receivers: Vec::new(),
        }
    }

    /// Add a receiver to the logger and return its unique ID
    pub fn add_receiver(&mut self, receiver: Box<dyn LogReceiver>) -> ReceiverId {
        let id = RECEIVER_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.receivers.push((id, receiver));
        id
    }

    /// Remove a receiver by its ID
    pub fn remove_receiver(&mut self, id: ReceiverId) {
        self.receivers.retain(|(receiver_id, _)| *receiver_id != id);
    }

    /// Send text once to every receiver listening to any of `events`
    fn dispatch(&mut self, events: &[LogEvent], text: &str) -> io::Result<()> {
        for (_, receiver) in self.receivers.iter_mut() {
            if events.iter().any(|&event| receiver.should_log(event)) {
                receiver.write(text)?;
            }
        }
        Ok(())
    }

    pub fn log(&mut self, event: LogEvent, message: &str) -> io::Result<()> {
        self.dispatch(&[event], message)
    }

    pub fn logln(&mut self, event: LogEvent, message: &str) -> io::Result<()> {
        self.dispatch(&[event], &format!("{}\n", message))
    }

    /// `ERROR` line for this event and every coarser one up to Scenario
    pub fn errln(&mut self, event: LogEvent, message: &str) -> io::Result<()> {
        self.dispatch(event.with_upward(), &format!("ERROR {}\n", message))
    }

    /// `WARNING` line for this event and every coarser one up to Scenario
    pub fn warnln(&mut self, event: LogEvent, message: &str) -> io::Result<()> {
        self.dispatch(event.with_upward(), &format!("WARNING {}\n", message))
    }

    /// Flush all receivers
    pub fn flush(&mut self) -> io::Result<()> {
        for (_, receiver) in &mut self.receivers {
            receiver.flush()?;
        }
        Ok(())
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

/// Sanitize a string to be used as a filename
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

/// Macro to log a formatted string (like println! but for logger)
#[macro_export]
macro_rules! logln {
    ($logger:expr, $event:expr, $($arg:tt)*) => {
        {
            let _ = $logger.logln($event, &format!($($arg)*));
        }
    };
}

/// Macro to log a formatted string without newline (like print! but for logger)
#[macro_export]
macro_rules! log {
    ($logger:expr, $event:expr, $($arg:tt)*) => {
        {
            let _ = $logger.log($event, &format!($($arg)*));
        }
    };
}

/// Macro to log an error line to the specified event and upward events up to Scenario
#[macro_export]
macro_rules! errln {
    ($logger:expr, $event:expr, $($arg:tt)*) => {
        {
            let _ = $logger.errln($event, &format!($($arg)*));
        }
    };
}

/// Macro to log a warning line to the specified event and upward events up to Scenario
#[macro_export]
macro_rules! warnln {
    ($logger:expr, $event:expr, $($arg:tt)*) => {
        {
            let _ = $logger.warnln($event, &format!($($arg)*));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("device modifiers"), "device_modifiers");
        assert_eq!(sanitize_filename("window/claims"), "window_claims");
        assert_eq!(sanitize_filename("30d:7d"), "30d_7d");
    }

    #[test]
    fn test_warning_reaches_coarser_receivers_once() {
        let mut logger = Logger::new();
        let (receiver, buffer) = MemoryReceiver::new(vec![LogEvent::Window, LogEvent::Pass]);
        logger.add_receiver(receiver);

        warnln!(logger, LogEvent::Entity, "no data for {}", "mobile");
        logln!(logger, LogEvent::Entity, "not routed");

        assert_eq!(buffer.borrow().as_str(), "WARNING no data for mobile\n");
    }

    #[test]
    fn test_warnings_stop_below_validation() {
        let mut logger = Logger::new();
        let (scenario, scenario_buffer) = MemoryReceiver::new(vec![LogEvent::Scenario]);
        let (validation, validation_buffer) = MemoryReceiver::new(vec![LogEvent::Validation]);
        logger.add_receiver(scenario);
        logger.add_receiver(validation);

        warnln!(logger, LogEvent::Campaign, "Campaign 7: no baseline");
        errln!(logger, LogEvent::Entity, "write rejected");
        logln!(logger, LogEvent::Validation, "mutation_failures: PASSED");

        assert_eq!(scenario_buffer.borrow().as_str(), "WARNING Campaign 7: no baseline\nERROR write rejected\n");
        assert_eq!(validation_buffer.borrow().as_str(), "mutation_failures: PASSED\n");

        errln!(logger, LogEvent::Validation, "scenario crashed");
        assert!(validation_buffer.borrow().ends_with("ERROR scenario crashed\n"));
        assert!(!scenario_buffer.borrow().contains("crashed"));
    }

    #[test]
    fn test_event_set_membership() {
        let events = EventSet::from(vec![LogEvent::Entity, LogEvent::Validation]);
        assert!(events.contains(LogEvent::Entity));
        assert!(events.contains(LogEvent::Validation));
        assert!(!events.contains(LogEvent::Pass));
        assert!(!EventSet::default().contains(LogEvent::Entity));
    }

    #[test]
    fn test_removed_receiver_gets_nothing() {
        let mut logger = Logger::new();
        let (receiver, buffer) = MemoryReceiver::new(vec![LogEvent::Pass]);
        let id = logger.add_receiver(receiver);
        logln!(logger, LogEvent::Pass, "first");
        logger.remove_receiver(id);
        logln!(logger, LogEvent::Pass, "second");
        assert_eq!(buffer.borrow().as_str(), "first\n");
    }
}
