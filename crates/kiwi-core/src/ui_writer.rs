use std::collections::VecDeque;
use std::io;
use std::sync::{Mutex, MutexGuard};

/// Which of a subprocess's pipes a piece of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Interface for terminal output and single-key input.
///
/// Implementations are driven exclusively by the
/// [`TerminalCoordinator`](crate::terminal::TerminalCoordinator), which
/// serialises every call; they do not need their own ordering guarantees.
pub trait UiWriter: Send + Sync {
    /// Print text without a trailing newline
    fn print(&self, message: &str);

    /// Print a message with a newline
    fn println(&self, message: &str);

    /// Print text to the error stream
    fn print_stderr(&self, message: &str);

    /// Show (or replace) the activity indicator with `message`
    fn start_indicator(&self, message: &str);

    /// Hide the activity indicator and clear its line
    fn stop_indicator(&self);

    /// Show `prompt` and read one keystroke
    fn read_key(&self, prompt: &str) -> io::Result<char>;

    /// Flush any buffered output
    fn flush(&self);
}

/// A no-op implementation for when UI output is not needed
pub struct NullUiWriter;

impl UiWriter for NullUiWriter {
    fn print(&self, _message: &str) {}
    fn println(&self, _message: &str) {}
    fn print_stderr(&self, _message: &str) {}
    fn start_indicator(&self, _message: &str) {}
    fn stop_indicator(&self) {}
    fn read_key(&self, _prompt: &str) -> io::Result<char> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "no input device"))
    }
    fn flush(&self) {}
}

/// Everything a [`RecordingUiWriter`] was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Print(String),
    Println(String),
    Stderr(String),
    IndicatorStart(String),
    IndicatorStop,
    KeyPrompt(String),
}

/// Captures output and replays scripted keystrokes. Used by tests.
#[derive(Default)]
pub struct RecordingUiWriter {
    events: Mutex<Vec<UiEvent>>,
    keys: Mutex<VecDeque<char>>,
}

impl RecordingUiWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue keystrokes returned by successive `read_key` calls.
    pub fn with_keys(self, keys: &str) -> Self {
        lock(&self.keys).extend(keys.chars());
        self
    }

    pub fn events(&self) -> Vec<UiEvent> {
        lock(&self.events).clone()
    }

    /// All printed text (stdout and stderr) concatenated, one entry per
    /// `println` line.
    pub fn output(&self) -> String {
        let mut out = String::new();
        for event in lock(&self.events).iter() {
            match event {
                UiEvent::Print(text) | UiEvent::Stderr(text) => out.push_str(text),
                UiEvent::Println(text) => {
                    out.push_str(text);
                    out.push('\n');
                }
                _ => {}
            }
        }
        out
    }

    /// Lines printed with `println`.
    pub fn lines(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                UiEvent::Println(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn key_reads(&self) -> usize {
        lock(&self.events)
            .iter()
            .filter(|event| matches!(event, UiEvent::KeyPrompt(_)))
            .count()
    }

    pub fn indicator_messages(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                UiEvent::IndicatorStart(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: UiEvent) {
        lock(&self.events).push(event);
    }
}

impl UiWriter for RecordingUiWriter {
    fn print(&self, message: &str) {
        self.push(UiEvent::Print(message.to_string()));
    }

    fn println(&self, message: &str) {
        self.push(UiEvent::Println(message.to_string()));
    }

    fn print_stderr(&self, message: &str) {
        self.push(UiEvent::Stderr(message.to_string()));
    }

    fn start_indicator(&self, message: &str) {
        self.push(UiEvent::IndicatorStart(message.to_string()));
    }

    fn stop_indicator(&self) {
        self.push(UiEvent::IndicatorStop);
    }

    fn read_key(&self, prompt: &str) -> io::Result<char> {
        self.push(UiEvent::KeyPrompt(prompt.to_string()));
        lock(&self.keys)
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted keystroke"))
    }

    fn flush(&self) {}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
