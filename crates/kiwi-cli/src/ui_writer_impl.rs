use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use indicatif::{ProgressBar, ProgressStyle};
use kiwi_core::ui_writer::UiWriter;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SPINNER_FRAMES: &[&str] = &["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷", "⣿"];
const SPINNER_TICK: Duration = Duration::from_millis(100);

/// Console implementation of UiWriter: stdout/stderr, an indicatif spinner
/// for the activity indicator and raw-mode single key reads.
pub struct ConsoleUiWriter {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleUiWriter {
    pub fn new() -> Self {
        Self {
            spinner: Mutex::new(None),
        }
    }

    fn spinner(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.spinner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ConsoleUiWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(SPINNER_FRAMES)
}

/// Read keys until a printable one arrives. Enter and Esc count as "no".
fn read_key_raw() -> io::Result<char> {
    loop {
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok('n'),
                KeyCode::Char(c) => return Ok(c),
                KeyCode::Enter | KeyCode::Esc => return Ok('n'),
                _ => {}
            }
        }
    }
}

impl UiWriter for ConsoleUiWriter {
    fn print(&self, message: &str) {
        print!("{}", message);
        let _ = io::stdout().flush();
    }

    fn println(&self, message: &str) {
        println!("{}", message);
    }

    fn print_stderr(&self, message: &str) {
        eprint!("{}", message);
        let _ = io::stderr().flush();
    }

    fn start_indicator(&self, message: &str) {
        let mut spinner = self.spinner();
        if let Some(bar) = spinner.as_ref() {
            bar.set_message(message.to_string());
            return;
        }

        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.set_message(message.to_string());
        bar.enable_steady_tick(SPINNER_TICK);
        *spinner = Some(bar);
    }

    fn stop_indicator(&self) {
        if let Some(bar) = self.spinner().take() {
            bar.finish_and_clear();
        }
    }

    fn read_key(&self, prompt: &str) -> io::Result<char> {
        print!("{}", prompt);
        io::stdout().flush()?;

        terminal::enable_raw_mode()?;
        let key = read_key_raw();
        terminal::disable_raw_mode()?;

        let key = key?;
        println!("{}", key);
        Ok(key)
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
    }
}
