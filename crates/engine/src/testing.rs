//! In-memory fakes for the capability traits, shared by unit tests.

use crate::traits::*;
use crate::types::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ordered record of side effects across fakes.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

// ---------------------------------------------------------------------------

pub struct StaticInventory {
    apps: Vec<AppRecord>,
    fail: bool,
}

impl StaticInventory {
    pub fn new(apps: Vec<AppRecord>) -> Self {
        Self { apps, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            apps: vec![],
            fail: true,
        }
    }
}

impl InventoryProvider for StaticInventory {
    fn list_applications(&self) -> CapResult<Vec<AppRecord>> {
        if self.fail {
            return Err(CapError::StorageUnavailable("inventory offline".into()));
        }
        Ok(self.apps.clone())
    }
}

// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct RecordingExecutor {
    performed: Arc<Mutex<Vec<(String, ActionKind, SubMode)>>>,
    failures: HashMap<String, String>,
    fatal_on: Option<String>,
    journal: Journal,
}

impl RecordingExecutor {
    pub fn failing(mut self, package: &str, message: &str) -> Self {
        self.failures.insert(package.to_string(), message.to_string());
        self
    }

    pub fn fatal_on(mut self, package: &str) -> Self {
        self.fatal_on = Some(package.to_string());
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn performed(&self) -> Vec<String> {
        self.performed
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _, _)| p.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<(String, ActionKind, SubMode)> {
        self.performed.lock().unwrap().clone()
    }
}

impl ActionExecutor for RecordingExecutor {
    fn perform(&self, app: &AppRecord, kind: ActionKind, sub_mode: SubMode) -> CapResult<ActionOutcome> {
        if self.fatal_on.as_deref() == Some(app.package.as_str()) {
            self.journal.push(format!("fatal:{}", app.package));
            return Err(CapError::ChannelUnavailable("root shell gone".into()));
        }
        self.journal.push(format!("perform:{}", app.package));
        self.performed
            .lock()
            .unwrap()
            .push((app.package.clone(), kind, sub_mode));
        Ok(match self.failures.get(&app.package) {
            Some(message) => ActionOutcome::failure(app, message.clone()),
            None => ActionOutcome::success(app, None),
        })
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NotificationId,
    pub title: String,
    pub body: String,
    pub ongoing: bool,
}

#[derive(Clone, Default)]
pub struct RecordingReporter {
    notes: Arc<Mutex<Vec<Note>>>,
    fail: bool,
}

impl RecordingReporter {
    /// Records every call, then reports failure.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn notes(&self) -> Vec<Note> {
        self.notes.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn notify(&self, id: NotificationId, title: &str, body: &str, ongoing: bool) -> CapResult<()> {
        self.notes.lock().unwrap().push(Note {
            id,
            title: title.to_string(),
            body: body.to_string(),
            ongoing,
        });
        if self.fail {
            return Err(CapError::Other("notification service down".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryLogSink {
    entries: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl MemoryLogSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

impl LogSink for MemoryLogSink {
    fn append(&self, text: &str) -> CapResult<()> {
        if self.fail {
            return Err(CapError::Io(std::io::Error::other("disk full")));
        }
        self.entries.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct CountingPower {
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
    fail: bool,
    journal: Journal,
}

impl CountingPower {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn is_held(&self) -> bool {
        self.acquired() > self.released()
    }
}

impl PowerOps for CountingPower {
    fn acquire_partial(&self, _tag: &str, _timeout: Duration) -> CapResult<()> {
        if self.fail {
            return Err(CapError::PermissionDenied("wake lock".into()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.journal.push("wake:acquire");
        Ok(())
    }

    fn release(&self, _tag: &str) -> CapResult<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.journal.push("wake:release");
        Ok(())
    }
}

/// Wake locks keyed by name, the way the kernel tracks them: releasing a
/// name drops that lock whoever acquired it.
#[derive(Clone, Default)]
pub struct NamedWakeLocks {
    held: Arc<Mutex<BTreeSet<String>>>,
}

impl NamedWakeLocks {
    pub fn held(&self) -> Vec<String> {
        self.held.lock().unwrap().iter().cloned().collect()
    }
}

impl PowerOps for NamedWakeLocks {
    fn acquire_partial(&self, tag: &str, _timeout: Duration) -> CapResult<()> {
        self.held.lock().unwrap().insert(tag.to_string());
        Ok(())
    }

    fn release(&self, tag: &str) -> CapResult<()> {
        self.held.lock().unwrap().remove(tag);
        Ok(())
    }
}
