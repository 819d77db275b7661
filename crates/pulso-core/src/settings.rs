//! Persisted control settings.
//!
//! A small tagged record (UI mode plus two function selectors) survives
//! power cycles. The record is flushed lazily: handlers call
//! [`ControlSettings::mark_dirty`], and the idle loop periodically calls
//! [`ControlSettings::flush_if_dirty`], which performs an
//! erase-then-program through the [`SettingsStore`] seam.
//!
//! Flash operations stall the bus for far longer than an audio block, so
//! the flush loop polls the store's busy flag and calls the cooperative
//! checkpoint on every poll. From the caller's point of view the flush
//! is atomic: the record is only marked clean after the program
//! completes.

use thiserror::Error;

use crate::scheduler::Checkpoint;

/// Marker word identifying a valid settings record in storage.
pub const SETTINGS_MAGIC: u32 = 0xBEEF_BEAC;

/// Words in the encoded settings record.
pub const RECORD_WORDS: usize = 4;

/// Errors surfaced by the settings store.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// The erase operation reported a failure.
    #[error("settings flash erase failed")]
    Erase,
    /// The program operation reported a failure.
    #[error("settings flash program failed")]
    Program,
}

/// Non-volatile storage seam for the settings record.
///
/// `begin_*` start a long-running flash operation and return before it
/// completes; the caller polls [`SettingsStore::busy`]. Implementations
/// must suspend the shared audio transfer hardware for the duration of
/// the operation — the flash controller and the audio path share a DMA
/// engine.
pub trait SettingsStore {
    /// Starts erasing the settings page.
    fn begin_erase(&mut self) -> Result<(), StoreError>;
    /// Starts programming `record` into the erased page.
    fn begin_program(&mut self, record: &[u32; RECORD_WORDS]) -> Result<(), StoreError>;
    /// Returns `true` while an erase or program is still running.
    fn busy(&self) -> bool;
    /// Reads the stored record (erased flash reads as all-ones).
    fn read(&self) -> [u32; RECORD_WORDS];
}

/// The persisted mode + function-selector record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlSettings {
    /// UI edit mode.
    pub mode: u8,
    /// Function selector per processor channel.
    pub function: [u8; 2],
    dirty: bool,
}

impl ControlSettings {
    /// Encodes to the stored word record, magic first.
    #[must_use]
    pub fn encode(&self) -> [u32; RECORD_WORDS] {
        [
            SETTINGS_MAGIC,
            u32::from(self.mode),
            u32::from(self.function[0]),
            u32::from(self.function[1]),
        ]
    }

    /// Decodes a stored record; `None` if the magic marker is absent
    /// (wiped or never-written storage).
    #[must_use]
    pub fn decode(record: &[u32; RECORD_WORDS]) -> Option<Self> {
        if record[0] != SETTINGS_MAGIC {
            return None;
        }
        Some(Self {
            mode: record[1] as u8,
            function: [record[2] as u8, record[3] as u8],
            dirty: false,
        })
    }

    /// Loads from the store, falling back to defaults when no valid
    /// record is present.
    pub fn load(store: &dyn SettingsStore) -> Self {
        Self::decode(&store.read()).unwrap_or_default()
    }

    /// Flags the record for the next background flush.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns `true` if a flush is outstanding.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Erases and reprograms the record if it is dirty.
    ///
    /// Calls `checkpoint` on every busy poll so the audio deadline holds
    /// while flash programs. Returns `Ok(true)` if a flush happened.
    pub fn flush_if_dirty(
        &mut self,
        store: &mut dyn SettingsStore,
        checkpoint: &mut dyn Checkpoint,
    ) -> Result<bool, StoreError> {
        if !self.dirty {
            return Ok(false);
        }

        store.begin_erase()?;
        while store.busy() {
            checkpoint.maybe_service();
        }

        store.begin_program(&self.encode())?;
        while store.busy() {
            checkpoint.maybe_service();
        }

        self.dirty = false;
        Ok(true)
    }
}
