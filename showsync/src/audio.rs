//! Soundtrack playback alongside the show clock.
//!
//! Audio is a side effect of `start`/`stop`, never a precondition: a missing
//! file or a player that will not launch is reported to the caller while the
//! show clock and its broadcasts carry on.

use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::config::AudioConfig;
use crate::trace::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio file not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("failed to launch audio player `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Plays the soundtrack from a given offset.
pub trait AudioPlayer: Send + Sync {
    /// Starts playback `offset_secs` into the track, replacing anything
    /// already playing.
    ///
    /// # Errors
    ///
    /// See [`AudioError`].
    fn play_from(&self, offset_secs: u64) -> Result<(), AudioError>;

    /// Stops playback. A no-op when nothing plays.
    fn stop(&self);
}

/// No soundtrack.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl AudioPlayer for Silent {
    fn play_from(&self, _offset_secs: u64) -> Result<(), AudioError> {
        Ok(())
    }

    fn stop(&self) {}
}

/// Runs an external player process per start.
pub struct ProcessPlayer {
    config: AudioConfig,
    child: Mutex<Option<Child>>,
}

impl ProcessPlayer {
    #[must_use]
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
        }
    }

    /// Player arguments with the placeholders filled in.
    fn args(&self, offset_secs: u64) -> Vec<String> {
        let offset = offset_secs.to_string();
        let file = self.config.file.to_string_lossy();
        self.config
            .args
            .iter()
            .map(|arg| arg.replace("{offset}", &offset).replace("{file}", &file))
            .collect()
    }

    fn kill(child: &mut Child) {
        // The player may have exited on its own at end of track.
        if let Err(_e) = child.kill() {
            debug!(error = %_e, "audio player already gone");
        }
        let _ = child.wait();
    }
}

impl AudioPlayer for ProcessPlayer {
    fn play_from(&self, offset_secs: u64) -> Result<(), AudioError> {
        if !self.config.file.exists() {
            warn!(file = %self.config.file.display(), "audio file missing");
            return Err(AudioError::MissingFile(self.config.file.clone()));
        }

        let mut slot = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut previous) = slot.take() {
            Self::kill(&mut previous);
        }

        let child = Command::new(&self.config.program)
            .args(self.args(offset_secs))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| AudioError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;
        info!(pid = child.id(), offset_secs, "audio started");
        *slot = Some(child);
        Ok(())
    }

    fn stop(&self) {
        let mut slot = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut child) = slot.take() {
            Self::kill(&mut child);
            info!("audio stopped");
        }
    }
}

impl Drop for ProcessPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}
