//! Progress reporting and cancellation
//!
//! Readers and writers call the host's progress callback synchronously
//! between steps. Returning [`ControlFlow::Break`] from the callback is the
//! only cancellation mechanism; the operation then unwinds with
//! [`Error::CalculationAborted`].

use crate::error::{Error, Result};
use std::fmt;
use std::ops::ControlFlow;

/// Semantic phase passed alongside the progress fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressPhase {
    /// Opening the ZIP container and reading relationships
    ExtractPackage,
    /// Reading the keystore part
    ReadKeyStore,
    /// Reading model parts other than the root
    ReadNonRootModels,
    /// Reading the root model part
    ReadRootModel,
    /// Reading mesh vertices and triangles
    ReadMesh,
    /// Reading slice stacks
    ReadSlices,
    /// Reading the build section
    ReadBuild,
    /// Reading textures and other attachments
    ReadAttachments,
    /// Serializing model parts
    WriteModels,
    /// Serializing mesh data
    WriteMesh,
    /// Encrypting parts and writing the keystore
    WriteKeyStore,
    /// Writing attachments
    WriteAttachments,
    /// Writing content types and relationships
    WritePackage,
    /// Operation finished
    Done,
}

/// Host progress callback: fraction in `[0, 1]` and the current phase
pub type ProgressCallback = Box<dyn FnMut(f64, ProgressPhase) -> ControlFlow<()> + Send>;

/// Number of mesh elements processed between progress reports
pub const PROGRESS_ELEMENT_INTERVAL: usize = 1024;

/// Tracks progress within a read or write and forwards it to the host
pub struct ProgressMonitor {
    callback: Option<ProgressCallback>,
    range_start: f64,
    range_end: f64,
    counter: usize,
}

impl ProgressMonitor {
    /// Monitor that reports to `callback`
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            range_start: 0.0,
            range_end: 1.0,
            counter: 0,
        }
    }

    /// Restrict subsequent reports to the sub-range `[start, end]` of the overall progress
    pub fn set_range(&mut self, start: f64, end: f64) {
        self.range_start = start.clamp(0.0, 1.0);
        self.range_end = end.clamp(self.range_start, 1.0);
    }

    /// Report `fraction` of the current range
    pub fn report(&mut self, fraction: f64, phase: ProgressPhase) -> Result<()> {
        let Some(callback) = self.callback.as_mut() else {
            return Ok(());
        };
        let value =
            self.range_start + (self.range_end - self.range_start) * fraction.clamp(0.0, 1.0);
        match callback(value, phase) {
            ControlFlow::Continue(()) => Ok(()),
            ControlFlow::Break(()) => {
                tracing::debug!(?phase, value, "progress callback requested abort");
                Err(Error::CalculationAborted)
            }
        }
    }

    /// Count one processed element, reporting every [`PROGRESS_ELEMENT_INTERVAL`] elements
    pub fn tick(&mut self, phase: ProgressPhase) -> Result<()> {
        self.counter += 1;
        if self.counter % PROGRESS_ELEMENT_INTERVAL == 0 {
            self.report(0.5, phase)?;
        }
        Ok(())
    }

    /// Take the callback back out, for reuse by the next operation
    pub fn into_callback(self) -> Option<ProgressCallback> {
        self.callback
    }
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for ProgressMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressMonitor")
            .field("has_callback", &self.callback.is_some())
            .field("range_start", &self.range_start)
            .field("range_end", &self.range_end)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_report_maps_into_range() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut monitor = ProgressMonitor::new(Some(Box::new(move |value, phase| {
            sink.lock().unwrap().push((value, phase));
            ControlFlow::Continue(())
        })));
        monitor.set_range(0.5, 1.0);
        monitor.report(0.5, ProgressPhase::ReadMesh).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!((seen[0].0 - 0.75).abs() < 1e-12);
        assert_eq!(seen[0].1, ProgressPhase::ReadMesh);
    }

    #[test]
    fn test_break_aborts() {
        let mut monitor = ProgressMonitor::new(Some(Box::new(|_, _| ControlFlow::Break(()))));
        let err = monitor.report(0.1, ProgressPhase::WriteModels).unwrap_err();
        assert!(matches!(err, Error::CalculationAborted));
    }

    #[test]
    fn test_tick_reports_on_interval() {
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        let mut monitor = ProgressMonitor::new(Some(Box::new(move |_, _| {
            *sink.lock().unwrap() += 1;
            ControlFlow::Continue(())
        })));
        for _ in 0..(PROGRESS_ELEMENT_INTERVAL * 2 + 3) {
            monitor.tick(ProgressPhase::ReadMesh).unwrap();
        }
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn test_no_callback_is_noop() {
        let mut monitor = ProgressMonitor::default();
        monitor.report(1.0, ProgressPhase::Done).unwrap();
    }
}
