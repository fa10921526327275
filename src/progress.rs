//! Progress reporting and cooperative cancellation.
//!
//! Long operations call [`Progress::checkpoint`] before each unit of work
//! (a frame to resample, a label to extract, a reader stage). A checkpoint
//! fails with [`Error::Cancelled`] when the cancellation token was set or
//! the callback asked to stop.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// Callback receiving `(fraction in [0, 1], message)`. Returning `false`
/// cancels the running operation.
pub type ProgressCallback = Box<dyn FnMut(f32, &str) -> bool + Send>;

/// Shared flag the hosting application sets to stop a running pipeline.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress sink combining an optional callback with a cancellation token.
///
/// Reported fractions are mapped into a sub-range so nested operations
/// (parse, then resize) can share one callback.
pub struct Progress<'a> {
    callback: Option<&'a mut (dyn FnMut(f32, &str) -> bool + Send)>,
    cancel: Option<CancellationToken>,
    start: f32,
    span: f32,
}

impl fmt::Debug for Progress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("has_callback", &self.callback.is_some())
            .field("cancel", &self.cancel)
            .field("start", &self.start)
            .field("span", &self.span)
            .finish()
    }
}

impl<'a> Progress<'a> {
    /// A sink that never reports and never cancels.
    pub fn none() -> Self {
        Self {
            callback: None,
            cancel: None,
            start: 0.0,
            span: 1.0,
        }
    }

    pub fn new(callback: &'a mut (dyn FnMut(f32, &str) -> bool + Send)) -> Self {
        Self {
            callback: Some(callback),
            cancel: None,
            start: 0.0,
            span: 1.0,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Borrow this sink for a nested step covering `[from, to]` of the
    /// current range.
    pub fn sub(&mut self, from: f32, to: f32) -> Progress<'_> {
        let start = self.start + self.span * from.clamp(0.0, 1.0);
        let span = self.span * (to.clamp(0.0, 1.0) - from.clamp(0.0, 1.0)).max(0.0);
        let callback: Option<&mut (dyn FnMut(f32, &str) -> bool + Send)> = match &mut self.callback {
            Some(callback) => Some(&mut **callback),
            None => None,
        };
        Progress {
            callback,
            cancel: self.cancel.clone(),
            start,
            span,
        }
    }

    /// Report progress and fail with [`Error::Cancelled`] if the caller
    /// asked to stop.
    pub fn checkpoint(&mut self, fraction: f32, message: &str) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            log::info!("cancelled before: {message}");
            return Err(Error::Cancelled);
        }
        let overall = self.start + self.span * fraction.clamp(0.0, 1.0);
        if let Some(callback) = self.callback.as_deref_mut() {
            if !callback(overall, message) {
                log::info!("cancelled by progress callback at {:.0}%", overall * 100.0);
                return Err(Error::Cancelled);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_cancels_checkpoint() {
        let token = CancellationToken::new();
        let mut progress = Progress::none().with_cancellation(token.clone());
        assert!(progress.checkpoint(0.1, "first").is_ok());
        token.cancel();
        assert!(matches!(progress.checkpoint(0.2, "second"), Err(Error::Cancelled)));
    }

    #[test]
    fn callback_returning_false_cancels() {
        let mut seen = Vec::new();
        let mut callback = |fraction: f32, _: &str| {
            seen.push(fraction);
            fraction < 0.5
        };
        let mut progress = Progress::new(&mut callback);
        assert!(progress.checkpoint(0.25, "a").is_ok());
        assert!(progress.checkpoint(0.75, "b").is_err());
        drop(progress);
        assert_eq!(seen, vec![0.25, 0.75]);
    }

    #[test]
    fn sub_ranges_map_into_parent() {
        let mut seen = Vec::new();
        let mut callback = |fraction: f32, _: &str| {
            seen.push(fraction);
            true
        };
        let mut progress = Progress::new(&mut callback);
        {
            let mut nested = progress.sub(0.5, 1.0);
            nested.checkpoint(0.5, "half of second half").unwrap();
        }
        drop(progress);
        assert_eq!(seen, vec![0.75]);
    }
}
