use tracing::{error, warn};

use crate::{
    backend::{Backend, types::Row},
    csv::{CommitMode, import::LineFailure, tokenizer::Line},
    error::{Error, Result},
};

/// Transaction state of an import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    NoTx,
    Active,
    /// The current line failed under LINE_COMMIT; cleared before the next line
    LineFailed,
    /// A line failed under FILE_COMMIT; terminal
    FileFailed,
}

/// Places transaction boundaries around row inserts
///
/// LINE_COMMIT wraps every data line in its own transaction and skips
/// failed lines. FILE_COMMIT opens one transaction on the first data line
/// and gives up on the first failure, rolling everything back.
pub struct CommitController {
    mode: CommitMode,
    state: TxState,
    attempted: u64,
    succeeded: u64,
    failed: u64,
    failures: Vec<LineFailure>,
}

impl CommitController {
    pub fn new(mode: CommitMode) -> Self {
        Self {
            mode,
            state: TxState::NoTx,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn attempted(&self) -> u64 {
        self.attempted
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Handles one data line. `failure` is set when building the row
    /// already failed, in which case nothing is inserted.
    ///
    /// Returns an error only when the whole import has to stop.
    pub fn line<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        table: &str,
        line: &Line,
        row: &Row,
        failure: Option<LineFailure>,
    ) -> Result<()> {
        if self.state == TxState::FileFailed {
            return Err(Error::Internal(
                "line processed after the import was aborted".to_string(),
            ));
        }
        self.attempted += 1;

        let result = match failure {
            Some(failure) => Err(failure),
            None => self.insert(backend, table, line, row),
        };
        let result = match (self.mode, result) {
            (CommitMode::LineCommit, Ok(())) => match backend.commit() {
                Ok(()) => {
                    self.state = TxState::NoTx;
                    Ok(())
                }
                Err(err) => Err(LineFailure::new(
                    line,
                    format!("unable to commit transaction: {}", err),
                )),
            },
            (CommitMode::FileCommit, Ok(())) => Ok(()),
            (_, Err(failure)) => Err(failure),
        };

        match result {
            Ok(()) => {
                self.succeeded += 1;
                Ok(())
            }
            Err(failure) => self.fail(backend, failure),
        }
    }

    fn insert<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        table: &str,
        line: &Line,
        row: &Row,
    ) -> std::result::Result<(), LineFailure> {
        if self.state == TxState::NoTx {
            backend.begin().map_err(|err| {
                LineFailure::new(line, format!("unable to start transaction: {}", err))
            })?;
            self.state = TxState::Active;
        }
        backend
            .insert(table, row)
            .map_err(|err| LineFailure::new(line, err.to_string()))
    }

    fn fail<B: Backend + ?Sized>(&mut self, backend: &mut B, failure: LineFailure) -> Result<()> {
        let had_tx = self.state == TxState::Active;
        self.failed += 1;
        match self.mode {
            CommitMode::LineCommit => {
                self.state = TxState::LineFailed;
                warn!(
                    line = failure.line,
                    field = ?failure.field,
                    offset = failure.offset,
                    "skipping line: {}",
                    failure
                );
                if had_tx {
                    Self::abort(backend);
                }
                // The next line might be more successful.
                backend.clear_error();
                self.failures.push(failure);
                self.state = TxState::NoTx;
                Ok(())
            }
            CommitMode::FileCommit => {
                self.state = TxState::FileFailed;
                warn!(
                    line = failure.line,
                    field = ?failure.field,
                    offset = failure.offset,
                    "cancelling import: {}",
                    failure
                );
                if had_tx {
                    Self::abort(backend);
                }
                backend.clear_error();
                let err = Error::Aborted {
                    line: failure.line,
                    message: failure.to_string(),
                };
                self.failures.push(failure);
                Err(err)
            }
        }
    }

    /// Commits the FILE_COMMIT transaction once the input is exhausted
    pub fn finish<B: Backend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        if self.state != TxState::Active {
            return Ok(());
        }
        match backend.commit() {
            Ok(()) => {
                self.state = TxState::NoTx;
                Ok(())
            }
            Err(err) => {
                self.release(backend);
                Err(err)
            }
        }
    }

    /// Aborts an open transaction, e.g. when the import stops early
    pub fn release<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        if self.state == TxState::Active {
            Self::abort(backend);
            backend.clear_error();
            self.state = TxState::NoTx;
        }
    }

    fn abort<B: Backend + ?Sized>(backend: &mut B) {
        if let Err(err) = backend.abort() {
            error!("unable to abort transaction: {}", err);
        }
    }

    /// Hands out the failures recorded so far
    pub fn take_failures(&mut self) -> Vec<LineFailure> {
        std::mem::take(&mut self.failures)
    }
}
