//! Output accumulators and their pending literal queues.
//!
//! Each emitted function builds its output in a named accumulator variable.
//! Values are not appended one statement at a time: they are queued and
//! written as a single `append` (or constructor) call when something forces
//! a flush, such as a control-flow boundary or the end of the function.

use crate::emitter::Emitter;
use crate::error::InternalError;

/// Default constructor for accumulator variables.
pub const DEFAULT_BUFFER_TYPE: &str = "soy.StringBuilder";

#[derive(Debug)]
struct Frame {
    name: String,
    initialized: bool,
    pending: Vec<String>,
}

/// Stack of accumulator frames. The top frame is the active one.
#[derive(Debug)]
pub struct Accumulators {
    buffer_type: String,
    frames: Vec<Frame>,
}

impl Default for Accumulators {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_TYPE)
    }
}

impl Accumulators {
    /// Create an empty stack whose variables are built with `buffer_type`.
    pub fn new(buffer_type: impl Into<String>) -> Self {
        Self {
            buffer_type: buffer_type.into(),
            frames: Vec::new(),
        }
    }

    /// Make `name` the active accumulator: uninitialized, nothing pending.
    pub fn push_frame(&mut self, name: impl Into<String>) {
        self.frames.push(Frame {
            name: name.into(),
            initialized: false,
            pending: Vec::new(),
        });
    }

    /// Discard the active frame. Pending values are not flushed.
    pub fn pop_frame(&mut self) -> Result<(), InternalError> {
        let _frame = self
            .frames
            .pop()
            .ok_or(InternalError::AccumulatorUnderflow)?;
        trace!(
            name = %_frame.name,
            dropped = _frame.pending.len(),
            "pop accumulator"
        );
        Ok(())
    }

    /// Variable name of the active accumulator.
    pub fn current_name(&self) -> Result<&str, InternalError> {
        Ok(&self.top()?.name)
    }

    /// Whether the active accumulator has been declared.
    pub fn is_initialized(&self) -> Result<bool, InternalError> {
        Ok(self.top()?.initialized)
    }

    /// Number of values queued on the active accumulator.
    pub fn pending_len(&self) -> Result<usize, InternalError> {
        Ok(self.top()?.pending.len())
    }

    /// Record that the active accumulator was declared by other means.
    pub fn mark_initialized(&mut self) -> Result<(), InternalError> {
        self.top_mut()?.initialized = true;
        Ok(())
    }

    /// Declare the active accumulator empty unless it already is declared.
    pub fn ensure_initialized(&mut self, out: &mut Emitter) -> Result<(), InternalError> {
        let frame = self.frames.last_mut().ok_or(InternalError::NoAccumulator)?;
        if !frame.initialized {
            out.write_line(&["var ", &frame.name, " = new ", &self.buffer_type, "();"]);
            frame.initialized = true;
        }
        Ok(())
    }

    /// Queue a JavaScript expression for appending to the active accumulator.
    pub fn enqueue(&mut self, expr: impl Into<String>) -> Result<(), InternalError> {
        self.top_mut()?.pending.push(expr.into());
        Ok(())
    }

    /// Write the queued values of the active accumulator as one statement.
    pub fn flush_pending(&mut self, out: &mut Emitter) -> Result<(), InternalError> {
        let frame = self.frames.last_mut().ok_or(InternalError::NoAccumulator)?;
        if frame.pending.is_empty() {
            return Ok(());
        }
        let args = frame.pending.join(", ");
        trace!(name = %frame.name, count = frame.pending.len(), "flush");
        if frame.initialized {
            out.write_line(&[&frame.name, ".append(", &args, ");"]);
        } else {
            out.write_line(&["var ", &frame.name, " = new ", &self.buffer_type, "(", &args, ");"]);
            frame.initialized = true;
        }
        frame.pending.clear();
        Ok(())
    }

    fn top(&self) -> Result<&Frame, InternalError> {
        self.frames.last().ok_or(InternalError::NoAccumulator)
    }

    fn top_mut(&mut self) -> Result<&mut Frame, InternalError> {
        self.frames.last_mut().ok_or(InternalError::NoAccumulator)
    }
}
