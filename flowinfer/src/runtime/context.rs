//! Loop frame bookkeeping for one execution call.
use std::collections::HashMap;

use anyhow::Result;

use crate::error::ExecError;
use crate::runtime::tensor_array::TensorArray;

/// One activation of a loop body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u32,
    pub name: String,
    pub iteration: u32,
}

impl Frame {
    fn root() -> Self {
        Self {
            id: 0,
            name: String::new(),
            iteration: 0,
        }
    }

    fn is_root(&self) -> bool {
        self.id == 0 && self.iteration == 0
    }

    fn segment(&self) -> String {
        format!("{}-{}", self.name, self.iteration)
    }
}

/// The active frame stack plus the indexed arrays created during the call.
///
/// The root frame is always present. Context ids render the non-root frames
/// as `name-iteration` joined by `/`, so the root context id is `""`.
#[derive(Debug)]
pub struct ExecutionContext {
    frames: Vec<Frame>,
    last_id: u32,
    context_ids: Vec<String>,
    arrays: HashMap<i32, TensorArray>,
    next_array: i32,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::root()],
            last_id: 0,
            context_ids: vec![String::new()],
            arrays: HashMap::new(),
            next_array: 0,
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Activate a frame stack captured earlier with [`Self::frames`]. An
    /// empty stack resets to the root frame.
    pub fn set_frames(&mut self, mut frames: Vec<Frame>) {
        if frames.is_empty() {
            frames.push(Frame::root());
        }
        if self.frames != frames {
            self.frames = frames;
            self.refresh_ids();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    pub fn current_context_id(&self) -> &str {
        &self.context_ids[0]
    }

    /// Context ids from the innermost frame outwards, always ending in `""`.
    pub fn current_context_ids(&self) -> &[String] {
        &self.context_ids
    }

    pub fn enter_frame(&mut self, name: &str) {
        self.last_id += 1;
        self.frames.push(Frame {
            id: self.last_id,
            name: name.to_string(),
            iteration: 0,
        });
        self.refresh_ids();
    }

    pub fn exit_frame(&mut self) -> Result<()> {
        if self.frames.len() <= 1 {
            return Err(ExecError::EmptyContextStack {
                op: "Exit".to_string(),
            }
            .into());
        }
        self.frames.pop();
        self.refresh_ids();
        Ok(())
    }

    /// Advance the innermost frame. The frame receives a fresh id.
    pub fn next_iteration(&mut self) -> Result<()> {
        if self.frames.len() <= 1 {
            return Err(ExecError::EmptyContextStack {
                op: "NextIteration".to_string(),
            }
            .into());
        }
        self.last_id += 1;
        let id = self.last_id;
        if let Some(frame) = self.frames.last_mut() {
            frame.iteration += 1;
            frame.id = id;
        }
        self.refresh_ids();
        Ok(())
    }

    fn refresh_ids(&mut self) {
        let segments: Vec<String> = self
            .frames
            .iter()
            .filter(|frame| !frame.is_root())
            .map(Frame::segment)
            .collect();
        self.context_ids = (1..=segments.len())
            .rev()
            .map(|len| segments[..len].join("/"))
            .collect();
        self.context_ids.push(String::new());
    }

    /// Register an array and return the handle value stored in its id tensor.
    pub(crate) fn add_array(&mut self, array: TensorArray) -> i32 {
        let handle = self.next_array;
        self.next_array += 1;
        self.arrays.insert(handle, array);
        handle
    }

    pub(crate) fn array_mut(&mut self, handle: i32) -> Result<&mut TensorArray> {
        self.arrays
            .get_mut(&handle)
            .ok_or_else(|| ExecError::array(&handle.to_string(), "no such array").into())
    }

    /// Release every array slot. Called once the owning execution ends.
    pub(crate) fn release_arrays(&mut self) {
        for (_, mut array) in self.arrays.drain() {
            array.clear_and_close();
        }
    }
}
