use std::collections::{BTreeMap, HashMap};

use crate::value::Value;

/// Variables visible while rendering: a stack of frames, globals at the bottom.
/// Loops push a frame so their variables and `set`s do not leak out.
#[derive(Debug)]
pub struct Context {
    frames: Vec<HashMap<String, Value>>,
}

impl Context {
    pub fn new(globals: BTreeMap<String, Value>) -> Self {
        Context {
            frames: vec![globals.into_iter().collect()],
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop_frame(&mut self) {
        // the globals frame stays
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Look up a variable, searching from the innermost frame outward.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Set a variable in the innermost frame.
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }
}
