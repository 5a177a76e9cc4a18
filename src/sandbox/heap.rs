//! Accounting of data held by live script variables.

use std::collections::HashSet;

use rhai::{Dynamic, Scope};

const SLOT_SIZE: usize = std::mem::size_of::<Dynamic>();

/// Approximate bytes held by script variables, tracked per call frame.
///
/// Script function calls run in a fresh scope, so each call level is measured
/// separately and the levels are summed. A string buffer shared between
/// variables is counted once, including across levels.
#[derive(Debug, Default, Clone)]
pub(crate) struct HeapUsage {
    frames: Vec<Frame>,
}

#[derive(Debug, Default, Clone)]
struct Frame {
    bytes: usize,
    strings: HashSet<usize>,
}

impl HeapUsage {
    /// Re-measures the frame at call `level` from `scope` and returns the
    /// total across all live frames. Deeper frames have returned and are
    /// dropped.
    pub fn measure(&mut self, level: usize, scope: &Scope<'_>) -> usize {
        self.frames.truncate(level);
        self.frames.resize_with(level, Frame::default);

        let mut frame = Frame::default();
        {
            let outer: Vec<&HashSet<usize>> = self.frames.iter().map(|f| &f.strings).collect();
            for (_, _, value) in scope.iter_raw() {
                frame.bytes += SLOT_SIZE + data_size(value, &outer, &mut frame.strings);
            }
        }
        self.frames.push(frame);

        self.frames.iter().map(|f| f.bytes).sum()
    }
}

fn data_size(value: &Dynamic, outer: &[&HashSet<usize>], own: &mut HashSet<usize>) -> usize {
    if let Ok(text) = value.as_immutable_string_ref() {
        let addr = text.as_str().as_ptr() as usize;
        let counted = outer.iter().any(|strings| strings.contains(&addr));
        return if !counted && own.insert(addr) {
            text.len()
        } else {
            0
        };
    }
    if let Ok(array) = value.as_array_ref() {
        return array
            .iter()
            .map(|item| SLOT_SIZE + data_size(item, outer, own))
            .sum();
    }
    if let Ok(map) = value.as_map_ref() {
        return map
            .iter()
            .map(|(key, item)| key.len() + SLOT_SIZE + data_size(item, outer, own))
            .sum();
    }
    if let Ok(blob) = value.as_blob_ref() {
        return blob.len();
    }
    0
}
