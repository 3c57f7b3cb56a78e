//! Flat parameter buffers partitioned into named groups.
//!
//! Both the model parameters and their gradients live in a single contiguous
//! `Vec<f64>`; an index table of `(name, offset, len)` entries addresses each
//! group. Iterating the groups in order yields the same layout as the flat
//! buffer itself.
use std::ops::Range;

/// Index entry for one group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupInfo {
    pub name: String,
    pub offset: usize,
    pub len: usize,
}

impl GroupInfo {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterGroups {
    data: Vec<f64>,
    groups: Vec<GroupInfo>,
}

impl ParameterGroups {
    pub fn new() -> ParameterGroups {
        ParameterGroups::default()
    }

    /// Append a zero-filled group and return its index.
    pub fn push_group(&mut self, name: &str, len: usize) -> usize {
        let offset = self.data.len();
        self.data.resize(offset + len, 0.0);
        self.groups.push(GroupInfo {
            name: name.to_string(),
            offset,
            len,
        });
        self.groups.len() - 1
    }

    /// Append a group initialized from `values` and return its index.
    pub fn push_group_from(&mut self, name: &str, values: &[f64]) -> usize {
        let idx = self.push_group(name, values.len());
        self.group_mut(idx).copy_from_slice(values);
        idx
    }

    /// Create a zeroed buffer with the same group layout.
    pub fn zeros_like(&self) -> ParameterGroups {
        ParameterGroups {
            data: vec![0.0; self.data.len()],
            groups: self.groups.clone(),
        }
    }

    /// Total number of scalars across all groups.
    pub fn total_len(&self) -> usize {
        self.data.len()
    }

    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn info(&self) -> &[GroupInfo] {
        &self.groups
    }

    pub fn group(&self, idx: usize) -> &[f64] {
        &self.data[self.groups[idx].range()]
    }

    pub fn group_mut(&mut self, idx: usize) -> &mut [f64] {
        let range = self.groups[idx].range();
        &mut self.data[range]
    }

    /// Look a group up by name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|group| group.name == name)
    }

    /// The whole buffer, groups concatenated in order.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Zero every group in place.
    pub fn zero(&mut self) {
        self.data.iter_mut().for_each(|value| *value = 0.0);
    }
}
