//! # Group Allocator
//!
//! Hands out dispatch groups for steps that could not inherit one from
//! their workflow tree, rotating through the configured partitions so
//! fresh workflows spread evenly across worker pools.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Fallback partition when no groups are configured
pub const DEFAULT_GROUP: &str = "default";

#[derive(Debug)]
pub struct GroupAllocator {
    groups: Vec<String>,
    cursor: AtomicUsize,
}

impl GroupAllocator {
    pub fn new(groups: Vec<String>) -> Self {
        let groups = if groups.is_empty() {
            vec![DEFAULT_GROUP.to_string()]
        } else {
            groups
        };

        Self {
            groups,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next group in rotation
    pub fn next(&self) -> String {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.groups.len();
        self.groups[index].clone()
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }
}
