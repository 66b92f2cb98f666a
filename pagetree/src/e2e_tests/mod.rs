//! End-to-end tests at the tree API level.
//!
//! Each test file covers a specific scenario, driving a tree through its
//! public operations over a real store and checking what comes back.

#![cfg(test)]

mod helpers;

mod test_absent_remove;
mod test_compressed_trees;
mod test_entry_count_model;
mod test_legacy_records;
mod test_ordering;
mod test_overwrite;
mod test_reload_file_store;
mod test_reverse_order;
mod test_storage_faults;
mod test_tree_shape;
