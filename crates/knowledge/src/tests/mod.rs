//! Cross-module tests of the record store to index synchronization.

mod flaky_index;
