//! Unit tests for region file formats.
//!
//! These tests read complete `.evr` documents, both hand-written and
//! generated, and check how unreadable files are reported.

mod evr_tests;
