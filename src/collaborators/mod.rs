//! Pluggable external collaborators (spec.md §1 "out of scope", §6 "external
//! interfaces"). Each is a narrow trait the core dispatcher consumes; the
//! riddle-rules logic, LLM prompt design, statistics schema and access
//! policy live behind these seams and are never implemented here beyond a
//! minimal mock used by the test suite and the `serve` demo — exactly the
//! boundary meshbbs draws around its Meshtastic transport (`meshtastic::`)
//! versus `bbs::` game logic.

pub mod access;
pub mod mock;
pub mod riddle;
pub mod stats;
pub mod templates;
