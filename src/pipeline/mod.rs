//! Pipeline stages for moving one inbox file through conversion.
//!
//! Each submodule implements exactly one step and talks to the outside world
//! only through the [`crate::storage::RemoteStorage`] and
//! [`crate::service::ConversionService`] traits, so every stage can be tested
//! against the in-process backends.
//!
//! ## Data Flow
//!
//! ```text
//! scan ──▶ naming ──▶ capability ──▶ job ──▶ retrieve ──▶ place
//! (inbox)  (ext)      (gate)         (poll)  (results)    (folders)
//! ```
//!
//! 1. [`scan`]       — pick the first file of the inbox listing
//! 2. [`naming`]     — split the path into base name and (compound) extension
//! 3. [`capability`] — ask the service whether the target format is reachable
//! 4. [`job`]        — submit and poll until a terminal status, with backoff
//! 5. [`retrieve`]   — download every result file, all-or-nothing
//! 6. [`place`]      — delete-then-write into the converted or unconvertible folder

pub mod capability;
pub mod job;
pub mod naming;
pub mod place;
pub mod retrieve;
pub mod scan;
