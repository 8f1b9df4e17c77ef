/// Shared formatting helpers (durations, action names).
pub mod formatting;
/// Pure parser helpers.
pub mod parse;
/// Shared time helpers.
pub mod time;
