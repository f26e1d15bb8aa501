
// Trigger side: what producers touch.
// Evaluation code flips the event/sync lines through the handle; the
// register keeps only the latest request for the dispatch thread.

pub mod state;
pub mod register;
pub mod handle;
