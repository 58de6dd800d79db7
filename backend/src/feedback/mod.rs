pub mod processor;

pub use processor::{FeedbackError, FeedbackProcessor, FeedbackReceipt, FeedbackSubmission};
