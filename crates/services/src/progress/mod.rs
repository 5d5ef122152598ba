//! Remote document and exam progress.

mod document;
mod exam;

pub use document::DocumentProgressService;
pub use exam::ExamProgressService;
