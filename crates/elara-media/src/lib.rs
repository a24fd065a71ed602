pub mod pdf;

pub use pdf::{EXPORT_FILENAME, render as render_pdf};
