pub mod image;
pub mod pdf;
pub mod spreadsheet;

pub use image::{import_image_dir, load_image_data_url, match_images, MatchReport};
pub use pdf::extract_pdf_text;
pub use spreadsheet::{detect_columns, import_spreadsheet, import_spreadsheet_bytes, ColumnMap};
