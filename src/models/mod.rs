pub mod loaders;
pub mod row;
pub mod session;

pub use loaders::{
    extract_pdf_text, import_image_dir, import_spreadsheet, import_spreadsheet_bytes,
    load_image_data_url, match_images, MatchReport,
};
pub use row::{CaptionRow, RowStatus};
pub use session::{Session, SessionStats};
