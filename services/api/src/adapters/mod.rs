pub mod clerk;
pub mod clipdrop;
pub mod cloudinary;
pub mod db;
pub mod http;
pub mod pdf;
pub mod text_llm;

pub use clerk::ClerkAdapter;
pub use clipdrop::ClipdropImageAdapter;
pub use cloudinary::CloudinaryAdapter;
pub use db::DbAdapter;
pub use pdf::PdfTextExtractor;
pub use text_llm::OpenAiTextAdapter;
