pub mod request;
pub mod table;
pub mod text;

pub use request::{parse_batch_request, read_batch_request, BatchRequest, RequestError};
pub use table::{write_csv, write_json};
