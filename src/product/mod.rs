pub mod mapping;
pub mod models;

pub use mapping::{clean_list, draft_from_generated};
pub use models::GeneratedProduct;
