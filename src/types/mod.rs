mod category;
mod period;
mod record;

pub use category::Category;
pub use period::Period;
pub use record::{suggested_name, RemoteFile, ValidatedFile};

pub(crate) use record::file_name_of;
