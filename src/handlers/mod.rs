pub mod health;
pub mod doc_errors;
pub mod doc_create;
pub mod doc_get;
pub mod doc_list;
pub mod doc_update;
pub mod doc_delete;
pub mod diagnostics;

pub use health::*;
pub use doc_create::*;
pub use doc_get::*;
pub use doc_list::*;
pub use doc_update::*;
pub use doc_delete::*;
pub use diagnostics::*;
