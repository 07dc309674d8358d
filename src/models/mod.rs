pub mod document;
pub mod identity;
pub mod messages;
pub mod health;
pub mod ready;
pub mod doc_delete;
pub mod diagnostics;
pub mod error;

pub use document::*;
pub use identity::*;
pub use messages::*;
pub use health::*;
pub use ready::*;
pub use doc_delete::*;
pub use diagnostics::*;
pub use error::*;
