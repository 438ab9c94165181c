pub mod diagnostics;
pub mod error;
pub mod file;
pub mod health;
pub mod messages;
pub mod session;

pub use diagnostics::*;
pub use error::*;
pub use file::*;
pub use health::*;
pub use messages::*;
pub use session::*;
