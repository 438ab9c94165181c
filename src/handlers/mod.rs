pub mod control;
pub mod diagnostics;
pub mod health;
pub mod preview;

pub use control::*;
pub use diagnostics::*;
pub use health::*;
pub use preview::*;
