pub mod control_client;

pub use control_client::{ClientError, ControlClient};
