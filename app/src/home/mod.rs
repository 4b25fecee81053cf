pub mod command;

mod client_response;
mod device;
mod preset;
mod scene;

pub use client_response::ClientResponse;
pub use command::{StateKey, TypedDevice};
pub use device::{Device, DeviceType};
pub use preset::Preset;
pub use scene::{Scene, SceneMapping};
