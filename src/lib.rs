mod client;

pub use virtual_patient_types as types;
pub use client::{connect, connect_with_config, ByteStream, ChatStream, Client, ClientError};
pub use client::config::{Config, ConfigBuilder};
