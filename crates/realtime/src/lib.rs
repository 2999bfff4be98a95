mod client;

pub use pitwall_realtime_types as types;

pub use client::config::Config;
pub use client::stats::Stats;
pub use client::{connect, connect_with_config, Client, ClientError, ClientTx, ServerRx};
