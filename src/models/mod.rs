mod client;
mod inbound;

pub use client::*;
pub use inbound::*;
