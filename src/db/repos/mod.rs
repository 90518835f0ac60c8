mod clients;
mod inbounds;
mod leases;
mod settings;

pub use clients::*;
pub use inbounds::*;
pub use leases::*;
pub use settings::*;
