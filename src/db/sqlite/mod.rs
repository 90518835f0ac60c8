mod clients;
mod inbounds;
mod leases;
mod settings;

pub use clients::SqliteClientRepo;
pub use inbounds::SqliteInboundRepo;
pub use leases::SqliteJobLeaseRepo;
pub use settings::SqliteSettingRepo;
