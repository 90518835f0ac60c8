mod clients;
mod inbounds;
mod leases;
mod settings;

pub use clients::PostgresClientRepo;
pub use inbounds::PostgresInboundRepo;
pub use leases::PostgresJobLeaseRepo;
pub use settings::PostgresSettingRepo;
