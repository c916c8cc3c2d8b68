pub mod ad;
pub mod ad_account;
pub mod ad_group;
pub mod campaign;
pub mod metrics;
pub mod profile;
pub mod sync_log;
pub mod tenant;
