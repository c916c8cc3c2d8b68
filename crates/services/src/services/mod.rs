pub mod analytics;
pub mod anthropic;
pub mod assistant;
pub mod config;
pub mod integrations;
pub mod oauth;
pub mod periodic_sync;
pub mod platforms;
pub mod reports;
pub mod sync;
pub mod token_manager;
pub mod token_vault;

#[cfg(test)]
pub(crate) mod test_support;
