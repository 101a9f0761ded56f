pub mod cache_store;
pub mod http_client;
pub mod remote_client;

use std::sync::Arc;

use crate::app::repository::Repository;
use crate::config::Config;
use crate::error::Result;
use cache_store::FsCacheStore;
use http_client::ReqwestHttp;
use remote_client::CelestrakClient;

/// Wire the production adapters into a repository.
pub fn build_repository(config: &Config) -> Result<Repository> {
    let http = Arc::new(ReqwestHttp::new(config.timeout())?);
    let remote = Arc::new(CelestrakClient::new(
        http,
        config.source.base_url.clone(),
        config.source.user_agent.clone(),
    ));
    let cache = Arc::new(FsCacheStore::new(config.cache.dir.clone()));
    Ok(Repository::new(cache, remote, config.repository_settings()))
}
