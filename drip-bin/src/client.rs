use crate::options::{Config, HeaderMapExt};
use anyhow::{Context, Result};
use drip_lib::throttle::{
    Algorithm, LeakyBucket, LeakyBucketConfig, Throttle, TokenBucket, TokenBucketConfig,
};
use drip_lib::{
    Clock, Dispatcher, HttpRequester, INDEX_PLACEHOLDER, RequesterBuilder, RunPlan, Target,
    TokioClock,
};
use http::{HeaderMap, Method};
use log::info;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Creates the throttle selected on the command line.
///
/// The desired requests per second serve as the leaky bucket ceiling and as
/// the token bucket refill rate.
pub(crate) fn create_throttle(cfg: &Config, clock: Arc<dyn Clock>) -> Result<Arc<dyn Throttle>> {
    let rate = f64::from(cfg.qps);
    let throttle: Arc<dyn Throttle> = match cfg.algorithm {
        Algorithm::TokenBucket => {
            let config =
                TokenBucketConfig::from_options(rate, cfg.capacity, cfg.cost, cfg.poll_interval);
            Arc::new(TokenBucket::from_config(&config, clock)?)
        }
        _ => {
            let config = LeakyBucketConfig::new(rate);
            Arc::new(LeakyBucket::from_config(&config, clock)?)
        }
    };
    Ok(throttle)
}

/// Creates a requester according to the command-line config
pub(crate) fn create_requester(cfg: &Config) -> Result<HttpRequester> {
    let method = Method::from_str(&cfg.method.to_uppercase())
        .with_context(|| format!("Invalid request method `{}`", cfg.method))?;
    let headers = HeaderMap::from_header_pairs(&cfg.header)?;

    RequesterBuilder::builder()
        .user_agent(cfg.user_agent.clone())
        .allow_insecure(cfg.insecure)
        .custom_headers(headers)
        .method(method)
        .timeout(Duration::from_secs(cfg.timeout as u64))
        .build()
        .requester()
        .context("Failed to create request client")
}

/// Creates the dispatcher and the plan it runs.
///
/// Every error returned here is a configuration problem; nothing has been
/// sent yet.
pub(crate) fn create(url: &str, cfg: &Config) -> Result<(Dispatcher, RunPlan)> {
    let target = Target::new(url)?;
    if !target.is_template() {
        info!(
            "Target `{}` has no `{INDEX_PLACEHOLDER}` placeholder, every request goes to the same URL",
            target.as_str()
        );
    }
    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let throttle = create_throttle(cfg, Arc::clone(&clock))?;
    let requester = Arc::new(create_requester(cfg)?);

    let dispatcher = Dispatcher::with_clock(throttle, requester, clock);
    Ok((dispatcher, RunPlan::new(target, cfg.qps, cfg.iterations)))
}
