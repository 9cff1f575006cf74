// src/config/mod.rs
pub mod leads;

pub use leads::{
    HtmlScrapeConfig, HttpPolicy, KeyedApiConfig, LeadsConfig, ProbePolicy, RatePolicy,
    RegistrySearchConfig, ENV_API_TOKEN, ENV_CONFIG_PATH,
};
