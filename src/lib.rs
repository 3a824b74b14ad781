mod browser_filter;
mod cache;
mod client;
mod dsl;
mod error;
mod matcher;
mod rules;
mod settings;
mod version;

pub use browser_filter::{BrowserFilter, CacheKeyStrategy, FilterRequest, Redirector, RuleSource};
pub use cache::{Cache, CacheEntry, MemoryCache};
pub use client::{ClientIdentity, UserAgentParser};
pub use dsl::parse_filter_string;
pub use error::{BoxError, Error, Result};
pub use matcher::{is_matched, matches_browser, matches_browser_version, matches_device, FilterKind};
pub use rules::{BrowserRule, DeviceRule, Operator, RuleSet};
pub use settings::FilterSettings;
