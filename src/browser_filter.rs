use std::borrow::Cow;
use std::time::Duration;

use tracing::{debug, trace};

use crate::cache::{Cache, CacheEntry};
use crate::client::{ClientIdentity, UserAgentParser};
use crate::dsl;
use crate::error::{BoxError, Error, Result};
use crate::matcher::{self, FilterKind};
use crate::rules::RuleSet;
use crate::settings::FilterSettings;

/// Request-side collaborators the filter needs from the host framework.
///
/// `was_redirected` reads the one-request flag that `mark_redirected` set
/// when the previous response was a redirect (session flash data in most
/// hosts). It is what keeps the redirect target page reachable.
pub trait FilterRequest {
    fn user_agent(&self) -> &str;
    fn path(&self) -> &str;
    fn was_redirected(&self) -> bool;
    fn mark_redirected(&mut self);
}

/// Boundary to the host's route resolver: turns a route name into whatever
/// the host uses as a redirect response.
pub trait Redirector {
    type Response;

    fn route(&self, name: &str) -> std::result::Result<Self::Response, BoxError>;
}

impl<T: Redirector + ?Sized> Redirector for &T {
    type Response = T::Response;

    fn route(&self, name: &str) -> std::result::Result<Self::Response, BoxError> {
        (**self).route(name)
    }
}

/// Where a filter's rules come from.
#[derive(Debug, Clone)]
pub enum RuleSource {
    /// Rules provided directly.
    Literal(RuleSet),
    /// A filter string, parsed on demand and memoized in the cache.
    Dsl(String),
    /// The rules carried by the filter's settings.
    Settings,
}

/// How the key for a cached verdict is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKeyStrategy {
    /// `device:browser:version`.
    Client,
    /// The client key extended with the filter kind and a hash of the
    /// request path, isolating per-route filters from each other.
    PerRoute,
    /// The client key prefixed with a hash of the rules, so edited rules
    /// never replay stale verdicts.
    RulesFingerprint,
}

/// Redirecting request filter.
///
/// Decides per request whether the client's device family, browser family
/// and browser version let it through to the inner handler or send it to a
/// named route, and caches each verdict. A `block` filter redirects the
/// clients its rules match; an `allow` filter redirects everyone else.
pub struct BrowserFilter<P, C, R> {
    parser: P,
    cache: C,
    redirector: R,
    settings: FilterSettings,
    kind: Option<FilterKind>,
    source: RuleSource,
    key_strategy: CacheKeyStrategy,
}

impl<P, C, R> BrowserFilter<P, C, R> {
    /// Settings-driven filter: rules, polarity and redirect route all come
    /// from `settings`. Verdict keys are fingerprinted against the rules so
    /// publishing different rules starts from a clean slate.
    pub fn new(parser: P, cache: C, redirector: R, settings: FilterSettings) -> Self {
        let kind = settings.kind;
        Self {
            parser,
            cache,
            redirector,
            settings,
            kind,
            source: RuleSource::Settings,
            key_strategy: CacheKeyStrategy::RulesFingerprint,
        }
    }

    /// Route filter that redirects the clients its rules match. Rules are
    /// usually supplied per invocation via [`Self::handle_with`].
    pub fn block(parser: P, cache: C, redirector: R, settings: FilterSettings) -> Self {
        Self {
            kind: Some(FilterKind::Block),
            key_strategy: CacheKeyStrategy::PerRoute,
            ..Self::new(parser, cache, redirector, settings)
        }
    }

    /// Route filter that redirects every client its rules do not match.
    pub fn allow(parser: P, cache: C, redirector: R, settings: FilterSettings) -> Self {
        Self {
            kind: Some(FilterKind::Allow),
            key_strategy: CacheKeyStrategy::PerRoute,
            ..Self::new(parser, cache, redirector, settings)
        }
    }

    pub fn with_rules(mut self, source: RuleSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_kind(mut self, kind: FilterKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_cache_key_strategy(mut self, strategy: CacheKeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    /// The filter's polarity, or [`Error::FilterKindNotSet`] when neither
    /// the constructor nor the settings established one.
    pub fn kind(&self) -> Result<FilterKind> {
        self.kind.ok_or(Error::FilterKindNotSet)
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.settings.timeout)
    }
}

impl<P, C, R> BrowserFilter<P, C, R>
where
    P: UserAgentParser,
    C: Cache,
    R: Redirector,
{
    /// Runs the filter for one request.
    ///
    /// Requests already redirected here pass straight through. Otherwise a
    /// cached verdict or a fresh rule evaluation decides between the inner
    /// handler and a redirect; fresh verdicts are stored for the configured
    /// timeout.
    pub fn handle<Req, Next>(&self, request: Req, next: Next) -> Result<R::Response>
    where
        Req: FilterRequest,
        Next: FnOnce(Req) -> R::Response,
    {
        self.handle_with(request, next, None, None)
    }

    /// [`Self::handle`] with per-invocation overrides for the rule source
    /// and the redirect route, the way route middleware parameters supply
    /// them.
    pub fn handle_with<Req, Next>(
        &self,
        request: Req,
        next: Next,
        rules: Option<&RuleSource>,
        redirect_route: Option<&str>,
    ) -> Result<R::Response>
    where
        Req: FilterRequest,
        Next: FnOnce(Req) -> R::Response,
    {
        let route = redirect_route.unwrap_or(&self.settings.route);

        if request.was_redirected() || request.path() == route {
            trace!(path = request.path(), "already redirected, passing through");
            return Ok(next(request));
        }

        let rules = self.resolve_rules(rules)?;
        let client = self.parser.parse(request.user_agent());
        let key = self.cache_key(&client, request.path(), &rules)?;

        match self.cache.get(&key).map_err(Error::Cache)? {
            Some(CacheEntry::NotBlocked) => {
                trace!(%key, "cached as not blocked");
                Ok(next(request))
            }
            Some(CacheEntry::RedirectTo(cached_route)) => {
                trace!(%key, route = %cached_route, "cached as redirected");
                self.emit_redirect(request, &cached_route)
            }
            Some(CacheEntry::Rules(_)) | None => {
                let matched = matcher::is_matched(&rules, &client);
                let redirect = self.kind()?.needs_redirect(matched);
                let entry = if redirect {
                    CacheEntry::RedirectTo(route.to_string())
                } else {
                    CacheEntry::NotBlocked
                };
                self.cache
                    .put(&key, entry, self.cache_ttl())
                    .map_err(Error::Cache)?;
                debug!(%key, matched, redirect, "evaluated filter rules");
                if redirect {
                    self.emit_redirect(request, route)
                } else {
                    Ok(next(request))
                }
            }
        }
    }

    fn emit_redirect<Req>(&self, mut request: Req, route: &str) -> Result<R::Response>
    where
        Req: FilterRequest,
    {
        request.mark_redirected();
        self.redirector
            .route(route)
            .map_err(|source| Error::Redirect(route.to_string(), source))
    }

    fn resolve_rules<'a>(
        &'a self,
        source_override: Option<&'a RuleSource>,
    ) -> Result<Cow<'a, RuleSet>> {
        match source_override.unwrap_or(&self.source) {
            RuleSource::Literal(rules) => Ok(Cow::Borrowed(rules)),
            RuleSource::Settings => Ok(Cow::Borrowed(&self.settings.rules)),
            RuleSource::Dsl(filter_string) => self.parse_memoized(filter_string).map(Cow::Owned),
        }
    }

    /// Parses a filter string, memoizing the result in the cache under a
    /// hash of the string. Empty strings mean no rules and are not cached.
    fn parse_memoized(&self, filter_string: &str) -> Result<RuleSet> {
        if filter_string.is_empty() {
            return Ok(RuleSet::new());
        }
        let key = format!("filter_string:{:x}", md5::compute(filter_string));
        if let Some(CacheEntry::Rules(rules)) = self.cache.get(&key).map_err(Error::Cache)? {
            if !rules.is_empty() {
                trace!(%key, "reusing memoized filter string");
                return Ok(rules);
            }
        }
        let rules = dsl::parse_filter_string(filter_string)?;
        self.cache
            .put(&key, CacheEntry::Rules(rules.clone()), self.cache_ttl())
            .map_err(Error::Cache)?;
        debug!(%key, devices = rules.len(), "parsed and memoized filter string");
        Ok(rules)
    }

    fn cache_key(&self, client: &ClientIdentity, path: &str, rules: &RuleSet) -> Result<String> {
        let base = format!(
            "{}:{}:{}",
            client.device_family, client.browser_family, client.browser_version
        );
        match self.key_strategy {
            CacheKeyStrategy::Client => Ok(base),
            CacheKeyStrategy::PerRoute => Ok(format!(
                "{base}:{}:{:x}",
                self.kind()?,
                md5::compute(path)
            )),
            CacheKeyStrategy::RulesFingerprint => {
                let fingerprint = md5::compute(serde_yaml::to_string(rules)?);
                Ok(format!("{fingerprint:x}:{base}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BrowserFilter, CacheKeyStrategy, FilterRequest, Redirector};
    use crate::cache::MemoryCache;
    use crate::client::{ClientIdentity, UserAgentParser};
    use crate::error::{BoxError, Error};
    use crate::matcher::FilterKind;
    use crate::rules::RuleSet;
    use crate::settings::FilterSettings;

    struct EchoParser;

    impl UserAgentParser for EchoParser {
        fn parse(&self, user_agent: &str) -> ClientIdentity {
            let mut parts = user_agent.splitn(3, ' ');
            ClientIdentity::new(
                parts.next().unwrap_or("Other"),
                parts.next().unwrap_or("Other"),
                parts.next().unwrap_or(""),
            )
        }
    }

    struct NamingRedirector;

    impl Redirector for NamingRedirector {
        type Response = String;

        fn route(&self, name: &str) -> Result<String, BoxError> {
            Ok(format!("redirect:{name}"))
        }
    }

    struct Request {
        user_agent: String,
        path: String,
        redirected: bool,
    }

    impl FilterRequest for Request {
        fn user_agent(&self) -> &str {
            &self.user_agent
        }

        fn path(&self) -> &str {
            &self.path
        }

        fn was_redirected(&self) -> bool {
            self.redirected
        }

        fn mark_redirected(&mut self) {
            self.redirected = true;
        }
    }

    fn filter(
        strategy: CacheKeyStrategy,
    ) -> BrowserFilter<EchoParser, MemoryCache, NamingRedirector> {
        BrowserFilter::block(
            EchoParser,
            MemoryCache::new(),
            NamingRedirector,
            FilterSettings::default(),
        )
        .with_cache_key_strategy(strategy)
    }

    #[test]
    fn the_client_key_is_the_identity_triple() {
        let filter = filter(CacheKeyStrategy::Client);
        let client = ClientIdentity::new("Tablet", "Safari", "9.0");
        let key = filter.cache_key(&client, "some/path", &RuleSet::new()).unwrap();
        assert_eq!(key, "Tablet:Safari:9.0");
    }

    #[test]
    fn the_per_route_key_appends_kind_and_path_hash() {
        let filter = filter(CacheKeyStrategy::PerRoute);
        let client = ClientIdentity::new("Tablet", "Safari", "9.0");
        let key = filter.cache_key(&client, "admin/reports", &RuleSet::new()).unwrap();
        assert_eq!(
            key,
            format!("Tablet:Safari:9.0:block:{:x}", md5::compute("admin/reports"))
        );
    }

    #[test]
    fn the_fingerprint_key_changes_with_the_rules() {
        let filter = filter(CacheKeyStrategy::RulesFingerprint);
        let client = ClientIdentity::new("Tablet", "Safari", "9.0");
        let empty = filter.cache_key(&client, "p", &RuleSet::new()).unwrap();
        let mut rules = RuleSet::new();
        rules.set_device_wildcard("Tablet");
        let fingerprinted = filter.cache_key(&client, "p", &rules).unwrap();
        assert_ne!(empty, fingerprinted);
        assert!(empty.ends_with(":Tablet:Safari:9.0"));
    }

    #[test]
    fn a_per_route_key_needs_a_filter_kind() {
        let filter = BrowserFilter::new(
            EchoParser,
            MemoryCache::new(),
            NamingRedirector,
            FilterSettings::default(),
        )
        .with_cache_key_strategy(CacheKeyStrategy::PerRoute);
        let client = ClientIdentity::new("Tablet", "Safari", "9.0");
        assert!(matches!(
            filter.cache_key(&client, "p", &RuleSet::new()),
            Err(Error::FilterKindNotSet)
        ));

        let filter = filter.with_kind(FilterKind::Allow);
        let key = filter.cache_key(&client, "p", &RuleSet::new()).unwrap();
        assert!(key.contains(":allow:"), "unexpected key: {key}");
    }

    #[test]
    fn requests_on_the_redirect_route_pass_through() {
        let filter = filter(CacheKeyStrategy::Client);
        let request = Request {
            user_agent: "Tablet Safari 9.0".into(),
            path: "incompatible_browser".into(),
            redirected: false,
        };
        let response = filter
            .handle_with(
                request,
                |_| String::from("inner"),
                Some(&super::RuleSource::Dsl("Tablet".into())),
                None,
            )
            .unwrap();
        assert_eq!(response, "inner");
    }
}
