//! Deployment settings resolved from the process environment
//!
//! These are the values a hosting platform sets (Render, Railway, a plain
//! systemd unit): the signing key, the debug switch, the host allow-list, which
//! database to use, and which browser origins may call the API. Resolution is
//! a pure function of an [`EnvSource`], so tests drive it with a map instead of
//! mutating the process environment.
//!
//! Flags follow one rule: a flag is on only when its value is exactly `True`.

use http::{HeaderName, HeaderValue, Method};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::{sanitize_url, Error, Result};

/// Development signing key used when `SECRET_KEY` is unset
pub const INSECURE_SECRET_KEY: &str = "insecure-development-secret-key-change-in-production";

/// Origins of the local frontend dev servers
pub const DEFAULT_CORS_ORIGINS: [&str; 4] = [
    "http://localhost:5173",
    "http://localhost:3000",
    "http://127.0.0.1:5173",
    "http://127.0.0.1:3000",
];

/// SQLite file name under the base directory
pub const SQLITE_FILE_NAME: &str = "db.sqlite3";

/// Connection lifetime for the `DATABASE_URL` branch
pub const URL_CONN_MAX_AGE: Duration = Duration::from_secs(600);

/// HSTS max-age sent when debug is off (one year)
pub const HSTS_SECONDS: u64 = 31_536_000;

const MIN_SECRET_KEY_LENGTH: usize = 50;

/// Read access to environment variables
pub trait EnvSource {
    /// Raw value of `key`, `None` when unset
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl EnvSource for [(&str, &str)] {
    fn var(&self, key: &str) -> Option<String> {
        self.iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| (*value).to_string())
    }
}

impl<const N: usize> EnvSource for [(&str, &str); N] {
    fn var(&self, key: &str) -> Option<String> {
        self.as_slice().var(key)
    }
}

fn flag<E: EnvSource + ?Sized>(env: &E, key: &str, default: bool) -> bool {
    match env.var(key) {
        Some(value) => value == "True",
        None => default,
    }
}

/// Comma-separated list; entries trimmed, empties dropped
fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Set and non-empty; a blank value still counts as set
fn non_empty<E: EnvSource + ?Sized>(env: &E, key: &str) -> Option<String> {
    env.var(key).filter(|value| !value.is_empty())
}

// ============================================================================
// Secret key
// ============================================================================

/// The HMAC signing key; never printed
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    /// Wrap a key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key bytes for signing
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// True for the built-in development key
    pub fn is_insecure_default(&self) -> bool {
        self.0 == INSECURE_SECRET_KEY
    }

    /// True when too short or too repetitive to be a production key
    pub fn is_weak(&self) -> bool {
        let mut distinct: Vec<char> = self.0.chars().collect();
        distinct.sort_unstable();
        distinct.dedup();
        self.0.chars().count() < MIN_SECRET_KEY_LENGTH || distinct.len() < 5
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

// ============================================================================
// Allowed hosts
// ============================================================================

static HOST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9.-]+|\[[a-f0-9]*:[a-f0-9.:]+\])(:[0-9]+)?$")
        .expect("host regex is valid")
});

/// Host allow-list matched against the `Host` header
///
/// Patterns: `*` matches anything, `.example.com` matches the domain and every
/// subdomain, anything else must match exactly. Comparison ignores case and
/// the port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedHosts(Vec<String>);

impl AllowedHosts {
    /// Build from patterns (lowercased)
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            patterns
                .into_iter()
                .map(|p| p.as_ref().trim().to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        )
    }

    /// The configured patterns
    pub fn patterns(&self) -> &[String] {
        &self.0
    }

    /// True when no host is allowed at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `*` is present
    pub fn is_wildcard(&self) -> bool {
        self.0.iter().any(|p| p == "*")
    }

    /// Whether a request carrying this `Host` value is served
    ///
    /// A request without any host is only served under the wildcard.
    pub fn permits(&self, host: Option<&str>) -> bool {
        let Some(host) = host else {
            return self.is_wildcard();
        };
        let Some(domain) = split_domain(host) else {
            return false;
        };
        self.0.iter().any(|pattern| matches_host(pattern, &domain))
    }
}

/// Domain part of a host header value, lowercased, without port or trailing
/// dot. `None` when the value is not a syntactically valid host.
pub fn split_domain(host: &str) -> Option<String> {
    let host = host.trim().to_ascii_lowercase();
    if !HOST_PATTERN.is_match(&host) {
        return None;
    }
    if host.ends_with(']') {
        return Some(host);
    }
    let domain = match host.rsplit_once(':') {
        Some((domain, _port)) => domain,
        None => host.as_str(),
    };
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_string())
    }
}

fn matches_host(pattern: &str, domain: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_prefix('.') {
        Some(parent) => domain == parent || domain.ends_with(pattern),
        None => pattern == domain,
    }
}

// ============================================================================
// Database selection
// ============================================================================

/// Database engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// PostgreSQL
    Postgres,
    /// SQLite
    Sqlite,
}

impl Backend {
    /// Pick the engine from a connection URL's scheme
    pub fn from_url(url: &str) -> Result<Self> {
        let lower = url.trim().to_ascii_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if lower.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else {
            Err(Error::config(format!(
                "Unsupported DATABASE_URL scheme: {}",
                sanitize_url(url)
            )))
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgresql"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// PostgreSQL connection parts (`DB_*` variables)
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresSettings {
    /// Database name
    pub name: String,
    /// Role
    pub user: String,
    /// Password
    pub password: String,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

impl fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresSettings")
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// Which database to connect to
#[derive(Clone, PartialEq, Eq)]
pub enum DatabaseSettings {
    /// `DATABASE_URL` was set
    Url {
        /// Full connection URL
        url: String,
        /// Engine chosen by the URL scheme
        backend: Backend,
        /// Recycle connections after this long
        conn_max_age: Duration,
        /// Ping connections before handing them out
        health_checks: bool,
    },
    /// Local SQLite file
    Sqlite {
        /// Database file
        path: PathBuf,
    },
    /// PostgreSQL from individual variables
    Postgres(PostgresSettings),
}

impl DatabaseSettings {
    /// Settings for a connection URL
    pub fn from_url(url: &str) -> Result<Self> {
        let backend = Backend::from_url(url)?;
        Ok(Self::Url {
            url: url.trim().to_string(),
            backend,
            conn_max_age: URL_CONN_MAX_AGE,
            health_checks: true,
        })
    }

    /// The engine in use
    pub fn backend(&self) -> Backend {
        match self {
            Self::Url { backend, .. } => *backend,
            Self::Sqlite { .. } => Backend::Sqlite,
            Self::Postgres(_) => Backend::Postgres,
        }
    }

    /// Credential-free description for logs
    pub fn describe(&self) -> String {
        match self {
            Self::Url { url, .. } => sanitize_url(url),
            Self::Sqlite { path } => format!("sqlite://{}", path.display()),
            Self::Postgres(pg) => format!(
                "postgres://{}:<redacted>@{}:{}/{}",
                pg.user, pg.host, pg.port, pg.name
            ),
        }
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("backend", &self.backend())
            .field("target", &self.describe())
            .finish()
    }
}

// ============================================================================
// CORS and security headers
// ============================================================================

/// Browser cross-origin policy
#[derive(Debug, Clone)]
pub struct CorsSettings {
    /// Any origin may call the API (debug only)
    pub allow_all_origins: bool,
    /// Explicit origin allow-list
    pub allowed_origins: Vec<HeaderValue>,
    /// Cookies and `Authorization` may be sent cross-origin
    pub allow_credentials: bool,
    /// Methods allowed on preflight
    pub allowed_methods: Vec<Method>,
    /// Request headers allowed on preflight
    pub allowed_headers: Vec<HeaderName>,
    /// How long browsers may cache a preflight
    pub max_age: Duration,
}

impl CorsSettings {
    fn resolve(origins: Vec<String>, debug: bool) -> Result<Self> {
        let allowed_origins = origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin).map_err(|e| {
                    Error::config(format!("Invalid CORS origin {:?}: {}", origin, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            allow_all_origins: debug,
            allowed_origins,
            allow_credentials: true,
            allowed_methods: vec![
                Method::DELETE,
                Method::GET,
                Method::OPTIONS,
                Method::PATCH,
                Method::POST,
                Method::PUT,
            ],
            allowed_headers: [
                "accept",
                "accept-encoding",
                "authorization",
                "content-type",
                "dnt",
                "origin",
                "user-agent",
                "x-csrftoken",
                "x-requested-with",
            ]
            .into_iter()
            .map(HeaderName::from_static)
            .collect(),
            max_age: Duration::from_secs(86_400),
        })
    }

    /// Whether an `Origin` value is accepted
    pub fn allows_origin(&self, origin: &HeaderValue) -> bool {
        self.allow_all_origins || self.allowed_origins.iter().any(|o| o == origin)
    }
}

/// Strict-Transport-Security parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HstsSettings {
    /// `max-age`
    pub seconds: u64,
    /// `includeSubDomains`
    pub include_subdomains: bool,
    /// `preload`
    pub preload: bool,
}

impl HstsSettings {
    /// Header value
    pub fn header_value(&self) -> String {
        let mut value = format!("max-age={}", self.seconds);
        if self.include_subdomains {
            value.push_str("; includeSubDomains");
        }
        if self.preload {
            value.push_str("; preload");
        }
        value
    }
}

/// Response hardening and HTTPS enforcement
#[derive(Debug, Clone)]
pub struct SecuritySettings {
    /// Redirect plain HTTP to HTTPS
    pub ssl_redirect: bool,
    /// `X-Content-Type-Options: nosniff`
    pub content_type_nosniff: bool,
    /// `X-XSS-Protection: 1; mode=block`
    pub browser_xss_filter: bool,
    /// `X-Frame-Options` value
    pub x_frame_options: &'static str,
    /// `Referrer-Policy` value
    pub referrer_policy: &'static str,
    /// HSTS on secure responses
    pub hsts: Option<HstsSettings>,
}

impl SecuritySettings {
    fn resolve<E: EnvSource + ?Sized>(env: &E, debug: bool) -> Self {
        let production = !debug;
        Self {
            ssl_redirect: production && flag(env, "SECURE_SSL_REDIRECT", false),
            content_type_nosniff: true,
            browser_xss_filter: production,
            x_frame_options: "DENY",
            referrer_policy: "same-origin",
            hsts: production.then_some(HstsSettings {
                seconds: HSTS_SECONDS,
                include_subdomains: true,
                preload: true,
            }),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Everything resolved from the environment at startup
#[derive(Debug, Clone)]
pub struct Settings {
    /// Signing key for tokens
    pub secret_key: SecretKey,
    /// Development mode
    pub debug: bool,
    /// Host allow-list
    pub allowed_hosts: AllowedHosts,
    /// Database selection
    pub database: DatabaseSettings,
    /// Cross-origin policy
    pub cors: CorsSettings,
    /// Security headers and redirects
    pub security: SecuritySettings,
    /// Project root; the SQLite file lives here
    pub base_dir: PathBuf,
}

impl Settings {
    /// Resolve from the real process environment
    pub fn from_process_env(base_dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_env(&ProcessEnv, base_dir)
    }

    /// Resolve from any environment source
    pub fn from_env<E: EnvSource + ?Sized>(env: &E, base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let debug = flag(env, "DEBUG", true);

        let secret_key = match env.var("SECRET_KEY") {
            Some(key) if key.is_empty() => {
                return Err(Error::config("SECRET_KEY must not be empty"));
            }
            Some(key) => SecretKey::new(key),
            None => SecretKey::new(INSECURE_SECRET_KEY),
        };
        if !debug && secret_key.is_insecure_default() {
            return Err(Error::config(
                "SECRET_KEY must be set when DEBUG is not True",
            ));
        }

        let allowed_hosts = match non_empty(env, "ALLOWED_HOSTS") {
            Some(value) => AllowedHosts::new(list(&value)),
            None if debug => AllowedHosts::new(["*"]),
            None => AllowedHosts::default(),
        };

        let database = Self::resolve_database(env, &base_dir)?;

        let origins = match non_empty(env, "CORS_ALLOWED_ORIGINS") {
            Some(value) => list(&value),
            None => DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };
        let cors = CorsSettings::resolve(origins, debug)?;
        let security = SecuritySettings::resolve(env, debug);

        Ok(Self {
            secret_key,
            debug,
            allowed_hosts,
            database,
            cors,
            security,
            base_dir,
        })
    }

    fn resolve_database<E: EnvSource + ?Sized>(env: &E, base_dir: &Path) -> Result<DatabaseSettings> {
        if let Some(url) = non_empty(env, "DATABASE_URL") {
            return DatabaseSettings::from_url(&url);
        }

        if flag(env, "DB_USE_SQLITE", true) {
            return Ok(DatabaseSettings::Sqlite {
                path: base_dir.join(SQLITE_FILE_NAME),
            });
        }

        let var_or = |key: &str, default: &str| env.var(key).unwrap_or_else(|| default.to_string());
        let port_value = var_or("DB_PORT", "5432");
        let port = u16::from_str(port_value.trim())
            .map_err(|_| Error::config(format!("DB_PORT is not a valid port: {:?}", port_value)))?;

        Ok(DatabaseSettings::Postgres(PostgresSettings {
            name: var_or("DB_NAME", "netflix_db"),
            user: var_or("DB_USER", "postgres"),
            password: var_or("DB_PASSWORD", "1234"),
            host: var_or("DB_HOST", "localhost"),
            port,
        }))
    }

    /// Production hazards in the current settings
    pub fn deployment_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.debug {
            warnings.push("DEBUG is True; do not run with debug turned on in production".to_string());
        }
        if self.secret_key.is_insecure_default() {
            warnings.push("SECRET_KEY is the built-in development key".to_string());
        } else if self.secret_key.is_weak() {
            warnings.push(format!(
                "SECRET_KEY is shorter than {} characters or has too few distinct characters",
                MIN_SECRET_KEY_LENGTH
            ));
        }
        if self.allowed_hosts.is_empty() {
            warnings.push("ALLOWED_HOSTS is empty; every request will be rejected".to_string());
        } else if self.allowed_hosts.is_wildcard() {
            warnings.push("ALLOWED_HOSTS contains '*'; any Host header is accepted".to_string());
        }
        if !self.debug && !self.security.ssl_redirect {
            warnings.push("SECURE_SSL_REDIRECT is not True; plain HTTP is served".to_string());
        }
        if self.database.backend() == Backend::Sqlite && !self.debug {
            warnings.push("SQLite is in use outside debug mode".to_string());
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "/srv/netflix";
    const PROD_KEY: &str = "k3y-for-tests-0123456789-abcdefghijklmnopqrstuvwxyz-ABCDEF";

    fn resolve(env: &[(&str, &str)]) -> Settings {
        Settings::from_env(env, BASE).unwrap()
    }

    #[test]
    fn test_debug_without_hosts_allows_everything() {
        let settings = resolve(&[("DEBUG", "True")]);
        assert!(settings.debug);
        assert_eq!(settings.allowed_hosts.patterns(), ["*"]);
        assert!(settings.allowed_hosts.permits(Some("anything.example:8000")));
        assert!(settings.allowed_hosts.permits(None));
    }

    #[test]
    fn test_production_without_hosts_fails_closed() {
        let settings = resolve(&[("DEBUG", "False"), ("SECRET_KEY", PROD_KEY)]);
        assert!(!settings.debug);
        assert!(settings.allowed_hosts.is_empty());
        assert!(!settings.allowed_hosts.permits(Some("localhost")));
        assert!(!settings.allowed_hosts.permits(None));
    }

    #[test]
    fn test_debug_is_exact_match() {
        assert!(resolve(&[]).debug);
        for value in ["true", "1", "yes", "TRUE", ""] {
            let settings = Settings::from_env(&[("DEBUG", value), ("SECRET_KEY", PROD_KEY)], BASE)
                .unwrap();
            assert!(!settings.debug, "DEBUG={value:?} must be off");
        }
    }

    #[test]
    fn test_blank_lists_fail_closed() {
        let settings = resolve(&[("DEBUG", "True"), ("ALLOWED_HOSTS", "  ")]);
        assert!(settings.allowed_hosts.is_empty());
        assert!(!settings.allowed_hosts.permits(Some("localhost")));

        let settings = resolve(&[
            ("DEBUG", "False"),
            ("SECRET_KEY", PROD_KEY),
            ("CORS_ALLOWED_ORIGINS", " , "),
        ]);
        assert!(settings.cors.allowed_origins.is_empty());
        assert!(!settings
            .cors
            .allows_origin(&HeaderValue::from_static("http://localhost:5173")));
    }

    #[test]
    fn test_allowed_hosts_are_split_and_trimmed() {
        let settings = resolve(&[("ALLOWED_HOSTS", " api.example.com, .netflix.test ,,")]);
        assert_eq!(
            settings.allowed_hosts.patterns(),
            ["api.example.com", ".netflix.test"]
        );
    }

    #[test]
    fn test_host_matching() {
        let hosts = AllowedHosts::new(["api.example.com", ".netflix.test", "[::1]"]);
        assert!(hosts.permits(Some("api.example.com")));
        assert!(hosts.permits(Some("API.Example.com:443")));
        assert!(hosts.permits(Some("api.example.com.")));
        assert!(hosts.permits(Some("netflix.test")));
        assert!(hosts.permits(Some("www.netflix.test:8000")));
        assert!(hosts.permits(Some("[::1]:8000")));
        assert!(!hosts.permits(Some("evil.com")));
        assert!(!hosts.permits(Some("notnetflix.test")));
        assert!(!hosts.permits(Some("api.example.com@evil.com")));
        assert!(!hosts.permits(None));
    }

    #[test]
    fn test_database_url_wins_over_sqlite_flag() {
        for use_sqlite in ["True", "False"] {
            let settings = resolve(&[
                ("DATABASE_URL", "postgres://app:pw@db.internal:5432/netflix"),
                ("DB_USE_SQLITE", use_sqlite),
            ]);
            match settings.database {
                DatabaseSettings::Url {
                    backend,
                    conn_max_age,
                    health_checks,
                    ..
                } => {
                    assert_eq!(backend, Backend::Postgres);
                    assert_eq!(conn_max_age, Duration::from_secs(600));
                    assert!(health_checks);
                }
                other => panic!("expected URL settings, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_sqlite_file_storage_by_default() {
        let settings = resolve(&[("DB_USE_SQLITE", "True")]);
        assert_eq!(
            settings.database,
            DatabaseSettings::Sqlite {
                path: PathBuf::from(BASE).join("db.sqlite3")
            }
        );
        assert_eq!(resolve(&[]).database.backend(), Backend::Sqlite);
    }

    #[test]
    fn test_empty_database_url_is_unset() {
        let settings = resolve(&[("DATABASE_URL", "")]);
        assert_eq!(settings.database.backend(), Backend::Sqlite);
    }

    #[test]
    fn test_postgres_from_parts() {
        let settings = resolve(&[("DB_USE_SQLITE", "False")]);
        let DatabaseSettings::Postgres(pg) = settings.database else {
            panic!("expected postgres parts");
        };
        assert_eq!(pg.name, "netflix_db");
        assert_eq!(pg.user, "postgres");
        assert_eq!(pg.password, "1234");
        assert_eq!(pg.host, "localhost");
        assert_eq!(pg.port, 5432);

        let settings = resolve(&[
            ("DB_USE_SQLITE", "no"),
            ("DB_NAME", "movies"),
            ("DB_HOST", "pg"),
            ("DB_PORT", "6543"),
        ]);
        let DatabaseSettings::Postgres(pg) = settings.database else {
            panic!("expected postgres parts");
        };
        assert_eq!((pg.name.as_str(), pg.host.as_str(), pg.port), ("movies", "pg", 6543));
        assert!(!format!("{pg:?}").contains("1234"));
    }

    #[test]
    fn test_bad_port_and_scheme_are_config_errors() {
        let err = Settings::from_env(&[("DB_USE_SQLITE", "False"), ("DB_PORT", "pg")], BASE);
        assert!(matches!(err, Err(Error::Config(_))));

        let err = Settings::from_env(&[("DATABASE_URL", "mysql://u:p@h/db")], BASE);
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_sqlite_url_scheme() {
        let settings = resolve(&[("DATABASE_URL", "sqlite:///tmp/netflix.sqlite3")]);
        assert_eq!(settings.database.backend(), Backend::Sqlite);
    }

    #[test]
    fn test_secret_key_rules() {
        assert!(resolve(&[]).secret_key.is_insecure_default());
        assert!(matches!(
            Settings::from_env(&[("SECRET_KEY", "")], BASE),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Settings::from_env(&[("DEBUG", "False")], BASE),
            Err(Error::Config(_))
        ));
        let settings = resolve(&[("SECRET_KEY", PROD_KEY)]);
        assert!(!settings.secret_key.is_weak());
        assert_eq!(format!("{:?}", settings.secret_key), "SecretKey(<redacted>)");
    }

    #[test]
    fn test_cors_defaults_and_overrides() {
        let settings = resolve(&[]);
        assert!(settings.cors.allow_all_origins);
        assert!(settings.cors.allow_credentials);
        assert_eq!(settings.cors.allowed_origins.len(), 4);
        assert_eq!(settings.cors.allowed_methods.len(), 6);
        assert_eq!(settings.cors.allowed_headers.len(), 9);
        assert_eq!(settings.cors.max_age, Duration::from_secs(86_400));

        let settings = Settings::from_env(
            &[
                ("DEBUG", "False"),
                ("SECRET_KEY", PROD_KEY),
                ("CORS_ALLOWED_ORIGINS", "https://watch.example.com , https://admin.example.com"),
            ],
            BASE,
        )
        .unwrap();
        assert!(!settings.cors.allow_all_origins);
        assert!(settings
            .cors
            .allows_origin(&HeaderValue::from_static("https://watch.example.com")));
        assert!(!settings
            .cors
            .allows_origin(&HeaderValue::from_static("http://localhost:5173")));
    }

    #[test]
    fn test_security_settings_follow_debug() {
        let dev = resolve(&[("SECURE_SSL_REDIRECT", "True")]);
        assert!(!dev.security.ssl_redirect);
        assert!(!dev.security.browser_xss_filter);
        assert!(dev.security.hsts.is_none());
        assert!(dev.security.content_type_nosniff);
        assert_eq!(dev.security.x_frame_options, "DENY");

        let prod = resolve(&[
            ("DEBUG", "False"),
            ("SECRET_KEY", PROD_KEY),
            ("SECURE_SSL_REDIRECT", "True"),
        ]);
        assert!(prod.security.ssl_redirect);
        assert!(prod.security.browser_xss_filter);
        assert_eq!(
            prod.security.hsts.map(|h| h.header_value()).as_deref(),
            Some("max-age=31536000; includeSubDomains; preload")
        );

        let prod = resolve(&[("DEBUG", "False"), ("SECRET_KEY", PROD_KEY)]);
        assert!(!prod.security.ssl_redirect);
    }

    #[test]
    fn test_deployment_warnings() {
        let dev = resolve(&[]);
        let warnings = dev.deployment_warnings();
        assert!(warnings.iter().any(|w| w.starts_with("DEBUG")));
        assert!(warnings.iter().any(|w| w.starts_with("SECRET_KEY")));

        let prod = resolve(&[
            ("DEBUG", "False"),
            ("SECRET_KEY", PROD_KEY),
            ("ALLOWED_HOSTS", "api.example.com"),
            ("SECURE_SSL_REDIRECT", "True"),
            ("DATABASE_URL", "postgres://u:p@db/netflix"),
        ]);
        assert!(prod.deployment_warnings().is_empty());
    }

    #[test]
    fn test_hash_map_source() {
        let env: HashMap<String, String> =
            [("DEBUG".to_string(), "True".to_string())].into_iter().collect();
        assert!(Settings::from_env(&env, BASE).unwrap().debug);
    }
}
