use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// S3/MinIO bucket holding profile pictures.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Prefix prepended to object keys when building public URLs.
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).with_context(|| format!("{key} must be set"));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());
        let number = |key: &str, default: i64| -> anyhow::Result<i64> {
            match lookup(key) {
                Some(v) => v.parse::<i64>().with_context(|| format!("{key} must be an integer")),
                None => Ok(default),
            }
        };

        let database_url = required("DATABASE_URL")?;
        let database_max_connections = u32::try_from(number("DATABASE_MAX_CONNECTIONS", 10)?)
            .context("DATABASE_MAX_CONNECTIONS out of range")?;

        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: or_default("JWT_ISSUER", "egy360"),
            audience: or_default("JWT_AUDIENCE", "egy360-users"),
            ttl_minutes: number("JWT_TTL_MINUTES", 60)?,
            refresh_ttl_minutes: number("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14)?,
        };
        anyhow::ensure!(jwt.ttl_minutes > 0, "JWT_TTL_MINUTES must be positive");
        anyhow::ensure!(
            jwt.refresh_ttl_minutes > 0,
            "JWT_REFRESH_TTL_MINUTES must be positive"
        );

        let endpoint = or_default("S3_ENDPOINT", "http://localhost:9000");
        let bucket = or_default("S3_BUCKET", "egy360-media");
        let public_base_url = lookup("MEDIA_BASE_URL")
            .unwrap_or_else(|| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));
        let storage = StorageConfig {
            access_key: or_default("S3_ACCESS_KEY", "minioadmin"),
            secret_key: or_default("S3_SECRET_KEY", "minioadmin"),
            region: or_default("S3_REGION", "us-east-1"),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            endpoint,
            bucket,
        };

        Ok(Self {
            database_url,
            database_max_connections,
            jwt,
            storage,
        })
    }
}
