use anyhow::bail;
use clap::{Parser, ValueEnum};
use std::fmt;

/// Deployment profile. Controls log format and whether error responses
/// carry internal detail.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Development,
    Production,
}

impl Profile {
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

/// Runtime configuration for the `dashboard-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (after
/// loading `.env`), with defaults suitable for a single-node deployment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "dashboard-server",
    version,
    about = "REST backend for a product dashboard with streaming XLSX exports"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:3000"))]
    pub server_addr: String,

    /// SQLite connection string. `mode=rwc` creates the file if missing.
    ///
    /// Environment variable: `DATABASE_URL`
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value_t = String::from("sqlite://dashboard.db?mode=rwc")
    )]
    pub database_url: String,

    /// Upper bound on pooled database connections.
    ///
    /// Every in-flight write request holds one connection for the lifetime of
    /// its transaction, so this also caps concurrent writes.
    ///
    /// Environment variable: `DB_MAX_CONNECTIONS`
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// Path prefix all API routes are mounted under.
    ///
    /// Environment variable: `API_PREFIX`
    #[arg(long, env = "API_PREFIX", default_value_t = String::from("/api"))]
    pub api_prefix: String,

    /// Deployment profile.
    ///
    /// `development` switches to pretty logs and adds internal error detail
    /// to error responses.
    ///
    /// Environment variable: `APP_ENV`
    #[arg(long, env = "APP_ENV", value_enum, default_value_t = Profile::Production)]
    pub profile: Profile,

    /// Records pulled from the database per export step.
    ///
    /// Environment variable: `EXPORT_BATCH_SIZE`
    #[arg(long, env = "EXPORT_BATCH_SIZE", default_value_t = 1000)]
    pub export_batch_size: usize,

    /// Encoded chunks buffered between an export and its HTTP response.
    ///
    /// Lower values apply back-pressure sooner when the client reads slowly.
    ///
    /// Environment variable: `EXPORT_STREAM_BUFFER`
    #[arg(long, env = "EXPORT_STREAM_BUFFER", default_value_t = 8)]
    pub export_stream_buffer: usize,

    /// Largest accepted request body, in bytes.
    ///
    /// Environment variable: `BODY_LIMIT_BYTES`
    #[arg(long, env = "BODY_LIMIT_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub body_limit: usize,

    /// HMAC secret used to sign and verify access tokens.
    ///
    /// Required in production. Development falls back to a fixed secret.
    ///
    /// Environment variable: `JWT_SECRET`
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Lifetime of issued access tokens, in hours.
    ///
    /// Environment variable: `JWT_EXPIRES_IN_HOURS`
    #[arg(long, env = "JWT_EXPIRES_IN_HOURS", default_value_t = 24)]
    pub jwt_expires_in_hours: u32,

    /// Directory served under `/image` that product uploads are written to.
    ///
    /// Environment variable: `IMAGE_DIR`
    #[arg(long, env = "IMAGE_DIR", default_value_t = String::from("public/image"))]
    pub image_dir: String,

    /// Largest accepted product image, in bytes.
    ///
    /// Environment variable: `UPLOAD_MAX_BYTES`
    #[arg(long, env = "UPLOAD_MAX_BYTES", default_value_t = 2 * 1024 * 1024)]
    pub upload_max_bytes: usize,
}

const DEVELOPMENT_JWT_SECRET: &str = "development-only-secret";

/// A credential that never shows up in `Debug` output.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub database_url: String,
    pub max_connections: u32,
    pub api_prefix: String,
    pub profile: Profile,
    pub export_batch_size: usize,
    pub export_stream_buffer: usize,
    pub body_limit: usize,
    pub jwt_secret: Secret,
    pub jwt_expires_in_hours: u32,
    pub image_dir: String,
    pub upload_max_bytes: usize,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_connections == 0 {
            bail!("DB_MAX_CONNECTIONS must be greater than 0");
        }

        if args.export_batch_size == 0 {
            bail!("EXPORT_BATCH_SIZE must be greater than 0");
        }

        if args.export_stream_buffer == 0 {
            bail!("EXPORT_STREAM_BUFFER must be greater than 0");
        }

        if !args.api_prefix.starts_with('/') {
            bail!("API_PREFIX ({}) must start with '/'", args.api_prefix);
        }

        if args.jwt_expires_in_hours == 0 {
            bail!("JWT_EXPIRES_IN_HOURS must be greater than 0");
        }

        if args.upload_max_bytes == 0 {
            bail!("UPLOAD_MAX_BYTES must be greater than 0");
        }

        let jwt_secret = match (args.jwt_secret, args.profile) {
            (Some(secret), _) if !secret.is_empty() => Secret::new(secret),
            (_, Profile::Development) => Secret::new(DEVELOPMENT_JWT_SECRET),
            (_, Profile::Production) => bail!("JWT_SECRET is required in production"),
        };

        // Nested routers reject a trailing slash.
        let api_prefix = match args.api_prefix.trim_end_matches('/') {
            "" => String::from("/"),
            trimmed => trimmed.to_owned(),
        };

        Ok(Self {
            server_addr: args.server_addr,
            database_url: args.database_url,
            max_connections: args.max_connections,
            api_prefix,
            profile: args.profile,
            export_batch_size: args.export_batch_size,
            export_stream_buffer: args.export_stream_buffer,
            body_limit: args.body_limit,
            jwt_secret,
            jwt_expires_in_hours: args.jwt_expires_in_hours,
            image_dir: args.image_dir,
            upload_max_bytes: args.upload_max_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_raw(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let mut argv = vec!["dashboard-server"];
        argv.extend_from_slice(args);
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let mut argv = vec!["--jwt-secret", "s3cret"];
        argv.extend_from_slice(args);
        parse_raw(&argv)
    }

    #[test]
    fn accepts_explicit_values() {
        let config = parse(&[
            "--api-prefix",
            "/v2/",
            "--profile",
            "development",
            "--export-batch-size",
            "50",
        ])
        .expect("valid config");

        assert_eq!(config.api_prefix, "/v2");
        assert_eq!(config.profile, Profile::Development);
        assert_eq!(config.export_batch_size, 50);
        assert_eq!(config.jwt_secret.expose(), "s3cret");
        assert!(!format!("{config:?}").contains("s3cret"));
        assert_eq!(config.jwt_expires_in_hours, 24);
    }

    #[test]
    fn production_requires_a_jwt_secret() {
        assert!(parse_raw(&["--profile", "production"]).is_err());
        assert!(parse_raw(&["--profile", "production", "--jwt-secret", ""]).is_err());

        let config = parse_raw(&["--profile", "development"]).expect("development default");
        assert_eq!(config.jwt_secret.expose(), DEVELOPMENT_JWT_SECRET);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(parse(&["--jwt-expires-in-hours", "0"]).is_err());
        assert!(parse(&["--upload-max-bytes", "0"]).is_err());
        assert!(parse(&["--export-batch-size", "0"]).is_err());
        assert!(parse(&["--max-connections", "0"]).is_err());
        assert!(parse(&["--export-stream-buffer", "0"]).is_err());
        assert!(parse(&["--api-prefix", "api"]).is_err());
    }
}
