use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::{env, path::PathBuf};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; CLI wins.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub backend: BackendConfig,
    /// Whether home storage is spread over several buckets at all.
    pub multibucket: bool,
    pub host: String,
    pub port: u16,
}

/// Where tenant home storage lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local { storage_dir: PathBuf },
    /// Plain filesystem home storage, which has no buckets to migrate between.
    Filesystem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub path_style: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    S3,
    Local,
    Filesystem,
}

/// Command-line configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Move tenants between object-store buckets")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Database URL (overrides BUCKET_MOVER_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Home storage backend (overrides BUCKET_MOVER_BACKEND)
    #[arg(long, value_enum, global = true)]
    pub backend: Option<BackendKind>,

    /// Root directory of the local backend (overrides BUCKET_MOVER_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    /// Custom S3 endpoint (overrides BUCKET_MOVER_S3_ENDPOINT)
    #[arg(long, global = true)]
    pub s3_endpoint: Option<String>,

    /// S3 region (overrides BUCKET_MOVER_S3_REGION)
    #[arg(long, global = true)]
    pub s3_region: Option<String>,

    /// Use path-style S3 addressing (overrides BUCKET_MOVER_S3_PATH_STYLE)
    #[arg(long, global = true)]
    pub s3_path_style: bool,

    /// Treat the deployment as multi-bucket (overrides BUCKET_MOVER_MULTIBUCKET)
    #[arg(long, global = true)]
    pub multibucket: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Move a tenant to a different bucket
    MoveTenant(MoveTenantArgs),
    /// List all objects owned by a tenant
    ListObjects(ListObjectsArgs),
    /// List all tenants using the specified bucket
    ByBucket(ByBucketArgs),
    /// Serve the admin HTTP API
    Serve(ServeArgs),
    /// Run migrations and exit
    Migrate,
}

#[derive(Args, Debug, Clone)]
pub struct MoveTenantArgs {
    /// Id of the tenant to migrate
    pub tenant: String,

    /// Bucket to migrate the tenant to
    pub target_bucket: String,

    /// Number of copy requests to run in parallel
    #[arg(long, default_value_t = 1)]
    pub parallel: usize,

    /// Maximum number of objects allowed to be migrated, negative for no limit
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub max_allowed_files: i64,

    /// Restore and re-enable the tenant on errors
    #[arg(long)]
    pub restore_on_failure: bool,
}

impl MoveTenantArgs {
    pub fn max_objects(&self) -> Option<usize> {
        usize::try_from(self.max_allowed_files).ok()
    }
}

#[derive(Args, Debug, Clone)]
pub struct ListObjectsArgs {
    /// Id of the tenant to list objects for
    pub tenant: String,

    /// Only print the number of objects instead of listing them all
    #[arg(short, long)]
    pub count: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ByBucketArgs {
    /// Bucket to list tenants for
    pub bucket: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Host to bind to (overrides BUCKET_MOVER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BUCKET_MOVER_PORT)
    #[arg(long)]
    pub port: Option<u16>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        let cli = Cli::parse();
        let serve = match &cli.command {
            Command::Serve(args) => args.clone(),
            _ => ServeArgs::default(),
        };
        let cfg = Self::resolve(cli.global, serve, |key| env::var(key).ok())?;
        Ok((cfg, cli.command))
    }

    /// Merge CLI values over values looked up through `env`.
    pub fn resolve(
        args: GlobalArgs,
        serve: ServeArgs,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let env_host = env("BUCKET_MOVER_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match env("BUCKET_MOVER_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing BUCKET_MOVER_PORT value `{}`", value))?,
            None => 3000,
        };
        let env_db = env("BUCKET_MOVER_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/bucket_mover.db".into());
        let env_backend = match env("BUCKET_MOVER_BACKEND") {
            Some(value) => BackendKind::from_str(&value, true)
                .map_err(|err| anyhow::anyhow!(err))
                .with_context(|| format!("parsing BUCKET_MOVER_BACKEND value `{}`", value))?,
            None => BackendKind::S3,
        };
        let env_multibucket = parse_flag(&env, "BUCKET_MOVER_MULTIBUCKET")?;

        let backend = match args.backend.unwrap_or(env_backend) {
            BackendKind::S3 => BackendConfig::S3(S3Config {
                endpoint: args.s3_endpoint.or_else(|| env("BUCKET_MOVER_S3_ENDPOINT")),
                region: args
                    .s3_region
                    .or_else(|| env("BUCKET_MOVER_S3_REGION"))
                    .unwrap_or_else(|| "us-east-1".into()),
                path_style: args.s3_path_style || parse_flag(&env, "BUCKET_MOVER_S3_PATH_STYLE")?,
            }),
            BackendKind::Local => BackendConfig::Local {
                storage_dir: args.storage_dir.unwrap_or_else(|| {
                    env("BUCKET_MOVER_STORAGE_DIR")
                        .unwrap_or_else(|| "./data/objects".into())
                        .into()
                }),
            },
            BackendKind::Filesystem => BackendConfig::Filesystem,
        };

        Ok(Self {
            database_url: args.database_url.unwrap_or(env_db),
            backend,
            multibucket: args.multibucket || env_multibucket,
            host: serve.host.unwrap_or(env_host),
            port: serve.port.unwrap_or(env_port),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_flag(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool> {
    match env(key) {
        None => Ok(false),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => bail!("parsing {} value `{}`: expected a boolean", key, value),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let cfg = AppConfig::resolve(GlobalArgs::default(), ServeArgs::default(), env_of(&[]))
            .unwrap();
        assert_eq!(cfg.database_url, "sqlite://./data/meta/bucket_mover.db");
        assert_eq!(
            cfg.backend,
            BackendConfig::S3(S3Config {
                endpoint: None,
                region: "us-east-1".into(),
                path_style: false,
            })
        );
        assert!(!cfg.multibucket);
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
    }

    #[test]
    fn env_selects_local_backend() {
        let env = env_of(&[
            ("BUCKET_MOVER_BACKEND", "LOCAL"),
            ("BUCKET_MOVER_STORAGE_DIR", "/srv/objects"),
            ("BUCKET_MOVER_MULTIBUCKET", "true"),
            ("BUCKET_MOVER_PORT", "8080"),
        ]);
        let cfg = AppConfig::resolve(GlobalArgs::default(), ServeArgs::default(), env).unwrap();
        assert_eq!(
            cfg.backend,
            BackendConfig::Local {
                storage_dir: "/srv/objects".into()
            }
        );
        assert!(cfg.multibucket);
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn cli_overrides_env() {
        let env = env_of(&[
            ("BUCKET_MOVER_BACKEND", "local"),
            ("BUCKET_MOVER_DATABASE_URL", "sqlite://env.db"),
        ]);
        let args = GlobalArgs {
            backend: Some(BackendKind::Filesystem),
            database_url: Some("sqlite://cli.db".into()),
            ..GlobalArgs::default()
        };
        let serve = ServeArgs {
            host: Some("127.0.0.1".into()),
            port: Some(9000),
        };
        let cfg = AppConfig::resolve(args, serve, env).unwrap();
        assert_eq!(cfg.backend, BackendConfig::Filesystem);
        assert_eq!(cfg.database_url, "sqlite://cli.db");
        assert_eq!(cfg.addr(), "127.0.0.1:9000");
    }

    #[test]
    fn rejects_malformed_values() {
        let bad_port = env_of(&[("BUCKET_MOVER_PORT", "http")]);
        assert!(AppConfig::resolve(GlobalArgs::default(), ServeArgs::default(), bad_port).is_err());

        let bad_backend = env_of(&[("BUCKET_MOVER_BACKEND", "ftp")]);
        assert!(
            AppConfig::resolve(GlobalArgs::default(), ServeArgs::default(), bad_backend).is_err()
        );

        let bad_flag = env_of(&[("BUCKET_MOVER_MULTIBUCKET", "maybe")]);
        assert!(AppConfig::resolve(GlobalArgs::default(), ServeArgs::default(), bad_flag).is_err());
    }

    #[test]
    fn move_tenant_args_parse() {
        let cli = Cli::try_parse_from([
            "bucket-mover",
            "--multibucket",
            "move-tenant",
            "alice",
            "b2",
            "--parallel",
            "8",
            "--max-allowed-files",
            "-1",
            "--restore-on-failure",
        ])
        .unwrap();
        assert!(cli.global.multibucket);
        match cli.command {
            Command::MoveTenant(args) => {
                assert_eq!(args.tenant, "alice");
                assert_eq!(args.target_bucket, "b2");
                assert_eq!(args.parallel, 8);
                assert_eq!(args.max_objects(), None);
                assert!(args.restore_on_failure);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn non_negative_cap_is_kept() {
        let cli =
            Cli::try_parse_from(["bucket-mover", "move-tenant", "bob", "b3", "--max-allowed-files", "0"])
                .unwrap();
        let Command::MoveTenant(args) = cli.command else {
            panic!("expected move-tenant");
        };
        assert_eq!(args.max_objects(), Some(0));
        assert_eq!(args.parallel, 1);
    }
}
